#![forbid(unsafe_code)]

//! Declarative node descriptions.
//!
//! A [`Record`] is an owned tree describing one node and its children. It is
//! the authoring form: records are built with the fluent methods below (or
//! parsed from JSON) and flattened into a [`RecordStore`](crate::RecordStore)
//! when they are handed to a tracked tree.
//!
//! Config fields (`ns`, `selector`, `key`, `join`, `each`, `call`) are
//! inherited by the record's children unless a child declares its own.

use std::fmt;
use std::rc::Rc;

use weave_dom::{
    CallbackResult, EventCx, Ease, Handler, NodeId, Selector, TransitionId, Tween, Value,
};

use crate::hooks::{CallFn, EnterCx, Item, JoinHooks, KeyFn, NodeCx, NodeHook, SelectionCx};

/// Insert, overwrite or (with `None`) remove a named row, keeping order.
pub(crate) fn upsert_row<T>(rows: &mut Vec<(String, T)>, name: &str, value: Option<T>) {
    let pos = rows.iter().position(|(n, _)| n == name);
    match (pos, value) {
        (Some(i), None) => {
            rows.remove(i);
        }
        (None, None) => {}
        (Some(i), Some(v)) => rows[i].1 = v,
        (None, Some(v)) => rows.push((name.to_owned(), v)),
    }
}

pub(crate) fn find_row<'a, T>(rows: &'a [(String, T)], name: &str) -> Option<&'a T> {
    rows.iter().find(|(n, _)| n == name).map(|(_, v)| v)
}

/// A style value with its priority.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyleValue {
    pub value: Value,
    pub important: bool,
}

impl StyleValue {
    #[must_use]
    pub fn important(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            important: true,
        }
    }
}

impl From<Value> for StyleValue {
    fn from(value: Value) -> Self {
        Self {
            value,
            important: false,
        }
    }
}

macro_rules! style_from {
    ($($t:ty),*) => {
        $(impl From<$t> for StyleValue {
            fn from(value: $t) -> Self {
                Value::from(value).into()
            }
        })*
    };
}

style_from!(&str, String, f64, i32, u32, usize);

/// A named method invoked on a node (or transition) with arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub method: String,
    pub args: Vec<Value>,
}

impl Invocation {
    pub fn new(method: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            method: method.into(),
            args: args.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// How a transition in a record's sequence is started.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionStart {
    /// A fresh transition, optionally named.
    Named(Option<String>),
    /// A transition that shares name and timing with an existing instance.
    Like(TransitionId),
}

/// Declarative configuration applied to one transition.
#[derive(Clone, Default)]
pub struct TransitionConfig {
    pub duration: Option<f64>,
    pub delay: Option<f64>,
    pub ease: Option<Ease>,
    pub text: Option<String>,
    pub attrs: Vec<(String, Value)>,
    pub styles: Vec<(String, StyleValue)>,
    pub events: Vec<(String, Handler)>,
    pub tweens: Vec<(String, Tween)>,
    /// Arbitrary methods called by name after the fields above.
    pub methods: Vec<Invocation>,
}

impl TransitionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn duration(mut self, ms: f64) -> Self {
        self.duration = Some(ms);
        self
    }

    #[must_use]
    pub fn delay(mut self, ms: f64) -> Self {
        self.delay = Some(ms);
        self
    }

    #[must_use]
    pub fn ease(mut self, ease: Ease) -> Self {
        self.ease = Some(ease);
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        upsert_row(&mut self.attrs, name, Some(value.into()));
        self
    }

    #[must_use]
    pub fn style(mut self, name: &str, value: impl Into<StyleValue>) -> Self {
        upsert_row(&mut self.styles, name, Some(value.into()));
        self
    }

    #[must_use]
    pub fn on(mut self, event: &str, f: impl Fn(&mut EventCx<'_>) -> CallbackResult + 'static) -> Self {
        upsert_row(&mut self.events, event, Some(Rc::new(f) as Handler));
        self
    }

    #[must_use]
    pub fn tween(
        mut self,
        name: &str,
        f: impl Fn(&mut weave_dom::Document, NodeId, f64) -> CallbackResult + 'static,
    ) -> Self {
        upsert_row(&mut self.tweens, name, Some(Rc::new(f) as Tween));
        self
    }

    #[must_use]
    pub fn method(mut self, name: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        self.methods.push(Invocation::new(name, args));
        self
    }
}

impl fmt::Debug for TransitionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionConfig")
            .field("duration", &self.duration)
            .field("delay", &self.delay)
            .field("ease", &self.ease)
            .field("text", &self.text)
            .field("attrs", &self.attrs)
            .field("styles", &self.styles)
            .field("events", &self.events.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("tweens", &self.tweens.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("methods", &self.methods)
            .finish()
    }
}

/// One step of a record's transition sequence.
///
/// A `Configure` step right after a `Start` configures that transition. A
/// `Configure` step after another `Configure` chains a new transition that
/// starts when the previous one ends. A leading `Configure` starts a default
/// transition.
#[derive(Debug, Clone)]
pub enum TransitionStep {
    Start(TransitionStart),
    Configure(TransitionConfig),
}

impl TransitionStep {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Start(TransitionStart::Named(Some(name.into())))
    }

    #[must_use]
    pub fn unnamed() -> Self {
        Self::Start(TransitionStart::Named(None))
    }

    #[must_use]
    pub fn like(id: TransitionId) -> Self {
        Self::Start(TransitionStart::Like(id))
    }
}

impl From<TransitionConfig> for TransitionStep {
    fn from(config: TransitionConfig) -> Self {
        Self::Configure(config)
    }
}

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

/// Every field of a record except its children.
#[derive(Clone, Default)]
pub struct Props {
    pub tag: Option<String>,
    pub ns: Option<String>,
    pub selector: Option<Selector>,
    pub key: Option<KeyFn>,
    pub join: Option<JoinHooks>,
    pub each: Option<NodeHook>,
    pub call: Option<CallFn>,
    pub own_each: Option<NodeHook>,
    pub own_call: Option<CallFn>,
    pub on_enter: Option<NodeHook>,
    pub on_update: Option<NodeHook>,
    pub text: Option<String>,
    pub attrs: Vec<(String, Value)>,
    pub styles: Vec<(String, StyleValue)>,
    pub properties: Vec<(String, Value)>,
    pub events: Vec<(String, Handler)>,
    pub transitions: Vec<TransitionStep>,
    pub invocations: Vec<Invocation>,
}

impl Props {
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&Value> {
        find_row(&self.attrs, name)
    }

    #[must_use]
    pub fn style(&self, name: &str) -> Option<&StyleValue> {
        find_row(&self.styles, name)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        find_row(&self.properties, name)
    }

    #[must_use]
    pub fn event(&self, name: &str) -> Option<&Handler> {
        find_row(&self.events, name)
    }

    /// Set one attribute row; `Null` removes it.
    pub fn set_attr(&mut self, name: &str, value: Value) {
        let value = (!value.is_null()).then_some(value);
        upsert_row(&mut self.attrs, name, value);
    }

    /// Set one style row; a `Null` value removes it.
    pub fn set_style(&mut self, name: &str, style: StyleValue) {
        let style = (!style.value.is_null()).then_some(style);
        upsert_row(&mut self.styles, name, style);
    }

    /// Set one property row; `Null` removes it.
    pub fn set_property(&mut self, name: &str, value: Value) {
        let value = (!value.is_null()).then_some(value);
        upsert_row(&mut self.properties, name, value);
    }

    /// Bind or (with `None`) unbind one event handler.
    pub fn set_event(&mut self, name: &str, handler: Option<Handler>) {
        upsert_row(&mut self.events, name, handler);
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<&str> = Vec::new();
        for (name, set) in [
            ("key", self.key.is_some()),
            ("join", self.join.is_some()),
            ("each", self.each.is_some()),
            ("call", self.call.is_some()),
            ("own_each", self.own_each.is_some()),
            ("own_call", self.own_call.is_some()),
            ("on_enter", self.on_enter.is_some()),
            ("on_update", self.on_update.is_some()),
        ] {
            if set {
                hooks.push(name);
            }
        }
        f.debug_struct("Props")
            .field("tag", &self.tag)
            .field("ns", &self.ns)
            .field("selector", &self.selector)
            .field("text", &self.text)
            .field("attrs", &self.attrs)
            .field("styles", &self.styles)
            .field("properties", &self.properties)
            .field("events", &self.events.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("transitions", &self.transitions)
            .field("invocations", &self.invocations)
            .field("hooks", &hooks)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Children of a record: nested records or literal leaves.
#[derive(Debug, Clone)]
pub enum Children {
    Records(Vec<Record>),
    Literals(Vec<Value>),
}

impl Default for Children {
    fn default() -> Self {
        Self::Records(Vec::new())
    }
}

impl Children {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Records(r) => r.len(),
            Self::Literals(l) => l.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Record>> for Children {
    fn from(records: Vec<Record>) -> Self {
        Self::Records(records)
    }
}

impl From<Vec<Value>> for Children {
    fn from(values: Vec<Value>) -> Self {
        Self::Literals(values)
    }
}

/// Declarative description of one node and its subtree.
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub props: Props,
    pub children: Children,
}

impl Record {
    /// A record producing an element named `tag` (optionally `prefix:name`).
    pub fn new(tag: impl Into<String>) -> Self {
        let mut record = Self::default();
        record.props.tag = Some(tag.into());
        record
    }

    /// A tagless record producing a text node.
    pub fn text_node(text: impl Into<String>) -> Self {
        let mut record = Self::default();
        record.props.text = Some(text.into());
        record
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.props.tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn ns(mut self, ns: impl Into<String>) -> Self {
        self.props.ns = Some(ns.into());
        self
    }

    #[must_use]
    pub fn selector(mut self, selector: Selector) -> Self {
        self.props.selector = Some(selector);
        self
    }

    #[must_use]
    pub fn key(mut self, f: impl Fn(Item<'_>, usize) -> String + 'static) -> Self {
        self.props.key = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn join(mut self, hooks: JoinHooks) -> Self {
        self.props.join = Some(hooks);
        self
    }

    #[must_use]
    pub fn each(mut self, f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static) -> Self {
        self.props.each = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn call(mut self, f: impl Fn(&mut SelectionCx<'_>) -> CallbackResult + 'static) -> Self {
        self.props.call = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn own_each(mut self, f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static) -> Self {
        self.props.own_each = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn own_call(mut self, f: impl Fn(&mut SelectionCx<'_>) -> CallbackResult + 'static) -> Self {
        self.props.own_call = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_enter(mut self, f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static) -> Self {
        self.props.on_enter = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn on_update(mut self, f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static) -> Self {
        self.props.on_update = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.props.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        upsert_row(&mut self.props.attrs, name, Some(value.into()));
        self
    }

    #[must_use]
    pub fn style(mut self, name: &str, value: impl Into<StyleValue>) -> Self {
        upsert_row(&mut self.props.styles, name, Some(value.into()));
        self
    }

    #[must_use]
    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        upsert_row(&mut self.props.properties, name, Some(value.into()));
        self
    }

    #[must_use]
    pub fn on(mut self, event: &str, f: impl Fn(&mut EventCx<'_>) -> CallbackResult + 'static) -> Self {
        upsert_row(&mut self.props.events, event, Some(Rc::new(f) as Handler));
        self
    }

    #[must_use]
    pub fn transition(mut self, step: impl Into<TransitionStep>) -> Self {
        self.props.transitions.push(step.into());
        self
    }

    #[must_use]
    pub fn invoke(mut self, method: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        self.props.invocations.push(Invocation::new(method, args));
        self
    }

    /// Append a child record (switching literal children to records).
    #[must_use]
    pub fn child(mut self, child: Record) -> Self {
        match &mut self.children {
            Children::Records(records) => records.push(child),
            Children::Literals(_) => self.children = Children::Records(vec![child]),
        }
        self
    }

    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Record>) -> Self {
        self.children = Children::Records(children.into_iter().collect());
        self
    }

    #[must_use]
    pub fn literals<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.children = Children::Literals(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Build an enter hook from a closure.
pub fn enter_fn(
    f: impl Fn(&mut EnterCx<'_>) -> CallbackResult<NodeId> + 'static,
) -> crate::hooks::EnterFn {
    Rc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_fields() {
        let record = Record::new("svg:rect")
            .attr("width", 10)
            .attr("width", 12)
            .style("fill", "red")
            .style("stroke", StyleValue::important("blue"))
            .property("checked", true)
            .text("label")
            .invoke("raise", [])
            .transition(TransitionConfig::new().duration(500.0).style("width", "10px"));

        let props = &record.props;
        assert_eq!(props.tag.as_deref(), Some("svg:rect"));
        assert_eq!(props.attrs, vec![("width".to_owned(), Value::from(12))]);
        assert_eq!(props.style("stroke").map(|s| s.important), Some(true));
        assert_eq!(props.property("checked"), Some(&Value::Bool(true)));
        assert_eq!(props.invocations[0].method, "raise");
        assert!(matches!(props.transitions[0], TransitionStep::Configure(_)));
    }

    #[test]
    fn children_switch_kind() {
        let record = Record::new("ul").literals(["a", "b"]);
        assert!(matches!(record.children, Children::Literals(ref l) if l.len() == 2));
        let record = record.child(Record::new("li"));
        assert!(matches!(record.children, Children::Records(ref r) if r.len() == 1));
    }

    #[test]
    fn debug_lists_hooks_without_closures() {
        let record = Record::new("p").each(|_| Ok(())).key(|_, i| i.to_string());
        let debug = format!("{record:?}");
        assert!(debug.contains("\"each\""));
        assert!(debug.contains("\"key\""));
    }
}
