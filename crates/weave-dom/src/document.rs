#![forbid(unsafe_code)]

//! Arena-backed host document.
//!
//! A [`Document`] owns every node it ever created, addressed by [`NodeId`].
//! Nodes are either elements (optionally namespaced) or text leaves.
//! Elements carry ordered attribute and style rows, a property bag and
//! event handlers.
//!
//! # Invariants
//!
//! 1. `NodeId`s are never reused; a discarded node's id stays unknown forever.
//! 2. A node has at most one parent and appears exactly once in its parent's
//!    child list.
//! 3. Text nodes never have children.
//! 4. Setting an attribute, style or property to [`Value::Null`] removes it.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unknown node | Discarded or foreign id | `DomError::UnknownNode` / `None` |
//! | Cycle | Inserting an ancestor into a descendant | `DomError::HierarchyRequest` |
//! | Handler error | Event handler returned `Err` | Logged, remaining handlers run |

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::error::{CallbackResult, DomError};
use crate::selector::Selector;
use crate::transition::TransitionEngine;
use crate::value::Value;

/// Namespace URI for SVG elements.
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
/// Namespace URI for XHTML elements.
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const NAMESPACES: &[(&str, &str)] = &[
    ("svg", SVG_NS),
    ("xhtml", XHTML_NS),
    ("xlink", "http://www.w3.org/1999/xlink"),
    ("xml", "http://www.w3.org/XML/1998/namespace"),
    ("xmlns", "http://www.w3.org/2000/xmlns/"),
];

/// Stable identifier of a document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Event handler bound to a node.
pub type Handler = Rc<dyn Fn(&mut EventCx<'_>) -> CallbackResult>;

/// Context passed to an event handler.
pub struct EventCx<'a> {
    /// The owning document.
    pub doc: &'a mut Document,
    /// The node the event was dispatched on.
    pub node: NodeId,
    /// Event type, e.g. `"click"` or `"end"`.
    pub event: &'a str,
}

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with a local name and an optional namespace URI.
    Element {
        namespace: Option<&'static str>,
        name: String,
    },
    /// A text leaf.
    Text(String),
}

/// Split a possibly prefixed name into its namespace URI and local name.
///
/// Follows the host convention: a known prefix (`svg:rect`) resolves to its
/// URI, and a bare name that is itself a known prefix (`svg`) resolves too.
#[must_use]
pub fn resolve_name(qualified: &str) -> (Option<&'static str>, &str) {
    let (prefix, local) = match qualified.split_once(':') {
        Some((prefix, local)) if prefix != "xmlns" => (prefix, local),
        _ => (qualified, qualified),
    };
    NAMESPACES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map_or((None, qualified), |(_, uri)| (Some(*uri), local))
}

struct StyleRow {
    name: String,
    value: String,
    important: bool,
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attrs: Vec<(String, String)>,
    styles: Vec<StyleRow>,
    properties: AHashMap<String, Value>,
    events: Vec<(String, Handler)>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attrs: Vec::new(),
            styles: Vec::new(),
            properties: AHashMap::new(),
            events: Vec::new(),
        }
    }
}

/// In-memory host document.
pub struct Document {
    nodes: AHashMap<NodeId, NodeData>,
    next_id: u64,
    pub(crate) now: f64,
    pub(crate) transitions: TransitionEngine,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes.len())
            .field("now", &self.now)
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

impl Document {
    /// Create an empty document with its clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: AHashMap::new(),
            next_id: 1,
            now: 0.0,
            transitions: TransitionEngine::default(),
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, NodeData::new(kind));
        id
    }

    fn data(&self, node: NodeId) -> Result<&NodeData, DomError> {
        self.nodes.get(&node).ok_or(DomError::UnknownNode(node))
    }

    fn data_mut(&mut self, node: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes.get_mut(&node).ok_or(DomError::UnknownNode(node))
    }

    // ---------------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------------

    /// Create a detached element from a possibly prefixed name.
    pub fn create_element(&mut self, qualified: &str) -> NodeId {
        let (namespace, local) = resolve_name(qualified);
        self.alloc(NodeKind::Element {
            namespace,
            name: local.to_owned(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeKind::Text(text.into()))
    }

    /// Whether the node exists.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Number of live nodes (attached or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// The node's kind.
    #[must_use]
    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(&node).map(|n| &n.kind)
    }

    /// Local name of an element (`None` for text nodes).
    #[must_use]
    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match self.kind(node)? {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text(_) => None,
        }
    }

    /// Namespace URI of an element.
    #[must_use]
    pub fn namespace(&self, node: NodeId) -> Option<&'static str> {
        match self.kind(node)? {
            NodeKind::Element { namespace, .. } => *namespace,
            NodeKind::Text(_) => None,
        }
    }

    /// Whether the node is a text leaf.
    #[must_use]
    pub fn is_text(&self, node: NodeId) -> bool {
        matches!(self.kind(node), Some(NodeKind::Text(_)))
    }

    /// Parent of the node.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    /// All child nodes, text included, in document order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes.get(&node).map_or(&[], |n| n.children.as_slice())
    }

    /// Element children only.
    #[must_use]
    pub fn element_children(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|c| !self.is_text(*c))
            .collect()
    }

    /// The sibling following `node` in its parent.
    #[must_use]
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == node)?;
        siblings.get(pos + 1).copied()
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    #[must_use]
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(n) = cursor {
            if n == ancestor {
                return true;
            }
            cursor = self.parent(n);
        }
        false
    }

    /// Concatenated text of the node and its descendants.
    #[must_use]
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        let Some(data) = self.nodes.get(&node) else {
            return;
        };
        match &data.kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::Element { .. } => {
                for child in &data.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Tree mutation
    // ---------------------------------------------------------------------

    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get_mut(&node).and_then(|n| n.parent.take());
        if let Some(parent) = parent
            && let Some(p) = self.nodes.get_mut(&parent)
        {
            p.children.retain(|c| *c != node);
        }
    }

    /// Insert `child` into `parent` before `reference` (append when `None`
    /// or when `reference` is not a child of `parent`). Moves the child if
    /// it is already attached elsewhere.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        if matches!(self.data(parent)?.kind, NodeKind::Text(_)) {
            return Err(DomError::NotAContainer(parent));
        }
        self.data(child)?;
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        if reference == Some(child) {
            return Ok(());
        }
        self.detach(child);
        let p = self.data_mut(parent)?;
        let pos = reference
            .and_then(|r| p.children.iter().position(|c| *c == r))
            .unwrap_or(p.children.len());
        p.children.insert(pos, child);
        self.data_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Append `child` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Detach the node from its parent. The node stays alive.
    pub fn remove(&mut self, node: NodeId) -> Result<(), DomError> {
        self.data(node)?;
        self.detach(node);
        Ok(())
    }

    /// Detach the node and drop it together with its subtree. Pending and
    /// running transitions on the dropped nodes are cancelled silently.
    pub fn discard(&mut self, node: NodeId) -> Result<(), DomError> {
        self.data(node)?;
        self.detach(node);
        let mut stack: SmallVec<[NodeId; 16]> = SmallVec::new();
        stack.push(node);
        while let Some(n) = stack.pop() {
            if let Some(data) = self.nodes.remove(&n) {
                stack.extend(data.children);
                self.transitions.cancel_node(n);
            }
        }
        Ok(())
    }

    /// Put `replacement` where `old` is and detach `old`.
    pub fn replace_with(&mut self, old: NodeId, replacement: NodeId) -> Result<(), DomError> {
        self.data(old)?;
        if let Some(parent) = self.parent(old) {
            self.insert_before(parent, replacement, Some(old))?;
        }
        self.detach(old);
        Ok(())
    }

    /// Move the node to the end of its parent's child list.
    pub fn raise(&mut self, node: NodeId) -> Result<(), DomError> {
        if let Some(parent) = self.parent(node) {
            self.insert_before(parent, node, None)?;
        }
        Ok(())
    }

    /// Move the node to the start of its parent's child list.
    pub fn lower(&mut self, node: NodeId) -> Result<(), DomError> {
        if let Some(parent) = self.parent(node) {
            let first = self.children(parent).first().copied();
            self.insert_before(parent, node, first)?;
        }
        Ok(())
    }

    /// Replace the node's content with text: text leaves update in place,
    /// elements drop all children and gain a single text child (none when
    /// the text is empty).
    pub fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        if let NodeKind::Text(data) = &mut self.data_mut(node)?.kind {
            text.clone_into(data);
            return Ok(());
        }
        let children = std::mem::take(&mut self.data_mut(node)?.children);
        for child in children {
            if let Some(c) = self.nodes.get_mut(&child) {
                c.parent = None;
            }
            self.discard(child)?;
        }
        if !text.is_empty() {
            let leaf = self.create_text(text);
            self.append_child(node, leaf)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Attributes, styles, properties
    // ---------------------------------------------------------------------

    /// Attribute value.
    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(&node)?
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Names of all attributes in insertion order.
    #[must_use]
    pub fn attr_names(&self, node: NodeId) -> Vec<&str> {
        self.nodes.get(&node).map_or_else(Vec::new, |n| {
            n.attrs.iter().map(|(name, _)| name.as_str()).collect()
        })
    }

    /// Set (or with `Null`, remove) an attribute.
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &Value) -> Result<(), DomError> {
        let data = self.data_mut(node)?;
        let pos = data.attrs.iter().position(|(n, _)| n == name);
        match (pos, value) {
            (Some(i), Value::Null) => {
                data.attrs.remove(i);
            }
            (None, Value::Null) => {}
            (Some(i), v) => data.attrs[i].1 = v.render(),
            (None, v) => data.attrs.push((name.to_owned(), v.render())),
        }
        Ok(())
    }

    /// Style value.
    #[must_use]
    pub fn style(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(&node)?
            .styles
            .iter()
            .find(|row| row.name == name)
            .map(|row| row.value.as_str())
    }

    /// Whether the style row carries the `important` priority.
    #[must_use]
    pub fn style_is_important(&self, node: NodeId, name: &str) -> bool {
        self.nodes
            .get(&node)
            .and_then(|n| n.styles.iter().find(|row| row.name == name))
            .is_some_and(|row| row.important)
    }

    /// Set (or with `Null`, remove) a style row.
    pub fn set_style(
        &mut self,
        node: NodeId,
        name: &str,
        value: &Value,
        important: bool,
    ) -> Result<(), DomError> {
        let data = self.data_mut(node)?;
        let pos = data.styles.iter().position(|row| row.name == name);
        match (pos, value) {
            (Some(i), Value::Null) => {
                data.styles.remove(i);
            }
            (None, Value::Null) => {}
            (Some(i), v) => {
                data.styles[i].value = v.render();
                data.styles[i].important = important;
            }
            (None, v) => data.styles.push(StyleRow {
                name: name.to_owned(),
                value: v.render(),
                important,
            }),
        }
        Ok(())
    }

    /// Property value.
    #[must_use]
    pub fn property(&self, node: NodeId, name: &str) -> Option<&Value> {
        self.nodes.get(&node)?.properties.get(name)
    }

    /// Set (or with `Null`, remove) a property.
    pub fn set_property(&mut self, node: NodeId, name: &str, value: Value) -> Result<(), DomError> {
        let data = self.data_mut(node)?;
        if value.is_null() {
            data.properties.remove(name);
        } else {
            data.properties.insert(name.to_owned(), value);
        }
        Ok(())
    }

    /// Whether the element's `class` attribute contains `class`.
    #[must_use]
    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    /// Add or remove a class token.
    pub fn classed(&mut self, node: NodeId, class: &str, on: bool) -> Result<(), DomError> {
        let mut tokens: Vec<String> = self
            .attr(node, "class")
            .map(|c| c.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();
        tokens.retain(|t| t != class);
        if on {
            tokens.push(class.to_owned());
        }
        let value = if tokens.is_empty() {
            Value::Null
        } else {
            Value::Str(tokens.join(" "))
        };
        self.set_attr(node, "class", &value)
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    /// Bind (or with `None`, unbind) a handler. `name` may carry a
    /// `.suffix` so several handlers of one type can coexist.
    pub fn on(&mut self, node: NodeId, name: &str, handler: Option<Handler>) -> Result<(), DomError> {
        let data = self.data_mut(node)?;
        let pos = data.events.iter().position(|(n, _)| n == name);
        match (pos, handler) {
            (Some(i), None) => {
                data.events.remove(i);
            }
            (None, None) => {}
            (Some(i), Some(h)) => data.events[i].1 = h,
            (None, Some(h)) => data.events.push((name.to_owned(), h)),
        }
        Ok(())
    }

    /// Whether a handler is bound under `name`.
    #[must_use]
    pub fn has_handler(&self, node: NodeId, name: &str) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|n| n.events.iter().any(|(n, _)| n == name))
    }

    /// Dispatch an event to every handler of that type. Handler errors are
    /// logged and do not stop the remaining handlers. Returns how many
    /// handlers ran.
    pub fn dispatch(&mut self, node: NodeId, event: &str) -> Result<usize, DomError> {
        let handlers: SmallVec<[Handler; 2]> = self
            .data(node)?
            .events
            .iter()
            .filter(|(name, _)| name.split('.').next() == Some(event))
            .map(|(_, h)| Rc::clone(h))
            .collect();
        let count = handlers.len();
        for handler in handlers {
            let mut cx = EventCx {
                doc: self,
                node,
                event,
            };
            if let Err(err) = handler(&mut cx) {
                tracing::error!(%node, event, error = %err, "event handler failed");
            }
        }
        Ok(count)
    }

    /// Invoke a selection method by name on the node.
    ///
    /// Supported: `raise`, `lower`, `remove`, `click`, `dispatch(event)`,
    /// `focus`, `blur`, `classed(name, on)`, `text(value)`.
    pub fn invoke(&mut self, node: NodeId, method: &str, args: &[Value]) -> Result<(), DomError> {
        self.data(node)?;
        let arg = |i: usize| -> Result<&Value, DomError> {
            args.get(i).ok_or_else(|| DomError::InvalidArgument {
                method: method.to_owned(),
                reason: format!("missing argument {i}"),
            })
        };
        match method {
            "raise" => self.raise(node),
            "lower" => self.lower(node),
            "remove" => self.remove(node),
            "click" => self.dispatch(node, "click").map(drop),
            "dispatch" => {
                let event = arg(0)?.render();
                self.dispatch(node, &event).map(drop)
            }
            "focus" => self.set_property(node, "focused", Value::Bool(true)),
            "blur" => self.set_property(node, "focused", Value::Null),
            "classed" => {
                let class = arg(0)?.render();
                let on = !matches!(arg(1)?, Value::Bool(false) | Value::Null);
                self.classed(node, &class, on)
            }
            "text" => {
                let text = arg(0)?.render();
                self.set_text(node, &text)
            }
            _ => Err(DomError::UnknownMethod {
                target: "selection",
                method: method.to_owned(),
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Selection
    // ---------------------------------------------------------------------

    /// Nodes matched by `selector` relative to `root`, in document order.
    #[must_use]
    pub fn select_all(&self, root: NodeId, selector: &Selector) -> Vec<NodeId> {
        match selector {
            Selector::ChildNodes => self.children(root).to_vec(),
            Selector::ChildElements => self.element_children(root),
            Selector::Css(css) => {
                let mut out = Vec::new();
                if css.direct_children_only() {
                    out.extend(
                        self.children(root)
                            .iter()
                            .copied()
                            .filter(|c| css.matches(self, *c)),
                    );
                } else {
                    self.collect_descendants(root, css, &mut out);
                }
                out
            }
        }
    }

    /// First node matched by `selector`.
    #[must_use]
    pub fn select(&self, root: NodeId, selector: &Selector) -> Option<NodeId> {
        self.select_all(root, selector).into_iter().next()
    }

    fn collect_descendants(&self, node: NodeId, css: &crate::selector::Css, out: &mut Vec<NodeId>) {
        for child in self.children(node) {
            if css.matches(self, *child) {
                out.push(*child);
            }
            self.collect_descendants(*child, css, out);
        }
    }
}
