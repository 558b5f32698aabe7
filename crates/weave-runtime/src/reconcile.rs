#![forbid(unsafe_code)]

//! Changelog replay against a document.
//!
//! A pass walks one scope (a parent node plus the collection of records or
//! literals it renders):
//!
//! 1. Join the selected children of the parent against the collection
//!    (by key when a key function is in scope, otherwise by index), running
//!    enter, update and exit.
//! 2. Replay the changes grouped for each index onto the matched node.
//!    Batches addressing a node's children recurse into a nested scope.
//! 3. Run the per-node hooks, then the scope's `call` hook once.
//!
//! Without a changelog a pass is a full rebuild: joins and hooks run and
//! newly entered record nodes are populated from their records.
//!
//! # Invariants
//!
//! 1. Every live node produced by a pass has a [`Binding`] naming the datum
//!    it is bound to.
//! 2. A write is applied only when its owner is the record currently bound
//!    to the node; anything else is discarded as stale.
//! 3. A node is populated from its record at most once per pass.
//! 4. The record store is never borrowed while user code runs.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Hook error | A user callback returned `Err` | `error!`, pass continues |
//! | Document error | e.g. unknown invocation method | `error!`, pass continues |
//! | Stale write | Owner was replaced earlier | `trace!`, skipped |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use weave_core::{
    CallFn, Change, ChangeOp, ChildList, Datum, EnterCx, Field, Item, JoinHooks, KeyFn, NodeCx,
    NodeHook, Owner, Path, Props, RecordId, RecordNode, RecordStore, SelectionCx, WeaveError,
};
use weave_dom::{
    CallbackError, CallbackResult, Document, DomError, JoinSlot, NodeId, Selector, Value, join_by_index,
    join_by_key,
};

use crate::factory;
use crate::group::{Group, Step, group};
use crate::transition::run_sequence;

static NULL: Value = Value::Null;

// ---------------------------------------------------------------------------
// Bindings
// ---------------------------------------------------------------------------

/// What a node is bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// The record the node was created from, if any.
    pub origin: Option<RecordId>,
    /// The datum currently bound.
    pub datum: Datum,
    /// Join key computed when the datum was bound.
    pub key: Option<String>,
}

/// Side table from nodes to their bindings.
#[derive(Debug, Default)]
pub struct Bindings {
    map: AHashMap<NodeId, Binding>,
}

impl Bindings {
    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&Binding> {
        self.map.get(&node)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn origin(&self, node: NodeId) -> Option<RecordId> {
        self.map.get(&node).and_then(|b| b.origin)
    }

    /// Forget which records the nodes came from, keeping their cached keys.
    ///
    /// Used when a new tree replaces the data: ids of the old tree must not
    /// be resolved against the new one.
    pub(crate) fn detach(&mut self) {
        for binding in self.map.values_mut() {
            binding.origin = None;
        }
    }

    /// Drop bindings of nodes that left the document.
    fn retain_live(&mut self, doc: &Document) {
        self.map.retain(|node, _| doc.contains(*node));
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Behavior inherited by a collection from the records above it.
#[derive(Clone, Default)]
pub struct Scope {
    /// Namespace prefix for created elements.
    pub ns: Option<String>,
    pub selector: Selector,
    pub key: Option<KeyFn>,
    pub join: Option<JoinHooks>,
    pub each: Option<NodeHook>,
    pub call: Option<CallFn>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("ns", &self.ns)
            .field("selector", &self.selector)
            .field("key", &self.key.is_some())
            .field("join", &self.join)
            .field("each", &self.each.is_some())
            .field("call", &self.call.is_some())
            .finish()
    }
}

impl Scope {
    #[must_use]
    pub fn with_ns(mut self, ns: impl Into<String>) -> Self {
        self.ns = Some(ns.into());
        self
    }

    #[must_use]
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn with_key(mut self, f: impl Fn(Item<'_>, usize) -> String + 'static) -> Self {
        self.key = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_join(mut self, hooks: JoinHooks) -> Self {
        self.join = Some(hooks);
        self
    }

    #[must_use]
    pub fn with_each(mut self, f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static) -> Self {
        self.each = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_call(
        mut self,
        f: impl Fn(&mut SelectionCx<'_>) -> CallbackResult + 'static,
    ) -> Self {
        self.call = Some(Rc::new(f));
        self
    }

    /// Scope of the children of a record with `props`.
    #[must_use]
    pub fn nested(&self, props: &Props) -> Self {
        Self {
            ns: props.ns.clone().or_else(|| self.ns.clone()),
            selector: props
                .selector
                .clone()
                .unwrap_or_else(|| self.selector.clone()),
            key: props.key.clone().or_else(|| self.key.clone()),
            join: props.join.clone().or_else(|| self.join.clone()),
            each: props.each.clone().or_else(|| self.each.clone()),
            call: props.call.clone().or_else(|| self.call.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub entered: usize,
    pub updated: usize,
    pub exited: usize,
    /// Nodes recreated because their record was replaced.
    pub replaced: usize,
    /// Nodes populated from their whole record.
    pub populated: usize,
    pub stale: usize,
    pub callback_errors: usize,
    pub failures: usize,
}

impl std::ops::AddAssign for PassStats {
    fn add_assign(&mut self, rhs: Self) {
        self.entered += rhs.entered;
        self.updated += rhs.updated;
        self.exited += rhs.exited;
        self.replaced += rhs.replaced;
        self.populated += rhs.populated;
        self.stale += rhs.stale;
        self.callback_errors += rhs.callback_errors;
        self.failures += rhs.failures;
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// One datum of a scope, snapshotted at the start of the scope.
struct Slot {
    datum: Datum,
    record: Option<Rc<RecordNode>>,
}

impl Slot {
    fn item(&self) -> Item<'_> {
        match (&self.record, &self.datum) {
            (Some(record), _) => Item::Record(record),
            (None, Datum::Literal(value)) => Item::Literal(value),
            (None, Datum::Record(_)) => Item::Literal(&NULL),
        }
    }
}

/// What replaying a group did to the node at its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replayed {
    /// Every step was stale.
    Untouched,
    /// At least one write applied and the node was kept.
    Updated,
    Replaced,
}

/// Runs one pass over a document.
pub struct Reconciler<'a> {
    doc: &'a mut Document,
    store: &'a RefCell<RecordStore>,
    bindings: &'a mut Bindings,
    populated: AHashSet<NodeId>,
    stats: PassStats,
}

impl<'a> Reconciler<'a> {
    pub fn new(doc: &'a mut Document, store: &'a RefCell<RecordStore>, bindings: &'a mut Bindings) -> Self {
        Self {
            doc,
            store,
            bindings,
            populated: AHashSet::new(),
            stats: PassStats::default(),
        }
    }

    /// Reconcile the root collection under `root`. An empty changelog runs
    /// a full rebuild.
    pub fn run(mut self, root: NodeId, scope: &Scope, changes: &[Change]) -> PassStats {
        let _span = tracing::debug_span!("reconcile_pass", %root, changes = changes.len()).entered();
        let changes = (!changes.is_empty()).then_some(changes);
        self.scope(root, Owner::Root, scope, changes);
        self.bindings.retain_live(self.doc);
        tracing::debug!(stats = ?self.stats, "pass complete");
        self.stats
    }

    // -- reporting --------------------------------------------------------

    fn callback_failed(&mut self, hook: &'static str, node: NodeId, err: &CallbackError) {
        self.stats.callback_errors += 1;
        let err = WeaveError::callback(hook, err);
        tracing::error!(hook, %node, error = %err, "callback failed");
    }

    fn failed(&mut self, node: NodeId, err: impl Into<WeaveError>) {
        self.stats.failures += 1;
        let err = err.into();
        tracing::error!(%node, error = %err, "reconcile step failed");
    }

    fn stale(&mut self, node: NodeId, owner: Owner, what: &str) {
        self.stats.stale += 1;
        tracing::trace!(%node, %owner, what, "discarding stale write");
    }

    // -- hooks ------------------------------------------------------------

    fn node_hook(
        &mut self,
        name: &'static str,
        hook: &NodeHook,
        node: NodeId,
        index: usize,
        datum: &Datum,
        record: Option<&RecordNode>,
    ) {
        let mut cx = NodeCx {
            doc: &mut *self.doc,
            node,
            index,
            datum,
            record,
        };
        if let Err(err) = hook(&mut cx) {
            self.callback_failed(name, node, &err);
        }
    }

    fn selection_hook(&mut self, name: &'static str, hook: &CallFn, parent: NodeId, nodes: &[NodeId]) {
        let mut cx = SelectionCx {
            doc: &mut *self.doc,
            parent,
            nodes,
        };
        if let Err(err) = hook(&mut cx) {
            self.callback_failed(name, parent, &err);
        }
    }

    // -- scope ------------------------------------------------------------

    fn snapshot_data(&self, owner: Owner) -> Option<Vec<Slot>> {
        let store = self.store.borrow();
        Some(match store.children(owner)? {
            ChildList::Records(ids) => ids
                .iter()
                .map(|id| Slot {
                    datum: Datum::Record(*id),
                    record: store.snapshot(*id),
                })
                .collect(),
            ChildList::Literals(values) => values
                .iter()
                .map(|v| Slot {
                    datum: Datum::Literal(v.clone()),
                    record: None,
                })
                .collect(),
        })
    }

    /// Key of an already bound node, computed from its current datum when
    /// that still exists and from the cached key otherwise.
    fn node_key(&self, key: &KeyFn, node: NodeId, index: usize) -> Option<String> {
        let binding = self.bindings.get(node)?;
        match &binding.datum {
            Datum::Record(_) if binding.origin.is_none() => binding.key.clone(),
            Datum::Record(id) => {
                let snapshot = self.store.borrow().snapshot(*id);
                match snapshot {
                    Some(record) => Some(key(Item::Record(&record), index)),
                    None => binding.key.clone(),
                }
            }
            Datum::Literal(value) => Some(key(Item::Literal(value), index)),
        }
    }

    fn scope(&mut self, parent: NodeId, owner: Owner, scope: &Scope, changes: Option<&[Change]>) {
        let _span = tracing::debug_span!("scope", %parent, %owner).entered();
        let Some(data) = self.snapshot_data(owner) else {
            tracing::trace!(%owner, "scope owner released");
            return;
        };

        // 1. join
        let nodes = self.doc.select_all(parent, &scope.selector);
        let data_keys: Option<Vec<String>> = scope
            .key
            .as_ref()
            .map(|key| data.iter().enumerate().map(|(i, s)| key(s.item(), i)).collect());
        let plan = match (&scope.key, &data_keys) {
            (Some(key), Some(data_keys)) => {
                let node_keys: Vec<(NodeId, Option<String>)> = nodes
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (*n, self.node_key(key, *n, i)))
                    .collect();
                join_by_key(&node_keys, data_keys)
            }
            _ => join_by_index(&nodes, data.len()),
        };
        let key_at = |i: usize| data_keys.as_ref().and_then(|k| k.get(i).cloned());

        let mut selection: Vec<Option<NodeId>> = plan.slots.iter().map(|s| s.node()).collect();
        let mut entered: AHashSet<NodeId> = AHashSet::new();
        let enter_indices: Vec<usize> = plan.enter_indices().collect();
        for i in enter_indices {
            let slot = &data[i];
            let Some(node) = self.enter(parent, i, slot, scope) else {
                continue;
            };
            self.bindings.map.insert(
                node,
                Binding {
                    origin: slot.datum.record(),
                    datum: slot.datum.clone(),
                    key: key_at(i),
                },
            );
            if let Some(hook) = slot.record.as_ref().and_then(|r| r.props.on_enter.clone()) {
                self.node_hook("on_enter", &hook, node, i, &slot.datum, slot.record.as_deref());
            }
            if let Err(err) = self.doc.insert_before(parent, node, plan.next_update_after(i)) {
                self.failed(node, err);
            }
            selection[i] = Some(node);
            entered.insert(node);
        }

        let mut updated = Vec::new();
        for (i, slot) in plan.slots.iter().enumerate() {
            let JoinSlot::Update(node) = *slot else {
                continue;
            };
            self.rebind(node, &data[i], key_at(i));
            updated.push(node);
        }
        self.stats.updated += updated.len();
        if !updated.is_empty()
            && let Some(hook) = scope.join.as_ref().and_then(|j| j.update.clone())
        {
            self.selection_hook("join update", &hook, parent, &updated);
        }

        if !plan.exit.is_empty() {
            self.stats.exited += plan.exit.len();
            match scope.join.as_ref().and_then(|j| j.exit.clone()) {
                Some(hook) => self.selection_hook("join exit", &hook, parent, &plan.exit),
                None => {
                    for node in &plan.exit {
                        if let Err(err) = self.doc.discard(*node) {
                            self.failed(*node, err);
                        }
                    }
                }
            }
            for node in &plan.exit {
                self.bindings.map.remove(node);
            }
        }

        let ordered: Vec<NodeId> = selection.iter().flatten().copied().collect();
        if let Err(err) = self.doc.order(&ordered) {
            self.failed(parent, err);
        }

        // 2. replay
        let mut updated_only: AHashSet<NodeId> = AHashSet::new();
        if let Some(changes) = changes {
            let grouped = group(changes);
            for index in grouped.indices() {
                let (Some(Some(node)), Some(group)) = (selection.get(index).copied(), grouped.get(index))
                else {
                    tracing::trace!(index, "no node for changes");
                    continue;
                };
                let (node, replayed) = self.replay(node, index, &data[index], group, scope);
                selection[index] = Some(node);
                if replayed == Replayed::Updated {
                    updated_only.insert(node);
                }
            }
        }

        for (i, node) in selection.iter().enumerate() {
            if let (Some(node), Some(record)) = (node, &data[i].record)
                && entered.contains(node)
                && !self.populated.contains(node)
                && let Datum::Record(id) = data[i].datum
            {
                self.apply_full(*node, id, record, scope);
            }
        }

        // 3. hooks
        for (i, node) in selection.iter().enumerate() {
            let Some(node) = *node else {
                continue;
            };
            let slot = &data[i];
            let record = slot.record.as_deref();
            if let Some(hook) = record.and_then(|r| r.props.own_each.clone()) {
                self.node_hook("own_each", &hook, node, i, &slot.datum, record);
            }
            if updated_only.contains(&node)
                && let Some(hook) = record.and_then(|r| r.props.on_update.clone())
            {
                self.node_hook("on_update", &hook, node, i, &slot.datum, record);
            }
            if let Some(hook) = record.and_then(|r| r.props.own_call.clone()) {
                self.selection_hook("own_call", &hook, parent, &[node]);
            }
            if let Some(hook) = &scope.each {
                self.node_hook("each", hook, node, i, &slot.datum, record);
            }
        }
        if let Some(hook) = &scope.call {
            let nodes: Vec<NodeId> = selection.iter().flatten().copied().collect();
            self.selection_hook("call", hook, parent, &nodes);
        }
    }

    fn enter(&mut self, parent: NodeId, index: usize, slot: &Slot, scope: &Scope) -> Option<NodeId> {
        let record = slot.record.as_deref();
        let created = match scope.join.as_ref().and_then(|j| j.enter.clone()) {
            Some(hook) => {
                let mut cx = EnterCx {
                    doc: &mut *self.doc,
                    parent,
                    index,
                    datum: &slot.datum,
                    record,
                    ns: scope.ns.as_deref(),
                };
                match hook(&mut cx) {
                    Ok(node) => Some(node),
                    Err(err) => {
                        self.callback_failed("join enter", parent, &err);
                        None
                    }
                }
            }
            None => match factory::create_node(self.doc, &slot.datum, record, scope.ns.as_deref()) {
                Ok(node) => Some(node),
                Err(err) => {
                    self.failed(parent, err);
                    None
                }
            },
        };
        if created.is_some() {
            self.stats.entered += 1;
        }
        created
    }

    fn rebind(&mut self, node: NodeId, slot: &Slot, key: Option<String>) {
        let origin = self.bindings.origin(node);
        let previous = self.bindings.map.insert(
            node,
            Binding {
                origin,
                datum: slot.datum.clone(),
                key,
            },
        );
        if let Datum::Literal(value) = &slot.datum
            && previous.is_none_or(|b| b.datum != slot.datum)
            && let Err(err) = self.doc.set_text(node, &value.render())
        {
            self.failed(node, err);
        }
    }

    // -- replay -----------------------------------------------------------

    /// Replay one group. Returns the node now standing at the index and
    /// what reached it.
    fn replay(&mut self, mut node: NodeId, index: usize, slot: &Slot, group: &Group, scope: &Scope) -> (NodeId, Replayed) {
        let mut replaced = false;
        let mut applied = false;
        let bound = slot.datum.record();
        for step in &group.steps {
            match step {
                Step::Replace { record } => {
                    let snapshot = self.store.borrow().snapshot(*record);
                    let (true, Some(snapshot)) = (bound == Some(*record), snapshot) else {
                        self.stale(node, Owner::Record(*record), "replace");
                        continue;
                    };
                    if scope.key.is_none() && self.bindings.origin(node) != Some(*record) {
                        node = self.recreate(node, index, *record, &snapshot, scope);
                    }
                    replaced = true;
                    if !self.populated.contains(&node) {
                        self.apply_full(node, *record, &snapshot, scope);
                    }
                }
                Step::Field { owner, field } => {
                    let snapshot = self.store.borrow().snapshot(*owner);
                    let (true, Some(snapshot)) = (bound == Some(*owner), snapshot) else {
                        self.stale(node, Owner::Record(*owner), field.name());
                        continue;
                    };
                    self.apply_field(node, &snapshot, field);
                    applied = true;
                }
                Step::Nested(run) => {
                    let Some(id) = bound else {
                        continue;
                    };
                    let snapshot = self.store.borrow().snapshot(id);
                    let Some(snapshot) = snapshot else {
                        continue;
                    };
                    let mut live: Vec<Change> = Vec::with_capacity(run.len());
                    for change in run {
                        if change.path.is_empty() && change.owner != Owner::Record(id) {
                            self.stale(node, change.owner, "children");
                        } else {
                            live.push(change.clone());
                        }
                    }
                    applied |= !live.is_empty();
                    let nested = scope.nested(&snapshot.props);
                    self.scope(node, Owner::Record(id), &nested, Some(&live));
                }
            }
        }
        let replayed = match (replaced, applied) {
            (true, _) => Replayed::Replaced,
            (false, true) => Replayed::Updated,
            (false, false) => Replayed::Untouched,
        };
        (node, replayed)
    }

    /// Build a fresh node for `record` and put it where `old` stands.
    fn recreate(&mut self, old: NodeId, index: usize, id: RecordId, record: &RecordNode, scope: &Scope) -> NodeId {
        let datum = Datum::Record(id);
        let node = match factory::create_node(self.doc, &datum, Some(record), scope.ns.as_deref()) {
            Ok(node) => node,
            Err(err) => {
                self.failed(old, err);
                return old;
            }
        };
        let key = self.bindings.get(old).and_then(|b| b.key.clone());
        self.bindings.map.insert(
            node,
            Binding {
                origin: Some(id),
                datum: datum.clone(),
                key,
            },
        );
        if let Some(hook) = &record.props.on_enter {
            self.node_hook("on_enter", hook, node, index, &datum, Some(record));
        }
        if let Err(err) = self.doc.replace_with(old, node) {
            self.failed(old, err);
        }
        if let Err(err) = self.doc.discard(old) {
            self.failed(old, err);
        }
        self.bindings.map.remove(&old);
        self.stats.replaced += 1;
        tracing::trace!(%old, %node, record = %id, "node recreated");
        node
    }

    /// Apply every field of `record` to `node` and build its children.
    fn apply_full(&mut self, node: NodeId, id: RecordId, record: &RecordNode, scope: &Scope) {
        self.populated.insert(node);
        self.stats.populated += 1;
        let props = &record.props;
        let mut result: Result<(), DomError> = Ok(());
        for (name, value) in &props.attrs {
            result = result.and_then(|()| self.doc.set_attr(node, name, value));
        }
        for (name, value) in &props.properties {
            result = result.and_then(|()| self.doc.set_property(node, name, value.clone()));
        }
        for (name, style) in &props.styles {
            result = result.and_then(|()| self.doc.set_style(node, name, &style.value, style.important));
        }
        for (name, handler) in &props.events {
            result = result.and_then(|()| self.doc.on(node, name, Some(Rc::clone(handler))));
        }
        if let Some(text) = &props.text {
            result = result.and_then(|()| self.doc.set_text(node, text));
        }
        if let Err(err) = result {
            self.failed(node, err);
        }
        if !props.transitions.is_empty() {
            self.apply_field(node, record, &Field::Transitions);
        }
        if !props.invocations.is_empty() {
            self.apply_field(node, record, &Field::Invocations);
        }
        if !record.children.is_empty() {
            let changes: Vec<Change> = match &record.children {
                ChildList::Records(ids) => ids
                    .iter()
                    .enumerate()
                    .map(|(index, child)| {
                        Change::collection(
                            Path::new(),
                            Owner::Record(id),
                            ChangeOp::Replace {
                                index,
                                record: *child,
                            },
                        )
                    })
                    .collect(),
                ChildList::Literals(_) => Vec::new(),
            };
            let nested = scope.nested(props);
            self.scope(node, Owner::Record(id), &nested, Some(&changes));
        }
    }

    /// Apply one field write, reading the current value from `record`.
    fn apply_field(&mut self, node: NodeId, record: &RecordNode, field: &Field) {
        let props = &record.props;
        let doc = &mut *self.doc;
        let result: Result<(), DomError> = match field {
            Field::Text => doc.set_text(node, props.text.as_deref().unwrap_or_default()),
            Field::Attr(name) => doc.set_attr(node, name, props.attr(name).unwrap_or(&NULL)),
            Field::Attrs { removed } => removed
                .iter()
                .try_for_each(|name| doc.set_attr(node, name, &NULL))
                .and_then(|()| {
                    props
                        .attrs
                        .iter()
                        .try_for_each(|(name, value)| doc.set_attr(node, name, value))
                }),
            Field::Style(name) => match props.style(name) {
                Some(style) => doc.set_style(node, name, &style.value, style.important),
                None => doc.set_style(node, name, &NULL, false),
            },
            Field::Styles { removed } => removed
                .iter()
                .try_for_each(|name| doc.set_style(node, name, &NULL, false))
                .and_then(|()| {
                    props
                        .styles
                        .iter()
                        .try_for_each(|(name, s)| doc.set_style(node, name, &s.value, s.important))
                }),
            Field::Property(name) => {
                doc.set_property(node, name, props.property(name).cloned().unwrap_or_default())
            }
            Field::Properties { removed } => removed
                .iter()
                .try_for_each(|name| doc.set_property(node, name, Value::Null))
                .and_then(|()| {
                    props
                        .properties
                        .iter()
                        .try_for_each(|(name, value)| doc.set_property(node, name, value.clone()))
                }),
            Field::Event(name) => doc.on(node, name, props.event(name).cloned()),
            Field::Events { removed } => removed
                .iter()
                .try_for_each(|name| doc.on(node, name, None))
                .and_then(|()| {
                    props
                        .events
                        .iter()
                        .try_for_each(|(name, h)| doc.on(node, name, Some(Rc::clone(h))))
                }),
            Field::Transitions => run_sequence(doc, node, &props.transitions).map(drop),
            Field::Invocations => {
                let mut result = Ok(());
                for call in &props.invocations {
                    if let Err(err) = doc.invoke(node, &call.method, &call.args) {
                        result = Err(err);
                        break;
                    }
                }
                result
            }
            Field::Config(config) => {
                tracing::trace!(%node, ?config, "config write has no direct effect");
                Ok(())
            }
        };
        if let Err(err) = result {
            self.failed(node, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::{Children, Record};

    fn pass(doc: &mut Document, root: NodeId, store: &RefCell<RecordStore>, bindings: &mut Bindings, changes: &[Change]) -> PassStats {
        Reconciler::new(doc, store, bindings).run(root, &Scope::default(), changes)
    }

    fn placed(store: &RecordStore) -> Vec<Change> {
        match store.root() {
            ChildList::Records(ids) => ids
                .iter()
                .enumerate()
                .map(|(index, id)| Change::collection(Path::new(), Owner::Root, ChangeOp::Replace { index, record: *id }))
                .collect(),
            ChildList::Literals(_) => Vec::new(),
        }
    }

    #[test]
    fn initial_pass_builds_tree() {
        let store = RefCell::new(RecordStore::from_children(Children::Records(vec![
            Record::new("p").text("a").attr("class", "x"),
            Record::new("ul").literals(["1", "2"]),
        ])));
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let mut bindings = Bindings::default();
        let changes = placed(&store.borrow());
        let stats = pass(&mut doc, root, &store, &mut bindings, &changes);

        let children = doc.children(root).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(doc.text_content(children[0]), "a");
        assert_eq!(doc.attr(children[0], "class"), Some("x"));
        assert_eq!(doc.text_content(children[1]), "12");
        assert_eq!(stats.entered, 4);
        assert_eq!(stats.populated, 2);
        assert_eq!(bindings.len(), 4);
    }

    #[test]
    fn full_rebuild_populates_entered_records() {
        let store = RefCell::new(RecordStore::from_children(Children::Records(vec![
            Record::new("p").text("hello"),
        ])));
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let mut bindings = Bindings::default();
        pass(&mut doc, root, &store, &mut bindings, &[]);
        assert_eq!(doc.text_content(root), "hello");
    }

    #[test]
    fn failing_hook_does_not_stop_siblings() {
        let store = RefCell::new(RecordStore::from_children(Children::Records(vec![
            Record::new("p").own_each(|_| Err("nope".into())),
            Record::new("p").text("still here"),
        ])));
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let mut bindings = Bindings::default();
        let changes = placed(&store.borrow());
        let stats = pass(&mut doc, root, &store, &mut bindings, &changes);
        assert_eq!(stats.callback_errors, 1);
        assert_eq!(doc.text_content(root), "still here");
    }

    #[test]
    fn nested_scope_inherits_namespace() {
        let store = RefCell::new(RecordStore::from_children(Children::Records(vec![
            Record::new("svg").ns("svg").literals(["t"]),
        ])));
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let mut bindings = Bindings::default();
        let changes = placed(&store.borrow());
        pass(&mut doc, root, &store, &mut bindings, &changes);
        let svg = doc.children(root)[0];
        let leaf = doc.children(svg)[0];
        assert_eq!(doc.namespace(leaf), Some(weave_dom::SVG_NS));
        assert_eq!(doc.tag_name(leaf), Some("text"));
    }

    #[test]
    fn stale_only_group_does_not_count_as_update() {
        let updates = Rc::new(std::cell::Cell::new(0));
        let seen = Rc::clone(&updates);
        let store = RefCell::new(RecordStore::from_children(Children::Records(vec![
            Record::new("p").text("a").on_update(move |_| {
                seen.set(seen.get() + 1);
                Ok(())
            }),
            Record::new("p").text("b"),
        ])));
        let mut doc = Document::new();
        let root = doc.create_element("div");
        let mut bindings = Bindings::default();
        let changes = placed(&store.borrow());
        pass(&mut doc, root, &store, &mut bindings, &changes);

        let ChildList::Records(ids) = store.borrow().root().clone() else {
            unreachable!("record collection");
        };
        let mut at_first = Path::new();
        at_first.push(0);
        let foreign = Change::field(at_first.clone(), ids[1], Field::Text);
        let stats = pass(&mut doc, root, &store, &mut bindings, &[foreign]);
        assert_eq!(stats.stale, 1);
        assert_eq!(updates.get(), 0);

        let own = Change::field(at_first, ids[0], Field::Text);
        pass(&mut doc, root, &store, &mut bindings, &[own]);
        assert_eq!(updates.get(), 1);
    }
}
