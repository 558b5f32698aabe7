#![forbid(unsafe_code)]

//! Change-tracking handles over a record arena.
//!
//! A [`Tracker`] owns a [`RecordStore`] and a sink. Every write made through
//! a [`TrackedList`] or [`TrackedRecord`] mutates the store and then pushes
//! its changes into the sink as one batch. Reads return plain values.
//!
//! Paths are computed at write time from the stamped indices of the written
//! record and its ancestors, so handles stay valid across sibling inserts.
//!
//! # Invariants
//!
//! 1. A successful write hands the sink exactly one batch, after the store
//!    borrow is released (the sink may run a synchronous pass). Only
//!    `insert` batches more than one change.
//! 2. A failed write emits nothing and leaves the store unchanged.
//! 3. Placing a record in a collection stamps it with its index.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Stale handle | Record was replaced or truncated away | `WeaveError::StaleRecord` |
//! | Deletion | `remove`, `pop`, `delete_field` | `WeaveError::Unsupported` |
//! | Store borrowed | Write from inside a store read | panics (RefCell) |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use weave_core::{
    Change, ChangeOp, ChildList, Children, ConfigField, Field, Item, JoinHooks,
    NodeCx, Owner, Path, Record, RecordId, RecordNode, RecordStore, SelectionCx, StyleValue,
    TransitionConfig, TransitionStart, TransitionStep, WeaveError,
};
use weave_dom::{CallbackResult, EventCx, Handler, Selector, TransitionId, Value};

/// Receiver of captured changes, one non-empty batch per write.
pub type Sink = Rc<dyn Fn(Vec<Change>)>;

/// Shared state behind every handle of one tracked tree.
#[derive(Clone)]
pub struct Tracker {
    store: Rc<RefCell<RecordStore>>,
    sink: Sink,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("store", &self.store.try_borrow().map(|s| s.len()).ok())
            .finish()
    }
}

impl Tracker {
    /// Track `children` as the root collection.
    ///
    /// Placing the initial records emits one `Replace` per index; a literal
    /// root emits a single collection touch.
    pub fn new(children: Children, sink: Sink) -> Self {
        let literal = matches!(children, Children::Literals(_));
        let tracker = Self {
            store: Rc::new(RefCell::new(RecordStore::from_children(children))),
            sink,
        };
        let initial: Vec<Change> = match tracker.store.borrow().root() {
            ChildList::Records(ids) => ids
                .iter()
                .enumerate()
                .map(|(index, id)| {
                    Change::collection(
                        Path::new(),
                        Owner::Root,
                        ChangeOp::Replace { index, record: *id },
                    )
                })
                .collect(),
            ChildList::Literals(_) if literal => {
                vec![Change::collection(Path::new(), Owner::Root, ChangeOp::Touch)]
            }
            ChildList::Literals(_) => Vec::new(),
        };
        tracker.emit_all(initial);
        tracker
    }

    /// Handle to the root collection.
    #[must_use]
    pub fn root(&self) -> TrackedList {
        TrackedList {
            tracker: self.clone(),
            owner: Owner::Root,
        }
    }

    /// Handle to a record by id.
    #[must_use]
    pub fn record(&self, id: RecordId) -> TrackedRecord {
        TrackedRecord {
            tracker: self.clone(),
            id,
        }
    }

    pub(crate) fn store(&self) -> &Rc<RefCell<RecordStore>> {
        &self.store
    }

    /// Whether two handles belong to the same tree.
    #[must_use]
    pub fn same_tree(&self, other: &Tracker) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    fn emit(&self, change: Change) {
        self.emit_all(vec![change]);
    }

    fn emit_all(&self, changes: Vec<Change>) {
        if changes.is_empty() {
            return;
        }
        for change in &changes {
            tracing::trace!(%change, "captured");
        }
        (self.sink)(changes);
    }

    /// Sibling indices from the root collection to `owner`.
    fn path_to(&self, owner: Owner) -> Result<Path, WeaveError> {
        let store = self.store.borrow();
        let mut path = Path::new();
        let mut cursor = owner;
        while let Owner::Record(id) = cursor {
            let node = store.get(id).ok_or(WeaveError::StaleRecord(id))?;
            path.push(node.index);
            cursor = node.parent;
        }
        path.reverse();
        Ok(path)
    }
}

fn replace_rows<T>(slot: &mut Vec<(String, T)>, rows: Vec<(String, T)>) -> Vec<String> {
    let old = std::mem::replace(slot, rows);
    old.into_iter()
        .map(|(name, _)| name)
        .filter(|name| !slot.iter().any(|(n, _)| n == name))
        .collect()
}

fn collect_rows<K: Into<String>, V, T>(
    rows: impl IntoIterator<Item = (K, V)>,
    map: impl Fn(V) -> T,
) -> Vec<(String, T)> {
    let mut out: Vec<(String, T)> = Vec::new();
    for (name, value) in rows {
        let name = name.into();
        let value = map(value);
        match out.iter_mut().find(|(n, _)| *n == name) {
            Some(row) => row.1 = value,
            None => out.push((name, value)),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// TrackedList
// ---------------------------------------------------------------------------

/// Handle to a tracked children collection.
#[derive(Clone)]
pub struct TrackedList {
    tracker: Tracker,
    owner: Owner,
}

impl fmt::Debug for TrackedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedList")
            .field("owner", &self.owner)
            .field("len", &self.len())
            .finish()
    }
}

impl TrackedList {
    /// The record owning this collection.
    #[must_use]
    pub fn owner(&self) -> Owner {
        self.owner
    }

    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracker
            .store
            .borrow()
            .children(self.owner)
            .map_or(0, ChildList::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the collection holds literal leaves.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(
            self.tracker.store.borrow().children(self.owner),
            Some(ChildList::Literals(_))
        )
    }

    /// Handle to the record at `index`.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<TrackedRecord> {
        let id = self
            .tracker
            .store
            .borrow()
            .children(self.owner)?
            .record(index)?;
        Some(self.tracker.record(id))
    }

    /// Literal leaf at `index`.
    #[must_use]
    pub fn literal(&self, index: usize) -> Option<Value> {
        self.tracker
            .store
            .borrow()
            .children(self.owner)?
            .literal(index)
            .cloned()
    }

    /// Handles to every record in order (empty for literal collections).
    #[must_use]
    pub fn records(&self) -> Vec<TrackedRecord> {
        let ids = match self.tracker.store.borrow().children(self.owner) {
            Some(ChildList::Records(ids)) => ids.clone(),
            _ => Vec::new(),
        };
        ids.into_iter().map(|id| self.tracker.record(id)).collect()
    }

    fn emit(&self, op: ChangeOp) -> Result<(), WeaveError> {
        let path = self.tracker.path_to(self.owner)?;
        self.tracker
            .emit(Change::collection(path, self.owner, op));
        Ok(())
    }

    /// Place `record` at `index`, replacing the previous occupant (or
    /// appending when `index == len`).
    pub fn set(&self, index: usize, record: Record) -> Result<TrackedRecord, WeaveError> {
        let id = self
            .tracker
            .store
            .borrow_mut()
            .set_record(self.owner, index, record)?;
        self.emit(ChangeOp::Replace { index, record: id })?;
        Ok(self.tracker.record(id))
    }

    /// Append a record.
    pub fn push(&self, record: Record) -> Result<TrackedRecord, WeaveError> {
        self.set(self.len(), record)
    }

    /// Insert a record at `index`, shifting later records. Every shifted
    /// index is logged as a replacement, all in one batch.
    pub fn insert(&self, index: usize, record: Record) -> Result<TrackedRecord, WeaveError> {
        let id = self
            .tracker
            .store
            .borrow_mut()
            .insert_record(self.owner, index, record)?;
        let shifted: Vec<RecordId> = match self.tracker.store.borrow().children(self.owner) {
            Some(ChildList::Records(ids)) => ids.iter().skip(index).copied().collect(),
            _ => Vec::new(),
        };
        let path = self.tracker.path_to(self.owner)?;
        let batch = shifted
            .into_iter()
            .enumerate()
            .map(|(offset, record)| {
                Change::collection(
                    path.clone(),
                    self.owner,
                    ChangeOp::Replace {
                        index: index + offset,
                        record,
                    },
                )
            })
            .collect();
        self.tracker.emit_all(batch);
        Ok(self.tracker.record(id))
    }

    /// Place a literal at `index` (appending when `index == len`).
    pub fn set_literal(&self, index: usize, value: impl Into<Value>) -> Result<&Self, WeaveError> {
        self.tracker
            .store
            .borrow_mut()
            .set_literal(self.owner, index, value.into())?;
        self.emit(ChangeOp::SetLiteral { index })?;
        Ok(self)
    }

    pub fn push_literal(&self, value: impl Into<Value>) -> Result<&Self, WeaveError> {
        self.set_literal(self.len(), value)
    }

    pub fn insert_literal(&self, index: usize, value: impl Into<Value>) -> Result<&Self, WeaveError> {
        self.tracker
            .store
            .borrow_mut()
            .insert_literal(self.owner, index, value.into())?;
        let len = self.len();
        self.emit(ChangeOp::Resize { len })?;
        Ok(self)
    }

    /// Shorten the collection to `len`.
    pub fn truncate(&self, len: usize) -> Result<&Self, WeaveError> {
        self.tracker.store.borrow_mut().truncate(self.owner, len)?;
        let len = self.len();
        self.emit(ChangeOp::Resize { len })?;
        Ok(self)
    }

    /// Replace the whole collection.
    pub fn assign(&self, children: impl Into<Children>) -> Result<&Self, WeaveError> {
        self.tracker
            .store
            .borrow_mut()
            .assign(self.owner, children.into())?;
        let records = match self.tracker.store.borrow().children(self.owner) {
            Some(ChildList::Records(ids)) => Some(ids.clone()),
            _ => None,
        };
        self.emit(ChangeOp::Assign { records })?;
        Ok(self)
    }

    /// Request re-evaluation of the collection without changing it.
    pub fn touch(&self) -> Result<&Self, WeaveError> {
        self.emit(ChangeOp::Touch)?;
        Ok(self)
    }

    /// Removing elements is not supported; use `truncate` or `assign`.
    pub fn remove(&self, _index: usize) -> Result<Record, WeaveError> {
        Err(WeaveError::Unsupported("remove"))
    }

    /// Removing elements is not supported; use `truncate`.
    pub fn pop(&self) -> Result<Record, WeaveError> {
        Err(WeaveError::Unsupported("pop"))
    }
}

// ---------------------------------------------------------------------------
// TrackedRecord
// ---------------------------------------------------------------------------

/// Handle to one tracked record.
#[derive(Clone)]
pub struct TrackedRecord {
    tracker: Tracker,
    id: RecordId,
}

impl fmt::Debug for TrackedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedRecord").field("id", &self.id).finish()
    }
}

impl TrackedRecord {
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Whether the record is still part of the tree.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.tracker.store.borrow().contains(self.id)
    }

    /// Shared snapshot of the record.
    #[must_use]
    pub fn snapshot(&self) -> Option<Rc<RecordNode>> {
        self.tracker.store.borrow().snapshot(self.id)
    }

    fn read<R>(&self, f: impl FnOnce(&RecordNode) -> R) -> Option<R> {
        self.tracker.store.borrow().get(self.id).map(f)
    }

    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.read(|n| n.index)
    }

    #[must_use]
    pub fn tag(&self) -> Option<String> {
        self.read(|n| n.props.tag.clone()).flatten()
    }

    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.read(|n| n.props.text.clone()).flatten()
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<Value> {
        self.read(|n| n.props.attr(name).cloned()).flatten()
    }

    #[must_use]
    pub fn style(&self, name: &str) -> Option<StyleValue> {
        self.read(|n| n.props.style(name).cloned()).flatten()
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<Value> {
        self.read(|n| n.props.property(name).cloned()).flatten()
    }

    /// Handle to the record's children collection.
    #[must_use]
    pub fn children(&self) -> TrackedList {
        TrackedList {
            tracker: self.tracker.clone(),
            owner: Owner::Record(self.id),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut RecordNode) -> R) -> Result<R, WeaveError> {
        let mut store = self.tracker.store.borrow_mut();
        let node = store.record_mut(self.id)?;
        Ok(f(node))
    }

    fn commit(&self, field: Field) -> Result<&Self, WeaveError> {
        let path = self.tracker.path_to(Owner::Record(self.id))?;
        self.tracker.emit(Change::field(path, self.id, field));
        Ok(self)
    }

    // -- content ----------------------------------------------------------

    pub fn set_text(&self, text: impl Into<String>) -> Result<&Self, WeaveError> {
        let text = text.into();
        self.write(|n| n.props.text = Some(text))?;
        self.commit(Field::Text)
    }

    /// Set one attribute; `Value::Null` removes it.
    pub fn set_attr(&self, name: &str, value: impl Into<Value>) -> Result<&Self, WeaveError> {
        let value = value.into();
        self.write(|n| n.props.set_attr(name, value))?;
        self.commit(Field::Attr(name.to_owned()))
    }

    /// Replace every attribute row.
    pub fn set_attrs<K: Into<String>, V: Into<Value>>(
        &self,
        rows: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&Self, WeaveError> {
        let rows = collect_rows(rows, Into::into);
        let removed = self.write(|n| replace_rows(&mut n.props.attrs, rows))?;
        self.commit(Field::Attrs { removed })
    }

    /// Set one style row; a `Null` value removes it.
    pub fn set_style(&self, name: &str, value: impl Into<StyleValue>) -> Result<&Self, WeaveError> {
        let value = value.into();
        self.write(|n| n.props.set_style(name, value))?;
        self.commit(Field::Style(name.to_owned()))
    }

    pub fn set_styles<K: Into<String>, V: Into<StyleValue>>(
        &self,
        rows: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&Self, WeaveError> {
        let rows = collect_rows(rows, Into::into);
        let removed = self.write(|n| replace_rows(&mut n.props.styles, rows))?;
        self.commit(Field::Styles { removed })
    }

    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<&Self, WeaveError> {
        let value = value.into();
        self.write(|n| n.props.set_property(name, value))?;
        self.commit(Field::Property(name.to_owned()))
    }

    pub fn set_properties<K: Into<String>, V: Into<Value>>(
        &self,
        rows: impl IntoIterator<Item = (K, V)>,
    ) -> Result<&Self, WeaveError> {
        let rows = collect_rows(rows, Into::into);
        let removed = self.write(|n| replace_rows(&mut n.props.properties, rows))?;
        self.commit(Field::Properties { removed })
    }

    /// Bind an event handler.
    pub fn on(
        &self,
        event: &str,
        f: impl Fn(&mut EventCx<'_>) -> CallbackResult + 'static,
    ) -> Result<&Self, WeaveError> {
        let handler: Handler = Rc::new(f);
        self.write(|n| n.props.set_event(event, Some(handler)))?;
        self.commit(Field::Event(event.to_owned()))
    }

    /// Unbind an event handler.
    pub fn off(&self, event: &str) -> Result<&Self, WeaveError> {
        self.write(|n| n.props.set_event(event, None))?;
        self.commit(Field::Event(event.to_owned()))
    }

    pub fn set_events(&self, rows: Vec<(String, Handler)>) -> Result<&Self, WeaveError> {
        let rows = collect_rows(rows, |h| h);
        let removed = self.write(|n| replace_rows(&mut n.props.events, rows))?;
        self.commit(Field::Events { removed })
    }

    /// Invoke a named node method (`raise`, `lower`, `dispatch`, ...) on the
    /// bound node during the next pass.
    pub fn invoke(
        &self,
        method: impl Into<String>,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<&Self, WeaveError> {
        let invocation = weave_core::Invocation::new(method, args);
        self.write(|n| n.props.invocations = vec![invocation])?;
        self.commit(Field::Invocations)
    }

    // -- transitions ------------------------------------------------------

    /// Replace the transition sequence.
    pub fn set_transitions(&self, steps: Vec<TransitionStep>) -> Result<&Self, WeaveError> {
        self.write(|n| n.props.transitions = steps)?;
        self.commit(Field::Transitions)
    }

    /// Append one step; the whole sequence runs again on the next pass.
    pub fn push_transition(&self, step: impl Into<TransitionStep>) -> Result<&Self, WeaveError> {
        let step = step.into();
        self.write(|n| n.props.transitions.push(step))?;
        self.commit(Field::Transitions)
    }

    /// Start building a new transition sequence for this record.
    #[must_use]
    pub fn transition(&self) -> TransitionBuilder<'_> {
        TransitionBuilder {
            record: self,
            steps: Vec::new(),
        }
    }

    // -- config -----------------------------------------------------------

    fn config(&self, field: ConfigField, f: impl FnOnce(&mut RecordNode)) -> Result<&Self, WeaveError> {
        self.write(f)?;
        self.commit(Field::Config(field))
    }

    pub fn set_tag(&self, tag: impl Into<String>) -> Result<&Self, WeaveError> {
        let tag = tag.into();
        self.config(ConfigField::Tag, |n| n.props.tag = Some(tag))
    }

    pub fn ns(&self, ns: impl Into<String>) -> Result<&Self, WeaveError> {
        let ns = ns.into();
        self.config(ConfigField::Ns, |n| n.props.ns = Some(ns))
    }

    pub fn selector(&self, selector: Selector) -> Result<&Self, WeaveError> {
        self.config(ConfigField::Selector, |n| n.props.selector = Some(selector))
    }

    pub fn key(&self, f: impl Fn(Item<'_>, usize) -> String + 'static) -> Result<&Self, WeaveError> {
        self.config(ConfigField::Key, |n| n.props.key = Some(Rc::new(f)))
    }

    pub fn join(&self, hooks: JoinHooks) -> Result<&Self, WeaveError> {
        self.config(ConfigField::Join, |n| n.props.join = Some(hooks))
    }

    pub fn each(&self, f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static) -> Result<&Self, WeaveError> {
        self.config(ConfigField::Each, |n| n.props.each = Some(Rc::new(f)))
    }

    pub fn call(
        &self,
        f: impl Fn(&mut SelectionCx<'_>) -> CallbackResult + 'static,
    ) -> Result<&Self, WeaveError> {
        self.config(ConfigField::Call, |n| n.props.call = Some(Rc::new(f)))
    }

    pub fn own_each(
        &self,
        f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static,
    ) -> Result<&Self, WeaveError> {
        self.config(ConfigField::OwnEach, |n| n.props.own_each = Some(Rc::new(f)))
    }

    pub fn own_call(
        &self,
        f: impl Fn(&mut SelectionCx<'_>) -> CallbackResult + 'static,
    ) -> Result<&Self, WeaveError> {
        self.config(ConfigField::OwnCall, |n| n.props.own_call = Some(Rc::new(f)))
    }

    pub fn on_enter(
        &self,
        f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static,
    ) -> Result<&Self, WeaveError> {
        self.config(ConfigField::OnEnter, |n| n.props.on_enter = Some(Rc::new(f)))
    }

    pub fn on_update(
        &self,
        f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static,
    ) -> Result<&Self, WeaveError> {
        self.config(ConfigField::OnUpdate, |n| n.props.on_update = Some(Rc::new(f)))
    }

    // -- children ---------------------------------------------------------

    /// Replace the record's children.
    pub fn set_children(&self, children: impl Into<Children>) -> Result<&Self, WeaveError> {
        self.children().assign(children)?;
        Ok(self)
    }

    /// Request re-evaluation of the record's children without a change.
    pub fn touch(&self) -> Result<&Self, WeaveError> {
        self.children().touch()?;
        Ok(self)
    }

    /// Fields cannot be deleted from tracked records.
    pub fn delete_field(&self, _name: &str) -> Result<&Self, WeaveError> {
        Err(WeaveError::Unsupported("delete_field"))
    }
}

// ---------------------------------------------------------------------------
// TransitionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for a record's transition sequence.
///
/// ```ignore
/// record
///     .transition()
///     .named("grow")
///     .configure(TransitionConfig::new().duration(300.0).attr("width", 40))
///     .then(TransitionConfig::new().style("opacity", "0"))
///     .commit()?;
/// ```
#[must_use = "call commit() to store the sequence"]
pub struct TransitionBuilder<'a> {
    record: &'a TrackedRecord,
    steps: Vec<TransitionStep>,
}

impl TransitionBuilder<'_> {
    /// Start a named transition.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.steps.push(TransitionStep::named(name));
        self
    }

    /// Start an unnamed transition.
    pub fn start(mut self) -> Self {
        self.steps.push(TransitionStep::unnamed());
        self
    }

    /// Start a transition sharing timing with an existing one.
    pub fn like(mut self, id: TransitionId) -> Self {
        self.steps.push(TransitionStep::Start(TransitionStart::Like(id)));
        self
    }

    /// Configure the current transition (or start a default one).
    pub fn configure(mut self, config: TransitionConfig) -> Self {
        self.steps.push(TransitionStep::Configure(config));
        self
    }

    /// Chain a transition that starts after the previous one ends.
    pub fn then(mut self, config: TransitionConfig) -> Self {
        if !matches!(self.steps.last(), Some(TransitionStep::Configure(_))) {
            self.steps.push(TransitionStep::Configure(TransitionConfig::new()));
        }
        self.steps.push(TransitionStep::Configure(config));
        self
    }

    /// Replace the record's transition sequence with the built one.
    pub fn commit(self) -> Result<(), WeaveError> {
        self.record.set_transitions(self.steps).map(drop)
    }
}
