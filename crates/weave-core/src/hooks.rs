#![forbid(unsafe_code)]

//! Callback types attached to records.
//!
//! Hooks receive the document mutably and a read-only snapshot of the datum
//! bound to the node. A hook that wants to change data captures a handle to
//! the tracked tree; such writes land in the next pass.
//!
//! Every hook returns a [`CallbackResult`]. Errors never abort a pass: the
//! reconciler logs them and moves on to the next node.

use std::fmt;
use std::rc::Rc;

use weave_dom::{CallbackResult, Document, NodeId, Value};

use crate::store::{RecordId, RecordNode};

/// The datum a node is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Record(RecordId),
    Literal(Value),
}

impl Datum {
    #[must_use]
    pub fn record(&self) -> Option<RecordId> {
        match self {
            Self::Record(id) => Some(*id),
            Self::Literal(_) => None,
        }
    }
}

/// Borrowed view of one data item, passed to key functions.
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Record(&'a RecordNode),
    Literal(&'a Value),
}

/// Context for per-node hooks (`each`, `own_each`, `on_enter`, `on_update`).
pub struct NodeCx<'a> {
    pub doc: &'a mut Document,
    pub node: NodeId,
    /// Position of the datum in its collection.
    pub index: usize,
    pub datum: &'a Datum,
    /// Snapshot of the record, absent for literal data.
    pub record: Option<&'a RecordNode>,
}

/// Context for hooks that act on a whole selection (`call`, join update and
/// exit).
pub struct SelectionCx<'a> {
    pub doc: &'a mut Document,
    /// The scope root whose children were joined.
    pub parent: NodeId,
    pub nodes: &'a [NodeId],
}

/// Context for a custom enter hook. The hook creates a detached node and
/// returns it; the reconciler inserts it at the right position.
pub struct EnterCx<'a> {
    pub doc: &'a mut Document,
    pub parent: NodeId,
    pub index: usize,
    pub datum: &'a Datum,
    pub record: Option<&'a RecordNode>,
    /// Namespace prefix inherited from the enclosing scope.
    pub ns: Option<&'a str>,
}

/// Per-node hook.
pub type NodeHook = Rc<dyn Fn(&mut NodeCx<'_>) -> CallbackResult>;

/// Selection-wide hook.
pub type CallFn = Rc<dyn Fn(&mut SelectionCx<'_>) -> CallbackResult>;

/// Custom node creation.
pub type EnterFn = Rc<dyn Fn(&mut EnterCx<'_>) -> CallbackResult<NodeId>>;

/// Key function used to match nodes against data. Receives the item and its
/// index in the collection.
pub type KeyFn = Rc<dyn Fn(Item<'_>, usize) -> String>;

/// Overrides for the enter/update/exit phases of a data join.
///
/// Unset phases use the defaults: enter creates a node from the datum,
/// update does nothing, exit discards the node.
#[derive(Clone, Default)]
pub struct JoinHooks {
    pub enter: Option<EnterFn>,
    pub update: Option<CallFn>,
    pub exit: Option<CallFn>,
}

impl JoinHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_enter(
        mut self,
        f: impl Fn(&mut EnterCx<'_>) -> CallbackResult<NodeId> + 'static,
    ) -> Self {
        self.enter = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_update(mut self, f: impl Fn(&mut SelectionCx<'_>) -> CallbackResult + 'static) -> Self {
        self.update = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_exit(mut self, f: impl Fn(&mut SelectionCx<'_>) -> CallbackResult + 'static) -> Self {
        self.exit = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for JoinHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHooks")
            .field("enter", &self.enter.is_some())
            .field("update", &self.update.is_some())
            .field("exit", &self.exit.is_some())
            .finish()
    }
}

/// Wrap a closure as a [`NodeHook`].
pub fn node_hook(f: impl Fn(&mut NodeCx<'_>) -> CallbackResult + 'static) -> NodeHook {
    Rc::new(f)
}

/// Wrap a closure as a [`CallFn`].
pub fn call_fn(f: impl Fn(&mut SelectionCx<'_>) -> CallbackResult + 'static) -> CallFn {
    Rc::new(f)
}

/// Wrap a closure as a [`KeyFn`].
pub fn key_fn(f: impl Fn(Item<'_>, usize) -> String + 'static) -> KeyFn {
    Rc::new(f)
}
