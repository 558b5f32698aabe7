#![forbid(unsafe_code)]

//! Arena holding a flattened record tree.
//!
//! Every record placed in the store gets a generational [`RecordId`]. A
//! record's children are stored as a list of ids (or literal values), so a
//! handle to a nested record stays valid while its siblings and ancestors
//! are mutated.
//!
//! Nodes are kept behind `Rc` so readers can take a cheap snapshot and drop
//! the borrow of the store before running user code; writers go through
//! `Rc::make_mut`.
//!
//! # Invariants
//!
//! 1. A record's `index` equals its position in its parent collection. It is
//!    assigned on placement and re-stamped only by structural changes of that
//!    collection (insert, truncate, assign).
//! 2. Releasing a record releases its whole subtree and bumps the slot's
//!    generation, so stale ids never resolve.
//! 3. A collection holds either records or literals, never both.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Stale id | Record was replaced or truncated away | `None` / `WeaveError::StaleRecord` |
//! | Index past end | `set`/`insert` beyond `len` | `WeaveError::OutOfBounds` |
//! | Mixed kinds | Record written into a literal collection or vice versa | `WeaveError::InvalidShape` |

use std::fmt;
use std::rc::Rc;

use weave_dom::Value;

use crate::error::WeaveError;
use crate::record::{Children, Props, Record};

/// Generational handle to a record in a [`RecordStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    slot: u32,
    generation: u32,
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}v{}", self.slot, self.generation)
    }
}

/// The record owning a collection (or the root collection itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Owner {
    #[default]
    Root,
    Record(RecordId),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Record(id) => write!(f, "{id}"),
        }
    }
}

/// A flattened children collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildList {
    Records(Vec<RecordId>),
    Literals(Vec<Value>),
}

impl Default for ChildList {
    fn default() -> Self {
        Self::Records(Vec::new())
    }
}

impl ChildList {
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

    #[must_use]
    pub fn record(&self, index: usize) -> Option<RecordId> {
        match self {
            Self::Records(r) => r.get(index).copied(),
            Self::Literals(_) => None,
        }
    }

    #[must_use]
    pub fn literal(&self, index: usize) -> Option<&Value> {
        match self {
            Self::Records(_) => None,
            Self::Literals(l) => l.get(index),
        }
    }
}

/// A record as stored in the arena.
#[derive(Debug, Clone)]
pub struct RecordNode {
    pub props: Props,
    pub children: ChildList,
    /// Stable position in the parent collection.
    pub index: usize,
    pub parent: Owner,
}

struct Entry {
    generation: u32,
    node: Option<Rc<RecordNode>>,
}

/// Arena of records plus the root collection.
#[derive(Default)]
pub struct RecordStore {
    entries: Vec<Entry>,
    free: Vec<u32>,
    root: ChildList,
    live: usize,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("live", &self.live)
            .field("root", &self.root)
            .finish()
    }
}

impl RecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store whose root collection holds `children`.
    #[must_use]
    pub fn from_children(children: Children) -> Self {
        let mut store = Self::new();
        store.root = store.flatten(children, Owner::Root);
        store
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[must_use]
    pub fn root(&self) -> &ChildList {
        &self.root
    }

    #[must_use]
    pub fn contains(&self, id: RecordId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: RecordId) -> Option<&RecordNode> {
        let entry = self.entries.get(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.node.as_deref()
    }

    /// Cheap shared snapshot of a record.
    #[must_use]
    pub fn snapshot(&self, id: RecordId) -> Option<Rc<RecordNode>> {
        let entry = self.entries.get(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.node.clone()
    }

    /// Mutable access; clones the node first if a snapshot is outstanding.
    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut RecordNode> {
        let entry = self.entries.get_mut(id.slot as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        entry.node.as_mut().map(Rc::make_mut)
    }

    /// Like [`RecordStore::get_mut`] but failing with `StaleRecord`.
    pub fn record_mut(&mut self, id: RecordId) -> Result<&mut RecordNode, WeaveError> {
        self.get_mut(id).ok_or(WeaveError::StaleRecord(id))
    }

    /// The collection owned by `owner`.
    #[must_use]
    pub fn children(&self, owner: Owner) -> Option<&ChildList> {
        match owner {
            Owner::Root => Some(&self.root),
            Owner::Record(id) => self.get(id).map(|n| &n.children),
        }
    }

    fn children_mut(&mut self, owner: Owner) -> Result<&mut ChildList, WeaveError> {
        match owner {
            Owner::Root => Ok(&mut self.root),
            Owner::Record(id) => Ok(&mut self.record_mut(id)?.children),
        }
    }

    // ---------------------------------------------------------------------
    // Placement
    // ---------------------------------------------------------------------

    fn alloc(&mut self, node: RecordNode) -> RecordId {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.entries[slot as usize];
            entry.node = Some(Rc::new(node));
            return RecordId {
                slot,
                generation: entry.generation,
            };
        }
        let slot = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        self.entries.push(Entry {
            generation: 0,
            node: Some(Rc::new(node)),
        });
        RecordId { slot, generation: 0 }
    }

    /// Flatten `record` (and its subtree) into the arena.
    pub fn insert(&mut self, record: Record, parent: Owner, index: usize) -> RecordId {
        let Record { props, children } = record;
        let id = self.alloc(RecordNode {
            props,
            children: ChildList::default(),
            index,
            parent,
        });
        let list = self.flatten(children, Owner::Record(id));
        if let Some(node) = self.get_mut(id) {
            node.children = list;
        }
        id
    }

    fn flatten(&mut self, children: Children, owner: Owner) -> ChildList {
        match children {
            Children::Records(records) => ChildList::Records(
                records
                    .into_iter()
                    .enumerate()
                    .map(|(i, r)| self.insert(r, owner, i))
                    .collect(),
            ),
            Children::Literals(values) => ChildList::Literals(values),
        }
    }

    /// Drop a record and its subtree.
    pub fn release(&mut self, id: RecordId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(entry) = self.entries.get_mut(id.slot as usize) else {
                continue;
            };
            if entry.generation != id.generation {
                continue;
            }
            let Some(node) = entry.node.take() else {
                continue;
            };
            entry.generation = entry.generation.wrapping_add(1);
            self.free.push(id.slot);
            self.live -= 1;
            if let ChildList::Records(children) = &node.children {
                stack.extend(children.iter().copied());
            }
        }
    }

    fn restamp(&mut self, ids: &[RecordId], from: usize) {
        for (i, id) in ids.iter().enumerate().skip(from) {
            if let Some(node) = self.get_mut(*id) {
                node.index = i;
            }
        }
    }

    // ---------------------------------------------------------------------
    // Collection writes
    // ---------------------------------------------------------------------

    /// Put `record` at `index` of the collection (appending when `index ==
    /// len`). Returns the new id; the previous occupant is released.
    pub fn set_record(&mut self, owner: Owner, index: usize, record: Record) -> Result<RecordId, WeaveError> {
        let list = self.children_mut(owner)?;
        let ChildList::Records(ids) = list else {
            return Err(WeaveError::shape("literal value", "a record"));
        };
        let len = ids.len();
        if index > len {
            return Err(WeaveError::OutOfBounds { index, len });
        }
        let old = ids.get(index).copied();
        let id = self.insert(record, owner, index);
        if let ChildList::Records(ids) = self.children_mut(owner)? {
            if index == ids.len() {
                ids.push(id);
            } else {
                ids[index] = id;
            }
        }
        if let Some(old) = old {
            self.release(old);
        }
        Ok(id)
    }

    /// Put a literal at `index` (appending when `index == len`).
    pub fn set_literal(&mut self, owner: Owner, index: usize, value: Value) -> Result<(), WeaveError> {
        let list = self.children_mut(owner)?;
        let ChildList::Literals(values) = list else {
            return Err(WeaveError::shape("record", value.render()));
        };
        let len = values.len();
        match index {
            i if i < len => values[i] = value,
            i if i == len => values.push(value),
            _ => return Err(WeaveError::OutOfBounds { index, len }),
        }
        Ok(())
    }

    /// Insert a record at `index`, shifting later records and re-stamping
    /// their indices.
    pub fn insert_record(
        &mut self,
        owner: Owner,
        index: usize,
        record: Record,
    ) -> Result<RecordId, WeaveError> {
        let len = match self.children_mut(owner)? {
            ChildList::Records(ids) => ids.len(),
            ChildList::Literals(_) => return Err(WeaveError::shape("literal value", "a record")),
        };
        if index > len {
            return Err(WeaveError::OutOfBounds { index, len });
        }
        let id = self.insert(record, owner, index);
        let ids = match self.children_mut(owner)? {
            ChildList::Records(ids) => {
                ids.insert(index, id);
                ids.clone()
            }
            ChildList::Literals(_) => Vec::new(),
        };
        self.restamp(&ids, index + 1);
        Ok(id)
    }

    /// Insert a literal at `index`, shifting later literals.
    pub fn insert_literal(&mut self, owner: Owner, index: usize, value: Value) -> Result<(), WeaveError> {
        let list = self.children_mut(owner)?;
        let ChildList::Literals(values) = list else {
            return Err(WeaveError::shape("record", value.render()));
        };
        if index > values.len() {
            return Err(WeaveError::OutOfBounds {
                index,
                len: values.len(),
            });
        }
        values.insert(index, value);
        Ok(())
    }

    /// Shorten the collection to `len`, releasing dropped records.
    pub fn truncate(&mut self, owner: Owner, len: usize) -> Result<(), WeaveError> {
        let dropped = match self.children_mut(owner)? {
            ChildList::Records(ids) if len < ids.len() => ids.split_off(len),
            ChildList::Records(_) => Vec::new(),
            ChildList::Literals(values) => {
                values.truncate(len);
                Vec::new()
            }
        };
        for id in dropped {
            self.release(id);
        }
        Ok(())
    }

    /// Replace the whole collection, releasing the previous records.
    pub fn assign(&mut self, owner: Owner, children: Children) -> Result<(), WeaveError> {
        if let Owner::Record(id) = owner
            && !self.contains(id)
        {
            return Err(WeaveError::StaleRecord(id));
        }
        let fresh = self.flatten(children, owner);
        let old = std::mem::replace(self.children_mut(owner)?, fresh);
        if let ChildList::Records(ids) = old {
            for id in ids {
                self.release(id);
            }
        }
        Ok(())
    }
}
