#![forbid(unsafe_code)]

//! Changelog grouping.
//!
//! A pass replays changes per node. [`group`] splits a flat changelog by the
//! top-level sibling index each entry addresses:
//!
//! | Entry | Bucket |
//! |-------|--------|
//! | empty path, `Replace { index }` | `index` |
//! | empty path, `Assign` of records | `Replace` per index, plus structural |
//! | empty path, other collection op | structural (forces a join only) |
//! | path `[i]`, field write | `i`, as a single step |
//! | path `[i, ..]`, anything else | `i`, as a nested step with `i` stripped |
//!
//! # Invariants
//!
//! 1. Capture order is preserved inside each group.
//! 2. Consecutive nested entries of one group form exactly one
//!    [`Step::Nested`]; a run ends at the first non-nested entry or at the
//!    end of the changelog.
//! 3. Every entry lands in exactly one bucket (an `Assign` lands in one per
//!    placed record and in the structural bucket).

use ahash::AHashMap;
use bitflags::bitflags;
use weave_core::{Change, ChangeOp, Field, Owner, RecordId};

bitflags! {
    /// What kinds of steps a group (or a whole changelog) contains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeKinds: u8 {
        const REPLACE = 1 << 0;
        const FIELD = 1 << 1;
        const NESTED = 1 << 2;
        const STRUCTURAL = 1 << 3;
    }
}

/// One replay step for a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The record at this index was replaced.
    Replace { record: RecordId },
    /// A field of `owner` was written.
    Field { owner: RecordId, field: Field },
    /// Changes addressing the node's children, relative to its collection.
    Nested(Vec<Change>),
}

/// Replay steps for one sibling index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub steps: Vec<Step>,
    pub kinds: ChangeKinds,
}

impl Group {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the group replaces the whole record.
    #[must_use]
    pub fn replaces(&self) -> bool {
        self.kinds.contains(ChangeKinds::REPLACE)
    }

    fn push(&mut self, step: Step) {
        self.kinds |= match &step {
            Step::Replace { .. } => ChangeKinds::REPLACE,
            Step::Field { .. } => ChangeKinds::FIELD,
            Step::Nested(_) => ChangeKinds::NESTED,
        };
        self.steps.push(step);
    }

    fn push_nested(&mut self, change: Change) {
        if let Some(Step::Nested(run)) = self.steps.last_mut() {
            run.push(change);
            return;
        }
        self.push(Step::Nested(vec![change]));
    }
}

/// A changelog split per sibling index.
#[derive(Debug, Clone, Default)]
pub struct Grouped {
    groups: AHashMap<usize, Group>,
    /// The scope's collection itself changed shape.
    pub structural: bool,
}

impl Grouped {
    /// Steps for the node at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Group> {
        self.groups.get(&index)
    }

    /// Whether nothing at all was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && !self.structural
    }

    /// Indices with at least one step, ascending.
    #[must_use]
    pub fn indices(&self) -> Vec<usize> {
        let mut out: Vec<usize> = self.groups.keys().copied().collect();
        out.sort_unstable();
        out
    }

    /// Union of every group's kinds.
    #[must_use]
    pub fn kinds(&self) -> ChangeKinds {
        let mut kinds = self
            .groups
            .values()
            .fold(ChangeKinds::empty(), |acc, g| acc | g.kinds);
        if self.structural {
            kinds |= ChangeKinds::STRUCTURAL;
        }
        kinds
    }

    fn at(&mut self, index: usize) -> &mut Group {
        self.groups.entry(index).or_default()
    }
}

/// Split a changelog by top-level sibling index.
#[must_use]
pub fn group(changes: &[Change]) -> Grouped {
    let mut out = Grouped::default();
    for change in changes {
        match (change.path.as_slice(), &change.op) {
            ([], ChangeOp::Replace { index, record }) => {
                out.at(*index).push(Step::Replace { record: *record });
            }
            ([], ChangeOp::Assign { records: Some(ids) }) => {
                out.structural = true;
                for (index, record) in ids.iter().enumerate() {
                    out.at(index).push(Step::Replace { record: *record });
                }
            }
            ([], _) => out.structural = true,
            ([index], ChangeOp::Field(field)) => {
                if let Owner::Record(owner) = change.owner {
                    out.at(*index).push(Step::Field {
                        owner,
                        field: field.clone(),
                    });
                }
            }
            ([index, ..], _) => out.at(*index).push_nested(change.strip()),
        }
    }
    out
}
