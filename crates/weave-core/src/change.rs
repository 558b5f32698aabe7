#![forbid(unsafe_code)]

//! Changelog entries captured by tracked trees.
//!
//! An entry names *what* was written, not the value: replay reads the
//! current value from the record, so repeated writes to one field within a
//! pass resolve to the last one.
//!
//! # Paths
//!
//! `path` holds the sibling indices leading from the scope's collection to
//! the record that owns the write. For a field write the path ends at the
//! written record; for a collection op it ends at the record owning the
//! collection, so an empty path means the root collection.

use std::fmt;

use smallvec::SmallVec;

use crate::store::{Owner, RecordId};

/// Sibling indices from a scope's collection to the owning record.
pub type Path = SmallVec<[usize; 4]>;

/// Record fields that have no direct document effect but change how the
/// record (or its children) reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigField {
    Tag,
    Ns,
    Selector,
    Key,
    Join,
    Each,
    Call,
    OwnEach,
    OwnCall,
    OnEnter,
    OnUpdate,
}

/// A write to one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Text,
    /// One attribute row.
    Attr(String),
    /// The whole attribute collection; `removed` lists rows that were
    /// present before the write and are gone after it.
    Attrs { removed: Vec<String> },
    Style(String),
    Styles { removed: Vec<String> },
    Property(String),
    Properties { removed: Vec<String> },
    Event(String),
    Events { removed: Vec<String> },
    Transitions,
    Invocations,
    Config(ConfigField),
}

impl Field {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Attr(name) | Self::Style(name) | Self::Property(name) | Self::Event(name) => name,
            Self::Attrs { .. } => "attrs",
            Self::Styles { .. } => "styles",
            Self::Properties { .. } => "properties",
            Self::Events { .. } => "events",
            Self::Transitions => "transitions",
            Self::Invocations => "invocations",
            Self::Config(_) => "config",
        }
    }
}

/// What a changelog entry did.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOp {
    /// A record was placed at `index` of the collection.
    Replace { index: usize, record: RecordId },
    /// A literal was placed at `index` of the collection.
    SetLiteral { index: usize },
    /// The collection length changed (insert or truncate).
    Resize { len: usize },
    /// The whole collection was replaced; `None` for literal children.
    Assign { records: Option<Vec<RecordId>> },
    /// Re-evaluate the collection without a change.
    Touch,
    /// A field of the owning record was written.
    Field(Field),
}

impl ChangeOp {
    /// Whether the op targets a children collection rather than a field.
    #[must_use]
    pub fn targets_collection(&self) -> bool {
        !matches!(self, Self::Field(_))
    }
}

/// One captured mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub path: Path,
    /// Record whose field or collection was written.
    pub owner: Owner,
    pub op: ChangeOp,
}

impl Change {
    /// A collection op on the collection owned by `owner`.
    #[must_use]
    pub fn collection(path: Path, owner: Owner, op: ChangeOp) -> Self {
        Self { path, owner, op }
    }

    /// A field write on `record`.
    #[must_use]
    pub fn field(path: Path, record: RecordId, field: Field) -> Self {
        Self {
            path,
            owner: Owner::Record(record),
            op: ChangeOp::Field(field),
        }
    }

    /// The same change seen from the children scope of `path[0]`.
    #[must_use]
    pub fn strip(&self) -> Self {
        Self {
            path: self.path.iter().skip(1).copied().collect(),
            owner: self.owner,
            op: self.op.clone(),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} @ {} ", self.path.as_slice(), self.owner)?;
        match &self.op {
            ChangeOp::Replace { index, record } => write!(f, "replace[{index}] = {record}"),
            ChangeOp::SetLiteral { index } => write!(f, "literal[{index}]"),
            ChangeOp::Resize { len } => write!(f, "resize({len})"),
            ChangeOp::Assign { .. } => f.write_str("assign"),
            ChangeOp::Touch => f.write_str("touch children"),
            ChangeOp::Field(field) => write!(f, "field {}", field.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn strip_drops_leading_index() {
        let change = Change::collection(smallvec![2, 0], Owner::Root, ChangeOp::Touch);
        let stripped = change.strip();
        assert_eq!(stripped.path.as_slice(), &[0]);
        assert_eq!(stripped.strip().path.as_slice(), &[] as &[usize]);
        assert!(stripped.op.targets_collection());
    }

    #[test]
    fn field_names() {
        assert_eq!(Field::Attr("href".into()).name(), "href");
        assert_eq!(Field::Styles { removed: vec![] }.name(), "styles");
        assert!(!ChangeOp::Field(Field::Text).targets_collection());
    }
}
