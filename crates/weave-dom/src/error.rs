#![forbid(unsafe_code)]

//! Error types for document and transition operations.

use std::fmt;

use crate::document::NodeId;
use crate::transition::TransitionId;

/// Boxed error returned by user callbacks (event handlers, tweens, hooks).
pub type CallbackError = Box<dyn std::error::Error>;

/// Result of a user callback.
pub type CallbackResult<T = ()> = Result<T, CallbackError>;

/// Errors from document operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The node is not (or no longer) part of the document.
    UnknownNode(NodeId),
    /// The transition has already ended, been interrupted or never existed.
    UnknownTransition(TransitionId),
    /// The node cannot have children (text nodes).
    NotAContainer(NodeId),
    /// Inserting the node would create a cycle.
    HierarchyRequest { parent: NodeId, child: NodeId },
    /// A method invoked by name is not supported by the target.
    UnknownMethod { target: &'static str, method: String },
    /// A method invoked by name received unusable arguments.
    InvalidArgument { method: String, reason: String },
    /// A selector string could not be parsed.
    InvalidSelector(String),
    /// The transition has already started and can no longer be configured.
    TooLate(TransitionId),
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNode(id) => write!(f, "unknown node {id}"),
            Self::UnknownTransition(id) => write!(f, "unknown or finished transition {id}"),
            Self::NotAContainer(id) => write!(f, "node {id} cannot contain children"),
            Self::HierarchyRequest { parent, child } => {
                write!(f, "cannot insert {child} into its own descendant {parent}")
            }
            Self::UnknownMethod { target, method } => {
                write!(f, "unknown {target} method '{method}'")
            }
            Self::InvalidArgument { method, reason } => {
                write!(f, "invalid argument for '{method}': {reason}")
            }
            Self::InvalidSelector(s) => write!(f, "invalid selector '{s}'"),
            Self::TooLate(id) => write!(f, "too late to configure {id}: already running"),
        }
    }
}

impl std::error::Error for DomError {}
