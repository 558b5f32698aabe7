#![forbid(unsafe_code)]

//! Errors surfaced by record trees and the reconciler.

use std::fmt;

use weave_dom::{CallbackError, DomError};

use crate::store::RecordId;

/// Errors from building, mutating or reconciling record trees.
#[derive(Debug, Clone, PartialEq)]
pub enum WeaveError {
    /// A value of the wrong shape was supplied (e.g. `data` assigned
    /// something other than an array).
    InvalidShape {
        expected: &'static str,
        found: String,
    },
    /// The operation is not supported on tracked trees (deletion).
    Unsupported(&'static str),
    /// A collection index lies beyond the end of the collection.
    OutOfBounds { index: usize, len: usize },
    /// The handle refers to a record that has since been replaced.
    StaleRecord(RecordId),
    /// A method invoked by name is not known to its target.
    UnknownMethod { target: &'static str, method: String },
    /// A user callback failed.
    Callback { hook: &'static str, message: String },
    /// The host document rejected an operation.
    Dom(DomError),
}

impl WeaveError {
    /// Wrap a failed user callback.
    #[must_use]
    pub fn callback(hook: &'static str, err: &CallbackError) -> Self {
        Self::Callback {
            hook,
            message: err.to_string(),
        }
    }

    pub(crate) fn shape(expected: &'static str, found: impl fmt::Display) -> Self {
        Self::InvalidShape {
            expected,
            found: found.to_string(),
        }
    }
}

impl fmt::Display for WeaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidShape { expected, found } => {
                write!(f, "invalid shape: expected {expected}, found {found}")
            }
            Self::Unsupported(op) => write!(f, "unsupported operation on tracked data: {op}"),
            Self::OutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for collection of length {len}")
            }
            Self::StaleRecord(id) => write!(f, "record {id} is no longer part of the tree"),
            Self::UnknownMethod { target, method } => {
                write!(f, "unknown {target} method '{method}'")
            }
            Self::Callback { hook, message } => write!(f, "{hook} callback failed: {message}"),
            Self::Dom(err) => write!(f, "document error: {err}"),
        }
    }
}

impl std::error::Error for WeaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dom(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DomError> for WeaveError {
    fn from(err: DomError) -> Self {
        match err {
            DomError::UnknownMethod { target, method } => Self::UnknownMethod { target, method },
            other => Self::Dom(other),
        }
    }
}
