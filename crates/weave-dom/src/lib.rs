#![forbid(unsafe_code)]

//! In-memory host document for Weave.
//!
//! This crate provides the host side that the reconciler drives:
//! - [`Document`] an arena of elements and text nodes with attributes,
//!   styles, properties and event handlers
//! - [`Selector`] a compact CSS subset for picking join candidates
//! - [`join_by_index`] / [`join_by_key`] the enter/update/exit data join
//! - transitions with easing, chaining, tweens and lifecycle events, driven
//!   by the document clock ([`Document::advance`])

pub mod document;
pub mod ease;
pub mod error;
pub mod join;
pub mod selector;
pub mod transition;
pub mod value;

pub use document::{Document, EventCx, Handler, NodeId, NodeKind, SVG_NS, XHTML_NS, resolve_name};
pub use ease::{Ease, interpolate};
pub use error::{CallbackError, CallbackResult, DomError};
pub use join::{JoinPlan, JoinSlot, join_by_index, join_by_key};
pub use selector::{Css, Selector};
pub use transition::{Phase, TransitionDefaults, TransitionId, TransitionTiming, Tween};
pub use value::Value;
