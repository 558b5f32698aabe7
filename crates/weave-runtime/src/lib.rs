#![forbid(unsafe_code)]

//! Change tracking, changelog replay and frame scheduling for Weave.
//!
//! This crate provides:
//! - [`reactive`] tracked handles over a record tree and the [`Element`]
//!   that owns one
//! - [`group`] splitting a changelog per sibling index
//! - [`reconcile`] replaying grouped changes onto a document
//! - [`scheduler`] the [`Scheduler`] seam, [`FrameLoop`] and [`Completion`]
//! - [`ElementConfig`] and, with the `tracing-json` feature, a JSON log
//!   initializer in `logging`

pub mod config;
pub mod factory;
pub mod group;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod reactive;
pub mod reconcile;
pub mod scheduler;
pub mod transition;

pub use config::ElementConfig;
pub use group::{ChangeKinds, Group, Grouped, Step, group};
pub use reactive::{
    AttributeChange, Element, PassReport, Subscription, TrackedList, TrackedRecord, Tracker,
    TransitionBuilder,
};
pub use reconcile::{Binding, Bindings, PassStats, Reconciler, Scope};
pub use scheduler::{Completion, FrameLoop, FrameReport, Scheduler, Task, TaskId};
