#![forbid(unsafe_code)]

//! Reactive data for Weave elements.
//!
//! - [`Tracker`], [`TrackedList`], [`TrackedRecord`]: typed handles over a
//!   record arena. Every write is captured as a [`Change`](weave_core::Change).
//! - [`Element`]: owns a tracked tree, collects its changes and replays them
//!   onto the document in scheduled passes.
//! - [`Subscription`]: RAII guard for update listeners and attribute
//!   observers.
//!
//! # Architecture
//!
//! Everything is single threaded and shared through `Rc<RefCell<..>>`.
//! Handles hold the tracker, the tracker's sink holds a `Weak` reference to
//! its element, so dropping the element silences outstanding handles.
//! Listeners are stored as `Weak` callbacks and cleaned up lazily during
//! dispatch.

pub mod binding;
pub mod tracked;

pub use binding::{AttributeChange, Element, PassReport, Subscription};
pub use tracked::{Sink, TrackedList, TrackedRecord, Tracker, TransitionBuilder};
