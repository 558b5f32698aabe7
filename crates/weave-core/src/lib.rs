#![forbid(unsafe_code)]

//! Record model and changelog types for Weave.
//!
//! This crate provides:
//! - [`Record`] the declarative, owned description of a node and its subtree
//! - [`RecordStore`] the arena a record tree is flattened into once it is
//!   tracked, addressed by generational [`RecordId`]s
//! - [`Change`] the changelog entry captured for every tracked mutation
//! - hook types ([`NodeHook`], [`CallFn`], [`KeyFn`], [`JoinHooks`])
//! - [`WeaveError`]

pub mod change;
pub mod error;
pub mod hooks;
pub mod json;
pub mod record;
pub mod store;

pub use change::{Change, ChangeOp, ConfigField, Field, Path};
pub use error::WeaveError;
pub use hooks::{
    CallFn, Datum, EnterCx, EnterFn, Item, JoinHooks, KeyFn, NodeCx, NodeHook, SelectionCx, call_fn,
    key_fn, node_hook,
};
pub use json::{children_from_json, value_from_json};
pub use record::{
    Children, Invocation, Props, Record, StyleValue, TransitionConfig, TransitionStart,
    TransitionStep, enter_fn,
};
pub use store::{ChildList, Owner, RecordId, RecordNode, RecordStore};

pub use weave_dom::Value;
