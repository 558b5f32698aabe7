#![forbid(unsafe_code)]

//! Weave: declarative, change-tracked records rendered onto a document.
//!
//! Build a tree of [`Record`]s, hand it to an [`Element`], then mutate it
//! through the returned handles. Each write is captured and replayed onto
//! the matching node on the next pass, so only what changed is touched.
//!
//! ```ignore
//! use weave::prelude::*;
//!
//! let doc = Rc::new(RefCell::new(Document::new()));
//! let root = doc.borrow_mut().create_element("div");
//! let frames = FrameLoop::new();
//! let el = Element::new(doc, root, Rc::new(frames.clone()));
//!
//! el.set_data(vec![Record::new("p").text("a")]);
//! frames.run_frame();
//! el.data().at(0).unwrap().set_text("b")?;
//! frames.run_frame();
//! ```
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `weave-dom` | host document, selectors, data join, transitions |
//! | `weave-core` | records, record arena, changelog entries, errors |
//! | `weave-runtime` | tracked handles, grouping, replay, scheduling |

pub use weave_core as core;
pub use weave_dom as dom;
#[cfg(feature = "runtime")]
pub use weave_runtime as runtime;

pub use weave_core::{
    Change, Children, Item, JoinHooks, Record, StyleValue, TransitionConfig, TransitionStep,
    WeaveError,
};
pub use weave_dom::{CallbackResult, Document, Ease, NodeId, Selector, Value};
#[cfg(feature = "runtime")]
pub use weave_runtime::{
    Completion, Element, ElementConfig, FrameLoop, PassStats, Scheduler, Scope, TrackedList,
    TrackedRecord,
};

/// Everything needed to build and drive an element.
pub mod prelude {
    pub use std::cell::RefCell;
    pub use std::rc::Rc;

    pub use weave_core::{
        Children, Item, JoinHooks, NodeCx, Record, SelectionCx, StyleValue, TransitionConfig,
        TransitionStep, WeaveError,
    };
    pub use weave_dom::{CallbackResult, Document, Ease, EventCx, NodeId, Selector, Value};
    #[cfg(feature = "runtime")]
    pub use weave_runtime::{
        Element, ElementConfig, FrameLoop, Scheduler, Scope, Subscription, TrackedList,
        TrackedRecord,
    };
}
