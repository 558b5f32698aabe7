#![forbid(unsafe_code)]

//! Binding a tracked data tree to a host element.
//!
//! An [`Element`] owns the data rendered under one root node of a shared
//! [`Document`]. Writes made through the handles returned by
//! [`Element::data`] are captured into a changelog and a pass is requested
//! from the element's [`Scheduler`]. Requests made before the pass runs
//! coalesce into it.
//!
//! ```ignore
//! let frames = FrameLoop::new();
//! let el = Element::new(Rc::clone(&doc), root, Rc::new(frames.clone()));
//! el.set_data(Children::Records(vec![Record::new("p").text("a")]));
//! frames.run_frame();
//! el.data().at(0).unwrap().set_text("b")?;
//! frames.run_frame();
//! ```
//!
//! # Invariants
//!
//! 1. At most one pass is scheduled at any time.
//! 2. A pass never re-enters itself. Writes made by hooks during a pass
//!    schedule a follow-on pass (or, in sync mode, rerun after it).
//! 3. Update listeners run after every pass, in registration order.
//! 4. Dropping a [`Subscription`] stops its callback before the next
//!    dispatch.
//! 5. Writes through handles of a replaced tree are dropped.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Non-array JSON data | `set_data_json` | `WeaveError::InvalidShape` |
//! | Sync rerun cap hit | Hooks keep writing data | `warn!`, rest handed to the scheduler |
//! | Document borrowed | Sync write while the host holds the document | pass deferred to the scheduler |

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use weave_core::{Change, Children, WeaveError, children_from_json};
use weave_dom::{Document, NodeId};

use super::tracked::{Sink, TrackedList, Tracker};
use crate::config::ElementConfig;
use crate::reconcile::{Binding, Bindings, PassStats, Reconciler, Scope};
use crate::scheduler::{Completion, Scheduler, TaskId};

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard for a listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _callback: Box<dyn Any>,
}

impl Subscription {
    fn hold<T: ?Sized + 'static>(callback: Rc<T>) -> Self {
        Self {
            _callback: Box::new(callback),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish()
    }
}

/// What an update listener is told about a finished pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// 1-based count of passes run by this element.
    pub pass: u64,
    pub stats: PassStats,
}

/// A host attribute changed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    pub name: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

type UpdateFn = dyn Fn(&PassReport);
type AttributeFn = dyn Fn(&AttributeChange);

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PassState {
    pending: Option<TaskId>,
    in_pass: bool,
    rerun: bool,
    disconnected: bool,
    passes: u64,
    last: Option<PassStats>,
    waiting: Vec<Completion>,
}

struct Inner {
    doc: Rc<RefCell<Document>>,
    root: NodeId,
    scheduler: Rc<dyn Scheduler>,
    config: ElementConfig,
    scope: RefCell<Scope>,
    tracker: RefCell<Option<Tracker>>,
    /// Bumped whenever the data tree is replaced.
    generation: Cell<u64>,
    /// Set while a new tree emits its initial changes.
    loading: Cell<bool>,
    /// Data was replaced during a pass; detach bindings before the next one.
    detach_pending: Cell<bool>,
    changelog: RefCell<Vec<Change>>,
    bindings: RefCell<Bindings>,
    pass: RefCell<PassState>,
    listeners: RefCell<Vec<Weak<UpdateFn>>>,
    observers: RefCell<Vec<(String, Weak<AttributeFn>)>>,
    attributes: RefCell<AHashMap<String, String>>,
}

/// Host element rendering a tracked data tree under `root`.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Element {
    inner: Rc<Inner>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pass = self.inner.pass.borrow();
        f.debug_struct("Element")
            .field("root", &self.inner.root)
            .field("config", &self.inner.config)
            .field("pending", &pass.pending)
            .field("passes", &pass.passes)
            .field("changelog", &self.inner.changelog.borrow().len())
            .finish()
    }
}

impl Element {
    /// Bind to `root` with the default config.
    pub fn new(doc: Rc<RefCell<Document>>, root: NodeId, scheduler: Rc<dyn Scheduler>) -> Self {
        Self::with_config(doc, root, scheduler, ElementConfig::default())
    }

    pub fn with_config(
        doc: Rc<RefCell<Document>>,
        root: NodeId,
        scheduler: Rc<dyn Scheduler>,
        config: ElementConfig,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                doc,
                root,
                scheduler,
                config,
                scope: RefCell::new(Scope::default()),
                tracker: RefCell::new(None),
                generation: Cell::new(0),
                loading: Cell::new(false),
                detach_pending: Cell::new(false),
                changelog: RefCell::new(Vec::new()),
                bindings: RefCell::new(Bindings::default()),
                pass: RefCell::new(PassState::default()),
                listeners: RefCell::new(Vec::new()),
                observers: RefCell::new(Vec::new()),
                attributes: RefCell::new(AHashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    #[must_use]
    pub fn document(&self) -> &Rc<RefCell<Document>> {
        &self.inner.doc
    }

    #[must_use]
    pub fn config(&self) -> ElementConfig {
        self.inner.config
    }

    // -- data -------------------------------------------------------------

    /// Replace the data tree and request a pass.
    pub fn set_data(&self, children: impl Into<Children>) {
        self.install(children.into());
    }

    /// Install a new tracked tree, request a pass and return the tree.
    fn install(&self, children: Children) -> Tracker {
        let inner = &self.inner;
        let generation = inner.generation.get() + 1;
        inner.generation.set(generation);
        inner.changelog.borrow_mut().clear();
        match inner.bindings.try_borrow_mut() {
            Ok(mut bindings) => bindings.detach(),
            Err(_) => inner.detach_pending.set(true),
        }

        inner.loading.set(true);
        let tracker = Tracker::new(children, self.sink(generation));
        inner.loading.set(false);
        *inner.tracker.borrow_mut() = Some(tracker.clone());

        tracing::debug!(root = %inner.root, generation, "data replaced");
        self.request_pass();
        tracker
    }

    /// Replace the data tree from JSON. The value must be an array.
    pub fn set_data_json(&self, json: &serde_json::Value) -> Result<(), WeaveError> {
        let children = children_from_json(json)?;
        self.set_data(children);
        Ok(())
    }

    /// The live root collection. An empty tree is created on first access.
    pub fn data(&self) -> TrackedList {
        let current = self.inner.tracker.borrow().clone();
        current
            .unwrap_or_else(|| self.install(Children::Records(Vec::new())))
            .root()
    }

    /// Whether data was ever assigned.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.inner.tracker.borrow().is_some()
    }

    fn sink(&self, generation: u64) -> Sink {
        let weak = Rc::downgrade(&self.inner);
        Rc::new(move |batch: Vec<Change>| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.generation.get() != generation {
                tracing::trace!(changes = batch.len(), "dropping writes to a replaced tree");
                return;
            }
            inner.changelog.borrow_mut().extend(batch);
            if !inner.loading.get() {
                Element { inner }.request_pass();
            }
        })
    }

    // -- scope ------------------------------------------------------------

    /// Set the behavior applied to the root collection (namespace, selector,
    /// key, join and hooks) and request a pass.
    pub fn set_scope(&self, scope: Scope) {
        *self.inner.scope.borrow_mut() = scope;
        if self.has_data() {
            self.request_pass();
        }
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.inner.scope.borrow().clone()
    }

    // -- passes -----------------------------------------------------------

    /// Ask for a pass. Coalesces with a pass already scheduled; in sync mode
    /// runs it now.
    pub fn request_pass(&self) {
        let inner = &self.inner;
        {
            let mut pass = inner.pass.borrow_mut();
            if pass.disconnected {
                return;
            }
            if inner.config.sync && pass.in_pass {
                pass.rerun = true;
                return;
            }
        }
        if inner.config.sync {
            self.drain();
        } else {
            self.schedule();
        }
    }

    fn schedule(&self) {
        let inner = &self.inner;
        if inner.pass.borrow().pending.is_some() {
            return;
        }
        let weak = Rc::downgrade(inner);
        let id = inner.scheduler.schedule(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.pass.borrow_mut().pending = None;
                Element { inner }.drain();
            }
        }));
        inner.pass.borrow_mut().pending = Some(id);
        tracing::trace!(root = %inner.root, task = %id, "pass scheduled");
    }

    /// Run the pending changelog now, plus any reruns requested meanwhile.
    ///
    /// Called from inside a pass it only queues a rerun and returns empty
    /// stats.
    pub fn render(&self) -> PassStats {
        self.drain()
    }

    /// Run passes back to back while reruns keep being requested.
    fn drain(&self) -> PassStats {
        let mut total = self.run_pass();
        let mut rounds = 1;
        loop {
            let rerun = std::mem::take(&mut self.inner.pass.borrow_mut().rerun);
            if !rerun {
                break;
            }
            if rounds >= self.inner.config.max_drain_rounds {
                tracing::warn!(
                    root = %self.inner.root,
                    rounds,
                    "pass drain limit reached, deferring to scheduler"
                );
                self.schedule();
                break;
            }
            total += self.run_pass();
            rounds += 1;
        }
        total
    }

    /// One pass over the pending changelog.
    ///
    /// Returns empty stats if a pass is already running (a rerun is queued
    /// instead) or the document is borrowed elsewhere (the pass is deferred
    /// to the scheduler).
    fn run_pass(&self) -> PassStats {
        let inner = &self.inner;
        {
            let mut pass = inner.pass.borrow_mut();
            if pass.in_pass {
                pass.rerun = true;
                return PassStats::default();
            }
            pass.in_pass = true;
            if let Some(id) = pass.pending.take() {
                inner.scheduler.cancel(id);
            }
        }

        let changes = std::mem::take(&mut *inner.changelog.borrow_mut());
        let tracker = inner.tracker.borrow().clone();
        let scope = inner.scope.borrow().clone();
        let stats = match (tracker, inner.doc.try_borrow_mut()) {
            (None, _) => PassStats::default(),
            (Some(tracker), Ok(mut doc)) => {
                let mut bindings = inner.bindings.borrow_mut();
                if inner.detach_pending.take() {
                    bindings.detach();
                }
                Reconciler::new(&mut doc, tracker.store(), &mut bindings).run(inner.root, &scope, &changes)
            }
            (Some(_), Err(_)) => {
                tracing::debug!(root = %inner.root, "document busy, deferring pass");
                let mut log = inner.changelog.borrow_mut();
                let later = std::mem::replace(&mut *log, changes);
                log.extend(later);
                drop(log);
                inner.pass.borrow_mut().in_pass = false;
                self.schedule();
                return PassStats::default();
            }
        };

        let report = {
            let mut pass = inner.pass.borrow_mut();
            pass.passes += 1;
            pass.last = Some(stats);
            PassReport {
                pass: pass.passes,
                stats,
            }
        };
        // Listeners count as part of the pass: their writes queue a rerun.
        self.dispatch_update(&report);
        inner.pass.borrow_mut().in_pass = false;
        self.resolve_if_idle();
        stats
    }

    /// Stats of the last pass, if any ran.
    #[must_use]
    pub fn last_stats(&self) -> Option<PassStats> {
        self.inner.pass.borrow().last
    }

    /// Passes run so far.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.inner.pass.borrow().passes
    }

    /// Whether a pass is scheduled or changes are waiting for one.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let pass = self.inner.pass.borrow();
        pass.pending.is_some() || pass.rerun || !self.inner.changelog.borrow().is_empty()
    }

    /// Resolves once the pending pass and its follow-on passes have run.
    pub fn complete(&self) -> Completion {
        let idle = {
            let pass = self.inner.pass.borrow();
            pass.disconnected || (!pass.in_pass && !self.is_dirty())
        };
        if idle {
            return Completion::ready();
        }
        let completion = Completion::new();
        self.inner.pass.borrow_mut().waiting.push(completion.clone());
        completion
    }

    fn resolve_if_idle(&self) {
        if self.is_dirty() || self.inner.pass.borrow().in_pass {
            return;
        }
        let waiting = std::mem::take(&mut self.inner.pass.borrow_mut().waiting);
        for completion in waiting {
            completion.resolve();
        }
    }

    /// Stop scheduling passes. The pending pass is cancelled and waiting
    /// completions resolve.
    pub fn disconnect(&self) {
        let (pending, waiting) = {
            let mut pass = self.inner.pass.borrow_mut();
            pass.disconnected = true;
            pass.rerun = false;
            (pass.pending.take(), std::mem::take(&mut pass.waiting))
        };
        if let Some(id) = pending {
            self.inner.scheduler.cancel(id);
            tracing::debug!(root = %self.inner.root, task = %id, "pending pass cancelled");
        }
        for completion in waiting {
            completion.resolve();
        }
    }

    /// Resume after [`disconnect`](Self::disconnect). Changes captured
    /// meanwhile are rendered on the next pass.
    pub fn reconnect(&self) {
        self.inner.pass.borrow_mut().disconnected = false;
        if !self.inner.changelog.borrow().is_empty() {
            self.request_pass();
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.inner.pass.borrow().disconnected
    }

    // -- bindings ---------------------------------------------------------

    /// What `node` is bound to, if it was produced by a pass.
    #[must_use]
    pub fn binding_of(&self, node: NodeId) -> Option<Binding> {
        self.inner.bindings.borrow().get(node).cloned()
    }

    /// Number of live bound nodes.
    #[must_use]
    pub fn bound_nodes(&self) -> usize {
        self.inner.bindings.borrow().len()
    }

    // -- listeners --------------------------------------------------------

    /// Call `f` after every pass.
    pub fn on_update(&self, f: impl Fn(&PassReport) + 'static) -> Subscription {
        let callback: Rc<UpdateFn> = Rc::new(f);
        self.inner.listeners.borrow_mut().push(Rc::downgrade(&callback));
        Subscription::hold(callback)
    }

    fn dispatch_update(&self, report: &PassReport) {
        let live: Vec<Rc<UpdateFn>> = {
            let mut listeners = self.inner.listeners.borrow_mut();
            listeners.retain(|w| w.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener(report);
        }
    }

    // -- attributes -------------------------------------------------------

    /// Current value of a host attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attributes.borrow().get(name).cloned()
    }

    /// Set (`Some`) or remove (`None`) a host attribute. Observers of
    /// `name` run when the value actually changes.
    pub fn set_attribute(&self, name: &str, value: Option<&str>) {
        let old = {
            let mut attributes = self.inner.attributes.borrow_mut();
            match value {
                Some(value) => attributes.insert(name.to_owned(), value.to_owned()),
                None => attributes.remove(name),
            }
        };
        if old.as_deref() == value {
            return;
        }
        let change = AttributeChange {
            name: name.to_owned(),
            old,
            new: value.map(str::to_owned),
        };
        let live: Vec<Rc<AttributeFn>> = {
            let mut observers = self.inner.observers.borrow_mut();
            observers.retain(|(_, w)| w.strong_count() > 0);
            observers
                .iter()
                .filter(|(observed, _)| observed == name)
                .filter_map(|(_, w)| w.upgrade())
                .collect()
        };
        for observer in live {
            observer(&change);
        }
    }

    /// Call `f` whenever attribute `name` changes value.
    pub fn observe_attribute(&self, name: &str, f: impl Fn(&AttributeChange) + 'static) -> Subscription {
        let callback: Rc<AttributeFn> = Rc::new(f);
        self.inner
            .observers
            .borrow_mut()
            .push((name.to_owned(), Rc::downgrade(&callback)));
        Subscription::hold(callback)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::FrameLoop;
    use weave_core::Record;

    fn setup(config: ElementConfig) -> (Rc<RefCell<Document>>, FrameLoop, Element) {
        let doc = Rc::new(RefCell::new(Document::new()));
        let root = doc.borrow_mut().create_element("div");
        let frames = FrameLoop::new();
        let el = Element::with_config(Rc::clone(&doc), root, Rc::new(frames.clone()), config);
        (doc, frames, el)
    }

    #[test]
    fn writes_coalesce_into_one_scheduled_pass() {
        let (doc, frames, el) = setup(ElementConfig::default());
        el.set_data(Children::Records(vec![Record::new("p").text("a")]));
        let p = el.data().at(0).unwrap();
        p.set_text("b").unwrap();
        p.set_attr("class", "x").unwrap();
        assert_eq!(frames.pending(), 1);
        assert_eq!(el.passes(), 0);

        frames.run_frame();
        assert_eq!(el.passes(), 1);
        let doc = doc.borrow();
        let node = doc.children(el.root())[0];
        assert_eq!(doc.text_content(node), "b");
        assert_eq!(doc.attr(node, "class"), Some("x"));
    }

    #[test]
    fn sync_mode_renders_immediately() {
        let (doc, frames, el) = setup(ElementConfig::default().with_sync(true));
        el.set_data(Children::Records(vec![Record::new("p").text("a")]));
        assert_eq!(frames.pending(), 0);
        assert_eq!(doc.borrow().text_content(el.root()), "a");
        el.data().at(0).unwrap().set_text("b").unwrap();
        assert_eq!(doc.borrow().text_content(el.root()), "b");
        assert_eq!(el.passes(), 2);
    }

    #[test]
    fn data_is_created_lazily() {
        let (_, frames, el) = setup(ElementConfig::default());
        assert!(!el.has_data());
        assert!(el.data().is_empty());
        assert!(el.has_data());
        el.data().push(Record::new("li")).unwrap();
        frames.run_frame();
        assert_eq!(el.bound_nodes(), 1);
    }

    #[test]
    fn writes_to_a_replaced_tree_are_dropped() {
        let (_, frames, el) = setup(ElementConfig::default());
        el.set_data(Children::Records(vec![Record::new("p")]));
        let old = el.data().at(0).unwrap();
        el.set_data(Children::Records(vec![Record::new("p")]));
        frames.run_frame();
        old.set_text("ghost").unwrap();
        assert_eq!(frames.pending(), 0);
        assert!(!el.is_dirty());
    }

    #[test]
    fn disconnect_cancels_pending_pass() {
        let (_, frames, el) = setup(ElementConfig::default());
        el.set_data(Children::Records(vec![Record::new("p")]));
        let done = el.complete();
        el.disconnect();
        assert_eq!(frames.pending(), 0);
        assert!(done.is_done());
        frames.run_frame();
        assert_eq!(el.passes(), 0);

        el.reconnect();
        frames.run_frame();
        assert_eq!(el.passes(), 1);
    }

    #[test]
    fn dropped_subscription_stops_listener() {
        let (_, frames, el) = setup(ElementConfig::default());
        let seen = Rc::new(Cell::new(0u64));
        let sink = Rc::clone(&seen);
        let sub = el.on_update(move |report| sink.set(report.pass));
        el.set_data(Children::Records(vec![Record::new("p")]));
        frames.run_frame();
        assert_eq!(seen.get(), 1);

        drop(sub);
        el.data().at(0).unwrap().set_text("x").unwrap();
        frames.run_frame();
        assert_eq!(seen.get(), 1);
        assert_eq!(el.passes(), 2);
    }

    #[test]
    fn attribute_observers_fire_on_change_only() {
        let (_, _, el) = setup(ElementConfig::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let _sub = el.observe_attribute("scale", move |c| sink.borrow_mut().push(c.clone()));
        el.set_attribute("scale", Some("2"));
        el.set_attribute("scale", Some("2"));
        el.set_attribute("other", Some("1"));
        el.set_attribute("scale", None);
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].old, None);
        assert_eq!(log[0].new.as_deref(), Some("2"));
        assert_eq!(log[1].old.as_deref(), Some("2"));
        assert_eq!(log[1].new, None);
    }
}
