#![forbid(unsafe_code)]

//! Time-driven transitions on document nodes.
//!
//! A transition is created in the [`Phase::Scheduled`] phase and can be
//! configured (timing, attribute/style targets, text, tweens, event
//! handlers) until it starts. The document clock advances explicitly through
//! [`Document::advance`]; every advance starts due transitions and steps the
//! running ones.
//!
//! # Invariants
//!
//! 1. Transition ids increase in creation order.
//! 2. Starting a transition interrupts every running transition with the same
//!    name on the same node and a smaller id, and cancels the scheduled ones.
//! 3. A transition that ends leaves every target at exactly its final value.
//! 4. Start values are captured when the transition starts, not when it is
//!    configured.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unknown transition | Finished, interrupted or foreign id | `DomError::UnknownTransition` |
//! | Configure after start | Setter on a running transition | `DomError::TooLate` |
//! | Unknown method | `call_transition_method` with an unsupported name | `DomError::UnknownMethod` |
//! | Tween / handler error | Callback returned `Err` | Logged, transition continues |

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::document::{Document, EventCx, Handler, NodeId};
use crate::ease::{Ease, interpolate};
use crate::error::{CallbackResult, DomError};
use crate::value::Value;

/// Identifier of a transition instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(u64);

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transition#{}", self.0)
    }
}

/// Custom per-frame callback receiving the eased progress in `[0, 1]`.
pub type Tween = Rc<dyn Fn(&mut Document, NodeId, f64) -> CallbackResult>;

/// Lifecycle phase of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scheduled,
    Running,
    Ended,
    Interrupted,
}

/// Timing applied to transitions created without explicit settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionDefaults {
    /// Duration in milliseconds.
    pub duration: f64,
    pub ease: Ease,
}

impl Default for TransitionDefaults {
    fn default() -> Self {
        Self {
            duration: 250.0,
            ease: Ease::CubicInOut,
        }
    }
}

impl TransitionDefaults {
    #[must_use]
    pub fn with_duration(mut self, ms: f64) -> Self {
        self.duration = ms.max(0.0);
        self
    }

    #[must_use]
    pub fn with_ease(mut self, ease: Ease) -> Self {
        self.ease = ease;
        self
    }
}

/// Name and timing of a transition, all times in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTiming {
    pub name: Option<String>,
    /// Document time at which the transition was created.
    pub time: f64,
    pub delay: f64,
    pub duration: f64,
    pub ease: Ease,
}

impl TransitionTiming {
    /// Document time at which the transition starts.
    #[must_use]
    pub fn start(&self) -> f64 {
        self.time + self.delay
    }
}

struct Target {
    name: String,
    to: Value,
    from: Option<String>,
    important: bool,
}

struct Slot {
    id: TransitionId,
    node: NodeId,
    timing: TransitionTiming,
    phase: Phase,
    attrs: Vec<Target>,
    styles: Vec<Target>,
    text: Option<String>,
    tweens: Vec<(String, Tween)>,
    events: Vec<(String, Handler)>,
    remove_on_end: bool,
}

impl Slot {
    fn handlers(&self, event: &str) -> SmallVec<[Handler; 2]> {
        self.events
            .iter()
            .filter(|(name, _)| name.split('.').next() == Some(event))
            .map(|(_, h)| Rc::clone(h))
            .collect()
    }

    fn is_live(&self) -> bool {
        matches!(self.phase, Phase::Scheduled | Phase::Running)
    }
}

fn upsert<T>(rows: &mut Vec<(String, T)>, name: &str, value: Option<T>) {
    let pos = rows.iter().position(|(n, _)| n == name);
    match (pos, value) {
        (Some(i), None) => {
            rows.remove(i);
        }
        (None, None) => {}
        (Some(i), Some(v)) => rows[i].1 = v,
        (None, Some(v)) => rows.push((name.to_owned(), v)),
    }
}

fn upsert_target(rows: &mut Vec<Target>, name: &str, to: Value, important: bool) {
    if let Some(row) = rows.iter_mut().find(|t| t.name == name) {
        row.to = to;
        row.important = important;
    } else {
        rows.push(Target {
            name: name.to_owned(),
            to,
            from: None,
            important,
        });
    }
}

/// Live and retired transitions of one document.
#[derive(Default)]
pub(crate) struct TransitionEngine {
    slots: Vec<Slot>,
    retired: AHashMap<TransitionId, TransitionTiming>,
    next_id: u64,
    defaults: TransitionDefaults,
}

impl TransitionEngine {
    /// Number of scheduled or running transitions.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn get(&self, id: TransitionId) -> Option<&Slot> {
        self.slots.iter().find(|s| s.id == id)
    }

    fn get_mut(&mut self, id: TransitionId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    fn timing(&self, id: TransitionId) -> Option<&TransitionTiming> {
        self.get(id).map(|s| &s.timing).or_else(|| self.retired.get(&id))
    }

    fn push(&mut self, node: NodeId, timing: TransitionTiming) -> TransitionId {
        self.next_id += 1;
        let id = TransitionId(self.next_id);
        self.slots.push(Slot {
            id,
            node,
            timing,
            phase: Phase::Scheduled,
            attrs: Vec::new(),
            styles: Vec::new(),
            text: None,
            tweens: Vec::new(),
            events: Vec::new(),
            remove_on_end: false,
        });
        id
    }

    /// Drop every transition on `node` without firing events.
    pub(crate) fn cancel_node(&mut self, node: NodeId) {
        for slot in &mut self.slots {
            if slot.node == node {
                slot.phase = Phase::Interrupted;
            }
        }
        self.retire();
    }

    fn retire(&mut self) {
        let (live, done): (Vec<Slot>, Vec<Slot>) =
            std::mem::take(&mut self.slots).into_iter().partition(Slot::is_live);
        self.slots = live;
        for slot in done {
            self.retired.insert(slot.id, slot.timing);
        }
    }
}

impl Document {
    // ---------------------------------------------------------------------
    // Clock
    // ---------------------------------------------------------------------

    /// Current document time in milliseconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Advance the clock by `dt` milliseconds and step transitions.
    pub fn advance(&mut self, dt: f64) {
        self.advance_to(self.now + dt.max(0.0));
    }

    /// Move the clock to `now` (never backwards) and step transitions.
    pub fn advance_to(&mut self, now: f64) {
        if now > self.now {
            self.now = now;
        }
        let ids: Vec<TransitionId> = self.transitions.slots.iter().map(|s| s.id).collect();
        for id in ids {
            let due = self
                .transitions
                .get(id)
                .is_some_and(|s| s.phase == Phase::Scheduled && self.now >= s.timing.start());
            if due {
                self.start_transition(id);
            }
            if self
                .transitions
                .get(id)
                .is_some_and(|s| s.phase == Phase::Running)
            {
                self.step_transition(id);
            }
        }
        self.transitions.retire();
    }

    // ---------------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------------

    /// Defaults used by [`Document::transition`].
    #[must_use]
    pub fn transition_defaults(&self) -> TransitionDefaults {
        self.transitions.defaults
    }

    pub fn set_transition_defaults(&mut self, defaults: TransitionDefaults) {
        self.transitions.defaults = defaults;
    }

    /// Schedule a new transition on `node` with default timing.
    pub fn transition(&mut self, node: NodeId, name: Option<&str>) -> Result<TransitionId, DomError> {
        if !self.contains(node) {
            return Err(DomError::UnknownNode(node));
        }
        let defaults = self.transitions.defaults;
        let timing = TransitionTiming {
            name: name.map(str::to_owned),
            time: self.now,
            delay: 0.0,
            duration: defaults.duration,
            ease: defaults.ease,
        };
        Ok(self.transitions.push(node, timing))
    }

    /// Schedule a transition on `node` that shares the name and timing of
    /// `template`, which may already have finished.
    pub fn transition_like(
        &mut self,
        node: NodeId,
        template: TransitionId,
    ) -> Result<TransitionId, DomError> {
        if !self.contains(node) {
            return Err(DomError::UnknownNode(node));
        }
        let timing = self
            .transitions
            .timing(template)
            .cloned()
            .ok_or(DomError::UnknownTransition(template))?;
        Ok(self.transitions.push(node, timing))
    }

    /// Schedule a transition on the same node that starts when `previous`
    /// ends, inheriting its name, duration and ease.
    pub fn chain(&mut self, previous: TransitionId) -> Result<TransitionId, DomError> {
        let slot = self
            .transitions
            .get(previous)
            .ok_or(DomError::UnknownTransition(previous))?;
        let node = slot.node;
        let prev = &slot.timing;
        let timing = TransitionTiming {
            name: prev.name.clone(),
            time: prev.time,
            delay: prev.delay + prev.duration,
            duration: prev.duration,
            ease: prev.ease,
        };
        Ok(self.transitions.push(node, timing))
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Phase of a live transition; `None` once it has been retired.
    #[must_use]
    pub fn transition_phase(&self, id: TransitionId) -> Option<Phase> {
        self.transitions.get(id).map(|s| s.phase)
    }

    /// Timing of a live or retired transition.
    #[must_use]
    pub fn transition_timing(&self, id: TransitionId) -> Option<&TransitionTiming> {
        self.transitions.timing(id)
    }

    /// Scheduled and running transitions on `node`, oldest first.
    #[must_use]
    pub fn transitions_on(&self, node: NodeId) -> Vec<TransitionId> {
        self.transitions
            .slots
            .iter()
            .filter(|s| s.node == node)
            .map(|s| s.id)
            .collect()
    }

    /// Number of scheduled or running transitions in the document.
    #[must_use]
    pub fn active_transitions(&self) -> usize {
        self.transitions.len()
    }

    // ---------------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------------

    fn scheduled_mut(&mut self, id: TransitionId) -> Result<&mut Slot, DomError> {
        let slot = self
            .transitions
            .get_mut(id)
            .ok_or(DomError::UnknownTransition(id))?;
        if slot.phase != Phase::Scheduled {
            return Err(DomError::TooLate(id));
        }
        Ok(slot)
    }

    pub fn set_duration(&mut self, id: TransitionId, ms: f64) -> Result<(), DomError> {
        self.scheduled_mut(id)?.timing.duration = ms.max(0.0);
        Ok(())
    }

    pub fn set_delay(&mut self, id: TransitionId, ms: f64) -> Result<(), DomError> {
        self.scheduled_mut(id)?.timing.delay = ms.max(0.0);
        Ok(())
    }

    pub fn set_ease(&mut self, id: TransitionId, ease: Ease) -> Result<(), DomError> {
        self.scheduled_mut(id)?.timing.ease = ease;
        Ok(())
    }

    /// Animate an attribute towards `to` (`Null` removes it at the end).
    pub fn transition_attr(&mut self, id: TransitionId, name: &str, to: Value) -> Result<(), DomError> {
        upsert_target(&mut self.scheduled_mut(id)?.attrs, name, to, false);
        Ok(())
    }

    /// Animate a style row towards `to`.
    pub fn transition_style(
        &mut self,
        id: TransitionId,
        name: &str,
        to: Value,
        important: bool,
    ) -> Result<(), DomError> {
        upsert_target(&mut self.scheduled_mut(id)?.styles, name, to, important);
        Ok(())
    }

    /// Replace the node's text when the transition starts.
    pub fn transition_text(&mut self, id: TransitionId, text: &str) -> Result<(), DomError> {
        self.scheduled_mut(id)?.text = Some(text.to_owned());
        Ok(())
    }

    /// Bind (or unbind) a `start`, `end`, `interrupt` or `cancel` handler.
    pub fn transition_on(
        &mut self,
        id: TransitionId,
        event: &str,
        handler: Option<Handler>,
    ) -> Result<(), DomError> {
        upsert(&mut self.scheduled_mut(id)?.events, event, handler);
        Ok(())
    }

    /// Register (or remove) a named tween.
    pub fn transition_tween(
        &mut self,
        id: TransitionId,
        name: &str,
        tween: Option<Tween>,
    ) -> Result<(), DomError> {
        upsert(&mut self.scheduled_mut(id)?.tweens, name, tween);
        Ok(())
    }

    /// Detach the node once the transition ends.
    pub fn transition_remove(&mut self, id: TransitionId) -> Result<(), DomError> {
        self.scheduled_mut(id)?.remove_on_end = true;
        Ok(())
    }

    /// Invoke a transition method by name.
    ///
    /// Supported: `duration(ms)`, `delay(ms)`, `ease(name)`, `attr(name,
    /// value)`, `style(name, value[, "important"])`, `text(value)`, `remove`.
    pub fn call_transition_method(
        &mut self,
        id: TransitionId,
        method: &str,
        args: &[Value],
    ) -> Result<(), DomError> {
        let invalid = |reason: &str| DomError::InvalidArgument {
            method: method.to_owned(),
            reason: reason.to_owned(),
        };
        let number = |i: usize| {
            args.get(i)
                .and_then(Value::as_f64)
                .ok_or_else(|| invalid("expected a number"))
        };
        let name = |i: usize| {
            args.get(i)
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("expected a name"))
        };
        let value = |i: usize| args.get(i).cloned().unwrap_or_default();
        match method {
            "duration" => self.set_duration(id, number(0)?),
            "delay" => self.set_delay(id, number(0)?),
            "ease" => self.set_ease(id, name(0)?.parse()?),
            "attr" => self.transition_attr(id, name(0)?, value(1)),
            "style" => {
                let important = args.get(2).and_then(Value::as_str) == Some("important");
                self.transition_style(id, name(0)?, value(1), important)
            }
            "text" => self.transition_text(id, &value(0).render()),
            "remove" => self.transition_remove(id),
            _ => Err(DomError::UnknownMethod {
                target: "transition",
                method: method.to_owned(),
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Stepping
    // ---------------------------------------------------------------------

    fn fire(&mut self, node: NodeId, event: &str, handlers: SmallVec<[Handler; 2]>) {
        for handler in handlers {
            let mut cx = EventCx {
                doc: self,
                node,
                event,
            };
            if let Err(err) = handler(&mut cx) {
                tracing::error!(%node, event, error = %err, "transition handler failed");
            }
        }
    }

    fn start_transition(&mut self, id: TransitionId) {
        let Some(slot) = self.transitions.get(id) else {
            return;
        };
        let node = slot.node;
        let name = slot.timing.name.clone();

        let mut displaced: Vec<(&'static str, SmallVec<[Handler; 2]>)> = Vec::new();
        for other in &mut self.transitions.slots {
            if other.node != node || other.id >= id || other.timing.name != name || !other.is_live() {
                continue;
            }
            let event = if other.phase == Phase::Running {
                "interrupt"
            } else {
                "cancel"
            };
            tracing::trace!(%node, interrupted = %other.id, by = %id, event, "transition displaced");
            other.phase = Phase::Interrupted;
            displaced.push((event, other.handlers(event)));
        }
        for (event, handlers) in displaced {
            self.fire(node, event, handlers);
        }

        let Some(slot) = self.transitions.get(id) else {
            return;
        };
        let attr_from: Vec<Option<String>> = slot
            .attrs
            .iter()
            .map(|t| self.attr(node, &t.name).map(str::to_owned))
            .collect();
        let style_from: Vec<Option<String>> = slot
            .styles
            .iter()
            .map(|t| self.style(node, &t.name).map(str::to_owned))
            .collect();
        let Some(slot) = self.transitions.get_mut(id) else {
            return;
        };
        for (target, from) in slot.attrs.iter_mut().zip(attr_from) {
            target.from = from;
        }
        for (target, from) in slot.styles.iter_mut().zip(style_from) {
            target.from = from;
        }
        slot.phase = Phase::Running;
        let text = slot.text.clone();
        let handlers = slot.handlers("start");

        if let Some(text) = text
            && let Err(err) = self.set_text(node, &text)
        {
            tracing::warn!(%node, error = %err, "transition text failed");
        }
        self.fire(node, "start", handlers);
    }

    fn step_transition(&mut self, id: TransitionId) {
        let Some(slot) = self.transitions.get(id) else {
            return;
        };
        let node = slot.node;
        let timing = &slot.timing;
        let t = if timing.duration <= 0.0 {
            1.0
        } else {
            ((self.now - timing.start()) / timing.duration).clamp(0.0, 1.0)
        };
        let done = t >= 1.0;
        let eased = if done { 1.0 } else { timing.ease.apply(t) };
        let frame = |targets: &[Target]| -> SmallVec<[(String, Value, bool); 4]> {
            targets
                .iter()
                .map(|target| {
                    let value = if done {
                        target.to.clone()
                    } else {
                        interpolate(target.from.as_deref(), &target.to, eased)
                    };
                    (target.name.clone(), value, target.important)
                })
                .collect()
        };
        let attrs = frame(&slot.attrs);
        let styles = frame(&slot.styles);
        let tweens: SmallVec<[Tween; 2]> = slot.tweens.iter().map(|(_, t)| Rc::clone(t)).collect();

        for (name, value, _) in &attrs {
            if let Err(err) = self.set_attr(node, name, value) {
                tracing::warn!(%node, attr = %name, error = %err, "transition attr failed");
            }
        }
        for (name, value, important) in &styles {
            if let Err(err) = self.set_style(node, name, value, *important) {
                tracing::warn!(%node, style = %name, error = %err, "transition style failed");
            }
        }
        for tween in tweens {
            if let Err(err) = tween(self, node, eased) {
                tracing::error!(%node, transition = %id, error = %err, "tween failed");
            }
        }

        if done {
            let Some(slot) = self.transitions.get_mut(id) else {
                return;
            };
            slot.phase = Phase::Ended;
            let remove = slot.remove_on_end;
            let handlers = slot.handlers("end");
            self.fire(node, "end", handlers);
            if remove {
                self.remove(node).ok();
            }
        }
    }
}
