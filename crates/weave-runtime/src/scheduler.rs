#![forbid(unsafe_code)]

//! Frame scheduling.
//!
//! Passes are not run when data changes; they are requested from a
//! [`Scheduler`], which runs them on its next tick. [`FrameLoop`] is the
//! bundled scheduler: the host calls [`FrameLoop::run_frame`] once per frame.
//!
//! Callbacks scheduled while a frame is running join the same frame, so a
//! pass whose hooks mutate data is followed by its follow-on pass before the
//! frame returns. The number of rounds per frame is capped; leftover
//! callbacks wait for the next frame.
//!
//! # Invariants
//!
//! 1. A callback runs at most once.
//! 2. A cancelled callback never runs.
//! 3. Callbacks run in scheduling order.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Round cap hit | Callbacks keep rescheduling themselves | `warn!`, rest deferred to next frame |

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use web_time::Instant;

/// Handle to a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// A deferred callback.
pub type Task = Box<dyn FnOnce()>;

/// Runs callbacks on a later tick.
pub trait Scheduler {
    /// Queue `task` for the next tick.
    fn schedule(&self, task: Task) -> TaskId;

    /// Drop a queued task. Returns whether it was still pending.
    fn cancel(&self, id: TaskId) -> bool;
}

// ---------------------------------------------------------------------------
// FrameLoop
// ---------------------------------------------------------------------------

/// Default number of drain rounds per frame.
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// What one frame did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    /// Callbacks executed.
    pub ran: usize,
    /// Drain rounds used.
    pub rounds: usize,
    /// Callbacks left for the next frame.
    pub deferred: usize,
    pub elapsed: Duration,
}

struct FrameState {
    next_id: u64,
    queue: VecDeque<(TaskId, Task)>,
    frames: u64,
    max_rounds: usize,
    last_frame: Option<Instant>,
}

/// Manually driven frame scheduler.
#[derive(Clone)]
pub struct FrameLoop {
    state: Rc<RefCell<FrameState>>,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("FrameLoop")
            .field("pending", &state.queue.len())
            .field("frames", &state.frames)
            .field("max_rounds", &state.max_rounds)
            .finish()
    }
}

impl FrameLoop {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(FrameState {
                next_id: 1,
                queue: VecDeque::new(),
                frames: 0,
                max_rounds: DEFAULT_MAX_ROUNDS,
                last_frame: None,
            })),
        }
    }

    /// Cap the drain rounds per frame (at least one).
    #[must_use]
    pub fn with_max_rounds(self, rounds: usize) -> Self {
        self.state.borrow_mut().max_rounds = rounds.max(1);
        self
    }

    /// Callbacks waiting for a frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Frames run so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.state.borrow().frames
    }

    /// When the last frame started.
    #[must_use]
    pub fn last_frame(&self) -> Option<Instant> {
        self.state.borrow().last_frame
    }

    /// Run queued callbacks, including ones queued by them, for up to the
    /// round cap.
    pub fn run_frame(&self) -> FrameReport {
        let started = Instant::now();
        let max_rounds = {
            let mut state = self.state.borrow_mut();
            state.frames += 1;
            state.last_frame = Some(started);
            state.max_rounds
        };
        let mut report = FrameReport::default();
        while report.rounds < max_rounds {
            let mut budget = self.pending();
            if budget == 0 {
                break;
            }
            report.rounds += 1;
            // Tasks queued during this round wait for the next one; tasks
            // cancelled during it are already gone from the queue.
            while budget > 0 {
                budget -= 1;
                let next = self.state.borrow_mut().queue.pop_front();
                let Some((_, task)) = next else {
                    break;
                };
                task();
                report.ran += 1;
            }
        }
        report.deferred = self.pending();
        if report.deferred > 0 {
            tracing::warn!(
                rounds = report.rounds,
                deferred = report.deferred,
                "frame drain limit reached"
            );
        }
        report.elapsed = started.elapsed();
        tracing::trace!(ran = report.ran, rounds = report.rounds, "frame done");
        report
    }

    /// Run frames until nothing is pending or `max_frames` ran.
    pub fn run_until_idle(&self, max_frames: usize) -> usize {
        let mut frames = 0;
        while self.pending() > 0 && frames < max_frames {
            self.run_frame();
            frames += 1;
        }
        frames
    }
}

impl Scheduler for FrameLoop {
    fn schedule(&self, task: Task) -> TaskId {
        let mut state = self.state.borrow_mut();
        let id = TaskId(state.next_id);
        state.next_id += 1;
        state.queue.push_back((id, task));
        id
    }

    fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.queue.len();
        state.queue.retain(|(queued, _)| *queued != id);
        state.queue.len() != before
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Signal {
    done: bool,
    wakers: Vec<Waker>,
}

/// Resolves once the passes pending when it was created have drained.
#[derive(Clone, Default)]
pub struct Completion {
    signal: Rc<RefCell<Signal>>,
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("done", &self.is_done())
            .finish()
    }
}

impl Completion {
    /// An unresolved completion.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An already resolved completion.
    #[must_use]
    pub fn ready() -> Self {
        let completion = Self::new();
        completion.resolve();
        completion
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.signal.borrow().done
    }

    /// Resolve and wake every waiter. Idempotent.
    pub fn resolve(&self) {
        let wakers = {
            let mut signal = self.signal.borrow_mut();
            signal.done = true;
            std::mem::take(&mut signal.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

impl Future for Completion {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut signal = self.signal.borrow_mut();
        if signal.done {
            return Poll::Ready(());
        }
        if !signal.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            signal.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
