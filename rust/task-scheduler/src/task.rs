//! The task object: dependency counters, affinity, priority, and the
//! continuation/completion wiring that drives the completion protocol.
//!
//! A [`Task`] is always held through a [`TaskRef`] (`Arc<Task>`). That one
//! choice is what realizes §4.6/§9 of the design for free: the "implicit
//! scheduler-held reference" is just the `Arc` clone sitting in a deque slot
//! or a worker's stack frame, and "destruction at reference count zero" is
//! `Task`'s ordinary `Drop`. There is no custom atomic refcount anywhere in
//! this crate.

use crate::error::{fatal, SchedulerError};
use crate::scheduler;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A reference-counted handle to a [`Task`]. Cloning is cheap (an `Arc`
/// clone) and is how dependency edges and queue slots each keep the task
/// alive.
pub type TaskRef = Arc<Task>;

/// Either "any worker may run this" or a specific worker index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Any,
    Worker(usize),
}

/// The three scheduling priority bands. Ordered: `High` is drained and
/// stolen before `Normal`, which is drained and stolen before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

pub(crate) const PRIORITY_BANDS: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

impl Priority {
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// The task's lifecycle state. `Zombie` (freed) has no explicit
/// representation here — in Rust that's just the moment the last `TaskRef`
/// is dropped, which runs `Task`'s (trivial) `Drop` automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    New,
    Ready,
    Running,
    Done,
}

fn state_from_u8(v: u8) -> TaskState {
    match v {
        0 => TaskState::New,
        1 => TaskState::Ready,
        2 => TaskState::Running,
        _ => TaskState::Done,
    }
}

/// The user-supplied work a task carries.
///
/// `Single` is consumed exactly once (`FnOnce`) and may return a follow-up
/// task to be executed inline (tail-call continuation). `Set` is the
/// task-set fan-out specialization from §4.5: `elem_fn` is invoked once per
/// element, by whichever workers participate in draining `outstanding`.
pub(crate) enum TaskBody {
    Single(Mutex<Option<Box<dyn FnOnce() -> Option<TaskRef> + Send>>>),
    Set(TaskSetBody),
}

pub(crate) struct TaskSetBody {
    pub(crate) elem_fn: Box<dyn Fn(usize) + Send + Sync>,
    pub(crate) count: usize,
    /// Outstanding element count. A single atomic decrement returns the
    /// *old* value; a worker runs element `old - 1` when `old > 0` and stops
    /// otherwise (see DESIGN.md for why this, rather than a signed
    /// `while --n >= 0`, is the resolution used here).
    pub(crate) outstanding: AtomicI64,
}

/// The central schedulable entity. See module docs and the crate's
/// `SPEC_FULL.md` §3–4 for the full contract; this struct is deliberately a
/// direct transcription of that state machine into atomics plus two
/// `Mutex`-guarded target slots.
pub struct Task {
    name: Option<String>,
    to_start: AtomicI64,
    to_end: AtomicI64,
    scheduled_once: AtomicBool,
    state: AtomicU8,
    // -1 == Affinity::Any, otherwise a worker index.
    affinity: AtomicI32,
    priority: AtomicU8,
    continuation: Mutex<Option<TaskRef>>,
    completion: Mutex<Option<TaskRef>>,
    pub(crate) body: TaskBody,
    // A weak handle back to this task's own `Arc`, set up at construction via
    // `Arc::new_cyclic`. `&self` methods that need to hand the scheduler an
    // owned `TaskRef` (`scheduled`, `wait_for_completion`) upgrade this
    // instead of requiring callers to pass one in: stable Rust has no
    // `self: &Arc<Self>` receiver, only `self: Arc<Self>` by value, which
    // would force every call site to clone first.
    self_ref: Weak<Task>,
}

impl Task {
    /// Construct a new single-run task. `run_fn` takes no arguments and may
    /// return a follow-up [`TaskRef`] to be executed inline without
    /// re-queuing.
    pub fn new<F>(run_fn: F, name: Option<String>) -> TaskRef
    where
        F: FnOnce() -> Option<TaskRef> + Send + 'static,
    {
        Arc::new_cyclic(|weak| Task {
            name,
            to_start: AtomicI64::new(1),
            to_end: AtomicI64::new(1),
            scheduled_once: AtomicBool::new(false),
            state: AtomicU8::new(TaskState::New as u8),
            affinity: AtomicI32::new(-1),
            priority: AtomicU8::new(Priority::Normal as u8),
            continuation: Mutex::new(None),
            completion: Mutex::new(None),
            body: TaskBody::Single(Mutex::new(Some(Box::new(run_fn)))),
            self_ref: weak.clone(),
        })
    }

    /// Construct a task-set fan-out task over `count` elements
    /// (`0..count`). `elem_fn` is invoked once per element index, from
    /// whichever worker(s) end up draining the set.
    pub fn new_set<F>(elem_fn: F, count: usize, name: Option<String>) -> TaskRef
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        Arc::new_cyclic(|weak| Task {
            name,
            to_start: AtomicI64::new(1),
            to_end: AtomicI64::new(1),
            scheduled_once: AtomicBool::new(false),
            state: AtomicU8::new(TaskState::New as u8),
            affinity: AtomicI32::new(-1),
            priority: AtomicU8::new(Priority::Normal as u8),
            continuation: Mutex::new(None),
            completion: Mutex::new(None),
            body: TaskBody::Set(TaskSetBody {
                elem_fn: Box::new(elem_fn),
                count,
                outstanding: AtomicI64::new(count as i64),
            }),
            self_ref: weak.clone(),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> TaskState {
        state_from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn affinity(&self) -> Affinity {
        match self.affinity.load(Ordering::Acquire) {
            -1 => Affinity::Any,
            w => Affinity::Worker(w as usize),
        }
    }

    pub fn priority(&self) -> Priority {
        match self.priority.load(Ordering::Acquire) {
            0 => Priority::High,
            1 => Priority::Normal,
            _ => Priority::Low,
        }
    }

    /// Set the worker this task must run on. Must be called before
    /// `scheduled()`. Range-checked lazily at schedule time, once the
    /// scheduler (and therefore its worker count) is known to exist.
    pub fn set_affinity(&self, affinity: Affinity) {
        let v = match affinity {
            Affinity::Any => -1,
            Affinity::Worker(w) => w as i32,
        };
        self.affinity.store(v, Ordering::Release);
    }

    pub fn set_priority(&self, priority: Priority) {
        self.priority.store(priority as u8, Ordering::Release);
    }

    fn check_not_ended(&self) {
        if matches!(self.state(), TaskState::Done) {
            fatal(SchedulerError::UseAfterEnd(self.name.clone()));
        }
    }

    /// Upgrade this task's weak self-reference into an owned `TaskRef`. Only
    /// fails if called during the task's own `Drop`, which none of our call
    /// sites do.
    fn arc(&self) -> TaskRef {
        self.self_ref
            .upgrade()
            .expect("task has no outstanding TaskRef to upgrade from")
    }

    /// Sequencing edge: `other` cannot begin until `self` has ended.
    /// Registers `self` as `other`'s continuation predecessor and increments
    /// `other`'s to-start count.
    pub fn starts(&self, other: &TaskRef) {
        self.check_not_ended();
        other.check_not_ended();
        let mut slot = self.continuation.lock().unwrap();
        if slot.is_some() {
            fatal(SchedulerError::DoubleSchedule(self.name.clone()));
        }
        *slot = Some(Arc::clone(other));
        other.to_start.fetch_add(1, Ordering::AcqRel);
    }

    /// Aggregation edge: `other` cannot complete until `self` has ended.
    /// Registers `self` as `other`'s completion child and increments
    /// `other`'s to-end count.
    pub fn ends(&self, other: &TaskRef) {
        self.check_not_ended();
        other.check_not_ended();
        let mut slot = self.completion.lock().unwrap();
        if slot.is_some() {
            fatal(SchedulerError::DoubleSchedule(self.name.clone()));
        }
        *slot = Some(Arc::clone(other));
        other.to_end.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark the task ready. Decrements to-start; if it reaches zero the task
    /// transitions `New -> Ready` and is handed to the scheduler for
    /// dispatch. Must not be called more than once.
    pub fn scheduled(&self) {
        if self
            .scheduled_once
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            fatal(SchedulerError::DoubleSchedule(self.name.clone()));
        }
        let remaining = self.to_start.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            self.state.store(TaskState::Ready as u8, Ordering::Release);
            scheduler::dispatch_ready(self.arc());
        }
    }

    /// Main-thread-only: synchronously wait for this task's to-end count to
    /// reach zero, by re-entering the dispatch loop.
    pub fn wait_for_completion(&self) {
        scheduler::wait_for_task(self);
    }

    // -- internals used by worker.rs / scheduler.rs -------------------------

    pub(crate) fn mark_running(&self) {
        self.state.store(TaskState::Running as u8, Ordering::Release);
    }

    pub(crate) fn to_end_is_zero(&self) -> bool {
        self.to_end.load(Ordering::Acquire) <= 0
    }

    /// Step 1 of the completion protocol: the task's own `run` has
    /// returned, so it contributes its own "end". Returns the post-decrement
    /// value.
    pub(crate) fn finish_own_run(&self) -> i64 {
        self.to_end.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn bump_to_end(&self) {
        self.to_end.fetch_add(1, Ordering::AcqRel);
    }

    /// Take the continuation target, releasing this task's reference to it.
    pub(crate) fn take_continuation(&self) -> Option<TaskRef> {
        self.continuation.lock().unwrap().take()
    }

    /// Take the completion target, releasing this task's reference to it.
    pub(crate) fn take_completion(&self) -> Option<TaskRef> {
        self.completion.lock().unwrap().take()
    }

    /// Decrement the to-start counter of a continuation becoming releasable;
    /// returns the post-decrement value.
    pub(crate) fn release_start(&self) -> i64 {
        self.to_start.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Decrement the to-end counter of a completion target in the chain
    /// walk; returns the post-decrement value.
    pub(crate) fn release_end(&self) -> i64 {
        self.to_end.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub(crate) fn mark_done(&self) {
        self.state.store(TaskState::Done as u8, Ordering::Release);
    }

    /// Take the `Single` run closure, leaving `None` behind so a second
    /// invocation is detectable (and fatal).
    pub(crate) fn take_run_fn(&self) -> Option<Box<dyn FnOnce() -> Option<TaskRef> + Send>> {
        match &self.body {
            TaskBody::Single(slot) => slot.lock().unwrap().take(),
            TaskBody::Set(_) => None,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("to_start", &self.to_start.load(Ordering::Relaxed))
            .field("to_end", &self.to_end.load(Ordering::Relaxed))
            .field("affinity", &self.affinity())
            .field("priority", &self.priority())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_has_expected_initial_counters() {
        let t = Task::new(|| None, Some("t".into()));
        assert_eq!(t.to_start.load(Ordering::Relaxed), 1);
        assert_eq!(t.to_end.load(Ordering::Relaxed), 1);
        assert_eq!(t.state(), TaskState::New);
    }

    #[test]
    fn affinity_default_is_any() {
        let t = Task::new(|| None, None);
        assert_eq!(t.affinity(), Affinity::Any);
    }

    #[test]
    fn set_affinity_round_trips() {
        let t = Task::new(|| None, None);
        t.set_affinity(Affinity::Worker(3));
        assert_eq!(t.affinity(), Affinity::Worker(3));
    }

    #[test]
    fn priority_default_is_normal() {
        let t = Task::new(|| None, None);
        assert_eq!(t.priority(), Priority::Normal);
    }

    #[test]
    fn starts_increments_target_to_start() {
        let a = Task::new(|| None, Some("a".into()));
        let b = Task::new(|| None, Some("b".into()));
        assert_eq!(b.to_start.load(Ordering::Relaxed), 1);
        a.starts(&b);
        assert_eq!(b.to_start.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn ends_increments_target_to_end() {
        let a = Task::new(|| None, Some("a".into()));
        let b = Task::new(|| None, Some("b".into()));
        assert_eq!(b.to_end.load(Ordering::Relaxed), 1);
        a.ends(&b);
        assert_eq!(b.to_end.load(Ordering::Relaxed), 2);
    }

    #[test]
    #[should_panic(expected = "scheduled twice")]
    fn starts_twice_is_fatal() {
        let a = Task::new(|| None, Some("a".into()));
        let b = Task::new(|| None, Some("b".into()));
        let c = Task::new(|| None, Some("c".into()));
        a.starts(&b);
        a.starts(&c);
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }
}
