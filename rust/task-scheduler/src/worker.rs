//! Per-worker state and the dispatch/execute loops.
//!
//! Each worker (background OS thread or the main thread acting as worker 0)
//! owns one [`WorkerQueues`]: three priority-banded work-stealing deques
//! plus one affinity queue. All workers' `WorkerQueues` are reachable from
//! every thread (via `Scheduler::queues`) because stealing and affinity
//! routing both need to reach into a peer's state.

use crate::config::SchedulerConfig;
use crate::deque::Deque;
use crate::error::{fatal, SchedulerError, TaskPanic};
use crate::affinity::AffinityQueue;
use crate::scheduler::Scheduler;
use crate::task::{TaskRef, TaskBody, PRIORITY_BANDS};
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;

thread_local! {
    /// Set once, when a thread becomes a worker: either at the top of a
    /// spawned background thread's body, or when the main thread calls
    /// `scheduler::start` (it is always worker 0).
    static CURRENT_WORKER: Cell<Option<usize>> = Cell::new(None);
}

pub(crate) fn set_current_worker(idx: usize) {
    CURRENT_WORKER.with(|c| c.set(Some(idx)));
}

pub(crate) fn current_worker_id() -> Option<usize> {
    CURRENT_WORKER.with(|c| c.get())
}

pub(crate) struct WorkerQueues {
    pub(crate) deques: [Deque<TaskRef>; 3],
    pub(crate) affinity: AffinityQueue,
}

impl WorkerQueues {
    pub(crate) fn new(config: &SchedulerConfig) -> Self {
        Self {
            deques: [
                Deque::new(config.deque_capacity),
                Deque::new(config.deque_capacity),
                Deque::new(config.deque_capacity),
            ],
            affinity: AffinityQueue::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.affinity.is_empty() && self.deques.iter().all(Deque::is_empty)
    }
}

/// Push `task` onto worker `idx`'s deque at its own priority band. Used both
/// for routing newly-ready `Affinity::Any` tasks and for a task-set's
/// self-re-enqueue.
pub(crate) fn push_local(scheduler: &Scheduler, idx: usize, task: TaskRef) {
    let band = task.priority().index();
    let queues = &scheduler.queues[idx];
    if queues.deques[band].push(task).is_err() {
        fatal(SchedulerError::QueueOverflow {
            worker: idx,
            capacity: queues.deques[band].capacity(),
        });
    }
}

pub(crate) fn push_affinity(scheduler: &Scheduler, idx: usize, task: TaskRef) {
    scheduler.queues[idx].affinity.push(task);
}

/// Try to find one ready task for worker `idx`: its own affinity queue
/// first, then its own deques (HIGH, NORMAL, LOW), then stealing from peers
/// in round-robin order starting at `cursor` (advanced in place).
pub(crate) fn try_get_task(scheduler: &Scheduler, idx: usize, cursor: &mut usize) -> Option<TaskRef> {
    let mine = &scheduler.queues[idx];

    if let Some(t) = mine.affinity.pop() {
        return Some(t);
    }
    for band in PRIORITY_BANDS {
        if let Some(t) = mine.deques[band.index()].pop_local() {
            return Some(t);
        }
    }

    let n = scheduler.queues.len();
    for step in 0..n {
        let victim = (*cursor + step) % n;
        if victim == idx {
            continue;
        }
        for band in PRIORITY_BANDS {
            if let Some(t) = scheduler.queues[victim].deques[band.index()].steal() {
                *cursor = victim;
                return Some(t);
            }
        }
    }
    *cursor = (*cursor + 1) % n.max(1);
    None
}

fn run_body(task: &TaskRef) -> Option<TaskRef> {
    match &task.body {
        TaskBody::Single(_) => {
            let f = task
                .take_run_fn()
                .unwrap_or_else(|| fatal(SchedulerError::DoubleSchedule(task.name().map(str::to_owned))));
            f()
        }
        TaskBody::Set(set) => {
            // Gate the re-enqueue on a read taken *before* the decrement
            // loop: a copy popped after the set is already drained observes
            // `outstanding <= 0` here and simply returns without pushing
            // another copy, keeping to-end increments and decrements in
            // lockstep (see DESIGN.md).
            let should_requeue = set.outstanding.load(Ordering::Acquire) > 0;
            if should_requeue {
                task.bump_to_end();
                let idx = current_worker_id().expect("run_body executes on a registered worker");
                let clone = std::sync::Arc::clone(task);
                crate::scheduler::enqueue_ready_on(idx, clone);
            }
            loop {
                let old = set.outstanding.fetch_sub(1, Ordering::AcqRel);
                if old > 0 {
                    (set.elem_fn)((old - 1) as usize);
                } else {
                    break;
                }
            }
            None
        }
    }
}

/// Run a task to completion, including any chain of inline continuations
/// returned from `run`, and apply the completion protocol after each one.
pub(crate) fn execute(task: TaskRef) {
    let mut current = task;
    loop {
        current.mark_running();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| run_body(&current)));
        let next = match result {
            Ok(next) => next,
            Err(payload) => {
                let panic = TaskPanic::from_payload(payload);
                tracing::error!(task = ?current.name(), error = %panic, "task panicked, aborting process");
                std::process::abort();
            }
        };
        post_run(&current);
        match next {
            Some(n) => current = n,
            None => break,
        }
    }
}

/// The §4.1 run-completion protocol: decrement to-end, and if it reaches
/// zero, release the continuation first and then walk the completion chain
/// iteratively.
fn post_run(task: &TaskRef) {
    if task.finish_own_run() > 0 {
        return;
    }
    task.mark_done();
    release_continuation(task);
    // Iterative completion-chain walk: no recursion, each ancestor touched
    // at most once per finishing descendant.
    let mut cursor = task.take_completion();
    while let Some(parent) = cursor {
        if parent.release_end() > 0 {
            break;
        }
        parent.mark_done();
        release_continuation(&parent);
        cursor = parent.take_completion();
    }
}

fn release_continuation(task: &TaskRef) {
    if let Some(cont) = task.take_continuation() {
        if cont.release_start() == 0 {
            crate::scheduler::dispatch_ready(cont);
        }
    }
}
