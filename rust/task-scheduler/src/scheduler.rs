//! The scheduler: thread pool, dispatch loop, run policy, shutdown.
//!
//! Modeled as a process-wide singleton behind a `OnceLock`, matching the
//! design notes' "process-wide handle with an explicit init/shutdown
//! contract" — and the original C++ source's own `extern TaskScheduler*
//! scheduler;` global. The main thread is always worker 0; it is registered
//! as such inside [`start`], before any task can possibly run.

use crate::config::SchedulerConfig;
use crate::error::{fatal, SchedulerError};
use crate::task::{Affinity, Task, TaskRef};
use crate::worker::{self, WorkerQueues};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::thread::{self, JoinHandle};

static SCHEDULER: OnceLock<Scheduler> = OnceLock::new();

pub(crate) struct Scheduler {
    pub(crate) queues: Vec<WorkerQueues>,
    total_workers: usize,
    config: SchedulerConfig,
    shutdown: AtomicBool,
    interrupt_main: AtomicBool,
    join_handles: Mutex<Vec<JoinHandle<()>>>,
}

fn get() -> &'static Scheduler {
    SCHEDULER.get().unwrap_or_else(|| fatal(SchedulerError::NotStarted))
}

/// Initialize the thread pool. Must be called exactly once, from the main
/// thread, before any task is scheduled. `config.worker_count == 0` means
/// "use `logical_cores - 1`" background threads, plus the main thread as
/// worker 0.
pub fn start(config: SchedulerConfig) {
    let background = match config.resolve() {
        Ok(n) => n,
        Err(e) => fatal(e),
    };
    let total_workers = background + 1;

    let mut queues = Vec::with_capacity(total_workers);
    for _ in 0..total_workers {
        queues.push(WorkerQueues::new(&config));
    }

    let scheduler = Scheduler {
        queues,
        total_workers,
        config,
        shutdown: AtomicBool::new(false),
        interrupt_main: AtomicBool::new(false),
        join_handles: Mutex::new(Vec::with_capacity(background)),
    };

    if SCHEDULER.set(scheduler).is_err() {
        fatal(SchedulerError::AlreadyStarted);
    }

    // Register the calling (main) thread as worker 0 before spawning any
    // background threads, so `current_worker_id()` is valid immediately.
    worker::set_current_worker(0);

    let scheduler = get();
    let mut handles = Vec::with_capacity(background);
    for idx in 1..total_workers {
        let jh = thread::Builder::new()
            .name(format!("task-scheduler-worker-{idx}"))
            .spawn(move || background_worker_loop(idx))
            .expect("failed to spawn worker thread");
        handles.push(jh);
    }
    *scheduler.join_handles.lock().unwrap() = handles;

    tracing::info!(total_workers, "scheduler started");
}

/// The main thread participates in dispatch until `interrupt_main()` is
/// called (from any task or thread) or shutdown is requested.
pub fn enter() {
    let scheduler = get();
    scheduler.interrupt_main.store(false, Ordering::Release);
    let mut cursor = 1usize.min(scheduler.total_workers.saturating_sub(1).max(1));
    loop {
        if scheduler.shutdown.load(Ordering::Acquire) || scheduler.interrupt_main.load(Ordering::Acquire) {
            return;
        }
        match worker::try_get_task(scheduler, 0, &mut cursor) {
            Some(task) => worker::execute(task),
            None => thread::park_timeout(scheduler.config.backoff),
        }
    }
}

/// Callable from any task or thread: releases the main thread from
/// `enter()`. Other workers are unaffected and keep running.
pub fn interrupt_main() {
    get().interrupt_main.store(true, Ordering::Release);
}

/// Signal all workers to exit their dispatch loops at the next iteration and
/// join them. Must be the final scheduler call. Queues are not drained —
/// any tasks still pending are abandoned.
pub fn shutdown() {
    let scheduler = get();
    if scheduler.shutdown.swap(true, Ordering::AcqRel) {
        return; // already shut down
    }
    let handles = std::mem::take(&mut *scheduler.join_handles.lock().unwrap());
    for h in handles {
        let _ = h.join();
    }
    tracing::info!("scheduler shut down");
}

/// Total number of workers, including the main thread (worker 0).
pub fn worker_count() -> usize {
    get().total_workers
}

/// The calling thread's worker index, if it is a registered worker.
pub fn current_worker_id() -> usize {
    worker::current_worker_id().unwrap_or_else(|| fatal(SchedulerError::NotStarted))
}

fn background_worker_loop(idx: usize) {
    worker::set_current_worker(idx);
    let scheduler = get();
    let mut cursor = (idx + 1) % scheduler.total_workers.max(1);
    loop {
        if scheduler.shutdown.load(Ordering::Acquire) {
            return;
        }
        match worker::try_get_task(scheduler, idx, &mut cursor) {
            Some(task) => {
                tracing::trace!(worker_id = idx, action = "dispatch", task = ?task.name());
                worker::execute(task);
            }
            None => {
                tracing::trace!(worker_id = idx, action = "backoff");
                thread::park_timeout(scheduler.config.backoff);
            }
        }
    }
}

/// Route a newly-ready (`to_start == 0`) task to its destination: the
/// designated worker's affinity queue, or the calling worker's deque at the
/// task's priority band.
pub(crate) fn dispatch_ready(task: TaskRef) {
    let scheduler = get();
    match task.affinity() {
        Affinity::Worker(w) => {
            if w >= scheduler.total_workers {
                fatal(SchedulerError::AffinityOutOfRange {
                    worker: w,
                    worker_count: scheduler.total_workers,
                });
            }
            worker::push_affinity(scheduler, w, task);
        }
        Affinity::Any => {
            // Tasks are normally made ready from within a running task (a
            // worker) or from the main thread during setup, both of which
            // are registered workers. Falling back to worker 0 covers the
            // rare case of an unrelated thread calling `scheduled()`.
            let idx = worker::current_worker_id().unwrap_or(0);
            worker::push_local(scheduler, idx, task);
        }
    }
}

/// Used by the task-set self-re-enqueue: push directly onto worker `idx`'s
/// queue (respecting the task's own affinity), bypassing the to-start dance
/// since the task is already running, not newly ready.
pub(crate) fn enqueue_ready_on(idx: usize, task: TaskRef) {
    let scheduler = get();
    match task.affinity() {
        Affinity::Worker(w) => worker::push_affinity(scheduler, w, task),
        Affinity::Any => worker::push_local(scheduler, idx, task),
    }
}

/// Main-thread-only: synchronously wait for `task`'s to-end count to reach
/// zero by re-entering the dispatch loop.
pub(crate) fn wait_for_task(task: &Task) {
    let scheduler = get();
    let mut cursor = 1usize.min(scheduler.total_workers.saturating_sub(1).max(1));
    loop {
        if task.to_end_is_zero() {
            return;
        }
        if scheduler.shutdown.load(Ordering::Acquire) {
            return;
        }
        match worker::try_get_task(scheduler, 0, &mut cursor) {
            Some(t) => worker::execute(t),
            None => thread::park_timeout(scheduler.config.backoff),
        }
    }
}
