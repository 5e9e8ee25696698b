//! Fatal-error taxonomy for the scheduler.
//!
//! Every condition in this enum indicates a programmer error (a violated
//! invariant of the task state machine or the scheduler lifecycle), not an
//! operational failure. There is no local recovery: callers get a
//! `SchedulerError` only so that `fatal()` has something with a useful
//! `Display` impl to log before it turns the condition into a panic.
//!
//! This mirrors the `ToolError`/`SendError` pattern used elsewhere in this
//! codebase's sibling crates: a single `thiserror`-derived enum per
//! subsystem, constructed at the point of failure and logged via `tracing`
//! before control leaves the function.

use std::any::Any;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("work-stealing deque overflow on worker {worker}: capacity {capacity} exceeded")]
    QueueOverflow { worker: usize, capacity: usize },

    #[error("task {0:?} scheduled twice")]
    DoubleSchedule(Option<String>),

    #[error("starts()/ends() wired on task {0:?} after its to-end count already reached zero")]
    UseAfterEnd(Option<String>),

    #[error("affinity worker index {worker} is out of range (scheduler has {worker_count} workers)")]
    AffinityOutOfRange { worker: usize, worker_count: usize },

    #[error("scheduler operation attempted before scheduler_start() was called")]
    NotStarted,

    #[error("scheduler_start() called more than once")]
    AlreadyStarted,
}

/// Log `err` at `error` level and then panic with its `Display` text.
///
/// Per the error design, these conditions are "fatal: diagnostic + abort".
/// Panicking rather than calling `std::process::abort` directly keeps the
/// crate usable under `#[should_panic]` tests and `catch_unwind`-based
/// harnesses while still being fatal from the caller's point of view: an
/// unwinding panic that nobody catches aborts the process all the same, and
/// the scheduler never installs a catch for these specific panics.
#[track_caller]
pub(crate) fn fatal(err: SchedulerError) -> ! {
    tracing::error!(error = %err, "scheduler: fatal error");
    panic!("{err}");
}

/// A caught panic payload from a task's `run` function.
///
/// Extracted the same way a panic boundary would extract it anywhere else in
/// this codebase: `&str` and `String` payloads get their message, anything
/// else gets a generic placeholder.
#[derive(Debug, Clone)]
pub struct TaskPanic {
    message: String,
}

impl TaskPanic {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked: {}", self.message)
    }
}

impl std::error::Error for TaskPanic {}
