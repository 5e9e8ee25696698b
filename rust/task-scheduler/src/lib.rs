//! A user-space task scheduler for fine-grained, heterogeneous parallel
//! work: a directed acyclic graph of tasks whose nodes can spawn further
//! subgraphs at runtime.
//!
//! The scheduler routes a [`Task`] either to the current worker's
//! LIFO-local / FIFO-steal work-stealing deque (picked by priority band) or
//! to a specific worker's affinity queue, then drives it through the
//! `New -> Ready -> Running -> Done` state machine, resolving its
//! continuation (`starts`) and completion (`ends`) dependency edges as it
//! finishes. See `SPEC_FULL.md` for the full design.
//!
//! # Example
//!
//! ```no_run
//! use task_scheduler::{scheduler, Task};
//!
//! scheduler::start(Default::default());
//!
//! let done = Task::new(
//!     || {
//!         scheduler::interrupt_main();
//!         None
//!     },
//!     Some("done".into()),
//! );
//! let nothing = Task::new(|| None, Some("nothing".into()));
//! nothing.starts(&done);
//! done.scheduled();
//! nothing.scheduled();
//!
//! scheduler::enter();
//! scheduler::shutdown();
//! ```

mod affinity;
pub mod config;
pub mod error;
mod deque;
pub mod scheduler;
pub mod task;
mod worker;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use scheduler::{current_worker_id, worker_count};
pub use task::{Affinity, Priority, Task, TaskRef, TaskState};

/// Re-exports matching the exact free-function names from the external
/// interface spec, for callers that prefer that surface over the
/// `scheduler::` module path.
pub use scheduler::enter as scheduler_enter;
pub use scheduler::interrupt_main as scheduler_interrupt_main;
pub use scheduler::shutdown as scheduler_shutdown;
pub use scheduler::start as scheduler_start;
