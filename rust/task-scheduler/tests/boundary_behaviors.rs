//! Boundary behavior (spec §8): a task scheduled with `to_start` already
//! zero (no predecessors at all) is enqueued immediately.
//!
//! See `affinity_only_never_stolen.rs` for the sibling affinity boundary
//! case, kept in its own file since `scheduler::start` is a process-wide
//! `OnceLock` and only one scenario can run it per test binary/process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use task_scheduler::{scheduler, SchedulerConfig, Task};

#[test_log::test]
fn task_with_no_predecessors_is_ready_immediately_on_schedule() {
    scheduler::start(SchedulerConfig::with_workers(2));

    let ran = Arc::new(AtomicBool::new(false));
    let ran_inner = ran.clone();
    let t = Task::new(
        move || {
            ran_inner.store(true, Ordering::Relaxed);
            scheduler::interrupt_main();
            None
        },
        Some("no-predecessors".into()),
    );

    // No `starts`/`ends` wiring at all: `to_start` is already 1, so
    // `scheduled()` drops it straight to zero and it is enqueued on the
    // spot rather than waiting on anything.
    t.scheduled();
    scheduler::enter();

    assert!(ran.load(Ordering::Relaxed));

    scheduler::shutdown();
}
