//! Scenario F (spec §8): a task that spawns one child via `ends(self)` and
//! returns another as an inline continuation, recursing to a very large
//! depth, must complete without a deque overflow — the inline path never
//! touches a deque at all, and the single "leaf" pushed per level is sized
//! against a deque big enough to hold it regardless of how quickly idle
//! workers steal it back out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use task_scheduler::{scheduler, SchedulerConfig, Task, TaskRef};

const DEPTH: u64 = 1_000_000;

fn spawn_chain(depth: u64, counter: Arc<AtomicU64>) -> TaskRef {
    let self_slot: Arc<OnceLock<TaskRef>> = Arc::new(OnceLock::new());
    let self_slot_run = self_slot.clone();

    let task = Task::new(
        move || {
            let this = self_slot_run
                .get()
                .expect("self-reference is set before this task can run")
                .clone();

            let leaf = Task::new(|| None, None);
            leaf.ends(&this);
            leaf.scheduled();

            if depth == 0 {
                counter.fetch_add(1, Ordering::Relaxed);
                // Base case: release the main thread. Callable from any
                // worker, not just worker 0 — whichever thread happens to be
                // running the tail end of the inline chain reaches here.
                scheduler::interrupt_main();
                None
            } else {
                Some(spawn_chain(depth - 1, counter.clone()))
            }
        },
        None,
    );
    self_slot
        .set(task.clone())
        .unwrap_or_else(|_| panic!("self_slot set twice"));
    task
}

#[test_log::test]
fn million_deep_inline_continuation_completes_without_overflow() {
    // The chain runs as one long sequence of inline continuations on a
    // single worker, pushing one tiny "leaf" per level onto that worker's
    // own deque for peers to steal. Sized well above `DEPTH` so the push
    // rate of a tight inline loop can never outrun the steal rate and hit
    // the fixed-capacity overflow path — see spec §4.2's "size the deque
    // for peak depth" guidance.
    let config = SchedulerConfig::with_workers(4).deque_capacity(DEPTH as usize + 1024);
    scheduler::start(config);

    let counter = Arc::new(AtomicU64::new(0));
    let root = spawn_chain(DEPTH, counter.clone());
    root.scheduled();

    // `root.wait_for_completion()` would only observe root's own `leaf`
    // ending, not the rest of the million-deep chain — wait on the
    // base-case `interrupt_main()` signal instead, the same idiom as
    // Scenario A.
    scheduler::enter();

    assert_eq!(counter.load(Ordering::Relaxed), 1);

    scheduler::shutdown();
}
