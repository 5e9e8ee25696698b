//! Per-worker affinity queue: a plain FIFO for tasks pinned to a specific
//! worker. Unlike the work-stealing deques, nobody but the owning worker
//! ever pops from this queue, so there's no steal path and no fixed
//! capacity — it is sized by whatever the caller pins to that worker.

use crate::task::TaskRef;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) struct AffinityQueue {
    items: Mutex<VecDeque<TaskRef>>,
    len: AtomicUsize,
}

impl AffinityQueue {
    pub(crate) fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    pub(crate) fn push(&self, task: TaskRef) {
        let mut guard = self.items.lock().unwrap();
        guard.push_back(task);
        self.len.store(guard.len(), Ordering::Release);
    }

    /// Only ever called by the owning worker.
    pub(crate) fn pop(&self) -> Option<TaskRef> {
        if self.len.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut guard = self.items.lock().unwrap();
        let item = guard.pop_front();
        self.len.store(guard.len(), Ordering::Release);
        item
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    #[test]
    fn push_pop_is_fifo() {
        let q = AffinityQueue::new();
        let a = Task::new(|| None, Some("a".into()));
        let b = Task::new(|| None, Some("b".into()));
        q.push(a.clone());
        q.push(b.clone());
        assert_eq!(q.pop().unwrap().name(), Some("a"));
        assert_eq!(q.pop().unwrap().name(), Some("b"));
        assert!(q.pop().is_none());
    }

    #[test]
    fn empty_queue_reports_empty() {
        let q = AffinityQueue::new();
        assert!(q.is_empty());
        q.push(Task::new(|| None, None));
        assert!(!q.is_empty());
    }
}
