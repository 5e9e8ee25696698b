//! Per-worker work-stealing deque.
//!
//! A fixed-capacity double-ended queue. The owning worker pushes and pops at
//! the head (LIFO — a parent task's freshly spawned child runs next, on the
//! same worker, for cache locality). Any other worker may steal from the
//! tail (FIFO — older, coarser-grained subtrees are handed to idle peers).
//!
//! Both ends are serialized by one [`Mutex`]; there is no lock-free fast
//! path here (unlike, say, a Chase-Lev deque) because the spec's overflow
//! and fixed-capacity semantics are easiest to keep correct behind a single
//! lock; an `AtomicUsize` length mirror lets `steal()` and the dispatch loop
//! skip the lock entirely when a deque is observed empty.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) struct Deque<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    // Mirrors `items.len()` so callers (notably steal victim probing) can
    // skip the lock when a deque is empty without racing on correctness:
    // a stale "non-empty" read just means we take the lock and find nothing.
    len: AtomicUsize,
}

impl<T> Deque<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            len: AtomicUsize::new(0),
        }
    }

    /// Owner-thread only. Push at the head (LIFO). `Err(item)` on overflow —
    /// callers turn this into a fatal [`crate::error::SchedulerError::QueueOverflow`].
    pub(crate) fn push(&self, item: T) -> Result<(), T> {
        let mut guard = self.items.lock().unwrap();
        if guard.len() >= self.capacity {
            return Err(item);
        }
        guard.push_front(item);
        self.len.store(guard.len(), Ordering::Release);
        Ok(())
    }

    /// Owner-thread only. Pop from the head (LIFO).
    pub(crate) fn pop_local(&self) -> Option<T> {
        if self.len.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut guard = self.items.lock().unwrap();
        let item = guard.pop_front();
        self.len.store(guard.len(), Ordering::Release);
        item
    }

    /// Any thread. Pop from the tail (FIFO).
    pub(crate) fn steal(&self) -> Option<T> {
        if self.len.load(Ordering::Acquire) == 0 {
            return None;
        }
        let mut guard = self.items.lock().unwrap();
        let item = guard.pop_back();
        self.len.store(guard.len(), Ordering::Release);
        item
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len.load(Ordering::Acquire) == 0
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_local_is_lifo() {
        let d: Deque<i32> = Deque::new(8);
        d.push(1).unwrap();
        d.push(2).unwrap();
        d.push(3).unwrap();
        assert_eq!(d.pop_local(), Some(3));
        assert_eq!(d.pop_local(), Some(2));
        assert_eq!(d.pop_local(), Some(1));
        assert_eq!(d.pop_local(), None);
    }

    #[test]
    fn steal_is_fifo() {
        let d: Deque<i32> = Deque::new(8);
        d.push(1).unwrap();
        d.push(2).unwrap();
        d.push(3).unwrap();
        assert_eq!(d.steal(), Some(1));
        assert_eq!(d.steal(), Some(2));
        assert_eq!(d.steal(), Some(3));
        assert_eq!(d.steal(), None);
    }

    #[test]
    fn overflow_returns_err() {
        let d: Deque<i32> = Deque::new(2);
        d.push(1).unwrap();
        d.push(2).unwrap();
        let overflowed = d.push(3);
        assert_eq!(overflowed, Err(3));
    }

    #[test]
    fn is_empty_reflects_state() {
        let d: Deque<i32> = Deque::new(4);
        assert!(d.is_empty());
        d.push(1).unwrap();
        assert!(!d.is_empty());
        d.pop_local();
        assert!(d.is_empty());
    }

    #[test]
    fn mixed_push_steal_and_pop_local() {
        let d: Deque<i32> = Deque::new(8);
        d.push(1).unwrap();
        d.push(2).unwrap();
        d.push(3).unwrap();
        // head has 3,2,1 (LIFO order); tail steal takes the oldest first.
        assert_eq!(d.steal(), Some(1));
        assert_eq!(d.pop_local(), Some(3));
        assert_eq!(d.steal(), Some(2));
        assert!(d.is_empty());
    }
}
