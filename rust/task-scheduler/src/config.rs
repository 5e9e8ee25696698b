//! Scheduler configuration.

use crate::error::SchedulerError;
use std::time::Duration;

/// Default fixed capacity of each per-worker, per-priority-band work-stealing
/// deque. The spec recommends at least 2048; callers with deeper recursive
/// fan-out should raise this rather than rely on dynamic growth (there isn't
/// any — overflow is fatal by design, see [`crate::error::SchedulerError::QueueOverflow`]).
pub const DEFAULT_DEQUE_CAPACITY: usize = 2048;

/// Default back-off duration a worker parks for when it finds no work
/// anywhere (its own affinity queue, its own deques, and every peer's
/// deques).
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1);

/// Builder-style configuration for [`crate::scheduler::Scheduler::start`].
///
/// `worker_count = 0` means "use `logical_cores - 1` background threads",
/// matching the external interface's convention that the main thread itself
/// is always worker 0 and does not need to be counted here.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    pub deque_capacity: usize,
    pub backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            deque_capacity: DEFAULT_DEQUE_CAPACITY,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl SchedulerConfig {
    /// Convenience constructor for the common case of just picking a worker
    /// count and leaving everything else at its default.
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    pub fn deque_capacity(mut self, capacity: usize) -> Self {
        self.deque_capacity = capacity;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Resolve `worker_count == 0` into an actual background-thread count and
    /// validate the remaining fields.
    pub(crate) fn resolve(&self) -> Result<usize, SchedulerError> {
        if self.deque_capacity == 0 {
            return Err(SchedulerError::QueueOverflow {
                worker: 0,
                capacity: 0,
            });
        }
        let background = if self.worker_count == 0 {
            num_cpus::get().saturating_sub(1).max(1)
        } else {
            self.worker_count
        };
        Ok(background)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.worker_count, 0);
        assert_eq!(cfg.deque_capacity, DEFAULT_DEQUE_CAPACITY);
        assert_eq!(cfg.backoff, DEFAULT_BACKOFF);
    }

    #[test]
    fn with_workers_sets_only_worker_count() {
        let cfg = SchedulerConfig::with_workers(4);
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.deque_capacity, DEFAULT_DEQUE_CAPACITY);
    }

    #[test]
    fn resolve_zero_worker_count_is_nonzero() {
        let cfg = SchedulerConfig::with_workers(0);
        assert!(cfg.resolve().unwrap() >= 1);
    }

    #[test]
    fn resolve_explicit_worker_count_is_unchanged() {
        let cfg = SchedulerConfig::with_workers(7);
        assert_eq!(cfg.resolve().unwrap(), 7);
    }

    #[test]
    fn zero_deque_capacity_rejected() {
        let cfg = SchedulerConfig::with_workers(2).deque_capacity(0);
        assert!(cfg.resolve().is_err());
    }
}
