//! Scheduler configuration.

use std::time::Duration;

use crate::api::error::SchedError;
use crate::device::Timeout;
use crate::sched::QueueMode;
use crate::work::DebugViewMode;

/// Configuration for the frame scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedConfig {
    /// Number of resource slots in the pool (default: 12)
    pub pool_capacity: usize,

    /// Upper bound for the batch size (default: 6)
    pub max_batch_size: usize,

    /// Requested jobs per batch, clamped to `[1, max_batch_size]` (default: 6)
    pub batch_size: usize,

    /// Queue layout (default: dual-queue)
    pub mode: QueueMode,

    /// Bound on every host wait (default: infinite)
    pub wait_timeout: Timeout,

    /// Debug coloring handed to the consumer recorder (default: off)
    pub debug_view: DebugViewMode,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 12,
            max_batch_size: 6,
            batch_size: 6,
            mode: QueueMode::DualQueue,
            wait_timeout: Timeout::Infinite,
            debug_view: DebugViewMode::Off,
        }
    }
}

impl SchedConfig {
    /// Create a minimal config for tests: a small pool and a bounded wait so a
    /// missed signal fails fast instead of hanging.
    pub fn minimal() -> Self {
        Self {
            pool_capacity: 4,
            max_batch_size: 2,
            batch_size: 2,
            mode: QueueMode::DualQueue,
            wait_timeout: Timeout::After(Duration::from_millis(100)),
            debug_view: DebugViewMode::Off,
        }
    }

    /// Create a config for large frames: a deep pool and large batches.
    pub fn high_throughput() -> Self {
        Self {
            pool_capacity: 32,
            max_batch_size: 16,
            batch_size: 16,
            mode: QueueMode::DualQueue,
            wait_timeout: Timeout::Infinite,
            debug_view: DebugViewMode::Off,
        }
    }

    /// Builder pattern: set pool capacity.
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Builder pattern: set the batch size bound.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    /// Builder pattern: set the requested batch size.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Builder pattern: set the queue mode.
    pub fn with_mode(mut self, mode: QueueMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder pattern: set the host wait timeout.
    pub fn with_wait_timeout(mut self, timeout: Timeout) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Builder pattern: set the debug view.
    pub fn with_debug_view(mut self, mode: DebugViewMode) -> Self {
        self.debug_view = mode;
        self
    }

    /// Check the configuration for values no scheduler can run with.
    ///
    /// The single-queue spacing rule is checked against the effective batch size.
    pub fn validate(&self) -> Result<(), SchedError> {
        if self.pool_capacity == 0 {
            return Err(SchedError::Config(
                "pool_capacity must be at least 1".to_string(),
            ));
        }
        if u32::try_from(self.pool_capacity).is_err() {
            return Err(SchedError::Config(format!(
                "pool_capacity {} is too large",
                self.pool_capacity
            )));
        }
        if self.max_batch_size == 0 || self.max_batch_size > self.pool_capacity {
            return Err(SchedError::Config(format!(
                "max_batch_size must be within [1, pool_capacity = {}], got {}",
                self.pool_capacity, self.max_batch_size
            )));
        }
        let batch_size = clamp_batch_size(self.batch_size, self.max_batch_size);
        check_spacing(self.mode, batch_size, self.pool_capacity)
    }

    /// Requested batch size clamped into `[1, max_batch_size]`.
    ///
    /// Emits FS001 when the clamp changes the value.
    pub fn effective_batch_size(&self) -> usize {
        let effective = clamp_batch_size(self.batch_size, self.max_batch_size);
        if effective != self.batch_size {
            crate::fs_emit!(
                FS001,
                "requested {}, using {}",
                self.batch_size,
                effective
            );
        }
        effective
    }
}

pub(crate) fn clamp_batch_size(requested: usize, max: usize) -> usize {
    requested.clamp(1, max.max(1))
}

/// Single-queue mode relies on consecutive batches using disjoint slots.
pub(crate) fn check_spacing(
    mode: QueueMode,
    batch_size: usize,
    capacity: usize,
) -> Result<(), SchedError> {
    if mode == QueueMode::SingleQueue && batch_size.saturating_mul(2) > capacity {
        crate::fs_emit!(FS004, "batch_size {}, pool_capacity {}", batch_size, capacity);
        return Err(SchedError::Config(format!(
            "single-queue mode needs 2 * batch_size <= pool_capacity, got batch_size {} with {} slots",
            batch_size, capacity
        )));
    }
    Ok(())
}
