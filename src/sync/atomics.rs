//! Atomic counters for device-side statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter readable from any thread.
#[derive(Debug)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create a new counter.
    pub const fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    /// Increment the counter, returning the value before the increment.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_returns_previous() {
        let counter = AtomicCounter::new(5);
        assert_eq!(counter.increment(), 5);
        assert_eq!(counter.get(), 6);
        assert_eq!(AtomicCounter::default().get(), 0);
    }
}
