//! Logical clock driving both timeline channels.
//!
//! One counter, `upcoming`, hands out the value every batch signals on both the
//! producer-done and the consumer-done channel, so values correlate 1:1 across
//! channels for the same batch. Value 0 is never signaled; waiting for 0 is
//! always satisfied.

/// A point in submitted work, used as a timeline semaphore target.
pub type TimelineValue = u64;

/// Value that every channel holds before any work has completed.
pub const TIMELINE_START: TimelineValue = 0;

/// Device-side wait and signal values for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTimeline {
    /// Consumer-done threshold the producer stage waits for before overwriting its slots.
    pub producer_wait: TimelineValue,
    /// Producer-done value the producer stage signals.
    pub producer_signal: TimelineValue,
    /// Producer-done threshold the consumer stage waits for.
    pub consumer_wait: TimelineValue,
    /// Consumer-done value the consumer stage signals.
    pub consumer_signal: TimelineValue,
}

/// Monotonic counter of batch submissions.
#[derive(Debug, Clone)]
pub struct LogicalClock {
    upcoming: TimelineValue,
}

impl LogicalClock {
    /// Create a clock whose first batch signals 1.
    pub fn new() -> Self {
        Self {
            upcoming: TIMELINE_START + 1,
        }
    }

    /// The value the next batch will signal.
    #[inline]
    pub fn upcoming(&self) -> TimelineValue {
        self.upcoming
    }

    /// The last value handed out, or [`TIMELINE_START`] if none yet.
    #[inline]
    pub fn last_issued(&self) -> TimelineValue {
        self.upcoming - 1
    }

    /// Build the wait/signal values for the next batch.
    ///
    /// `producer_wait` is the largest consumer-done value among the slots the batch
    /// is about to overwrite.
    ///
    /// # Panics
    ///
    /// Panics if `producer_wait >= upcoming()`: the batch would wait for its own
    /// completion and the device would deadlock.
    pub fn plan(&self, producer_wait: TimelineValue) -> BatchTimeline {
        assert!(
            producer_wait < self.upcoming,
            "circular timeline wait: batch signaling {} waits for consumer value {}",
            self.upcoming,
            producer_wait
        );
        BatchTimeline {
            producer_wait,
            producer_signal: self.upcoming,
            consumer_wait: self.upcoming,
            consumer_signal: self.upcoming,
        }
    }

    /// Consume the upcoming value. Returns the value just issued.
    pub fn advance(&mut self) -> TimelineValue {
        let issued = self.upcoming;
        self.upcoming += 1;
        issued
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::new()
    }
}
