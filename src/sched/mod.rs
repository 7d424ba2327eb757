//! Submission strategies.
//!
//! Both strategies consume the same batches (slots already assigned by the
//! scheduler) and differ only in how a batch reaches the device:
//!
//! - [`DualQueueScheduler`]: producer work on the compute queue, consumer work
//!   on the graphics queue, ordered by timeline waits in both directions.
//! - [`SingleQueueScheduler`]: everything on the graphics queue in one command
//!   buffer per batch, ordered by barriers.

use crate::core::batch::BatchRange;
use crate::core::clock::{BatchTimeline, LogicalClock};
use crate::core::pool::{ResourcePool, SlotId};
use crate::device::DeviceError;
use crate::work::{BatchContext, CommandRecorder, DebugColor, JobDescriptor, KernelHandle};

pub mod dual_queue;
pub mod single_queue;

pub use dual_queue::DualQueueScheduler;
pub use single_queue::SingleQueueScheduler;

/// How batches are spread over hardware queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueMode {
    /// Producer on a dedicated compute queue, consumer on graphics.
    #[default]
    DualQueue,
    /// Producer and consumer on the graphics queue.
    SingleQueue,
}

impl QueueMode {
    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            QueueMode::DualQueue => "dual-queue",
            QueueMode::SingleQueue => "single-queue",
        }
    }
}

/// One batch, ready to be recorded.
#[derive(Debug, Clone, Copy)]
pub struct BatchWork<'a> {
    /// Where the batch sits in the frame.
    pub range: &'a BatchRange,
    /// Jobs of the batch.
    pub jobs: &'a [JobDescriptor],
    /// One slot per job.
    pub slots: &'a [SlotId],
    /// Per-job debug colors (possibly empty).
    pub debug_colors: &'a [DebugColor],
    /// Producer kernel.
    pub kernel: &'a KernelHandle,
}

impl<'a> BatchWork<'a> {
    pub(crate) fn context(&self, timeline: Option<BatchTimeline>) -> BatchContext<'a> {
        BatchContext {
            index: self.range.index,
            count: self.range.count,
            jobs: self.jobs,
            slots: self.slots,
            timeline,
            debug_colors: self.debug_colors,
        }
    }
}

/// A way of submitting batches.
///
/// One instance lives for as long as its mode is active; it owns the
/// per-frame command resources for that mode.
pub trait SubmitStrategy: Send {
    /// Mode implemented by this strategy.
    fn mode(&self) -> QueueMode;

    /// Prepare frame resources for `frame_index`. Returns whether the host
    /// blocked on the device.
    fn begin_frame(&mut self, frame_index: u64) -> Result<bool, DeviceError>;

    /// Record and submit one batch.
    ///
    /// Returns the timeline values the batch used, or `None` when the
    /// strategy does not use timeline channels.
    fn submit_batch(
        &mut self,
        pool: &mut ResourcePool,
        clock: &mut LogicalClock,
        batch: &BatchWork<'_>,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<Option<BatchTimeline>, DeviceError>;

    /// Close the frame after `batches` batches were submitted.
    fn end_frame(&mut self, batches: usize) -> Result<(), DeviceError>;

    /// Close a frame that failed after `begin_frame` succeeded.
    ///
    /// Afterwards the frame slot's safety marker covers every submission made
    /// for the frame and will be reached, so the slot can be reused.
    fn abort_frame(&mut self) -> Result<(), DeviceError>;

    /// Command buffers allocated by this strategy so far.
    fn command_buffers_allocated(&self) -> u64;
}
