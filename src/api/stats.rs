//! Scheduler statistics.

use crate::core::clock::TimelineValue;
use crate::core::pool::SlotId;

/// Aggregated scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedStats {
    /// Frames run.
    pub frames: u64,

    /// Frames abandoned after a batch failed.
    pub frames_abandoned: u64,

    /// Batches submitted.
    pub batches: u64,

    /// Jobs submitted.
    pub jobs: u64,

    /// Slots handed out by the pool.
    pub slots_acquired: u64,

    /// Frames whose frame slot was still in flight, forcing a host wait.
    pub frame_slot_waits: u64,

    /// Command buffers allocated (recycled buffers are not counted again).
    pub command_buffers_allocated: u64,

    /// Successful kernel replacements.
    pub kernel_replacements: u64,

    /// Failed kernel replacements.
    pub kernel_failures: u64,

    /// Queue mode switches.
    pub mode_switches: u64,
}

impl SchedStats {
    /// Create empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Average batches per frame.
    pub fn batches_per_frame(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.batches as f64 / self.frames as f64
    }

    /// Fraction of frames that blocked the host.
    pub fn wait_ratio(&self) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        self.frame_slot_waits as f64 / self.frames as f64
    }
}

impl std::fmt::Display for SchedStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Scheduler Statistics:")?;
        writeln!(f, "  Frames:            {}", self.frames)?;
        writeln!(f, "  Frames abandoned:  {}", self.frames_abandoned)?;
        writeln!(f, "  Batches:           {}", self.batches)?;
        writeln!(f, "  Jobs:              {}", self.jobs)?;
        writeln!(f, "  Slots acquired:    {}", self.slots_acquired)?;
        writeln!(f, "  Frame slot waits:  {}", self.frame_slot_waits)?;
        writeln!(f, "  Command buffers:   {}", self.command_buffers_allocated)?;
        writeln!(f, "  Kernel replaced:   {}", self.kernel_replacements)?;
        writeln!(f, "  Kernel failures:   {}", self.kernel_failures)?;
        writeln!(f, "  Mode switches:     {}", self.mode_switches)?;
        Ok(())
    }
}

/// What one call to `run_frame` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number.
    pub frame_index: u64,
    /// Batches submitted.
    pub batches: usize,
    /// Jobs submitted.
    pub jobs: usize,
    /// First slot handed out this frame, if any job ran.
    pub first_slot: Option<SlotId>,
    /// First and last consumer values signaled; `None` in single-queue mode or
    /// for an empty frame.
    pub signals: Option<(TimelineValue, TimelineValue)>,
    /// Whether the host blocked before the frame slot could be reused.
    pub waited: bool,
}
