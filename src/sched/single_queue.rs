//! Single-queue submission.
//!
//! Every batch is one graphics command buffer:
//!
//! ```text
//! producer commands | barrier (all stages, both directions) | consumer commands
//! ```
//!
//! No semaphores are involved. The barrier of batch `k + 1` orders the
//! consumer reads of batch `k` before the producer writes of batch `k + 2`, so
//! a slot is safe to reuse as long as two consecutive batches never share one,
//! which holds whenever `2 * batch_size <= pool capacity`. The clock and slot
//! ready values are left untouched.
//!
//! The frame fence is reset when the frame begins and stays armed until a
//! fenced submission is accepted. Closing or abandoning a frame while it is
//! armed submits a fence-only submission, which signals after everything
//! queued before it.

use std::sync::Arc;

use super::{BatchWork, QueueMode, SubmitStrategy};
use crate::core::clock::{BatchTimeline, LogicalClock};
use crate::core::pool::ResourcePool;
use crate::device::{Device, DeviceError, PipelineBarrier, QueueKind, Submission, Timeout};
use crate::frame::FrameResourceRecycler;
use crate::work::CommandRecorder;

/// Everything on the graphics queue, ordered by barriers.
pub struct SingleQueueScheduler {
    device: Arc<dyn Device>,
    frames: FrameResourceRecycler,
    /// Fence reset for the current frame and not yet submitted
    fence_armed: bool,
}

impl SingleQueueScheduler {
    /// Whether `batch_size` keeps consecutive batches on disjoint slots.
    pub fn spacing_ok(batch_size: usize, capacity: usize) -> bool {
        batch_size.saturating_mul(2) <= capacity
    }

    /// Create the strategy and its per-frame command pools.
    pub fn new(device: Arc<dyn Device>, timeout: Timeout) -> Result<Self, DeviceError> {
        let frames = FrameResourceRecycler::with_fences(device.clone(), timeout)?;
        Ok(Self {
            device,
            frames,
            fence_armed: false,
        })
    }

    /// Per-frame resources.
    pub fn frames(&self) -> &FrameResourceRecycler {
        &self.frames
    }

    /// Signal the frame fence if no batch has carried it yet.
    fn close_fence(&mut self) -> Result<(), DeviceError> {
        let fence = match self.frames.frame_fence() {
            Some(fence) if self.fence_armed => fence,
            _ => return Ok(()),
        };
        self.device.submit(
            QueueKind::Graphics,
            &Submission {
                command_buffers: &[],
                waits: &[],
                signals: &[],
                fence: Some(fence),
            },
        )?;
        self.fence_armed = false;
        Ok(())
    }
}

impl std::fmt::Debug for SingleQueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleQueueScheduler")
            .field("frames", &self.frames)
            .field("fence_armed", &self.fence_armed)
            .finish_non_exhaustive()
    }
}

impl SubmitStrategy for SingleQueueScheduler {
    fn mode(&self) -> QueueMode {
        QueueMode::SingleQueue
    }

    fn begin_frame(&mut self, frame_index: u64) -> Result<bool, DeviceError> {
        let waited = self.frames.begin_frame(frame_index)?;
        self.fence_armed = self.frames.frame_fence().is_some();
        Ok(waited)
    }

    fn submit_batch(
        &mut self,
        _pool: &mut ResourcePool,
        _clock: &mut LogicalClock,
        batch: &BatchWork<'_>,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<Option<BatchTimeline>, DeviceError> {
        let ctx = batch.context(None);

        let cmd = self.frames.next_command_buffer(QueueKind::Graphics)?;
        self.device.begin_command_buffer(cmd)?;
        recorder.record_producer(cmd, batch.kernel, &ctx)?;
        self.device.cmd_pipeline_barrier(cmd, PipelineBarrier::AllStages);
        if ctx.is_first() {
            recorder.record_frame_start(cmd)?;
        }
        recorder.record_consumer(cmd, &ctx)?;
        if ctx.is_last() {
            recorder.record_frame_end(cmd)?;
        }
        self.device.end_command_buffer(cmd)?;

        let fence = if ctx.is_last() {
            self.frames.frame_fence()
        } else {
            None
        };
        self.device.submit(
            QueueKind::Graphics,
            &Submission {
                command_buffers: &[cmd],
                waits: &[],
                signals: &[],
                fence,
            },
        )?;
        if fence.is_some() {
            self.fence_armed = false;
        }
        Ok(None)
    }

    fn end_frame(&mut self, _batches: usize) -> Result<(), DeviceError> {
        // An empty frame never carried the fence; without a signal the next
        // use of this slot would block forever.
        self.close_fence()
    }

    fn abort_frame(&mut self) -> Result<(), DeviceError> {
        self.close_fence()
    }

    fn command_buffers_allocated(&self) -> u64 {
        self.frames.command_buffers_allocated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimDevice, SimOp};
    use crate::sched::test_support::{jobs, run_frame, MarkerRecorder};

    fn setup() -> (Arc<SimDevice>, SingleQueueScheduler, MarkerRecorder) {
        let device = Arc::new(SimDevice::graphics_only());
        let strategy = SingleQueueScheduler::new(device.clone(), Timeout::Infinite).unwrap();
        let recorder = MarkerRecorder {
            device: device.clone(),
        };
        (device, strategy, recorder)
    }

    #[test]
    fn test_spacing_rule() {
        assert!(SingleQueueScheduler::spacing_ok(6, 12));
        assert!(!SingleQueueScheduler::spacing_ok(7, 12));
        assert!(SingleQueueScheduler::spacing_ok(1, 2));
        assert!(!SingleQueueScheduler::spacing_ok(1, 1));
    }

    #[test]
    fn test_one_buffer_per_batch_with_barrier() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        let timelines =
            run_frame(&mut strategy, &mut pool, &mut clock, 0, &jobs(10), 5, &mut recorder).unwrap();
        assert_eq!(timelines, vec![None, None]);

        let subs = device.submissions();
        assert_eq!(subs.len(), 2);
        let marker = |s: &str| SimOp::Marker(s.to_string());
        let barrier = SimOp::Barrier(PipelineBarrier::AllStages);
        assert_eq!(
            subs[0].flat_ops().cloned().collect::<Vec<_>>(),
            vec![marker("produce 0"), barrier.clone(), marker("frame_start"), marker("consume 0")]
        );
        assert_eq!(
            subs[1].flat_ops().cloned().collect::<Vec<_>>(),
            vec![marker("produce 1"), barrier, marker("consume 1"), marker("frame_end")]
        );
        assert!(subs.iter().all(|s| s.queue == QueueKind::Graphics));
        assert!(subs.iter().all(|s| s.waits.is_empty() && s.signals.is_empty()));
        assert!(subs[0].fence.is_none());
        assert_eq!(subs[1].fence, strategy.frames().frame_fence());

        assert_eq!(clock.upcoming(), 1);
        assert!(pool.iter().all(|s| s.ready_value() == 0));
    }

    #[test]
    fn test_frames_wait_on_fence() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        for frame in 0..4 {
            run_frame(&mut strategy, &mut pool, &mut clock, frame, &jobs(12), 6, &mut recorder)
                .unwrap();
        }
        assert_eq!(strategy.command_buffers_allocated(), 4);
        // Frame 2 waits for frame 0, which retires frame 1 as well.
        assert_eq!(device.host_wait_count(), 1);
    }

    #[test]
    fn test_empty_frame_still_signals_fence() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        run_frame(&mut strategy, &mut pool, &mut clock, 0, &[], 6, &mut recorder).unwrap();
        let subs = device.submissions();
        assert_eq!(subs.len(), 1);
        assert!(subs[0].command_buffers.is_empty());
        assert!(subs[0].fence.is_some());

        run_frame(&mut strategy, &mut pool, &mut clock, 1, &[], 6, &mut recorder).unwrap();
        run_frame(&mut strategy, &mut pool, &mut clock, 2, &jobs(3), 6, &mut recorder).unwrap();
    }

    #[test]
    fn test_abandoned_frame_signals_fence() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();

        // Batch 0 goes out unfenced, batch 1 carried the fence and is refused.
        strategy.begin_frame(0).unwrap();
        let kernel = crate::work::KernelHandle::new(1, "sphere");
        let jobs = jobs(12);
        for (i, range) in crate::core::batch::partition(jobs.len(), 6).enumerate() {
            let slots = pool.acquire_batch(range.len());
            let work = BatchWork {
                range: &range,
                jobs: &jobs[range.jobs.clone()],
                slots: &slots,
                debug_colors: &[],
                kernel: &kernel,
            };
            if i == 1 {
                device.fail_next_submit(DeviceError::OutOfMemory);
                let result = strategy.submit_batch(&mut pool, &mut clock, &work, &mut recorder);
                assert_eq!(result, Err(DeviceError::OutOfMemory));
            } else {
                strategy.submit_batch(&mut pool, &mut clock, &work, &mut recorder).unwrap();
            }
        }

        strategy.abort_frame().unwrap();
        let subs = device.submissions();
        assert_eq!(subs.len(), 2);
        assert!(subs[1].command_buffers.is_empty());
        assert_eq!(subs[1].fence, strategy.frames().frame_fence());

        // Retrying the same frame slot later must not hang on the fence.
        run_frame(&mut strategy, &mut pool, &mut clock, 1, &jobs, 6, &mut recorder).unwrap();
        run_frame(&mut strategy, &mut pool, &mut clock, 0, &jobs, 6, &mut recorder).unwrap();
        run_frame(&mut strategy, &mut pool, &mut clock, 1, &jobs, 6, &mut recorder).unwrap();
        assert_eq!(device.submissions().len(), 2 + 3 * 2);
    }

    #[test]
    fn test_abort_after_fenced_submit_is_noop() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        run_frame(&mut strategy, &mut pool, &mut clock, 0, &jobs(6), 6, &mut recorder).unwrap();
        strategy.abort_frame().unwrap();
        assert_eq!(device.submissions().len(), 1);
    }
}
