//! Dual-queue submission.
//!
//! Per batch, with `v` the clock's upcoming value and `w` the largest ready
//! value among the batch's slots:
//!
//! ```text
//! compute:  wait ConsumerDone >= w   run producer   signal ProducerDone = v
//! graphics: wait ProducerDone >= v   barrier        run consumer   signal ConsumerDone = v
//! ```
//!
//! after which every slot of the batch is ready at `v` and the clock moves to
//! `v + 1`. Producer work of later batches overlaps consumer work of earlier
//! ones as long as they do not share a slot.
//!
//! The clock moves as soon as the compute submission is accepted, and the
//! frame slot's marker follows every accepted submission, so a frame that
//! stops early leaves nothing unguarded.

use std::sync::Arc;

use super::{BatchWork, QueueMode, SubmitStrategy};
use crate::core::clock::{BatchTimeline, LogicalClock};
use crate::core::pool::ResourcePool;
use crate::device::{
    Channel, ChannelSignal, ChannelWait, Device, DeviceError, PipelineBarrier, QueueKind,
    Submission, Timeout,
};
use crate::frame::FrameResourceRecycler;
use crate::work::CommandRecorder;

/// Producer on compute, consumer on graphics, synchronized by timeline channels.
pub struct DualQueueScheduler {
    device: Arc<dyn Device>,
    frames: FrameResourceRecycler,
}

impl DualQueueScheduler {
    /// Create the strategy and its per-frame command pools.
    pub fn new(device: Arc<dyn Device>, timeout: Timeout) -> Result<Self, DeviceError> {
        let frames = FrameResourceRecycler::with_timeline_markers(
            device.clone(),
            &[QueueKind::Compute, QueueKind::Graphics],
            timeout,
        )?;
        Ok(Self { device, frames })
    }

    /// Per-frame resources.
    pub fn frames(&self) -> &FrameResourceRecycler {
        &self.frames
    }
}

impl std::fmt::Debug for DualQueueScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualQueueScheduler")
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl SubmitStrategy for DualQueueScheduler {
    fn mode(&self) -> QueueMode {
        QueueMode::DualQueue
    }

    fn begin_frame(&mut self, frame_index: u64) -> Result<bool, DeviceError> {
        self.frames.begin_frame(frame_index)
    }

    fn submit_batch(
        &mut self,
        pool: &mut ResourcePool,
        clock: &mut LogicalClock,
        batch: &BatchWork<'_>,
        recorder: &mut dyn CommandRecorder,
    ) -> Result<Option<BatchTimeline>, DeviceError> {
        let timeline = clock.plan(pool.wait_threshold(batch.slots));
        let ctx = batch.context(Some(timeline));

        let producer_cmd = self.frames.next_command_buffer(QueueKind::Compute)?;
        self.device.begin_command_buffer(producer_cmd)?;
        recorder.record_producer(producer_cmd, batch.kernel, &ctx)?;
        self.device.end_command_buffer(producer_cmd)?;

        let consumer_cmd = self.frames.next_command_buffer(QueueKind::Graphics)?;
        self.device.begin_command_buffer(consumer_cmd)?;
        // The semaphore wait orders execution only; the barrier makes the
        // producer's writes visible to indirect, vertex and shader reads.
        self.device
            .cmd_pipeline_barrier(consumer_cmd, PipelineBarrier::ProducerToConsumer);
        if ctx.is_first() {
            recorder.record_frame_start(consumer_cmd)?;
        }
        recorder.record_consumer(consumer_cmd, &ctx)?;
        if ctx.is_last() {
            recorder.record_frame_end(consumer_cmd)?;
        }
        self.device.end_command_buffer(consumer_cmd)?;

        self.device.submit(
            QueueKind::Compute,
            &Submission {
                command_buffers: &[producer_cmd],
                waits: &[ChannelWait {
                    channel: Channel::ConsumerDone,
                    value: timeline.producer_wait,
                }],
                signals: &[ChannelSignal {
                    channel: Channel::ProducerDone,
                    value: timeline.producer_signal,
                }],
                fence: None,
            },
        )?;
        // v is now owned by the device; it is never handed out again.
        clock.advance();
        self.frames
            .raise_timeline_marker(Channel::ProducerDone, timeline.producer_signal);

        let consumer = Submission {
            command_buffers: &[consumer_cmd],
            waits: &[ChannelWait {
                channel: Channel::ProducerDone,
                value: timeline.consumer_wait,
            }],
            signals: &[ChannelSignal {
                channel: Channel::ConsumerDone,
                value: timeline.consumer_signal,
            }],
            fence: None,
        };
        let submitted = self.device.submit(QueueKind::Graphics, &consumer);
        if let Err(err) = &submitted {
            // Still signal ConsumerDone = v behind the producer, or every later
            // wait on v (slot reuse, frame slot reuse) could never be met.
            let bridge = Submission {
                command_buffers: &[],
                ..consumer
            };
            if self.device.submit(QueueKind::Graphics, &bridge).is_err() {
                return Err(err.clone());
            }
        }

        pool.mark_ready(batch.slots, timeline.consumer_signal);
        self.frames
            .raise_timeline_marker(Channel::ConsumerDone, timeline.consumer_signal);
        submitted.map(|()| Some(timeline))
    }

    fn end_frame(&mut self, _batches: usize) -> Result<(), DeviceError> {
        // An empty frame submits nothing; the slot's previous marker was
        // already reached in begin_frame, so it stays valid.
        Ok(())
    }

    fn abort_frame(&mut self) -> Result<(), DeviceError> {
        // The marker is raised with every accepted submission.
        Ok(())
    }

    fn command_buffers_allocated(&self) -> u64 {
        self.frames.command_buffers_allocated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimDevice, SimOp};
    use crate::frame::SafetyMarker;
    use crate::sched::test_support::{jobs, run_frame, MarkerRecorder};

    fn setup() -> (Arc<SimDevice>, DualQueueScheduler, MarkerRecorder) {
        let device = Arc::new(SimDevice::new());
        let strategy = DualQueueScheduler::new(device.clone(), Timeout::Infinite).unwrap();
        let recorder = MarkerRecorder {
            device: device.clone(),
        };
        (device, strategy, recorder)
    }

    #[test]
    fn test_batch_timeline_values() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();

        let timelines = run_frame(
            &mut strategy,
            &mut pool,
            &mut clock,
            0,
            &jobs(64),
            6,
            &mut recorder,
        )
        .unwrap();

        assert_eq!(timelines.len(), 11);
        assert_eq!(clock.upcoming(), 12);
        for (i, t) in timelines.iter().enumerate() {
            let t = t.unwrap();
            let v = i as u64 + 1;
            assert_eq!(t.producer_signal, v);
            assert_eq!(t.consumer_signal, v);
            // Two batches fill the pool; the third reuses the first one's slots.
            let expected_wait = if i < 2 { 0 } else { v - 2 };
            assert_eq!(t.producer_wait, expected_wait);
        }

        let subs = device.submissions();
        assert_eq!(subs.len(), 22);
        assert_eq!(subs[0].queue, QueueKind::Compute);
        assert_eq!(subs[1].queue, QueueKind::Graphics);
        assert_eq!(subs[1].wait_value(Channel::ProducerDone), 1);
        assert_eq!(subs[4].wait_value(Channel::ConsumerDone), 1);
        assert_eq!(
            strategy.frames().marker(0),
            SafetyMarker::Timeline {
                producer: 11,
                consumer: 11
            }
        );
    }

    #[test]
    fn test_consumer_buffer_layout() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        run_frame(&mut strategy, &mut pool, &mut clock, 0, &jobs(13), 6, &mut recorder).unwrap();

        let subs = device.submissions();
        let consumers: Vec<Vec<SimOp>> = subs
            .iter()
            .filter(|s| s.queue == QueueKind::Graphics)
            .map(|s| s.flat_ops().cloned().collect())
            .collect();
        let barrier = SimOp::Barrier(PipelineBarrier::ProducerToConsumer);
        let marker = |s: &str| SimOp::Marker(s.to_string());

        assert_eq!(
            consumers[0],
            vec![barrier.clone(), marker("frame_start"), marker("consume 0")]
        );
        assert_eq!(consumers[1], vec![barrier.clone(), marker("consume 1")]);
        assert_eq!(
            consumers[2],
            vec![barrier, marker("consume 2"), marker("frame_end")]
        );

        let producer: Vec<SimOp> = subs[0].flat_ops().cloned().collect();
        assert_eq!(producer, vec![marker("produce 0")]);
    }

    #[test]
    fn test_frames_recycle_buffers() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        for frame in 0..8 {
            run_frame(&mut strategy, &mut pool, &mut clock, frame, &jobs(64), 6, &mut recorder)
                .unwrap();
        }
        // 11 buffers per queue per frame slot, allocated once.
        assert_eq!(strategy.command_buffers_allocated(), 44);
        assert_eq!(device.command_buffers_allocated(), 44);
        assert_eq!(clock.upcoming(), 8 * 11 + 1);
    }

    #[test]
    fn test_device_failure_propagates() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        device.fail_next_submit(DeviceError::DeviceLost);
        let result = run_frame(&mut strategy, &mut pool, &mut clock, 0, &jobs(6), 6, &mut recorder);
        assert_eq!(result, Err(DeviceError::DeviceLost));
        // Nothing was issued, so nothing was consumed.
        assert_eq!(clock.upcoming(), 1);
    }

    #[test]
    fn test_refused_consumer_still_signals() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        device.fail_next_submit_to(QueueKind::Graphics, DeviceError::OutOfMemory);
        let result =
            run_frame(&mut strategy, &mut pool, &mut clock, 0, &jobs(64), 6, &mut recorder);
        assert_eq!(result, Err(DeviceError::OutOfMemory));

        // ProducerDone = 1 went out, so 1 is spent.
        assert_eq!(clock.upcoming(), 2);
        let subs = device.submissions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].queue, QueueKind::Compute);
        assert_eq!(subs[1].queue, QueueKind::Graphics);
        assert!(subs[1].command_buffers.is_empty());
        assert_eq!(subs[1].wait_value(Channel::ProducerDone), 1);
        assert_eq!(
            subs[1].signals,
            vec![ChannelSignal {
                channel: Channel::ConsumerDone,
                value: 1
            }]
        );
        assert_eq!(
            strategy.frames().marker(0),
            SafetyMarker::Timeline {
                producer: 1,
                consumer: 1
            }
        );
        assert!(pool.iter().take(6).all(|s| s.ready_value() == 1));

        strategy.abort_frame().unwrap();
        // Same frame slot again: the marker covers the abandoned batch.
        let timelines =
            run_frame(&mut strategy, &mut pool, &mut clock, 0, &jobs(64), 6, &mut recorder).unwrap();
        assert_eq!(timelines.len(), 11);
        assert_eq!(timelines[0].unwrap().producer_signal, 2);
        assert_eq!(clock.upcoming(), 13);
    }

    #[test]
    fn test_marker_tracks_each_submission() {
        let (device, mut strategy, mut recorder) = setup();
        let mut pool = ResourcePool::new(12);
        let mut clock = LogicalClock::new();
        run_frame(&mut strategy, &mut pool, &mut clock, 0, &jobs(12), 6, &mut recorder).unwrap();

        strategy.begin_frame(1).unwrap();
        device.fail_next_submit_to(QueueKind::Compute, DeviceError::DeviceLost);
        let kernel = crate::work::KernelHandle::new(1, "sphere");
        let jobs = jobs(6);
        let range = crate::core::batch::partition(6, 6).next().unwrap();
        let slots = pool.acquire_batch(6);
        let work = BatchWork {
            range: &range,
            jobs: &jobs,
            slots: &slots,
            debug_colors: &[],
            kernel: &kernel,
        };
        let result = strategy.submit_batch(&mut pool, &mut clock, &work, &mut recorder);
        assert_eq!(result, Err(DeviceError::DeviceLost));
        // Refused at compute: nothing was spent or promised.
        assert_eq!(clock.upcoming(), 3);
        assert!(pool.iter().all(|s| s.ready_value() <= 2));
        assert_eq!(
            strategy.frames().marker(1),
            SafetyMarker::Timeline {
                producer: 0,
                consumer: 0
            }
        );
    }
}
