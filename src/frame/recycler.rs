//! Double-buffered command pools.
//!
//! Command buffers are allocated from one pool per queue per frame slot. A
//! slot is reused every other frame, and only after its safety marker says the
//! device has retired every buffer recorded from it two frames ago. Resetting a
//! pool keeps its buffers allocated, so buffers are handed out again from a
//! per-slot list instead of being reallocated each frame.

use std::sync::Arc;

use crate::core::clock::{TimelineValue, TIMELINE_START};
use crate::device::{
    Channel, ChannelWait, CommandBuffer, CommandPool, Device, DeviceError, Fence, QueueKind,
    Timeout,
};

/// Number of alternating frame slots.
pub const FRAME_SLOTS: usize = 2;

/// What the host waits for before a frame slot may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyMarker {
    /// Both channels must reach the values the slot's last batch signaled.
    Timeline {
        producer: TimelineValue,
        consumer: TimelineValue,
    },
    /// The fence the slot's last submission signals.
    Fence(Fence),
}

/// Command buffers of one queue within a frame slot.
#[derive(Debug)]
struct CommandLane {
    queue: QueueKind,
    pool: CommandPool,
    buffers: Vec<CommandBuffer>,
    /// Next buffer to hand out this frame
    cursor: usize,
}

#[derive(Debug)]
struct FrameSlot {
    lanes: Vec<CommandLane>,
    marker: SafetyMarker,
}

/// Two alternating sets of command pools, guarded by safety markers.
pub struct FrameResourceRecycler {
    device: Arc<dyn Device>,
    slots: Vec<FrameSlot>,
    current: usize,
    timeout: Timeout,
    allocated: u64,
}

impl FrameResourceRecycler {
    /// Recycler for dual-queue submission: pools for `queues`, guarded by
    /// timeline thresholds.
    pub fn with_timeline_markers(
        device: Arc<dyn Device>,
        queues: &[QueueKind],
        timeout: Timeout,
    ) -> Result<Self, DeviceError> {
        let mut recycler = Self::empty(device, timeout);
        for _ in 0..FRAME_SLOTS {
            let marker = SafetyMarker::Timeline {
                producer: TIMELINE_START,
                consumer: TIMELINE_START,
            };
            recycler.push_slot(queues, marker)?;
        }
        Ok(recycler)
    }

    /// Recycler for single-queue submission: one graphics pool per slot,
    /// guarded by a fence.
    pub fn with_fences(device: Arc<dyn Device>, timeout: Timeout) -> Result<Self, DeviceError> {
        let mut recycler = Self::empty(device, timeout);
        for _ in 0..FRAME_SLOTS {
            // Created signaled so the first use of each slot does not block.
            let fence = recycler.device.create_fence(true)?;
            recycler.push_slot(&[QueueKind::Graphics], SafetyMarker::Fence(fence))?;
        }
        Ok(recycler)
    }

    fn empty(device: Arc<dyn Device>, timeout: Timeout) -> Self {
        Self {
            device,
            slots: Vec::with_capacity(FRAME_SLOTS),
            current: 0,
            timeout,
            allocated: 0,
        }
    }

    /// The slot is registered before its pools are created so that `Drop`
    /// releases whatever was built if creation fails halfway.
    fn push_slot(&mut self, queues: &[QueueKind], marker: SafetyMarker) -> Result<(), DeviceError> {
        self.slots.push(FrameSlot {
            lanes: Vec::with_capacity(queues.len()),
            marker,
        });
        let index = self.slots.len() - 1;
        for &queue in queues {
            let pool = self.device.create_command_pool(queue)?;
            self.slots[index].lanes.push(CommandLane {
                queue,
                pool,
                buffers: Vec::new(),
                cursor: 0,
            });
        }
        Ok(())
    }

    /// Slot used by `frame_index`.
    #[inline]
    pub fn slot_index(frame_index: u64) -> usize {
        (frame_index % FRAME_SLOTS as u64) as usize
    }

    /// Make the slot of `frame_index` current and ready for recording.
    ///
    /// Blocks until the slot's marker is satisfied, resets every command pool
    /// of the slot and rewinds its buffer lists, then resets the fence (if any).
    /// The fence goes last so an error before it leaves it signaled.
    /// Returns whether the host actually had to wait for the device.
    pub fn begin_frame(&mut self, frame_index: u64) -> Result<bool, DeviceError> {
        self.current = Self::slot_index(frame_index);
        let device = &self.device;
        let slot = &mut self.slots[self.current];

        let (waited, fence) = match slot.marker {
            SafetyMarker::Timeline { producer, consumer } => {
                let waits = [
                    ChannelWait {
                        channel: Channel::ProducerDone,
                        value: producer,
                    },
                    ChannelWait {
                        channel: Channel::ConsumerDone,
                        value: consumer,
                    },
                ];
                let mut pending = false;
                for wait in &waits {
                    if device.channel_value(wait.channel)? < wait.value {
                        pending = true;
                    }
                }
                if pending {
                    device.wait_channels(&waits, self.timeout)?;
                }
                (pending, None)
            }
            SafetyMarker::Fence(fence) => {
                let pending = !device.fence_signaled(fence)?;
                if pending {
                    device.wait_fence(fence, self.timeout)?;
                }
                (pending, Some(fence))
            }
        };

        for lane in &mut slot.lanes {
            device.reset_command_pool(lane.pool)?;
            lane.cursor = 0;
        }
        if let Some(fence) = fence {
            device.reset_fence(fence)?;
        }
        Ok(waited)
    }

    /// Next command buffer for `queue` in the current slot, reusing one from an
    /// earlier frame when available.
    pub fn next_command_buffer(&mut self, queue: QueueKind) -> Result<CommandBuffer, DeviceError> {
        let lane = self.slots[self.current]
            .lanes
            .iter_mut()
            .find(|lane| lane.queue == queue)
            .ok_or(DeviceError::InvalidHandle("command pool"))?;

        let cmd = match lane.buffers.get(lane.cursor) {
            Some(&cmd) => cmd,
            None => {
                let cmd = self.device.allocate_command_buffer(lane.pool)?;
                lane.buffers.push(cmd);
                self.allocated += 1;
                cmd
            }
        };
        lane.cursor += 1;
        Ok(cmd)
    }

    /// Raise one channel of the current slot's marker to `value`.
    ///
    /// Called as soon as work signaling `value` is accepted by the device, so
    /// the marker covers every submitted command buffer even if the frame
    /// stops early. Never lowers the marker. No effect on a fence-guarded
    /// recycler.
    pub fn raise_timeline_marker(&mut self, channel: Channel, value: TimelineValue) {
        if let SafetyMarker::Timeline { producer, consumer } = &mut self.slots[self.current].marker {
            let target = match channel {
                Channel::ProducerDone => producer,
                Channel::ConsumerDone => consumer,
            };
            *target = (*target).max(value);
        }
    }

    /// Fence the current slot's last submission must signal, if fence-guarded.
    pub fn frame_fence(&self) -> Option<Fence> {
        match self.slots[self.current].marker {
            SafetyMarker::Fence(fence) => Some(fence),
            SafetyMarker::Timeline { .. } => None,
        }
    }

    /// Marker of slot `index`.
    pub fn marker(&self, index: usize) -> SafetyMarker {
        self.slots[index].marker
    }

    /// Index of the current slot.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Buffers ever allocated for `queue` in slot `index`.
    pub fn buffer_count(&self, index: usize, queue: QueueKind) -> usize {
        self.slots[index]
            .lanes
            .iter()
            .find(|lane| lane.queue == queue)
            .map_or(0, |lane| lane.buffers.len())
    }

    /// Command buffers allocated over the recycler's lifetime.
    pub fn command_buffers_allocated(&self) -> u64 {
        self.allocated
    }
}

impl Drop for FrameResourceRecycler {
    fn drop(&mut self) {
        // Pools and fences may only be destroyed once the device is done with them.
        if self.device.wait_idle().is_err() {
            crate::fs_emit!(FS901, "device did not drain before frame resources were destroyed");
        }
        for slot in self.slots.drain(..) {
            for lane in slot.lanes {
                self.device.destroy_command_pool(lane.pool);
            }
            if let SafetyMarker::Fence(fence) = slot.marker {
                self.device.destroy_fence(fence);
            }
        }
    }
}

impl std::fmt::Debug for FrameResourceRecycler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameResourceRecycler")
            .field("slots", &self.slots)
            .field("current", &self.current)
            .field("allocated", &self.allocated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ChannelSignal, SimDevice, Submission};

    fn submit_signal(device: &SimDevice, cmd: CommandBuffer, queue: QueueKind, value: u64) {
        let channel = match queue {
            QueueKind::Compute => Channel::ProducerDone,
            QueueKind::Graphics => Channel::ConsumerDone,
        };
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device
            .submit(
                queue,
                &Submission {
                    command_buffers: &[cmd],
                    waits: &[],
                    signals: &[ChannelSignal { channel, value }],
                    fence: None,
                },
            )
            .unwrap();
    }

    #[test]
    fn test_buffers_are_recycled() {
        let device = Arc::new(SimDevice::new());
        let mut recycler = FrameResourceRecycler::with_timeline_markers(
            device.clone(),
            &[QueueKind::Compute, QueueKind::Graphics],
            Timeout::Infinite,
        )
        .unwrap();

        for frame in 0..6u64 {
            recycler.begin_frame(frame).unwrap();
            let a = recycler.next_command_buffer(QueueKind::Graphics).unwrap();
            let b = recycler.next_command_buffer(QueueKind::Graphics).unwrap();
            assert_ne!(a, b);
        }
        assert_eq!(recycler.buffer_count(0, QueueKind::Graphics), 2);
        assert_eq!(recycler.buffer_count(1, QueueKind::Graphics), 2);
        assert_eq!(recycler.buffer_count(0, QueueKind::Compute), 0);
        assert_eq!(recycler.command_buffers_allocated(), 4);
    }

    #[test]
    fn test_list_grows_when_exhausted() {
        let device = Arc::new(SimDevice::new());
        let mut recycler =
            FrameResourceRecycler::with_timeline_markers(device, &[QueueKind::Graphics], Timeout::Infinite)
                .unwrap();
        recycler.begin_frame(0).unwrap();
        recycler.next_command_buffer(QueueKind::Graphics).unwrap();
        recycler.begin_frame(2).unwrap();
        for _ in 0..3 {
            recycler.next_command_buffer(QueueKind::Graphics).unwrap();
        }
        assert_eq!(recycler.buffer_count(0, QueueKind::Graphics), 3);
    }

    #[test]
    fn test_timeline_marker_blocks_reuse() {
        let device = Arc::new(SimDevice::new());
        let mut recycler = FrameResourceRecycler::with_timeline_markers(
            device.clone(),
            &[QueueKind::Compute, QueueKind::Graphics],
            Timeout::Infinite,
        )
        .unwrap();

        assert!(!recycler.begin_frame(0).unwrap());
        let compute = recycler.next_command_buffer(QueueKind::Compute).unwrap();
        let graphics = recycler.next_command_buffer(QueueKind::Graphics).unwrap();
        submit_signal(&device, compute, QueueKind::Compute, 1);
        submit_signal(&device, graphics, QueueKind::Graphics, 1);
        recycler.raise_timeline_marker(Channel::ProducerDone, 1);
        recycler.raise_timeline_marker(Channel::ConsumerDone, 1);
        assert_eq!(
            recycler.marker(0),
            SafetyMarker::Timeline {
                producer: 1,
                consumer: 1
            }
        );

        assert!(!recycler.begin_frame(1).unwrap());
        assert_eq!(device.pending_count(), 2);

        // Slot 0 again: work from frame 0 must retire before its pools reset.
        assert!(recycler.begin_frame(2).unwrap());
        assert_eq!(device.pending_count(), 0);
        assert_eq!(device.peek_channel(Channel::ConsumerDone), 1);
    }

    #[test]
    fn test_fence_marker_is_reset_after_wait() {
        let device = Arc::new(SimDevice::new());
        let mut recycler = FrameResourceRecycler::with_fences(device.clone(), Timeout::Infinite).unwrap();

        assert!(!recycler.begin_frame(0).unwrap());
        let fence = recycler.frame_fence().unwrap();
        assert_eq!(device.fence_signaled(fence), Ok(false));

        let cmd = recycler.next_command_buffer(QueueKind::Graphics).unwrap();
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device
            .submit(
                QueueKind::Graphics,
                &Submission {
                    command_buffers: &[cmd],
                    waits: &[],
                    signals: &[],
                    fence: Some(fence),
                },
            )
            .unwrap();

        recycler.begin_frame(1).unwrap();
        assert!(recycler.begin_frame(2).unwrap());
        assert_eq!(recycler.frame_fence(), Some(fence));
        assert_eq!(device.fence_signaled(fence), Ok(false));

        recycler.raise_timeline_marker(Channel::ConsumerDone, 9);
        assert_eq!(recycler.marker(0), SafetyMarker::Fence(fence));
    }

    #[test]
    fn test_raise_marker_per_channel() {
        let device = Arc::new(SimDevice::new());
        let mut recycler = FrameResourceRecycler::with_timeline_markers(
            device,
            &[QueueKind::Compute, QueueKind::Graphics],
            Timeout::Infinite,
        )
        .unwrap();
        recycler.begin_frame(1).unwrap();
        recycler.raise_timeline_marker(Channel::ProducerDone, 4);
        assert_eq!(
            recycler.marker(1),
            SafetyMarker::Timeline {
                producer: 4,
                consumer: 0
            }
        );
        recycler.raise_timeline_marker(Channel::ConsumerDone, 4);
        recycler.raise_timeline_marker(Channel::ProducerDone, 2);
        assert_eq!(
            recycler.marker(1),
            SafetyMarker::Timeline {
                producer: 4,
                consumer: 4
            }
        );
        assert_eq!(recycler.marker(0), SafetyMarker::Timeline { producer: 0, consumer: 0 });
    }

    #[test]
    fn test_fence_stays_signaled_when_pool_reset_fails() {
        crate::diagnostics::suppress_diagnostics(true);
        let device = Arc::new(SimDevice::new());
        let mut recycler = FrameResourceRecycler::with_fences(device.clone(), Timeout::Infinite).unwrap();
        recycler.begin_frame(0).unwrap();
        let fence = recycler.frame_fence().unwrap();
        let empty = Submission {
            command_buffers: &[],
            waits: &[],
            signals: &[],
            fence: Some(fence),
        };
        device.submit(QueueKind::Graphics, &empty).unwrap();

        // A buffer of this slot that can never retire.
        let cmd = recycler.next_command_buffer(QueueKind::Graphics).unwrap();
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        let stuck = [ChannelWait {
            channel: Channel::ProducerDone,
            value: 5,
        }];
        device
            .submit(
                QueueKind::Graphics,
                &Submission {
                    command_buffers: &[cmd],
                    waits: &stuck,
                    signals: &[],
                    fence: None,
                },
            )
            .unwrap();
        device.retire_all();
        assert_eq!(device.fence_signaled(fence), Ok(true));

        assert!(recycler.begin_frame(2).is_err());
        // The reset never reached the fence.
        assert_eq!(device.fence_signaled(fence), Ok(true));
        drop(recycler);
        crate::diagnostics::suppress_diagnostics(false);
    }

    #[test]
    fn test_unknown_queue_is_an_error() {
        let device = Arc::new(SimDevice::new());
        let mut recycler = FrameResourceRecycler::with_fences(device, Timeout::Infinite).unwrap();
        recycler.begin_frame(0).unwrap();
        assert!(recycler.next_command_buffer(QueueKind::Compute).is_err());
    }
}
