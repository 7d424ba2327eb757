//! Simulated device for testing
//!
//! Executes submissions in-process, without GPU hardware. Each hardware queue is a FIFO of
//! pending submissions; work retires only when the host waits (or when [`SimDevice::retire_all`]
//! / [`SimDevice::retire_one`] is called), which keeps the device "behind" the host the way a
//! real GPU is and makes every host wait observable.
//!
//! Beyond executing work the simulator validates the rules a real driver leaves undefined:
//! - signals on a channel must be strictly increasing
//! - command pools and buffers must not be reset or re-recorded while in flight
//! - only ended command buffers may be submitted
//! - compute submissions need a dedicated compute queue

use std::collections::HashMap;

use crossbeam_queue::SegQueue;

use super::traits::*;
use crate::core::clock::TimelineValue;
use crate::sync::atomics::AtomicCounter;
use crate::sync::mutex::Mutex;

/// A command recorded into a simulated command buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    /// A pipeline barrier
    Barrier(PipelineBarrier),
    /// A labelled command recorded by a collaborator (see [`SimDevice::cmd_marker`])
    Marker(String),
}

/// A submission as the simulator saw it.
#[derive(Debug, Clone)]
pub struct SubmitRecord {
    /// Global submission order
    pub sequence: u64,
    /// Queue the work went to
    pub queue: QueueKind,
    /// Command buffers, in order
    pub command_buffers: Vec<CommandBuffer>,
    /// Contents of each command buffer at submit time
    pub ops: Vec<Vec<SimOp>>,
    /// Device-side waits
    pub waits: Vec<ChannelWait>,
    /// Device-side signals
    pub signals: Vec<ChannelSignal>,
    /// Fence signaled on completion
    pub fence: Option<Fence>,
}

impl SubmitRecord {
    /// Threshold this submission waits for on `channel` (0 if it does not wait on it).
    pub fn wait_value(&self, channel: Channel) -> TimelineValue {
        self.waits
            .iter()
            .filter(|w| w.channel == channel)
            .map(|w| w.value)
            .max()
            .unwrap_or(0)
    }

    /// Value this submission signals on `channel`, if any.
    pub fn signal_value(&self, channel: Channel) -> Option<TimelineValue> {
        self.signals
            .iter()
            .find(|s| s.channel == channel)
            .map(|s| s.value)
    }

    /// All recorded ops of every command buffer, flattened in execution order.
    pub fn flat_ops(&self) -> impl Iterator<Item = &SimOp> {
        self.ops.iter().flatten()
    }
}

#[derive(Debug)]
struct PoolState {
    queue: QueueKind,
    buffers: Vec<u64>,
}

#[derive(Debug, Default)]
struct BufferState {
    pool: u64,
    recording: bool,
    executable: bool,
    in_flight: u32,
    ops: Vec<SimOp>,
}

#[derive(Debug)]
struct Pending {
    buffers: Vec<u64>,
    waits: Vec<ChannelWait>,
    signals: Vec<ChannelSignal>,
    fence: Option<u64>,
}

#[derive(Debug, Default)]
struct SimState {
    channels: [TimelineValue; 2],
    last_submitted_signal: [TimelineValue; 2],
    pools: HashMap<u64, PoolState>,
    buffers: HashMap<u64, BufferState>,
    fences: HashMap<u64, bool>,
    /// Submission at the front of each queue, taken out of the FIFO but blocked on a wait
    heads: [Option<Pending>; 2],
    log: Vec<SubmitRecord>,
    lost: bool,
    /// Error for the next submit, optionally only to one queue
    fail_next_submit: Option<(Option<QueueKind>, DeviceError)>,
}

fn queue_index(queue: QueueKind) -> usize {
    match queue {
        QueueKind::Graphics => 0,
        QueueKind::Compute => 1,
    }
}

/// In-process device used by tests, benches and demos
pub struct SimDevice {
    capabilities: DeviceCapabilities,
    state: Mutex<SimState>,
    pending: [SegQueue<Pending>; 2],
    next_handle: AtomicCounter,
    next_sequence: AtomicCounter,
    host_waits: AtomicCounter,
    buffers_allocated: AtomicCounter,
}

impl SimDevice {
    /// Create a device with a dedicated compute queue and timeline semaphores.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            dedicated_compute_queue: true,
            timeline_semaphores: true,
        })
    }

    /// Create a device that only exposes the graphics queue.
    pub fn graphics_only() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            dedicated_compute_queue: false,
            timeline_semaphores: true,
        })
    }

    /// Create a device with explicit capabilities.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            state: Mutex::new(SimState::default()),
            pending: [SegQueue::new(), SegQueue::new()],
            next_handle: AtomicCounter::new(1),
            next_sequence: AtomicCounter::new(0),
            host_waits: AtomicCounter::new(0),
            buffers_allocated: AtomicCounter::new(0),
        }
    }

    /// Record a labelled command. Stands in for the real commands a collaborator records.
    pub fn cmd_marker(&self, cmd: CommandBuffer, label: impl Into<String>) {
        let mut state = self.state.lock();
        if let Some(buffer) = state.buffers.get_mut(&cmd.0) {
            buffer.ops.push(SimOp::Marker(label.into()));
        }
    }

    /// Every submission so far, in submission order.
    pub fn submissions(&self) -> Vec<SubmitRecord> {
        self.state.lock().log.clone()
    }

    /// Forget recorded submissions (pending work is unaffected).
    pub fn clear_submissions(&self) {
        self.state.lock().log.clear();
    }

    /// Number of submissions not yet retired.
    pub fn pending_count(&self) -> usize {
        let state = self.state.lock();
        let heads = state.heads.iter().filter(|h| h.is_some()).count();
        heads + self.pending.iter().map(SegQueue::len).sum::<usize>()
    }

    /// Number of host waits (channel, fence and idle) issued so far.
    pub fn host_wait_count(&self) -> u64 {
        self.host_waits.get()
    }

    /// Number of command buffers ever allocated.
    pub fn command_buffers_allocated(&self) -> u64 {
        self.buffers_allocated.get()
    }

    /// Current value of a channel, without retiring anything.
    pub fn peek_channel(&self, channel: Channel) -> TimelineValue {
        self.state.lock().channels[channel.index()]
    }

    /// Make the next `submit` fail with `error`.
    pub fn fail_next_submit(&self, error: DeviceError) {
        self.state.lock().fail_next_submit = Some((None, error));
    }

    /// Make the next `submit` to `queue` fail with `error`. Submits to the other
    /// queue go through.
    pub fn fail_next_submit_to(&self, queue: QueueKind, error: DeviceError) {
        self.state.lock().fail_next_submit = Some((Some(queue), error));
    }

    /// Mark the device lost. Every later call fails with [`DeviceError::DeviceLost`].
    pub fn lose_device(&self) {
        self.state.lock().lost = true;
    }

    /// Retire the front submission of `queue` if its waits are satisfied.
    pub fn retire_one(&self, queue: QueueKind) -> bool {
        let mut state = self.state.lock();
        self.try_retire(&mut state, queue_index(queue))
    }

    /// Retire everything that can make progress. Returns the number of submissions retired.
    pub fn retire_all(&self) -> usize {
        let mut state = self.state.lock();
        self.retire_locked(&mut state)
    }

    fn retire_locked(&self, state: &mut SimState) -> usize {
        let mut retired = 0;
        loop {
            let mut progress = false;
            for q in 0..2 {
                while self.try_retire(state, q) {
                    retired += 1;
                    progress = true;
                }
            }
            if !progress {
                return retired;
            }
        }
    }

    fn try_retire(&self, state: &mut SimState, q: usize) -> bool {
        if state.heads[q].is_none() {
            state.heads[q] = self.pending[q].pop();
        }
        let ready = match &state.heads[q] {
            Some(head) => head
                .waits
                .iter()
                .all(|w| state.channels[w.channel.index()] >= w.value),
            None => false,
        };
        if !ready {
            return false;
        }
        let Some(done) = state.heads[q].take() else {
            return false;
        };
        for id in &done.buffers {
            if let Some(buffer) = state.buffers.get_mut(id) {
                buffer.in_flight = buffer.in_flight.saturating_sub(1);
            }
        }
        for signal in &done.signals {
            let slot = &mut state.channels[signal.channel.index()];
            *slot = (*slot).max(signal.value);
        }
        if let Some(fence) = done.fence {
            state.fences.insert(fence, true);
        }
        true
    }

    fn check_alive(state: &SimState) -> Result<(), DeviceError> {
        if state.lost {
            Err(DeviceError::DeviceLost)
        } else {
            Ok(())
        }
    }

    /// Outcome of a host wait the simulator cannot satisfy: a finite wait times out, an
    /// infinite one would hang forever, which a real driver reports as device loss.
    fn unsatisfied(timeout: Timeout) -> DeviceError {
        match timeout {
            Timeout::Infinite => DeviceError::DeviceLost,
            Timeout::After(_) => DeviceError::Timeout,
        }
    }

    fn new_handle(&self) -> u64 {
        self.next_handle.increment()
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for SimDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_command_pool(&self, queue: QueueKind) -> Result<CommandPool, DeviceError> {
        if queue == QueueKind::Compute && !self.capabilities.dedicated_compute_queue {
            return Err(DeviceError::BackendError(
                "no dedicated compute queue family".to_string(),
            ));
        }
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        let id = self.new_handle();
        state.pools.insert(
            id,
            PoolState {
                queue,
                buffers: Vec::new(),
            },
        );
        Ok(CommandPool(id))
    }

    fn destroy_command_pool(&self, pool: CommandPool) {
        let mut state = self.state.lock();
        if let Some(pool_state) = state.pools.remove(&pool.0) {
            for id in pool_state.buffers {
                state.buffers.remove(&id);
            }
        }
    }

    fn reset_command_pool(&self, pool: CommandPool) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        let ids = match state.pools.get(&pool.0) {
            Some(p) => p.buffers.clone(),
            None => return Err(DeviceError::InvalidHandle("command pool")),
        };
        if ids
            .iter()
            .any(|id| state.buffers.get(id).map_or(false, |b| b.in_flight > 0))
        {
            return Err(DeviceError::BackendError(
                "command pool reset while its buffers are in flight".to_string(),
            ));
        }
        for id in ids {
            if let Some(buffer) = state.buffers.get_mut(&id) {
                buffer.recording = false;
                buffer.executable = false;
                buffer.ops.clear();
            }
        }
        Ok(())
    }

    fn allocate_command_buffer(&self, pool: CommandPool) -> Result<CommandBuffer, DeviceError> {
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        let id = self.new_handle();
        match state.pools.get_mut(&pool.0) {
            Some(p) => p.buffers.push(id),
            None => return Err(DeviceError::InvalidHandle("command pool")),
        }
        state.buffers.insert(
            id,
            BufferState {
                pool: pool.0,
                ..BufferState::default()
            },
        );
        self.buffers_allocated.increment();
        Ok(CommandBuffer(id))
    }

    fn begin_command_buffer(&self, cmd: CommandBuffer) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        let buffer = state
            .buffers
            .get_mut(&cmd.0)
            .ok_or(DeviceError::InvalidHandle("command buffer"))?;
        if buffer.in_flight > 0 {
            return Err(DeviceError::BackendError(
                "command buffer re-recorded while in flight".to_string(),
            ));
        }
        buffer.recording = true;
        buffer.executable = false;
        buffer.ops.clear();
        Ok(())
    }

    fn end_command_buffer(&self, cmd: CommandBuffer) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        let buffer = state
            .buffers
            .get_mut(&cmd.0)
            .ok_or(DeviceError::InvalidHandle("command buffer"))?;
        if !buffer.recording {
            return Err(DeviceError::BackendError(
                "end called on a buffer that is not recording".to_string(),
            ));
        }
        buffer.recording = false;
        buffer.executable = true;
        Ok(())
    }

    fn cmd_pipeline_barrier(&self, cmd: CommandBuffer, barrier: PipelineBarrier) {
        let mut state = self.state.lock();
        if let Some(buffer) = state.buffers.get_mut(&cmd.0) {
            buffer.ops.push(SimOp::Barrier(barrier));
        }
    }

    fn submit(&self, queue: QueueKind, submission: &Submission<'_>) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        let targeted = matches!(
            &state.fail_next_submit,
            Some((target, _)) if target.map_or(true, |q| q == queue)
        );
        if targeted {
            if let Some((_, error)) = state.fail_next_submit.take() {
                return Err(error);
            }
        }
        if queue == QueueKind::Compute && !self.capabilities.dedicated_compute_queue {
            return Err(DeviceError::SubmitRejected(
                "no dedicated compute queue".to_string(),
            ));
        }
        if (!submission.waits.is_empty() || !submission.signals.is_empty())
            && !self.capabilities.timeline_semaphores
        {
            return Err(DeviceError::SubmitRejected(
                "timeline semaphores not supported".to_string(),
            ));
        }
        for signal in submission.signals {
            let last = state.last_submitted_signal[signal.channel.index()];
            if signal.value <= last {
                return Err(DeviceError::SubmitRejected(format!(
                    "{:?} signal {} does not exceed previously submitted {}",
                    signal.channel, signal.value, last
                )));
            }
        }
        let mut ops = Vec::with_capacity(submission.command_buffers.len());
        for cmd in submission.command_buffers {
            let buffer = state
                .buffers
                .get(&cmd.0)
                .ok_or(DeviceError::InvalidHandle("command buffer"))?;
            if !buffer.executable {
                return Err(DeviceError::SubmitRejected(
                    "command buffer is not in the executable state".to_string(),
                ));
            }
            let pool_queue = state.pools.get(&buffer.pool).map(|p| p.queue);
            if pool_queue != Some(queue) {
                return Err(DeviceError::SubmitRejected(format!(
                    "command buffer from a {:?} pool submitted to {:?}",
                    pool_queue, queue
                )));
            }
            ops.push(buffer.ops.clone());
        }
        if let Some(fence) = submission.fence {
            match state.fences.get_mut(&fence.0) {
                Some(signaled) if !*signaled => {}
                Some(_) => {
                    return Err(DeviceError::SubmitRejected(
                        "fence submitted while still signaled".to_string(),
                    ))
                }
                None => return Err(DeviceError::InvalidHandle("fence")),
            }
        }

        for signal in submission.signals {
            state.last_submitted_signal[signal.channel.index()] = signal.value;
        }
        for cmd in submission.command_buffers {
            if let Some(buffer) = state.buffers.get_mut(&cmd.0) {
                buffer.in_flight += 1;
            }
        }
        let sequence = self.next_sequence.increment();
        state.log.push(SubmitRecord {
            sequence,
            queue,
            command_buffers: submission.command_buffers.to_vec(),
            ops,
            waits: submission.waits.to_vec(),
            signals: submission.signals.to_vec(),
            fence: submission.fence,
        });
        self.pending[queue_index(queue)].push(Pending {
            buffers: submission.command_buffers.iter().map(|c| c.0).collect(),
            waits: submission.waits.to_vec(),
            signals: submission.signals.to_vec(),
            fence: submission.fence.map(|f| f.0),
        });
        Ok(())
    }

    fn wait_channels(&self, waits: &[ChannelWait], timeout: Timeout) -> Result<(), DeviceError> {
        self.host_waits.increment();
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        let satisfied =
            |s: &SimState| waits.iter().all(|w| s.channels[w.channel.index()] >= w.value);
        if satisfied(&*state) {
            return Ok(());
        }
        self.retire_locked(&mut state);
        if satisfied(&*state) {
            Ok(())
        } else {
            Err(Self::unsatisfied(timeout))
        }
    }

    fn channel_value(&self, channel: Channel) -> Result<TimelineValue, DeviceError> {
        let state = self.state.lock();
        Self::check_alive(&state)?;
        Ok(state.channels[channel.index()])
    }

    fn create_fence(&self, signaled: bool) -> Result<Fence, DeviceError> {
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        let id = self.new_handle();
        state.fences.insert(id, signaled);
        Ok(Fence(id))
    }

    fn destroy_fence(&self, fence: Fence) {
        self.state.lock().fences.remove(&fence.0);
    }

    fn fence_signaled(&self, fence: Fence) -> Result<bool, DeviceError> {
        let state = self.state.lock();
        Self::check_alive(&state)?;
        state
            .fences
            .get(&fence.0)
            .copied()
            .ok_or(DeviceError::InvalidHandle("fence"))
    }

    fn wait_fence(&self, fence: Fence, timeout: Timeout) -> Result<(), DeviceError> {
        self.host_waits.increment();
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        match state.fences.get(&fence.0) {
            Some(true) => return Ok(()),
            Some(false) => {}
            None => return Err(DeviceError::InvalidHandle("fence")),
        }
        self.retire_locked(&mut state);
        if state.fences.get(&fence.0) == Some(&true) {
            Ok(())
        } else {
            Err(Self::unsatisfied(timeout))
        }
    }

    fn reset_fence(&self, fence: Fence) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        match state.fences.get_mut(&fence.0) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(DeviceError::InvalidHandle("fence")),
        }
    }

    fn wait_idle(&self) -> Result<(), DeviceError> {
        self.host_waits.increment();
        let mut state = self.state.lock();
        Self::check_alive(&state)?;
        self.retire_locked(&mut state);
        let stuck = state.heads.iter().any(Option::is_some)
            || self.pending.iter().any(|q| !q.is_empty());
        if stuck {
            // Nothing can make progress: the queues wait on each other.
            state.lost = true;
            return Err(DeviceError::DeviceLost);
        }
        Ok(())
    }
}
