//! Device traits and types
//!
//! This module defines the submission interface the scheduler talks to WITHOUT pulling in any
//! backend-specific dependencies. The scheduler depends on this trait, not on a backend.

use std::fmt;
use std::time::Duration;

use crate::core::clock::TimelineValue;

/// Errors reported by a device backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device was lost; nothing submitted afterwards will complete
    DeviceLost,
    /// A host-side wait expired before its condition was met
    Timeout,
    /// The backend rejected a submission
    SubmitRejected(String),
    /// Host or device memory was exhausted
    OutOfMemory,
    /// A handle did not belong to this device or was already destroyed
    InvalidHandle(&'static str),
    /// Backend-specific error (opaque)
    BackendError(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::DeviceLost => write!(f, "Device lost"),
            DeviceError::Timeout => write!(f, "Host wait timed out"),
            DeviceError::SubmitRejected(msg) => write!(f, "Submission rejected: {}", msg),
            DeviceError::OutOfMemory => write!(f, "Out of memory"),
            DeviceError::InvalidHandle(kind) => write!(f, "Invalid {} handle", kind),
            DeviceError::BackendError(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Hardware queue a submission targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics + compute + transfer queue; runs consumer (drawing) work
    Graphics,
    /// Dedicated async compute queue; runs producer work in dual-queue mode
    Compute,
}

/// One of the two timeline channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Advanced when producer (compute) work for a batch completes
    ProducerDone,
    /// Advanced when consumer (graphics) work for a batch completes
    ConsumerDone,
}

impl Channel {
    /// Both channels, in a fixed order.
    pub const ALL: [Channel; 2] = [Channel::ProducerDone, Channel::ConsumerDone];

    /// Index into per-channel arrays.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::ProducerDone => 0,
            Channel::ConsumerDone => 1,
        }
    }
}

/// Device-side wait: do not start until `channel` reaches at least `value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWait {
    pub channel: Channel,
    pub value: TimelineValue,
}

/// Device-side signal: set `channel` to `value` once the submission completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSignal {
    pub channel: Channel,
    pub value: TimelineValue,
}

/// Opaque command pool handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandPool(pub u64);

/// Opaque command buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBuffer(pub u64);

/// Opaque fence handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fence(pub u64);

/// Memory/execution barriers the scheduler records between stages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineBarrier {
    /// Producer shader writes made visible to consumer indirect, vertex and shader reads.
    ///
    /// Recorded on the consumer queue in dual-queue mode. The timeline wait only orders
    /// execution, it does not make the producer's writes visible.
    ProducerToConsumer,
    /// Execution and memory dependency covering both stages in both directions.
    ///
    /// Recorded between producer and consumer commands in single-queue mode, where it also
    /// orders earlier consumer reads before later producer writes.
    AllStages,
}

/// Host wait timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Block until the condition is met
    Infinite,
    /// Give up after this long
    After(Duration),
}

impl Timeout {
    /// Timeout in nanoseconds as expected by Vulkan (`u64::MAX` for infinite).
    pub fn as_nanos(self) -> u64 {
        match self {
            Timeout::Infinite => u64::MAX,
            Timeout::After(d) => u64::try_from(d.as_nanos()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::Infinite
    }
}

/// One queue submission
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    /// Command buffers, executed in order
    pub command_buffers: &'a [CommandBuffer],
    /// Channel thresholds to reach before starting
    pub waits: &'a [ChannelWait],
    /// Channel values to set on completion
    pub signals: &'a [ChannelSignal],
    /// Fence to signal on completion
    pub fence: Option<Fence>,
}

/// Features the scheduler depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// A compute queue from a different family than the graphics queue exists
    pub dedicated_compute_queue: bool,
    /// 64-bit counting semaphores are supported and enabled
    pub timeline_semaphores: bool,
}

/// Core device trait - every backend must implement this
///
/// This trait is object-safe for use with `Arc<dyn Device>`. All methods take `&self`;
/// backends that keep host-side state use interior mutability.
pub trait Device: Send + Sync {
    /// Report which optional features are available.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Create a command pool whose buffers may be submitted to `queue`.
    fn create_command_pool(&self, queue: QueueKind) -> Result<CommandPool, DeviceError>;

    /// Destroy a command pool and every buffer allocated from it.
    fn destroy_command_pool(&self, pool: CommandPool);

    /// Reset every buffer of the pool to the initial state, keeping allocations.
    ///
    /// Only valid once every submission using the pool's buffers has retired.
    fn reset_command_pool(&self, pool: CommandPool) -> Result<(), DeviceError>;

    /// Allocate one primary command buffer from `pool`.
    fn allocate_command_buffer(&self, pool: CommandPool) -> Result<CommandBuffer, DeviceError>;

    /// Begin one-time-submit recording.
    fn begin_command_buffer(&self, cmd: CommandBuffer) -> Result<(), DeviceError>;

    /// Finish recording.
    fn end_command_buffer(&self, cmd: CommandBuffer) -> Result<(), DeviceError>;

    /// Record a pipeline barrier.
    fn cmd_pipeline_barrier(&self, cmd: CommandBuffer, barrier: PipelineBarrier);

    /// Submit work. Returns as soon as the work is queued.
    fn submit(&self, queue: QueueKind, submission: &Submission<'_>) -> Result<(), DeviceError>;

    /// Block the host until every channel reaches its threshold.
    fn wait_channels(&self, waits: &[ChannelWait], timeout: Timeout) -> Result<(), DeviceError>;

    /// Last value the device signaled on `channel`.
    fn channel_value(&self, channel: Channel) -> Result<TimelineValue, DeviceError>;

    /// Create a fence.
    fn create_fence(&self, signaled: bool) -> Result<Fence, DeviceError>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: Fence);

    /// Whether the fence is signaled, without blocking.
    fn fence_signaled(&self, fence: Fence) -> Result<bool, DeviceError>;

    /// Block the host until the fence is signaled.
    fn wait_fence(&self, fence: Fence, timeout: Timeout) -> Result<(), DeviceError>;

    /// Return the fence to the unsignaled state.
    fn reset_fence(&self, fence: Fence) -> Result<(), DeviceError>;

    /// Block until every queue is idle.
    fn wait_idle(&self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_nanos() {
        assert_eq!(Timeout::Infinite.as_nanos(), u64::MAX);
        assert_eq!(Timeout::After(Duration::from_millis(2)).as_nanos(), 2_000_000);
        assert_eq!(Timeout::default(), Timeout::Infinite);
    }

    #[test]
    fn test_channel_index_is_dense() {
        let indices: Vec<usize> = Channel::ALL.iter().map(|c| c.index()).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_device_error_display() {
        assert_eq!(DeviceError::Timeout.to_string(), "Host wait timed out");
        assert_eq!(
            DeviceError::InvalidHandle("fence").to_string(),
            "Invalid fence handle"
        );
    }
}
