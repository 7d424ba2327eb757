//! Device submission layer
//!
//! The scheduler only ever talks to a [`Device`]: command pools and buffers, pipeline barriers,
//! queue submissions with timeline waits/signals, fences and host waits.
//!
//! ## Backends
//! - `sim`: in-process simulation, always available (tests, benches, demos)
//! - `vulkan`: via the `ash` crate (enable the `vulkan` feature)

// Always present for API stability: traits define the interface
pub mod traits;
pub use traits::{
    Channel, ChannelSignal, ChannelWait, CommandBuffer, CommandPool, Device, DeviceCapabilities,
    DeviceError, Fence, PipelineBarrier, QueueKind, Submission, Timeout,
};

// Simulated device (always available)
pub mod sim;
pub use sim::{SimDevice, SimOp, SubmitRecord};

#[cfg(feature = "vulkan")]
pub mod vulkan;
