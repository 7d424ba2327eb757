//! # framesync
//!
//! Timeline-semaphore batch scheduling for ring-buffered compute → graphics
//! GPU pipelines.
//!
//! ## Features
//!
//! - Batch partitioning of a frame's jobs into bounded batches
//! - Fixed-size circular pool of reusable resource slots, recycled lazily
//! - One logical clock driving two timeline channels (producer-done and
//!   consumer-done) so work on a dedicated compute queue overlaps drawing on
//!   the graphics queue without ever overwriting a slot that is still read
//! - Single-queue fallback with barriers instead of semaphores
//! - Double-buffered command pools guarded by timeline thresholds or fences
//! - Deterministic simulated device for tests, optional Vulkan backend
//! - Coded diagnostics (`FS0xx`..`FS9xx`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use framesync::{FrameScheduler, JobGrid, KernelHandle, SchedConfig, SimDevice};
//! # fn my_recorder() -> Box<dyn framesync::CommandRecorder> { unimplemented!() }
//!
//! let device = Arc::new(SimDevice::new());
//! let mut scheduler =
//!     FrameScheduler::new(device, SchedConfig::default(), KernelHandle::new(0, "sphere"))?;
//! let mut recorder = my_recorder();
//!
//! // Render loop
//! let jobs = JobGrid::default();
//! for _ in 0..3 {
//!     let report = scheduler.run_frame(&jobs, recorder.as_mut())?;
//!     println!("{} batches, last signal {:?}", report.batches, report.signals);
//! }
//! # Ok::<(), framesync::SchedError>(())
//! ```

pub mod api;
pub mod core;
pub mod device;
pub mod diagnostics;
pub mod frame;
pub mod sched;
pub mod work;

mod sync;

// Re-export public API at crate root for convenience
pub use api::config::SchedConfig;
pub use api::error::SchedError;
pub use api::scheduler::FrameScheduler;
pub use api::stats::{FrameReport, SchedStats};

// Scheduling core
pub use crate::core::batch::{batch_count, partition, BatchRange};
pub use crate::core::clock::{BatchTimeline, LogicalClock, TimelineValue, TIMELINE_START};
pub use crate::core::pool::{ResourcePool, ResourceSlot, SlotId};

// Strategies and frame resources
pub use frame::{FrameResourceRecycler, SafetyMarker};
pub use sched::{DualQueueScheduler, QueueMode, SingleQueueScheduler, SubmitStrategy};

// Device layer
pub use device::{
    Channel, ChannelSignal, ChannelWait, CommandBuffer, CommandPool, Device, DeviceCapabilities,
    DeviceError, Fence, PipelineBarrier, QueueKind, SimDevice, SimOp, SubmitRecord, Submission,
    Timeout,
};
#[cfg(feature = "vulkan")]
pub use device::vulkan::VulkanDevice;

// Work collaborators
pub use work::{
    BatchContext, CommandRecorder, DebugColor, DebugViewMode, JobDescriptor, JobGrid, JobSource,
    KernelCompiler, KernelError, KernelHandle,
};

// Diagnostics
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink};
pub use diagnostics::{FS001, FS002, FS003, FS004, FS101, FS102, FS103, FS201, FS202, FS901};
