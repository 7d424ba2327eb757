//! Work collaborators.
//!
//! The scheduler decides *when* and *where* work runs; what the work is stays
//! behind the traits in this module. A [`JobSource`] lists the jobs of a
//! frame, a [`CommandRecorder`] records the producer and consumer commands of
//! each batch, and a [`KernelCompiler`] turns a user expression into the
//! producer kernel.

use std::fmt;

use crate::core::clock::BatchTimeline;
use crate::core::pool::SlotId;
use crate::device::{CommandBuffer, DeviceError};

pub mod debug_view;
pub mod grid;

pub use debug_view::{DebugColor, DebugViewMode};
pub use grid::JobGrid;

/// One unit of work: a box of space to fill and draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobDescriptor {
    /// Lower corner of the box.
    pub offset: [f32; 3],
    /// Size of the box along each axis.
    pub extent: [f32; 3],
    /// Animation time.
    pub t: f32,
}

impl JobDescriptor {
    /// Create a job.
    pub const fn new(offset: [f32; 3], extent: [f32; 3], t: f32) -> Self {
        Self { offset, extent, t }
    }

    /// Upper corner of the box.
    pub fn upper(&self) -> [f32; 3] {
        [
            self.offset[0] + self.extent[0],
            self.offset[1] + self.extent[1],
            self.offset[2] + self.extent[2],
        ]
    }
}

/// Produces the ordered job list of a frame. Queried once per frame.
pub trait JobSource {
    /// Jobs to run this frame, in submission order.
    fn jobs(&self) -> Vec<JobDescriptor>;
}

impl JobSource for Vec<JobDescriptor> {
    fn jobs(&self) -> Vec<JobDescriptor> {
        self.clone()
    }
}

impl JobSource for [JobDescriptor] {
    fn jobs(&self) -> Vec<JobDescriptor> {
        self.to_vec()
    }
}

/// Handle to a compiled producer kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelHandle {
    id: u64,
    expression: String,
}

impl KernelHandle {
    /// Wrap a backend kernel id.
    pub fn new(id: u64, expression: impl Into<String>) -> Self {
        Self {
            id,
            expression: expression.into(),
        }
    }

    /// Backend id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Expression the kernel was compiled from.
    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// Errors from kernel compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// The expression did not parse
    Syntax(String),
    /// The expression parsed but the backend refused it
    Compile(String),
    /// The device failed while building the kernel
    Device(DeviceError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Syntax(msg) => write!(f, "Kernel syntax error: {}", msg),
            KernelError::Compile(msg) => write!(f, "Kernel compilation failed: {}", msg),
            KernelError::Device(err) => write!(f, "Device error while building kernel: {}", err),
        }
    }
}

impl std::error::Error for KernelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KernelError::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeviceError> for KernelError {
    fn from(err: DeviceError) -> Self {
        KernelError::Device(err)
    }
}

/// Builds producer kernels from user expressions.
pub trait KernelCompiler {
    /// Compile `expression`. On error the caller keeps its previous kernel.
    fn compile(&mut self, expression: &str) -> Result<KernelHandle, KernelError>;
}

/// Everything a recorder needs to know about the batch being recorded.
#[derive(Debug, Clone, Copy)]
pub struct BatchContext<'a> {
    /// Position within the frame.
    pub index: usize,
    /// Number of batches in the frame.
    pub count: usize,
    /// Jobs of this batch, in order.
    pub jobs: &'a [JobDescriptor],
    /// Slot assigned to each job (same length as `jobs`).
    pub slots: &'a [SlotId],
    /// Timeline values the batch waits for and signals. `None` in
    /// single-queue mode, which orders work with barriers instead.
    pub timeline: Option<BatchTimeline>,
    /// Per-job debug colors; empty when the debug view is off.
    pub debug_colors: &'a [DebugColor],
}

impl BatchContext<'_> {
    /// First batch of the frame.
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Last batch of the frame.
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }

    /// Job and slot pairs.
    pub fn assignments(&self) -> impl Iterator<Item = (&JobDescriptor, SlotId)> + '_ {
        self.jobs.iter().zip(self.slots.iter().copied())
    }
}

/// Records the opaque commands of a frame.
///
/// The scheduler owns command buffer lifetimes, begin/end, barriers and
/// submission; the recorder only appends its own commands.
pub trait CommandRecorder {
    /// Commands that open the frame (e.g. beginning the render pass).
    /// Recorded before the first batch's consumer commands.
    fn record_frame_start(&mut self, cmd: CommandBuffer) -> Result<(), DeviceError>;

    /// Producer commands filling the batch's slots.
    fn record_producer(
        &mut self,
        cmd: CommandBuffer,
        kernel: &KernelHandle,
        batch: &BatchContext<'_>,
    ) -> Result<(), DeviceError>;

    /// Consumer commands reading the batch's slots.
    fn record_consumer(&mut self, cmd: CommandBuffer, batch: &BatchContext<'_>)
        -> Result<(), DeviceError>;

    /// Commands that close the frame. Recorded after the last batch's consumer commands.
    fn record_frame_end(&mut self, cmd: CommandBuffer) -> Result<(), DeviceError>;
}
