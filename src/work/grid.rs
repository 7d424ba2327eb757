//! Job grid: splits a bounding box into equally sized jobs.

use std::sync::atomic::{AtomicBool, Ordering};

use super::{JobDescriptor, JobSource};

/// Cells along one edge of the region a single job covers.
pub const CELLS_PER_JOB_EDGE: i32 = 127;

/// Largest accepted target cell count per axis.
pub const MAX_TARGET_CELLS: i32 = 1024;

static CLAMP_REPORTED: AtomicBool = AtomicBool::new(false);

/// A world-space box divided into a 3D grid of jobs.
///
/// The number of jobs per axis is `max(round(cells / 127), 1)` where `cells` is
/// the requested resolution along that axis, clamped to `[0, 1024]`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobGrid {
    /// Lower corner of the box.
    pub low: [f32; 3],
    /// Upper corner of the box.
    pub high: [f32; 3],
    /// Requested resolution in cells per axis.
    pub target_cells: [i32; 3],
    /// Animation time stamped on every job.
    pub t: f32,
}

impl Default for JobGrid {
    /// A ±2 box at 508 cells per axis: 4×4×4 jobs.
    fn default() -> Self {
        Self {
            low: [-2.0; 3],
            high: [2.0; 3],
            target_cells: [4 * CELLS_PER_JOB_EDGE; 3],
            t: 0.0,
        }
    }
}

impl JobGrid {
    /// Create a grid over `[low, high]`.
    pub fn new(low: [f32; 3], high: [f32; 3], target_cells: [i32; 3]) -> Self {
        Self {
            low,
            high,
            target_cells,
            t: 0.0,
        }
    }

    /// Set the animation time.
    pub fn with_time(mut self, t: f32) -> Self {
        self.t = t;
        self
    }

    /// Jobs along each axis.
    pub fn job_counts(&self) -> [usize; 3] {
        let clamped = self.target_cells.map(|c| c.clamp(0, MAX_TARGET_CELLS));
        if clamped != self.target_cells && !CLAMP_REPORTED.swap(true, Ordering::Relaxed) {
            crate::fs_emit!(
                FS002,
                "requested {:?} cells, using {:?}",
                self.target_cells,
                clamped
            );
        }
        clamped.map(|c| ((c as f32 / CELLS_PER_JOB_EDGE as f32).round() as usize).max(1))
    }

    /// Total number of jobs.
    pub fn job_count(&self) -> usize {
        self.job_counts().iter().product()
    }
}

impl JobSource for JobGrid {
    /// Jobs in x-fastest order. Neighbouring boxes share their faces exactly.
    fn jobs(&self) -> Vec<JobDescriptor> {
        let counts = self.job_counts();
        let size = [
            self.high[0] - self.low[0],
            self.high[1] - self.low[1],
            self.high[2] - self.low[2],
        ];
        // Corners are computed from grid indices rather than accumulated so the
        // high face of one job is bit-identical to the low face of the next.
        let corner = |axis: usize, i: usize| {
            self.low[axis] + size[axis] * (i as f32 / counts[axis] as f32)
        };

        let mut jobs = Vec::with_capacity(counts.iter().product());
        for z in 0..counts[2] {
            for y in 0..counts[1] {
                for x in 0..counts[0] {
                    let low = [corner(0, x), corner(1, y), corner(2, z)];
                    let high = [corner(0, x + 1), corner(1, y + 1), corner(2, z + 1)];
                    jobs.push(JobDescriptor {
                        offset: low,
                        extent: [high[0] - low[0], high[1] - low[1], high[2] - low[2]],
                        t: self.t,
                    });
                }
            }
        }
        jobs
    }
}
