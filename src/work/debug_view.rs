//! Chunk debug coloring.
//!
//! Colors stay on a magenta/green axis so neighbouring batches remain
//! distinguishable under the common forms of color blindness.

use crate::core::pool::SlotId;

/// What the consumer draws over each job's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebugViewMode {
    /// Normal shading.
    #[default]
    Off,
    /// Outline the box of every job.
    Bounds,
    /// Color by batch number.
    Batch,
    /// Color by slot, relative to the first slot used this frame.
    SlotIndex,
}

/// Flat color handed to the consumer recorder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugColor {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl DebugColor {
    const fn magenta_green(rb: f32, g: f32) -> Self {
        Self {
            red: rb,
            green: g,
            blue: rb,
        }
    }
}

/// Color of every job in batch `batch_index`.
///
/// Five hues cycle with the batch number, and every five batches the cycle
/// darkens by a factor of 0.75 (eight steps before repeating).
pub fn batch_color(batch_index: usize) -> DebugColor {
    let hue = batch_index % 5;
    let rb = match hue {
        0 => 0.0,
        1 => 0.75,
        _ => 1.0,
    };
    let g = match hue {
        2 => 0.0,
        3 => 0.75,
        _ => 1.0,
    };
    let shade = 0.75f32.powi(((batch_index / 5) % 8) as i32);
    DebugColor::magenta_green(rb * shade, g * shade)
}

/// Color of a slot `relative` positions after the frame's first slot.
///
/// Unique for up to 25 slots. Relative rather than absolute indices keep the
/// colors stable from frame to frame when the job count does not divide the pool.
pub fn slot_color(relative: usize) -> DebugColor {
    let rb = 0.5f32.powi((relative % 5) as i32);
    let g = 0.5f32.powi((relative / 5) as i32);
    DebugColor::magenta_green(rb, g)
}

/// Per-job colors for one batch; empty unless `mode` colors jobs.
pub fn batch_colors(
    mode: DebugViewMode,
    batch_index: usize,
    slots: &[SlotId],
    first_slot: SlotId,
    capacity: usize,
) -> Vec<DebugColor> {
    match mode {
        DebugViewMode::Batch => vec![batch_color(batch_index); slots.len()],
        DebugViewMode::SlotIndex => slots
            .iter()
            .map(|slot| {
                let relative = (slot.index() + capacity - first_slot.index()) % capacity;
                slot_color(relative)
            })
            .collect(),
        DebugViewMode::Off | DebugViewMode::Bounds => Vec::new(),
    }
}
