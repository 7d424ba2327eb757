//! Per-frame command resources.

pub mod recycler;

pub use recycler::{FrameResourceRecycler, SafetyMarker, FRAME_SLOTS};
