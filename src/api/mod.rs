//! Public API for framesync.
//!
//! Most users only need [`FrameScheduler`](scheduler::FrameScheduler) and
//! [`SchedConfig`](config::SchedConfig).

pub mod config;
pub mod error;
pub mod scheduler;
pub mod stats;
