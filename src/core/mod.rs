//! Scheduling core: logical clock, resource pool and batch partitioning.
//!
//! Nothing in here talks to a device; the submission strategies in `sched`
//! combine these pieces into queue submissions.

pub mod batch;
pub mod clock;
pub mod pool;

pub use batch::{batch_count, partition, BatchRange, Batches};
pub use clock::{BatchTimeline, LogicalClock, TimelineValue, TIMELINE_START};
pub use pool::{ResourcePool, ResourceSlot, SlotId};
