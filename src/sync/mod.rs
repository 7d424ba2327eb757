//! Synchronization primitives.
//!
//! Host-side locking for device backends whose methods take `&self`.

pub(crate) mod atomics;
pub(crate) mod mutex;
