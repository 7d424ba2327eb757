//! Ring buffer of reusable resource slots.
//!
//! Each slot stands for one unit of pipeline-private storage (a 3D sample image
//! plus a geometry array) shared by the producer and consumer stages. Slots are
//! handed out round-robin and never released explicitly: a slot becomes safe to
//! overwrite once the consumer-done channel reaches its `ready_value`, which the
//! scheduler checks lazily when the slot comes around again.

use std::fmt;

use super::clock::{TimelineValue, TIMELINE_START};

/// Index of a slot within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    /// Position in the pool.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// One reusable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceSlot {
    id: SlotId,
    ready_value: TimelineValue,
}

impl ResourceSlot {
    /// Slot identity.
    #[inline]
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Consumer-done value that must be reached before new producer work may target this slot.
    #[inline]
    pub fn ready_value(&self) -> TimelineValue {
        self.ready_value
    }
}

/// Fixed-size circular pool of resource slots.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    slots: Box<[ResourceSlot]>,
    /// Next slot to hand out
    cursor: usize,
}

impl ResourcePool {
    /// Create a pool of `capacity` slots, all immediately reusable.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or does not fit in a `u32`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "resource pool needs at least one slot");
        let count = u32::try_from(capacity).expect("resource pool capacity exceeds u32");
        let slots = (0..count)
            .map(|i| ResourceSlot {
                id: SlotId(i),
                ready_value: TIMELINE_START,
            })
            .collect();
        Self { slots, cursor: 0 }
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The slot the next [`acquire_next`](Self::acquire_next) will return.
    #[inline]
    pub fn cursor(&self) -> SlotId {
        self.slots[self.cursor].id
    }

    /// Return the next slot in round-robin order.
    pub fn acquire_next(&mut self) -> SlotId {
        let id = self.slots[self.cursor].id;
        self.cursor += 1;
        if self.cursor == self.slots.len() {
            self.cursor = 0;
        }
        id
    }

    /// Acquire `count` consecutive slots (with wraparound).
    pub fn acquire_batch(&mut self, count: usize) -> Vec<SlotId> {
        (0..count).map(|_| self.acquire_next()).collect()
    }

    /// Look up a slot.
    #[inline]
    pub fn slot(&self, id: SlotId) -> &ResourceSlot {
        &self.slots[id.index()]
    }

    /// Ready value of a slot.
    #[inline]
    pub fn ready_value(&self, id: SlotId) -> TimelineValue {
        self.slot(id).ready_value
    }

    /// Largest ready value among `ids`: the consumer-done threshold new producer work
    /// on those slots has to wait for.
    pub fn wait_threshold(&self, ids: &[SlotId]) -> TimelineValue {
        ids.iter()
            .map(|&id| self.ready_value(id))
            .max()
            .unwrap_or(TIMELINE_START)
    }

    /// Record that the consumer work signaling `value` is the last reader of `ids`.
    pub fn mark_ready(&mut self, ids: &[SlotId], value: TimelineValue) {
        for &id in ids {
            self.slots[id.index()].ready_value = value;
        }
    }

    /// Ready values of every slot, indexed by slot position.
    pub fn ready_values(&self) -> Vec<TimelineValue> {
        self.slots.iter().map(|s| s.ready_value).collect()
    }

    /// Iterate over all slots.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceSlot> {
        self.slots.iter()
    }
}
