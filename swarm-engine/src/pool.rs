// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Free-list pooling of entity slots
//!
//! Every kind's maximum population is declared up front; slots are
//! preallocated as a contiguous global range per kind and recycled through a
//! per-kind free stack. Spawn and despawn are O(1) stack operations, and no
//! storage is allocated or freed after startup.

use tracing::debug;

use crate::behavior::KindId;
use crate::error::{Result, SimError};

/// Contiguous global slot range owned by one kind.
#[derive(Debug, Clone, Copy)]
pub struct KindRange {
    /// First global slot of the range.
    pub start: usize,
    /// Number of slots (the kind's maximum population).
    pub count: usize,
}

impl KindRange {
    /// Whether a global slot falls in this range.
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.start + self.count
    }
}

/// Occupancy counters for one kind's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Preallocated slots.
    pub total: usize,
    /// Slots currently spawned.
    pub active: usize,
    /// Slots on the free stack.
    pub available: usize,
    /// High-water mark of `active` since startup.
    pub peak_active: usize,
}

struct KindPool {
    range: KindRange,
    // Stack of free global indices; built in reverse so the lowest index
    // pops first and populations stay front-packed within the range.
    free: Vec<usize>,
    peak_active: usize,
}

/// Slot allocator over all kinds' ranges.
///
/// Ranges are assigned in registration order, back to back from slot zero.
pub struct EntityPool {
    kinds: Vec<KindPool>,
    capacity: usize,
}

impl EntityPool {
    /// Build pools from the per-kind instance counts, in registration order.
    pub fn new(counts: &[usize]) -> Self {
        let mut kinds = Vec::with_capacity(counts.len());
        let mut start = 0usize;
        for &count in counts {
            let free: Vec<usize> = (start..start + count).rev().collect();
            kinds.push(KindPool {
                range: KindRange { start, count },
                free,
                peak_active: 0,
            });
            start += count;
        }
        EntityPool {
            kinds,
            capacity: start,
        }
    }

    /// Total slots across all kinds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot range assigned to a kind.
    pub fn range(&self, kind: KindId) -> KindRange {
        self.kinds[kind.index()].range
    }

    /// Take a free slot for a kind.
    ///
    /// Fails with [`SimError::PoolExhausted`] when the kind's declared
    /// maximum is already live; the caller decides whether that is fatal.
    pub fn acquire(&mut self, kind: KindId, kind_name: &str) -> Result<usize> {
        let pool = &mut self.kinds[kind.index()];
        let index = pool
            .free
            .pop()
            .ok_or_else(|| SimError::PoolExhausted(kind_name.to_string()))?;
        let active = pool.range.count - pool.free.len();
        if active > pool.peak_active {
            pool.peak_active = active;
        }
        Ok(index)
    }

    /// Return a slot to its kind's free stack.
    ///
    /// The caller is responsible for releasing each live slot at most once;
    /// the liveness flag in the store is the idempotence guard.
    pub fn release(&mut self, kind: KindId, index: usize) {
        let pool = &mut self.kinds[kind.index()];
        debug_assert!(pool.range.contains(index), "slot outside kind range");
        debug_assert!(!pool.free.contains(&index), "double release of slot");
        pool.free.push(index);
    }

    /// Return every slot of a kind to its free stack.
    pub fn release_all(&mut self, kind: KindId) {
        let pool = &mut self.kinds[kind.index()];
        let released = pool.range.count - pool.free.len();
        pool.free.clear();
        pool.free.extend((pool.range.start..pool.range.start + pool.range.count).rev());
        if released > 0 {
            debug!(kind = kind.index(), released, "released all pooled slots");
        }
    }

    /// Occupancy counters for one kind.
    pub fn stats(&self, kind: KindId) -> PoolStats {
        let pool = &self.kinds[kind.index()];
        PoolStats {
            total: pool.range.count,
            active: pool.range.count - pool.free.len(),
            available: pool.free.len(),
            peak_active: pool.peak_active,
        }
    }
}
