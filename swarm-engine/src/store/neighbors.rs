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
//! Fixed-capacity result buffers for neighbor queries and collision pairs
//!
//! Both buffers are allocated once and reused every frame; steady-state
//! operation performs no per-frame allocation. Overflow truncates rather
//! than grows, which bounds worst-case frame cost at the price of dropping
//! results in pathological clusters.

use std::collections::HashSet;

use tracing::warn;

/// Per-entity neighbor lists with squared distances, flat-packed at a fixed
/// stride.
///
/// Slot i's results occupy `i * max_per_entity ..` with `counts[i]` valid
/// entries. The flat layout lets the parallel gather path hand each worker a
/// disjoint chunk via [`NeighborBuffer::rows_mut`].
pub struct NeighborBuffer {
    counts: Vec<u16>,
    ids: Vec<u32>,
    dist_sq: Vec<f32>,
    max_per_entity: usize,
}

impl NeighborBuffer {
    /// Allocate for `capacity` entities at `max_per_entity` results each.
    pub fn new(capacity: usize, max_per_entity: usize) -> Self {
        assert!(max_per_entity > 0 && max_per_entity <= u16::MAX as usize);
        NeighborBuffer {
            counts: vec![0; capacity],
            ids: vec![0; capacity * max_per_entity],
            dist_sq: vec![0.0; capacity * max_per_entity],
            max_per_entity,
        }
    }

    /// Per-entity result cap.
    pub fn max_per_entity(&self) -> usize {
        self.max_per_entity
    }

    /// Reset all counts. Id and distance contents are left stale; only
    /// `counts` determines validity.
    pub fn begin(&mut self) {
        self.counts.fill(0);
    }

    /// Reset one entity's row.
    ///
    /// Rows are otherwise only rewritten at an index rebuild, so a slot
    /// recycled between rebuilds must drop its previous occupant's results.
    pub fn reset_row(&mut self, i: usize) {
        self.counts[i] = 0;
    }

    /// Append a neighbor for entity `i`. Returns false once the entity's row
    /// is full, letting the caller stop scanning early.
    pub fn push(&mut self, i: usize, neighbor: u32, dist_sq: f32) -> bool {
        let count = self.counts[i] as usize;
        if count >= self.max_per_entity {
            return false;
        }
        let at = i * self.max_per_entity + count;
        self.ids[at] = neighbor;
        self.dist_sq[at] = dist_sq;
        self.counts[i] = (count + 1) as u16;
        count + 1 < self.max_per_entity
    }

    /// Neighbor ids recorded for entity `i` this frame.
    pub fn neighbors(&self, i: usize) -> &[u32] {
        let start = i * self.max_per_entity;
        &self.ids[start..start + self.counts[i] as usize]
    }

    /// Squared distances matching [`NeighborBuffer::neighbors`] positionally.
    pub fn distances(&self, i: usize) -> &[f32] {
        let start = i * self.max_per_entity;
        &self.dist_sq[start..start + self.counts[i] as usize]
    }

    /// Raw parts for chunked parallel filling: counts, ids, squared
    /// distances, and the per-entity stride.
    pub(crate) fn parts_mut(&mut self) -> (&mut [u16], &mut [u32], &mut [f32], usize) {
        (
            &mut self.counts,
            &mut self.ids,
            &mut self.dist_sq,
            self.max_per_entity,
        )
    }

    /// Iterate per-entity mutable rows in index order.
    ///
    /// Yields `(count, ids, dist_sq)` triples, one per entity.
    pub fn rows_mut(
        &mut self,
    ) -> impl Iterator<Item = (&mut u16, &mut [u32], &mut [f32])> + '_ {
        let stride = self.max_per_entity;
        self.counts
            .iter_mut()
            .zip(self.ids.chunks_exact_mut(stride))
            .zip(self.dist_sq.chunks_exact_mut(stride))
            .map(|((count, ids), dist_sq)| (count, ids, dist_sq))
    }
}

/// Deduplicated, capped list of colliding index pairs for one frame.
///
/// Pairs are stored with the smaller index first and keyed into a set so the
/// same contact reported from both endpoints' neighbor lists is recorded
/// once. Overflow beyond the cap drops the pair and is surfaced in the log
/// once per frame.
pub struct PairBuffer {
    pairs: Vec<(u32, u32)>,
    seen: HashSet<u64>,
    max_pairs: usize,
    dropped: usize,
}

impl PairBuffer {
    /// Allocate with a hard cap on pairs per frame.
    pub fn new(max_pairs: usize) -> Self {
        PairBuffer {
            pairs: Vec::with_capacity(max_pairs),
            seen: HashSet::with_capacity(max_pairs * 2),
            max_pairs,
            dropped: 0,
        }
    }

    /// Stable key for an unordered pair.
    pub fn key(a: u32, b: u32) -> u64 {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        ((lo as u64) << 32) | hi as u64
    }

    /// Record a contact between `a` and `b`, ignoring duplicates on either
    /// ordering. Returns whether the pair was newly recorded.
    pub fn push(&mut self, a: u32, b: u32) -> bool {
        let key = Self::key(a, b);
        if !self.seen.insert(key) {
            return false;
        }
        if self.pairs.len() >= self.max_pairs {
            self.dropped += 1;
            return false;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        self.pairs.push((lo, hi));
        true
    }

    /// Pairs recorded this frame, smaller index first.
    pub fn pairs(&self) -> &[(u32, u32)] {
        &self.pairs
    }

    /// Reset for the next frame, logging if the previous frame overflowed.
    pub fn clear(&mut self) {
        if self.dropped > 0 {
            warn!(
                dropped = self.dropped,
                max_pairs = self.max_pairs,
                "collision pair buffer overflowed, contacts dropped"
            );
        }
        self.pairs.clear();
        self.seen.clear();
        self.dropped = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_rows_are_independent() {
        let mut buf = NeighborBuffer::new(4, 3);
        buf.begin();
        assert!(buf.push(0, 9, 1.0));
        assert!(buf.push(2, 7, 4.0));
        assert!(buf.push(2, 8, 9.0));
        assert_eq!(buf.neighbors(0), &[9]);
        assert_eq!(buf.neighbors(1), &[] as &[u32]);
        assert_eq!(buf.neighbors(2), &[7, 8]);
        assert_eq!(buf.distances(2), &[4.0, 9.0]);
    }

    #[test]
    fn test_neighbor_cap_signals_early_stop() {
        let mut buf = NeighborBuffer::new(2, 2);
        buf.begin();
        assert!(buf.push(0, 1, 1.0));
        // Second push fills the row; caller should stop scanning.
        assert!(!buf.push(0, 2, 2.0));
        // Further pushes are rejected outright.
        assert!(!buf.push(0, 3, 3.0));
        assert_eq!(buf.neighbors(0), &[1, 2]);
    }

    #[test]
    fn test_reset_row_clears_only_that_row() {
        let mut buf = NeighborBuffer::new(3, 2);
        buf.begin();
        buf.push(0, 5, 1.0);
        buf.push(1, 6, 2.0);
        buf.reset_row(1);
        assert_eq!(buf.neighbors(0), &[5]);
        assert_eq!(buf.neighbors(1), &[] as &[u32]);
    }

    #[test]
    fn test_begin_invalidates_previous_frame() {
        let mut buf = NeighborBuffer::new(2, 2);
        buf.begin();
        buf.push(0, 5, 1.0);
        buf.begin();
        assert_eq!(buf.neighbors(0), &[] as &[u32]);
    }

    #[test]
    fn test_pair_dedup_both_orderings() {
        let mut buf = PairBuffer::new(16);
        assert!(buf.push(3, 7));
        assert!(!buf.push(7, 3));
        assert!(!buf.push(3, 7));
        assert_eq!(buf.pairs(), &[(3, 7)]);
    }

    #[test]
    fn test_pair_key_is_order_independent() {
        assert_eq!(PairBuffer::key(1, 2), PairBuffer::key(2, 1));
        assert_ne!(PairBuffer::key(1, 2), PairBuffer::key(1, 3));
    }

    #[test]
    fn test_pair_cap_drops_and_clears() {
        let mut buf = PairBuffer::new(2);
        assert!(buf.push(0, 1));
        assert!(buf.push(0, 2));
        assert!(!buf.push(0, 3));
        assert_eq!(buf.pairs().len(), 2);
        buf.clear();
        assert!(buf.pairs().is_empty());
        assert!(buf.push(0, 3));
    }
}
