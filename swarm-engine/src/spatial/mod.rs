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
//! Uniform-grid spatial index
//!
//! Buckets active entities into fixed-size grid cells and answers "who is
//! within my visual range" by scanning the square of cells covering that
//! range, filtering candidates by squared distance. Squared distances are
//! used throughout; no square root is taken on this path.
//!
//! Entities with non-finite coordinates are treated as not yet initialized
//! and excluded from both insertion and queries for the frame, so a NaN
//! position never poisons anyone's neighbor list.

use tracing::debug;

use crate::config::{SpatialConfig, WorldConfig};
use crate::store::NeighborBuffer;

/// Uniform grid over the world rectangle.
///
/// Cell buckets keep their allocations across rebuilds, so steady-state
/// rebuilds allocate nothing.
pub struct SpatialGrid {
    cell_size: f32,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<u32>>,
}

impl SpatialGrid {
    /// Build a grid covering `world` at the configured cell size.
    pub fn new(world: &WorldConfig, config: &SpatialConfig) -> Self {
        let cols = (world.width / config.cell_size).ceil().max(1.0) as usize;
        let rows = (world.height / config.cell_size).ceil().max(1.0) as usize;
        SpatialGrid {
            cell_size: config.cell_size,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
        }
    }

    /// Grid dimensions in cells.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Cell coordinates for a position: `floor(pos / cell_size)`, clamped to
    /// the grid.
    pub fn cell_of(&self, x: f32, y: f32) -> (usize, usize) {
        let col = (x / self.cell_size).floor();
        let row = (y / self.cell_size).floor();
        let col = (col.max(0.0) as usize).min(self.cols - 1);
        let row = (row.max(0.0) as usize).min(self.rows - 1);
        (col, row)
    }

    /// Rebucket every active, finite-positioned entity.
    pub fn rebuild(&mut self, x: &[f32], y: &[f32], active: &[u8]) {
        for cell in &mut self.cells {
            cell.clear();
        }
        for i in 0..x.len() {
            if active[i] == 0 || !x[i].is_finite() || !y[i].is_finite() {
                continue;
            }
            let (col, row) = self.cell_of(x[i], y[i]);
            self.cells[row * self.cols + col].push(i as u32);
        }
    }

    /// Fill one entity's neighbor row from the current buckets.
    ///
    /// Scans the square of cells within `ceil(visual_range / cell_size)` of
    /// the entity's cell, keeps candidates strictly inside the entity's own
    /// squared visual range, excludes the entity itself, and stops early once
    /// the row is full. Returns whether the row hit the per-entity cap.
    #[allow(clippy::too_many_arguments)]
    fn gather_row(
        &self,
        i: usize,
        x: &[f32],
        y: &[f32],
        visual_range: &[f32],
        active: &[u8],
        max_per_entity: usize,
        count: &mut u16,
        ids: &mut [u32],
        dist_sq_out: &mut [f32],
    ) -> bool {
        *count = 0;
        if active[i] == 0 || !x[i].is_finite() || !y[i].is_finite() {
            return false;
        }
        let range = visual_range[i];
        let range_sq = range * range;
        let reach = (range / self.cell_size).ceil() as isize;
        let (col, row) = self.cell_of(x[i], y[i]);
        let col = col as isize;
        let row = row as isize;

        for dy in -reach..=reach {
            let r = row + dy;
            if r < 0 || r >= self.rows as isize {
                continue;
            }
            for dx in -reach..=reach {
                let c = col + dx;
                if c < 0 || c >= self.cols as isize {
                    continue;
                }
                for &j in &self.cells[r as usize * self.cols + c as usize] {
                    let j = j as usize;
                    if j == i {
                        continue;
                    }
                    let ddx = x[j] - x[i];
                    let ddy = y[j] - y[i];
                    let d2 = ddx * ddx + ddy * ddy;
                    if d2 < range_sq {
                        let at = *count as usize;
                        ids[at] = j as u32;
                        dist_sq_out[at] = d2;
                        *count += 1;
                        if *count as usize >= max_per_entity {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Fill every entity's neighbor row sequentially.
    pub fn gather(
        &self,
        x: &[f32],
        y: &[f32],
        visual_range: &[f32],
        active: &[u8],
        neighbors: &mut NeighborBuffer,
    ) {
        let max = neighbors.max_per_entity();
        let mut truncated = 0usize;
        for (i, (count, ids, dist_sq)) in neighbors.rows_mut().enumerate() {
            if self.gather_row(i, x, y, visual_range, active, max, count, ids, dist_sq) {
                truncated += 1;
            }
        }
        if truncated > 0 {
            debug!(truncated, cap = max, "neighbor rows hit the per-entity cap");
        }
    }

    /// Fill neighbor rows across the rayon thread pool.
    ///
    /// Each worker owns a disjoint row, so this is a pure fan-out with no
    /// synchronization beyond the join.
    #[cfg(feature = "parallel")]
    pub fn gather_parallel(
        &self,
        x: &[f32],
        y: &[f32],
        visual_range: &[f32],
        active: &[u8],
        neighbors: &mut NeighborBuffer,
    ) {
        use rayon::prelude::*;

        let (counts, ids, dist_sq, stride) = neighbors.parts_mut();
        let truncated: usize = counts
            .par_iter_mut()
            .zip(ids.par_chunks_exact_mut(stride))
            .zip(dist_sq.par_chunks_exact_mut(stride))
            .enumerate()
            .map(|(i, ((count, ids), dist_sq))| {
                self.gather_row(i, x, y, visual_range, active, stride, count, ids, dist_sq)
                    as usize
            })
            .sum();
        if truncated > 0 {
            debug!(truncated, cap = stride, "neighbor rows hit the per-entity cap");
        }
    }
}
