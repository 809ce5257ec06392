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
//! Collision detection and resolution
//!
//! Broad phase reuses the spatial index's neighbor lists; narrow phase is a
//! circle-circle overlap test over current positions. Surviving contacts go
//! into the deduplicated pair buffer with the smaller index first.
//!
//! Two resolution policies can be enabled independently. Separation nudges
//! overlapping pairs apart in proportion to their overlap without touching
//! velocity. Elastic resolution exchanges impulse along the contact normal
//! with configurable restitution and tangential friction, then re-clamps
//! speeds so resolution can never inject unbounded energy.

use crate::store::{NeighborBuffer, PairBuffer};

/// Narrow-phase pass: test every neighbor candidate for circle overlap.
///
/// Distances are recomputed from current positions rather than trusting the
/// squared distances captured at the last index rebuild, since positions
/// may have moved since. Pairs are deduplicated across both endpoints'
/// neighbor lists by the buffer itself.
pub fn detect(
    neighbors: &NeighborBuffer,
    x: &[f32],
    y: &[f32],
    radius: &[f32],
    active: &[u8],
    pairs: &mut PairBuffer,
) {
    for i in 0..x.len() {
        if active[i] == 0 {
            continue;
        }
        for &j in neighbors.neighbors(i) {
            let j = j as usize;
            if active[j] == 0 {
                continue;
            }
            let dx = x[j] - x[i];
            let dy = y[j] - y[i];
            let reach = radius[i] + radius[j];
            if dx * dx + dy * dy < reach * reach {
                pairs.push(i as u32, j as u32);
            }
        }
    }
}

/// Push each overlapping pair apart along the contact normal.
///
/// Each entity moves half the resolved overlap; `strength` is the fraction
/// of the overlap resolved this frame. Coincident centers take a fixed
/// fallback axis since no normal exists.
pub fn separate(pairs: &PairBuffer, x: &mut [f32], y: &mut [f32], radius: &[f32], strength: f32) {
    for &(a, b) in pairs.pairs() {
        let (a, b) = (a as usize, b as usize);
        let dx = x[b] - x[a];
        let dy = y[b] - y[a];
        let dist = (dx * dx + dy * dy).sqrt();
        let reach = radius[a] + radius[b];
        let overlap = reach - dist;
        if overlap <= 0.0 {
            continue;
        }
        let (nx, ny) = if dist > 0.0 {
            (dx / dist, dy / dist)
        } else {
            (1.0, 0.0)
        };
        let shift = overlap * strength * 0.5;
        x[a] -= nx * shift;
        y[a] -= ny * shift;
        x[b] += nx * shift;
        y[b] += ny * shift;
    }
}

/// Exchange impulse between each overlapping pair, unit masses.
///
/// Pairs already separating are skipped. After the impulse, tangential
/// relative velocity is damped by `tangent_friction` and each entity's
/// speed is re-clamped to its own `[min_speed, max_velocity]` band.
#[allow(clippy::too_many_arguments)]
pub fn resolve_elastic(
    pairs: &PairBuffer,
    x: &[f32],
    y: &[f32],
    vx: &mut [f32],
    vy: &mut [f32],
    min_speed: &[f32],
    max_velocity: &[f32],
    restitution: f32,
    tangent_friction: f32,
) {
    for &(a, b) in pairs.pairs() {
        let (a, b) = (a as usize, b as usize);
        let dx = x[b] - x[a];
        let dy = y[b] - y[a];
        let dist = (dx * dx + dy * dy).sqrt();
        let (nx, ny) = if dist > 0.0 {
            (dx / dist, dy / dist)
        } else {
            (1.0, 0.0)
        };
        let rvx = vx[b] - vx[a];
        let rvy = vy[b] - vy[a];
        let along_normal = rvx * nx + rvy * ny;
        if along_normal > 0.0 {
            continue;
        }
        // Unit masses, so the impulse splits evenly.
        let impulse = -(1.0 + restitution) * along_normal * 0.5;
        vx[a] -= impulse * nx;
        vy[a] -= impulse * ny;
        vx[b] += impulse * nx;
        vy[b] += impulse * ny;

        if tangent_friction > 0.0 {
            let (tx, ty) = (-ny, nx);
            let along_tangent = (vx[b] - vx[a]) * tx + (vy[b] - vy[a]) * ty;
            let damp = along_tangent * tangent_friction * 0.5;
            vx[a] += damp * tx;
            vy[a] += damp * ty;
            vx[b] -= damp * tx;
            vy[b] -= damp * ty;
        }

        for &i in &[a, b] {
            clamp_speed(&mut vx[i], &mut vy[i], min_speed[i], max_velocity[i]);
        }
    }
}

fn clamp_speed(vx: &mut f32, vy: &mut f32, min_speed: f32, max_velocity: f32) {
    let speed = (*vx * *vx + *vy * *vy).sqrt();
    if speed > max_velocity && speed > 0.0 {
        let scale = max_velocity / speed;
        *vx *= scale;
        *vy *= scale;
    } else if speed < min_speed && speed > 0.0 {
        let scale = min_speed / speed;
        *vx *= scale;
        *vy *= scale;
    }
}
