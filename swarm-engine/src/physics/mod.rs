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
//! Motion integration
//!
//! One integration step per active entity per frame, in a fixed order:
//! clamp requested acceleration, apply it to velocity, decay velocity by
//! friction, clamp speed, advance position, derive facing, zero the
//! acceleration. Acceleration is a per-frame request, not persistent state;
//! the logic phase must re-supply it every frame.
//!
//! All motion math is scaled by the normalized frame-time ratio rather than
//! wall-clock delta, so results are framerate-independent to first order.
//! The single-step function is pure; the slice driver just maps it over the
//! columns.

pub mod collision;

use crate::config::{BoundsMode, PhysicsConfig, WorldConfig};

/// One entity's motion fields, by value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    /// Position.
    pub x: f32,
    /// Position.
    pub y: f32,
    /// Velocity.
    pub vx: f32,
    /// Velocity.
    pub vy: f32,
    /// Requested acceleration (consumed by the step).
    pub ax: f32,
    /// Requested acceleration (consumed by the step).
    pub ay: f32,
    /// Facing angle, radians.
    pub rotation: f32,
    /// Speed after the last clamp.
    pub speed: f32,
}

/// One entity's motion limits.
#[derive(Debug, Clone, Copy)]
pub struct MotionLimits {
    /// Speed ceiling.
    pub max_velocity: f32,
    /// Acceleration magnitude ceiling.
    pub max_acceleration: f32,
    /// Speed floor.
    pub min_speed: f32,
    /// Fraction of velocity lost per nominal frame.
    pub friction: f32,
}

/// Advance one entity by one frame.
///
/// Pure function of its inputs: identical arguments always produce the
/// identical result. After the step the acceleration fields are zero and
/// `speed` holds the clamped speed.
pub fn integrate_step(state: MotionState, limits: MotionLimits, dt_ratio: f32) -> MotionState {
    let MotionState {
        mut x,
        mut y,
        mut vx,
        mut vy,
        mut ax,
        mut ay,
        mut rotation,
        ..
    } = state;

    // 1. Clamp the requested acceleration's magnitude.
    let acc_sq = ax * ax + ay * ay;
    let max_acc = limits.max_acceleration;
    if acc_sq > max_acc * max_acc && acc_sq > 0.0 {
        let scale = max_acc / acc_sq.sqrt();
        ax *= scale;
        ay *= scale;
    }

    // 2. Acceleration into velocity.
    vx += ax * dt_ratio;
    vy += ay * dt_ratio;

    // 3. Exponential-decay friction.
    if limits.friction > 0.0 {
        let decay = (1.0 - limits.friction).powf(dt_ratio);
        vx *= decay;
        vy *= decay;
    }

    // 4. Clamp speed, rescaling both components uniformly.
    let mut speed = (vx * vx + vy * vy).sqrt();
    if speed > limits.max_velocity && speed > 0.0 {
        let scale = limits.max_velocity / speed;
        vx *= scale;
        vy *= scale;
        speed = limits.max_velocity;
    } else if speed < limits.min_speed && speed > 0.0 {
        let scale = limits.min_speed / speed;
        vx *= scale;
        vy *= scale;
        speed = limits.min_speed;
    }

    // 5. Velocity into position.
    x += vx * dt_ratio;
    y += vy * dt_ratio;

    // 6. Facing follows velocity; a stationary entity keeps its heading.
    if vx != 0.0 || vy != 0.0 {
        rotation = vy.atan2(vx);
    }

    // 7. Acceleration is consumed.
    MotionState {
        x,
        y,
        vx,
        vy,
        ax: 0.0,
        ay: 0.0,
        rotation,
        speed,
    }
}

/// Apply the world boundary policy to a position.
pub fn apply_bounds(x: f32, y: f32, world: &WorldConfig) -> (f32, f32) {
    match world.bounds {
        BoundsMode::Wrap => (x.rem_euclid(world.width), y.rem_euclid(world.height)),
        BoundsMode::Clamp => (x.clamp(0.0, world.width), y.clamp(0.0, world.height)),
    }
}

/// Columns written by the physics phase.
///
/// The phase is the sole writer of position, velocity, rotation, and speed
/// for the frame, and it clears the acceleration the logic phase supplied.
pub struct MotionColumns<'a> {
    /// Position, x.
    pub x: &'a mut [f32],
    /// Position, y.
    pub y: &'a mut [f32],
    /// Velocity, x.
    pub vx: &'a mut [f32],
    /// Velocity, y.
    pub vy: &'a mut [f32],
    /// Acceleration, x (consumed).
    pub ax: &'a mut [f32],
    /// Acceleration, y (consumed).
    pub ay: &'a mut [f32],
    /// Facing angle.
    pub rotation: &'a mut [f32],
    /// Clamped speed.
    pub speed: &'a mut [f32],
}

/// Columns the physics phase only reads.
pub struct LimitColumns<'a> {
    /// Speed ceilings.
    pub max_velocity: &'a [f32],
    /// Acceleration ceilings.
    pub max_acceleration: &'a [f32],
    /// Speed floors.
    pub min_speed: &'a [f32],
    /// Friction coefficients.
    pub friction: &'a [f32],
    /// Liveness flags.
    pub active: &'a [u8],
}

/// Integrate every active entity in place.
///
/// Adds the configured global force to each entity's acceleration request
/// first, then maps [`integrate_step`] over the columns and applies the
/// world boundary policy to the resulting positions.
pub fn integrate_all(
    motion: MotionColumns<'_>,
    limits: LimitColumns<'_>,
    physics: &PhysicsConfig,
    world: &WorldConfig,
    dt_ratio: f32,
) {
    for i in 0..motion.x.len() {
        if limits.active[i] == 0 {
            continue;
        }
        let state = MotionState {
            x: motion.x[i],
            y: motion.y[i],
            vx: motion.vx[i],
            vy: motion.vy[i],
            ax: motion.ax[i] + physics.gravity_x,
            ay: motion.ay[i] + physics.gravity_y,
            rotation: motion.rotation[i],
            speed: motion.speed[i],
        };
        let entity_limits = MotionLimits {
            max_velocity: limits.max_velocity[i],
            max_acceleration: limits.max_acceleration[i],
            min_speed: limits.min_speed[i],
            friction: limits.friction[i],
        };
        let next = integrate_step(state, entity_limits, dt_ratio);
        let (x, y) = apply_bounds(next.x, next.y, world);
        motion.x[i] = x;
        motion.y[i] = y;
        motion.vx[i] = next.vx;
        motion.vy[i] = next.vy;
        motion.ax[i] = 0.0;
        motion.ay[i] = 0.0;
        motion.rotation[i] = next.rotation;
        motion.speed[i] = next.speed;
    }
}
