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
//! Predator-prey: hawks chase the nearest boid and eat it on contact,
//! burning energy tracked in an extended column. Driven by manual stepping
//! rather than the scheduler thread.

use rand::Rng;
use swarm_engine::behavior::{Accel, Behavior, Commands, KindSpec, MotionDefaults, TickContext};
use swarm_engine::config::SimConfig;
use swarm_engine::input::InputSnapshot;
use swarm_engine::store::{ExtendedStore, Field, FieldDesc, FieldKind};
use swarm_engine::world::World;

const PREY_TAG: u32 = 0;

struct Prey {
    flee_strength: f32,
}

impl Behavior for Prey {
    fn process_neighbor(
        &mut self,
        ctx: &TickContext<'_>,
        neighbor: usize,
        dist_sq: f32,
        accel: &mut Accel,
    ) {
        // Run from anything that is not prey.
        if ctx.type_tag[neighbor] != PREY_TAG {
            let scale = self.flee_strength / dist_sq.max(1.0);
            accel.add(
                (ctx.x[ctx.index] - ctx.x[neighbor]) * scale,
                (ctx.y[ctx.index] - ctx.y[neighbor]) * scale,
            );
        }
    }
}

struct Hawk {
    chase_strength: f32,
    metabolism: f32,
}

impl Behavior for Hawk {
    fn tick(
        &mut self,
        ctx: &TickContext<'_>,
        ext: Option<&mut ExtendedStore>,
        commands: &mut Commands,
    ) -> Accel {
        let mut accel = Accel::ZERO;

        if let Some(ext) = ext {
            let energy = ext.column_mut::<f32>("energy");
            energy[ctx.local] -= self.metabolism * ctx.dt_ratio;
            if energy[ctx.local] <= 0.0 {
                commands.despawn(ctx.index);
                return accel;
            }
        }

        // Chase the closest prey in range.
        let mut best: Option<(usize, f32)> = None;
        for (slot, &n) in ctx.neighbors.iter().enumerate() {
            let n = n as usize;
            if ctx.type_tag[n] != PREY_TAG {
                continue;
            }
            let d2 = ctx.neighbor_dist_sq[slot];
            if best.map_or(true, |(_, b)| d2 < b) {
                best = Some((n, d2));
            }
        }
        if let Some((target, _)) = best {
            accel.add(
                (ctx.x[target] - ctx.x[ctx.index]) * self.chase_strength,
                (ctx.y[target] - ctx.y[ctx.index]) * self.chase_strength,
            );
        }
        accel
    }

    fn on_spawn(
        &mut self,
        _index: usize,
        local: usize,
        _store: &mut swarm_engine::store::EntityStore,
        ext: Option<&mut ExtendedStore>,
    ) {
        if let Some(ext) = ext {
            ext.column_mut::<f32>("energy")[local] = 1.0;
        }
    }

    fn on_collision_enter(&mut self, _index: usize, other: usize, commands: &mut Commands) {
        // Eat on contact. Despawn is deferred, so a double meal on the same
        // frame is harmless.
        commands.despawn(other);
    }
}

fn main() -> swarm_engine::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut config = SimConfig::default();
    config.spatial.cell_size = 64.0;

    let mut world = World::new(config);
    let prey = world.register(KindSpec {
        name: "boid".to_string(),
        count: 2_000,
        defaults: MotionDefaults {
            max_velocity: 3.5,
            max_acceleration: 0.5,
            min_speed: 0.8,
            friction: 0.0,
            radius: 3.0,
            visual_range: 60.0,
        },
        extended_fields: Vec::new(),
        behavior: Box::new(Prey { flee_strength: 40.0 }),
    })?;
    let hawk = world.register(KindSpec {
        name: "hawk".to_string(),
        count: 20,
        defaults: MotionDefaults {
            max_velocity: 4.5,
            max_acceleration: 0.6,
            min_speed: 1.0,
            friction: 0.0,
            radius: 5.0,
            visual_range: 120.0,
        },
        extended_fields: vec![FieldDesc {
            name: "energy",
            kind: FieldKind::F32,
        }],
        behavior: Box::new(Hawk {
            chase_strength: 0.02,
            metabolism: 0.002,
        }),
    })?;
    world.init()?;

    let mut rng = rand::thread_rng();
    for _ in 0..2_000 {
        world.spawn(
            prey,
            &[
                (Field::X, rng.gen_range(0.0..2048.0)),
                (Field::Y, rng.gen_range(0.0..2048.0)),
                (Field::Vx, rng.gen_range(-2.0..2.0)),
                (Field::Vy, rng.gen_range(-2.0..2.0)),
            ],
        )?;
    }
    for _ in 0..20 {
        world.spawn(
            hawk,
            &[
                (Field::X, rng.gen_range(0.0..2048.0)),
                (Field::Y, rng.gen_range(0.0..2048.0)),
            ],
        )?;
    }

    let input = InputSnapshot::default();
    for frame in 0..600u32 {
        world.step(1.0, &input)?;
        if frame % 120 == 0 {
            let prey_stats = world.pool_stats(prey)?;
            let hawk_stats = world.pool_stats(hawk)?;
            println!(
                "frame {frame}: {} boids, {} hawks",
                prey_stats.active, hawk_stats.active
            );
        }
    }

    let prey_stats = world.pool_stats(prey)?;
    println!(
        "survivors: {} of {} boids (peak {})",
        prey_stats.active, prey_stats.total, prey_stats.peak_active
    );
    Ok(())
}
