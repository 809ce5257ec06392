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
//! Classic boids: cohesion, alignment, and separation over the neighbor
//! lists, driven by the threaded scheduler for a couple of seconds.

use rand::Rng;
use swarm_engine::behavior::{Accel, Behavior, Commands, KindSpec, MotionDefaults, TickContext};
use swarm_engine::config::{Pacing, SimConfig};
use swarm_engine::input::SharedInput;
use swarm_engine::schedule::{Control, Scheduler, Telemetry};
use swarm_engine::store::Field;
use swarm_engine::world::World;

struct Boid {
    cohesion: f32,
    alignment: f32,
    separation: f32,
    separation_range_sq: f32,
}

impl Behavior for Boid {
    fn tick(
        &mut self,
        ctx: &TickContext<'_>,
        _ext: Option<&mut swarm_engine::store::ExtendedStore>,
        _commands: &mut Commands,
    ) -> Accel {
        let i = ctx.index;
        let mut accel = Accel::ZERO;
        if ctx.neighbors.is_empty() {
            return accel;
        }

        let (mut cx, mut cy) = (0.0f32, 0.0f32);
        let (mut avx, mut avy) = (0.0f32, 0.0f32);
        let (mut sx, mut sy) = (0.0f32, 0.0f32);
        for (slot, &n) in ctx.neighbors.iter().enumerate() {
            let n = n as usize;
            cx += ctx.x[n];
            cy += ctx.y[n];
            avx += ctx.vx[n];
            avy += ctx.vy[n];
            if ctx.neighbor_dist_sq[slot] < self.separation_range_sq {
                sx += ctx.x[i] - ctx.x[n];
                sy += ctx.y[i] - ctx.y[n];
            }
        }
        let count = ctx.neighbors.len() as f32;
        accel.add(
            (cx / count - ctx.x[i]) * self.cohesion,
            (cy / count - ctx.y[i]) * self.cohesion,
        );
        accel.add(
            (avx / count - ctx.vx[i]) * self.alignment,
            (avy / count - ctx.vy[i]) * self.alignment,
        );
        accel.add(sx * self.separation, sy * self.separation);
        accel
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
    config.schedule.pacing = Pacing::Throughput;
    config.schedule.fps_report_interval = 120;

    let mut world = World::new(config);
    let boid = world.register(KindSpec {
        name: "boid".to_string(),
        count: 5_000,
        defaults: MotionDefaults {
            max_velocity: 4.0,
            max_acceleration: 0.4,
            min_speed: 1.0,
            friction: 0.0,
            radius: 3.0,
            visual_range: 50.0,
        },
        extended_fields: Vec::new(),
        behavior: Box::new(Boid {
            cohesion: 0.003,
            alignment: 0.05,
            separation: 0.04,
            separation_range_sq: 12.0 * 12.0,
        }),
    })?;

    let handle = Scheduler::spawn(world, SharedInput::new())?;
    handle.init_and_wait()?;

    let mut rng = rand::thread_rng();
    for _ in 0..5_000 {
        handle.send(Control::Spawn {
            kind: boid,
            overrides: vec![
                (Field::X, rng.gen_range(0.0..2048.0)),
                (Field::Y, rng.gen_range(0.0..2048.0)),
                (Field::Vx, rng.gen_range(-2.0..2.0)),
                (Field::Vy, rng.gen_range(-2.0..2.0)),
            ],
        })?;
    }

    handle.send(Control::Start)?;
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(3);
    while std::time::Instant::now() < deadline {
        if let Ok(Telemetry::Fps { unit, value }) = handle
            .telemetry()
            .recv_timeout(std::time::Duration::from_millis(200))
        {
            println!("{unit}: {value:.1} fps");
        }
    }

    let world = handle.join().expect("scheduler returns the world");
    let stats = world.pool_stats(boid)?;
    println!("boids simulated: {} (peak {})", stats.active, stats.peak_active);
    Ok(())
}
