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
//! Benchmarks for whole-frame throughput at agent scale

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use swarm_engine::behavior::{Accel, Behavior, Commands, KindSpec, MotionDefaults, TickContext};
use swarm_engine::config::SimConfig;
use swarm_engine::input::InputSnapshot;
use swarm_engine::store::{ExtendedStore, Field};
use swarm_engine::world::World;

struct Centering;

impl Behavior for Centering {
    fn tick(
        &mut self,
        ctx: &TickContext<'_>,
        _ext: Option<&mut ExtendedStore>,
        _commands: &mut Commands,
    ) -> Accel {
        let mut accel = Accel::ZERO;
        for &n in ctx.neighbors {
            let n = n as usize;
            accel.add(
                (ctx.x[n] - ctx.x[ctx.index]) * 0.001,
                (ctx.y[n] - ctx.y[ctx.index]) * 0.001,
            );
        }
        accel
    }
}

fn populated_world(count: usize) -> World {
    let mut world = World::new(SimConfig::default());
    let kind = world
        .register(KindSpec {
            name: "boid".to_string(),
            count,
            defaults: MotionDefaults {
                max_velocity: 4.0,
                max_acceleration: 0.5,
                min_speed: 1.0,
                friction: 0.0,
                radius: 3.0,
                visual_range: 50.0,
            },
            extended_fields: Vec::new(),
            behavior: Box::new(Centering),
        })
        .unwrap();
    world.init().unwrap();
    // Deterministic scatter, no RNG in the hot loop.
    for i in 0..count {
        let x = (i as f32 * 97.0) % 2048.0;
        let y = (i as f32 * 193.0) % 2048.0;
        world
            .spawn(
                kind,
                &[
                    (Field::X, x),
                    (Field::Y, y),
                    (Field::Vx, ((i % 7) as f32 - 3.0) * 0.5),
                    (Field::Vy, ((i % 5) as f32 - 2.0) * 0.5),
                ],
            )
            .unwrap();
    }
    world
}

fn bench_full_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_frame");
    group.sample_size(20);
    for n in [1_000, 10_000, 30_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut world = populated_world(n);
            let input = InputSnapshot::default();
            b.iter(|| {
                world.step(black_box(1.0), &input).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_rebuild_interval(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild_interval");
    group.sample_size(20);
    for interval in [1u32, 2, 4] {
        group.bench_with_input(
            BenchmarkId::from_parameter(interval),
            &interval,
            |b, &interval| {
                let mut config = SimConfig::default();
                config.spatial.rebuild_interval = interval;
                let mut world = World::new(config);
                let kind = world
                    .register(KindSpec {
                        name: "boid".to_string(),
                        count: 10_000,
                        defaults: MotionDefaults::default(),
                        extended_fields: Vec::new(),
                        behavior: Box::new(Centering),
                    })
                    .unwrap();
                world.init().unwrap();
                for i in 0..10_000 {
                    world
                        .spawn(
                            kind,
                            &[
                                (Field::X, (i as f32 * 97.0) % 2048.0),
                                (Field::Y, (i as f32 * 193.0) % 2048.0),
                            ],
                        )
                        .unwrap();
                }
                let input = InputSnapshot::default();
                b.iter(|| world.step(black_box(1.0), &input).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_full_frame, bench_rebuild_interval);
criterion_main!(benches);
