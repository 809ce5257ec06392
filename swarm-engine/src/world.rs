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
//! Simulation world: store, pool, index, and the frame pipeline
//!
//! Construction happens in two phases. Kinds register while the world is
//! cold; `init` then sizes and allocates every buffer once, after which no
//! allocation grows and registration is closed. Misconfiguration fails at
//! `init`, not mid-simulation.
//!
//! `step` runs one frame as three ordered phases with disjoint write sets:
//! the spatial phase rewrites the neighbor buffers and screen-visibility
//! flags, the logic phase rewrites
//! accelerations and dispatches collision callbacks, the physics phase
//! rewrites positions, velocities, rotations, and speeds. The phase a field
//! belongs to is visible in the column splits each phase receives, so a
//! second writer is a compile error rather than a convention violation.
//!
//! Logic observes neighbor data gathered before this frame's integration
//! and collision pairs detected last frame. One phase of staleness is the
//! price of never blocking mid-frame, and it is deliberate.

use std::collections::HashSet;

use tracing::{debug, info, trace, warn};

use crate::behavior::{Commands, KindId, KindRegistry, KindSpec, TickContext};
use crate::config::SimConfig;
use crate::error::{Result, SimError};
use crate::input::InputSnapshot;
use crate::physics::collision::{detect, resolve_elastic, separate};
use crate::physics::{integrate_all, LimitColumns, MotionColumns};
use crate::pool::{EntityPool, PoolStats};
use crate::spatial::SpatialGrid;
use crate::store::{
    EntityStore, ExtendedStore, Field, FieldKind, IndexMap, NeighborBuffer, PairBuffer,
};

struct Runtime {
    store: EntityStore,
    pool: EntityPool,
    grid: SpatialGrid,
    neighbors: NeighborBuffer,
    pairs: PairBuffer,
    // Pair-key sets for the two most recent detections, rotated each frame.
    prev_keys: HashSet<u64>,
    curr_keys: HashSet<u64>,
    extended: Vec<Option<ExtendedStore>>,
    index_maps: Vec<IndexMap>,
    commands: Commands,
    frame: u64,
}

/// The simulation state and its frame pipeline.
///
/// # Examples
///
/// ```
/// use swarm_engine::behavior::{Behavior, KindSpec, MotionDefaults};
/// use swarm_engine::config::SimConfig;
/// use swarm_engine::input::InputSnapshot;
/// use swarm_engine::store::Field;
/// use swarm_engine::world::World;
///
/// struct Drifter;
/// impl Behavior for Drifter {}
///
/// let mut world = World::new(SimConfig::default());
/// let boid = world.register(KindSpec {
///     name: "boid".to_string(),
///     count: 64,
///     defaults: MotionDefaults::default(),
///     extended_fields: Vec::new(),
///     behavior: Box::new(Drifter),
/// })?;
/// world.init()?;
/// world.spawn(boid, &[(Field::X, 100.0), (Field::Y, 100.0)])?;
/// world.step(1.0, &InputSnapshot::default())?;
/// # Ok::<(), swarm_engine::error::SimError>(())
/// ```
pub struct World {
    config: SimConfig,
    registry: KindRegistry,
    runtime: Option<Runtime>,
}

impl World {
    /// A cold world, open for kind registration.
    pub fn new(config: SimConfig) -> Self {
        World {
            config,
            registry: KindRegistry::new(),
            runtime: None,
        }
    }

    /// Register a kind. Fails after [`World::init`].
    pub fn register(&mut self, spec: KindSpec) -> Result<KindId> {
        if self.runtime.is_some() {
            return Err(SimError::RegistrationClosed);
        }
        self.registry.register(spec)
    }

    /// Allocate every buffer and close registration.
    ///
    /// All capacity is fixed here: per-kind slot ranges, the shared column
    /// block, extended blocks, neighbor and pair buffers. Nothing grows
    /// afterwards.
    pub fn init(&mut self) -> Result<()> {
        if self.runtime.is_some() {
            return Err(SimError::Config("already initialized".to_string()));
        }
        if self.registry.is_empty() {
            return Err(SimError::Config("no kinds registered".to_string()));
        }
        self.config.validate()?;
        self.registry.close();

        let counts = self.registry.counts();
        let pool = EntityPool::new(&counts);
        let capacity = pool.capacity();
        let store = EntityStore::allocate(capacity);
        let grid = SpatialGrid::new(&self.config.world, &self.config.spatial);
        let neighbors = NeighborBuffer::new(capacity, self.config.spatial.max_neighbors);
        let pairs = PairBuffer::new(self.config.physics.max_pairs);

        let mut extended = Vec::with_capacity(counts.len());
        let mut index_maps = Vec::with_capacity(counts.len());
        for (i, entry) in self.registry.entries().iter().enumerate() {
            let range = pool.range(KindId::from_index(i as u32));
            index_maps.push(IndexMap::new(capacity, range.start, range.count));
            extended.push(if entry.extended_fields.is_empty() {
                None
            } else {
                Some(ExtendedStore::allocate(
                    entry.extended_fields.clone(),
                    entry.count,
                ))
            });
        }

        info!(
            capacity,
            kinds = counts.len(),
            bytes = EntityStore::buffer_size(capacity),
            "world initialized"
        );
        self.runtime = Some(Runtime {
            store,
            pool,
            grid,
            neighbors,
            pairs,
            prev_keys: HashSet::new(),
            curr_keys: HashSet::new(),
            extended,
            index_maps,
            commands: Commands::default(),
            frame: 0,
        });
        Ok(())
    }

    /// The active configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Registered kinds.
    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Total entity slots across all kinds.
    pub fn capacity(&self) -> Result<usize> {
        Ok(self.runtime()?.pool.capacity())
    }

    /// The shared column store. Read-only surface for renderers and other
    /// external collaborators.
    pub fn store(&self) -> Result<&EntityStore> {
        Ok(&self.runtime()?.store)
    }

    /// A kind's extended columns, if it declared any.
    pub fn extended(&self, kind: KindId) -> Result<Option<&ExtendedStore>> {
        Ok(self.runtime()?.extended[kind.index()].as_ref())
    }

    /// Global-to-local index translation for a kind.
    pub fn index_map(&self, kind: KindId) -> Result<&IndexMap> {
        Ok(&self.runtime()?.index_maps[kind.index()])
    }

    /// Neighbor ids recorded for an entity at the last rebuild.
    pub fn neighbors_of(&self, index: usize) -> Result<&[u32]> {
        Ok(self.runtime()?.neighbors.neighbors(index))
    }

    /// Collision pairs from the most recent physics phase, smaller index
    /// first.
    pub fn collision_pairs(&self) -> Result<&[(u32, u32)]> {
        Ok(self.runtime()?.pairs.pairs())
    }

    /// Occupancy counters for a kind.
    pub fn pool_stats(&self, kind: KindId) -> Result<PoolStats> {
        Ok(self.runtime()?.pool.stats(kind))
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.runtime.as_ref().ok_or(SimError::NotInitialized)
    }

    fn runtime_mut(&mut self) -> Result<&mut Runtime> {
        self.runtime.as_mut().ok_or(SimError::NotInitialized)
    }

    /// Bring one pooled slot to life.
    ///
    /// Ordering is load-bearing: the slot is acquired, reset to the kind's
    /// defaults, overridden, configured by `on_spawn`, and only then marked
    /// active, so a half-configured entity is never visible to a phase.
    ///
    /// Exhaustion is recoverable; the caller decides whether a missed spawn
    /// matters.
    pub fn spawn(&mut self, kind: KindId, overrides: &[(Field, f32)]) -> Result<usize> {
        let runtime = self.runtime.as_mut().ok_or(SimError::NotInitialized)?;
        if kind.index() >= self.registry.len() {
            return Err(SimError::UnknownKind(format!("#{}", kind.index())));
        }
        let index = {
            let name = self.registry.name(kind);
            runtime.pool.acquire(kind, name)?
        };
        // A recycled slot may still hold its dead predecessor's neighbor row;
        // rows are only rewritten at the next index rebuild.
        runtime.neighbors.reset_row(index);
        let store = &mut runtime.store;

        let defaults = self.registry.entries()[kind.index()].defaults;
        for field in [
            Field::X,
            Field::Y,
            Field::Vx,
            Field::Vy,
            Field::Ax,
            Field::Ay,
            Field::Rotation,
            Field::Speed,
        ] {
            store.set::<f32>(field, index, 0.0);
        }
        store.set::<f32>(Field::MaxVelocity, index, defaults.max_velocity);
        store.set::<f32>(Field::MaxAcceleration, index, defaults.max_acceleration);
        store.set::<f32>(Field::MinSpeed, index, defaults.min_speed);
        store.set::<f32>(Field::Friction, index, defaults.friction);
        store.set::<f32>(Field::Radius, index, defaults.radius);
        store.set::<f32>(Field::VisualRange, index, defaults.visual_range);
        store.set::<u32>(Field::TypeTag, index, kind.index() as u32);
        store.set::<u8>(Field::OnScreen, index, 0);

        for &(field, value) in overrides {
            if field.desc().kind == FieldKind::F32 {
                store.set::<f32>(field, index, value);
            } else {
                warn!(field = field.desc().name, "spawn override on a non-float field ignored");
            }
        }

        // Ranges are contiguous, so the kind-local slot is an offset.
        let local = index - runtime.pool.range(kind).start;
        let entry = self.registry.entry_mut(kind);
        entry
            .behavior
            .on_spawn(index, local, store, runtime.extended[kind.index()].as_mut());

        store.set::<u8>(Field::Active, index, 1);
        trace!(index, kind = kind.index(), "spawned");
        Ok(index)
    }

    /// Return a slot to its pool.
    ///
    /// Idempotent: despawning an already-inactive slot is a no-op, so a
    /// double despawn can never corrupt the free list.
    pub fn despawn(&mut self, index: usize) -> Result<()> {
        let runtime = self.runtime.as_mut().ok_or(SimError::NotInitialized)?;
        if runtime.store.actives()[index] == 0 {
            return Ok(());
        }
        let kind = KindId::from_index(runtime.store.type_tags()[index]);

        let local = index - runtime.pool.range(kind).start;
        let entry = self.registry.entry_mut(kind);
        entry.behavior.on_despawn(
            index,
            local,
            &mut runtime.store,
            runtime.extended[kind.index()].as_mut(),
        );

        runtime.store.set::<u8>(Field::Active, index, 0);
        runtime.pool.release(kind, index);
        trace!(index, kind = kind.index(), "despawned");
        Ok(())
    }

    /// Despawn every live entity of a kind, running per-entity teardown.
    ///
    /// Teardown hooks run slot by slot, then the free list is rebuilt in one
    /// pass so the lowest index pops first again afterwards.
    pub fn despawn_all(&mut self, kind: KindId) -> Result<()> {
        let runtime = self.runtime.as_mut().ok_or(SimError::NotInitialized)?;
        let range = runtime.pool.range(kind);
        let entry = self.registry.entry_mut(kind);
        let mut ext = runtime.extended[kind.index()].as_mut();
        let store = &mut runtime.store;
        let mut count = 0usize;
        for index in range.start..range.start + range.count {
            if store.actives()[index] == 0 {
                continue;
            }
            entry
                .behavior
                .on_despawn(index, index - range.start, store, ext.as_deref_mut());
            store.set::<u8>(Field::Active, index, 0);
            count += 1;
        }
        runtime.pool.release_all(kind);
        debug!(kind = kind.index(), count, "despawned all");
        Ok(())
    }

    /// Despawn every live entity of every kind.
    pub fn clear_all(&mut self) -> Result<()> {
        for i in 0..self.registry.len() {
            self.despawn_all(KindId::from_index(i as u32))?;
        }
        Ok(())
    }

    /// Run one frame: spatial, logic, physics, then deferred commands.
    ///
    /// `dt_ratio` is the normalized frame-time ratio; it is clamped to the
    /// configured maximum so one stalled frame cannot catapult entities.
    pub fn step(&mut self, dt_ratio: f32, input: &InputSnapshot) -> Result<()> {
        let dt_ratio = dt_ratio.min(self.config.physics.max_dt_ratio);
        self.spatial_phase(input)?;
        self.logic_phase(dt_ratio, input)?;
        self.physics_phase(dt_ratio)?;
        self.apply_commands()
    }

    fn spatial_phase(&mut self, input: &InputSnapshot) -> Result<()> {
        let interval = self.config.spatial.rebuild_interval.max(1) as u64;
        let world = self.config.world.clone();
        let runtime = self.runtime_mut()?;
        let Runtime {
            store,
            grid,
            neighbors,
            frame,
            ..
        } = runtime;
        if *frame % interval == 0 {
            grid.rebuild(store.xs(), store.ys(), store.actives());
            neighbors.begin();
            #[cfg(feature = "parallel")]
            grid.gather_parallel(
                store.xs(),
                store.ys(),
                store.visual_ranges(),
                store.actives(),
                neighbors,
            );
            #[cfg(not(feature = "parallel"))]
            grid.gather(
                store.xs(),
                store.ys(),
                store.visual_ranges(),
                store.actives(),
                neighbors,
            );
        }

        // Screen visibility, refreshed every frame from the camera state.
        // The view rectangle starts at the pan offset and spans the world
        // extent shrunk by the zoom factor.
        let zoom = if input.zoom > 0.0 { input.zoom } else { 1.0 };
        let view_w = world.width / zoom;
        let view_h = world.height / zoom;
        let cols = store.columns_mut();
        let on_screen = cols.on_screen;
        let x: &[f32] = cols.x;
        let y: &[f32] = cols.y;
        let radius: &[f32] = cols.radius;
        let active: &[u8] = cols.active;
        for i in 0..x.len() {
            if active[i] == 0 {
                on_screen[i] = 0;
                continue;
            }
            let r = radius[i];
            on_screen[i] = (x[i] + r >= input.pan_x
                && x[i] - r <= input.pan_x + view_w
                && y[i] + r >= input.pan_y
                && y[i] - r <= input.pan_y + view_h) as u8;
        }
        Ok(())
    }

    fn logic_phase(&mut self, dt_ratio: f32, input: &InputSnapshot) -> Result<()> {
        self.dispatch_collision_events()?;

        let runtime = self.runtime.as_mut().ok_or(SimError::NotInitialized)?;
        let Runtime {
            store,
            pool,
            neighbors,
            extended,
            index_maps,
            commands,
            ..
        } = runtime;

        let cols = store.columns_mut();
        let ax = cols.ax;
        let ay = cols.ay;
        let x: &[f32] = cols.x;
        let y: &[f32] = cols.y;
        let vx: &[f32] = cols.vx;
        let vy: &[f32] = cols.vy;
        let rotation: &[f32] = cols.rotation;
        let speed: &[f32] = cols.speed;
        let radius: &[f32] = cols.radius;
        let visual_range: &[f32] = cols.visual_range;
        let type_tag: &[u32] = cols.type_tag;
        let active: &[u8] = cols.active;

        for kind_index in 0..self.registry.len() {
            let kind = KindId::from_index(kind_index as u32);
            let range = pool.range(kind);
            let map = &index_maps[kind_index];
            let mut ext = extended[kind_index].as_mut();
            let entry = self.registry.entry_mut(kind);
            for index in range.start..range.start + range.count {
                if active[index] == 0 {
                    continue;
                }
                let Some(local) = map.local(index) else {
                    continue;
                };
                let ctx = TickContext {
                    index,
                    local,
                    dt_ratio,
                    x,
                    y,
                    vx,
                    vy,
                    rotation,
                    speed,
                    radius,
                    visual_range,
                    type_tag,
                    active,
                    neighbors: neighbors.neighbors(index),
                    neighbor_dist_sq: neighbors.distances(index),
                    input,
                    world: &self.config.world,
                };
                let accel = entry.behavior.tick(&ctx, ext.as_deref_mut(), commands);
                ax[index] = accel.x;
                ay[index] = accel.y;
            }
        }
        Ok(())
    }

    /// Synthesize Enter/Stay/Exit from the two most recent pair-key sets.
    ///
    /// A pair present now but not last frame is Enter; present in both is
    /// Stay; present last frame only is Exit. Both endpoints' behaviors are
    /// notified, each from its own perspective.
    fn dispatch_collision_events(&mut self) -> Result<()> {
        let runtime = self.runtime.as_mut().ok_or(SimError::NotInitialized)?;
        let Runtime {
            store,
            prev_keys,
            curr_keys,
            commands,
            ..
        } = runtime;

        let registry = &mut self.registry;
        let mut dispatch = |key: u64, phase: u8| {
            let a = (key >> 32) as usize;
            let b = (key & 0xffff_ffff) as usize;
            for (me, other) in [(a, b), (b, a)] {
                if store.actives()[me] == 0 {
                    continue;
                }
                let kind = KindId::from_index(store.type_tags()[me]);
                let behavior = &mut registry.entry_mut(kind).behavior;
                match phase {
                    0 => behavior.on_collision_enter(me, other, commands),
                    1 => behavior.on_collision_stay(me, other, commands),
                    _ => behavior.on_collision_exit(me, other, commands),
                }
            }
        };

        for &key in curr_keys.iter() {
            if prev_keys.contains(&key) {
                dispatch(key, 1);
            } else {
                dispatch(key, 0);
            }
        }
        for &key in prev_keys.difference(curr_keys) {
            dispatch(key, 2);
        }
        Ok(())
    }

    fn physics_phase(&mut self, dt_ratio: f32) -> Result<()> {
        let physics = self.config.physics.clone();
        let world_config = self.config.world.clone();
        let runtime = self.runtime.as_mut().ok_or(SimError::NotInitialized)?;
        let Runtime {
            store,
            neighbors,
            pairs,
            prev_keys,
            curr_keys,
            frame,
            ..
        } = runtime;

        {
            let cols = store.columns_mut();
            integrate_all(
                MotionColumns {
                    x: cols.x,
                    y: cols.y,
                    vx: cols.vx,
                    vy: cols.vy,
                    ax: cols.ax,
                    ay: cols.ay,
                    rotation: cols.rotation,
                    speed: cols.speed,
                },
                LimitColumns {
                    max_velocity: cols.max_velocity,
                    max_acceleration: cols.max_acceleration,
                    min_speed: cols.min_speed,
                    friction: cols.friction,
                    active: cols.active,
                },
                &physics,
                &world_config,
                dt_ratio,
            );
        }

        pairs.clear();
        detect(
            neighbors,
            store.xs(),
            store.ys(),
            store.radii(),
            store.actives(),
            pairs,
        );
        if physics.separation {
            let cols = store.columns_mut();
            separate(pairs, cols.x, cols.y, cols.radius, physics.separation_strength);
        }
        if physics.elastic {
            let cols = store.columns_mut();
            resolve_elastic(
                pairs,
                cols.x,
                cols.y,
                cols.vx,
                cols.vy,
                cols.min_speed,
                cols.max_velocity,
                physics.restitution,
                physics.tangent_friction,
            );
        }

        std::mem::swap(prev_keys, curr_keys);
        curr_keys.clear();
        curr_keys.extend(pairs.pairs().iter().map(|&(a, b)| PairBuffer::key(a, b)));
        *frame += 1;
        Ok(())
    }

    fn apply_commands(&mut self) -> Result<()> {
        let runtime = self.runtime.as_mut().ok_or(SimError::NotInitialized)?;
        if runtime.commands.is_empty() {
            return Ok(());
        }
        let (spawns, despawns) = runtime.commands.drain();
        for index in despawns {
            self.despawn(index)?;
        }
        for (kind, overrides) in spawns {
            match self.spawn(kind, &overrides) {
                Ok(_) => {}
                Err(SimError::PoolExhausted(name)) => {
                    warn!(kind = %name, "deferred spawn dropped, pool exhausted");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
