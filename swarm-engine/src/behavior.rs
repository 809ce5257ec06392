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
//! Entity kinds and the per-kind behavior contract
//!
//! Behaviors are the extension seam for everything domain-specific: flocking
//! rules, hunting, fleeing. A kind registers once at startup with its
//! instance count, motion defaults, optional extended fields, and a boxed
//! [`Behavior`]. The engine calls back into the behavior at fixed points of
//! the frame; behaviors never reach into engine internals.
//!
//! Behaviors publish the API version they were compiled against, and the
//! registry rejects incompatible versions at registration time using
//! semantic versioning rules. This turns an ABI drift problem into a clear
//! startup error.

use semver::Version;
use tracing::info;

use crate::config::WorldConfig;
use crate::error::{Result, SimError};
use crate::input::InputSnapshot;
use crate::store::{EntityStore, ExtendedStore, FieldDesc};

/// Version of the behavior API this engine build exposes.
pub const BEHAVIOR_API_VERSION: &str = "0.2.0";

/// Opaque handle for a registered kind.
///
/// Handed out at registration and used everywhere afterwards; kinds are
/// never looked up by name on a hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KindId(u32);

impl KindId {
    /// Construct from a registration-order index.
    pub const fn from_index(index: u32) -> Self {
        KindId(index)
    }

    /// Registration-order index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Acceleration request produced by one entity's tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Accel {
    /// Requested acceleration, x.
    pub x: f32,
    /// Requested acceleration, y.
    pub y: f32,
}

impl Accel {
    /// Zero request.
    pub const ZERO: Accel = Accel { x: 0.0, y: 0.0 };

    /// Accumulate another request.
    pub fn add(&mut self, x: f32, y: f32) {
        self.x += x;
        self.y += y;
    }
}

/// Read-only view handed to a behavior for one entity's tick.
///
/// All columns are the whole store; `index` selects the entity being
/// ticked. Neighbor ids and squared distances are bounded views into the
/// frame's gather results, aligned positionally.
pub struct TickContext<'a> {
    /// Global slot of the entity being ticked.
    pub index: usize,
    /// Kind-local slot of the entity, for addressing extended columns.
    pub local: usize,
    /// Normalized frame-time ratio, 1.0 at the nominal frame rate.
    pub dt_ratio: f32,
    /// Position columns.
    pub x: &'a [f32],
    /// Position columns.
    pub y: &'a [f32],
    /// Velocity columns.
    pub vx: &'a [f32],
    /// Velocity columns.
    pub vy: &'a [f32],
    /// Facing angles.
    pub rotation: &'a [f32],
    /// Clamped speeds from the last physics step.
    pub speed: &'a [f32],
    /// Collision radii.
    pub radius: &'a [f32],
    /// Perception radii.
    pub visual_range: &'a [f32],
    /// Kind id per slot.
    pub type_tag: &'a [u32],
    /// Liveness flags.
    pub active: &'a [u8],
    /// Neighbor ids for this entity, as of the last index rebuild.
    pub neighbors: &'a [u32],
    /// Squared distances matching `neighbors` positionally.
    pub neighbor_dist_sq: &'a [f32],
    /// Host-written cursor, key, and camera state.
    pub input: &'a InputSnapshot,
    /// World dimensions and bounds policy.
    pub world: &'a WorldConfig,
}

/// Deferred structural mutations queued by behavior callbacks.
///
/// Spawning and despawning restructure the pool, which must not happen
/// while a phase is iterating the store. Callbacks queue requests here and
/// the engine applies them between frames.
#[derive(Default)]
pub struct Commands {
    spawns: Vec<(KindId, Vec<(crate::store::Field, f32)>)>,
    despawns: Vec<usize>,
}

impl Commands {
    /// Queue a spawn with field overrides, applied after the current frame.
    pub fn spawn(&mut self, kind: KindId, overrides: Vec<(crate::store::Field, f32)>) {
        self.spawns.push((kind, overrides));
    }

    /// Queue a despawn, applied after the current frame.
    pub fn despawn(&mut self, index: usize) {
        self.despawns.push(index);
    }

    /// Whether anything is queued.
    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.despawns.is_empty()
    }

    pub(crate) fn drain(
        &mut self,
    ) -> (
        Vec<(KindId, Vec<(crate::store::Field, f32)>)>,
        Vec<usize>,
    ) {
        (
            std::mem::take(&mut self.spawns),
            std::mem::take(&mut self.despawns),
        )
    }
}

/// Per-kind behavior callbacks.
///
/// One implementation serves every instance of its kind; per-entity state
/// belongs in the kind's extended columns, not in the behavior value. The
/// default `tick` folds [`Behavior::process_neighbor`] over the neighbor
/// list, which is the shape most steering behaviors want; override `tick`
/// entirely for anything else.
pub trait Behavior: Send {
    /// Behavior API version this implementation was written against.
    fn api_version(&self) -> &str {
        BEHAVIOR_API_VERSION
    }

    /// Produce this entity's acceleration request for the frame.
    ///
    /// `ext` is the kind's extended columns when it declared any, addressed
    /// by `ctx.local`.
    fn tick(
        &mut self,
        ctx: &TickContext<'_>,
        ext: Option<&mut ExtendedStore>,
        commands: &mut Commands,
    ) -> Accel {
        let _ = (ext, commands);
        let mut accel = Accel::ZERO;
        for (pos, &neighbor) in ctx.neighbors.iter().enumerate() {
            self.process_neighbor(ctx, neighbor as usize, ctx.neighbor_dist_sq[pos], &mut accel);
        }
        accel
    }

    /// Fold one neighbor into the acceleration request.
    fn process_neighbor(
        &mut self,
        ctx: &TickContext<'_>,
        neighbor: usize,
        dist_sq: f32,
        accel: &mut Accel,
    ) {
        let _ = (ctx, neighbor, dist_sq, accel);
    }

    /// Configure a freshly acquired slot before it becomes active.
    ///
    /// `local` addresses the kind's extended columns for this slot.
    fn on_spawn(
        &mut self,
        index: usize,
        local: usize,
        store: &mut EntityStore,
        ext: Option<&mut ExtendedStore>,
    ) {
        let _ = (index, local, store, ext);
    }

    /// Tear down a slot before it returns to the free list.
    fn on_despawn(
        &mut self,
        index: usize,
        local: usize,
        store: &mut EntityStore,
        ext: Option<&mut ExtendedStore>,
    ) {
        let _ = (index, local, store, ext);
    }

    /// First frame two entities overlap.
    fn on_collision_enter(&mut self, index: usize, other: usize, commands: &mut Commands) {
        let _ = (index, other, commands);
    }

    /// Every subsequent overlapping frame.
    fn on_collision_stay(&mut self, index: usize, other: usize, commands: &mut Commands) {
        let _ = (index, other, commands);
    }

    /// First frame after overlap ends.
    fn on_collision_exit(&mut self, index: usize, other: usize, commands: &mut Commands) {
        let _ = (index, other, commands);
    }
}

/// Motion field values a spawn resets to before overrides apply.
#[derive(Debug, Clone, Copy)]
pub struct MotionDefaults {
    /// Speed ceiling.
    pub max_velocity: f32,
    /// Acceleration ceiling.
    pub max_acceleration: f32,
    /// Speed floor.
    pub min_speed: f32,
    /// Velocity decay coefficient per nominal frame.
    pub friction: f32,
    /// Collision radius.
    pub radius: f32,
    /// Perception radius.
    pub visual_range: f32,
}

impl Default for MotionDefaults {
    fn default() -> Self {
        MotionDefaults {
            max_velocity: 4.0,
            max_acceleration: 0.5,
            min_speed: 0.0,
            friction: 0.0,
            radius: 4.0,
            visual_range: 50.0,
        }
    }
}

/// Everything a kind declares at registration.
pub struct KindSpec {
    /// Display name, unique across kinds.
    pub name: String,
    /// Maximum live population; slots are preallocated for exactly this.
    pub count: usize,
    /// Motion field defaults applied on every spawn.
    pub defaults: MotionDefaults,
    /// Extra columns beyond the core schema, or empty for none.
    pub extended_fields: Vec<FieldDesc>,
    /// The kind's callbacks.
    pub behavior: Box<dyn Behavior>,
}

pub(crate) struct KindEntry {
    pub name: String,
    pub count: usize,
    pub defaults: MotionDefaults,
    pub extended_fields: Vec<FieldDesc>,
    pub behavior: Box<dyn Behavior>,
}

/// Registration table mapping kind handles to their metadata and behavior.
///
/// Registration happens strictly before initialization; afterwards the
/// table is read-only and addressed by [`KindId`] only.
#[derive(Default)]
pub struct KindRegistry {
    kinds: Vec<KindEntry>,
    closed: bool,
}

impl KindRegistry {
    /// Empty registry, open for registration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind and hand back its id.
    ///
    /// Fails on a duplicate name, a zero instance count, an incompatible
    /// behavior API version, or registration after initialization. All of
    /// these indicate misconfiguration and are fatal at startup.
    pub fn register(&mut self, spec: KindSpec) -> Result<KindId> {
        if self.closed {
            return Err(SimError::RegistrationClosed);
        }
        if spec.count == 0 {
            return Err(SimError::ZeroInstanceCount(spec.name));
        }
        if self.kinds.iter().any(|k| k.name == spec.name) {
            return Err(SimError::DuplicateKind(spec.name));
        }
        let found = spec.behavior.api_version().to_string();
        if !is_version_compatible(&found, BEHAVIOR_API_VERSION) {
            return Err(SimError::IncompatibleBehavior {
                name: spec.name,
                found,
                expected: BEHAVIOR_API_VERSION.to_string(),
            });
        }
        let id = KindId(self.kinds.len() as u32);
        info!(kind = %spec.name, count = spec.count, id = id.0, "registered entity kind");
        self.kinds.push(KindEntry {
            name: spec.name,
            count: spec.count,
            defaults: spec.defaults,
            extended_fields: spec.extended_fields,
            behavior: spec.behavior,
        });
        Ok(id)
    }

    /// Close the registry; further registration fails.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Id for a registered name. Setup-time convenience only.
    pub fn id_of(&self, name: &str) -> Option<KindId> {
        self.kinds
            .iter()
            .position(|k| k.name == name)
            .map(|i| KindId(i as u32))
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether no kinds are registered.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Name of a registered kind.
    pub fn name(&self, kind: KindId) -> &str {
        &self.kinds[kind.index()].name
    }

    /// Instance counts in registration order.
    pub fn counts(&self) -> Vec<usize> {
        self.kinds.iter().map(|k| k.count).collect()
    }

    pub(crate) fn entries(&self) -> &[KindEntry] {
        &self.kinds
    }

    pub(crate) fn entry_mut(&mut self, kind: KindId) -> &mut KindEntry {
        &mut self.kinds[kind.index()]
    }
}

/// Semantic-versioning compatibility between a behavior's API version and
/// the engine's.
///
/// Majors must match; a zero major additionally requires matching minors,
/// per semver's pre-1.0 convention.
pub fn is_version_compatible(found: &str, expected: &str) -> bool {
    let (found, expected) = match (Version::parse(found), Version::parse(expected)) {
        (Ok(f), Ok(e)) => (f, e),
        _ => return false,
    };
    if found.major != expected.major {
        return false;
    }
    if expected.major == 0 {
        return found.minor == expected.minor;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inert;
    impl Behavior for Inert {}

    struct Outdated;
    impl Behavior for Outdated {
        fn api_version(&self) -> &str {
            "0.1.0"
        }
    }

    fn spec(name: &str, count: usize) -> KindSpec {
        KindSpec {
            name: name.to_string(),
            count,
            defaults: MotionDefaults::default(),
            extended_fields: Vec::new(),
            behavior: Box::new(Inert),
        }
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = KindRegistry::new();
        let a = registry.register(spec("boid", 100)).unwrap();
        let b = registry.register(spec("hawk", 10)).unwrap();
        assert_eq!(a, KindId::from_index(0));
        assert_eq!(b, KindId::from_index(1));
        assert_eq!(registry.id_of("hawk"), Some(b));
        assert_eq!(registry.name(a), "boid");
        assert_eq!(registry.counts(), vec![100, 10]);
    }

    #[test]
    fn test_register_rejects_duplicates_and_zero_counts() {
        let mut registry = KindRegistry::new();
        registry.register(spec("boid", 100)).unwrap();
        assert!(matches!(
            registry.register(spec("boid", 5)),
            Err(SimError::DuplicateKind(_))
        ));
        assert!(matches!(
            registry.register(spec("hawk", 0)),
            Err(SimError::ZeroInstanceCount(_))
        ));
    }

    #[test]
    fn test_register_rejects_after_close() {
        let mut registry = KindRegistry::new();
        registry.close();
        assert!(matches!(
            registry.register(spec("boid", 1)),
            Err(SimError::RegistrationClosed)
        ));
    }

    #[test]
    fn test_register_rejects_incompatible_behavior_version() {
        let mut registry = KindRegistry::new();
        let result = registry.register(KindSpec {
            name: "boid".to_string(),
            count: 1,
            defaults: MotionDefaults::default(),
            extended_fields: Vec::new(),
            behavior: Box::new(Outdated),
        });
        assert!(matches!(
            result,
            Err(SimError::IncompatibleBehavior { found, .. }) if found == "0.1.0"
        ));
    }

    #[test]
    fn test_version_compatibility_rules() {
        assert!(is_version_compatible("0.2.0", "0.2.0"));
        assert!(is_version_compatible("0.2.9", "0.2.0"));
        assert!(!is_version_compatible("0.1.0", "0.2.0"));
        assert!(!is_version_compatible("1.2.0", "0.2.0"));
        assert!(is_version_compatible("1.3.0", "1.0.0"));
        assert!(!is_version_compatible("2.0.0", "1.0.0"));
        assert!(!is_version_compatible("garbage", "0.2.0"));
    }

    #[test]
    fn test_default_tick_folds_neighbors() {
        struct Count(usize);
        impl Behavior for Count {
            fn process_neighbor(
                &mut self,
                _ctx: &TickContext<'_>,
                _neighbor: usize,
                _dist_sq: f32,
                accel: &mut Accel,
            ) {
                self.0 += 1;
                accel.add(1.0, 0.0);
            }
        }

        let zeros = [0.0f32; 4];
        let tags = [0u32; 4];
        let flags = [1u8; 4];
        let input = InputSnapshot::default();
        let world = WorldConfig::default();
        let neighbors = [1u32, 2, 3];
        let dist_sq = [4.0f32, 9.0, 16.0];
        let ctx = TickContext {
            index: 0,
            local: 0,
            dt_ratio: 1.0,
            x: &zeros,
            y: &zeros,
            vx: &zeros,
            vy: &zeros,
            rotation: &zeros,
            speed: &zeros,
            radius: &zeros,
            visual_range: &zeros,
            type_tag: &tags,
            active: &flags,
            neighbors: &neighbors,
            neighbor_dist_sq: &dist_sq,
            input: &input,
            world: &world,
        };
        let mut commands = Commands::default();
        let mut behavior = Count(0);
        let accel = behavior.tick(&ctx, None, &mut commands);
        assert_eq!(behavior.0, 3);
        assert_eq!(accel, Accel { x: 3.0, y: 0.0 });
        assert!(commands.is_empty());
    }
}
