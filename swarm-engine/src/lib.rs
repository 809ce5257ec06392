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
//! # Swarm Engine
//!
//! A real-time simulation substrate for tens of thousands of
//! spatially-interacting agents (flocking, predator-prey), built around a
//! shared columnar entity store and a phase-ordered frame pipeline.
//!
//! ## Features
//!
//! - **Columnar storage**: one field array per attribute over a single
//!   shared block, with schema-generated accessors
//! - **Pooled lifecycle**: per-kind free lists give O(1) spawn and despawn
//!   with zero steady-state allocation
//! - **Spatial index**: uniform-grid neighbor queries into fixed-capacity
//!   per-entity buffers
//! - **Physics pipeline**: framerate-normalized integration plus broad- and
//!   narrow-phase collision detection with optional resolution
//! - **Phase discipline**: each frame phase receives mutable access only to
//!   the columns it owns, so the writer convention is compiler-checked
//! - **Parallelization**: optional Rayon integration for the neighbor
//!   gather
//!
//! ## Example
//!
//! ```rust
//! use swarm_engine::behavior::{Behavior, KindSpec, MotionDefaults};
//! use swarm_engine::config::SimConfig;
//! use swarm_engine::input::InputSnapshot;
//! use swarm_engine::store::Field;
//! use swarm_engine::world::World;
//!
//! struct Drifter;
//! impl Behavior for Drifter {}
//!
//! let mut world = World::new(SimConfig::default());
//! let boid = world.register(KindSpec {
//!     name: "boid".to_string(),
//!     count: 1024,
//!     defaults: MotionDefaults::default(),
//!     extended_fields: Vec::new(),
//!     behavior: Box::new(Drifter),
//! }).unwrap();
//! world.init().unwrap();
//!
//! world.spawn(boid, &[(Field::X, 100.0), (Field::Y, 100.0)]).unwrap();
//! world.step(1.0, &InputSnapshot::default()).unwrap();
//! ```

#![warn(missing_docs)]

/// Entity kinds and behavior callbacks
pub mod behavior;

/// Configuration loading and validation
pub mod config;

/// Error taxonomy
pub mod error;

/// Host-written input and camera snapshot
pub mod input;

/// Motion integration and collision
pub mod physics;

/// Free-list slot pooling
pub mod pool;

/// Frame scheduling and the control protocol
pub mod schedule;

/// Uniform-grid neighbor index
pub mod spatial;

/// Columnar entity storage
pub mod store;

/// The simulation world and frame pipeline
pub mod world;

pub use behavior::{Behavior, KindId, KindSpec, MotionDefaults};
pub use config::SimConfig;
pub use error::{Result, SimError};
pub use store::{EntityStore, Field};
pub use world::World;
