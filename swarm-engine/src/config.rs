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
//! Simulation configuration
//!
//! All tunables live here, deserializable from TOML. Validation happens once
//! at initialization: an invalid configuration aborts startup rather than
//! producing a half-working simulation.

use crate::error::{Result, SimError};
use serde::Deserialize;
use std::path::Path;

/// How entities behave at the world boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsMode {
    /// Positions wrap around to the opposite edge (toroidal world).
    Wrap,
    /// Positions are clamped to the boundary.
    Clamp,
}

/// Frame pacing policy for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Sleep out the remainder of each nominal frame interval. Used by units
    /// with a rendering obligation.
    Frame,
    /// Run again as soon as possible, yielding briefly to the host scheduler.
    /// Used by units with no rendering obligation.
    Throughput,
}

/// World extent and boundary handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World width in world units.
    pub width: f32,
    /// World height in world units.
    pub height: f32,
    /// Boundary behavior.
    pub bounds: BoundsMode,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            width: 2048.0,
            height: 2048.0,
            bounds: BoundsMode::Wrap,
        }
    }
}

/// Uniform-grid spatial index tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Grid cell edge length in world units.
    pub cell_size: f32,
    /// Fixed capacity of each entity's neighbor list.
    pub max_neighbors: usize,
    /// Rebuild the grid and neighbor lists every N frames.
    ///
    /// 1 rebuilds every frame (required under fast relative motion to avoid
    /// tunneling). Larger intervals trade neighbor staleness for throughput;
    /// the acceptable staleness bound is a tunable, not a contract.
    pub rebuild_interval: u32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        SpatialConfig {
            cell_size: 50.0,
            max_neighbors: 32,
            rebuild_interval: 1,
        }
    }
}

/// Physics and collision tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Global force applied to every active entity each frame, x component.
    pub gravity_x: f32,
    /// Global force applied to every active entity each frame, y component.
    pub gravity_y: f32,
    /// Enable positional separation of overlapping pairs.
    pub separation: bool,
    /// Fraction of the overlap resolved per frame when separation is enabled.
    pub separation_strength: f32,
    /// Enable elastic impulse resolution of overlapping pairs.
    pub elastic: bool,
    /// Restitution coefficient for elastic resolution (0 = inelastic,
    /// 1 = perfectly elastic).
    pub restitution: f32,
    /// Tangential friction applied during elastic resolution.
    pub tangent_friction: f32,
    /// Capacity of the per-frame collision pair buffer. Overflow is logged
    /// and dropped, never fatal.
    pub max_pairs: usize,
    /// Upper bound on the frame-time ratio, guarding integration against a
    /// single stalled frame.
    pub max_dt_ratio: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        PhysicsConfig {
            gravity_x: 0.0,
            gravity_y: 0.0,
            separation: false,
            separation_strength: 0.5,
            elastic: false,
            restitution: 0.5,
            tangent_friction: 0.1,
            max_pairs: 4096,
            max_dt_ratio: 4.0,
        }
    }
}

/// Frame scheduler tunables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Nominal frame rate; a delta-time ratio of 1.0 corresponds to one
    /// nominal frame duration at this rate.
    pub nominal_fps: f32,
    /// Number of recent frame durations kept for FPS smoothing.
    pub fps_window: usize,
    /// Emit an `fps` telemetry message every N frames.
    pub fps_report_interval: u32,
    /// Pacing policy.
    pub pacing: Pacing,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        ScheduleConfig {
            nominal_fps: 60.0,
            fps_window: 30,
            fps_report_interval: 60,
            pacing: Pacing::Frame,
        }
    }
}

/// Top-level simulation configuration.
///
/// # Example
///
/// ```
/// use swarm_engine::config::SimConfig;
///
/// let config = SimConfig::from_toml_str(
///     r#"
///     [spatial]
///     cell_size = 25.0
///     max_neighbors = 16
///     "#,
/// )
/// .unwrap();
/// assert_eq!(config.spatial.max_neighbors, 16);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// World extent and boundary handling.
    pub world: WorldConfig,
    /// Spatial index tunables.
    pub spatial: SpatialConfig,
    /// Physics and collision tunables.
    pub physics: PhysicsConfig,
    /// Scheduler tunables.
    pub schedule: ScheduleConfig,
}

impl SimConfig {
    /// Parse a configuration from a TOML string and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Set the spatial cell size.
    pub fn with_cell_size(mut self, cell_size: f32) -> Self {
        self.spatial.cell_size = cell_size;
        self
    }

    /// Set the per-entity neighbor capacity.
    pub fn with_max_neighbors(mut self, max_neighbors: usize) -> Self {
        self.spatial.max_neighbors = max_neighbors;
        self
    }

    /// Set the world extent.
    pub fn with_world_size(mut self, width: f32, height: f32) -> Self {
        self.world.width = width;
        self.world.height = height;
        self
    }

    /// Validate every tunable; called by `from_toml_str` and at world init.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Config` naming the first offending field. A bad
    /// configuration is a build-time mistake, so initialization aborts.
    pub fn validate(&self) -> Result<()> {
        fn positive(value: f32, name: &str) -> Result<()> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(SimError::Config(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )))
            }
        }

        positive(self.world.width, "world.width")?;
        positive(self.world.height, "world.height")?;
        positive(self.spatial.cell_size, "spatial.cell_size")?;
        if self.spatial.max_neighbors == 0 {
            return Err(SimError::Config(
                "spatial.max_neighbors must be nonzero".to_string(),
            ));
        }
        if self.spatial.rebuild_interval == 0 {
            return Err(SimError::Config(
                "spatial.rebuild_interval must be at least 1".to_string(),
            ));
        }
        if !self.physics.gravity_x.is_finite() || !self.physics.gravity_y.is_finite() {
            return Err(SimError::Config("gravity must be finite".to_string()));
        }
        if !(0.0..=1.0).contains(&self.physics.separation_strength) {
            return Err(SimError::Config(format!(
                "physics.separation_strength must be in [0, 1], got {}",
                self.physics.separation_strength
            )));
        }
        if !(0.0..=1.0).contains(&self.physics.restitution) {
            return Err(SimError::Config(format!(
                "physics.restitution must be in [0, 1], got {}",
                self.physics.restitution
            )));
        }
        if !(0.0..=1.0).contains(&self.physics.tangent_friction) {
            return Err(SimError::Config(format!(
                "physics.tangent_friction must be in [0, 1], got {}",
                self.physics.tangent_friction
            )));
        }
        if self.physics.max_pairs == 0 {
            return Err(SimError::Config(
                "physics.max_pairs must be nonzero".to_string(),
            ));
        }
        positive(self.physics.max_dt_ratio, "physics.max_dt_ratio")?;
        positive(self.schedule.nominal_fps, "schedule.nominal_fps")?;
        if self.schedule.fps_window == 0 {
            return Err(SimError::Config(
                "schedule.fps_window must be nonzero".to_string(),
            ));
        }
        if self.schedule.fps_report_interval == 0 {
            return Err(SimError::Config(
                "schedule.fps_report_interval must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.spatial.rebuild_interval, 1);
        assert_eq!(config.schedule.nominal_fps, 60.0);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SimConfig::from_toml_str(
            r#"
            [world]
            width = 1024.0
            height = 768.0
            bounds = "clamp"

            [spatial]
            cell_size = 32.0
            rebuild_interval = 2

            [physics]
            separation = true
            separation_strength = 0.25

            [schedule]
            pacing = "throughput"
            "#,
        )
        .unwrap();

        assert_eq!(config.world.width, 1024.0);
        assert_eq!(config.world.bounds, BoundsMode::Clamp);
        assert_eq!(config.spatial.rebuild_interval, 2);
        assert!(config.physics.separation);
        assert_eq!(config.schedule.pacing, Pacing::Throughput);
        // Unspecified sections keep defaults.
        assert_eq!(config.physics.max_pairs, 4096);
    }

    #[test]
    fn test_invalid_cell_size_rejected() {
        let result = SimConfig::from_toml_str("[spatial]\ncell_size = 0.0");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cell_size"));
    }

    #[test]
    fn test_invalid_restitution_rejected() {
        let result = SimConfig::from_toml_str("[physics]\nrestitution = 1.5");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_rebuild_interval_rejected() {
        let result = SimConfig::from_toml_str("[spatial]\nrebuild_interval = 0");
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = SimConfig::default()
            .with_cell_size(10.0)
            .with_max_neighbors(8)
            .with_world_size(100.0, 100.0);
        assert_eq!(config.spatial.cell_size, 10.0);
        assert_eq!(config.spatial.max_neighbors, 8);
        assert_eq!(config.world.width, 100.0);
        assert!(config.validate().is_ok());
    }
}
