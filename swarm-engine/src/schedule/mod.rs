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
//! Frame scheduling and the control protocol
//!
//! The scheduler owns the world and drives its phases from one thread; the
//! host talks to it over a control channel and listens on a telemetry
//! channel. Units follow the state machine
//! `Uninitialized -> Initialized -> Running <-> Paused`, driven by the four
//! control signals plus lifecycle extensions (spawn, despawn-all,
//! clear-all, shutdown).
//!
//! `init` allocates all shared storage and reports one `Ready` per
//! execution unit; `start` refuses to run until every unit has reported,
//! which is the one true barrier in the system. `pause` takes effect before
//! the next frame. `resume` resets the frame clock so the pause interval
//! never reaches the integrator as a giant delta, then runs a frame
//! immediately.

mod clock;

pub use clock::FrameClock;

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::{error, info, warn};

use crate::behavior::KindId;
use crate::config::Pacing;
use crate::error::{Result, SimError};
use crate::input::SharedInput;
use crate::store::Field;
use crate::world::World;

/// Logical execution units, each reporting readiness and FPS separately.
pub const UNITS: [&str; 3] = ["spatial-index", "logic", "physics"];

/// Control signals accepted by the scheduler.
#[derive(Debug)]
pub enum Control {
    /// Allocate shared storage and report readiness.
    Init,
    /// Begin the frame loop. Ignored until every unit is ready.
    Start,
    /// Stop scheduling frames before the next one runs.
    Pause,
    /// Reset frame timing and run a frame immediately.
    Resume,
    /// Spawn one entity with field overrides.
    Spawn {
        /// Kind to spawn.
        kind: KindId,
        /// Field overrides applied after defaults.
        overrides: Vec<(Field, f32)>,
    },
    /// Despawn every live entity of one kind.
    DespawnAll(KindId),
    /// Despawn every live entity of every kind.
    ClearAll,
    /// Leave the loop, returning the world to the joiner.
    Shutdown,
}

/// Telemetry emitted by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    /// A unit finished initialization.
    Ready {
        /// Unit name.
        unit: &'static str,
    },
    /// Periodic smoothed frame rate.
    Fps {
        /// Unit name.
        unit: &'static str,
        /// Smoothed frames per second.
        value: f32,
    },
}

/// Lifecycle state shared by the units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// No storage allocated yet.
    Uninitialized,
    /// Storage allocated, frame loop not running.
    Initialized,
    /// Frame loop running.
    Running,
    /// Frame loop suspended; control messages still serviced.
    Paused,
}

/// Drives the world's frame pipeline and services the control protocol.
pub struct Scheduler {
    world: World,
    clock: FrameClock,
    input: SharedInput,
    state: UnitState,
    ready_units: usize,
    frames_since_report: u32,
    nominal: Duration,
    pacing: Pacing,
    fps_report_interval: u32,
}

impl Scheduler {
    /// Wrap a cold world (kinds registered, not yet initialized).
    pub fn new(world: World, input: SharedInput) -> Self {
        let schedule = world.config().schedule.clone();
        Scheduler {
            world,
            clock: FrameClock::new(schedule.nominal_fps, schedule.fps_window),
            input,
            state: UnitState::Uninitialized,
            ready_units: 0,
            frames_since_report: 0,
            nominal: Duration::from_secs_f32(1.0 / schedule.nominal_fps),
            pacing: schedule.pacing,
            fps_report_interval: schedule.fps_report_interval.max(1),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> UnitState {
        self.state
    }

    /// The wrapped world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the wrapped world, for driving frames manually
    /// without the thread loop.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Tick the clock and run one frame.
    pub fn step_once(&mut self) -> Result<f32> {
        let dt_ratio = self.clock.tick();
        self.world.step(dt_ratio, &self.input.read())?;
        Ok(dt_ratio)
    }

    /// Apply one control signal. Returns false on shutdown.
    pub fn handle(&mut self, control: Control, telemetry: &Sender<Telemetry>) -> Result<bool> {
        match control {
            Control::Init => {
                self.world.init()?;
                for unit in UNITS {
                    let _ = telemetry.send(Telemetry::Ready { unit });
                    self.ready_units += 1;
                }
                self.state = UnitState::Initialized;
                info!(units = self.ready_units, "all units ready");
            }
            Control::Start => {
                if self.state != UnitState::Initialized || self.ready_units < UNITS.len() {
                    warn!(state = ?self.state, "start ignored, units not ready");
                } else {
                    info!("frame loop started");
                    self.clock.reset();
                    self.state = UnitState::Running;
                }
            }
            Control::Pause => {
                if self.state == UnitState::Running {
                    info!("paused");
                    self.state = UnitState::Paused;
                }
            }
            Control::Resume => {
                if self.state == UnitState::Paused {
                    info!("resumed");
                    self.clock.reset();
                    self.state = UnitState::Running;
                }
            }
            Control::Spawn { kind, overrides } => match self.world.spawn(kind, &overrides) {
                Ok(_) => {}
                Err(SimError::PoolExhausted(name)) => {
                    warn!(kind = %name, "spawn dropped, pool exhausted");
                }
                Err(e) => return Err(e),
            },
            Control::DespawnAll(kind) => self.world.despawn_all(kind)?,
            Control::ClearAll => self.world.clear_all()?,
            Control::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    /// Service controls and run frames until shutdown or disconnect.
    ///
    /// While paused or not yet started, this blocks on the control channel
    /// and burns no CPU. While running, pending controls are drained before
    /// each frame, so `pause` always lands before the next frame.
    pub fn run(mut self, controls: Receiver<Control>, telemetry: Sender<Telemetry>) -> World {
        loop {
            if self.state != UnitState::Running {
                match controls.recv() {
                    Ok(control) => match self.handle(control, &telemetry) {
                        Ok(true) => continue,
                        Ok(false) => return self.world,
                        Err(e) => {
                            error!(error = %e, "control failed");
                            return self.world;
                        }
                    },
                    Err(_) => return self.world,
                }
            }

            loop {
                match controls.try_recv() {
                    Ok(control) => match self.handle(control, &telemetry) {
                        Ok(true) => {}
                        Ok(false) => return self.world,
                        Err(e) => {
                            error!(error = %e, "control failed");
                            return self.world;
                        }
                    },
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return self.world,
                }
            }
            if self.state != UnitState::Running {
                continue;
            }

            let frame_start = Instant::now();
            if let Err(e) = self.step_once() {
                error!(error = %e, "frame failed");
                return self.world;
            }

            self.frames_since_report += 1;
            if self.frames_since_report >= self.fps_report_interval {
                self.frames_since_report = 0;
                let value = self.clock.fps();
                for unit in UNITS {
                    let _ = telemetry.send(Telemetry::Fps { unit, value });
                }
            }

            match self.pacing {
                Pacing::Frame => {
                    let elapsed = frame_start.elapsed();
                    if elapsed < self.nominal {
                        std::thread::sleep(self.nominal - elapsed);
                    }
                }
                Pacing::Throughput => std::thread::yield_now(),
            }
        }
    }

    /// Run on a dedicated thread and hand back the control surface.
    pub fn spawn(world: World, input: SharedInput) -> Result<SchedulerHandle> {
        let (control_tx, control_rx) = unbounded();
        let (telemetry_tx, telemetry_rx) = unbounded();
        let scheduler = Scheduler::new(world, input);
        let thread = std::thread::Builder::new()
            .name("swarm-scheduler".to_string())
            .spawn(move || scheduler.run(control_rx, telemetry_tx))?;
        Ok(SchedulerHandle {
            control: control_tx,
            telemetry: telemetry_rx,
            thread: Some(thread),
        })
    }
}

/// Control surface for a scheduler running on its own thread.
pub struct SchedulerHandle {
    control: Sender<Control>,
    telemetry: Receiver<Telemetry>,
    thread: Option<std::thread::JoinHandle<World>>,
}

impl SchedulerHandle {
    /// Send one control signal.
    pub fn send(&self, control: Control) -> Result<()> {
        self.control.send(control).map_err(|_| SimError::Disconnected)
    }

    /// Telemetry stream.
    pub fn telemetry(&self) -> &Receiver<Telemetry> {
        &self.telemetry
    }

    /// Send `Init` and block until every unit has reported ready.
    pub fn init_and_wait(&self) -> Result<()> {
        self.send(Control::Init)?;
        let mut ready = 0;
        while ready < UNITS.len() {
            match self.telemetry.recv() {
                Ok(Telemetry::Ready { .. }) => ready += 1,
                Ok(_) => {}
                Err(_) => return Err(SimError::Disconnected),
            }
        }
        Ok(())
    }

    /// Shut the scheduler down and recover the world.
    pub fn join(mut self) -> Option<World> {
        let _ = self.control.send(Control::Shutdown);
        self.thread.take().and_then(|t| t.join().ok())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.control.send(Control::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Behavior, KindSpec, MotionDefaults};
    use crate::config::SimConfig;

    struct Inert;
    impl Behavior for Inert {}

    fn cold_world() -> (World, KindId) {
        let mut world = World::new(SimConfig::default());
        let kind = world
            .register(KindSpec {
                name: "boid".to_string(),
                count: 16,
                defaults: MotionDefaults::default(),
                extended_fields: Vec::new(),
                behavior: Box::new(Inert),
            })
            .unwrap();
        (world, kind)
    }

    #[test]
    fn test_start_before_init_is_ignored() {
        let (world, _) = cold_world();
        let mut scheduler = Scheduler::new(world, SharedInput::new());
        let (telemetry_tx, _telemetry_rx) = unbounded();
        assert!(scheduler.handle(Control::Start, &telemetry_tx).unwrap());
        assert_eq!(scheduler.state(), UnitState::Uninitialized);
    }

    #[test]
    fn test_init_reports_ready_per_unit() {
        let (world, _) = cold_world();
        let mut scheduler = Scheduler::new(world, SharedInput::new());
        let (telemetry_tx, telemetry_rx) = unbounded();
        scheduler.handle(Control::Init, &telemetry_tx).unwrap();
        assert_eq!(scheduler.state(), UnitState::Initialized);
        let mut units: Vec<&str> = Vec::new();
        while let Ok(Telemetry::Ready { unit }) = telemetry_rx.try_recv() {
            units.push(unit);
        }
        assert_eq!(units, UNITS);
    }

    #[test]
    fn test_state_machine_transitions() {
        let (world, _) = cold_world();
        let mut scheduler = Scheduler::new(world, SharedInput::new());
        let (telemetry_tx, _telemetry_rx) = unbounded();
        scheduler.handle(Control::Init, &telemetry_tx).unwrap();
        scheduler.handle(Control::Start, &telemetry_tx).unwrap();
        assert_eq!(scheduler.state(), UnitState::Running);
        scheduler.handle(Control::Pause, &telemetry_tx).unwrap();
        assert_eq!(scheduler.state(), UnitState::Paused);
        scheduler.handle(Control::Resume, &telemetry_tx).unwrap();
        assert_eq!(scheduler.state(), UnitState::Running);
        assert!(!scheduler.handle(Control::Shutdown, &telemetry_tx).unwrap());
    }

    #[test]
    fn test_spawn_control_applies_overrides() {
        let (world, kind) = cold_world();
        let mut scheduler = Scheduler::new(world, SharedInput::new());
        let (telemetry_tx, _telemetry_rx) = unbounded();
        scheduler.handle(Control::Init, &telemetry_tx).unwrap();
        scheduler
            .handle(
                Control::Spawn {
                    kind,
                    overrides: vec![(Field::X, 120.0), (Field::Y, 48.0)],
                },
                &telemetry_tx,
            )
            .unwrap();
        let store = scheduler.world().store().unwrap();
        assert_eq!(store.xs()[0], 120.0);
        assert_eq!(store.ys()[0], 48.0);
        assert_eq!(store.actives()[0], 1);
    }

    #[test]
    fn test_threaded_lifecycle_round_trip() {
        let (world, kind) = cold_world();
        let handle = Scheduler::spawn(world, SharedInput::new()).unwrap();
        handle.init_and_wait().unwrap();
        handle
            .send(Control::Spawn {
                kind,
                overrides: vec![(Field::X, 10.0), (Field::Y, 10.0), (Field::Vx, 1.0)],
            })
            .unwrap();
        handle.send(Control::Start).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        handle.send(Control::Pause).unwrap();
        let world = handle.join().expect("world returned on shutdown");
        let stats = world.pool_stats(kind).unwrap();
        assert_eq!(stats.active, 1);
        // The entity moved while the loop ran.
        assert!(world.store().unwrap().xs()[0] > 10.0);
    }
}
