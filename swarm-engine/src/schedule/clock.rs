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
//! Frame timing: smoothed FPS and the normalized delta-time ratio

use std::time::{Duration, Instant};

/// Per-unit frame timer.
///
/// Produces a delta-time ratio normalized so 1.0 equals one nominal frame
/// duration; simulation math scales by this ratio, not wall-clock delta,
/// which makes results framerate-independent to first order. Smoothed FPS
/// comes from a fixed-length circular buffer of recent frame durations.
pub struct FrameClock {
    nominal: Duration,
    window: Vec<f32>,
    next_slot: usize,
    filled: usize,
    last: Option<Instant>,
}

impl FrameClock {
    /// Clock for a nominal frame rate with an FPS window of `window` frames.
    pub fn new(nominal_fps: f32, window: usize) -> Self {
        FrameClock {
            nominal: Duration::from_secs_f32(1.0 / nominal_fps),
            window: vec![0.0; window.max(1)],
            next_slot: 0,
            filled: 0,
            last: None,
        }
    }

    /// Mark a frame boundary and return the delta-time ratio since the
    /// previous one. The first frame after construction or a reset reports
    /// exactly 1.0.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// [`FrameClock::tick`] with an injected instant.
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let ratio = match self.last {
            None => 1.0,
            Some(last) => {
                let elapsed = now.saturating_duration_since(last).as_secs_f32();
                self.window[self.next_slot] = elapsed;
                self.next_slot = (self.next_slot + 1) % self.window.len();
                self.filled = (self.filled + 1).min(self.window.len());
                elapsed / self.nominal.as_secs_f32()
            }
        };
        self.last = Some(now);
        ratio
    }

    /// Smoothed frames per second over the window. Before any complete
    /// frame has been observed this reports the nominal rate.
    pub fn fps(&self) -> f32 {
        if self.filled == 0 {
            return 1.0 / self.nominal.as_secs_f32();
        }
        let sum: f32 = self.window[..self.filled].iter().sum();
        if sum <= 0.0 {
            return 1.0 / self.nominal.as_secs_f32();
        }
        self.filled as f32 / sum
    }

    /// Forget all timing state.
    ///
    /// Called on resume so the pause interval never appears as one enormous
    /// delta-time spike.
    pub fn reset(&mut self) {
        self.last = None;
        self.next_slot = 0;
        self.filled = 0;
        self.window.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_is_unity() {
        let mut clock = FrameClock::new(60.0, 8);
        assert_eq!(clock.tick_at(Instant::now()), 1.0);
    }

    #[test]
    fn test_ratio_tracks_elapsed_over_nominal() {
        let mut clock = FrameClock::new(60.0, 8);
        let start = Instant::now();
        clock.tick_at(start);
        // Two nominal frames elapse.
        let ratio = clock.tick_at(start + Duration::from_secs_f32(2.0 / 60.0));
        assert!((ratio - 2.0).abs() < 1e-3);
        // Half a nominal frame.
        let ratio = clock.tick_at(
            start + Duration::from_secs_f32(2.0 / 60.0) + Duration::from_secs_f32(0.5 / 60.0),
        );
        assert!((ratio - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_fps_smoothing_over_window() {
        let mut clock = FrameClock::new(60.0, 4);
        let mut now = Instant::now();
        clock.tick_at(now);
        for _ in 0..6 {
            now += Duration::from_millis(20);
            clock.tick_at(now);
        }
        // Steady 20 ms frames: 50 FPS.
        assert!((clock.fps() - 50.0).abs() < 0.5);
    }

    #[test]
    fn test_fps_before_any_frame_is_nominal() {
        let clock = FrameClock::new(72.0, 4);
        assert!((clock.fps() - 72.0).abs() < 1e-3);
    }

    #[test]
    fn test_reset_prevents_delta_spike() {
        let mut clock = FrameClock::new(60.0, 4);
        let start = Instant::now();
        clock.tick_at(start);
        clock.reset();
        // A long "pause" elapsed, but the first tick after reset is 1.0.
        let ratio = clock.tick_at(start + Duration::from_secs(5));
        assert_eq!(ratio, 1.0);
        assert!((clock.fps() - 60.0).abs() < 1e-3);
    }
}
