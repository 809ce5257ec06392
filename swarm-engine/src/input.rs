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
//! Host input snapshot shared with the simulation
//!
//! A small fixed-layout value written by the host environment (cursor, key
//! bits, camera zoom/pan) and read-only to every simulation unit. Behaviors
//! receive a copy of the current snapshot each tick.

use parking_lot::RwLock;
use std::sync::Arc;

/// Fixed-layout input and camera state for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSnapshot {
    /// Cursor position in world coordinates, x.
    pub cursor_x: f32,
    /// Cursor position in world coordinates, y.
    pub cursor_y: f32,
    /// Key states as a bit set; one bit per host-defined key slot.
    pub keys: u32,
    /// Camera zoom factor.
    pub zoom: f32,
    /// Camera pan offset, x.
    pub pan_x: f32,
    /// Camera pan offset, y.
    pub pan_y: f32,
}

impl InputSnapshot {
    /// Check whether a key slot (0..32) is held.
    pub fn key_down(&self, slot: u32) -> bool {
        slot < 32 && self.keys & (1 << slot) != 0
    }
}

impl Default for InputSnapshot {
    fn default() -> Self {
        InputSnapshot {
            cursor_x: 0.0,
            cursor_y: 0.0,
            keys: 0,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

/// Shared handle to the input snapshot.
///
/// The host holds one clone and writes; the scheduler holds another and reads
/// a copy at the top of each frame. Writes are infrequent and tiny, so a
/// read-write lock is sufficient here.
#[derive(Clone, Default)]
pub struct SharedInput(Arc<RwLock<InputSnapshot>>);

impl SharedInput {
    /// Create a shared input with default state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot (host side).
    pub fn write(&self, snapshot: InputSnapshot) {
        *self.0.write() = snapshot;
    }

    /// Copy out the current snapshot (simulation side).
    pub fn read(&self) -> InputSnapshot {
        *self.0.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bits() {
        let snapshot = InputSnapshot {
            keys: 0b101,
            ..InputSnapshot::default()
        };
        assert!(snapshot.key_down(0));
        assert!(!snapshot.key_down(1));
        assert!(snapshot.key_down(2));
        assert!(!snapshot.key_down(33));
    }

    #[test]
    fn test_shared_write_read() {
        let shared = SharedInput::new();
        let other = shared.clone();

        shared.write(InputSnapshot {
            cursor_x: 5.0,
            ..InputSnapshot::default()
        });
        assert_eq!(other.read().cursor_x, 5.0);
    }
}
