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
//! Error taxonomy for the simulation core
//!
//! Errors fall into two categories with different propagation policies:
//!
//! - **Recoverable, per-frame**: pool exhaustion and buffer overflow. These
//!   are reported to the caller (or logged and dropped) and the simulation
//!   keeps running with degraded output.
//! - **Fatal at startup**: registration and configuration errors. These
//!   indicate a build-time misconfiguration and abort initialization.
//!
//! Programmer errors (accessing a field with the wrong element type, indexing
//! past capacity) panic immediately rather than surfacing as an error value.

use thiserror::Error;

/// Errors produced by the simulation core.
#[derive(Error, Debug)]
pub enum SimError {
    /// The free list for an entity kind is empty; spawn returns this rather
    /// than growing storage. Recoverable.
    #[error("pool exhausted for entity kind '{0}'")]
    PoolExhausted(String),

    /// A kind id or name that was never registered.
    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),

    /// Two registrations used the same kind name.
    #[error("entity kind '{0}' is already registered")]
    DuplicateKind(String),

    /// A kind was registered with an instance count of zero.
    #[error("entity kind '{0}' must have a nonzero instance count")]
    ZeroInstanceCount(String),

    /// Registration was attempted after the world allocated its storage.
    #[error("cannot register entity kinds after the world is initialized")]
    RegistrationClosed,

    /// An operation that requires allocated storage ran before `init`.
    #[error("world is not initialized")]
    NotInitialized,

    /// A behavior was built against an incompatible behavior API version.
    #[error(
        "behavior '{name}' API version {found} is incompatible with engine API version {expected}"
    )]
    IncompatibleBehavior {
        /// Kind name of the offending behavior.
        name: String,
        /// Version the behavior reported.
        found: String,
        /// Version the engine was built with.
        expected: String,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Underlying I/O failure while loading configuration.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file did not parse as TOML.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The scheduler thread hung up its control channel.
    #[error("scheduler control channel disconnected")]
    Disconnected,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_kind() {
        let err = SimError::PoolExhausted("boid".to_string());
        assert!(err.to_string().contains("boid"));

        let err = SimError::DuplicateKind("predator".to_string());
        assert!(err.to_string().contains("predator"));
    }

    #[test]
    fn test_incompatible_behavior_message() {
        let err = SimError::IncompatibleBehavior {
            name: "boid".to_string(),
            found: "9.0.0".to_string(),
            expected: "0.2.0".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("9.0.0"));
        assert!(msg.contains("0.2.0"));
    }
}
