// MIDBG - Mediation Flow Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Debugger connection configuration.
//!
//! The runtime exposes two TCP ports while started in debug mode: a command
//! port for request/response control traffic and an event port for pushed
//! notifications. [`DebuggerConfig`] bundles both endpoints together with the
//! command timeout, and can be overridden through the environment variables
//! documented in [`crate::env`].

use std::{env, time::Duration};

use tracing::warn;

use crate::env::{
    MIDBG_COMMAND_PORT, MIDBG_COMMAND_TIMEOUT_MS, MIDBG_EVENT_PORT, MIDBG_RUNTIME_HOST,
};

/// Default host for the mediation runtime.
pub const DEFAULT_RUNTIME_HOST: &str = "localhost";

/// Default command channel port exposed by the runtime in debug mode.
pub const DEFAULT_COMMAND_PORT: u16 = 9005;

/// Default event channel port exposed by the runtime in debug mode.
pub const DEFAULT_EVENT_PORT: u16 = 9006;

/// Default command response timeout in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Lower bound for the command response timeout in milliseconds.
///
/// The runtime can take a few seconds to answer a command while a mediation
/// flow is executing, so shorter timeouts only produce spurious failures.
pub const MIN_COMMAND_TIMEOUT_MS: u64 = 3_000;

/// Connection settings for one debug session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig {
    /// Host name or address of the mediation runtime.
    pub host: String,
    /// Port of the synchronous command channel.
    pub command_port: u16,
    /// Port of the asynchronous event channel.
    pub event_port: u16,
    /// Timeout applied to every command awaiting its response frame.
    pub command_timeout: Duration,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RUNTIME_HOST.to_string(),
            command_port: DEFAULT_COMMAND_PORT,
            event_port: DEFAULT_EVENT_PORT,
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }
}

impl DebuggerConfig {
    /// Build a configuration from the environment, falling back to defaults
    /// for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = env::var(MIDBG_RUNTIME_HOST).unwrap_or(defaults.host);
        let command_port = parse_env(MIDBG_COMMAND_PORT).unwrap_or(defaults.command_port);
        let event_port = parse_env(MIDBG_EVENT_PORT).unwrap_or(defaults.event_port);
        let timeout_ms = parse_env(MIDBG_COMMAND_TIMEOUT_MS)
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_MS)
            .max(MIN_COMMAND_TIMEOUT_MS);

        Self {
            host,
            command_port,
            event_port,
            command_timeout: Duration::from_millis(timeout_ms),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable value for {name}: {raw}");
            None
        }
    }
}
