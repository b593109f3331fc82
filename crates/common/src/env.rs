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

//! Environment variable name constants for MIDBG configuration.
//!
//! This module provides constant string names for all environment variables
//! used by MIDBG. These constants ensure consistency across the codebase and
//! provide a single source of truth for environment variable names.

/// Environment variable for the mediation runtime host.
///
/// Host name or address the debugger connects to for both the command and
/// event channels.
///
/// # Default
///
/// `localhost` when not set.
pub const MIDBG_RUNTIME_HOST: &str = "MIDBG_RUNTIME_HOST";

/// Environment variable for the command channel port.
///
/// The command channel carries synchronous request/response traffic
/// (set/clear breakpoint, resume, property queries).
///
/// # Default
///
/// `9005` when not set, matching the runtime's default debug configuration.
pub const MIDBG_COMMAND_PORT: &str = "MIDBG_COMMAND_PORT";

/// Environment variable for the event channel port.
///
/// The event channel carries asynchronous runtime-pushed notifications
/// (breakpoint hits, flow termination).
///
/// # Default
///
/// `9006` when not set, matching the runtime's default debug configuration.
pub const MIDBG_EVENT_PORT: &str = "MIDBG_EVENT_PORT";

/// Environment variable for the command response timeout, in milliseconds.
///
/// A command that receives no response frame within this period fails with
/// a timeout error. Values below [`crate::config::MIN_COMMAND_TIMEOUT_MS`]
/// are clamped up, since the runtime legitimately needs a few seconds to
/// answer while a mediation flow is executing.
///
/// # Default
///
/// `10000` (10 seconds) when not set.
pub const MIDBG_COMMAND_TIMEOUT_MS: &str = "MIDBG_COMMAND_TIMEOUT_MS";
