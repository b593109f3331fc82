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

//! MIDBG Common - Shared functionality for MIDBG components
//!
//! This crate provides the data model and utilities shared between the
//! debugger engine and any front-end shell: the runtime breakpoint and
//! semantic position types, the wire-level descriptor union, the error
//! taxonomy, debugger configuration and logging setup.

/// Common types used throughout MIDBG including breakpoints, semantic positions and wire events
pub mod types;

/// Debugger connection configuration with environment variable overrides
pub mod config;
/// Environment variable name constants for MIDBG configuration
pub mod env;
/// Error taxonomy shared by all MIDBG components
pub mod error;
/// Logging setup and utilities for consistent logging across MIDBG components
pub mod logging;

pub use config::*;
pub use env::*;
pub use error::*;
pub use logging::*;
pub use types::*;
