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

//! Error taxonomy for the mediation debugger engine.
//!
//! Transport-level failures ([`DebugError::Connection`]) terminate the
//! session; [`DebugError::Timeout`] is recoverable by the caller (typically
//! surfaced as "server unresponsive, restart the debugger");
//! [`DebugError::Translation`] degrades a single breakpoint to unverified
//! without touching the session. Nothing is retried automatically inside the
//! engine; every retry decision is pushed to the caller.

use std::time::Duration;

use thiserror::Error;

use crate::types::SemanticPosition;

/// Errors produced by the debugger engine.
#[derive(Debug, Error)]
pub enum DebugError {
    /// A socket could not be opened or failed mid-session. Fatal to the
    /// session.
    #[error("runtime connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A command received no response frame within the configured timeout.
    /// The command is not retried; the caller decides what to do.
    #[error("the runtime did not respond within {0:?}; restart the server in debug mode and try again")]
    Timeout(Duration),

    /// A raw breakpoint descriptor could not be mapped to a semantic
    /// position. The affected breakpoint is treated as unverified.
    #[error("unrecognized breakpoint descriptor: {0}")]
    Translation(String),

    /// A semantic position is already bound to a different breakpoint.
    /// Guards against ordering bugs; should not occur in normal operation.
    #[error("semantic position {position:?} already bound to breakpoint {existing_id}")]
    DuplicateBinding {
        /// The position that was registered twice.
        position: SemanticPosition,
        /// Id of the breakpoint already holding the binding.
        existing_id: u64,
    },

    /// A step was requested while the runtime is not paused at a known
    /// position.
    #[error("step requested while the runtime is not paused")]
    NotPaused,

    /// An operation required a live session but none is attached.
    #[error("debug session is not connected to the runtime")]
    SessionClosed,

    /// A language service request failed.
    #[error("language service request failed: {0}")]
    LanguageService(String),

    /// The runtime violated the wire protocol (e.g. closed the command
    /// channel mid-exchange or sent an unframed response).
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Convenience alias used throughout the engine.
pub type DebugResult<T> = std::result::Result<T, DebugError>;
