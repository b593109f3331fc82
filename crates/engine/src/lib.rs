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

//! MIDBG Engine - the remote mediation debugger protocol engine
//!
//! This crate reconciles two addressing schemes for "where did execution
//! stop": the editor's file/line breakpoints and the runtime's structural
//! semantic positions. It owns the two newline-delimited JSON channels to
//! the runtime (synchronous commands, asynchronous events), the dual
//! persistent/ephemeral breakpoint registry, the session state machine, and
//! the breakpoint-driven step-over implementation.
//!
//! The conversion between source positions and semantic positions is
//! performed by an external language service, consumed through the
//! [`LanguageService`] trait as an oracle.

pub mod lang;
pub use lang::*;

pub mod registry;
pub use registry::*;

pub mod session;
pub use session::*;

pub mod step;
pub use step::*;

pub mod transport;
pub use transport::*;
