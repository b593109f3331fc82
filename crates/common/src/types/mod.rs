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

//! Shared data model for the mediation debugger.

/// Editor-side breakpoints and source positions
pub mod breakpoint;
/// The five-shaped raw descriptor union and canonical semantic positions
pub mod descriptor;
/// Wire-level commands and runtime-pushed events
pub mod protocol;

pub use breakpoint::*;
pub use descriptor::*;
pub use protocol::*;
