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

//! The language service oracle.
//!
//! Converting a (file, line, column) into a structural semantic position -
//! and computing which positions are reachable by one logical step - requires
//! the project's full configuration model and is owned by the external
//! language server. The engine consumes it through this trait and never
//! reimplements any of it.

use async_trait::async_trait;
use midbg_common::{BreakpointDescriptor, BreakpointValidity, SourcePosition};

/// Source-to-semantic position oracle backed by the language server.
///
/// All methods keep the response aligned with the request: the N-th verdict
/// or descriptor corresponds to the N-th requested position.
#[async_trait]
pub trait LanguageService: Send + Sync + 'static {
    /// Check which of the requested positions hold a breakable mediator.
    async fn validate_breakpoints(
        &self,
        file_path: &str,
        positions: &[SourcePosition],
    ) -> eyre::Result<Vec<BreakpointValidity>>;

    /// Fetch the raw semantic descriptor for each position, `None` where the
    /// language server has no mediator information.
    async fn breakpoint_info(
        &self,
        file_path: &str,
        positions: &[SourcePosition],
    ) -> eyre::Result<Vec<Option<BreakpointDescriptor>>>;

    /// Compute the source positions reachable by one logical step from the
    /// given pause position.
    async fn step_over_targets(
        &self,
        file_path: &str,
        position: &SourcePosition,
    ) -> eyre::Result<Vec<SourcePosition>>;
}
