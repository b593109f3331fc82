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

//! Step-over via ephemeral breakpoints.
//!
//! The runtime has no native step primitive: stepping is implemented by
//! breakpointing every position reachable in one logical step from the
//! current pause point, resuming, and reacting to whichever fires. Targets
//! that coincide with a pre-existing user breakpoint are deliberately left
//! to the persistent table - installing them again as ephemeral entries
//! would make event resolution ambiguous, and the step cleanup could then
//! clear a user breakpoint whose raw descriptor is identical on the wire.

use midbg_common::{normalize_path, set_breakpoint_command, DebugError, DebugResult, SourcePosition};
use tracing::{debug, warn};

use crate::session::{DebugSession, SessionState};

impl DebugSession {
    /// Step over the mediator at the current pause point.
    ///
    /// Fails fast with [`DebugError::NotPaused`] when the runtime is not
    /// paused at a known position. When the reachable set is empty (end of
    /// flow) a plain resume is issued and the outcome is whatever event
    /// arrives next - a later user breakpoint or termination.
    pub async fn step_over(&self) -> DebugResult<()> {
        let (file, pause_position) = {
            let shared = self.shared.lock();
            if shared.state != SessionState::Paused {
                return Err(DebugError::NotPaused);
            }
            let Some(pause) = &shared.current_pause else {
                return Err(DebugError::NotPaused);
            };
            let file = shared
                .current_file
                .clone()
                .unwrap_or_else(|| pause.file_path.clone());
            (file, pause.position())
        };
        let command = self.require_command()?;

        let targets = self
            .language
            .step_over_targets(&file, &pause_position)
            .await
            .map_err(|err| DebugError::LanguageService(err.to_string()))?;

        // positions already covered by a user breakpoint resolve naturally
        // against the persistent table when hit
        let targets: Vec<SourcePosition> = {
            let shared = self.shared.lock();
            targets
                .into_iter()
                .filter(|target| shared.registry.persistent_at(&file, target).is_none())
                .collect()
        };

        if targets.is_empty() {
            debug!(%file, "No step targets beyond the current position; resuming");
            return self.resume_internal(true).await;
        }

        let validity = self
            .language
            .validate_breakpoints(&file, &targets)
            .await
            .map_err(|err| DebugError::LanguageService(err.to_string()))?;
        let accepted: Vec<SourcePosition> = validity
            .iter()
            .filter(|verdict| verdict.valid)
            .map(|verdict| verdict.position())
            .collect();
        let descriptors = self
            .language
            .breakpoint_info(&file, &accepted)
            .await
            .map_err(|err| DebugError::LanguageService(err.to_string()))?;

        let normalized = normalize_path(&file);
        for (position, descriptor) in accepted.iter().zip(descriptors) {
            let Some(descriptor) = descriptor else {
                warn!(
                    file = %normalized,
                    line = position.line,
                    "No descriptor for step target; skipping"
                );
                continue;
            };
            let breakpoint = self.fresh_breakpoint(&normalized, *position, true);
            let inserted = {
                let mut shared = self.shared.lock();
                shared.registry.register_ephemeral(
                    breakpoint,
                    descriptor.semantic_position(),
                    descriptor.clone(),
                )
            };
            if inserted {
                command.send(&set_breakpoint_command(&descriptor)).await?;
            }
        }

        self.resume_internal(true).await
    }
}
