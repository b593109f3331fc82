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

//! The bidirectional breakpoint registry.
//!
//! Two independent binding tables exist per session, both keyed by the
//! value-equal [`SemanticPosition`]: the *persistent* table holds user
//! breakpoints, the *ephemeral* table holds short-lived step-over targets.
//! A position present in the persistent table is never duplicated into the
//! ephemeral table - the step engine depends on this to resolve events
//! unambiguously and to avoid clearing a user breakpoint during step
//! cleanup, since a shared position's raw descriptor is identical on the
//! wire.

use std::collections::HashMap;

use midbg_common::{
    normalize_path, BreakpointDescriptor, DebugError, DebugResult, RuntimeBreakpoint,
    SemanticPosition, SourcePosition,
};
use tracing::debug;

/// One registry entry: the editor-visible breakpoint plus the raw descriptor
/// needed verbatim for wire-level set/clear commands.
#[derive(Debug, Clone)]
pub struct BreakpointBinding {
    /// The editor-visible breakpoint.
    pub breakpoint: RuntimeBreakpoint,
    /// The raw descriptor as returned by the language service.
    pub descriptor: BreakpointDescriptor,
}

/// Dual-table index between semantic positions and editor breakpoints.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    persistent: HashMap<SemanticPosition, BreakpointBinding>,
    ephemeral: HashMap<SemanticPosition, BreakpointBinding>,
}

impl BreakpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user breakpoint binding.
    ///
    /// Re-registering the same breakpoint at the same position is a no-op;
    /// binding the same position to a *different* breakpoint is an ordering
    /// bug and fails with [`DebugError::DuplicateBinding`].
    pub fn register_persistent(
        &mut self,
        breakpoint: RuntimeBreakpoint,
        position: SemanticPosition,
        descriptor: BreakpointDescriptor,
    ) -> DebugResult<()> {
        if let Some(existing) = self.persistent.get(&position) {
            if existing.breakpoint.id == breakpoint.id {
                return Ok(());
            }
            return Err(DebugError::DuplicateBinding {
                position,
                existing_id: existing.breakpoint.id,
            });
        }
        self.persistent.insert(position, BreakpointBinding { breakpoint, descriptor });
        Ok(())
    }

    /// Insert a step-over binding, skipping positions already covered by a
    /// user breakpoint.
    ///
    /// Returns `true` when the binding was inserted. The silent skip (rather
    /// than an error) is the core step-over correctness rule: a shared
    /// position must resolve against the persistent table and must survive
    /// step cleanup.
    pub fn register_ephemeral(
        &mut self,
        breakpoint: RuntimeBreakpoint,
        position: SemanticPosition,
        descriptor: BreakpointDescriptor,
    ) -> bool {
        if self.persistent.contains_key(&position) {
            debug!(?position, "Step target already covered by a user breakpoint; skipping");
            return false;
        }
        self.ephemeral.insert(position, BreakpointBinding { breakpoint, descriptor });
        true
    }

    /// Resolve a runtime pause event to an editor breakpoint.
    ///
    /// The persistent table wins when a position exists in both.
    pub fn resolve_event(&self, position: &SemanticPosition) -> Option<&BreakpointBinding> {
        self.persistent.get(position).or_else(|| self.ephemeral.get(position))
    }

    /// Remove every persistent binding for a file, returning the raw
    /// descriptors so the caller can issue wire-level clear commands.
    pub fn clear_for_file(&mut self, file_path: &str) -> Vec<BreakpointDescriptor> {
        let normalized = normalize_path(file_path);
        let removed: Vec<SemanticPosition> = self
            .persistent
            .iter()
            .filter(|(_, binding)| binding.breakpoint.file_path == normalized)
            .map(|(position, _)| position.clone())
            .collect();
        removed
            .into_iter()
            .filter_map(|position| self.persistent.remove(&position))
            .map(|binding| binding.descriptor)
            .collect()
    }

    /// Remove one persistent binding by position.
    pub fn remove_persistent(&mut self, position: &SemanticPosition) -> Option<BreakpointBinding> {
        self.persistent.remove(position)
    }

    /// Drain the ephemeral table, returning the raw descriptors removed.
    ///
    /// Used once a step completes or the session terminates, so step-over
    /// breakpoints never leak into the next step.
    pub fn clear_all_ephemeral(&mut self) -> Vec<BreakpointDescriptor> {
        self.ephemeral.drain().map(|(_, binding)| binding.descriptor).collect()
    }

    /// Raw descriptors of every persistent binding for a file, without
    /// removing anything.
    pub fn file_descriptors(&self, file_path: &str) -> Vec<BreakpointDescriptor> {
        let normalized = normalize_path(file_path);
        self.persistent
            .values()
            .filter(|binding| binding.breakpoint.file_path == normalized)
            .map(|binding| binding.descriptor.clone())
            .collect()
    }

    /// All persistent bindings, for re-attaching after a (re)connect.
    pub fn persistent_bindings(&self) -> Vec<BreakpointBinding> {
        self.persistent.values().cloned().collect()
    }

    /// Persistent bindings for one file, position-keyed for diffing.
    pub fn persistent_for_file(
        &self,
        file_path: &str,
    ) -> Vec<(SemanticPosition, BreakpointBinding)> {
        let normalized = normalize_path(file_path);
        self.persistent
            .iter()
            .filter(|(_, binding)| binding.breakpoint.file_path == normalized)
            .map(|(position, binding)| (position.clone(), binding.clone()))
            .collect()
    }

    /// The user breakpoint at a source position within a file, if any.
    pub fn persistent_at(
        &self,
        file_path: &str,
        position: &SourcePosition,
    ) -> Option<&RuntimeBreakpoint> {
        let normalized = normalize_path(file_path);
        self.persistent
            .values()
            .map(|binding| &binding.breakpoint)
            .find(|bp| {
                bp.file_path == normalized && bp.line == position.line && bp.column == position.column
            })
    }

    /// Whether any ephemeral bindings are currently registered.
    pub fn has_ephemeral(&self) -> bool {
        !self.ephemeral.is_empty()
    }

    /// Number of persistent bindings (test/diagnostic helper).
    pub fn persistent_len(&self) -> usize {
        self.persistent.len()
    }
}
