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

//! Editor-side breakpoint types.
//!
//! A [`RuntimeBreakpoint`] is what the editor sees: a file, a line, an
//! optional column, and whether the language service accepted the position.
//! The mapping to the runtime's structural addressing lives in the engine's
//! breakpoint registry.

use serde::{Deserialize, Serialize};

/// A source breakpoint accepted into the session.
///
/// `id` is a session-scoped, monotonically increasing counter; ids are never
/// reused, so the shell can correlate pause notifications with the
/// breakpoints it displays.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RuntimeBreakpoint {
    /// Session-scoped breakpoint identifier.
    pub id: u64,
    /// Normalized path of the file containing the breakpoint.
    pub file_path: String,
    /// Line number in the source file (1-based).
    pub line: u32,
    /// Optional column within the line.
    pub column: Option<u32>,
    /// Whether the language service accepted the position as breakable.
    pub verified: bool,
}

impl RuntimeBreakpoint {
    /// The source position of this breakpoint.
    pub fn position(&self) -> SourcePosition {
        SourcePosition { line: self.line, column: self.column }
    }
}

/// A (line, column) pair exchanged with the language service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// Line number (1-based).
    pub line: u32,
    /// Optional column within the line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl SourcePosition {
    /// Create a position without column information.
    pub fn line(line: u32) -> Self {
        Self { line, column: None }
    }
}

/// Per-position validation verdict returned by the language service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakpointValidity {
    /// Line number the verdict applies to.
    pub line: u32,
    /// Optional column the verdict applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Whether a mediator exists at this position.
    pub valid: bool,
}

impl BreakpointValidity {
    /// The source position this verdict applies to.
    pub fn position(&self) -> SourcePosition {
        SourcePosition { line: self.line, column: self.column }
    }
}

/// Normalize a file path for use as a registry key.
///
/// Windows paths are case-insensitive and backslash-separated; everywhere
/// else forward slashes are canonical. Both sides of every path comparison
/// in the engine go through this function.
pub fn normalize_path(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\").to_lowercase()
    } else {
        path.replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_folds_separators() {
        if cfg!(windows) {
            assert_eq!(normalize_path("src/Main.XML"), "src\\main.xml");
        } else {
            assert_eq!(normalize_path("src\\seq.xml"), "src/seq.xml");
            // casing is preserved on case-sensitive filesystems
            assert_eq!(normalize_path("src/Seq.xml"), "src/Seq.xml");
        }
    }

    #[test]
    fn test_breakpoint_position_roundtrip() {
        let bp = RuntimeBreakpoint {
            id: 7,
            file_path: "api.xml".to_string(),
            line: 12,
            column: Some(4),
            verified: true,
        };
        assert_eq!(bp.position(), SourcePosition { line: 12, column: Some(4) });
    }

    #[test]
    fn test_source_position_serialization_skips_absent_column() {
        let json = serde_json::to_string(&SourcePosition::line(3)).unwrap();
        assert_eq!(json, r#"{"line":3}"#);

        let json = serde_json::to_string(&SourcePosition { line: 3, column: Some(9) }).unwrap();
        assert_eq!(json, r#"{"line":3,"column":9}"#);
    }
}
