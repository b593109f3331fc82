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

//! Wire protocol messages exchanged with the mediation runtime.
//!
//! Both channels speak newline-delimited JSON. Commands are the raw
//! breakpoint descriptor object with `command`/`command-argument` fields
//! merged in, which is why descriptors must round-trip verbatim. Events are
//! the descriptor with an `event` field merged in.

use serde_json::{json, Map, Value};

use crate::{
    error::{DebugError, DebugResult},
    types::BreakpointDescriptor,
};

/// Property scopes the runtime can be queried for while paused.
///
/// The `variable` context uses the `variables` command argument on the wire;
/// every other scope uses `properties`.
pub const PROPERTY_CONTEXTS: [&str; 6] =
    ["axis2", "axis2-client", "transport", "operation", "synapse", "variable"];

/// Wire keys in property responses and the display labels they map to.
pub const PROPERTY_LABELS: [(&str, &str); 6] = [
    ("axis2Transport-properties", "Transport Scope Properties"),
    ("axis2Operation-properties", "Operation Scope Properties"),
    ("axis2Client-properties", "Axis2-Client Scope Properties"),
    ("axis2-properties", "Axis2 Scope Properties"),
    ("synapse-properties", "Synapse Scope Properties"),
    ("message-variables", "Variables"),
];

/// An asynchronous notification pushed by the runtime on the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Execution paused at a registered structural position.
    Breakpoint(BreakpointDescriptor),
    /// The mediation flow terminated.
    Terminated,
}

impl RuntimeEvent {
    /// Parse one event frame.
    ///
    /// The `event` field discriminates; the remaining fields of a breakpoint
    /// event form the raw descriptor.
    pub fn parse(line: &str) -> DebugResult<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|err| DebugError::Translation(format!("{err} (event: {line})")))?;
        let Some(object) = value.as_object() else {
            return Err(DebugError::Translation(format!("event frame is not an object: {line}")));
        };
        let Some(kind) = object.get("event").and_then(Value::as_str) else {
            return Err(DebugError::Translation(format!("event frame without event field: {line}")));
        };

        match kind {
            "terminated" => Ok(Self::Terminated),
            "breakpoint" => {
                let mut payload = object.clone();
                payload.remove("event");
                let descriptor = BreakpointDescriptor::parse(&Value::Object(payload))?;
                Ok(Self::Breakpoint(descriptor))
            }
            other => Err(DebugError::Translation(format!("unknown event kind: {other}"))),
        }
    }
}

/// Build a `set breakpoint` command for a descriptor.
pub fn set_breakpoint_command(descriptor: &BreakpointDescriptor) -> Value {
    breakpoint_command(descriptor, "set")
}

/// Build a `clear breakpoint` command for a descriptor.
pub fn clear_breakpoint_command(descriptor: &BreakpointDescriptor) -> Value {
    breakpoint_command(descriptor, "clear")
}

fn breakpoint_command(descriptor: &BreakpointDescriptor, action: &str) -> Value {
    let mut object = match serde_json::to_value(descriptor) {
        Ok(Value::Object(object)) => object,
        // descriptors always serialize to an object
        _ => Map::new(),
    };
    object.insert("command".to_string(), Value::String(action.to_string()));
    object.insert("command-argument".to_string(), Value::String("breakpoint".to_string()));
    Value::Object(object)
}

/// Build the `resume` command.
pub fn resume_command() -> Value {
    json!({ "command": "resume" })
}

/// Build a property query for one scope.
///
/// The `variable` context is queried through the `variables` command
/// argument; all other scopes through `properties`.
pub fn properties_command(context: &str) -> Value {
    if context == "variable" {
        json!({ "command": "get", "command-argument": "variables", "context": context })
    } else {
        json!({ "command": "get", "command-argument": "properties", "context": context })
    }
}
