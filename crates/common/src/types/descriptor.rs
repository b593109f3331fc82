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

//! The raw breakpoint descriptor union and its canonical form.
//!
//! The runtime addresses a mediator structurally, not by file and line: a
//! breakpoint lives inside an API resource, a proxy service, an inbound
//! endpoint, a plain named sequence, or a template, and is located by an
//! ordinal path (`mediator-position`) within that artifact. The language
//! service hands the engine these descriptors verbatim, and the same raw
//! shape is echoed back to the runtime in set/clear commands, so the typed
//! representation here must round-trip the wire format exactly.
//!
//! Five structurally different shapes exist, discriminated by which wrapper
//! key is present. [`BreakpointDescriptor::semantic_position`] folds all of
//! them into one canonical `{key, mediator_position, sequence_type}` tuple
//! used as the registry's lookup key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DebugError, DebugResult};

/// Canonical structural address of a mediator.
///
/// Two positions are equal iff all present fields match; an absent
/// `sequence_type` only matches absence. The registry keys on this type, so
/// equality and hashing are structural.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SemanticPosition {
    /// Key of the containing artifact (API, proxy, inbound endpoint,
    /// sequence or template key).
    pub key: String,
    /// Ordinal path locating the mediator inside the artifact.
    pub mediator_position: String,
    /// Which named sequence within the artifact (e.g. request vs fault
    /// path). Templates never carry one.
    pub sequence_type: Option<String>,
}

/// A raw breakpoint descriptor as produced by the language service and
/// consumed by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointDescriptor {
    /// A breakpoint inside a sequence-bearing artifact.
    Sequence(SequenceDescriptor),
    /// A breakpoint inside a template. Templates are not scoped by sequence
    /// type; the absence is intentional and must not be defaulted.
    Template(TemplateDescriptor),
}

/// The sequence-bearing wrappers: which one is present discriminates the
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum SequenceDescriptor {
    /// Breakpoint inside an API resource.
    Api {
        /// The API wrapper payload.
        api: ApiPosition,
    },
    /// Breakpoint inside a proxy service.
    Proxy {
        /// The proxy wrapper payload.
        proxy: ProxyPosition,
    },
    /// Breakpoint inside an inbound endpoint.
    Inbound {
        /// The inbound wrapper payload.
        inbound: InboundPosition,
    },
    /// Breakpoint inside a plain named sequence: the fields sit directly on
    /// the wrapper.
    Plain(PlainSequencePosition),
}

/// Structural position inside an API resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiPosition {
    /// Key of the API artifact.
    #[serde(rename = "api-key")]
    pub key: String,
    /// Ordinal path of the mediator.
    #[serde(rename = "mediator-position")]
    pub mediator_position: String,
    /// Named sequence within the resource (request/fault path).
    #[serde(rename = "sequence-type", skip_serializing_if = "Option::is_none")]
    pub sequence_type: Option<String>,
}

/// Structural position inside a proxy service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxyPosition {
    /// Key of the proxy artifact.
    #[serde(rename = "proxy-key")]
    pub key: String,
    /// Ordinal path of the mediator.
    #[serde(rename = "mediator-position")]
    pub mediator_position: String,
    /// Named sequence within the proxy.
    #[serde(rename = "sequence-type", skip_serializing_if = "Option::is_none")]
    pub sequence_type: Option<String>,
}

/// Structural position inside an inbound endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundPosition {
    /// Key of the inbound endpoint artifact.
    #[serde(rename = "inbound-key")]
    pub key: String,
    /// Ordinal path of the mediator.
    #[serde(rename = "mediator-position")]
    pub mediator_position: String,
    /// Named sequence within the endpoint.
    #[serde(rename = "sequence-type", skip_serializing_if = "Option::is_none")]
    pub sequence_type: Option<String>,
}

/// Structural position inside a plain named sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlainSequencePosition {
    /// Key of the sequence artifact.
    #[serde(rename = "sequence-key")]
    pub key: String,
    /// Ordinal path of the mediator.
    #[serde(rename = "mediator-position")]
    pub mediator_position: String,
    /// Named sequence type, when applicable.
    #[serde(rename = "sequence-type", skip_serializing_if = "Option::is_none")]
    pub sequence_type: Option<String>,
}

/// Structural position inside a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateDescriptor {
    /// Key of the template artifact.
    #[serde(rename = "template-key")]
    pub key: String,
    /// Ordinal path of the mediator.
    #[serde(rename = "mediator-position")]
    pub mediator_position: String,
}

impl BreakpointDescriptor {
    /// Parse a raw descriptor payload.
    ///
    /// An unrecognized shape is a translation failure, reported rather than
    /// silently dropped: a silent drop would desynchronize the registry from
    /// the runtime. The input is never mutated.
    pub fn parse(value: &Value) -> DebugResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|err| DebugError::Translation(format!("{err} (payload: {value})")))
    }

    /// Fold this descriptor into its canonical semantic position.
    ///
    /// Total over all five shapes and deterministic.
    pub fn semantic_position(&self) -> SemanticPosition {
        match self {
            Self::Sequence(SequenceDescriptor::Api { api }) => SemanticPosition {
                key: api.key.clone(),
                mediator_position: api.mediator_position.clone(),
                sequence_type: api.sequence_type.clone(),
            },
            Self::Sequence(SequenceDescriptor::Proxy { proxy }) => SemanticPosition {
                key: proxy.key.clone(),
                mediator_position: proxy.mediator_position.clone(),
                sequence_type: proxy.sequence_type.clone(),
            },
            Self::Sequence(SequenceDescriptor::Inbound { inbound }) => SemanticPosition {
                key: inbound.key.clone(),
                mediator_position: inbound.mediator_position.clone(),
                sequence_type: inbound.sequence_type.clone(),
            },
            Self::Sequence(SequenceDescriptor::Plain(plain)) => SemanticPosition {
                key: plain.key.clone(),
                mediator_position: plain.mediator_position.clone(),
                sequence_type: plain.sequence_type.clone(),
            },
            Self::Template(template) => SemanticPosition {
                key: template.key.clone(),
                mediator_position: template.mediator_position.clone(),
                sequence_type: None,
            },
        }
    }
}
