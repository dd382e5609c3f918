// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use super::types::{Channel, ControlLayer};

/// Errors returned by mutating arbiter calls. When one of these is returned the
/// arbiter state is exactly what it was before the call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArbiterError {
    #[error("Unknown fixture: {0}")]
    UnknownFixture(String),

    #[error("Capacity exceeded: {what} limit is {limit}")]
    CapacityExceeded { what: &'static str, limit: usize },

    #[error("Invalid override for {fixture}: {reason}")]
    InvalidOverride { fixture: String, reason: String },

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Layer {0} is disabled")]
    LayerDisabled(ControlLayer),

    #[error("Invalid {layer} payload: {reason}")]
    InvalidPayload { layer: ControlLayer, reason: String },
}

impl ArbiterError {
    pub(crate) fn missing_value(fixture: &str, channel: Channel) -> ArbiterError {
        ArbiterError::InvalidOverride {
            fixture: fixture.to_string(),
            reason: format!("channel {} is claimed but has no value", channel),
        }
    }

    pub(crate) fn invalid(fixture: &str, reason: &str) -> ArbiterError {
        ArbiterError::InvalidOverride {
            fixture: fixture.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure to parse a named value from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: {value}")]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: &str) -> ParseError {
        ParseError {
            kind,
            value: value.to_string(),
        }
    }
}
