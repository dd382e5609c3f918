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

use crate::lighting::error::ParseError;

/// Typed error for show file failures so callers can tell a missing file from a
/// bad fixture definition without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid duration: {0}")]
    Duration(#[from] duration_string::Error),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("Fixture {fixture}: {source}")]
    Fixture {
        fixture: String,
        #[source]
        source: ParseError,
    },

    #[error("Fixture {fixture} references unknown profile {profile}")]
    UnknownProfile { fixture: String, profile: String },

    #[error("Duplicate fixture id: {0}")]
    DuplicateFixture(String),

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Unable to write show file: {0}")]
    Write(#[from] serde_yml::Error),
}
