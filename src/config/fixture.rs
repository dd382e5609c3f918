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
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hal::ProfileRegistry;
use crate::lighting::types::{Channel, ChannelSet, Side, Zone};

use super::error::ConfigError;

/// A YAML representation of a patched fixture.
#[derive(Deserialize, Serialize, Clone)]
pub struct Fixture {
    id: String,

    /// Display name. Defaults to the id.
    name: Option<String>,

    zone: String,

    /// Stage side. Inferred when missing.
    side: Option<Side>,

    /// The fixture model or type.
    #[serde(rename = "type")]
    fixture_type: String,

    /// The channels this fixture exposes.
    channels: Vec<String>,

    /// A capability profile id.
    profile: Option<String>,
}

impl Fixture {
    pub fn new(id: &str, zone: &str, fixture_type: &str, channels: &[&str]) -> Fixture {
        Fixture {
            id: id.to_string(),
            name: None,
            zone: zone.to_string(),
            side: None,
            fixture_type: fixture_type.to_string(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
            profile: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Fixture {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_profile(mut self, profile: &str) -> Fixture {
        self.profile = Some(profile.to_string());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Builds the runtime fixture, checking its profile against the registry.
    pub fn to_fixture(
        &self,
        registry: &ProfileRegistry,
    ) -> Result<crate::lighting::Fixture, ConfigError> {
        let zone: Zone = self.zone.parse().map_err(|source| ConfigError::Fixture {
            fixture: self.id.clone(),
            source,
        })?;
        let channels = self
            .channels
            .iter()
            .map(|channel| channel.parse::<Channel>())
            .collect::<Result<ChannelSet, _>>()
            .map_err(|source| ConfigError::Fixture {
                fixture: self.id.clone(),
                source,
            })?;

        let mut fixture = crate::lighting::Fixture::new(&self.id, zone, &self.fixture_type, channels);
        if let Some(name) = &self.name {
            fixture = fixture.with_name(name);
        }

        match self.side {
            Some(side) => fixture = fixture.with_side(side),
            None if fixture.side.is_none() => {
                if let Some(side) = side_from_name(&fixture.name) {
                    warn!(
                        fixture = %self.id,
                        side = ?side,
                        "Inferred stage side from the fixture name, set `side` explicitly"
                    );
                    fixture = fixture.with_side(side);
                }
            }
            None => {}
        }

        if let Some(profile) = &self.profile {
            let profile = registry
                .get(profile)
                .ok_or_else(|| ConfigError::UnknownProfile {
                    fixture: self.id.clone(),
                    profile: profile.clone(),
                })?;
            fixture = fixture
                .with_profile(&profile.id)
                .with_color_mixing(profile.color_mixing);
        }

        Ok(fixture)
    }
}

/// Reads a stage side out of names like "Mover Left" or "wash_r".
fn side_from_name(name: &str) -> Option<Side> {
    let lower = name.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();

    if words.iter().any(|word| matches!(*word, "left" | "l" | "sl")) {
        Some(Side::Left)
    } else if words.iter().any(|word| matches!(*word, "right" | "r" | "sr")) {
        Some(Side::Right)
    } else {
        None
    }
}
