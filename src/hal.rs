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

//! The hardware facing stage. Arbitrated targets go in, values a fixture can
//! physically produce come out.

pub mod profiles;
pub mod safety;
pub mod translator;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::lighting::arbiter::FinalLightingTarget;
use crate::lighting::color::Rgb;
use crate::lighting::types::{Channel, ControlLayer, Fixture};

pub use profiles::{FixtureProfile, ProfileRegistry};
pub use safety::{FilterResult, SafetyConfig, SafetyLayer, SafetyMetrics};
pub use translator::{ColorTranslator, Translation};

/// What gets written to one fixture for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareFrame {
    pub fixture_id: String,
    pub dimmer: u8,
    /// The color the fixture will actually show.
    pub color: Rgb,
    pub white: u8,
    /// Wheel slot, for wheel fixtures.
    pub color_wheel: Option<u8>,
    pub shutter: u8,
    pub strobe: u8,
    pub pan: u8,
    pub tilt: u8,
    pub zoom: u8,
    pub focus: u8,
    pub strobe_delegated: bool,
    pub color_blocked: bool,
    pub poor_match: bool,
}

/// Runs arbiter output through color translation and mechanical protection.
pub struct OutputStage {
    registry: ProfileRegistry,
    translator: ColorTranslator,
    safety: SafetyLayer,
    /// Fixture id to profile id, resolved when fixtures are patched.
    assignments: HashMap<String, String>,
}

impl OutputStage {
    pub fn new(registry: ProfileRegistry, safety: SafetyConfig, clock: Arc<dyn Clock>) -> OutputStage {
        OutputStage {
            registry,
            translator: ColorTranslator::new(),
            safety: SafetyLayer::new(safety, clock),
            assignments: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    /// Resolves a profile for every fixture. An explicit profile id wins, otherwise
    /// the fixture type is matched against known models. Safety state for fixtures
    /// that are no longer patched is dropped.
    pub fn set_fixtures(&mut self, fixtures: &[Fixture]) {
        let mut assignments = HashMap::new();
        for fixture in fixtures {
            let profile = match &fixture.profile {
                Some(id) => self.registry.get(id),
                None => self
                    .registry
                    .by_model(&fixture.fixture_type)
                    .or_else(|| self.registry.by_model(&fixture.name)),
            };
            if let Some(profile) = profile {
                debug!(fixture = %fixture.id, profile = %profile.id, "Assigned profile");
                assignments.insert(fixture.id.clone(), profile.id.clone());
            }
        }

        let removed: Vec<String> = self
            .assignments
            .keys()
            .filter(|id| !assignments.contains_key(*id))
            .cloned()
            .collect();
        for id in removed {
            self.safety.reset_fixture(&id);
        }
        self.assignments = assignments;
    }

    pub fn profile_for(&self, fixture_id: &str) -> Option<&FixtureProfile> {
        self.assignments
            .get(fixture_id)
            .and_then(|id| self.registry.get(id))
    }

    pub fn render(&mut self, target: &FinalLightingTarget) -> Vec<HardwareFrame> {
        let mut frames = Vec::with_capacity(target.fixtures.len());
        for fixture in &target.fixtures {
            let profile = self
                .assignments
                .get(&fixture.fixture_id)
                .and_then(|id| self.registry.get(id));

            let translation = self.translator.translate(fixture.color, profile);

            // An operator who picked a wheel slot by hand gets that slot.
            let requested_wheel = if fixture.source(Channel::ColorWheel) == ControlLayer::Manual {
                Some(fixture.color_wheel)
            } else {
                translation.wheel_dmx
            };

            let filter = match requested_wheel {
                Some(wheel) => self
                    .safety
                    .filter(&fixture.fixture_id, wheel, profile, fixture.dimmer),
                None => FilterResult {
                    final_color: fixture.color_wheel,
                    blocked: false,
                    latched: false,
                    block_reason: None,
                    suggested_shutter: safety::SHUTTER_OPEN,
                    delegate_to_strobe: false,
                },
            };

            // Report the slot the wheel actually sits on, which differs from the
            // translation when safety held it or the operator picked it.
            let color = match requested_wheel {
                Some(_) if Some(filter.final_color) != translation.wheel_dmx => {
                    slot_color(profile, filter.final_color).unwrap_or(translation.output)
                }
                _ => translation.output,
            };

            frames.push(HardwareFrame {
                fixture_id: fixture.fixture_id.clone(),
                dimmer: fixture.dimmer,
                color,
                white: fixture.white,
                color_wheel: requested_wheel.map(|_| filter.final_color),
                shutter: filter.suggested_shutter,
                strobe: fixture.strobe,
                pan: fixture.pan,
                tilt: fixture.tilt,
                zoom: fixture.zoom,
                focus: fixture.focus,
                strobe_delegated: filter.delegate_to_strobe,
                color_blocked: filter.blocked,
                poor_match: translation.poor_match,
            });
        }
        frames
    }

    pub fn safety_metrics(&self) -> SafetyMetrics {
        self.safety.metrics()
    }

    pub fn reset(&mut self) {
        self.safety.reset_all();
        self.translator.clear_cache();
    }
}

fn slot_color(profile: Option<&FixtureProfile>, dmx: u8) -> Option<Rgb> {
    profile?
        .color_wheel
        .as_ref()?
        .colors
        .iter()
        .find(|slot| slot.dmx == dmx)
        .map(|slot| slot.rgb)
}
