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

use serde::Serialize;

use crate::lighting::color::Rgb;
use crate::lighting::types::{to_dmx, Channel, ChannelMap, ControlLayer};

/// The resolved output for one fixture on one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureTarget {
    pub fixture_id: String,
    pub dimmer: u8,
    pub color: Rgb,
    pub white: u8,
    pub amber: u8,
    pub uv: u8,
    pub pan: u8,
    pub tilt: u8,
    pub zoom: u8,
    pub focus: u8,
    pub speed: u8,
    pub color_wheel: u8,
    pub gobo: u8,
    pub prism: u8,
    pub strobe: u8,
    /// Which layer produced each channel.
    pub sources: ChannelMap<ControlLayer>,
    pub crossfade_active: bool,
    pub crossfade_progress: f64,
}

impl FixtureTarget {
    pub(crate) fn from_values(
        fixture_id: &str,
        values: &ChannelMap<f64>,
        sources: ChannelMap<ControlLayer>,
    ) -> FixtureTarget {
        FixtureTarget {
            fixture_id: fixture_id.to_string(),
            dimmer: to_dmx(values[Channel::Dimmer]),
            color: Rgb::new(
                to_dmx(values[Channel::Red]),
                to_dmx(values[Channel::Green]),
                to_dmx(values[Channel::Blue]),
            ),
            white: to_dmx(values[Channel::White]),
            amber: to_dmx(values[Channel::Amber]),
            uv: to_dmx(values[Channel::Uv]),
            pan: to_dmx(values[Channel::Pan]),
            tilt: to_dmx(values[Channel::Tilt]),
            zoom: to_dmx(values[Channel::Zoom]),
            focus: to_dmx(values[Channel::Focus]),
            speed: to_dmx(values[Channel::Speed]),
            color_wheel: to_dmx(values[Channel::ColorWheel]),
            gobo: to_dmx(values[Channel::Gobo]),
            prism: to_dmx(values[Channel::Prism]),
            strobe: to_dmx(values[Channel::Strobe]),
            sources,
            crossfade_active: false,
            crossfade_progress: 0.0,
        }
    }

    /// Reads a channel back as its wire value.
    pub fn value(&self, channel: Channel) -> u8 {
        match channel {
            Channel::Dimmer => self.dimmer,
            Channel::Red => self.color.r,
            Channel::Green => self.color.g,
            Channel::Blue => self.color.b,
            Channel::White => self.white,
            Channel::Pan => self.pan,
            Channel::Tilt => self.tilt,
            Channel::Zoom => self.zoom,
            Channel::Focus => self.focus,
            Channel::Gobo => self.gobo,
            Channel::Prism => self.prism,
            Channel::Speed => self.speed,
            Channel::ColorWheel => self.color_wheel,
            Channel::Strobe => self.strobe,
            Channel::Amber => self.amber,
            Channel::Uv => self.uv,
        }
    }

    pub fn source(&self, channel: Channel) -> ControlLayer {
        self.sources[channel]
    }
}

/// Rig wide effect flags for UI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GlobalEffects {
    pub strobe_active: bool,
    pub strobe_speed: f64,
    pub blinder_active: bool,
    pub blinder_intensity: f64,
    pub blackout_active: bool,
    pub freeze_active: bool,
}

/// A summary of which layers currently hold any state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct LayerActivity {
    pub ai_intent: bool,
    pub consciousness: bool,
    pub manual_overrides: usize,
    pub effects: usize,
    pub blackout: bool,
}

/// Everything the arbiter decided for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalLightingTarget {
    pub frame: u64,
    pub fixtures: Vec<FixtureTarget>,
    pub global_effects: GlobalEffects,
    pub layers: LayerActivity,
}

impl FinalLightingTarget {
    pub fn fixture(&self, id: &str) -> Option<&FixtureTarget> {
        self.fixtures.iter().find(|f| f.fixture_id == id)
    }
}

/// Diagnostic snapshot of the arbiter. Not meant for control decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbiterStatus {
    pub fixture_count: usize,
    pub frame: u64,
    pub output_enabled: bool,
    pub blackout: bool,
    pub grand_master: f64,
    pub layers: LayerActivity,
    pub active_crossfades: usize,
    pub active_patterns: usize,
    pub active_formations: usize,
    pub vibe: Option<String>,
}
