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

//! Inputs for the two lowest layers: the AI intent and the consciousness
//! modifier, and the per-fixture base values derived from them.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::lighting::color::{Hsl, Rgb};
use crate::lighting::types::{
    Channel, ChannelMap, ControlLayer, Fixture, Side, Zone, DMX_CENTER, DMX_MAX,
};

/// Idle pulse floor and ceiling as a fraction of full intensity.
const IDLE_MIN: f64 = 0.08;
const IDLE_MAX: f64 = 0.24;

/// Warm white used while nothing drives the rig.
const IDLE_COLOR: Rgb = Rgb::new(255, 180, 110);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteRole {
    #[default]
    Primary,
    Secondary,
    Accent,
    Ambient,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub primary: Hsl,
    pub secondary: Hsl,
    pub accent: Hsl,
    pub ambient: Hsl,
}

impl Palette {
    pub fn color(&self, role: PaletteRole) -> Hsl {
        match role {
            PaletteRole::Primary => self.primary,
            PaletteRole::Secondary => self.secondary,
            PaletteRole::Accent => self.accent,
            PaletteRole::Ambient => self.ambient,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        let white = Hsl::new(0.0, 0.0, 1.0);
        Palette {
            primary: white,
            secondary: white,
            accent: white,
            ambient: white,
        }
    }
}

/// What the AI wants a single zone to do.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneIntent {
    /// 0..1, multiplied with the master intensity.
    pub intensity: f64,
    pub role: PaletteRole,
    pub color_override: Option<Hsl>,
}

impl ZoneIntent {
    pub fn new(intensity: f64, role: PaletteRole) -> Self {
        ZoneIntent {
            intensity,
            role,
            color_override: None,
        }
    }
}

/// Normalized (0..1) pan/tilt coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mechanics {
    pub pan: f64,
    pub tilt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementIntent {
    /// 0..1, where 0.5 is center.
    pub center_x: f64,
    pub center_y: f64,
    /// Explicit coordinates for movers on the left side of the stage.
    pub mechanics_left: Option<Mechanics>,
    pub mechanics_right: Option<Mechanics>,
}

impl Default for MovementIntent {
    fn default() -> Self {
        MovementIntent {
            center_x: 0.5,
            center_y: 0.5,
            mechanics_left: None,
            mechanics_right: None,
        }
    }
}

/// Zoom and focus in native DMX units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Optics {
    pub zoom: f64,
    pub focus: f64,
}

/// A full frame of intent from the AI producer. Replaced wholesale on every update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiIntent {
    pub master_intensity: f64,
    pub palette: Palette,
    pub zones: HashMap<Zone, ZoneIntent>,
    pub movement: MovementIntent,
    pub optics: Option<Optics>,
    pub vibe: String,
}

impl AiIntent {
    pub fn new(master_intensity: f64) -> Self {
        AiIntent {
            master_intensity,
            ..Default::default()
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_zone(mut self, zone: Zone, intent: ZoneIntent) -> Self {
        self.zones.insert(zone, intent);
        self
    }

    pub fn with_movement(mut self, movement: MovementIntent) -> Self {
        self.movement = movement;
        self
    }

    pub fn with_optics(mut self, optics: Optics) -> Self {
        self.optics = Some(optics);
        self
    }

    pub fn with_vibe(mut self, vibe: &str) -> Self {
        self.vibe = vibe.to_string();
        self
    }

    /// Looks up the zone entry, falling back to the broader parent zone. Zones the
    /// intent says nothing about play at full zone intensity on the primary color.
    fn zone(&self, zone: Zone) -> ZoneIntent {
        self.zones
            .get(&zone)
            .or_else(|| zone.parent().and_then(|parent| self.zones.get(&parent)))
            .copied()
            .unwrap_or(ZoneIntent::new(1.0, PaletteRole::Primary))
    }
}

/// Palette adjustments applied on top of the AI's palette.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PaletteModifier {
    /// Degrees added to the hue.
    pub hue_shift: f64,
    /// Multipliers, 1.0 leaves the value unchanged.
    pub saturation_scale: f64,
    pub lightness_scale: f64,
    /// Replaces the primary color outright.
    pub primary_override: Option<Hsl>,
    /// 0..1, how much of the modified color is mixed in.
    pub blend: f64,
}

impl PaletteModifier {
    fn apply(&self, color: Hsl, role: PaletteRole) -> Hsl {
        if let (PaletteRole::Primary, Some(primary)) = (role, self.primary_override) {
            return primary;
        }
        Hsl::new(
            color.h + self.hue_shift,
            (color.s * self.saturation_scale).clamp(0.0, 1.0),
            (color.l * self.lightness_scale).clamp(0.0, 1.0),
        )
    }
}

/// Biases the AI movement center, in normalized units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementModifier {
    pub center_bias_x: f64,
    pub center_bias_y: f64,
}

/// Optional refinement layer sitting directly above the AI intent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Consciousness {
    pub palette: Option<PaletteModifier>,
    pub movement: Option<MovementModifier>,
    /// How long this modifier stays valid after it is set.
    #[serde(skip)]
    pub ttl: Option<Duration>,
}

fn finite(what: &str, value: f64) -> Result<(), String> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(format!("{} is not finite", what))
    }
}

fn finite_color(what: &str, color: &Hsl) -> Result<(), String> {
    finite(what, color.h)?;
    finite(what, color.s)?;
    finite(what, color.l)
}

impl AiIntent {
    /// Checks that every number in the intent is finite.
    pub fn validate(&self) -> Result<(), String> {
        finite("master_intensity", self.master_intensity)?;
        finite_color("palette.primary", &self.palette.primary)?;
        finite_color("palette.secondary", &self.palette.secondary)?;
        finite_color("palette.accent", &self.palette.accent)?;
        finite_color("palette.ambient", &self.palette.ambient)?;

        for (zone, intent) in &self.zones {
            finite(&format!("zone {:?} intensity", zone), intent.intensity)?;
            if let Some(color) = &intent.color_override {
                finite_color(&format!("zone {:?} color", zone), color)?;
            }
        }

        let movement = &self.movement;
        finite("movement.center_x", movement.center_x)?;
        finite("movement.center_y", movement.center_y)?;
        for (side, mechanics) in [
            ("mechanics_left", &movement.mechanics_left),
            ("mechanics_right", &movement.mechanics_right),
        ] {
            if let Some(mechanics) = mechanics {
                finite(side, mechanics.pan)?;
                finite(side, mechanics.tilt)?;
            }
        }

        if let Some(optics) = &self.optics {
            finite("optics.zoom", optics.zoom)?;
            finite("optics.focus", optics.focus)?;
        }
        Ok(())
    }
}

impl Consciousness {
    /// Checks that every modifier value is finite.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(palette) = &self.palette {
            finite("palette.hue_shift", palette.hue_shift)?;
            finite("palette.saturation_scale", palette.saturation_scale)?;
            finite("palette.lightness_scale", palette.lightness_scale)?;
            finite("palette.blend", palette.blend)?;
            if let Some(primary) = &palette.primary_override {
                finite_color("palette.primary_override", primary)?;
            }
        }
        if let Some(movement) = &self.movement {
            finite("movement.center_bias_x", movement.center_bias_x)?;
            finite("movement.center_bias_y", movement.center_bias_y)?;
        }
        Ok(())
    }
}

/// Base channel values for one fixture before manual, effects and overrides.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BaseValues {
    pub(crate) values: ChannelMap<f64>,
    pub(crate) sources: ChannelMap<ControlLayer>,
    pub(crate) timestamp: Instant,
}

/// Computes the AI layer's values for a fixture. With no intent the rig breathes
/// gently in warm white instead of going dark.
pub(crate) fn ai_values(
    intent: Option<(&AiIntent, Instant)>,
    fixture: &Fixture,
    idle_epoch: Instant,
    idle_period: Duration,
    now: Instant,
) -> BaseValues {
    let mut values = ChannelMap::from_fn(Channel::neutral_value);
    let sources = ChannelMap::filled(ControlLayer::AiIntent);

    let Some((intent, received)) = intent else {
        let period = idle_period.as_secs_f64().max(0.001);
        let elapsed = now.saturating_duration_since(idle_epoch).as_secs_f64();
        let wave = 0.5 + 0.5 * (TAU * elapsed / period).sin();
        values[Channel::Dimmer] = (IDLE_MIN + (IDLE_MAX - IDLE_MIN) * wave) * DMX_MAX;
        set_color(&mut values, IDLE_COLOR);
        return BaseValues {
            values,
            sources,
            timestamp: idle_epoch,
        };
    };

    let zone = intent.zone(fixture.zone);
    values[Channel::Dimmer] = intent.master_intensity * zone.intensity * DMX_MAX;

    let hsl = zone
        .color_override
        .unwrap_or_else(|| intent.palette.color(zone.role));
    set_color(&mut values, hsl.to_rgb());

    let (pan, tilt) = movement_position(&intent.movement, fixture);
    values[Channel::Pan] = pan;
    values[Channel::Tilt] = tilt;

    if let Some(optics) = intent.optics {
        values[Channel::Zoom] = optics.zoom;
        values[Channel::Focus] = optics.focus;
    }

    BaseValues {
        values,
        sources,
        timestamp: received,
    }
}

fn movement_position(movement: &MovementIntent, fixture: &Fixture) -> (f64, f64) {
    let mechanics = if fixture.has_movement {
        match fixture.side {
            Some(Side::Left) => movement.mechanics_left,
            Some(Side::Right) => movement.mechanics_right,
            None => None,
        }
    } else {
        None
    };

    match mechanics {
        Some(m) => (m.pan * DMX_MAX, m.tilt * DMX_MAX),
        None => (movement.center_x * DMX_MAX, movement.center_y * DMX_MAX),
    }
}

/// Applies the consciousness modifier to the AI base, reporting the channels it
/// touched as coming from the consciousness layer.
pub(crate) fn apply_consciousness(
    base: &mut BaseValues,
    consciousness: &Consciousness,
    intent: Option<&AiIntent>,
    fixture: &Fixture,
    set_at: Instant,
) {
    if let Some(modifier) = consciousness.palette {
        let (current, role) = match intent {
            Some(intent) => {
                let zone = intent.zone(fixture.zone);
                (
                    zone.color_override
                        .unwrap_or_else(|| intent.palette.color(zone.role)),
                    zone.role,
                )
            }
            None => (Hsl::new(30.0, 1.0, 0.72), PaletteRole::Primary),
        };
        let original = current_color(&base.values);
        let modified = modifier.apply(current, role).to_rgb();
        set_color(
            &mut base.values,
            original.lerp(&modified, modifier.blend.clamp(0.0, 1.0)),
        );
        for channel in [Channel::Red, Channel::Green, Channel::Blue] {
            base.sources[channel] = ControlLayer::Consciousness;
        }
    }

    if let Some(movement) = consciousness.movement {
        let pan = base.values[Channel::Pan] + movement.center_bias_x * DMX_MAX;
        let tilt = base.values[Channel::Tilt] + movement.center_bias_y * DMX_MAX;
        base.values[Channel::Pan] = pan.clamp(0.0, DMX_MAX);
        base.values[Channel::Tilt] = tilt.clamp(0.0, DMX_MAX);
        base.sources[Channel::Pan] = ControlLayer::Consciousness;
        base.sources[Channel::Tilt] = ControlLayer::Consciousness;
    }

    if consciousness.palette.is_some() || consciousness.movement.is_some() {
        base.timestamp = base.timestamp.max(set_at);
    }
}

fn set_color(values: &mut ChannelMap<f64>, color: Rgb) {
    values[Channel::Red] = color.r as f64;
    values[Channel::Green] = color.g as f64;
    values[Channel::Blue] = color.b as f64;
}

fn current_color(values: &ChannelMap<f64>) -> Rgb {
    let byte = |c: Channel| values[c].clamp(0.0, DMX_MAX).round() as u8;
    Rgb::new(byte(Channel::Red), byte(Channel::Green), byte(Channel::Blue))
}

/// Pan/tilt the AI base would use when there is nothing better to go on.
pub(crate) fn fallback_position(base: &BaseValues) -> (f64, f64) {
    let pan = base.values[Channel::Pan];
    let tilt = base.values[Channel::Tilt];
    if pan.is_finite() && tilt.is_finite() {
        (pan, tilt)
    } else {
        (DMX_CENTER, DMX_CENTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::types::ChannelSet;

    fn par(zone: Zone) -> Fixture {
        Fixture::new(
            "par",
            zone,
            "par",
            ChannelSet::from([Channel::Dimmer, Channel::Red, Channel::Green, Channel::Blue]),
        )
    }

    fn mover(zone: Zone) -> Fixture {
        Fixture::new(
            "mover",
            zone,
            "moving_head",
            ChannelSet::from([Channel::Dimmer, Channel::Pan, Channel::Tilt]),
        )
    }

    #[test]
    fn test_idle_pulse_stays_in_band() {
        let epoch = Instant::now();
        let fixture = par(Zone::Front);
        for ms in (0..4000).step_by(100) {
            let base = ai_values(
                None,
                &fixture,
                epoch,
                Duration::from_secs(4),
                epoch + Duration::from_millis(ms),
            );
            let dimmer = base.values[Channel::Dimmer];
            assert!(dimmer >= IDLE_MIN * DMX_MAX - 1e-9);
            assert!(dimmer <= IDLE_MAX * DMX_MAX + 1e-9);
            assert_eq!(base.values[Channel::Pan], DMX_CENTER);
        }
    }

    #[test]
    fn test_zone_intensity_and_parent_fallback() {
        let now = Instant::now();
        let intent = AiIntent::new(0.5).with_zone(Zone::Front, ZoneIntent::new(0.5, PaletteRole::Accent));
        let base = ai_values(
            Some((&intent, now)),
            &par(Zone::FrontLeft),
            now,
            Duration::from_secs(4),
            now,
        );
        assert!((base.values[Channel::Dimmer] - 63.75).abs() < 1e-9);

        let back = ai_values(
            Some((&intent, now)),
            &par(Zone::Back),
            now,
            Duration::from_secs(4),
            now,
        );
        assert!((back.values[Channel::Dimmer] - 127.5).abs() < 1e-9);
    }

    #[test]
    fn test_palette_role_and_override() {
        let now = Instant::now();
        let palette = Palette {
            primary: Hsl::new(0.0, 1.0, 0.5),
            secondary: Hsl::new(120.0, 1.0, 0.5),
            accent: Hsl::new(240.0, 1.0, 0.5),
            ambient: Hsl::new(0.0, 0.0, 1.0),
        };
        let mut override_zone = ZoneIntent::new(1.0, PaletteRole::Primary);
        override_zone.color_override = Some(Hsl::new(240.0, 1.0, 0.5));
        let intent = AiIntent::new(1.0)
            .with_palette(palette)
            .with_zone(Zone::Back, ZoneIntent::new(1.0, PaletteRole::Secondary))
            .with_zone(Zone::Floor, override_zone);

        let back = ai_values(Some((&intent, now)), &par(Zone::Back), now, Duration::from_secs(4), now);
        assert_eq!(back.values[Channel::Green], 255.0);
        assert_eq!(back.values[Channel::Red], 0.0);

        let floor = ai_values(Some((&intent, now)), &par(Zone::Floor), now, Duration::from_secs(4), now);
        assert_eq!(floor.values[Channel::Blue], 255.0);
    }

    #[test]
    fn test_mover_mechanics_by_side() {
        let now = Instant::now();
        let intent = AiIntent::new(1.0).with_movement(MovementIntent {
            center_x: 0.5,
            center_y: 0.5,
            mechanics_left: Some(Mechanics { pan: 0.0, tilt: 1.0 }),
            mechanics_right: None,
        });

        let left = ai_values(Some((&intent, now)), &mover(Zone::Left), now, Duration::from_secs(4), now);
        assert_eq!(left.values[Channel::Pan], 0.0);
        assert_eq!(left.values[Channel::Tilt], 255.0);

        let right = ai_values(Some((&intent, now)), &mover(Zone::Right), now, Duration::from_secs(4), now);
        assert_eq!(right.values[Channel::Pan], 127.5);
    }

    #[test]
    fn test_consciousness_marks_sources() {
        let now = Instant::now();
        let intent = AiIntent::new(1.0);
        let fixture = mover(Zone::Center);
        let mut base = ai_values(Some((&intent, now)), &fixture, now, Duration::from_secs(4), now);

        let consciousness = Consciousness {
            palette: Some(PaletteModifier {
                hue_shift: 0.0,
                saturation_scale: 1.0,
                lightness_scale: 1.0,
                primary_override: Some(Hsl::new(0.0, 1.0, 0.5)),
                blend: 1.0,
            }),
            movement: Some(MovementModifier {
                center_bias_x: 0.1,
                center_bias_y: 0.0,
            }),
            ttl: None,
        };
        apply_consciousness(&mut base, &consciousness, Some(&intent), &fixture, now);

        assert_eq!(base.values[Channel::Red], 255.0);
        assert_eq!(base.values[Channel::Green], 0.0);
        assert_eq!(base.sources[Channel::Red], ControlLayer::Consciousness);
        assert_eq!(base.sources[Channel::Pan], ControlLayer::Consciousness);
        assert_eq!(base.sources[Channel::Dimmer], ControlLayer::AiIntent);
        assert!((base.values[Channel::Pan] - 153.0).abs() < 1e-9);
    }
}
