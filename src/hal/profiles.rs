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

//! Fixture capability profiles: what a fixture can physically do.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::lighting::color::Rgb;
use crate::lighting::types::ColorMixing;

/// The minimum time between wheel moves when a profile doesn't say.
pub const DEFAULT_MIN_CHANGE_TIME: Duration = Duration::from_millis(500);

/// Model name fragments that identify a built-in profile. Every fragment in an
/// entry must appear in the normalized model name. The first matching entry wins.
const MODEL_HINTS: &[(&[&str], &str)] = &[
    (&["beam2r"], BEAM_2R),
    (&["lb230"], BEAM_2R),
    (&["sharpy"], BEAM_2R),
    (&["beam230"], BEAM_2R),
    (&["5rbeam"], BEAM_2R),
    (&["7rbeam"], BEAM_2R),
    (&["wash", "led"], LED_WASH),
    (&["movinghead", "led"], LED_WASH),
    (&["par", "led"], LED_PAR_RGB),
    (&["slimpar"], LED_PAR_RGB),
    (&["flatpar"], LED_PAR_RGB),
    (&["strobe"], LED_STROBE),
    (&["atomic"], LED_STROBE),
];

pub const BEAM_2R: &str = "beam-2r";
pub const LED_PAR_RGB: &str = "led-par-rgb";
pub const LED_WASH: &str = "led-wash";
pub const LED_STROBE: &str = "led-strobe";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureClass {
    Beam,
    Spot,
    Wash,
    Par,
    Strobe,
    Laser,
    Generic,
}

/// One slot on a physical color wheel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WheelColor {
    pub dmx: u8,
    pub name: String,
    /// Approximate color of the slot, used for distance matching.
    pub rgb: Rgb,
    /// Open or white slot.
    pub white: bool,
}

impl WheelColor {
    pub fn new(dmx: u8, name: &str, rgb: Rgb) -> WheelColor {
        let lower = name.to_lowercase();
        WheelColor {
            dmx,
            name: name.to_string(),
            rgb,
            white: lower.contains("white") || lower.contains("open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorWheel {
    pub colors: Vec<WheelColor>,
    /// Minimum time between two wheel moves the mechanism tolerates.
    pub min_change_time: Duration,
    pub allows_continuous_spin: bool,
    pub spin_start_dmx: Option<u8>,
}

impl ColorWheel {
    pub fn new(colors: Vec<WheelColor>, min_change_time: Duration) -> ColorWheel {
        ColorWheel {
            colors,
            min_change_time,
            allows_continuous_spin: false,
            spin_start_dmx: None,
        }
    }

    /// The open/white slot, if the wheel has one.
    pub fn white_slot(&self) -> Option<&WheelColor> {
        self.colors.iter().find(|color| color.white)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutterKind {
    /// A physical blade. Strobe rate is limited.
    Mechanical,
    /// LED on/off, no rate limit.
    Digital,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Shutter {
    pub kind: ShutterKind,
    pub max_strobe_hz: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Stepper,
    Servo,
    Galvo,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Movement {
    pub kind: MovementKind,
    /// Degrees per second.
    pub max_pan_speed: f64,
    /// Degrees per second.
    pub max_tilt_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SafetyFlags {
    pub blackout_on_color_change: bool,
    /// How long the fixture may run at full. `None` means no limit.
    pub max_continuous_on: Option<Duration>,
    /// Discharge lamps need a cooldown before they can restrike.
    pub discharge_lamp: bool,
    pub cooldown: Duration,
}

/// The capabilities of a fixture model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureProfile {
    pub id: String,
    pub name: String,
    pub class: FixtureClass,
    pub color_mixing: ColorMixing,
    pub color_wheel: Option<ColorWheel>,
    pub shutter: Shutter,
    pub movement: Option<Movement>,
    pub safety: SafetyFlags,
}

impl FixtureProfile {
    /// True when colors must be snapped to a fixed set of wheel slots.
    pub fn needs_color_translation(&self) -> bool {
        self.color_mixing.is_discrete()
    }

    /// True when color changes move physical parts and need rate protection.
    pub fn is_mechanical(&self) -> bool {
        self.color_mixing.is_discrete()
            || self.shutter.kind == ShutterKind::Mechanical
            || self.safety.discharge_lamp
    }

    pub fn min_change_time(&self) -> Duration {
        self.color_wheel
            .as_ref()
            .map_or(DEFAULT_MIN_CHANGE_TIME, |wheel| wheel.min_change_time)
    }
}

fn beam_2r() -> FixtureProfile {
    let colors = vec![
        WheelColor::new(0, "Open (White)", Rgb::new(255, 255, 255)),
        WheelColor::new(15, "Red", Rgb::new(255, 0, 0)),
        WheelColor::new(30, "Orange", Rgb::new(255, 128, 0)),
        WheelColor::new(45, "Yellow", Rgb::new(255, 255, 0)),
        WheelColor::new(60, "Green", Rgb::new(0, 255, 0)),
        WheelColor::new(75, "Cyan", Rgb::new(0, 255, 255)),
        WheelColor::new(90, "Blue", Rgb::new(0, 0, 255)),
        WheelColor::new(105, "Magenta", Rgb::new(255, 0, 255)),
        WheelColor::new(120, "Light Blue", Rgb::new(128, 128, 255)),
        WheelColor::new(135, "Pink", Rgb::new(255, 128, 255)),
        WheelColor::new(150, "UV Purple", Rgb::new(128, 0, 255)),
        WheelColor::new(165, "CTO (Warm White)", Rgb::new(255, 200, 150)),
    ];
    let mut wheel = ColorWheel::new(colors, Duration::from_millis(500));
    wheel.allows_continuous_spin = true;
    wheel.spin_start_dmx = Some(190);

    FixtureProfile {
        id: BEAM_2R.to_string(),
        name: "Beam 2R / LB230N / Sharpy Clone".to_string(),
        class: FixtureClass::Beam,
        color_mixing: ColorMixing::Wheel,
        color_wheel: Some(wheel),
        shutter: Shutter {
            kind: ShutterKind::Mechanical,
            max_strobe_hz: Some(12.0),
        },
        movement: Some(Movement {
            kind: MovementKind::Stepper,
            max_pan_speed: 180.0,
            max_tilt_speed: 120.0,
        }),
        safety: SafetyFlags {
            blackout_on_color_change: false,
            max_continuous_on: None,
            discharge_lamp: true,
            cooldown: Duration::from_secs(300),
        },
    }
}

fn led_par_rgb() -> FixtureProfile {
    FixtureProfile {
        id: LED_PAR_RGB.to_string(),
        name: "LED PAR RGB Generic".to_string(),
        class: FixtureClass::Par,
        color_mixing: ColorMixing::Rgb,
        color_wheel: None,
        shutter: Shutter {
            kind: ShutterKind::Digital,
            max_strobe_hz: None,
        },
        movement: None,
        safety: SafetyFlags::default(),
    }
}

fn led_wash() -> FixtureProfile {
    FixtureProfile {
        id: LED_WASH.to_string(),
        name: "LED Moving Head Wash".to_string(),
        class: FixtureClass::Wash,
        color_mixing: ColorMixing::Rgbw,
        color_wheel: None,
        shutter: Shutter {
            kind: ShutterKind::Digital,
            max_strobe_hz: None,
        },
        movement: Some(Movement {
            kind: MovementKind::Stepper,
            max_pan_speed: 200.0,
            max_tilt_speed: 150.0,
        }),
        safety: SafetyFlags::default(),
    }
}

fn led_strobe() -> FixtureProfile {
    FixtureProfile {
        id: LED_STROBE.to_string(),
        name: "LED Strobe".to_string(),
        class: FixtureClass::Strobe,
        color_mixing: ColorMixing::Rgb,
        color_wheel: None,
        shutter: Shutter {
            kind: ShutterKind::Digital,
            max_strobe_hz: None,
        },
        movement: None,
        safety: SafetyFlags {
            max_continuous_on: Some(Duration::from_secs(30)),
            ..SafetyFlags::default()
        },
    }
}

/// Profiles by id.
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: HashMap<String, FixtureProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileRegistry {
    /// A registry with no profiles at all.
    pub fn empty() -> ProfileRegistry {
        ProfileRegistry {
            profiles: HashMap::new(),
        }
    }

    /// A registry holding the built-in profiles.
    pub fn builtin() -> ProfileRegistry {
        let mut registry = Self::empty();
        for profile in [beam_2r(), led_par_rgb(), led_wash(), led_strobe()] {
            registry.profiles.insert(profile.id.clone(), profile);
        }
        registry
    }

    /// Adds a profile, returning the one it replaced.
    pub fn register(&mut self, profile: FixtureProfile) -> Option<FixtureProfile> {
        let id = profile.id.clone();
        let replaced = self.profiles.insert(id.clone(), profile);
        if replaced.is_some() {
            warn!(profile = %id, "Replaced existing fixture profile");
        } else {
            debug!(profile = %id, "Registered fixture profile");
        }
        replaced
    }

    pub fn get(&self, id: &str) -> Option<&FixtureProfile> {
        self.profiles.get(id)
    }

    /// Guesses a profile from a model or fixture name. Meant to be used once when
    /// patching a fixture, never per frame.
    pub fn by_model(&self, model: &str) -> Option<&FixtureProfile> {
        let normalized: String = model
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        MODEL_HINTS
            .iter()
            .find(|(fragments, _)| {
                fragments
                    .iter()
                    .all(|fragment| normalized.contains(fragment))
            })
            .and_then(|(_, id)| self.get(id))
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Profiles sorted by id.
    pub fn profiles(&self) -> Vec<&FixtureProfile> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.profiles.get(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        let registry = ProfileRegistry::builtin();
        assert_eq!(
            registry.ids(),
            vec![BEAM_2R, LED_PAR_RGB, LED_STROBE, LED_WASH]
        );

        let beam = registry.get(BEAM_2R).unwrap();
        assert!(beam.is_mechanical());
        assert!(beam.needs_color_translation());
        assert_eq!(beam.min_change_time(), Duration::from_millis(500));
        assert_eq!(beam.shutter.max_strobe_hz, Some(12.0));
        assert!(beam.safety.discharge_lamp);

        let wheel = beam.color_wheel.as_ref().unwrap();
        assert_eq!(wheel.colors.len(), 12);
        assert_eq!(wheel.white_slot().unwrap().dmx, 0);

        let par = registry.get(LED_PAR_RGB).unwrap();
        assert!(!par.is_mechanical());
        assert!(!par.needs_color_translation());
        assert_eq!(par.min_change_time(), DEFAULT_MIN_CHANGE_TIME);
    }

    #[test]
    fn test_white_slots() {
        assert!(WheelColor::new(0, "Open", Rgb::WHITE).white);
        assert!(WheelColor::new(165, "CTO (Warm White)", Rgb::new(255, 200, 150)).white);
        assert!(!WheelColor::new(15, "Red", Rgb::new(255, 0, 0)).white);
    }

    #[test]
    fn test_by_model() {
        let registry = ProfileRegistry::builtin();
        let id = |model: &str| registry.by_model(model).map(|p| p.id.as_str());

        assert_eq!(id("Beam 2R"), Some(BEAM_2R));
        assert_eq!(id("Clay Paky Sharpy"), Some(BEAM_2R));
        assert_eq!(id("LB-230N"), Some(BEAM_2R));
        assert_eq!(id("Stage LED Wash 7x10"), Some(LED_WASH));
        assert_eq!(id("Slim PAR 64"), Some(LED_PAR_RGB));
        assert_eq!(id("LED PAR 18"), Some(LED_PAR_RGB));
        assert_eq!(id("Atomic 3000"), Some(LED_STROBE));
        assert_eq!(id("Fog machine"), None);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ProfileRegistry::empty();
        assert!(registry.is_empty());

        let mut custom = led_par_rgb();
        custom.id = "custom".to_string();
        assert!(registry.register(custom.clone()).is_none());

        custom.name = "Renamed".to_string();
        let replaced = registry.register(custom).unwrap();
        assert_eq!(replaced.name, "LED PAR RGB Generic");
        assert_eq!(registry.get("custom").unwrap().name, "Renamed");
        assert_eq!(registry.len(), 1);
    }
}
