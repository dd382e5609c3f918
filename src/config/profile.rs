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
use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Serialize};

use crate::hal::profiles::{
    ColorWheel, FixtureClass, FixtureProfile, SafetyFlags, Shutter, ShutterKind, WheelColor,
    DEFAULT_MIN_CHANGE_TIME,
};
use crate::lighting::color::Rgb;
use crate::lighting::types::ColorMixing;

use super::error::ConfigError;

/// A YAML representation of a custom fixture capability profile.
#[derive(Deserialize, Serialize, Clone)]
pub struct Profile {
    /// The id fixtures refer to.
    id: String,

    /// A human readable name. Defaults to the id.
    name: Option<String>,

    class: Option<FixtureClass>,

    color_mixing: ColorMixing,

    /// Wheel slots, for wheel and hybrid fixtures.
    wheel: Option<Vec<WheelSlot>>,

    /// Minimum time between two wheel moves.
    min_change_time: Option<String>,

    shutter: Option<ShutterKind>,

    max_strobe_hz: Option<f64>,

    discharge_lamp: Option<bool>,

    /// How long a discharge lamp needs before it can restrike.
    cooldown: Option<String>,
}

/// A YAML representation of a single wheel slot.
#[derive(Deserialize, Serialize, Clone)]
pub struct WheelSlot {
    dmx: u8,
    name: String,
    /// Approximate slot color as `#rrggbb`.
    color: String,
}

impl WheelSlot {
    pub fn new(dmx: u8, name: &str, color: &str) -> WheelSlot {
        WheelSlot {
            dmx,
            name: name.to_string(),
            color: color.to_string(),
        }
    }
}

fn parse_duration(duration: &Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    match duration {
        Some(duration) => Ok(DurationString::from_string(duration.clone())?.into()),
        None => Ok(default),
    }
}

impl Profile {
    pub fn new(id: &str, color_mixing: ColorMixing, wheel: Option<Vec<WheelSlot>>) -> Profile {
        Profile {
            id: id.to_string(),
            name: None,
            class: None,
            color_mixing,
            wheel,
            min_change_time: None,
            shutter: None,
            max_strobe_hz: None,
            discharge_lamp: None,
            cooldown: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Builds the runtime profile.
    pub fn to_profile(&self) -> Result<FixtureProfile, ConfigError> {
        let color_wheel = match &self.wheel {
            Some(slots) => {
                let colors = slots
                    .iter()
                    .map(|slot| Ok(WheelColor::new(slot.dmx, &slot.name, Rgb::from_hex(&slot.color)?)))
                    .collect::<Result<Vec<WheelColor>, ConfigError>>()?;
                Some(ColorWheel::new(
                    colors,
                    parse_duration(&self.min_change_time, DEFAULT_MIN_CHANGE_TIME)?,
                ))
            }
            None => None,
        };

        if self.color_mixing.is_discrete() && color_wheel.is_none() {
            return Err(ConfigError::Invalid {
                field: "wheel",
                reason: format!("profile {} mixes color with a wheel but lists no slots", self.id),
            });
        }

        let shutter = self.shutter.unwrap_or(ShutterKind::Digital);
        let discharge_lamp = self.discharge_lamp.unwrap_or(false);
        Ok(FixtureProfile {
            id: self.id.clone(),
            name: self.name.clone().unwrap_or_else(|| self.id.clone()),
            class: self.class.unwrap_or(FixtureClass::Generic),
            color_mixing: self.color_mixing,
            color_wheel,
            shutter: Shutter {
                kind: shutter,
                max_strobe_hz: self.max_strobe_hz,
            },
            movement: None,
            safety: SafetyFlags {
                discharge_lamp,
                cooldown: parse_duration(&self.cooldown, Duration::ZERO)?,
                ..SafetyFlags::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Profile {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_wheel_profile() {
        let profile = parse(
            r##"
            id: spot-5r
            name: Spot 5R
            class: spot
            color_mixing: wheel
            min_change_time: 800ms
            shutter: mechanical
            max_strobe_hz: 8
            discharge_lamp: true
            cooldown: 2m
            wheel:
              - dmx: 0
                name: Open
                color: "#ffffff"
              - dmx: 20
                name: Deep Red
                color: "#c00000"
        "##,
        )
        .to_profile()
        .unwrap();

        assert_eq!(profile.id, "spot-5r");
        assert_eq!(profile.name, "Spot 5R");
        assert_eq!(profile.class, FixtureClass::Spot);
        assert!(profile.is_mechanical());
        assert_eq!(profile.min_change_time(), Duration::from_millis(800));
        assert_eq!(profile.shutter.max_strobe_hz, Some(8.0));
        assert_eq!(profile.safety.cooldown, Duration::from_secs(120));

        let wheel = profile.color_wheel.unwrap();
        assert_eq!(wheel.colors.len(), 2);
        assert!(wheel.colors[0].white);
        assert_eq!(wheel.colors[1].rgb, Rgb::new(0xc0, 0, 0));
    }

    #[test]
    fn test_led_profile_defaults() {
        let profile = parse(
            r#"
            id: cheap-par
            color_mixing: rgb
        "#,
        )
        .to_profile()
        .unwrap();

        assert_eq!(profile.name, "cheap-par");
        assert_eq!(profile.class, FixtureClass::Generic);
        assert!(!profile.is_mechanical());
        assert!(profile.color_wheel.is_none());
    }

    #[test]
    fn test_wheel_without_slots() {
        let profile = Profile::new("broken", ColorMixing::Wheel, None);
        assert!(matches!(
            profile.to_profile(),
            Err(ConfigError::Invalid { field: "wheel", .. })
        ));
    }

    #[test]
    fn test_bad_slot_color() {
        let profile = Profile::new(
            "broken",
            ColorMixing::Wheel,
            Some(vec![WheelSlot::new(0, "Open", "white")]),
        );
        assert!(matches!(profile.to_profile(), Err(ConfigError::Parse(_))));
    }
}
