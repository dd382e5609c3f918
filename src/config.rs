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

//! Show files: the rig, its profiles, and arbiter and safety settings.

use std::collections::HashSet;
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::hal::{ProfileRegistry, SafetyConfig};
use crate::lighting::arbiter::{AiIntent, ArbiterConfig, MovementIntent, Palette};
use crate::lighting::color::Hsl;
use crate::lighting::types::ColorMixing;

pub mod arbiter;
pub mod error;
pub mod fixture;
pub mod profile;
pub mod safety;

pub use error::ConfigError;

/// A YAML representation of a complete show.
#[derive(Deserialize, Serialize, Clone, Default)]
pub struct Show {
    arbiter: Option<arbiter::Arbiter>,

    safety: Option<safety::Safety>,

    /// Profiles added on top of the built-in ones.
    profiles: Option<Vec<profile::Profile>>,

    fixtures: Vec<fixture::Fixture>,

    /// A static AI look used when simulating.
    look: Option<Look>,
}

/// A YAML representation of a single color look.
#[derive(Deserialize, Serialize, Clone)]
pub struct Look {
    master_intensity: Option<f64>,

    /// Hue in degrees.
    hue: f64,

    saturation: Option<f64>,

    lightness: Option<f64>,

    /// Movement center, 0..1 on each axis.
    center: Option<(f64, f64)>,

    vibe: Option<String>,
}

impl Look {
    pub fn new(master_intensity: f64, hue: f64) -> Look {
        Look {
            master_intensity: Some(master_intensity),
            hue,
            saturation: None,
            lightness: None,
            center: None,
            vibe: None,
        }
    }

    /// Builds the intent this look stands for. Every palette role gets the same color.
    pub fn to_intent(&self) -> AiIntent {
        let color = Hsl::new(
            self.hue,
            self.saturation.unwrap_or(1.0),
            self.lightness.unwrap_or(0.5),
        );
        let (center_x, center_y) = self.center.unwrap_or((0.5, 0.5));

        AiIntent::new(self.master_intensity.unwrap_or(1.0))
            .with_palette(Palette {
                primary: color,
                secondary: color,
                accent: color,
                ambient: color,
            })
            .with_movement(MovementIntent {
                center_x,
                center_y,
                ..MovementIntent::default()
            })
            .with_vibe(self.vibe.as_deref().unwrap_or("static"))
    }
}

impl Show {
    /// Parse a show from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Show, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Show>()?)
    }

    /// Parse a show from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Show, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Show>()?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    pub fn arbiter_config(&self) -> Result<ArbiterConfig, ConfigError> {
        self.arbiter.clone().unwrap_or_default().to_config()
    }

    pub fn safety_config(&self) -> Result<SafetyConfig, ConfigError> {
        self.safety.clone().unwrap_or_default().to_config()
    }

    /// The built-in profiles plus the ones the show defines.
    pub fn registry(&self) -> Result<ProfileRegistry, ConfigError> {
        let mut registry = ProfileRegistry::builtin();
        for profile in self.profiles.iter().flatten() {
            registry.register(profile.to_profile()?);
        }
        Ok(registry)
    }

    /// Builds the rig. Fixture ids must be unique.
    pub fn fixtures(
        &self,
        registry: &ProfileRegistry,
    ) -> Result<Vec<crate::lighting::Fixture>, ConfigError> {
        let mut seen = HashSet::new();
        self.fixtures
            .iter()
            .map(|fixture| {
                if !seen.insert(fixture.id().to_string()) {
                    return Err(ConfigError::DuplicateFixture(fixture.id().to_string()));
                }
                fixture.to_fixture(registry)
            })
            .collect()
    }

    pub fn look(&self) -> Option<&Look> {
        self.look.as_ref()
    }

    /// A small starter show with a pair of beams and a pair of pars.
    pub fn template() -> Show {
        Show {
            arbiter: Some(arbiter::Arbiter::default()),
            safety: Some(safety::Safety::default()),
            profiles: Some(vec![profile::Profile::new(
                "house-par",
                ColorMixing::Rgbw,
                None,
            )]),
            fixtures: vec![
                fixture::Fixture::new(
                    "beam-l",
                    "left",
                    "Beam 2R",
                    &["dimmer", "pan", "tilt", "color_wheel", "strobe"],
                )
                .with_profile("beam-2r"),
                fixture::Fixture::new(
                    "beam-r",
                    "right",
                    "Beam 2R",
                    &["dimmer", "pan", "tilt", "color_wheel", "strobe"],
                )
                .with_profile("beam-2r"),
                fixture::Fixture::new(
                    "par-fl",
                    "front-left",
                    "LED PAR",
                    &["dimmer", "red", "green", "blue", "white"],
                )
                .with_profile("house-par"),
                fixture::Fixture::new(
                    "par-fr",
                    "front-right",
                    "LED PAR",
                    &["dimmer", "red", "green", "blue", "white"],
                )
                .with_profile("house-par"),
            ],
            look: Some(Look::new(0.8, 220.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;
    use crate::lighting::crossfade::Easing;
    use crate::lighting::types::{Side, Zone};

    const SHOW: &str = r##"
arbiter:
  default_crossfade: 1s
  easing: ease-out
safety:
  latch_duration: 1500ms
profiles:
  - id: tiny-wheel
    color_mixing: wheel
    wheel:
      - dmx: 0
        name: Open
        color: "#ffffff"
      - dmx: 10
        name: Red
        color: "#ff0000"
fixtures:
  - id: beam-1
    zone: left
    type: Beam 2R
    channels: [dimmer, pan, tilt, color_wheel]
    profile: beam-2r
  - id: spot-1
    zone: back
    name: Spot R
    type: Spot
    channels: [dimmer, color_wheel]
    profile: tiny-wheel
look:
  master_intensity: 0.5
  hue: 120
  center: [0.25, 0.75]
"##;

    #[test]
    fn test_parse_show() {
        let show = Show::from_yaml(SHOW).unwrap();

        let arbiter = show.arbiter_config().unwrap();
        assert_eq!(arbiter.default_crossfade, Duration::from_secs(1));
        assert_eq!(arbiter.easing, Easing::EaseOut);
        assert_eq!(
            show.safety_config().unwrap().latch_duration,
            Duration::from_millis(1500)
        );

        let registry = show.registry().unwrap();
        assert!(registry.get("tiny-wheel").is_some());
        assert!(registry.get("beam-2r").is_some());

        let fixtures = show.fixtures(&registry).unwrap();
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].side, Some(Side::Left));
        assert_eq!(fixtures[1].zone, Zone::Back);
        assert_eq!(fixtures[1].side, Some(Side::Right));
        assert_eq!(fixtures[1].profile.as_deref(), Some("tiny-wheel"));

        let intent = show.look().unwrap().to_intent();
        assert_eq!(intent.master_intensity, 0.5);
        assert_eq!(intent.palette.primary.h, 120.0);
        assert_eq!(intent.movement.center_x, 0.25);
        assert_eq!(intent.movement.center_y, 0.75);
    }

    #[test]
    fn test_empty_sections_use_defaults() {
        let show = Show::from_yaml("fixtures: []").unwrap();
        assert_eq!(show.arbiter_config().unwrap(), ArbiterConfig::default());
        assert_eq!(show.safety_config().unwrap(), SafetyConfig::default());
        assert_eq!(show.registry().unwrap().len(), 4);
        assert!(show.look().is_none());
    }

    #[test]
    fn test_duplicate_fixture_ids() {
        let yaml = r#"
fixtures:
  - id: par-1
    zone: front
    type: par
    channels: [dimmer]
  - id: par-1
    zone: back
    type: par
    channels: [dimmer]
"#;
        let show = Show::from_yaml(yaml).unwrap();
        let registry = show.registry().unwrap();
        assert!(matches!(
            show.fixtures(&registry),
            Err(ConfigError::DuplicateFixture(id)) if id == "par-1"
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(SHOW.as_bytes()).unwrap();

        let show = Show::deserialize(file.path()).unwrap();
        let registry = show.registry().unwrap();
        assert_eq!(show.fixtures(&registry).unwrap().len(), 2);

        assert!(matches!(
            Show::deserialize(Path::new("/nonexistent/show.yaml")),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_template_round_trips() {
        let yaml = Show::template().to_yaml().unwrap();
        let show = Show::from_yaml(&yaml).unwrap();

        let registry = show.registry().unwrap();
        let fixtures = show.fixtures(&registry).unwrap();
        assert_eq!(fixtures.len(), 4);
        assert_eq!(fixtures[2].side, Some(Side::Left));
        assert!(show.look().is_some());
    }
}
