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

use crate::lighting::arbiter::{
    ArbiterConfig, DEFAULT_CROSSFADE, DEFAULT_IDLE_PULSE_PERIOD, DEFAULT_MAX_ACTIVE_EFFECTS,
    DEFAULT_MAX_MANUAL_OVERRIDES,
};
use crate::lighting::crossfade::Easing;

use super::error::ConfigError;

/// A YAML representation of the arbiter settings.
#[derive(Deserialize, Serialize, Clone, Default)]
pub struct Arbiter {
    /// How long AI driven changes take to fade in.
    default_crossfade: Option<String>,

    /// How many fixtures may hold a manual override at once.
    max_manual_overrides: Option<usize>,

    /// How many effects may run at once. The oldest is evicted past this.
    max_active_effects: Option<usize>,

    /// Whether the consciousness layer accepts input.
    consciousness_enabled: Option<bool>,

    /// The fade curve: linear, ease-in, ease-out or ease-in-out-cubic.
    easing: Option<String>,

    /// One breath of the idle pulse.
    idle_pulse_period: Option<String>,
}

impl Arbiter {
    /// Gets the default crossfade.
    pub fn default_crossfade(&self) -> Result<Duration, duration_string::Error> {
        self.default_crossfade
            .as_ref()
            .map_or(Ok(DEFAULT_CROSSFADE), |duration| {
                Ok(DurationString::from_string(duration.clone())?.into())
            })
    }

    /// Gets the idle pulse period.
    pub fn idle_pulse_period(&self) -> Result<Duration, duration_string::Error> {
        self.idle_pulse_period
            .as_ref()
            .map_or(Ok(DEFAULT_IDLE_PULSE_PERIOD), |duration| {
                Ok(DurationString::from_string(duration.clone())?.into())
            })
    }

    pub fn easing(&self) -> Result<Easing, ConfigError> {
        match &self.easing {
            Some(easing) => Ok(easing.parse()?),
            None => Ok(Easing::default()),
        }
    }

    /// Resolves everything into runtime settings.
    pub fn to_config(&self) -> Result<ArbiterConfig, ConfigError> {
        let idle_pulse_period = self.idle_pulse_period()?;
        if idle_pulse_period.is_zero() {
            return Err(ConfigError::Invalid {
                field: "idle_pulse_period",
                reason: "must be longer than zero".to_string(),
            });
        }

        Ok(ArbiterConfig {
            default_crossfade: self.default_crossfade()?,
            max_manual_overrides: self
                .max_manual_overrides
                .unwrap_or(DEFAULT_MAX_MANUAL_OVERRIDES),
            max_active_effects: self
                .max_active_effects
                .unwrap_or(DEFAULT_MAX_ACTIVE_EFFECTS),
            consciousness_enabled: self.consciousness_enabled.unwrap_or(false),
            easing: self.easing()?,
            idle_pulse_period,
        })
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Arbiter {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Arbiter::default().to_config().unwrap();
        assert_eq!(config, ArbiterConfig::default());
    }

    #[test]
    fn test_full() {
        let arbiter = parse(
            r#"
            default_crossfade: 250ms
            max_manual_overrides: 4
            max_active_effects: 2
            consciousness_enabled: true
            easing: linear
            idle_pulse_period: 2s
        "#,
        );

        let config = arbiter.to_config().unwrap();
        assert_eq!(config.default_crossfade, Duration::from_millis(250));
        assert_eq!(config.max_manual_overrides, 4);
        assert_eq!(config.max_active_effects, 2);
        assert!(config.consciousness_enabled);
        assert_eq!(config.easing, Easing::Linear);
        assert_eq!(config.idle_pulse_period, Duration::from_secs(2));
    }

    #[test]
    fn test_bad_values() {
        assert!(matches!(
            parse("default_crossfade: soon").to_config(),
            Err(ConfigError::Duration(_))
        ));
        assert!(matches!(
            parse("easing: bouncy").to_config(),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            parse("idle_pulse_period: 0s").to_config(),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
