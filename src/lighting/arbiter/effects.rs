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
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::lighting::error::ParseError;
use crate::lighting::types::{Channel, ChannelMap, DMX_MAX};

pub const DEFAULT_STROBE_HZ: f64 = 10.0;
pub const DEFAULT_PULSE_HZ: f64 = 1.0;
pub const DEFAULT_FLASH_DURATION: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Strobe,
    Blinder,
    Flash,
    Pulse,
    /// Only raises the global freeze flag. Downstream decides what freezing means.
    Freeze,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EffectKind::Strobe => "strobe",
            EffectKind::Blinder => "blinder",
            EffectKind::Flash => "flash",
            EffectKind::Pulse => "pulse",
            EffectKind::Freeze => "freeze",
        })
    }
}

impl FromStr for EffectKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strobe" => Ok(EffectKind::Strobe),
            "blinder" => Ok(EffectKind::Blinder),
            "flash" => Ok(EffectKind::Flash),
            "pulse" => Ok(EffectKind::Pulse),
            "freeze" => Ok(EffectKind::Freeze),
            _ => Err(ParseError::new("effect", s)),
        }
    }
}

/// An effect request for the effects layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub kind: EffectKind,
    /// 0..1
    pub intensity: f64,
    /// Rate in Hz for strobe and pulse.
    pub speed: Option<f64>,
    /// Effects without a duration run until removed, except flash.
    pub duration: Option<Duration>,
    /// Target fixtures. Empty means every fixture.
    pub fixtures: Vec<String>,
}

impl Effect {
    pub fn new(kind: EffectKind) -> Effect {
        Effect {
            kind,
            intensity: 1.0,
            speed: None,
            duration: None,
            fixtures: Vec::new(),
        }
    }

    pub fn with_intensity(mut self, intensity: f64) -> Effect {
        self.intensity = intensity;
        self
    }

    pub fn with_speed(mut self, hz: f64) -> Effect {
        self.speed = Some(hz);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Effect {
        self.duration = Some(duration);
        self
    }

    pub fn with_fixtures(mut self, fixtures: &[&str]) -> Effect {
        self.fixtures = fixtures.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Checks intensity and speed. Speed must be finite and not negative.
    pub fn validate(&self) -> Result<(), String> {
        if !self.intensity.is_finite() {
            return Err("intensity is not finite".to_string());
        }
        match self.speed {
            Some(hz) if !hz.is_finite() || hz < 0.0 => {
                Err(format!("speed {} is not a usable rate", hz))
            }
            _ => Ok(()),
        }
    }

    /// How long the effect lives. Flash always decays to nothing.
    pub fn lifetime(&self) -> Option<Duration> {
        match self.kind {
            EffectKind::Flash => Some(self.duration.unwrap_or(DEFAULT_FLASH_DURATION)),
            _ => self.duration,
        }
    }
}

/// An effect that is running.
#[derive(Debug, Clone)]
pub(crate) struct ActiveEffect {
    pub(crate) id: u64,
    pub(crate) effect: Effect,
    pub(crate) started: Instant,
}

impl ActiveEffect {
    pub(crate) fn targets(&self, fixture: &str) -> bool {
        self.effect.fixtures.is_empty() || self.effect.fixtures.iter().any(|f| f == fixture)
    }

    pub(crate) fn expired(&self, now: Instant) -> bool {
        self.effect
            .lifetime()
            .is_some_and(|lifetime| now.saturating_duration_since(self.started) >= lifetime)
    }

    /// Writes this effect's channel contributions into `out`. Where several
    /// effects touch the same channel the highest value is kept.
    pub(crate) fn contribute(&self, now: Instant, out: &mut ChannelMap<Option<f64>>) {
        let intensity = self.effect.intensity.clamp(0.0, 1.0);
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();

        let mut put = |channel: Channel, value: f64| {
            let slot = &mut out[channel];
            *slot = Some(slot.map_or(value, |existing| existing.max(value)));
        };

        match self.effect.kind {
            EffectKind::Strobe => {
                let hz = self.effect.speed.unwrap_or(DEFAULT_STROBE_HZ).max(0.01);
                let period = 1.0 / hz;
                let on = elapsed % period < period / 2.0;
                put(Channel::Dimmer, if on { DMX_MAX * intensity } else { 0.0 });
            }
            EffectKind::Blinder => {
                put(Channel::Dimmer, DMX_MAX * intensity);
                put(Channel::Red, DMX_MAX);
                put(Channel::Green, DMX_MAX);
                put(Channel::Blue, DMX_MAX);
            }
            EffectKind::Flash => {
                let lifetime = self.effect.lifetime().unwrap_or(DEFAULT_FLASH_DURATION);
                let progress = (elapsed / lifetime.as_secs_f64().max(0.001)).clamp(0.0, 1.0);
                put(Channel::Dimmer, DMX_MAX * intensity * (1.0 - progress));
            }
            EffectKind::Pulse => {
                let hz = self.effect.speed.unwrap_or(DEFAULT_PULSE_HZ).max(0.01);
                let wave = 0.5 + 0.5 * (TAU * hz * elapsed).sin();
                put(Channel::Dimmer, DMX_MAX * intensity * wave);
            }
            EffectKind::Freeze => {}
        }
    }
}
