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

use crate::hal::safety::{
    SafetyConfig, DEFAULT_CHAOS_THRESHOLD, DEFAULT_LATCH_DURATION, DEFAULT_SAFETY_MARGIN,
    DEFAULT_STROBE_DELEGATION_THRESHOLD,
};

use super::error::ConfigError;

/// A YAML representation of the hardware safety settings.
#[derive(Deserialize, Serialize, Clone, Default)]
pub struct Safety {
    /// Multiplier on each profile's minimum color change time.
    safety_margin: Option<f64>,

    /// Requested color changes per second that count as chaos.
    chaos_threshold: Option<f64>,

    /// How long a chaotic fixture is frozen.
    latch_duration: Option<String>,

    /// Blocked changes during a latch before the shutter takes over.
    strobe_delegation_threshold: Option<u32>,
}

impl Safety {
    /// Gets the latch duration.
    pub fn latch_duration(&self) -> Result<Duration, duration_string::Error> {
        self.latch_duration
            .as_ref()
            .map_or(Ok(DEFAULT_LATCH_DURATION), |duration| {
                Ok(DurationString::from_string(duration.clone())?.into())
            })
    }

    pub fn to_config(&self) -> Result<SafetyConfig, ConfigError> {
        let safety_margin = self.safety_margin.unwrap_or(DEFAULT_SAFETY_MARGIN);
        if !safety_margin.is_finite() || safety_margin < 1.0 {
            return Err(ConfigError::Invalid {
                field: "safety_margin",
                reason: format!("{} is below 1.0", safety_margin),
            });
        }

        let chaos_threshold = self.chaos_threshold.unwrap_or(DEFAULT_CHAOS_THRESHOLD);
        if !chaos_threshold.is_finite() || chaos_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "chaos_threshold",
                reason: format!("{} is not a positive rate", chaos_threshold),
            });
        }

        Ok(SafetyConfig {
            safety_margin,
            chaos_threshold,
            latch_duration: self.latch_duration()?,
            strobe_delegation_threshold: self
                .strobe_delegation_threshold
                .unwrap_or(DEFAULT_STROBE_DELEGATION_THRESHOLD),
        })
    }
}
