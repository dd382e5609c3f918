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

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::lighting::error::ArbiterError;
use crate::lighting::types::{clamp_dmx, Channel, ChannelMap, ChannelSet};

/// Which fixtures a manual submission applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureSelector {
    Fixture(String),
    /// Every currently registered fixture.
    All,
}

/// Whether submitted values replace the base value or are added to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    #[default]
    Absolute,
    Relative,
}

/// A manual override submission from an operator surface.
#[derive(Debug, Clone)]
pub struct ManualOverride {
    pub target: FixtureSelector,
    pub values: ChannelMap<Option<f64>>,
    /// Channels this submission takes ownership of. Unclaimed channels pass
    /// through to lower layers even if a value is present for them.
    pub channels: ChannelSet,
    pub mode: OverrideMode,
    pub source: String,
    pub priority: u8,
    pub auto_release: Option<Duration>,
    pub release_transition: Option<Duration>,
}

impl ManualOverride {
    pub fn fixture(id: &str) -> ManualOverride {
        ManualOverride::new(FixtureSelector::Fixture(id.to_string()))
    }

    pub fn all() -> ManualOverride {
        ManualOverride::new(FixtureSelector::All)
    }

    fn new(target: FixtureSelector) -> ManualOverride {
        ManualOverride {
            target,
            values: ChannelMap::filled(None),
            channels: ChannelSet::EMPTY,
            mode: OverrideMode::Absolute,
            source: "operator".to_string(),
            priority: 0,
            auto_release: None,
            release_transition: None,
        }
    }

    /// Sets and claims a channel.
    pub fn set(mut self, channel: Channel, value: f64) -> ManualOverride {
        self.values[channel] = Some(value);
        self.channels.insert(channel);
        self
    }

    /// Claims a channel without setting a value. Validation rejects the
    /// submission unless a value is also provided.
    pub fn claim(mut self, channel: Channel) -> ManualOverride {
        self.channels.insert(channel);
        self
    }

    pub fn relative(mut self) -> ManualOverride {
        self.mode = OverrideMode::Relative;
        self
    }

    pub fn source(mut self, source: &str) -> ManualOverride {
        self.source = source.to_string();
        self
    }

    pub fn priority(mut self, priority: u8) -> ManualOverride {
        self.priority = priority;
        self
    }

    pub fn auto_release(mut self, after: Duration) -> ManualOverride {
        self.auto_release = Some(after);
        self
    }

    pub fn release_transition(mut self, duration: Duration) -> ManualOverride {
        self.release_transition = Some(duration);
        self
    }

    pub(crate) fn validate(&self, fixture: &str) -> Result<(), ArbiterError> {
        if self.channels.is_empty() {
            return Err(ArbiterError::invalid(fixture, "no channels claimed"));
        }
        for channel in self.channels.iter() {
            match self.values[channel] {
                None => return Err(ArbiterError::missing_value(fixture, channel)),
                Some(value) if !value.is_finite() => {
                    return Err(ArbiterError::invalid(
                        fixture,
                        &format!("channel {} has a non-finite value", channel),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// The override currently held for a single fixture.
#[derive(Debug, Clone)]
pub(crate) struct ManualRecord {
    values: ChannelMap<Option<f64>>,
    channels: ChannelSet,
    relative: ChannelSet,
    pub(crate) source: String,
    pub(crate) priority: u8,
    pub(crate) auto_release: Option<Duration>,
    pub(crate) release_transition: Option<Duration>,
    pub(crate) updated: Instant,
}

impl ManualRecord {
    pub(crate) fn from_submission(submission: &ManualOverride, now: Instant) -> ManualRecord {
        let mut record = ManualRecord {
            values: ChannelMap::filled(None),
            channels: ChannelSet::EMPTY,
            relative: ChannelSet::EMPTY,
            source: submission.source.clone(),
            priority: submission.priority,
            auto_release: submission.auto_release,
            release_transition: submission.release_transition,
            updated: now,
        };
        record.merge(submission, now);
        record
    }

    /// Folds a newer submission in. Claimed channels are unioned and the newer
    /// values win on conflict.
    pub(crate) fn merge(&mut self, submission: &ManualOverride, now: Instant) {
        for channel in submission.channels.iter() {
            self.values[channel] = submission.values[channel];
            self.channels.insert(channel);
            match submission.mode {
                OverrideMode::Relative => self.relative.insert(channel),
                OverrideMode::Absolute => self.relative.remove(channel),
            }
        }
        self.source = submission.source.clone();
        self.priority = self.priority.max(submission.priority);
        if submission.auto_release.is_some() {
            self.auto_release = submission.auto_release;
        }
        if submission.release_transition.is_some() {
            self.release_transition = submission.release_transition;
        }
        self.updated = now;
    }

    pub(crate) fn channels(&self) -> ChannelSet {
        self.channels
    }

    pub(crate) fn claims(&self, channel: Channel) -> bool {
        self.channels.contains(channel)
    }

    /// The absolute value this record drives a channel to, given the base value
    /// underneath it. Returns `None` for unclaimed channels.
    pub(crate) fn resolve(&self, channel: Channel, base: f64) -> Option<f64> {
        if !self.claims(channel) {
            return None;
        }
        let value = self.values[channel]?;
        if self.relative.contains(channel) {
            Some(clamp_dmx(base + value))
        } else {
            Some(clamp_dmx(value))
        }
    }

    /// Drops the given channels. Returns the channels that were actually held.
    pub(crate) fn release(&mut self, channels: ChannelSet) -> ChannelSet {
        let released = self.channels.intersection(channels);
        for channel in released.iter() {
            self.values[channel] = None;
            self.channels.remove(channel);
            self.relative.remove(channel);
        }
        released
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub(crate) fn expired(&self, now: Instant) -> bool {
        self.auto_release
            .is_some_and(|after| now.saturating_duration_since(self.updated) >= after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(ManualOverride::fixture("a").validate("a").is_err());
        assert!(ManualOverride::fixture("a")
            .claim(Channel::Pan)
            .validate("a")
            .is_err());
        assert!(ManualOverride::fixture("a")
            .set(Channel::Pan, f64::NAN)
            .validate("a")
            .is_err());
        assert!(ManualOverride::fixture("a")
            .set(Channel::Pan, 10.0)
            .validate("a")
            .is_ok());
    }

    #[test]
    fn test_merge_unions_channels() {
        let now = Instant::now();
        let color = ManualOverride::fixture("a")
            .set(Channel::Red, 255.0)
            .set(Channel::Green, 10.0)
            .priority(3);
        let position = ManualOverride::fixture("a")
            .set(Channel::Pan, 40.0)
            .set(Channel::Green, 99.0)
            .priority(1);

        let mut record = ManualRecord::from_submission(&color, now);
        record.merge(&position, now);

        assert_eq!(record.channels().len(), 3);
        assert_eq!(record.resolve(Channel::Red, 0.0), Some(255.0));
        assert_eq!(record.resolve(Channel::Green, 0.0), Some(99.0));
        assert_eq!(record.resolve(Channel::Pan, 0.0), Some(40.0));
        assert_eq!(record.priority, 3);
    }

    #[test]
    fn test_relative_values_add_to_base() {
        let now = Instant::now();
        let nudge = ManualOverride::fixture("a")
            .set(Channel::Pan, 20.0)
            .relative();
        let record = ManualRecord::from_submission(&nudge, now);
        assert_eq!(record.resolve(Channel::Pan, 100.0), Some(120.0));
        assert_eq!(record.resolve(Channel::Pan, 250.0), Some(255.0));
        assert_eq!(record.resolve(Channel::Tilt, 100.0), None);
    }

    #[test]
    fn test_release_and_expiry() {
        let now = Instant::now();
        let submission = ManualOverride::fixture("a")
            .set(Channel::Dimmer, 200.0)
            .set(Channel::Pan, 10.0)
            .auto_release(Duration::from_secs(2));
        let mut record = ManualRecord::from_submission(&submission, now);

        let released = record.release(ChannelSet::from([Channel::Pan, Channel::Tilt]));
        assert_eq!(released, ChannelSet::from([Channel::Pan]));
        assert!(!record.is_empty());
        assert!(!record.expired(now + Duration::from_secs(1)));
        assert!(record.expired(now + Duration::from_secs(2)));
    }
}
