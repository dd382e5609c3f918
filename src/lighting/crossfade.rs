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

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ParseError;
use super::types::{Channel, ChannelMap};

/// Easing curves applied to transition progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    Linear,
    EaseIn,
    EaseOut,
    #[default]
    EaseInOutCubic,
}

impl Easing {
    /// Maps linear progress in [0, 1] to eased progress in [0, 1].
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t * t,
            Easing::EaseOut => 1.0 - (1.0 - t).powi(3),
            Easing::EaseInOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}

impl fmt::Display for Easing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Easing::Linear => "linear",
            Easing::EaseIn => "ease-in",
            Easing::EaseOut => "ease-out",
            Easing::EaseInOutCubic => "ease-in-out-cubic",
        })
    }
}

impl FromStr for Easing {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "linear" => Ok(Easing::Linear),
            "ease-in" => Ok(Easing::EaseIn),
            "ease-out" => Ok(Easing::EaseOut),
            "ease-in-out" | "ease-in-out-cubic" => Ok(Easing::EaseInOutCubic),
            _ => Err(ParseError::new("easing", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPhase {
    Pending,
    InProgress,
    Complete,
}

/// A single in-flight interpolation for one fixture channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub from: f64,
    pub to: f64,
    pub start: Instant,
    pub duration: Duration,
    pub phase: TransitionPhase,
    pub progress: f64,
}

impl Transition {
    fn linear_progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    fn value_at(&self, eased: f64) -> f64 {
        self.from + (self.to - self.from) * eased
    }
}

/// Tracks transitions per (fixture, channel) and interpolates them on demand.
pub struct CrossfadeEngine {
    transitions: HashMap<String, ChannelMap<Option<Transition>>>,
    default_duration: Duration,
    easing: Easing,
}

impl CrossfadeEngine {
    pub fn new(default_duration: Duration, easing: Easing) -> CrossfadeEngine {
        CrossfadeEngine {
            transitions: HashMap::new(),
            default_duration,
            easing,
        }
    }

    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    pub fn set_default_duration(&mut self, duration: Duration) {
        self.default_duration = duration;
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    pub fn set_easing(&mut self, easing: Easing) {
        self.easing = easing;
    }

    /// Starts a transition from `from` to `to`. If one is already running for
    /// the same channel, its current interpolated value becomes the new start.
    /// A zero duration completes immediately and leaves nothing behind.
    pub fn start_transition(
        &mut self,
        fixture: &str,
        channel: Channel,
        from: f64,
        to: f64,
        duration: Option<Duration>,
        now: Instant,
    ) {
        let duration = duration.unwrap_or(self.default_duration);
        let easing = self.easing;

        let from = match self.transition(fixture, channel) {
            Some(running) => running.value_at(easing.apply(running.linear_progress(now))),
            None => from,
        };

        if duration.is_zero() {
            self.cancel(fixture, channel);
            return;
        }

        debug!(
            fixture,
            channel = channel.name(),
            from,
            to,
            duration_ms = duration.as_millis() as u64,
            "Starting transition"
        );

        let slots = self
            .transitions
            .entry(fixture.to_string())
            .or_insert_with(|| ChannelMap::filled(None));
        slots[channel] = Some(Transition {
            from,
            to,
            start: now,
            duration,
            phase: TransitionPhase::Pending,
            progress: 0.0,
        });
    }

    /// Advances the transition for this channel, re-targeting it at `live_target`.
    /// Returns `None` when no transition is running. A transition that has reached
    /// the end is removed and reports the live target.
    pub fn get_current_value(
        &mut self,
        fixture: &str,
        channel: Channel,
        live_target: f64,
        now: Instant,
    ) -> Option<f64> {
        let easing = self.easing;
        let slots = self.transitions.get_mut(fixture)?;
        let transition = slots[channel].as_mut()?;

        transition.to = live_target;
        let progress = transition.linear_progress(now);
        transition.progress = progress;

        if progress >= 1.0 {
            transition.phase = TransitionPhase::Complete;
            slots[channel] = None;
            if slots.iter().all(|(_, slot)| slot.is_none()) {
                self.transitions.remove(fixture);
            }
            return Some(live_target);
        }

        transition.phase = if progress > 0.0 {
            TransitionPhase::InProgress
        } else {
            TransitionPhase::Pending
        };
        Some(transition.value_at(easing.apply(progress)))
    }

    pub fn is_transitioning(&self, fixture: &str, channel: Channel) -> bool {
        self.transition(fixture, channel).is_some()
    }

    pub fn transition(&self, fixture: &str, channel: Channel) -> Option<&Transition> {
        self.transitions
            .get(fixture)
            .and_then(|slots| slots[channel].as_ref())
    }

    /// Mean linear progress across the fixture's running transitions.
    pub fn fixture_progress(&self, fixture: &str) -> Option<f64> {
        let slots = self.transitions.get(fixture)?;
        let (count, total) = slots
            .iter()
            .filter_map(|(_, slot)| slot.map(|t| t.progress))
            .fold((0usize, 0.0), |(count, total), p| (count + 1, total + p));
        if count == 0 {
            None
        } else {
            Some(total / count as f64)
        }
    }

    pub fn cancel(&mut self, fixture: &str, channel: Channel) {
        if let Some(slots) = self.transitions.get_mut(fixture) {
            slots[channel] = None;
            if slots.iter().all(|(_, slot)| slot.is_none()) {
                self.transitions.remove(fixture);
            }
        }
    }

    pub fn cancel_all_for_fixture(&mut self, fixture: &str) {
        self.transitions.remove(fixture);
    }

    pub fn clear_all(&mut self) {
        self.transitions.clear();
    }

    /// Drops transitions for fixtures `keep` rejects.
    pub fn retain_fixtures(&mut self, keep: impl Fn(&str) -> bool) {
        self.transitions.retain(|fixture, _| keep(fixture));
    }

    pub fn active_count(&self) -> usize {
        self.transitions
            .values()
            .map(|slots| slots.iter().filter(|(_, slot)| slot.is_some()).count())
            .sum()
    }
}

impl Default for CrossfadeEngine {
    fn default() -> Self {
        CrossfadeEngine::new(Duration::from_millis(500), Easing::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_engine() -> CrossfadeEngine {
        CrossfadeEngine::new(Duration::from_millis(1000), Easing::Linear)
    }

    #[test]
    fn test_easing_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::EaseIn,
            Easing::EaseOut,
            Easing::EaseInOutCubic,
        ] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-12);
            assert_eq!(easing.apply(-1.0), 0.0);
            assert!((easing.apply(2.0) - 1.0).abs() < 1e-12);
        }
        assert!((Easing::EaseInOutCubic.apply(0.5) - 0.5).abs() < 1e-12);
        assert!(Easing::EaseIn.apply(0.5) < 0.5);
        assert!(Easing::EaseOut.apply(0.5) > 0.5);
    }

    #[test]
    fn test_linear_midpoint_and_completion() {
        let mut engine = linear_engine();
        let start = Instant::now();
        engine.start_transition("par-1", Channel::Dimmer, 200.0, 0.0, None, start);
        assert!(engine.is_transitioning("par-1", Channel::Dimmer));

        let mid = engine
            .get_current_value(
                "par-1",
                Channel::Dimmer,
                0.0,
                start + Duration::from_millis(500),
            )
            .unwrap();
        assert!((mid - 100.0).abs() < 0.01);

        let end = engine
            .get_current_value(
                "par-1",
                Channel::Dimmer,
                40.0,
                start + Duration::from_millis(1000),
            )
            .unwrap();
        assert_eq!(end, 40.0);
        assert!(!engine.is_transitioning("par-1", Channel::Dimmer));
        assert_eq!(engine.active_count(), 0);
        assert!(engine
            .get_current_value("par-1", Channel::Dimmer, 40.0, start)
            .is_none());
    }

    #[test]
    fn test_retargets_to_live_value() {
        let mut engine = linear_engine();
        let start = Instant::now();
        engine.start_transition("mover", Channel::Pan, 0.0, 100.0, None, start);

        let value = engine
            .get_current_value(
                "mover",
                Channel::Pan,
                200.0,
                start + Duration::from_millis(500),
            )
            .unwrap();
        assert!((value - 100.0).abs() < 0.01);
        assert_eq!(engine.transition("mover", Channel::Pan).unwrap().to, 200.0);
    }

    #[test]
    fn test_restart_carries_current_value() {
        let mut engine = linear_engine();
        let start = Instant::now();
        engine.start_transition("par-1", Channel::Red, 0.0, 200.0, None, start);

        let later = start + Duration::from_millis(250);
        engine.start_transition("par-1", Channel::Red, 255.0, 0.0, None, later);

        let transition = engine.transition("par-1", Channel::Red).unwrap();
        assert!((transition.from - 50.0).abs() < 0.01);
        assert_eq!(transition.start, later);
    }

    #[test]
    fn test_progress_clamped_when_clock_goes_backwards() {
        let mut engine = linear_engine();
        let start = Instant::now() + Duration::from_secs(5);
        engine.start_transition("par-1", Channel::Dimmer, 10.0, 90.0, None, start);

        let value = engine
            .get_current_value("par-1", Channel::Dimmer, 90.0, Instant::now())
            .unwrap();
        assert_eq!(value, 10.0);
        let transition = engine.transition("par-1", Channel::Dimmer).unwrap();
        assert_eq!(transition.progress, 0.0);
        assert_eq!(transition.phase, TransitionPhase::Pending);
    }

    #[test]
    fn test_zero_duration_completes_immediately() {
        let mut engine = linear_engine();
        let now = Instant::now();
        engine.start_transition(
            "par-1",
            Channel::Dimmer,
            255.0,
            0.0,
            Some(Duration::ZERO),
            now,
        );
        assert!(!engine.is_transitioning("par-1", Channel::Dimmer));
    }

    #[test]
    fn test_eased_values_stay_in_range() {
        let mut engine = CrossfadeEngine::default();
        let start = Instant::now();
        engine.start_transition("par-1", Channel::Dimmer, 30.0, 220.0, None, start);
        for ms in (0..500).step_by(25) {
            let value = engine
                .get_current_value(
                    "par-1",
                    Channel::Dimmer,
                    220.0,
                    start + Duration::from_millis(ms),
                )
                .unwrap();
            assert!((30.0..=220.0).contains(&value), "value {} out of range", value);
        }
    }

    #[test]
    fn test_cancel_variants() {
        let mut engine = linear_engine();
        let now = Instant::now();
        engine.start_transition("a", Channel::Pan, 0.0, 1.0, None, now);
        engine.start_transition("a", Channel::Tilt, 0.0, 1.0, None, now);
        engine.start_transition("b", Channel::Pan, 0.0, 1.0, None, now);
        assert_eq!(engine.active_count(), 3);

        engine.cancel("a", Channel::Pan);
        assert_eq!(engine.active_count(), 2);

        engine.cancel_all_for_fixture("a");
        assert_eq!(engine.active_count(), 1);

        engine.clear_all();
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_easing_parsing() {
        assert_eq!("linear".parse::<Easing>().unwrap(), Easing::Linear);
        assert_eq!("ease_in".parse::<Easing>().unwrap(), Easing::EaseIn);
        assert_eq!(
            "ease-in-out-cubic".parse::<Easing>().unwrap(),
            Easing::EaseInOutCubic
        );
        assert!("bounce".parse::<Easing>().is_err());
    }
}
