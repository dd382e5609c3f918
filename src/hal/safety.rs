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

//! Rate protection for fixtures whose color changes move physical parts.
//!
//! A wheel fixture asked to change color faster than its mechanism allows is held
//! at its previous slot (debounce). When requests keep arriving faster than the
//! chaos threshold the fixture is latched on its last good color for a while, and
//! if it keeps being asked to change during the latch the energy is handed to the
//! shutter as a strobe instead.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;

use super::profiles::FixtureProfile;

pub const DEFAULT_SAFETY_MARGIN: f64 = 1.2;
pub const DEFAULT_CHAOS_THRESHOLD: f64 = 3.0;
pub const DEFAULT_LATCH_DURATION: Duration = Duration::from_secs(2);
pub const DEFAULT_STROBE_DELEGATION_THRESHOLD: u32 = 10;

/// Fully open shutter.
pub const SHUTTER_OPEN: u8 = 255;

const RATE_WINDOW: Duration = Duration::from_secs(1);
const HISTORY_WINDOW: Duration = Duration::from_secs(2);

/// Blocked changes at which strobe intensity saturates.
const STROBE_SATURATION: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyConfig {
    /// Multiplier applied to each profile's minimum change time.
    pub safety_margin: f64,
    /// Requested changes per second above which a fixture is latched.
    pub chaos_threshold: f64,
    pub latch_duration: Duration,
    /// Blocked changes during a latch after which strobing takes over.
    pub strobe_delegation_threshold: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyConfig {
            safety_margin: DEFAULT_SAFETY_MARGIN,
            chaos_threshold: DEFAULT_CHAOS_THRESHOLD,
            latch_duration: DEFAULT_LATCH_DURATION,
            strobe_delegation_threshold: DEFAULT_STROBE_DELEGATION_THRESHOLD,
        }
    }
}

/// Why a color change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    Latch { remaining: Duration },
    Chaos { changes_per_second: usize },
    Debounce { elapsed: Duration, minimum: Duration },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Latch { remaining } => {
                write!(f, "latch active ({}ms remaining)", remaining.as_millis())
            }
            BlockReason::Chaos { changes_per_second } => {
                write!(f, "chaos ({} changes/sec)", changes_per_second)
            }
            BlockReason::Debounce { elapsed, minimum } => write!(
                f,
                "debounce ({}ms < {}ms)",
                elapsed.as_millis(),
                minimum.as_millis()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FilterResult {
    /// The color value to actually send.
    pub final_color: u8,
    pub blocked: bool,
    pub latched: bool,
    pub block_reason: Option<BlockReason>,
    pub suggested_shutter: u8,
    pub delegate_to_strobe: bool,
}

impl FilterResult {
    fn pass(color: u8) -> FilterResult {
        FilterResult {
            final_color: color,
            blocked: false,
            latched: false,
            block_reason: None,
            suggested_shutter: SHUTTER_OPEN,
            delegate_to_strobe: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SafetyMetrics {
    pub total_blocked_changes: u64,
    pub total_latch_activations: u64,
    pub total_strobe_delegations: u64,
    pub active_fixtures: usize,
    pub fixtures_in_latch: usize,
}

#[derive(Debug)]
struct FixtureState {
    last_color: u8,
    last_change: Instant,
    latched: bool,
    latched_color: u8,
    latch_start: Instant,
    blocked_changes: u32,
    delegating: bool,
    last_dimmer: u8,
    /// Times at which a different color was requested.
    recent_changes: VecDeque<Instant>,
}

impl FixtureState {
    fn new(color: u8, now: Instant) -> FixtureState {
        FixtureState {
            last_color: color,
            last_change: now,
            latched: false,
            latched_color: color,
            latch_start: now,
            blocked_changes: 0,
            delegating: false,
            last_dimmer: 0,
            recent_changes: VecDeque::new(),
        }
    }

    fn record_request(&mut self, requested: u8, now: Instant) {
        if requested != self.last_color {
            self.recent_changes.push_back(now);
        }
        while let Some(oldest) = self.recent_changes.front() {
            if now.saturating_duration_since(*oldest) >= HISTORY_WINDOW {
                self.recent_changes.pop_front();
            } else {
                break;
            }
        }
    }

    fn changes_per_second(&self, now: Instant) -> usize {
        self.recent_changes
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < RATE_WINDOW)
            .count()
    }
}

pub struct SafetyLayer {
    config: SafetyConfig,
    clock: Arc<dyn Clock>,
    fixtures: HashMap<String, FixtureState>,
    total_blocked_changes: u64,
    total_latch_activations: u64,
    total_strobe_delegations: u64,
}

impl SafetyLayer {
    pub fn new(config: SafetyConfig, clock: Arc<dyn Clock>) -> SafetyLayer {
        info!(
            safety_margin = config.safety_margin,
            chaos_threshold = config.chaos_threshold,
            latch_ms = config.latch_duration.as_millis() as u64,
            "Hardware safety layer initialized"
        );
        SafetyLayer {
            config,
            clock,
            fixtures: HashMap::new(),
            total_blocked_changes: 0,
            total_latch_activations: 0,
            total_strobe_delegations: 0,
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SafetyConfig) {
        self.config = config;
    }

    /// Filters a requested wheel value for a fixture. Fixtures without a profile or
    /// with continuous color mixing pass through unchanged.
    pub fn filter(
        &mut self,
        fixture_id: &str,
        requested: u8,
        profile: Option<&FixtureProfile>,
        current_dimmer: u8,
    ) -> FilterResult {
        let profile = match profile {
            Some(profile) if profile.is_mechanical() => profile,
            _ => return FilterResult::pass(requested),
        };

        let now = self.clock.now();
        let config = self.config;
        let state = self
            .fixtures
            .entry(fixture_id.to_string())
            .or_insert_with(|| FixtureState::new(requested, now));

        state.record_request(requested, now);
        state.last_dimmer = current_dimmer;

        if state.latched {
            let elapsed = now.saturating_duration_since(state.latch_start);
            if elapsed < config.latch_duration {
                state.blocked_changes += 1;
                self.total_blocked_changes += 1;

                let delegate = current_dimmer > 0
                    && state.blocked_changes > config.strobe_delegation_threshold;
                if delegate && !state.delegating {
                    self.total_strobe_delegations += 1;
                    debug!(
                        fixture = fixture_id,
                        blocked = state.blocked_changes,
                        "Delegating color energy to strobe"
                    );
                }
                state.delegating = delegate;

                return FilterResult {
                    final_color: state.latched_color,
                    blocked: true,
                    latched: true,
                    block_reason: Some(BlockReason::Latch {
                        remaining: config.latch_duration - elapsed,
                    }),
                    suggested_shutter: if delegate {
                        strobe_shutter(state.blocked_changes)
                    } else {
                        SHUTTER_OPEN
                    },
                    delegate_to_strobe: delegate,
                };
            }

            state.latched = false;
            state.delegating = false;
            state.blocked_changes = 0;
            debug!(fixture = fixture_id, "Latch released");
        }

        let rate = state.changes_per_second(now);
        if rate as f64 > config.chaos_threshold {
            state.latched = true;
            state.latched_color = state.last_color;
            state.latch_start = now;
            state.blocked_changes = 0;
            self.total_latch_activations += 1;
            debug!(
                fixture = fixture_id,
                changes_per_second = rate,
                holding = state.latched_color,
                "Chaos detected, latching color"
            );

            return FilterResult {
                final_color: state.latched_color,
                blocked: true,
                latched: true,
                block_reason: Some(BlockReason::Chaos {
                    changes_per_second: rate,
                }),
                suggested_shutter: SHUTTER_OPEN,
                delegate_to_strobe: false,
            };
        }

        let minimum = profile.min_change_time().mul_f64(config.safety_margin.max(0.0));
        let elapsed = now.saturating_duration_since(state.last_change);
        if requested != state.last_color && elapsed < minimum {
            state.blocked_changes += 1;
            self.total_blocked_changes += 1;
            return FilterResult {
                final_color: state.last_color,
                blocked: true,
                latched: false,
                block_reason: Some(BlockReason::Debounce { elapsed, minimum }),
                suggested_shutter: SHUTTER_OPEN,
                delegate_to_strobe: false,
            };
        }

        if requested != state.last_color {
            state.last_color = requested;
            state.last_change = now;
        }
        FilterResult::pass(requested)
    }

    /// Forgets everything about one fixture.
    pub fn reset_fixture(&mut self, fixture_id: &str) {
        if self.fixtures.remove(fixture_id).is_some() {
            debug!(fixture = fixture_id, "Safety state reset");
        }
    }

    pub fn reset_all(&mut self) {
        self.fixtures.clear();
        info!("Safety state reset for all fixtures");
    }

    /// Counters plus a live snapshot. A latch counts only until its window ends,
    /// even if the fixture has not been filtered since.
    pub fn metrics(&self) -> SafetyMetrics {
        let now = self.clock.now();
        let latch_duration = self.config.latch_duration;
        SafetyMetrics {
            total_blocked_changes: self.total_blocked_changes,
            total_latch_activations: self.total_latch_activations,
            total_strobe_delegations: self.total_strobe_delegations,
            active_fixtures: self.fixtures.len(),
            fixtures_in_latch: self
                .fixtures
                .values()
                .filter(|s| {
                    s.latched && now.saturating_duration_since(s.latch_start) < latch_duration
                })
                .count(),
        }
    }
}

/// Shutter value for a strobe whose speed follows how hard the fixture is being pushed.
fn strobe_shutter(blocked_changes: u32) -> u8 {
    let intensity = (blocked_changes as f64 / STROBE_SATURATION).min(1.0);
    (128.0 + intensity * 127.0).round() as u8
}
