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

//! The control layer arbiter. Five layers propose values for every fixture
//! channel and the arbiter decides, once per frame, who owns each channel.
//!
//! Layers, lowest to highest: AI intent, consciousness, manual, effects and
//! blackout. On top of those sit the output gate (closed at startup), the grand
//! master, procedural movement and the ghost position memory that keeps
//! fixtures from snapping to center whenever output is cut.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::clock::Clock;

use super::crossfade::{CrossfadeEngine, Easing};
use super::error::ArbiterError;
use super::merge::{merge_channel, ChannelValue};
use super::types::{Channel, ChannelMap, ChannelSet, ControlLayer, Fixture};

pub mod effects;
pub mod events;
pub mod intent;
pub mod manual;
pub mod movement;
pub mod output;

#[cfg(test)]
mod tests;

pub use effects::{Effect, EffectKind};
pub use events::ArbiterEvent;
pub use intent::{
    AiIntent, Consciousness, Mechanics, MovementIntent, MovementModifier, Optics, Palette,
    PaletteModifier, PaletteRole, ZoneIntent,
};
pub use manual::{FixtureSelector, ManualOverride, OverrideMode};
pub use movement::{PatternConfig, PatternShape, Position};
pub use output::{ArbiterStatus, FinalLightingTarget, FixtureTarget, GlobalEffects, LayerActivity};

use effects::ActiveEffect;
use events::EventBus;
use intent::BaseValues;
use manual::ManualRecord;
use movement::{ActivePattern, Formation};

pub const DEFAULT_CROSSFADE: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_MANUAL_OVERRIDES: usize = 64;
pub const DEFAULT_MAX_ACTIVE_EFFECTS: usize = 8;
pub const DEFAULT_IDLE_PULSE_PERIOD: Duration = Duration::from_secs(4);

/// Runtime settings for the arbiter.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbiterConfig {
    pub default_crossfade: Duration,
    pub max_manual_overrides: usize,
    pub max_active_effects: usize,
    pub consciousness_enabled: bool,
    pub easing: Easing,
    pub idle_pulse_period: Duration,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        ArbiterConfig {
            default_crossfade: DEFAULT_CROSSFADE,
            max_manual_overrides: DEFAULT_MAX_MANUAL_OVERRIDES,
            max_active_effects: DEFAULT_MAX_ACTIVE_EFFECTS,
            consciousness_enabled: false,
            easing: Easing::default(),
            idle_pulse_period: DEFAULT_IDLE_PULSE_PERIOD,
        }
    }
}

/// Logs and returns a rejection. Nothing has been mutated when this is called.
fn reject<T>(err: ArbiterError) -> Result<T, ArbiterError> {
    warn!(err = %err, "Rejected arbiter call");
    Err(err)
}

/// Owns every layer's state and resolves it into per-fixture targets.
pub struct Arbiter {
    config: ArbiterConfig,
    clock: Arc<dyn Clock>,

    fixtures: Vec<Fixture>,
    fixture_index: HashMap<String, usize>,

    ai: Option<(AiIntent, Instant)>,
    consciousness: Option<(Consciousness, Instant)>,
    manual: HashMap<String, ManualRecord>,
    effects: VecDeque<ActiveEffect>,
    next_effect_id: u64,
    blackout: bool,
    output_enabled: bool,
    grand_master: f64,

    patterns: HashMap<String, ActivePattern>,
    formations: HashMap<String, Formation>,
    /// Last manually set position per fixture.
    origins: HashMap<String, Position>,
    /// Last position actually output per fixture.
    last_known: HashMap<String, Position>,

    crossfade: CrossfadeEngine,
    events: EventBus,
    frame: u64,
    idle_epoch: Instant,
}

impl Arbiter {
    pub fn new(config: ArbiterConfig, clock: Arc<dyn Clock>) -> Arbiter {
        let crossfade = CrossfadeEngine::new(config.default_crossfade, config.easing);
        let idle_epoch = clock.now();
        Arbiter {
            config,
            clock,
            fixtures: Vec::new(),
            fixture_index: HashMap::new(),
            ai: None,
            consciousness: None,
            manual: HashMap::new(),
            effects: VecDeque::new(),
            next_effect_id: 1,
            blackout: false,
            output_enabled: false,
            grand_master: 1.0,
            patterns: HashMap::new(),
            formations: HashMap::new(),
            origins: HashMap::new(),
            last_known: HashMap::new(),
            crossfade,
            events: EventBus::default(),
            frame: 0,
            idle_epoch,
        }
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// Applies new settings. Existing state is kept, except that a disabled
    /// consciousness layer is cleared and surplus effects are evicted.
    pub fn update_config(&mut self, config: ArbiterConfig) {
        self.crossfade.set_default_duration(config.default_crossfade);
        self.crossfade.set_easing(config.easing);
        if !config.consciousness_enabled {
            self.consciousness = None;
        }
        self.config = config;
        while self.effects.len() > self.config.max_active_effects {
            self.evict_oldest_effect();
        }
        info!(config = ?self.config, "Arbiter configuration updated");
    }

    /// Returns a receiver for arbiter events.
    pub fn subscribe(&mut self) -> Receiver<ArbiterEvent> {
        self.events.subscribe()
    }

    // Fixtures

    /// Replaces the registered fixture set. State held for fixtures that are no
    /// longer registered is dropped.
    pub fn set_fixtures(&mut self, fixtures: Vec<Fixture>) {
        let mut index = HashMap::with_capacity(fixtures.len());
        let mut registered = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            if index.contains_key(&fixture.id) {
                warn!(fixture = %fixture.id, "Duplicate fixture id, keeping the first registration");
                continue;
            }
            index.insert(fixture.id.clone(), registered.len());
            registered.push(fixture);
        }
        self.fixtures = registered;
        self.fixture_index = index;

        let known = &self.fixture_index;
        self.manual.retain(|id, _| known.contains_key(id));
        self.patterns.retain(|id, _| known.contains_key(id));
        self.origins.retain(|id, _| known.contains_key(id));
        self.last_known.retain(|id, _| known.contains_key(id));
        self.crossfade.retain_fixtures(|id| known.contains_key(id));
        self.formations.retain(|_, formation| {
            formation.offsets.retain(|(id, _)| known.contains_key(id));
            !formation.offsets.is_empty()
        });

        info!(fixtures = self.fixtures.len(), "Fixtures registered");
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn fixture(&self, id: &str) -> Option<&Fixture> {
        self.fixture_index.get(id).map(|index| &self.fixtures[*index])
    }

    fn require_fixture(&self, id: &str) -> Result<usize, ArbiterError> {
        match self.fixture_index.get(id) {
            Some(index) => Ok(*index),
            None => reject(ArbiterError::UnknownFixture(id.to_string())),
        }
    }

    // Layer 0 and 1

    pub fn set_ai_intent(&mut self, intent: AiIntent) -> Result<(), ArbiterError> {
        if let Err(reason) = intent.validate() {
            return reject(ArbiterError::InvalidPayload {
                layer: ControlLayer::AiIntent,
                reason,
            });
        }
        let now = self.clock.now();
        let vibe_changed = match &self.ai {
            Some((current, _)) => current.vibe != intent.vibe,
            None => true,
        };
        if vibe_changed {
            debug!(vibe = %intent.vibe, "AI intent vibe changed");
        }
        self.ai = Some((intent, now));
        Ok(())
    }

    /// Drops the AI intent. The rig falls back to the idle pulse.
    pub fn clear_ai_intent(&mut self) {
        self.ai = None;
    }

    pub fn set_consciousness(&mut self, consciousness: Consciousness) -> Result<(), ArbiterError> {
        if !self.config.consciousness_enabled {
            return reject(ArbiterError::LayerDisabled(ControlLayer::Consciousness));
        }
        if let Err(reason) = consciousness.validate() {
            return reject(ArbiterError::InvalidPayload {
                layer: ControlLayer::Consciousness,
                reason,
            });
        }
        self.consciousness = Some((consciousness, self.clock.now()));
        Ok(())
    }

    pub fn clear_consciousness(&mut self) {
        self.consciousness = None;
    }

    // Layer 2

    /// Applies a manual override. A submission for a fixture that already has an
    /// override is merged into it. Returns the number of fixtures affected.
    pub fn set_manual_override(&mut self, submission: ManualOverride) -> Result<usize, ArbiterError> {
        let now = self.clock.now();

        let targets: Vec<String> = match &submission.target {
            FixtureSelector::Fixture(id) => {
                if let Err(err) = submission.validate(id) {
                    return reject(err);
                }
                self.require_fixture(id)?;
                vec![id.clone()]
            }
            FixtureSelector::All => {
                if let Err(err) = submission.validate("*") {
                    return reject(err);
                }
                self.fixtures.iter().map(|f| f.id.clone()).collect()
            }
        };

        let additions = targets
            .iter()
            .filter(|id| !self.manual.contains_key(*id))
            .count();
        if self.manual.len() + additions > self.config.max_manual_overrides {
            return reject(ArbiterError::CapacityExceeded {
                what: "manual overrides",
                limit: self.config.max_manual_overrides,
            });
        }

        for id in &targets {
            for channel in submission.channels.iter() {
                self.crossfade.cancel(id, channel);
            }
            match self.manual.get_mut(id) {
                Some(record) => record.merge(&submission, now),
                None => {
                    self.manual
                        .insert(id.clone(), ManualRecord::from_submission(&submission, now));
                }
            }
            self.record_origin(id, &submission);
            self.events.emit(ArbiterEvent::ManualOverride {
                fixture: id.clone(),
                channels: submission.channels,
            });
        }

        debug!(
            fixtures = targets.len(),
            channels = submission.channels.len(),
            source = %submission.source,
            "Manual override applied"
        );
        Ok(targets.len())
    }

    /// Remembers where the operator put a fixture so procedural movement can
    /// pick up from there after release.
    fn record_origin(&mut self, id: &str, submission: &ManualOverride) {
        if !submission.channels.contains(Channel::Pan) && !submission.channels.contains(Channel::Tilt) {
            return;
        }
        let Some(record) = self.manual.get(id) else {
            return;
        };
        let previous = self
            .origins
            .get(id)
            .or_else(|| self.last_known.get(id))
            .copied()
            .unwrap_or(Position::CENTER);
        let reference = self.last_known.get(id).copied().unwrap_or(previous);
        let origin = Position::new(
            record.resolve(Channel::Pan, reference.pan).unwrap_or(previous.pan),
            record.resolve(Channel::Tilt, reference.tilt).unwrap_or(previous.tilt),
        );
        self.origins.insert(id.to_string(), origin);
    }

    /// Releases some or all of a fixture's manual channels. Each released
    /// channel crossfades back to the live value underneath it. Returns the
    /// channels that were actually released.
    pub fn release_manual_override(
        &mut self,
        fixture: &str,
        channels: Option<ChannelSet>,
    ) -> Result<ChannelSet, ArbiterError> {
        let now = self.clock.now();
        self.release_at(fixture, channels, now)
    }

    fn release_at(
        &mut self,
        fixture: &str,
        channels: Option<ChannelSet>,
        now: Instant,
    ) -> Result<ChannelSet, ArbiterError> {
        let index = self.require_fixture(fixture)?;
        let base = self.base_values(&self.fixtures[index], now);

        let Some(record) = self.manual.get_mut(fixture) else {
            return Ok(ChannelSet::EMPTY);
        };

        let released = record
            .channels()
            .intersection(channels.unwrap_or_else(ChannelSet::all));
        for channel in released.iter() {
            let live = base.values[channel];
            let from = record.resolve(channel, live).unwrap_or(live);
            self.crossfade
                .start_transition(fixture, channel, from, live, record.release_transition, now);
        }
        record.release(released);
        if record.is_empty() {
            self.manual.remove(fixture);
        }

        if !released.is_empty() {
            debug!(fixture, channels = released.len(), "Manual override released");
            self.events.emit(ArbiterEvent::ManualRelease {
                fixture: fixture.to_string(),
                channels: released,
            });
        }
        Ok(released)
    }

    /// Releases every manual override.
    pub fn release_all(&mut self) {
        let now = self.clock.now();
        let mut held: Vec<String> = self.manual.keys().cloned().collect();
        held.sort();
        for fixture in held {
            // Every key in the manual map belongs to a registered fixture.
            let _ = self.release_at(&fixture, None, now);
        }
        info!("All manual overrides released");
    }

    /// Whether the fixture has a manual override, optionally on a specific channel.
    pub fn has_manual_override(&self, fixture: &str, channel: Option<Channel>) -> bool {
        match (self.manual.get(fixture), channel) {
            (Some(record), Some(channel)) => record.claims(channel),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    // Layer 3

    /// Starts an effect. When the effects list is full the oldest effect is
    /// evicted. Returns the effect id.
    pub fn add_effect(&mut self, effect: Effect) -> Result<u64, ArbiterError> {
        if let Some(unknown) = effect
            .fixtures
            .iter()
            .find(|id| !self.fixture_index.contains_key(id.as_str()))
        {
            return reject(ArbiterError::UnknownFixture(unknown.clone()));
        }
        if let Err(reason) = effect.validate() {
            return reject(ArbiterError::InvalidPayload {
                layer: ControlLayer::Effects,
                reason,
            });
        }
        if self.config.max_active_effects == 0 {
            return reject(ArbiterError::CapacityExceeded {
                what: "active effects",
                limit: 0,
            });
        }

        while self.effects.len() >= self.config.max_active_effects {
            self.evict_oldest_effect();
        }

        let id = self.next_effect_id;
        self.next_effect_id += 1;
        let kind = effect.kind;
        self.effects.push_back(ActiveEffect {
            id,
            effect,
            started: self.clock.now(),
        });
        debug!(id, kind = %kind, "Effect started");
        self.events.emit(ArbiterEvent::EffectStarted { id, kind });
        Ok(id)
    }

    fn evict_oldest_effect(&mut self) {
        if let Some(evicted) = self.effects.pop_front() {
            debug!(id = evicted.id, kind = %evicted.effect.kind, "Effect evicted");
            self.events.emit(ArbiterEvent::EffectEnded {
                id: evicted.id,
                kind: evicted.effect.kind,
            });
        }
    }

    /// Stops an effect by id. Returns false if no such effect is running.
    pub fn remove_effect(&mut self, id: u64) -> bool {
        let Some(position) = self.effects.iter().position(|e| e.id == id) else {
            return false;
        };
        if let Some(removed) = self.effects.remove(position) {
            self.events.emit(ArbiterEvent::EffectEnded {
                id,
                kind: removed.effect.kind,
            });
        }
        true
    }

    /// Stops every effect of a kind. Returns how many were stopped.
    pub fn remove_effects(&mut self, kind: EffectKind) -> usize {
        let before = self.effects.len();
        self.effects.retain(|active| {
            if active.effect.kind != kind {
                return true;
            }
            self.events.emit(ArbiterEvent::EffectEnded {
                id: active.id,
                kind,
            });
            false
        });
        before - self.effects.len()
    }

    pub fn clear_effects(&mut self) {
        while !self.effects.is_empty() {
            self.evict_oldest_effect();
        }
    }

    // Layer 4 and global modifiers

    pub fn set_blackout(&mut self, active: bool) {
        if self.blackout != active {
            info!(active, "Blackout");
            self.events.emit(ArbiterEvent::Blackout { active });
        }
        self.blackout = active;
    }

    pub fn toggle_blackout(&mut self) -> bool {
        self.set_blackout(!self.blackout);
        self.blackout
    }

    pub fn is_blackout(&self) -> bool {
        self.blackout
    }

    /// Opens or closes the output gate. The gate starts closed.
    pub fn set_output_enabled(&mut self, enabled: bool) {
        if self.output_enabled != enabled {
            info!(enabled, "Output gate");
            self.events.emit(ArbiterEvent::OutputGate { enabled });
        }
        self.output_enabled = enabled;
    }

    pub fn toggle_output(&mut self) -> bool {
        self.set_output_enabled(!self.output_enabled);
        self.output_enabled
    }

    pub fn is_output_enabled(&self) -> bool {
        self.output_enabled
    }

    /// Sets the post merge dimmer multiplier, clamped to 0..1.
    pub fn set_grand_master(&mut self, level: f64) {
        if !level.is_finite() {
            warn!(level, "Ignoring non-finite grand master level");
            return;
        }
        self.grand_master = level.clamp(0.0, 1.0);
        info!(level = self.grand_master, "Grand master");
    }

    pub fn grand_master(&self) -> f64 {
        self.grand_master
    }

    // Procedural movement

    pub fn set_pattern(&mut self, fixtures: &[&str], config: PatternConfig) -> Result<(), ArbiterError> {
        for fixture in fixtures {
            self.require_fixture(fixture)?;
        }
        if !config.speed.is_finite() || !config.size.is_finite() {
            return reject(ArbiterError::invalid(
                &fixtures.join(","),
                "pattern speed and size must be finite",
            ));
        }

        let start = self.clock.now();
        for fixture in fixtures {
            self.patterns
                .insert(fixture.to_string(), ActivePattern { config, start });
        }
        debug!(fixtures = fixtures.len(), shape = %config.shape, "Pattern set");
        Ok(())
    }

    /// Clears patterns for the given fixtures. Returns how many were cleared.
    pub fn clear_pattern(&mut self, fixtures: &[&str]) -> usize {
        fixtures
            .iter()
            .filter(|fixture| self.patterns.remove(**fixture).is_some())
            .count()
    }

    /// Creates or moves a group formation. On creation each member's offset from
    /// `center` is captured from where it currently points. Later calls for the
    /// same group only move the center and change the fan; they may pass no
    /// members or the group's exact members, but cannot change membership.
    pub fn set_group_formation(
        &mut self,
        group: &str,
        members: &[&str],
        center: Position,
        fan: f64,
    ) -> Result<(), ArbiterError> {
        if !fan.is_finite() || !center.pan.is_finite() || !center.tilt.is_finite() {
            return reject(ArbiterError::invalid(group, "formation values must be finite"));
        }
        let mut indices = Vec::with_capacity(members.len());
        for member in members {
            indices.push(self.require_fixture(member)?);
        }

        if let Some(formation) = self.formations.get_mut(group) {
            if !members.is_empty() && !formation.has_members(members) {
                return reject(ArbiterError::invalid(
                    group,
                    "formation members cannot change, clear the group first",
                ));
            }
            formation.center = center;
            formation.fan = fan;
            return Ok(());
        }
        if members.is_empty() {
            return reject(ArbiterError::invalid(group, "formation has no members"));
        }

        let now = self.clock.now();
        let positions = members
            .iter()
            .zip(indices)
            .map(|(member, index)| (member.to_string(), self.current_position(index, now)))
            .collect();

        self.formations
            .insert(group.to_string(), Formation::new(center, fan, positions));
        debug!(group, members = members.len(), "Group formation created");
        Ok(())
    }

    pub fn clear_group_formation(&mut self, group: &str) -> Result<(), ArbiterError> {
        match self.formations.remove(group) {
            Some(_) => Ok(()),
            None => reject(ArbiterError::UnknownGroup(group.to_string())),
        }
    }

    /// Where a fixture points right now: its manual position, else the last
    /// position output, else the AI position.
    fn current_position(&self, index: usize, now: Instant) -> Position {
        let fixture = &self.fixtures[index];
        let base = self.base_values(fixture, now);
        let fallback = self
            .last_known
            .get(&fixture.id)
            .copied()
            .unwrap_or_else(|| {
                let (pan, tilt) = intent::fallback_position(&base);
                Position::new(pan, tilt)
            });
        match self.manual.get(&fixture.id) {
            Some(record) => Position::new(
                record
                    .resolve(Channel::Pan, base.values[Channel::Pan])
                    .unwrap_or(fallback.pan),
                record
                    .resolve(Channel::Tilt, base.values[Channel::Tilt])
                    .unwrap_or(fallback.tilt),
            ),
            None => fallback,
        }
    }

    pub fn cancel_transition(&mut self, fixture: &str, channel: Channel) {
        self.crossfade.cancel(fixture, channel);
    }

    pub fn is_transitioning(&self, fixture: &str, channel: Channel) -> bool {
        self.crossfade.is_transitioning(fixture, channel)
    }

    // Frame resolution

    /// The AI layer for a fixture with the consciousness modifier applied.
    fn base_values(&self, fixture: &Fixture, now: Instant) -> BaseValues {
        let ai = self.ai.as_ref().map(|(intent, at)| (intent, *at));
        let mut base = intent::ai_values(
            ai,
            fixture,
            self.idle_epoch,
            self.config.idle_pulse_period,
            now,
        );
        if let Some((consciousness, set_at)) = &self.consciousness {
            intent::apply_consciousness(
                &mut base,
                consciousness,
                ai.map(|(intent, _)| intent),
                fixture,
                *set_at,
            );
        }
        base
    }

    /// Drops state whose time is up. Runs at the start of every frame.
    fn expire(&mut self, now: Instant) {
        self.effects.retain(|active| {
            if !active.expired(now) {
                return true;
            }
            debug!(id = active.id, kind = %active.effect.kind, "Effect ended");
            self.events.emit(ArbiterEvent::EffectEnded {
                id: active.id,
                kind: active.effect.kind,
            });
            false
        });

        let consciousness_expired = self.consciousness.as_ref().is_some_and(|(c, set_at)| {
            c.ttl
                .is_some_and(|ttl| now.saturating_duration_since(*set_at) >= ttl)
        });
        if consciousness_expired {
            debug!("Consciousness modifier expired");
            self.consciousness = None;
        }

        let mut expired: Vec<String> = self
            .manual
            .iter()
            .filter(|(_, record)| record.expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        for fixture in expired {
            debug!(fixture = %fixture, "Manual override auto-released");
            let _ = self.release_at(&fixture, None, now);
        }
    }

    /// Resolves every registered fixture for the current instant.
    pub fn arbitrate(&mut self) -> FinalLightingTarget {
        let now = self.clock.now();
        self.frame += 1;
        self.expire(now);

        let mut fixtures = Vec::with_capacity(self.fixtures.len());
        for index in 0..self.fixtures.len() {
            let (target, position) = self.resolve_fixture(index, now);
            match self.last_known.get_mut(&target.fixture_id) {
                Some(last) => *last = position,
                None => {
                    self.last_known.insert(target.fixture_id.clone(), position);
                }
            }
            fixtures.push(target);
        }

        FinalLightingTarget {
            frame: self.frame,
            fixtures,
            global_effects: self.global_effects(),
            layers: self.layer_activity(),
        }
    }

    fn resolve_fixture(&mut self, index: usize, now: Instant) -> (FixtureTarget, Position) {
        let fixture = &self.fixtures[index];
        let id = fixture.id.as_str();
        let base = self.base_values(fixture, now);
        let manual = self.manual.get(id);

        let held = self.last_known.get(id).copied().unwrap_or_else(|| {
            let (pan, tilt) = intent::fallback_position(&base);
            Position::new(pan, tilt)
        });

        // Output gate without manual, or blackout: nothing emits light and
        // movers stay where they were.
        if (!self.output_enabled && manual.is_none()) || self.blackout {
            return safe_target(id, held, None, &base, self.grand_master);
        }
        // Manual control bypasses the gate for the channels it claims.
        if !self.output_enabled {
            return safe_target(id, held, manual, &base, self.grand_master);
        }

        let mut effect_values = ChannelMap::filled(None);
        for effect in self.effects.iter().filter(|e| e.targets(id)) {
            effect.contribute(now, &mut effect_values);
        }

        let mut values = ChannelMap::filled(0.0);
        let mut sources = ChannelMap::filled(ControlLayer::AiIntent);
        for channel in Channel::ALL {
            let live = base.values[channel];

            if let Some(value) = manual.and_then(|m| m.resolve(channel, live)) {
                values[channel] = value;
                sources[channel] = ControlLayer::Manual;
                continue;
            }

            if let Some(value) = self.crossfade.get_current_value(id, channel, live, now) {
                values[channel] = value;
                sources[channel] = ControlLayer::AiIntent;
                continue;
            }

            let mut candidates = [ChannelValue::new(base.sources[channel], live, base.timestamp); 2];
            let count = match effect_values[channel] {
                Some(value) => {
                    candidates[1] = ChannelValue::new(ControlLayer::Effects, value, now);
                    2
                }
                None => 1,
            };
            if let Some(result) = merge_channel(channel, &mut candidates[..count]) {
                values[channel] = result.value;
                sources[channel] = result.source;
            }
        }

        let manual_position = manual.is_some_and(|m| m.claims(Channel::Pan) || m.claims(Channel::Tilt));
        if !manual_position {
            let procedural = match self.patterns.get(id) {
                Some(pattern) => {
                    let center = pattern
                        .config
                        .center
                        .or_else(|| self.origins.get(id).copied())
                        .unwrap_or(Position::new(
                            base.values[Channel::Pan],
                            base.values[Channel::Tilt],
                        ));
                    Some(pattern.position(center, now))
                }
                None => movement::formation_position(&self.formations, id),
            };
            if let Some(position) = procedural {
                values[Channel::Pan] = position.pan;
                values[Channel::Tilt] = position.tilt;
            }
        }

        values[Channel::Dimmer] *= self.grand_master;

        let position = Position::new(values[Channel::Pan], values[Channel::Tilt]).clamped();
        let mut target = FixtureTarget::from_values(id, &values, sources);
        if let Some(progress) = self.crossfade.fixture_progress(id) {
            target.crossfade_active = true;
            target.crossfade_progress = progress;
        }
        (target, position)
    }

    fn global_effects(&self) -> GlobalEffects {
        let first = |kind: EffectKind| self.effects.iter().find(|e| e.effect.kind == kind);
        GlobalEffects {
            strobe_active: first(EffectKind::Strobe).is_some(),
            strobe_speed: first(EffectKind::Strobe)
                .map(|e| e.effect.speed.unwrap_or(effects::DEFAULT_STROBE_HZ))
                .unwrap_or(0.0),
            blinder_active: first(EffectKind::Blinder).is_some(),
            blinder_intensity: first(EffectKind::Blinder)
                .map(|e| e.effect.intensity)
                .unwrap_or(0.0),
            blackout_active: self.blackout,
            freeze_active: first(EffectKind::Freeze).is_some(),
        }
    }

    fn layer_activity(&self) -> LayerActivity {
        LayerActivity {
            ai_intent: self.ai.is_some(),
            consciousness: self.consciousness.is_some(),
            manual_overrides: self.manual.len(),
            effects: self.effects.len(),
            blackout: self.blackout,
        }
    }

    pub fn status(&self) -> ArbiterStatus {
        ArbiterStatus {
            fixture_count: self.fixtures.len(),
            frame: self.frame,
            output_enabled: self.output_enabled,
            blackout: self.blackout,
            grand_master: self.grand_master,
            layers: self.layer_activity(),
            active_crossfades: self.crossfade.active_count(),
            active_patterns: self.patterns.len(),
            active_formations: self.formations.len(),
            vibe: self.ai.as_ref().map(|(intent, _)| intent.vibe.clone()),
        }
    }

    /// Returns to the startup state, keeping fixtures, configuration and
    /// subscribers. The output gate closes again.
    pub fn reset(&mut self) {
        self.ai = None;
        self.consciousness = None;
        self.manual.clear();
        self.effects.clear();
        self.blackout = false;
        self.output_enabled = false;
        self.grand_master = 1.0;
        self.patterns.clear();
        self.formations.clear();
        self.origins.clear();
        self.last_known.clear();
        self.crossfade.clear_all();
        self.frame = 0;
        self.idle_epoch = self.clock.now();
        info!("Arbiter reset");
    }
}

/// A target that emits no light and holds position. Channels claimed by
/// `manual` keep their manual values.
fn safe_target(
    id: &str,
    held: Position,
    manual: Option<&ManualRecord>,
    base: &BaseValues,
    grand_master: f64,
) -> (FixtureTarget, Position) {
    let mut values = ChannelMap::from_fn(Channel::neutral_value);
    let mut sources = ChannelMap::filled(ControlLayer::Blackout);
    for channel in Channel::ALL.into_iter().filter(|c| c.emits_light()) {
        values[channel] = 0.0;
    }
    values[Channel::Pan] = held.pan;
    values[Channel::Tilt] = held.tilt;

    if let Some(record) = manual {
        for channel in record.channels().iter() {
            if let Some(value) = record.resolve(channel, base.values[channel]) {
                values[channel] = value;
                sources[channel] = ControlLayer::Manual;
            }
        }
        values[Channel::Dimmer] *= grand_master;
    }

    let position = Position::new(values[Channel::Pan], values[Channel::Tilt]).clamped();
    (FixtureTarget::from_values(id, &values, sources), position)
}
