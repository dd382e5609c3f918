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

use crate::lighting::arbiter::tests::common::{blue_intent, create_live_arbiter, linear_config};
use crate::lighting::arbiter::{ArbiterConfig, ManualOverride};
use crate::lighting::types::{Channel, ControlLayer};

#[test]
fn test_release_crossfades_to_live_value() {
    let (mut arbiter, clock) = create_live_arbiter(linear_config(1000));
    arbiter
        .set_manual_override(ManualOverride::fixture("par-1").set(Channel::Dimmer, 0.0))
        .unwrap();
    assert_eq!(arbiter.arbitrate().fixture("par-1").unwrap().dimmer, 0);

    arbiter.release_manual_override("par-1", None).unwrap();

    clock.advance_ms(500);
    let frame = arbiter.arbitrate();
    let par = frame.fixture("par-1").unwrap();
    assert!((par.dimmer as i32 - 128).abs() <= 1, "dimmer was {}", par.dimmer);
    assert_eq!(par.source(Channel::Dimmer), ControlLayer::AiIntent);
    assert!(par.crossfade_active);
    assert!((par.crossfade_progress - 0.5).abs() < 1e-9);

    clock.advance_ms(500);
    let frame = arbiter.arbitrate();
    let par = frame.fixture("par-1").unwrap();
    assert_eq!(par.dimmer, 255);
    assert!(!arbiter.is_transitioning("par-1", Channel::Dimmer));
    assert_eq!(arbiter.status().active_crossfades, 0);
}

#[test]
fn test_release_follows_a_moving_target() {
    let (mut arbiter, clock) = create_live_arbiter(linear_config(1000));
    arbiter
        .set_manual_override(ManualOverride::fixture("par-1").set(Channel::Dimmer, 0.0))
        .unwrap();
    arbiter.release_manual_override("par-1", None).unwrap();

    clock.advance_ms(500);
    arbiter.arbitrate();

    arbiter.set_ai_intent(blue_intent(0.4)).unwrap();
    clock.advance_ms(250);
    let frame = arbiter.arbitrate();
    assert_eq!(frame.fixture("par-1").unwrap().dimmer, 77);

    clock.advance_ms(250);
    let frame = arbiter.arbitrate();
    assert_eq!(frame.fixture("par-1").unwrap().dimmer, 102);
    assert!(!frame.fixture("par-1").unwrap().crossfade_active);
}

#[test]
fn test_release_uses_its_own_transition_time() {
    let (mut arbiter, clock) = create_live_arbiter(linear_config(1000));
    arbiter
        .set_manual_override(
            ManualOverride::fixture("par-1")
                .set(Channel::Dimmer, 0.0)
                .release_transition(Duration::from_millis(200)),
        )
        .unwrap();
    arbiter.release_manual_override("par-1", None).unwrap();

    clock.advance_ms(200);
    let frame = arbiter.arbitrate();
    assert_eq!(frame.fixture("par-1").unwrap().dimmer, 255);
    assert!(!arbiter.is_transitioning("par-1", Channel::Dimmer));
}

#[test]
fn test_new_override_cancels_running_transition() {
    let (mut arbiter, clock) = create_live_arbiter(linear_config(1000));
    arbiter
        .set_manual_override(ManualOverride::fixture("par-1").set(Channel::Dimmer, 0.0))
        .unwrap();
    arbiter.release_manual_override("par-1", None).unwrap();
    clock.advance_ms(300);

    arbiter
        .set_manual_override(ManualOverride::fixture("par-1").set(Channel::Dimmer, 40.0))
        .unwrap();
    assert!(!arbiter.is_transitioning("par-1", Channel::Dimmer));

    let frame = arbiter.arbitrate();
    let par = frame.fixture("par-1").unwrap();
    assert_eq!(par.dimmer, 40);
    assert!(!par.crossfade_active);
}

#[test]
fn test_default_easing_is_smooth_at_the_ends() {
    let (mut arbiter, clock) = create_live_arbiter(ArbiterConfig::default());
    arbiter
        .set_manual_override(ManualOverride::fixture("par-1").set(Channel::Dimmer, 0.0))
        .unwrap();
    arbiter.release_manual_override("par-1", None).unwrap();

    clock.advance_ms(50);
    let early = arbiter.arbitrate().fixture("par-1").unwrap().dimmer;
    assert!(early < 5, "ease-in-out should start slowly, got {}", early);

    clock.advance_ms(200);
    let middle = arbiter.arbitrate().fixture("par-1").unwrap().dimmer;
    assert!((middle as i32 - 128).abs() <= 1);

    clock.advance_ms(250);
    assert_eq!(arbiter.arbitrate().fixture("par-1").unwrap().dimmer, 255);
}

#[test]
fn test_cancel_transition_snaps_to_live_value() {
    let (mut arbiter, clock) = create_live_arbiter(linear_config(1000));
    arbiter
        .set_manual_override(ManualOverride::fixture("par-1").set(Channel::Dimmer, 0.0))
        .unwrap();
    arbiter.release_manual_override("par-1", None).unwrap();
    clock.advance_ms(100);

    arbiter.cancel_transition("par-1", Channel::Dimmer);
    assert_eq!(arbiter.arbitrate().fixture("par-1").unwrap().dimmer, 255);
}
