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

use std::sync::Arc;

use crate::clock::ManualClock;
use crate::lighting::arbiter::{AiIntent, Arbiter, ArbiterConfig, Palette};
use crate::lighting::color::Hsl;
use crate::lighting::types::{Channel, ChannelSet, Fixture, Zone};

pub(crate) fn create_test_par(id: &str, zone: Zone) -> Fixture {
    Fixture::new(
        id,
        zone,
        "led_par",
        ChannelSet::from([
            Channel::Dimmer,
            Channel::Red,
            Channel::Green,
            Channel::Blue,
            Channel::Strobe,
        ]),
    )
}

pub(crate) fn create_test_mover(id: &str, zone: Zone) -> Fixture {
    Fixture::new(
        id,
        zone,
        "moving_head",
        ChannelSet::from([
            Channel::Dimmer,
            Channel::Pan,
            Channel::Tilt,
            Channel::ColorWheel,
            Channel::Zoom,
            Channel::Focus,
        ]),
    )
    .with_profile("beam-2r")
}

/// Two pars and a stereo pair of movers.
pub(crate) fn create_test_rig() -> Vec<Fixture> {
    vec![
        create_test_par("par-1", Zone::Front),
        create_test_par("par-2", Zone::Back),
        create_test_mover("mover-1", Zone::Left),
        create_test_mover("mover-2", Zone::Right),
    ]
}

/// Master intensity with a solid blue primary.
pub(crate) fn blue_intent(master: f64) -> AiIntent {
    let blue = Hsl::new(240.0, 1.0, 0.5);
    AiIntent::new(master)
        .with_palette(Palette {
            primary: blue,
            secondary: blue,
            accent: blue,
            ambient: blue,
        })
        .with_vibe("test")
}

pub(crate) fn create_test_arbiter(config: ArbiterConfig) -> (Arbiter, ManualClock) {
    let clock = ManualClock::new();
    let mut arbiter = Arbiter::new(config, Arc::new(clock.clone()));
    arbiter.set_fixtures(create_test_rig());
    (arbiter, clock)
}

/// An arbiter with the output gate open and a full intensity blue look.
pub(crate) fn create_live_arbiter(config: ArbiterConfig) -> (Arbiter, ManualClock) {
    let (mut arbiter, clock) = create_test_arbiter(config);
    arbiter.set_output_enabled(true);
    arbiter.set_ai_intent(blue_intent(1.0)).unwrap();
    (arbiter, clock)
}

pub(crate) fn linear_config(crossfade_ms: u64) -> ArbiterConfig {
    ArbiterConfig {
        default_crossfade: std::time::Duration::from_millis(crossfade_ms),
        easing: crate::lighting::crossfade::Easing::Linear,
        ..Default::default()
    }
}
