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
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stage_arbiter::clock::ManualClock;
use stage_arbiter::hal::{OutputStage, ProfileRegistry, SafetyConfig};
use stage_arbiter::lighting::arbiter::{
    AiIntent, Effect, EffectKind, ManualOverride, PatternConfig, PatternShape, Position,
};
use stage_arbiter::lighting::{Arbiter, ArbiterConfig, Channel, ChannelSet, Fixture, Zone};
use std::sync::Arc;

const ZONES: [Zone; 6] = [
    Zone::FrontLeft,
    Zone::FrontRight,
    Zone::BackLeft,
    Zone::BackRight,
    Zone::Center,
    Zone::Floor,
];

fn create_rig(size: usize) -> Vec<Fixture> {
    (0..size)
        .map(|i| {
            let zone = ZONES[i % ZONES.len()];
            if i % 3 == 0 {
                Fixture::new(
                    &format!("mover-{}", i),
                    zone,
                    "Beam 2R",
                    ChannelSet::from([
                        Channel::Dimmer,
                        Channel::Pan,
                        Channel::Tilt,
                        Channel::ColorWheel,
                        Channel::Strobe,
                    ]),
                )
                .with_profile("beam-2r")
            } else {
                Fixture::new(
                    &format!("par-{}", i),
                    zone,
                    "LED PAR",
                    ChannelSet::from([
                        Channel::Dimmer,
                        Channel::Red,
                        Channel::Green,
                        Channel::Blue,
                        Channel::White,
                    ]),
                )
            }
        })
        .collect()
}

/// A busy frame: AI intent, a few manual overrides, a pattern and an effect.
fn create_busy_arbiter(size: usize) -> (Arbiter, ManualClock) {
    let clock = ManualClock::new();
    let mut arbiter = Arbiter::new(ArbiterConfig::default(), Arc::new(clock.clone()));
    let rig = create_rig(size);
    arbiter.set_fixtures(rig.clone());
    arbiter.set_output_enabled(true);
    arbiter.set_ai_intent(AiIntent::new(0.8).with_vibe("bench")).unwrap();

    for fixture in rig.iter().step_by(5) {
        arbiter
            .set_manual_override(ManualOverride::fixture(&fixture.id).set(Channel::Dimmer, 200.0))
            .unwrap();
    }

    let movers: Vec<&str> = rig
        .iter()
        .filter(|fixture| fixture.has_movement)
        .map(|fixture| fixture.id.as_str())
        .collect();
    arbiter
        .set_pattern(
            &movers,
            PatternConfig::new(PatternShape::Circle, 0.5, 0.4).centered_at(Position::CENTER),
        )
        .unwrap();
    arbiter
        .add_effect(Effect::new(EffectKind::Pulse).with_intensity(0.5))
        .unwrap();

    (arbiter, clock)
}

fn benchmark_arbitrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("arbitrate");

    for size in [8, 32, 128] {
        group.bench_with_input(BenchmarkId::new("frame", size), &size, |b, &size| {
            let (mut arbiter, clock) = create_busy_arbiter(size);
            b.iter(|| {
                clock.advance_ms(16);
                black_box(arbiter.arbitrate())
            });
        });
    }

    group.finish();
}

fn benchmark_output_stage(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_stage");

    for size in [8, 32, 128] {
        group.bench_with_input(BenchmarkId::new("render", size), &size, |b, &size| {
            let (mut arbiter, clock) = create_busy_arbiter(size);
            let mut stage = OutputStage::new(
                ProfileRegistry::builtin(),
                SafetyConfig::default(),
                Arc::new(clock.clone()),
            );
            stage.set_fixtures(arbiter.fixtures());
            b.iter(|| {
                clock.advance_ms(16);
                let target = arbiter.arbitrate();
                black_box(stage.render(&target))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_arbitrate, benchmark_output_stage);
criterion_main!(benches);
