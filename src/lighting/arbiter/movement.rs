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

//! Procedural movement: shape patterns and group formations.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::Serialize;

use crate::lighting::error::ParseError;
use crate::lighting::types::{clamp_dmx, DMX_MAX};

/// Half the travel range in DMX units. Pattern offsets in [-1, 1] scale to this.
const HALF_TRAVEL: f64 = DMX_MAX / 2.0;

/// Slowest allowed pattern speed, in cycles per second.
const MIN_SPEED: f64 = 0.01;

/// A pan/tilt pair in DMX units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub pan: f64,
    pub tilt: f64,
}

impl Position {
    pub const CENTER: Position = Position {
        pan: 128.0,
        tilt: 128.0,
    };

    pub fn new(pan: f64, tilt: f64) -> Position {
        Position { pan, tilt }
    }

    pub(crate) fn clamped(self) -> Position {
        Position::new(clamp_dmx(self.pan), clamp_dmx(self.tilt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternShape {
    Circle,
    FigureEight,
    Sweep,
}

impl PatternShape {
    /// Unit offsets for phase `t` (radians).
    fn offset(self, t: f64) -> (f64, f64) {
        match self {
            PatternShape::Circle => (t.cos(), t.sin()),
            PatternShape::FigureEight => (t.sin(), (2.0 * t).sin() / 2.0),
            PatternShape::Sweep => (t.sin(), 0.0),
        }
    }
}

impl fmt::Display for PatternShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatternShape::Circle => "circle",
            PatternShape::FigureEight => "figure-eight",
            PatternShape::Sweep => "sweep",
        })
    }
}

impl FromStr for PatternShape {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "circle" => Ok(PatternShape::Circle),
            "figure-eight" | "figure8" | "eight" => Ok(PatternShape::FigureEight),
            "sweep" => Ok(PatternShape::Sweep),
            _ => Err(ParseError::new("pattern", s)),
        }
    }
}

/// A pattern request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternConfig {
    pub shape: PatternShape,
    /// Cycles per second.
    pub speed: f64,
    /// Fraction (0..1) of half the travel range.
    pub size: f64,
    /// Center to orbit. `None` follows the fixture's ghost origin, or its AI
    /// position when it has never been moved by hand.
    pub center: Option<Position>,
}

impl PatternConfig {
    pub fn new(shape: PatternShape, speed: f64, size: f64) -> PatternConfig {
        PatternConfig {
            shape,
            speed,
            size,
            center: None,
        }
    }

    pub fn centered_at(mut self, center: Position) -> PatternConfig {
        self.center = Some(center);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ActivePattern {
    pub(crate) config: PatternConfig,
    pub(crate) start: Instant,
}

impl ActivePattern {
    /// Unit offsets at `now`. The phase wraps every `1000 / speed` ms.
    pub(crate) fn offset(&self, now: Instant) -> (f64, f64) {
        let period_ms = 1000.0 / self.config.speed.max(MIN_SPEED);
        let elapsed_ms = now.saturating_duration_since(self.start).as_secs_f64() * 1000.0;
        let t = TAU * ((elapsed_ms % period_ms) / period_ms);
        self.config.shape.offset(t)
    }

    pub(crate) fn position(&self, center: Position, now: Instant) -> Position {
        let (dx, dy) = self.offset(now);
        let scale = self.config.size.clamp(0.0, 1.0) * HALF_TRAVEL;
        Position::new(center.pan + dx * scale, center.tilt + dy * scale).clamped()
    }
}

/// A group that moves around a shared center while keeping its spacing.
#[derive(Debug, Clone)]
pub(crate) struct Formation {
    pub(crate) center: Position,
    pub(crate) fan: f64,
    /// Member offsets from the center, captured once at creation. Keeps
    /// registration order so lookups are deterministic.
    pub(crate) offsets: Vec<(String, Position)>,
}

impl Formation {
    pub(crate) fn new(center: Position, fan: f64, members: Vec<(String, Position)>) -> Formation {
        let offsets = members
            .into_iter()
            .map(|(id, current)| {
                (
                    id,
                    Position::new(current.pan - center.pan, current.tilt - center.tilt),
                )
            })
            .collect();
        Formation {
            center,
            fan,
            offsets,
        }
    }

    pub(crate) fn position(&self, fixture: &str) -> Option<Position> {
        self.offsets
            .iter()
            .find(|(id, _)| id == fixture)
            .map(|(_, offset)| {
                Position::new(
                    self.center.pan + offset.pan * self.fan,
                    self.center.tilt + offset.tilt * self.fan,
                )
                .clamped()
            })
    }

    pub(crate) fn contains(&self, fixture: &str) -> bool {
        self.offsets.iter().any(|(id, _)| id == fixture)
    }

    /// Whether `members` names exactly this formation's members, in any order.
    pub(crate) fn has_members(&self, members: &[&str]) -> bool {
        let mut expected: Vec<&str> = self.offsets.iter().map(|(id, _)| id.as_str()).collect();
        let mut given = members.to_vec();
        expected.sort_unstable();
        given.sort_unstable();
        given.dedup();
        expected == given
    }
}

/// Finds the formation position for a fixture. When a fixture sits in more than
/// one group the group id that sorts first wins.
pub(crate) fn formation_position(
    formations: &HashMap<String, Formation>,
    fixture: &str,
) -> Option<Position> {
    formations
        .iter()
        .filter(|(_, formation)| formation.contains(fixture))
        .min_by(|(a, _), (b, _)| a.cmp(b))
        .and_then(|(_, formation)| formation.position(fixture))
}
