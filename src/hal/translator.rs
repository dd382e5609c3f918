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
use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::warn;

use crate::lighting::color::Rgb;

use super::profiles::{FixtureProfile, WheelColor};

/// Weighted distance above which the closest slot is considered a poor match.
const POOR_MATCH_THRESHOLD: f64 = 180.0;

/// Requests less saturated than this prefer the open slot on a poor match.
const LOW_SATURATION: f64 = 0.3;

const MAX_CACHE_SIZE: usize = 256;

/// Cache keys round each component to this step.
const QUANTIZE_STEP: f64 = 8.0;

/// Reported distance when a wheel profile has no slots at all.
const FALLBACK_DISTANCE: f64 = 441.0;

const LUMA_WEIGHTS: (f64, f64, f64) = (0.299, 0.587, 0.114);

/// The outcome of matching a requested color to what a fixture can produce.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub output: Rgb,
    pub wheel_dmx: Option<u8>,
    pub color_name: Option<String>,
    pub distance: f64,
    pub translated: bool,
    pub poor_match: bool,
}

impl Translation {
    fn passthrough(target: Rgb) -> Translation {
        Translation {
            output: target,
            wheel_dmx: None,
            color_name: None,
            distance: 0.0,
            translated: false,
            poor_match: false,
        }
    }

    fn slot(slot: &WheelColor, distance: f64, poor_match: bool) -> Translation {
        Translation {
            output: slot.rgb,
            wheel_dmx: Some(slot.dmx),
            color_name: Some(slot.name.clone()),
            distance,
            translated: true,
            poor_match,
        }
    }
}

/// Luminance weighted RGB distance.
pub fn weighted_distance(a: Rgb, b: Rgb) -> f64 {
    let dr = a.r as f64 - b.r as f64;
    let dg = a.g as f64 - b.g as f64;
    let db = a.b as f64 - b.b as f64;
    (LUMA_WEIGHTS.0 * dr * dr + LUMA_WEIGHTS.1 * dg * dg + LUMA_WEIGHTS.2 * db * db).sqrt()
}

fn quantize(value: u8) -> u16 {
    ((value as f64 / QUANTIZE_STEP).round() * QUANTIZE_STEP) as u16
}

type CacheKey = (String, [u16; 3]);

/// Snaps requested colors to the nearest slot of a fixture's color wheel.
#[derive(Debug, Default)]
pub struct ColorTranslator {
    cache: HashMap<CacheKey, Translation>,
    /// Insertion order, oldest first.
    order: VecDeque<CacheKey>,
}

impl ColorTranslator {
    pub fn new() -> ColorTranslator {
        Self::default()
    }

    pub fn translate(&mut self, target: Rgb, profile: Option<&FixtureProfile>) -> Translation {
        let profile = match profile {
            Some(profile) if profile.needs_color_translation() => profile,
            _ => return Translation::passthrough(target),
        };

        let wheel = match profile.color_wheel.as_ref() {
            Some(wheel) if !wheel.colors.is_empty() => wheel,
            _ => {
                warn!(profile = %profile.id, "Profile has no color wheel slots");
                return Translation {
                    output: Rgb::WHITE,
                    wheel_dmx: Some(0),
                    color_name: Some("Open (Fallback)".to_string()),
                    distance: FALLBACK_DISTANCE,
                    translated: true,
                    poor_match: true,
                };
            }
        };

        let key = (
            profile.id.clone(),
            [quantize(target.r), quantize(target.g), quantize(target.b)],
        );
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let mut nearest = &wheel.colors[0];
        let mut distance = f64::INFINITY;
        for slot in &wheel.colors {
            let d = weighted_distance(target, slot.rgb);
            if d < distance {
                distance = d;
                nearest = slot;
            }
        }

        let poor_match = distance > POOR_MATCH_THRESHOLD;
        if poor_match && target.saturation() < LOW_SATURATION {
            if let Some(white) = wheel.white_slot() {
                nearest = white;
                distance = weighted_distance(target, white.rgb);
            }
        }

        let result = Translation::slot(nearest, distance, poor_match);
        self.insert(key, result.clone());
        result
    }

    fn insert(&mut self, key: CacheKey, result: Translation) {
        if self.cache.len() >= MAX_CACHE_SIZE {
            if let Some(oldest) = self.order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.cache.insert(key, result);
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        self.order.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// The colors a fixture can produce. Continuous mixers report a reference set.
    pub fn available_colors(profile: &FixtureProfile) -> Vec<WheelColor> {
        if profile.needs_color_translation() {
            return profile
                .color_wheel
                .as_ref()
                .map(|wheel| wheel.colors.clone())
                .unwrap_or_default();
        }

        [
            ("Red", Rgb::new(255, 0, 0)),
            ("Green", Rgb::new(0, 255, 0)),
            ("Blue", Rgb::new(0, 0, 255)),
            ("Yellow", Rgb::new(255, 255, 0)),
            ("Cyan", Rgb::new(0, 255, 255)),
            ("Magenta", Rgb::new(255, 0, 255)),
            ("White", Rgb::WHITE),
        ]
        .into_iter()
        .map(|(name, rgb)| WheelColor::new(0, name, rgb))
        .collect()
    }
}
