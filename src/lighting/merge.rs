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

//! Stateless merge strategies. Each one picks the winner among the candidate
//! values a set of layers propose for a single channel.

use std::cmp::Ordering;
use std::time::Instant;

use super::types::{Channel, ControlLayer, MergeStrategy};

/// A value proposed by one layer for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelValue {
    pub layer: ControlLayer,
    pub value: f64,
    pub timestamp: Instant,
    pub weight: f64,
}

impl ChannelValue {
    pub fn new(layer: ControlLayer, value: f64, timestamp: Instant) -> Self {
        ChannelValue {
            layer,
            value,
            timestamp,
            weight: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// The merged value and the layer that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeResult {
    pub value: f64,
    pub source: ControlLayer,
}

/// Highest value wins. Equal values go to the first candidate, so callers that
/// sort by layer descending get the higher layer.
pub fn merge_htp(values: &[ChannelValue]) -> Option<MergeResult> {
    values
        .iter()
        .fold(None::<&ChannelValue>, |best, candidate| match best {
            Some(b) if candidate.value <= b.value => Some(b),
            _ => Some(candidate),
        })
        .map(|winner| MergeResult {
            value: winner.value,
            source: winner.layer,
        })
}

/// Latest timestamp wins, ties broken by layer priority.
pub fn merge_ltp(values: &[ChannelValue]) -> Option<MergeResult> {
    values
        .iter()
        .max_by(|a, b| match a.timestamp.cmp(&b.timestamp) {
            Ordering::Equal => a.layer.cmp(&b.layer),
            other => other,
        })
        .map(|winner| MergeResult {
            value: winner.value,
            source: winner.layer,
        })
}

/// Weighted average. A zero weight sum yields 0. The source is the heaviest
/// contributor.
pub fn merge_blend(values: &[ChannelValue]) -> Option<MergeResult> {
    let heaviest = values.iter().fold(None::<&ChannelValue>, |best, c| match best {
        Some(b) if c.weight <= b.weight => Some(b),
        _ => Some(c),
    })?;

    let (sum, weights) = values
        .iter()
        .fold((0.0, 0.0), |(sum, weights), c| {
            (sum + c.value * c.weight, weights + c.weight)
        });

    let value = if weights == 0.0 { 0.0 } else { sum / weights };
    Some(MergeResult {
        value,
        source: heaviest.layer,
    })
}

/// Highest layer wins unconditionally.
pub fn merge_override(values: &[ChannelValue]) -> Option<MergeResult> {
    values.iter().max_by_key(|c| c.layer).map(|winner| MergeResult {
        value: winner.value,
        source: winner.layer,
    })
}

/// Merges with an explicit strategy. Candidates are sorted by layer descending
/// first so that every strategy breaks ties the same way.
pub fn merge_with(strategy: MergeStrategy, values: &mut [ChannelValue]) -> Option<MergeResult> {
    values.sort_by(|a, b| b.layer.cmp(&a.layer));
    match strategy {
        MergeStrategy::Htp => merge_htp(values),
        MergeStrategy::Ltp => merge_ltp(values),
        MergeStrategy::Blend => merge_blend(values),
        MergeStrategy::Override => merge_override(values),
    }
}

/// Merges the candidates for a channel using that channel's default strategy.
pub fn merge_channel(channel: Channel, values: &mut [ChannelValue]) -> Option<MergeResult> {
    merge_with(channel.default_strategy(), values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn candidates(now: Instant, entries: &[(ControlLayer, f64, u64)]) -> Vec<ChannelValue> {
        entries
            .iter()
            .map(|(layer, value, offset_ms)| {
                ChannelValue::new(*layer, *value, now + Duration::from_millis(*offset_ms))
            })
            .collect()
    }

    #[test]
    fn test_htp_takes_highest() {
        let now = Instant::now();
        let values = candidates(
            now,
            &[
                (ControlLayer::AiIntent, 30.0, 0),
                (ControlLayer::Effects, 90.0, 0),
                (ControlLayer::Consciousness, 10.0, 0),
            ],
        );
        let result = merge_htp(&values).unwrap();
        assert_eq!(result.value, 90.0);
        assert_eq!(result.source, ControlLayer::Effects);
    }

    #[test]
    fn test_ltp_takes_latest_even_if_smaller() {
        let now = Instant::now();
        let values = candidates(
            now,
            &[
                (ControlLayer::Effects, 200.0, 10),
                (ControlLayer::AiIntent, 5.0, 50),
            ],
        );
        let result = merge_ltp(&values).unwrap();
        assert_eq!(result.value, 5.0);
        assert_eq!(result.source, ControlLayer::AiIntent);
    }

    #[test]
    fn test_ltp_tie_broken_by_layer() {
        let now = Instant::now();
        let mut values = candidates(
            now,
            &[
                (ControlLayer::AiIntent, 10.0, 0),
                (ControlLayer::Effects, 20.0, 0),
            ],
        );
        let result = merge_channel(Channel::Pan, &mut values).unwrap();
        assert_eq!(result.value, 20.0);
        assert_eq!(result.source, ControlLayer::Effects);
    }

    #[test]
    fn test_htp_tie_broken_by_layer() {
        let now = Instant::now();
        let mut values = candidates(
            now,
            &[
                (ControlLayer::AiIntent, 100.0, 0),
                (ControlLayer::Effects, 100.0, 0),
            ],
        );
        let result = merge_channel(Channel::Dimmer, &mut values).unwrap();
        assert_eq!(result.source, ControlLayer::Effects);
    }

    #[test]
    fn test_blend() {
        let now = Instant::now();
        let values = vec![
            ChannelValue::new(ControlLayer::AiIntent, 0.0, now).with_weight(1.0),
            ChannelValue::new(ControlLayer::Manual, 200.0, now).with_weight(3.0),
        ];
        let result = merge_blend(&values).unwrap();
        assert_eq!(result.value, 150.0);
        assert_eq!(result.source, ControlLayer::Manual);

        let zero = vec![
            ChannelValue::new(ControlLayer::AiIntent, 80.0, now).with_weight(0.0),
            ChannelValue::new(ControlLayer::Manual, 200.0, now).with_weight(0.0),
        ];
        assert_eq!(merge_blend(&zero).unwrap().value, 0.0);
    }

    #[test]
    fn test_override_takes_highest_layer() {
        let now = Instant::now();
        let mut values = candidates(
            now,
            &[
                (ControlLayer::Blackout, 0.0, 0),
                (ControlLayer::Effects, 255.0, 10),
            ],
        );
        let result = merge_with(MergeStrategy::Override, &mut values).unwrap();
        assert_eq!(result.value, 0.0);
        assert_eq!(result.source, ControlLayer::Blackout);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(merge_htp(&[]).is_none());
        assert!(merge_ltp(&[]).is_none());
        assert!(merge_blend(&[]).is_none());
        assert!(merge_override(&[]).is_none());
    }
}
