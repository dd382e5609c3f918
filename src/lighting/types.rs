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

use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

use super::error::ParseError;

/// The largest value any channel can hold.
pub const DMX_MAX: f64 = 255.0;

/// The neutral value for centered channels (pan, tilt, zoom, focus).
pub const DMX_CENTER: f64 = 128.0;

/// Clamps a channel value to the valid DMX range. Non-finite values collapse to 0.
#[inline]
pub fn clamp_dmx(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, DMX_MAX)
    } else {
        0.0
    }
}

/// Converts a channel value to the byte that goes on the wire.
#[inline]
pub fn to_dmx(value: f64) -> u8 {
    clamp_dmx(value).round() as u8
}

/// Control layer priorities. A higher layer always wins tie-breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlLayer {
    AiIntent = 0,
    Consciousness = 1,
    Manual = 2,
    Effects = 3,
    Blackout = 4,
}

impl fmt::Display for ControlLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlLayer::AiIntent => "ai_intent",
            ControlLayer::Consciousness => "consciousness",
            ControlLayer::Manual => "manual",
            ControlLayer::Effects => "effects",
            ControlLayer::Blackout => "blackout",
        };
        f.write_str(name)
    }
}

/// How competing candidate values for a channel are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Highest value wins.
    Htp,
    /// Most recently timestamped value wins.
    Ltp,
    /// Weighted average of all candidates.
    Blend,
    /// Highest priority layer wins unconditionally.
    Override,
}

/// A physical fixture channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    Dimmer,
    Red,
    Green,
    Blue,
    White,
    Pan,
    Tilt,
    Zoom,
    Focus,
    Gobo,
    Prism,
    Speed,
    ColorWheel,
    Strobe,
    Amber,
    Uv,
}

impl Channel {
    pub const COUNT: usize = 16;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Dimmer,
        Channel::Red,
        Channel::Green,
        Channel::Blue,
        Channel::White,
        Channel::Pan,
        Channel::Tilt,
        Channel::Zoom,
        Channel::Focus,
        Channel::Gobo,
        Channel::Prism,
        Channel::Speed,
        Channel::ColorWheel,
        Channel::Strobe,
        Channel::Amber,
        Channel::Uv,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Dimmer => "dimmer",
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
            Channel::White => "white",
            Channel::Pan => "pan",
            Channel::Tilt => "tilt",
            Channel::Zoom => "zoom",
            Channel::Focus => "focus",
            Channel::Gobo => "gobo",
            Channel::Prism => "prism",
            Channel::Speed => "speed",
            Channel::ColorWheel => "color_wheel",
            Channel::Strobe => "strobe",
            Channel::Amber => "amber",
            Channel::Uv => "uv",
        }
    }

    /// The strategy used when no crossfade or manual claim decides the channel.
    pub fn default_strategy(self) -> MergeStrategy {
        match self {
            Channel::Dimmer => MergeStrategy::Htp,
            _ => MergeStrategy::Ltp,
        }
    }

    /// The value a channel rests at when nothing drives it.
    pub fn neutral_value(self) -> f64 {
        match self {
            Channel::Pan | Channel::Tilt | Channel::Zoom | Channel::Focus => DMX_CENTER,
            _ => 0.0,
        }
    }

    /// Channels that emit light. These are forced to zero under blackout.
    pub fn emits_light(self) -> bool {
        matches!(
            self,
            Channel::Dimmer
                | Channel::Red
                | Channel::Green
                | Channel::Blue
                | Channel::White
                | Channel::Amber
                | Channel::Uv
                | Channel::Strobe
        )
    }

    pub fn is_position(self) -> bool {
        matches!(self, Channel::Pan | Channel::Tilt)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "dimmer" | "intensity" => Ok(Channel::Dimmer),
            "red" => Ok(Channel::Red),
            "green" => Ok(Channel::Green),
            "blue" => Ok(Channel::Blue),
            "white" => Ok(Channel::White),
            "pan" => Ok(Channel::Pan),
            "tilt" => Ok(Channel::Tilt),
            "zoom" => Ok(Channel::Zoom),
            "focus" => Ok(Channel::Focus),
            "gobo" => Ok(Channel::Gobo),
            "prism" => Ok(Channel::Prism),
            "speed" => Ok(Channel::Speed),
            "color_wheel" | "colour_wheel" | "colorwheel" => Ok(Channel::ColorWheel),
            "strobe" | "shutter" => Ok(Channel::Strobe),
            "amber" => Ok(Channel::Amber),
            "uv" => Ok(Channel::Uv),
            _ => Err(ParseError::new("channel", s)),
        }
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// A fixed-size per-channel table. Lookups never allocate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMap<T>([T; Channel::COUNT]);

impl<T: Copy> ChannelMap<T> {
    pub fn filled(value: T) -> Self {
        ChannelMap([value; Channel::COUNT])
    }

    pub fn from_fn(f: impl Fn(Channel) -> T) -> Self {
        let mut values = [f(Channel::Dimmer); Channel::COUNT];
        for channel in Channel::ALL {
            values[channel.index()] = f(channel);
        }
        ChannelMap(values)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, T)> + '_ {
        Channel::ALL.iter().map(move |c| (*c, self.0[c.index()]))
    }
}

impl<T: Copy + Default> Default for ChannelMap<T> {
    fn default() -> Self {
        ChannelMap([T::default(); Channel::COUNT])
    }
}

impl<T> Index<Channel> for ChannelMap<T> {
    type Output = T;

    #[inline]
    fn index(&self, channel: Channel) -> &T {
        &self.0[channel.index()]
    }
}

impl<T> IndexMut<Channel> for ChannelMap<T> {
    #[inline]
    fn index_mut(&mut self, channel: Channel) -> &mut T {
        &mut self.0[channel.index()]
    }
}

impl<T: Serialize> Serialize for ChannelMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Channel::COUNT))?;
        for channel in Channel::ALL {
            map.serialize_entry(channel.name(), &self.0[channel.index()])?;
        }
        map.end()
    }
}

/// Bitwise set of channels, in the same spirit as fixture capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ChannelSet(u32);

impl ChannelSet {
    pub const EMPTY: ChannelSet = ChannelSet(0);

    pub fn all() -> ChannelSet {
        ChannelSet((1 << Channel::COUNT) - 1)
    }

    #[inline]
    pub fn contains(&self, channel: Channel) -> bool {
        (self.0 & (1 << channel.index())) != 0
    }

    #[inline]
    pub fn with(&self, channel: Channel) -> ChannelSet {
        ChannelSet(self.0 | (1 << channel.index()))
    }

    #[inline]
    pub fn insert(&mut self, channel: Channel) {
        self.0 |= 1 << channel.index();
    }

    #[inline]
    pub fn remove(&mut self, channel: Channel) {
        self.0 &= !(1 << channel.index());
    }

    #[inline]
    pub fn union(&self, other: ChannelSet) -> ChannelSet {
        ChannelSet(self.0 | other.0)
    }

    #[inline]
    pub fn intersection(&self, other: ChannelSet) -> ChannelSet {
        ChannelSet(self.0 & other.0)
    }

    #[inline]
    pub fn difference(&self, other: ChannelSet) -> ChannelSet {
        ChannelSet(self.0 & !other.0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<I: IntoIterator<Item = Channel>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ChannelSet::EMPTY, |set, channel| set.with(channel))
    }
}

impl<const N: usize> From<[Channel; N]> for ChannelSet {
    fn from(channels: [Channel; N]) -> Self {
        channels.into_iter().collect()
    }
}

impl Serialize for ChannelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for channel in self.iter() {
            seq.serialize_element(channel.name())?;
        }
        seq.end()
    }
}

/// Which side of the stage a fixture sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// Spatial/functional zones the AI producer addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Front,
    Back,
    Left,
    Right,
    Center,
    Floor,
    Elevated,
    Ambient,
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl Zone {
    /// The broader zone a stereo zone falls back to when the intent has no entry for it.
    pub fn parent(self) -> Option<Zone> {
        match self {
            Zone::FrontLeft | Zone::FrontRight => Some(Zone::Front),
            Zone::BackLeft | Zone::BackRight => Some(Zone::Back),
            _ => None,
        }
    }

    /// The side implied by the zone itself, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            Zone::Left | Zone::FrontLeft | Zone::BackLeft => Some(Side::Left),
            Zone::Right | Zone::FrontRight | Zone::BackRight => Some(Side::Right),
            _ => None,
        }
    }
}

impl FromStr for Zone {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_', ' '], "");
        match normalized.as_str() {
            "front" => Ok(Zone::Front),
            "back" | "rear" => Ok(Zone::Back),
            "left" => Ok(Zone::Left),
            "right" => Ok(Zone::Right),
            "center" | "centre" => Ok(Zone::Center),
            "floor" => Ok(Zone::Floor),
            "elevated" | "truss" => Ok(Zone::Elevated),
            "ambient" => Ok(Zone::Ambient),
            "frontleft" | "frontl" => Ok(Zone::FrontLeft),
            "frontright" | "frontr" => Ok(Zone::FrontRight),
            "backleft" | "backl" => Ok(Zone::BackLeft),
            "backright" | "backr" => Ok(Zone::BackRight),
            _ => Err(ParseError::new("zone", s)),
        }
    }
}

/// How a fixture produces color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMixing {
    /// Direct LED RGB mixing.
    Rgb,
    /// LED RGB plus a white emitter.
    Rgbw,
    /// Subtractive mixing flags found on high end discharge fixtures.
    Cmy,
    /// A physical wheel of fixed color slots.
    Wheel,
    /// Wheel plus CMY.
    Hybrid,
}

impl ColorMixing {
    /// Fixtures that can only produce a fixed set of colors.
    pub fn is_discrete(self) -> bool {
        matches!(self, ColorMixing::Wheel | ColorMixing::Hybrid)
    }
}

/// A patched fixture as seen by the arbiter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fixture {
    pub id: String,
    pub name: String,
    pub zone: Zone,
    /// Explicit stage side. Resolved at registration time, never per frame.
    pub side: Option<Side>,
    pub fixture_type: String,
    pub channels: ChannelSet,
    pub has_movement: bool,
    pub color_mixing: ColorMixing,
    /// Capability profile id used by the hardware layer.
    pub profile: Option<String>,
}

impl Fixture {
    pub fn new(id: &str, zone: Zone, fixture_type: &str, channels: ChannelSet) -> Fixture {
        let color_mixing = if channels.contains(Channel::ColorWheel)
            && !(channels.contains(Channel::Red)
                && channels.contains(Channel::Green)
                && channels.contains(Channel::Blue))
        {
            ColorMixing::Wheel
        } else if channels.contains(Channel::White) {
            ColorMixing::Rgbw
        } else {
            ColorMixing::Rgb
        };

        Fixture {
            id: id.to_string(),
            name: id.to_string(),
            zone,
            side: zone.side(),
            fixture_type: fixture_type.to_string(),
            channels,
            has_movement: channels.contains(Channel::Pan) || channels.contains(Channel::Tilt),
            color_mixing,
            profile: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Fixture {
        self.name = name.to_string();
        self
    }

    pub fn with_side(mut self, side: Side) -> Fixture {
        self.side = Some(side);
        self
    }

    pub fn with_profile(mut self, profile: &str) -> Fixture {
        self.profile = Some(profile.to_string());
        self
    }

    pub fn with_color_mixing(mut self, color_mixing: ColorMixing) -> Fixture {
        self.color_mixing = color_mixing;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_ordering() {
        assert!(ControlLayer::AiIntent < ControlLayer::Consciousness);
        assert!(ControlLayer::Consciousness < ControlLayer::Manual);
        assert!(ControlLayer::Manual < ControlLayer::Effects);
        assert!(ControlLayer::Effects < ControlLayer::Blackout);
    }

    #[test]
    fn test_default_strategies() {
        assert_eq!(Channel::Dimmer.default_strategy(), MergeStrategy::Htp);
        assert_eq!(Channel::Pan.default_strategy(), MergeStrategy::Ltp);
        assert_eq!(Channel::Red.default_strategy(), MergeStrategy::Ltp);
        assert_eq!(Channel::Zoom.default_strategy(), MergeStrategy::Ltp);
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!("dimmer".parse::<Channel>().unwrap(), Channel::Dimmer);
        assert_eq!("Color-Wheel".parse::<Channel>().unwrap(), Channel::ColorWheel);
        assert_eq!("shutter".parse::<Channel>().unwrap(), Channel::Strobe);
        assert!("laser".parse::<Channel>().is_err());

        for channel in Channel::ALL {
            assert_eq!(channel.name().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn test_channel_set() {
        let mut set = ChannelSet::from([Channel::Pan, Channel::Tilt]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(Channel::Pan));
        assert!(!set.contains(Channel::Dimmer));

        set.remove(Channel::Pan);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Channel::Tilt]);

        let union = set.union(ChannelSet::from([Channel::Red]));
        assert_eq!(union.len(), 2);
        assert_eq!(ChannelSet::all().len(), Channel::COUNT);
    }

    #[test]
    fn test_zone_parsing_and_sides() {
        assert_eq!("frontL".parse::<Zone>().unwrap(), Zone::FrontLeft);
        assert_eq!("back-right".parse::<Zone>().unwrap(), Zone::BackRight);
        assert_eq!(Zone::FrontLeft.parent(), Some(Zone::Front));
        assert_eq!(Zone::BackRight.side(), Some(Side::Right));
        assert_eq!(Zone::Center.side(), None);
    }

    #[test]
    fn test_fixture_capabilities_from_channels() {
        let wheel = Fixture::new(
            "beam-1",
            Zone::Back,
            "beam",
            ChannelSet::from([Channel::Dimmer, Channel::ColorWheel, Channel::Pan]),
        );
        assert_eq!(wheel.color_mixing, ColorMixing::Wheel);
        assert!(wheel.has_movement);

        let par = Fixture::new(
            "par-1",
            Zone::FrontLeft,
            "par",
            ChannelSet::from([Channel::Dimmer, Channel::Red, Channel::Green, Channel::Blue]),
        );
        assert_eq!(par.color_mixing, ColorMixing::Rgb);
        assert!(!par.has_movement);
        assert_eq!(par.side, Some(Side::Left));
    }

    #[test]
    fn test_clamp_dmx() {
        assert_eq!(clamp_dmx(-3.0), 0.0);
        assert_eq!(clamp_dmx(300.0), 255.0);
        assert_eq!(clamp_dmx(f64::NAN), 0.0);
        assert_eq!(to_dmx(127.6), 128);
    }
}
