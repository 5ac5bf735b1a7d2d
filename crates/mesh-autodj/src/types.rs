//! Common types for mesh-autodj
//!
//! Frame positions, sample rates and deck orientation as they travel over the
//! control bus. The bus speaks in *engine samples* (interleaved stereo, so two
//! samples per frame) with `-1` meaning "unset"; these types convert that
//! convention into something the transition math can use safely.

use serde::{Deserialize, Serialize};

/// Number of interleaved channels per frame in engine sample positions
pub const ENGINE_CHANNEL_COUNT: f64 = 2.0;

/// Value the engine publishes for a cue point or length that is not set
pub const LEGACY_INVALID_ENGINE_POSITION: f64 = -1.0;

/// A position in a track measured in frames (one frame = one stereo sample)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct FramePos(f64);

impl FramePos {
    /// Create a frame position, returning `None` for negative or non-finite values
    pub fn new(frames: f64) -> Option<Self> {
        if frames.is_finite() && frames >= 0.0 {
            Some(Self(frames))
        } else {
            None
        }
    }

    /// Convert an engine sample position (interleaved stereo) to frames.
    ///
    /// Returns `None` for the legacy `-1` marker and any other negative or
    /// non-finite value, so callers never see garbage positions.
    pub fn from_engine_sample_pos(samples: f64) -> Option<Self> {
        if samples == LEGACY_INVALID_ENGINE_POSITION {
            return None;
        }
        Self::new(samples / ENGINE_CHANNEL_COUNT)
    }

    /// Convert back to the engine sample convention
    pub fn to_engine_sample_pos(self) -> f64 {
        self.0 * ENGINE_CHANNEL_COUNT
    }

    /// Frame count as a float
    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

/// Sample rate in Hz. Only positive, finite rates are representable.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct SampleRate(f64);

impl SampleRate {
    /// Create a sample rate, returning `None` for rates `<= 0`
    pub fn from_hz(hz: f64) -> Option<Self> {
        if hz.is_finite() && hz > 0.0 {
            Some(Self(hz))
        } else {
            None
        }
    }

    /// Rate in Hz
    #[inline]
    pub fn hz(self) -> f64 {
        self.0
    }
}

/// Physical position of a deck relative to the crossfader
///
/// The numeric values match what the engine publishes on the `orientation`
/// parameter of each deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Left,
    Center,
    Right,
}

impl Orientation {
    /// Decode the bus value (0 = left, 1 = center, 2 = right)
    pub fn from_value(value: f64) -> Self {
        match value.round() as i64 {
            0 => Orientation::Left,
            2 => Orientation::Right,
            _ => Orientation::Center,
        }
    }

    /// Encode for the bus
    pub fn value(self) -> f64 {
        match self {
            Orientation::Left => 0.0,
            Orientation::Center => 1.0,
            Orientation::Right => 2.0,
        }
    }
}

/// Stable reference to a track in the collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
