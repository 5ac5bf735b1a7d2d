//! Read-only attribute view shared by live decks and queued tracks
//!
//! The transition calculator works on "whatever is about to play": either a
//! deck with a loaded track ([`crate::deck::DeckAttributes`]) or a track still
//! waiting in the queue ([`crate::track::TrackAttributes`]). Both implement
//! [`TrackOrDeckAttributes`], so the math is written once.

use crate::types::{FramePos, SampleRate, TrackId};

/// Accessors needed to plan a transition
///
/// Positions are in frames and `None` when unset. `play_position` is the
/// fraction (0..1) of the track already played.
pub trait TrackOrDeckAttributes {
    fn intro_start_position(&self) -> Option<FramePos>;
    fn intro_end_position(&self) -> Option<FramePos>;
    fn outro_start_position(&self) -> Option<FramePos>;
    fn outro_end_position(&self) -> Option<FramePos>;
    /// First audible frame (leading silence excluded)
    fn first_sound_position(&self) -> Option<FramePos>;
    /// Last audible frame (trailing silence excluded)
    fn last_sound_position(&self) -> Option<FramePos>;
    fn sample_rate(&self) -> Option<SampleRate>;
    fn track_end_position(&self) -> Option<FramePos>;
    fn play_position(&self) -> f64;
    fn rate_ratio(&self) -> f64;
    fn loaded_track(&self) -> Option<TrackId>;

    fn is_empty(&self) -> bool {
        self.loaded_track().is_none()
    }
}

/// Per-transition working state of one side of a fade
///
/// All positions are seconds on that side's own timeline. The outgoing side
/// uses `fade_begin_pos`/`fade_end_pos`; the incoming side uses `start_pos`
/// and describes its fade-in window with `fade_begin_pos`/`fade_end_pos`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FadeableAttributes {
    /// Second to seek to before starting playback; `None` keeps the current position
    pub start_pos: Option<f64>,
    pub fade_begin_pos: f64,
    pub fade_end_pos: f64,
    pub fade_duration_seconds: f64,
    pub is_from_deck: bool,
}

impl FadeableAttributes {
    /// Fade-out envelope of the outgoing side
    pub fn fade_out(begin: f64, end: f64) -> Self {
        Self {
            start_pos: None,
            fade_begin_pos: begin,
            fade_end_pos: end,
            fade_duration_seconds: (end - begin).max(0.0),
            is_from_deck: true,
        }
    }

    /// Seek point and fade-in window of the incoming side
    pub fn fade_in(start: Option<f64>, begin: f64, end: f64) -> Self {
        Self {
            start_pos: start,
            fade_begin_pos: begin,
            fade_end_pos: end,
            fade_duration_seconds: (end - begin).max(0.0),
            is_from_deck: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_out_duration_never_negative() {
        let fade = FadeableAttributes::fade_out(20.0, 10.0);
        assert_eq!(fade.fade_duration_seconds, 0.0);
        assert!(fade.is_from_deck);
        assert!(fade.start_pos.is_none());
    }

    #[test]
    fn test_fade_in_keeps_start() {
        let fade = FadeableAttributes::fade_in(Some(1.5), 1.5, 9.5);
        assert_eq!(fade.start_pos, Some(1.5));
        assert_eq!(fade.fade_duration_seconds, 8.0);
        assert!(!fade.is_from_deck);
    }
}
