//! Transition calculator
//!
//! Pure computation of the fade envelope between the outgoing ("from") side
//! and the incoming ("to") side of a transition. All results are seconds on
//! each side's own timeline, already scaled by its playback rate:
//!
//! ```text
//! second = frame_position / (sample_rate × rate_ratio)
//! ```
//!
//! A side whose sample rate is not known yet (no track, rate `<= 0`) cannot be
//! planned against; the calculator reports it as not ready and the caller
//! retries once the deck reports usable values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attributes::{FadeableAttributes, TrackOrDeckAttributes};
use crate::types::FramePos;

/// Second value reported for positions that cannot be converted
pub const INVALID_SECOND: f64 = -1.0;

/// Default transition time in seconds
pub const DEFAULT_TRANSITION_TIME: f64 = 10.0;

/// How the fade window is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransitionMode {
    /// Fade over the outgoing outro while the incoming intro plays
    #[default]
    FullIntroOutro,
    /// Fixed-length fade starting at the outgoing outro start
    FadeAtOutroStart,
    /// Fixed-length fade ending at the outgoing track's end, cue points ignored
    FixedFullTrack,
    /// Like `FixedFullTrack`, but leading and trailing silence are skipped
    FixedSkipSilence,
}

impl TransitionMode {
    pub const ALL: [TransitionMode; 4] = [
        TransitionMode::FullIntroOutro,
        TransitionMode::FadeAtOutroStart,
        TransitionMode::FixedFullTrack,
        TransitionMode::FixedSkipSilence,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TransitionMode::FullIntroOutro => "Full Intro + Outro",
            TransitionMode::FadeAtOutroStart => "Fade At Outro Start",
            TransitionMode::FixedFullTrack => "Full Track",
            TransitionMode::FixedSkipSilence => "Skip Silence",
        }
    }
}

/// Why a transition could not be planned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("outgoing side has no track, no length or an invalid sample rate")]
    FromNotReady,
    #[error("incoming side has no track, no length or an invalid sample rate")]
    ToNotReady,
}

/// Planned fade: the outgoing envelope and the incoming seek point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub from: FadeableAttributes,
    pub to: FadeableAttributes,
}

fn effective_rate(track: &dyn TrackOrDeckAttributes) -> f64 {
    let rate = track.rate_ratio();
    if rate.is_finite() && rate > 0.0 {
        rate
    } else {
        1.0
    }
}

/// Convert a frame position of `track` to seconds at its current playback rate.
///
/// `None` when the position is unset or the sample rate is invalid.
pub fn frame_position_to_seconds(
    position: Option<FramePos>,
    track: &dyn TrackOrDeckAttributes,
) -> Option<f64> {
    let rate = track.sample_rate()?;
    position.map(|pos| pos.value() / (rate.hz() * effective_rate(track)))
}

/// Track length in seconds, which is also the second of its end
pub fn end_second(track: &dyn TrackOrDeckAttributes) -> Option<f64> {
    frame_position_to_seconds(track.track_end_position(), track)
}

/// Like [`end_second`] but with the [`INVALID_SECOND`] sentinel
pub fn end_second_or_invalid(track: &dyn TrackOrDeckAttributes) -> f64 {
    end_second(track).unwrap_or(INVALID_SECOND)
}

/// First audible second, `0` when silence was never analysed
pub fn first_sound_second(track: &dyn TrackOrDeckAttributes) -> f64 {
    frame_position_to_seconds(track.first_sound_position(), track).unwrap_or(0.0)
}

/// Last audible second, the track end when silence was never analysed
pub fn last_sound_second(track: &dyn TrackOrDeckAttributes) -> Option<f64> {
    frame_position_to_seconds(track.last_sound_position(), track).or_else(|| end_second(track))
}

/// Intro start, falling back to the first sound
pub fn intro_start_second(track: &dyn TrackOrDeckAttributes) -> f64 {
    frame_position_to_seconds(track.intro_start_position(), track)
        .unwrap_or_else(|| first_sound_second(track))
}

pub fn intro_end_second(track: &dyn TrackOrDeckAttributes) -> Option<f64> {
    frame_position_to_seconds(track.intro_end_position(), track)
}

pub fn outro_start_second(track: &dyn TrackOrDeckAttributes) -> Option<f64> {
    frame_position_to_seconds(track.outro_start_position(), track)
}

/// Outro end, falling back to the track end
pub fn outro_end_second(track: &dyn TrackOrDeckAttributes) -> Option<f64> {
    frame_position_to_seconds(track.outro_end_position(), track).or_else(|| end_second(track))
}

/// Current playback second of `track`, `None` while the position is not a number
pub fn current_second(track: &dyn TrackOrDeckAttributes) -> Option<f64> {
    let position = track.play_position();
    if !position.is_finite() {
        return None;
    }
    end_second(track).map(|end| position.clamp(0.0, 1.0) * end)
}

/// Plan the transition from `from` to `to`.
///
/// With `seek_to_start_point` the incoming side gets a seek point (intro
/// start, first sound or track start depending on `mode`); otherwise it keeps
/// its current position, e.g. because the operator cued it by hand.
/// Negative transition times count as zero: the fade becomes a cut.
pub fn calculate_transition(
    from: &dyn TrackOrDeckAttributes,
    to: &dyn TrackOrDeckAttributes,
    mode: TransitionMode,
    transition_time: f64,
    seek_to_start_point: bool,
) -> Result<Transition, TransitionError> {
    let from_end = end_second(from)
        .filter(|end| *end > 0.0)
        .ok_or(TransitionError::FromNotReady)?;
    let to_end = end_second(to)
        .filter(|end| *end > 0.0)
        .ok_or(TransitionError::ToNotReady)?;
    let time = transition_time.max(0.0);

    let (fade_begin, fade_end, to_start) = match mode {
        TransitionMode::FullIntroOutro => {
            let end = outro_end_second(from).unwrap_or(from_end);
            let begin = outro_start_second(from).unwrap_or(from_end - time);
            // Outro start at or past its end leaves no window; use a fixed fade
            let begin = if begin < end { begin } else { end - time };
            (begin, end, intro_start_second(to))
        }
        TransitionMode::FadeAtOutroStart => {
            let begin = outro_start_second(from).unwrap_or(from_end - time);
            (begin, begin + time, intro_start_second(to))
        }
        TransitionMode::FixedFullTrack => (from_end - time, from_end, 0.0),
        TransitionMode::FixedSkipSilence => {
            let end = last_sound_second(from).unwrap_or(from_end);
            (end - time, end, first_sound_second(to))
        }
    };

    let fade_end = fade_end.clamp(0.0, from_end);
    let mut fade_begin = fade_begin.clamp(0.0, fade_end);
    if let Some(position) = current_second(from) {
        // Already inside (or past) the window, e.g. after a seek
        if position > fade_begin {
            fade_begin = position.min(fade_end);
        }
    }

    let to_start = to_start.clamp(0.0, to_end);
    let fade_in_begin = if seek_to_start_point {
        to_start
    } else {
        current_second(to).unwrap_or(to_start)
    };
    let fade_in_end = match mode {
        TransitionMode::FullIntroOutro => intro_end_second(to).unwrap_or(fade_in_begin + time),
        _ => fade_in_begin + time,
    }
    .clamp(fade_in_begin, to_end);

    Ok(Transition {
        from: FadeableAttributes::fade_out(fade_begin, fade_end),
        to: FadeableAttributes::fade_in(
            seek_to_start_point.then_some(to_start),
            fade_in_begin,
            fade_in_end,
        ),
    })
}

/// Plan a transition that starts right now.
///
/// The fade lasts `transition_time` seconds from the outgoing side's current
/// position, cut short by its end. The incoming side is planned as in
/// [`calculate_transition`].
pub fn fade_now_transition(
    from: &dyn TrackOrDeckAttributes,
    to: &dyn TrackOrDeckAttributes,
    mode: TransitionMode,
    transition_time: f64,
    seek_to_start_point: bool,
) -> Result<Transition, TransitionError> {
    let mut transition =
        calculate_transition(from, to, mode, transition_time, seek_to_start_point)?;
    let from_end = end_second(from).ok_or(TransitionError::FromNotReady)?;
    let now = current_second(from).unwrap_or(0.0);
    let end = (now + transition_time.max(0.0)).min(from_end);
    transition.from = FadeableAttributes::fade_out(now.min(end), end);
    Ok(transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{TrackAttributes, TrackMetadata};
    use crate::types::{SampleRate, TrackId};

    const RATE: f64 = 44100.0;

    fn track(metadata: TrackMetadata) -> TrackAttributes {
        TrackAttributes::new(TrackId(1), metadata)
    }

    /// Plan with seeking, the way a fresh load is planned
    fn plan(
        from: &dyn TrackOrDeckAttributes,
        to: &dyn TrackOrDeckAttributes,
        mode: TransitionMode,
        time: f64,
    ) -> Transition {
        calculate_transition(from, to, mode, time, true).unwrap()
    }

    fn outgoing() -> TrackAttributes {
        track(TrackMetadata::new("a", RATE, 200.0).with_outro(180.0, 200.0))
    }

    fn incoming() -> TrackAttributes {
        track(TrackMetadata::new("b", RATE, 240.0).with_intro(0.0, 10.0))
    }

    /// Deck-like view with a controllable position and rate
    struct Playing {
        inner: TrackAttributes,
        position: f64,
        rate: f64,
    }

    impl TrackOrDeckAttributes for Playing {
        fn intro_start_position(&self) -> Option<FramePos> {
            self.inner.intro_start_position()
        }
        fn intro_end_position(&self) -> Option<FramePos> {
            self.inner.intro_end_position()
        }
        fn outro_start_position(&self) -> Option<FramePos> {
            self.inner.outro_start_position()
        }
        fn outro_end_position(&self) -> Option<FramePos> {
            self.inner.outro_end_position()
        }
        fn first_sound_position(&self) -> Option<FramePos> {
            self.inner.first_sound_position()
        }
        fn last_sound_position(&self) -> Option<FramePos> {
            self.inner.last_sound_position()
        }
        fn sample_rate(&self) -> Option<SampleRate> {
            self.inner.sample_rate()
        }
        fn track_end_position(&self) -> Option<FramePos> {
            self.inner.track_end_position()
        }
        fn play_position(&self) -> f64 {
            self.position
        }
        fn rate_ratio(&self) -> f64 {
            self.rate
        }
        fn loaded_track(&self) -> Option<TrackId> {
            self.inner.loaded_track()
        }
    }

    #[test]
    fn test_full_intro_outro_uses_cues() {
        let t = plan(&outgoing(), &incoming(), TransitionMode::FullIntroOutro, 8.0);
        assert_eq!(t.from.fade_begin_pos, 180.0);
        assert_eq!(t.from.fade_end_pos, 200.0);
        assert_eq!(t.from.fade_duration_seconds, 20.0);
        assert_eq!(t.to.start_pos, Some(0.0));
        assert_eq!(t.to.fade_end_pos, 10.0);
    }

    #[test]
    fn test_full_intro_outro_fallbacks() {
        let from = track(TrackMetadata::new("a", RATE, 200.0));
        let to = track(TrackMetadata::new("b", RATE, 100.0).with_sound_range(2.5, 98.0));
        let t = plan(&from, &to, TransitionMode::FullIntroOutro, 8.0);
        // Outro start unset: end - time; outro end unset: track end
        assert_eq!(t.from.fade_begin_pos, 192.0);
        assert_eq!(t.from.fade_end_pos, 200.0);
        assert_eq!(t.from.fade_duration_seconds, 8.0);
        // Intro start unset: first sound; intro end unset: start + time
        assert_eq!(t.to.start_pos, Some(2.5));
        assert_eq!(t.to.fade_end_pos, 10.5);
    }

    #[test]
    fn test_full_intro_outro_empty_outro_uses_fixed_fade() {
        // Outro start on the track end
        let from = track(TrackMetadata::new("a", RATE, 200.0).with_outro(200.0, 200.0));
        let t = plan(&from, &incoming(), TransitionMode::FullIntroOutro, 8.0);
        assert_eq!(t.from.fade_begin_pos, 192.0);
        assert_eq!(t.from.fade_end_pos, 200.0);
        assert_eq!(t.from.fade_duration_seconds, 8.0);

        // Inverted outro cues keep the outro end
        let from = track(TrackMetadata::new("a", RATE, 200.0).with_outro(195.0, 190.0));
        let t = plan(&from, &incoming(), TransitionMode::FullIntroOutro, 8.0);
        assert_eq!(t.from.fade_begin_pos, 182.0);
        assert_eq!(t.from.fade_end_pos, 190.0);
        assert_eq!(t.from.fade_duration_seconds, 8.0);
    }

    #[test]
    fn test_non_finite_position_counts_as_unknown() {
        let to = Playing {
            inner: incoming(),
            position: f64::NAN,
            rate: 1.0,
        };
        assert_eq!(current_second(&to), None);

        // Keeping an unknown position falls back to the start point
        let t = calculate_transition(&outgoing(), &to, TransitionMode::FullIntroOutro, 8.0, false)
            .unwrap();
        assert_eq!(t.to.start_pos, None);
        assert_eq!(t.to.fade_begin_pos, 0.0);
        assert_eq!(t.to.fade_end_pos, 10.0);

        let from = Playing {
            inner: outgoing(),
            position: f64::INFINITY,
            rate: 1.0,
        };
        let t = plan(&from, &incoming(), TransitionMode::FullIntroOutro, 8.0);
        assert_eq!(t.from.fade_begin_pos, 180.0);
    }

    #[test]
    fn test_fade_at_outro_start() {
        let t = plan(&outgoing(), &incoming(), TransitionMode::FadeAtOutroStart, 8.0);
        assert_eq!(t.from.fade_begin_pos, 180.0);
        assert_eq!(t.from.fade_end_pos, 188.0);

        let from = track(TrackMetadata::new("a", RATE, 200.0));
        let t = plan(&from, &incoming(), TransitionMode::FadeAtOutroStart, 8.0);
        assert_eq!(t.from.fade_begin_pos, 192.0);
        assert_eq!(t.from.fade_end_pos, 200.0);
    }

    #[test]
    fn test_fade_at_outro_start_clamped_to_end() {
        let from = track(TrackMetadata::new("a", RATE, 200.0).with_outro(196.0, 200.0));
        let t = plan(&from, &incoming(), TransitionMode::FadeAtOutroStart, 8.0);
        assert_eq!(t.from.fade_begin_pos, 196.0);
        assert_eq!(t.from.fade_end_pos, 200.0);
    }

    #[test]
    fn test_fixed_full_track_ignores_cues() {
        let t = plan(&outgoing(), &incoming(), TransitionMode::FixedFullTrack, 8.0);
        assert_eq!(t.from.fade_begin_pos, 192.0);
        assert_eq!(t.from.fade_end_pos, 200.0);
        assert_eq!(t.to.start_pos, Some(0.0));
    }

    #[test]
    fn test_fixed_skip_silence() {
        let from = track(TrackMetadata::new("a", RATE, 200.0).with_sound_range(0.0, 195.0));
        let to = track(TrackMetadata::new("b", RATE, 200.0).with_sound_range(1.5, 199.0));
        let t = plan(&from, &to, TransitionMode::FixedSkipSilence, 8.0);
        assert_eq!(t.from.fade_begin_pos, 187.0);
        assert_eq!(t.from.fade_end_pos, 195.0);
        assert_eq!(t.to.start_pos, Some(1.5));
    }

    #[test]
    fn test_invalid_sample_rate_is_not_ready() {
        let mut broken = TrackMetadata::new("a", RATE, 200.0).with_outro(180.0, 200.0);
        broken.sample_rate = 0.0;
        let from = track(broken.clone());
        assert_eq!(end_second_or_invalid(&from), INVALID_SECOND);
        assert_eq!(
            calculate_transition(&from, &incoming(), TransitionMode::FullIntroOutro, 8.0, true),
            Err(TransitionError::FromNotReady)
        );
        assert_eq!(
            calculate_transition(
                &incoming(),
                &track(broken),
                TransitionMode::FullIntroOutro,
                8.0,
                true
            ),
            Err(TransitionError::ToNotReady)
        );
    }

    #[test]
    fn test_zero_and_negative_time_is_a_cut() {
        let from = track(TrackMetadata::new("a", RATE, 200.0));
        for time in [0.0, -5.0] {
            let t = plan(&from, &incoming(), TransitionMode::FixedFullTrack, time);
            assert_eq!(t.from.fade_begin_pos, 200.0);
            assert_eq!(t.from.fade_end_pos, 200.0);
            assert_eq!(t.from.fade_duration_seconds, 0.0);
        }
    }

    #[test]
    fn test_transition_longer_than_track() {
        let from = track(TrackMetadata::new("a", RATE, 5.0));
        let t = plan(&from, &incoming(), TransitionMode::FixedFullTrack, 8.0);
        assert_eq!(t.from.fade_begin_pos, 0.0);
        assert_eq!(t.from.fade_end_pos, 5.0);
    }

    #[test]
    fn test_envelope_ordering_holds_for_all_modes() {
        let from = track(
            TrackMetadata::new("a", RATE, 200.0)
                .with_intro(0.0, 12.0)
                .with_outro(170.0, 198.0)
                .with_sound_range(0.5, 199.0),
        );
        let to = track(
            TrackMetadata::new("b", RATE, 180.0)
                .with_intro(3.0, 20.0)
                .with_outro(160.0, 178.0)
                .with_sound_range(1.0, 179.0),
        );
        for mode in TransitionMode::ALL {
            for time in [0.0, 4.0, 10.0, 60.0, 500.0] {
                let t = plan(&from, &to, mode, time);
                assert!(t.from.fade_begin_pos <= t.from.fade_end_pos, "{:?} {}", mode, time);
                assert!(t.from.fade_end_pos <= 200.0, "{:?} {}", mode, time);
                assert!(t.from.fade_begin_pos >= 0.0);
                assert!(t.to.fade_begin_pos <= t.to.fade_end_pos);
            }
        }
    }

    #[test]
    fn test_rate_ratio_scales_seconds() {
        let from = Playing {
            inner: outgoing(),
            position: 0.0,
            rate: 2.0,
        };
        let t = plan(&from, &incoming(), TransitionMode::FullIntroOutro, 8.0);
        assert_eq!(t.from.fade_begin_pos, 90.0);
        assert_eq!(t.from.fade_end_pos, 100.0);
    }

    #[test]
    fn test_position_past_fade_begin() {
        let from = Playing {
            inner: outgoing(),
            position: 0.9375,
            rate: 1.0,
        };
        let t = plan(&from, &incoming(), TransitionMode::FullIntroOutro, 8.0);
        assert_eq!(t.from.fade_begin_pos, 187.5);
        assert_eq!(t.from.fade_end_pos, 200.0);
    }

    #[test]
    fn test_keep_to_position() {
        let to = Playing {
            inner: incoming(),
            position: 0.25,
            rate: 1.0,
        };
        let t = calculate_transition(&outgoing(), &to, TransitionMode::FixedFullTrack, 8.0, false)
            .unwrap();
        assert_eq!(t.to.start_pos, None);
        assert_eq!(t.to.fade_begin_pos, 60.0);
        assert_eq!(t.to.fade_end_pos, 68.0);
    }

    #[test]
    fn test_fade_now_starts_at_current_position() {
        let from = Playing {
            inner: outgoing(),
            position: 0.5,
            rate: 1.0,
        };
        let t = fade_now_transition(&from, &incoming(), TransitionMode::FullIntroOutro, 8.0, true)
            .unwrap();
        assert_eq!(t.from.fade_begin_pos, 100.0);
        assert_eq!(t.from.fade_end_pos, 108.0);

        let near_end = Playing {
            inner: outgoing(),
            position: 0.99,
            rate: 1.0,
        };
        let t =
            fade_now_transition(&near_end, &incoming(), TransitionMode::FullIntroOutro, 8.0, true)
                .unwrap();
        assert_eq!(t.from.fade_end_pos, 200.0);
        assert!(t.from.fade_begin_pos <= t.from.fade_end_pos);
    }
}
