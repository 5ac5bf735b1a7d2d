//! Deck attribute adapter
//!
//! Mirrors the bus parameters of one playback deck and turns incoming bus
//! events into [`DeckChange`] notifications.
//!
//! Reads never block: they return the last value the bus delivered.
//! Writes (`play`, `stop`, `set_play_position`, ...) only *request* a change
//! on the bus; the cached value is updated when the change comes back through
//! [`DeckAttributes::apply`], so the bus stays the single source of truth.

use std::sync::Arc;

use crate::attributes::{FadeableAttributes, TrackOrDeckAttributes};
use crate::bus::{BusEvent, ControlBus, Origin, ParamKey};
use crate::track::TrackMetadata;
use crate::types::{FramePos, Orientation, SampleRate, TrackId, LEGACY_INVALID_ENGINE_POSITION};

/// Parameter item names published per deck group
pub mod items {
    pub const PLAY: &str = "play";
    pub const PLAY_POSITION: &str = "play_position";
    pub const REPEAT: &str = "repeat";
    pub const INTRO_START_POSITION: &str = "intro_start_position";
    pub const INTRO_END_POSITION: &str = "intro_end_position";
    pub const OUTRO_START_POSITION: &str = "outro_start_position";
    pub const OUTRO_END_POSITION: &str = "outro_end_position";
    pub const TRACK_SAMPLES: &str = "track_samples";
    pub const SAMPLERATE: &str = "samplerate";
    pub const RATE_RATIO: &str = "rate_ratio";
    pub const ORIENTATION: &str = "orientation";
}

/// Bus group name of the deck with the given 0-based index
pub fn deck_group(index: usize) -> String {
    format!("[Channel{}]", index + 1)
}

/// Which cue point changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    IntroStart,
    IntroEnd,
    OutroStart,
    OutroEnd,
}

/// Change notification raised by a deck
#[derive(Debug, Clone, PartialEq)]
pub enum DeckChange {
    Play(bool),
    PlayPosition { position: f64, origin: Origin },
    Cue(CueKind),
    /// Rate ratio, sample rate or track length changed; seconds need recomputing
    Timing,
    Orientation(Orientation),
    Repeat(bool),
    TrackLoading(TrackId),
    TrackLoaded(TrackId),
    PlayerEmpty,
}

/// Live view of one deck
pub struct DeckAttributes {
    pub index: usize,
    pub group: String,
    /// Attributes are inconsistent while the player loads a track
    pub loading: bool,
    /// Transition working state while this deck takes part in one
    pub fade: Option<FadeableAttributes>,
    bus: Arc<ControlBus>,
    origin: Origin,
    orientation: Orientation,
    play: bool,
    play_position: f64,
    repeat: bool,
    intro_start: f64,
    intro_end: f64,
    outro_start: f64,
    outro_end: f64,
    track_samples: f64,
    sample_rate: f64,
    rate_ratio: f64,
    loaded_track: Option<TrackId>,
    loaded_metadata: Option<TrackMetadata>,
}

impl DeckAttributes {
    /// Create the adapter and read the current values from the bus.
    ///
    /// `origin` tags every write this adapter makes, so echoes can be told
    /// apart from external changes.
    pub fn new(
        index: usize,
        group: impl Into<String>,
        bus: Arc<ControlBus>,
        origin: Origin,
    ) -> Self {
        let mut deck = Self {
            index,
            group: group.into(),
            loading: false,
            fade: None,
            bus,
            origin,
            orientation: Orientation::Center,
            play: false,
            play_position: 0.0,
            repeat: false,
            intro_start: LEGACY_INVALID_ENGINE_POSITION,
            intro_end: LEGACY_INVALID_ENGINE_POSITION,
            outro_start: LEGACY_INVALID_ENGINE_POSITION,
            outro_end: LEGACY_INVALID_ENGINE_POSITION,
            track_samples: LEGACY_INVALID_ENGINE_POSITION,
            sample_rate: 0.0,
            rate_ratio: 1.0,
            loaded_track: None,
            loaded_metadata: None,
        };
        deck.refresh();
        deck
    }

    fn key(&self, item: &str) -> ParamKey {
        ParamKey::new(self.group.clone(), item)
    }

    /// Re-read every parameter from the bus without raising notifications.
    ///
    /// Only needed when the adapter missed events, e.g. right after creation.
    pub fn refresh(&mut self) {
        let read = |item: &str, default: f64| self.bus.get_or(&self.key(item), default);
        let orientation =
            Orientation::from_value(read(items::ORIENTATION, Orientation::Center.value()));
        let play = read(items::PLAY, 0.0) > 0.0;
        let play_position = read(items::PLAY_POSITION, 0.0);
        let repeat = read(items::REPEAT, 0.0) > 0.0;
        let intro_start = read(items::INTRO_START_POSITION, LEGACY_INVALID_ENGINE_POSITION);
        let intro_end = read(items::INTRO_END_POSITION, LEGACY_INVALID_ENGINE_POSITION);
        let outro_start = read(items::OUTRO_START_POSITION, LEGACY_INVALID_ENGINE_POSITION);
        let outro_end = read(items::OUTRO_END_POSITION, LEGACY_INVALID_ENGINE_POSITION);
        let track_samples = read(items::TRACK_SAMPLES, LEGACY_INVALID_ENGINE_POSITION);
        let sample_rate = read(items::SAMPLERATE, 0.0);
        let rate_ratio = read(items::RATE_RATIO, 1.0);

        self.orientation = orientation;
        self.play = play;
        self.play_position = play_position;
        self.repeat = repeat;
        self.intro_start = intro_start;
        self.intro_end = intro_end;
        self.outro_start = outro_start;
        self.outro_end = outro_end;
        self.track_samples = track_samples;
        self.sample_rate = sample_rate;
        self.rate_ratio = rate_ratio;
    }

    /// Update the cached state from a bus event of this deck's group.
    ///
    /// Returns the resulting change notification, or `None` if the event does
    /// not concern this deck or changes nothing.
    pub fn apply(&mut self, event: &BusEvent) -> Option<DeckChange> {
        if event.group() != self.group {
            return None;
        }
        match event {
            BusEvent::ValueChanged { key, value, origin } => {
                self.apply_value(&key.item, *value, *origin)
            }
            BusEvent::TrackLoading { track, .. } => {
                self.loading = true;
                Some(DeckChange::TrackLoading(*track))
            }
            BusEvent::TrackLoaded { track, .. } => {
                // Cue points and lengths arrived as value changes while loading
                self.loading = false;
                self.loaded_track = Some(*track);
                self.loaded_metadata = None;
                Some(DeckChange::TrackLoaded(*track))
            }
            BusEvent::PlayerEmpty { .. } => {
                self.loading = false;
                self.loaded_track = None;
                self.loaded_metadata = None;
                self.fade = None;
                Some(DeckChange::PlayerEmpty)
            }
            BusEvent::LoadRequested { .. } => None,
        }
    }

    fn apply_value(&mut self, item: &str, value: f64, origin: Origin) -> Option<DeckChange> {
        if !value.is_finite() {
            log::warn!("{}: ignoring non-finite {} = {}", self.group, item, value);
            return None;
        }

        fn update(slot: &mut f64, value: f64) -> bool {
            if *slot == value {
                return false;
            }
            *slot = value;
            true
        }

        match item {
            items::PLAY => {
                let playing = value > 0.0;
                (self.play != playing).then(|| {
                    self.play = playing;
                    DeckChange::Play(playing)
                })
            }
            items::PLAY_POSITION => update(&mut self.play_position, value)
                .then_some(DeckChange::PlayPosition { position: value, origin }),
            items::REPEAT => {
                let repeat = value > 0.0;
                (self.repeat != repeat).then(|| {
                    self.repeat = repeat;
                    DeckChange::Repeat(repeat)
                })
            }
            items::INTRO_START_POSITION => {
                update(&mut self.intro_start, value).then_some(DeckChange::Cue(CueKind::IntroStart))
            }
            items::INTRO_END_POSITION => {
                update(&mut self.intro_end, value).then_some(DeckChange::Cue(CueKind::IntroEnd))
            }
            items::OUTRO_START_POSITION => {
                update(&mut self.outro_start, value).then_some(DeckChange::Cue(CueKind::OutroStart))
            }
            items::OUTRO_END_POSITION => {
                update(&mut self.outro_end, value).then_some(DeckChange::Cue(CueKind::OutroEnd))
            }
            items::TRACK_SAMPLES => {
                update(&mut self.track_samples, value).then_some(DeckChange::Timing)
            }
            items::SAMPLERATE => update(&mut self.sample_rate, value).then_some(DeckChange::Timing),
            items::RATE_RATIO => update(&mut self.rate_ratio, value).then_some(DeckChange::Timing),
            items::ORIENTATION => {
                let orientation = Orientation::from_value(value);
                (self.orientation != orientation).then(|| {
                    self.orientation = orientation;
                    DeckChange::Orientation(orientation)
                })
            }
            _ => None,
        }
    }

    /// Attach the stored metadata of the loaded track (silence range)
    pub fn set_loaded_metadata(&mut self, metadata: Option<TrackMetadata>) {
        self.loaded_metadata = metadata;
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn is_left(&self) -> bool {
        self.orientation == Orientation::Left
    }

    pub fn is_right(&self) -> bool {
        self.orientation == Orientation::Right
    }

    pub fn is_playing(&self) -> bool {
        self.play
    }

    pub fn is_repeat(&self) -> bool {
        self.repeat
    }

    /// Whether this deck is the outgoing side of the current transition
    pub fn is_from_deck(&self) -> bool {
        self.fade.map(|f| f.is_from_deck).unwrap_or(false)
    }

    // ─────────────────────────────────────────────────────────────
    // Fire-and-forget writes
    // ─────────────────────────────────────────────────────────────

    pub fn play(&self) {
        self.bus.set_from(self.origin, self.key(items::PLAY), 1.0);
    }

    pub fn stop(&self) {
        self.bus.set_from(self.origin, self.key(items::PLAY), 0.0);
    }

    /// Seek to a fraction (0..1) of the track
    pub fn set_play_position(&self, position: f64) {
        self.bus
            .set_from(self.origin, self.key(items::PLAY_POSITION), position.clamp(0.0, 1.0));
    }

    pub fn set_repeat(&self, enabled: bool) {
        self.bus
            .set_from(self.origin, self.key(items::REPEAT), if enabled { 1.0 } else { 0.0 });
    }

    /// Ask the player to load `track` (or eject with `None`)
    pub fn request_load(&self, track: Option<TrackId>, play: bool) {
        self.bus.publish(BusEvent::LoadRequested {
            group: self.group.clone(),
            track,
            play,
        });
    }

    fn frame_pos(&self, engine_samples: f64) -> Option<FramePos> {
        if self.loaded_track.is_none() || self.sample_rate().is_none() {
            return None;
        }
        FramePos::from_engine_sample_pos(engine_samples)
    }
}

impl TrackOrDeckAttributes for DeckAttributes {
    fn intro_start_position(&self) -> Option<FramePos> {
        self.frame_pos(self.intro_start)
    }

    fn intro_end_position(&self) -> Option<FramePos> {
        self.frame_pos(self.intro_end)
    }

    fn outro_start_position(&self) -> Option<FramePos> {
        self.frame_pos(self.outro_start)
    }

    fn outro_end_position(&self) -> Option<FramePos> {
        self.frame_pos(self.outro_end)
    }

    fn first_sound_position(&self) -> Option<FramePos> {
        self.loaded_metadata
            .as_ref()
            .and_then(|m| m.first_sound)
            .and_then(FramePos::new)
    }

    fn last_sound_position(&self) -> Option<FramePos> {
        self.loaded_metadata
            .as_ref()
            .and_then(|m| m.last_sound)
            .and_then(FramePos::new)
    }

    fn sample_rate(&self) -> Option<SampleRate> {
        SampleRate::from_hz(self.sample_rate)
    }

    fn track_end_position(&self) -> Option<FramePos> {
        self.frame_pos(self.track_samples)
    }

    fn play_position(&self) -> f64 {
        self.play_position
    }

    fn rate_ratio(&self) -> f64 {
        self.rate_ratio
    }

    fn loaded_track(&self) -> Option<TrackId> {
        self.loaded_track
    }
}

impl std::fmt::Debug for DeckAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeckAttributes")
            .field("index", &self.index)
            .field("group", &self.group)
            .field("orientation", &self.orientation)
            .field("play", &self.play)
            .field("play_position", &self.play_position)
            .field("loaded_track", &self.loaded_track)
            .finish_non_exhaustive()
    }
}
