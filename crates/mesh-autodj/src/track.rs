//! Track metadata and the queued-track attribute snapshot

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::attributes::TrackOrDeckAttributes;
use crate::types::{FramePos, SampleRate, TrackId};

/// Stored analysis metadata of one track
///
/// Cue points are frame positions; `None` means the cue was never set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    /// Native sample rate of the file in Hz
    pub sample_rate: f64,
    /// Length of the track in frames
    pub total_frames: f64,
    #[serde(default)]
    pub intro_start: Option<f64>,
    #[serde(default)]
    pub intro_end: Option<f64>,
    #[serde(default)]
    pub outro_start: Option<f64>,
    #[serde(default)]
    pub outro_end: Option<f64>,
    #[serde(default)]
    pub first_sound: Option<f64>,
    #[serde(default)]
    pub last_sound: Option<f64>,
}

impl TrackMetadata {
    /// Metadata without any cue points
    pub fn new(title: impl Into<String>, sample_rate: f64, duration_secs: f64) -> Self {
        Self {
            title: title.into(),
            sample_rate,
            total_frames: duration_secs * sample_rate,
            intro_start: None,
            intro_end: None,
            outro_start: None,
            outro_end: None,
            first_sound: None,
            last_sound: None,
        }
    }

    fn frames(&self, secs: f64) -> f64 {
        secs * self.sample_rate
    }

    /// Set intro cues, given in seconds
    pub fn with_intro(mut self, start_secs: f64, end_secs: f64) -> Self {
        self.intro_start = Some(self.frames(start_secs));
        self.intro_end = Some(self.frames(end_secs));
        self
    }

    /// Set outro cues, given in seconds
    pub fn with_outro(mut self, start_secs: f64, end_secs: f64) -> Self {
        self.outro_start = Some(self.frames(start_secs));
        self.outro_end = Some(self.frames(end_secs));
        self
    }

    /// Set the audible range (silence detection result), given in seconds
    pub fn with_sound_range(mut self, first_secs: f64, last_secs: f64) -> Self {
        self.first_sound = Some(self.frames(first_secs));
        self.last_sound = Some(self.frames(last_secs));
        self
    }

    /// Duration in seconds at normal speed, `None` if the sample rate is invalid
    pub fn duration_secs(&self) -> Option<f64> {
        SampleRate::from_hz(self.sample_rate).map(|rate| self.total_frames / rate.hz())
    }
}

/// Looks up stored metadata for a track reference
pub trait TrackMetadataProvider: Send + Sync {
    /// Metadata of `track`, `None` if the track is unknown or its file is gone
    fn metadata(&self, track: TrackId) -> Option<TrackMetadata>;
}

/// In-memory metadata provider
#[derive(Default)]
pub struct TrackLibrary {
    inner: RwLock<LibraryInner>,
}

#[derive(Default)]
struct LibraryInner {
    tracks: HashMap<TrackId, TrackMetadata>,
    /// Highest id ever handed out or inserted; ids are never reused
    last_id: u64,
}

impl TrackLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a track under a fresh id
    pub fn add(&self, metadata: TrackMetadata) -> TrackId {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.last_id += 1;
        let id = TrackId(inner.last_id);
        inner.tracks.insert(id, metadata);
        id
    }

    /// Insert or replace a track under a known id
    pub fn insert(&self, id: TrackId, metadata: TrackMetadata) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.last_id = inner.last_id.max(id.0);
        inner.tracks.insert(id, metadata);
    }

    /// Forget a track (its queue entries will be skipped)
    pub fn remove(&self, id: TrackId) -> Option<TrackMetadata> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .tracks
            .remove(&id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrackMetadataProvider for TrackLibrary {
    fn metadata(&self, track: TrackId) -> Option<TrackMetadata> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .tracks
            .get(&track)
            .cloned()
    }
}

/// Immutable attribute view of a queued track that is not loaded yet
///
/// Lets the transition be planned before the track reaches a deck. The
/// snapshot behaves like a stopped deck at the start of the track, playing at
/// normal speed.
#[derive(Debug, Clone)]
pub struct TrackAttributes {
    track: TrackId,
    metadata: TrackMetadata,
}

impl TrackAttributes {
    pub fn new(track: TrackId, metadata: TrackMetadata) -> Self {
        Self { track, metadata }
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }
}

impl TrackOrDeckAttributes for TrackAttributes {
    fn intro_start_position(&self) -> Option<FramePos> {
        self.metadata.intro_start.and_then(FramePos::new)
    }

    fn intro_end_position(&self) -> Option<FramePos> {
        self.metadata.intro_end.and_then(FramePos::new)
    }

    fn outro_start_position(&self) -> Option<FramePos> {
        self.metadata.outro_start.and_then(FramePos::new)
    }

    fn outro_end_position(&self) -> Option<FramePos> {
        self.metadata.outro_end.and_then(FramePos::new)
    }

    fn first_sound_position(&self) -> Option<FramePos> {
        self.metadata.first_sound.and_then(FramePos::new)
    }

    fn last_sound_position(&self) -> Option<FramePos> {
        self.metadata.last_sound.and_then(FramePos::new)
    }

    fn sample_rate(&self) -> Option<SampleRate> {
        SampleRate::from_hz(self.metadata.sample_rate)
    }

    fn track_end_position(&self) -> Option<FramePos> {
        FramePos::new(self.metadata.total_frames)
    }

    fn play_position(&self) -> f64 {
        0.0
    }

    fn rate_ratio(&self) -> f64 {
        1.0
    }

    fn loaded_track(&self) -> Option<TrackId> {
        Some(self.track)
    }
}
