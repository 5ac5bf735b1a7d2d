//! Simulated two-deck engine
//!
//! A bus-driven stand-in for the audio engine and track player, used by the
//! demo binary and the processor tests. It publishes the same deck parameters
//! a real engine does, answers load requests, and moves play positions forward
//! when told how much time passed. No audio is involved.

use std::sync::Arc;

use crate::bus::{BusEvent, ControlBus, ParamKey, Subscription};
use crate::deck::{deck_group, items};
use crate::track::{TrackMetadata, TrackMetadataProvider};
use crate::types::{FramePos, Orientation, TrackId, LEGACY_INVALID_ENGINE_POSITION};

struct SimDeck {
    group: String,
    track: Option<(TrackId, TrackMetadata)>,
}

/// Engine stand-in driving `[Channel1]..[ChannelN]` on a [`ControlBus`]
pub struct SimulatedEngine {
    bus: Arc<ControlBus>,
    provider: Arc<dyn TrackMetadataProvider>,
    subscription: Subscription,
    decks: Vec<SimDeck>,
    /// Ignore the play flag of load requests, like a player still buffering
    hold_playback: bool,
}

impl SimulatedEngine {
    /// Create one deck per orientation and publish its initial parameters
    pub fn new(
        bus: Arc<ControlBus>,
        provider: Arc<dyn TrackMetadataProvider>,
        orientations: &[Orientation],
    ) -> Self {
        let decks: Vec<SimDeck> = (0..orientations.len())
            .map(|i| SimDeck {
                group: deck_group(i),
                track: None,
            })
            .collect();

        for (deck, orientation) in decks.iter().zip(orientations) {
            let key = |item: &str| ParamKey::new(deck.group.clone(), item);
            bus.set(key(items::ORIENTATION), orientation.value());
            bus.set(key(items::PLAY), 0.0);
            bus.set(key(items::PLAY_POSITION), 0.0);
            bus.set(key(items::REPEAT), 0.0);
            bus.set(key(items::RATE_RATIO), 1.0);
            bus.set(key(items::SAMPLERATE), 0.0);
            bus.set(key(items::TRACK_SAMPLES), LEGACY_INVALID_ENGINE_POSITION);
            for cue in [
                items::INTRO_START_POSITION,
                items::INTRO_END_POSITION,
                items::OUTRO_START_POSITION,
                items::OUTRO_END_POSITION,
            ] {
                bus.set(key(cue), LEGACY_INVALID_ENGINE_POSITION);
            }
        }

        let subscription = bus.subscribe(decks.iter().map(|d| d.group.clone()));
        Self {
            bus,
            provider,
            subscription,
            decks,
            hold_playback: false,
        }
    }

    /// Keep loaded decks paused even when the load asked to play
    pub fn set_hold_playback(&mut self, hold: bool) {
        self.hold_playback = hold;
    }

    fn key(&self, index: usize, item: &str) -> ParamKey {
        ParamKey::new(self.decks[index].group.clone(), item)
    }

    fn get(&self, index: usize, item: &str) -> f64 {
        self.bus.get_or(&self.key(index, item), 0.0)
    }

    fn set(&self, index: usize, item: &str, value: f64) {
        self.bus.set(self.key(index, item), value);
    }

    /// Whether load requests are waiting
    pub fn has_pending(&self) -> bool {
        !self.subscription.receiver.is_empty()
    }

    /// Answer queued load requests; returns how many were handled
    pub fn process(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.subscription.receiver.try_recv() {
            if let BusEvent::LoadRequested { group, track, play } = event {
                if let Some(index) = self.decks.iter().position(|d| d.group == group) {
                    match track {
                        Some(track) => self.load(index, track, play),
                        None => self.eject(index),
                    }
                    handled += 1;
                }
            }
        }
        handled
    }

    /// Load a track the way a player does: announce, publish its parameters,
    /// confirm, then start playback if asked to
    pub fn load(&mut self, index: usize, track: TrackId, play: bool) {
        let group = self.decks[index].group.clone();
        let Some(metadata) = self.provider.metadata(track) else {
            log::warn!("SimulatedEngine: {} has no metadata, ejecting {}", track, group);
            self.eject(index);
            return;
        };

        self.bus.publish(BusEvent::TrackLoading {
            group: group.clone(),
            track,
        });
        self.set(index, items::PLAY, 0.0);
        self.set(index, items::PLAY_POSITION, 0.0);
        self.set(index, items::SAMPLERATE, metadata.sample_rate);
        self.set(index, items::TRACK_SAMPLES, engine_samples(Some(metadata.total_frames)));
        for (item, frames) in [
            (items::INTRO_START_POSITION, metadata.intro_start),
            (items::INTRO_END_POSITION, metadata.intro_end),
            (items::OUTRO_START_POSITION, metadata.outro_start),
            (items::OUTRO_END_POSITION, metadata.outro_end),
        ] {
            self.set(index, item, engine_samples(frames));
        }
        self.decks[index].track = Some((track, metadata));
        self.bus.publish(BusEvent::TrackLoaded { group, track });

        if play && !self.hold_playback {
            self.set(index, items::PLAY, 1.0);
        }
    }

    pub fn eject(&mut self, index: usize) {
        self.set(index, items::PLAY, 0.0);
        self.set(index, items::TRACK_SAMPLES, LEGACY_INVALID_ENGINE_POSITION);
        for cue in [
            items::INTRO_START_POSITION,
            items::INTRO_END_POSITION,
            items::OUTRO_START_POSITION,
            items::OUTRO_END_POSITION,
        ] {
            self.set(index, cue, LEGACY_INVALID_ENGINE_POSITION);
        }
        self.decks[index].track = None;
        self.bus.publish(BusEvent::PlayerEmpty {
            group: self.decks[index].group.clone(),
        });
    }

    /// Track currently on a deck
    pub fn loaded_track(&self, index: usize) -> Option<TrackId> {
        self.decks[index].track.as_ref().map(|(id, _)| *id)
    }

    pub fn is_playing(&self, index: usize) -> bool {
        self.get(index, items::PLAY) > 0.0
    }

    /// Current position in seconds at normal speed
    pub fn position_secs(&self, index: usize) -> f64 {
        let duration = self.decks[index]
            .track
            .as_ref()
            .and_then(|(_, m)| m.duration_secs())
            .unwrap_or(0.0);
        self.get(index, items::PLAY_POSITION) * duration
    }

    /// Press play or pause on a deck
    pub fn set_playing(&self, index: usize, playing: bool) {
        self.set(index, items::PLAY, if playing { 1.0 } else { 0.0 });
    }

    /// Seek a deck to a position in seconds
    pub fn seek_secs(&self, index: usize, secs: f64) {
        let duration = self.decks[index]
            .track
            .as_ref()
            .and_then(|(_, m)| m.duration_secs())
            .unwrap_or(0.0);
        if duration > 0.0 {
            self.set(index, items::PLAY_POSITION, (secs / duration).clamp(0.0, 1.0));
        }
    }

    /// Advance every playing deck by `secs` of wall-clock time.
    ///
    /// A deck reaching its end stops there, or starts over with repeat on.
    pub fn advance(&mut self, secs: f64) {
        for index in 0..self.decks.len() {
            if !self.is_playing(index) {
                continue;
            }
            let duration = self.decks[index]
                .track
                .as_ref()
                .and_then(|(_, m)| m.duration_secs());
            let Some(duration) = duration else {
                continue;
            };
            let rate = self.get(index, items::RATE_RATIO);
            let position = self.get(index, items::PLAY_POSITION) * duration + secs * rate;

            if position < duration {
                self.set(index, items::PLAY_POSITION, position / duration);
            } else if self.get(index, items::REPEAT) > 0.0 {
                self.set(index, items::PLAY_POSITION, (position - duration) / duration);
            } else {
                self.set(index, items::PLAY_POSITION, 1.0);
                self.set(index, items::PLAY, 0.0);
            }
        }
    }
}

fn engine_samples(frames: Option<f64>) -> f64 {
    frames
        .and_then(FramePos::new)
        .map(FramePos::to_engine_sample_pos)
        .unwrap_or(LEGACY_INVALID_ENGINE_POSITION)
}
