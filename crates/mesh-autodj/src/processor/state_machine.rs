//! Reactive side of the processor: bus notifications in, deck and crossfader writes out

use crate::attributes::TrackOrDeckAttributes;
use crate::bus::{BusEvent, Origin};
use crate::deck::DeckChange;
use crate::error::{AutoDjError, AutoDjResult};
use crate::events::AutoDjEvent;
use crate::track::TrackAttributes;
use crate::transition;
use crate::types::TrackId;

use super::{controls, crossfader_key, AutoDjProcessor, AutoDjState, DeckPair};

/// Play position from which a stopped deck counts as finished
const END_OF_TRACK: f64 = 0.999;

impl AutoDjProcessor {
    pub(super) fn handle_bus_event(&mut self, event: BusEvent) {
        if let BusEvent::ValueChanged { key, value, origin } = &event {
            if key.group == controls::AUTODJ_GROUP {
                // Own writes are button resets and state write-backs
                if *origin != self.origin {
                    self.handle_control(&key.item, *value);
                }
                return;
            }
            if *key == crossfader_key() {
                self.crossfader_changed(*value, *origin);
                return;
            }
            if key.group == controls::MIXER_PROFILE_GROUP {
                return;
            }
        }

        let Some(index) = self.decks.iter().position(|d| d.group == event.group()) else {
            return;
        };
        if let Some(change) = self.decks[index].apply(&event) {
            self.handle_deck_change(index, change);
        }
    }

    fn handle_control(&mut self, item: &str, value: f64) {
        let pressed = value > 0.0;
        match item {
            controls::ENABLED => {
                // Failures are reported through the event channel
                let _ = self.set_enabled(pressed);
            }
            controls::FADE_NOW if pressed => {
                self.start_fade_now();
                self.write_control(controls::FADE_NOW, 0.0);
            }
            controls::SKIP_NEXT if pressed => {
                if let Err(e) = self.skip_next_track() {
                    log::debug!("AutoDjProcessor: skip_next: {}", e);
                }
                self.write_control(controls::SKIP_NEXT, 0.0);
            }
            controls::SHUFFLE_PLAYLIST if pressed => {
                if let Err(e) = self.shuffle_playlist(0..0) {
                    log::debug!("AutoDjProcessor: shuffle_playlist: {}", e);
                }
                self.write_control(controls::SHUFFLE_PLAYLIST, 0.0);
            }
            controls::ADD_RANDOM_TRACK if pressed => {
                self.emit(AutoDjEvent::RandomTracksRequested(1));
                self.write_control(controls::ADD_RANDOM_TRACK, 0.0);
            }
            _ => {}
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Enable / disable
    // ─────────────────────────────────────────────────────────────

    pub(super) fn set_enabled(&mut self, enable: bool) -> AutoDjResult {
        if !enable {
            self.disable();
            return Ok(());
        }
        if self.state.is_enabled() {
            return Ok(());
        }
        match self.enable() {
            Ok(()) => {
                self.write_control(controls::ENABLED, 1.0);
                Ok(())
            }
            Err(e) => {
                log::warn!("AutoDjProcessor: cannot enable: {}", e);
                self.emit(AutoDjEvent::Error(e));
                self.write_control(controls::ENABLED, 0.0);
                Err(e)
            }
        }
    }

    fn enable(&mut self) -> AutoDjResult {
        let left = self.decks.iter().position(|d| d.is_left());
        let right = self.decks.iter().position(|d| d.is_right());
        let (Some(left), Some(right)) = (left, right) else {
            return Err(AutoDjError::NotExactlyTwoDecks);
        };
        let pair = DeckPair { left, right };

        if self.decks.iter().any(|d| !pair.contains(d.index) && d.is_playing()) {
            return Err(AutoDjError::DecksPlayingOnOtherThanTheFirstTwo);
        }
        let left_playing = self.decks[left].is_playing();
        let right_playing = self.decks[right].is_playing();
        if left_playing && right_playing {
            return Err(AutoDjError::BothDecksPlaying);
        }

        // Whatever already plays counts as taken from the queue
        for index in [left, right] {
            let deck = &self.decks[index];
            if let (true, Some(track)) = (deck.is_playing(), deck.loaded_track()) {
                self.queue.consume_head(&deck.group, track);
            }
        }
        if self.queue.next_loadable().is_none() {
            self.maybe_fill_random_tracks();
            return Err(AutoDjError::QueueEmpty);
        }

        self.pair = Some(pair);
        self.manual_override = false;
        self.waiting_for_tracks = None;
        for index in [left, right] {
            let metadata = self
                .decks[index]
                .loaded_track()
                .and_then(|track| self.queue.provider().metadata(track));
            self.decks[index].set_loaded_metadata(metadata);
            self.decks[index].fade = None;
            self.user_cued[index] = false;
        }

        if left_playing || right_playing {
            let (from, to) = if left_playing { (left, right) } else { (right, left) };
            self.set_crossfader(if from == left { -1.0 } else { 1.0 });
            self.set_state(AutoDjState::EnableP1Playing);
            self.load_next_track(to, false);
        } else {
            self.set_crossfader(-1.0);
            self.set_state(AutoDjState::EnableP1Loaded);
            self.load_next_track(left, true);
        }
        self.maybe_fill_random_tracks();
        Ok(())
    }

    /// Stop automating. Decks and crossfader stay where they are.
    pub(super) fn disable(&mut self) {
        if !self.state.is_enabled() {
            return;
        }
        if let Some(pair) = self.pair.take() {
            self.decks[pair.left].fade = None;
            self.decks[pair.right].fade = None;
        }
        self.manual_override = false;
        self.waiting_for_tracks = None;
        self.set_state(AutoDjState::Disabled);
        self.write_control(controls::ENABLED, 0.0);
    }

    // ─────────────────────────────────────────────────────────────
    // Control surface actions
    // ─────────────────────────────────────────────────────────────

    pub(super) fn skip_next_track(&mut self) -> AutoDjResult {
        let Some(pair) = self.pair.filter(|_| self.state.is_enabled()) else {
            return Err(AutoDjError::IsInactive);
        };
        if self.state.is_fading() {
            return Ok(());
        }
        // The first deck not playing holds the track waiting to go on air
        let Some(target) = [pair.left, pair.right]
            .into_iter()
            .find(|index| !self.decks[*index].is_playing())
        else {
            return Ok(());
        };

        if let Some(track) = self.decks[target].loaded_track() {
            // Never replay the skipped track from the queue head
            self.queue.consume_head(&self.decks[target].group, track);
        }
        self.decks[target].fade = None;
        let play = self.state == AutoDjState::EnableP1Loaded;
        if !self.load_next_track(target, play) {
            self.maybe_fill_random_tracks();
            return Err(AutoDjError::QueueEmpty);
        }
        log::info!("AutoDjProcessor: skipped to next track on {}", self.decks[target].group);
        Ok(())
    }

    pub(super) fn start_fade_now(&mut self) {
        if self.state != AutoDjState::Idle {
            log::debug!("AutoDjProcessor: fade_now ignored in {:?}", self.state);
            return;
        }
        let Some((from, to)) = self.roles() else {
            return;
        };
        if self.decks[to].loading || self.decks[to].is_empty() {
            return;
        }

        match transition::fade_now_transition(
            &self.decks[from],
            &self.decks[to],
            self.transition_mode,
            self.transition_time,
            !self.user_cued[to],
        ) {
            Ok(t) => {
                self.decks[from].fade = Some(t.from);
                self.decks[to].fade = Some(t.to);
                self.start_fade(from);
            }
            Err(e) => log::debug!("AutoDjProcessor: fade_now deferred: {}", e),
        }
    }

    /// Load the first available queued track onto a deck.
    ///
    /// Returns `false` if the queue has nothing loadable.
    fn load_next_track(&mut self, index: usize, play: bool) -> bool {
        match self.queue.next_loadable() {
            Some((track, metadata)) => {
                log::info!(
                    "AutoDjProcessor: loading {} '{}' on {}",
                    track,
                    metadata.title,
                    self.decks[index].group
                );
                self.decks[index].request_load(Some(track), play);
                true
            }
            None => false,
        }
    }

    /// Load onto the deck that ran dry earlier, now that tracks arrived
    pub(super) fn fill_waiting_deck(&mut self) {
        let Some(index) = self.waiting_for_tracks else {
            return;
        };
        if !self.state.is_enabled() || self.state.is_fading() {
            return;
        }
        if self.load_next_track(index, false) {
            self.waiting_for_tracks = None;
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Transition planning
    // ─────────────────────────────────────────────────────────────

    /// (from, to) when exactly one deck of the pair is playing
    fn roles(&self) -> Option<(usize, usize)> {
        let pair = self.pair?;
        match (self.decks[pair.left].is_playing(), self.decks[pair.right].is_playing()) {
            (true, false) => Some((pair.left, pair.right)),
            (false, true) => Some((pair.right, pair.left)),
            _ => None,
        }
    }

    /// Outgoing deck of the running fade
    fn fading_from(&self) -> Option<usize> {
        let pair = self.pair?;
        match self.state {
            AutoDjState::LeftFading => Some(pair.left),
            AutoDjState::RightFading => Some(pair.right),
            _ => None,
        }
    }

    /// Recompute the planned fade. Never touches a running fade.
    pub(super) fn recalculate_transition(&mut self) {
        if !matches!(self.state, AutoDjState::Idle | AutoDjState::EnableP1Playing) {
            return;
        }
        let Some((from, to)) = self.roles() else {
            return;
        };
        if self.calculate_transition(from, to) && self.state == AutoDjState::EnableP1Playing {
            self.set_state(AutoDjState::Idle);
        }
    }

    /// Plan the fade from `from` to `to`; `true` if it can be scheduled
    fn calculate_transition(&mut self, from: usize, to: usize) -> bool {
        if self.decks[to].loading || self.decks[to].is_empty() {
            // Nothing to fade into yet; plan against the queued track so the
            // outgoing envelope is known ahead of the load
            let snapshot = self.queue.peek_next().and_then(|track| {
                let metadata = self.queue.provider().metadata(track)?;
                Some(TrackAttributes::new(track, metadata))
            });
            let planned = snapshot.and_then(|next| {
                transition::calculate_transition(
                    &self.decks[from],
                    &next,
                    self.transition_mode,
                    self.transition_time,
                    true,
                )
                .ok()
            });
            self.decks[from].fade = planned.map(|t| t.from);
            self.decks[to].fade = None;
            return false;
        }

        match transition::calculate_transition(
            &self.decks[from],
            &self.decks[to],
            self.transition_mode,
            self.transition_time,
            !self.user_cued[to],
        ) {
            Ok(t) => {
                log::debug!(
                    "AutoDjProcessor: {} fades {:.2}s..{:.2}s, {} starts at {:?}",
                    self.decks[from].group,
                    t.from.fade_begin_pos,
                    t.from.fade_end_pos,
                    self.decks[to].group,
                    t.to.start_pos
                );
                self.decks[from].fade = Some(t.from);
                self.decks[to].fade = Some(t.to);
                true
            }
            Err(e) => {
                log::debug!("AutoDjProcessor: transition deferred: {}", e);
                self.decks[from].fade = None;
                self.decks[to].fade = None;
                false
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Fading
    // ─────────────────────────────────────────────────────────────

    fn start_fade(&mut self, from: usize) {
        let Some(pair) = self.pair else {
            return;
        };
        let Some(to) = pair.other(from) else {
            return;
        };

        if let Some(start) = self.decks[to].fade.and_then(|f| f.start_pos) {
            if let Some(end) = transition::end_second(&self.decks[to]) {
                self.decks[to].set_play_position(start / end);
            }
        }
        if self.decks[from].is_repeat() {
            self.decks[from].set_repeat(false);
        }
        self.decks[to].play();
        self.manual_override = false;

        self.set_state(if from == pair.left {
            AutoDjState::LeftFading
        } else {
            AutoDjState::RightFading
        });
        self.drive_crossfader(from);
    }

    /// Move the crossfader to match the outgoing deck's progress through the fade
    fn drive_crossfader(&mut self, from: usize) {
        let Some(pair) = self.pair else {
            return;
        };
        let deck = &self.decks[from];
        let Some(second) = transition::current_second(deck) else {
            return;
        };
        let progress = match deck.fade {
            Some(fade) if fade.fade_duration_seconds > 0.0 => {
                ((second - fade.fade_begin_pos) / fade.fade_duration_seconds).clamp(0.0, 1.0)
            }
            // Zero-length fade or nothing planned: cut
            _ => 1.0,
        };

        if !self.manual_override {
            let value = if from == pair.left {
                -1.0 + 2.0 * progress
            } else {
                1.0 - 2.0 * progress
            };
            self.set_crossfader(value);
        }
        self.check_fade_complete(self.crossfader());
    }

    /// Crossfader fully on the incoming side of the running fade
    fn crossfader_at_destination(&self, crossfader: f64) -> bool {
        match self.state {
            AutoDjState::LeftFading => crossfader >= 1.0,
            AutoDjState::RightFading => crossfader <= -1.0,
            _ => false,
        }
    }

    /// Stop the outgoing deck once the crossfader sits fully on the incoming side
    fn check_fade_complete(&mut self, crossfader: f64) {
        let Some(from) = self.fading_from() else {
            return;
        };
        if !self.crossfader_at_destination(crossfader) {
            return;
        }
        if self.decks[from].is_playing() {
            log::debug!(
                "AutoDjProcessor: crossfader reached the end, stopping {}",
                self.decks[from].group
            );
            self.decks[from].stop();
        } else {
            // Outgoing deck ran out while the crossfader was held by hand
            self.finish_fade(from);
        }
    }

    /// Outgoing deck stopped: swap roles and prepare the next track
    fn finish_fade(&mut self, from: usize) {
        let Some(pair) = self.pair else {
            return;
        };
        log::info!("AutoDjProcessor: fade out of {} complete", self.decks[from].group);

        self.set_state(AutoDjState::Idle);
        self.decks[pair.left].fade = None;
        self.decks[pair.right].fade = None;
        self.manual_override = false;
        self.user_cued[from] = false;

        if self.load_next_track(from, false) {
            self.maybe_fill_random_tracks();
            return;
        }
        if self.queue.request_more_if_empty().is_some() {
            log::info!("AutoDjProcessor: queue is empty, waiting for random tracks");
            self.waiting_for_tracks = Some(from);
            self.maybe_fill_random_tracks();
        } else {
            log::info!("AutoDjProcessor: queue is empty, disabling");
            self.decks[from].request_load(None, false);
            self.disable();
        }
    }

    fn crossfader_changed(&mut self, raw: f64, origin: Origin) {
        let value = if self.crossfader_reversed() { -raw } else { raw };

        if self.state.is_fading() {
            if origin != self.origin && !self.manual_override {
                log::info!(
                    "AutoDjProcessor: crossfader moved by hand, automation paused for this fade"
                );
                self.manual_override = true;
            }
            self.check_fade_complete(value);
            return;
        }

        // Hand-made cut while both decks play
        if self.state == AutoDjState::Idle {
            let Some(pair) = self.pair else {
                return;
            };
            if self.decks[pair.left].is_playing() && self.decks[pair.right].is_playing() {
                if value >= 1.0 {
                    self.decks[pair.left].stop();
                } else if value <= -1.0 {
                    self.decks[pair.right].stop();
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Deck notifications
    // ─────────────────────────────────────────────────────────────

    fn handle_deck_change(&mut self, index: usize, change: DeckChange) {
        if !self.state.is_enabled() {
            return;
        }
        let Some(pair) = self.pair.filter(|p| p.contains(index)) else {
            return;
        };
        let loading_event = matches!(
            change,
            DeckChange::TrackLoading(_) | DeckChange::TrackLoaded(_) | DeckChange::PlayerEmpty
        );
        if self.decks[index].loading && !loading_event {
            return;
        }

        match change {
            DeckChange::PlayPosition { origin, .. } => self.player_position_changed(index, origin),
            DeckChange::Play(playing) => self.player_play_changed(index, playing),
            DeckChange::Cue(_) | DeckChange::Timing => self.recalculate_transition(),
            DeckChange::Orientation(_) => self.player_orientation_changed(index, pair),
            DeckChange::TrackLoaded(track) => self.player_track_loaded(index, track),
            DeckChange::PlayerEmpty => self.player_empty(index),
            DeckChange::Repeat(_) | DeckChange::TrackLoading(_) => {}
        }
    }

    fn player_position_changed(&mut self, index: usize, origin: Origin) {
        match self.state {
            AutoDjState::Idle | AutoDjState::EnableP1Playing => {
                if !self.decks[index].is_playing() {
                    if origin != self.origin {
                        // Operator cued the waiting deck; keep that position
                        log::debug!("AutoDjProcessor: {} cued by hand", self.decks[index].group);
                        self.user_cued[index] = true;
                        self.recalculate_transition();
                    }
                    return;
                }
                if self.state != AutoDjState::Idle {
                    return;
                }
                let Some((from, to)) = self.roles().filter(|(from, _)| *from == index) else {
                    return;
                };
                let Some(fade) = self.decks[from].fade.filter(|f| f.is_from_deck) else {
                    return;
                };
                if self.decks[to].fade.is_none() || self.decks[to].loading {
                    return;
                }
                let Some(second) = transition::current_second(&self.decks[from]) else {
                    return;
                };
                if second >= fade.fade_begin_pos {
                    self.start_fade(from);
                }
            }
            AutoDjState::LeftFading | AutoDjState::RightFading => {
                if self.fading_from() == Some(index) {
                    self.drive_crossfader(index);
                }
            }
            AutoDjState::EnableP1Loaded | AutoDjState::Disabled => {}
        }
    }

    fn player_play_changed(&mut self, index: usize, playing: bool) {
        let Some(other) = self.pair.and_then(|p| p.other(index)) else {
            return;
        };

        match self.state {
            AutoDjState::EnableP1Loaded => {
                if playing && !self.decks[other].is_playing() {
                    self.set_state(AutoDjState::EnableP1Playing);
                    if !self.load_next_track(other, false) {
                        log::info!(
                            "AutoDjProcessor: nothing left to load on {}",
                            self.decks[other].group
                        );
                        self.waiting_for_tracks = Some(other);
                        self.maybe_fill_random_tracks();
                    }
                }
            }
            AutoDjState::Idle => {
                if playing {
                    // Operator started the waiting deck: fade in from where it is
                    let waiting = self.decks[index].fade.is_some_and(|f| !f.is_from_deck);
                    if waiting && self.decks[other].is_playing() {
                        log::info!(
                            "AutoDjProcessor: {} started by hand, fading now",
                            self.decks[index].group
                        );
                        match transition::fade_now_transition(
                            &self.decks[other],
                            &self.decks[index],
                            self.transition_mode,
                            self.transition_time,
                            false,
                        ) {
                            Ok(t) => {
                                self.decks[other].fade = Some(t.from);
                                self.decks[index].fade = Some(t.to);
                                self.start_fade(other);
                            }
                            Err(e) => log::debug!("AutoDjProcessor: manual fade deferred: {}", e),
                        }
                    }
                } else if self.decks[other].is_playing() {
                    // Stopped by hand while the other deck carries on
                    self.finish_fade(index);
                } else if self.decks[index].play_position() >= END_OF_TRACK
                    && !self.decks[other].is_empty()
                    && !self.decks[other].loading
                {
                    log::info!(
                        "AutoDjProcessor: {} ended before the fade, cutting to {}",
                        self.decks[index].group,
                        self.decks[other].group
                    );
                    self.start_fade(index);
                    // A stopped deck with the crossfader at the end completes in start_fade
                    if self.state.is_fading() {
                        self.finish_fade(index);
                    }
                }
            }
            AutoDjState::LeftFading | AutoDjState::RightFading => {
                if playing || self.fading_from() != Some(index) {
                    return;
                }
                if self.manual_override && !self.crossfader_at_destination(self.crossfader()) {
                    // Held by hand: the fade ends when the crossfader arrives
                    log::debug!(
                        "AutoDjProcessor: {} stopped, waiting for the crossfader",
                        self.decks[index].group
                    );
                    return;
                }
                self.finish_fade(index);
            }
            AutoDjState::EnableP1Playing | AutoDjState::Disabled => {}
        }
    }

    fn player_track_loaded(&mut self, index: usize, track: TrackId) {
        if self.queue.consume_head(&self.decks[index].group, track) {
            self.maybe_fill_random_tracks();
        }
        let metadata = self.queue.provider().metadata(track);
        self.decks[index].set_loaded_metadata(metadata);
        self.user_cued[index] = false;
        if self.waiting_for_tracks == Some(index) {
            self.waiting_for_tracks = None;
        }
        self.recalculate_transition();
    }

    fn player_empty(&mut self, index: usize) {
        if !matches!(self.state, AutoDjState::Idle | AutoDjState::EnableP1Playing) {
            return;
        }
        let Some(other) = self.pair.and_then(|p| p.other(index)) else {
            return;
        };
        if self.decks[other].is_playing() && !self.load_next_track(index, false) {
            self.waiting_for_tracks = Some(index);
            self.maybe_fill_random_tracks();
        }
        self.recalculate_transition();
    }

    fn player_orientation_changed(&mut self, index: usize, pair: DeckPair) {
        let deck = &self.decks[index];
        let on_side = if index == pair.left { deck.is_left() } else { deck.is_right() };
        if !on_side {
            log::warn!("AutoDjProcessor: {} left its crossfader side, disabling", deck.group);
            self.disable();
        }
    }
}
