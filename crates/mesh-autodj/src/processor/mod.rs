//! Auto DJ processor - mixing state machine and control surface
//!
//! The processor owns one [`DeckAttributes`] per configured deck and a
//! [`QueueManager`], and reacts to the control bus: deck position and play
//! changes schedule and drive fades, crossfader changes detect manual
//! takeover and fade completion, and the `[AutoDJ]` group exposes the control
//! surface as push-button parameters.
//!
//! # Threading
//!
//! Everything runs on the thread owning the processor. Bus notifications
//! queue up on the processor's subscription and are handled in order by
//! [`AutoDjProcessor::process_pending`]; handlers never drain the queue
//! themselves, so writes made while handling one event (e.g. `play()`) are
//! only seen once that handler has returned.
//!
//! # State flow
//!
//! ```text
//! Disabled ──enable──▶ EnableP1Loaded ──deck plays──▶ EnableP1Playing
//!    │                                                      │ next track loaded,
//!    └──enable (one deck already playing)───────────────────┤ transition valid
//!                                                           ▼
//!                  ┌──────── fade done (from-deck stopped) ── Idle
//!                  ▼                                          │ fade begin reached
//!                Idle ◀── LeftFading / RightFading ◀──────────┘
//! ```
//!
//! Any state goes back to `Disabled` on request, leaving decks and crossfader
//! where they are.

mod state_machine;

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::attributes::TrackOrDeckAttributes;
use crate::bus::{BusEvent, ControlBus, Origin, ParamKey, Subscription};
use crate::config::AutoDjConfig;
use crate::deck::{deck_group, DeckAttributes};
use crate::error::{AutoDjError, AutoDjResult};
use crate::events::AutoDjEvent;
use crate::queue::QueueManager;
use crate::track::TrackMetadataProvider;
use crate::transition::TransitionMode;
use crate::types::TrackId;

/// Bus parameters outside the deck groups
pub mod controls {
    pub const AUTODJ_GROUP: &str = "[AutoDJ]";
    pub const ENABLED: &str = "enabled";
    pub const FADE_NOW: &str = "fade_now";
    pub const SKIP_NEXT: &str = "skip_next";
    pub const SHUFFLE_PLAYLIST: &str = "shuffle_playlist";
    pub const ADD_RANDOM_TRACK: &str = "add_random_track";
    pub const TRACKS_REMAINING: &str = "tracks_remaining";
    pub const TIME_REMAINING: &str = "time_remaining";

    pub const MASTER_GROUP: &str = "[Master]";
    /// Raw crossfader, -1 = left .. 1 = right unless reversed
    pub const CROSSFADER: &str = "crossfader";

    pub const MIXER_PROFILE_GROUP: &str = "[Mixer Profile]";
    pub const XFADER_REVERSE: &str = "xFaderReverse";
}

/// Current phase of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDjState {
    /// Enabled, one deck playing and the next track ready on the other
    Idle,
    /// Fading from the left deck to the right deck
    LeftFading,
    /// Fading from the right deck to the left deck
    RightFading,
    /// Enabled with both decks stopped; first track requested on the left deck
    EnableP1Loaded,
    /// Enabled with one deck playing, waiting for the other deck to be ready
    EnableP1Playing,
    Disabled,
}

impl AutoDjState {
    pub fn is_fading(self) -> bool {
        matches!(self, AutoDjState::LeftFading | AutoDjState::RightFading)
    }

    pub fn is_enabled(self) -> bool {
        self != AutoDjState::Disabled
    }
}

/// The two decks taking part in automation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DeckPair {
    left: usize,
    right: usize,
}

impl DeckPair {
    fn contains(&self, index: usize) -> bool {
        index == self.left || index == self.right
    }

    fn other(&self, index: usize) -> Option<usize> {
        if index == self.left {
            Some(self.right)
        } else if index == self.right {
            Some(self.left)
        } else {
            None
        }
    }
}

/// Automatic two-deck mixing coordinator
pub struct AutoDjProcessor {
    bus: Arc<ControlBus>,
    subscription: Subscription,
    /// Tag of every write made by the processor and its decks
    origin: Origin,
    decks: Vec<DeckAttributes>,
    queue: QueueManager,
    state: AutoDjState,
    transition_time: f64,
    transition_mode: TransitionMode,
    pair: Option<DeckPair>,
    /// Deck was positioned by the operator since its track loaded
    user_cued: Vec<bool>,
    /// Operator moved the crossfader during the current fade
    manual_override: bool,
    /// Deck that needs a track as soon as the queue has one
    waiting_for_tracks: Option<usize>,
    last_remaining: Option<(usize, Duration)>,
    in_dispatch: bool,
    event_tx: Sender<AutoDjEvent>,
    event_rx: Receiver<AutoDjEvent>,
}

impl AutoDjProcessor {
    /// Create a disabled processor for decks `[Channel1]..[Channel{deck_count}]`
    pub fn new(
        bus: Arc<ControlBus>,
        provider: Arc<dyn TrackMetadataProvider>,
        deck_count: usize,
        config: &AutoDjConfig,
    ) -> Self {
        let mut groups: Vec<String> = (0..deck_count).map(deck_group).collect();
        groups.extend(
            [controls::AUTODJ_GROUP, controls::MASTER_GROUP, controls::MIXER_PROFILE_GROUP]
                .into_iter()
                .map(String::from),
        );
        let subscription = bus.subscribe(groups);
        let origin = Origin::Subscriber(subscription.id);

        for item in [
            controls::ENABLED,
            controls::FADE_NOW,
            controls::SKIP_NEXT,
            controls::SHUFFLE_PLAYLIST,
            controls::ADD_RANDOM_TRACK,
            controls::TRACKS_REMAINING,
            controls::TIME_REMAINING,
        ] {
            bus.register(ParamKey::new(controls::AUTODJ_GROUP, item), 0.0);
        }
        bus.register(crossfader_key(), 0.0);
        bus.register(ParamKey::new(controls::MIXER_PROFILE_GROUP, controls::XFADER_REVERSE), 0.0);

        let decks: Vec<DeckAttributes> = (0..deck_count)
            .map(|i| DeckAttributes::new(i, deck_group(i), bus.clone(), origin))
            .collect();

        let mut queue = QueueManager::new(provider);
        queue.set_requeue(config.requeue);
        queue.set_random_queue(config.random_queue.clone());

        let (event_tx, event_rx) = unbounded();

        log::info!(
            "AutoDjProcessor: {} decks, transition {}s ({})",
            deck_count,
            config.transition_time,
            config.transition_mode.name()
        );

        Self {
            bus,
            subscription,
            origin,
            user_cued: vec![false; decks.len()],
            decks,
            queue,
            state: AutoDjState::Disabled,
            transition_time: config.transition_time,
            transition_mode: config.transition_mode,
            pair: None,
            manual_override: false,
            waiting_for_tracks: None,
            last_remaining: None,
            in_dispatch: false,
            event_tx,
            event_rx,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────

    pub fn state(&self) -> AutoDjState {
        self.state
    }

    pub fn transition_time(&self) -> f64 {
        self.transition_time
    }

    pub fn transition_mode(&self) -> TransitionMode {
        self.transition_mode
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn decks(&self) -> &[DeckAttributes] {
        &self.decks
    }

    /// Receiver of the outward notifications
    pub fn events(&self) -> Receiver<AutoDjEvent> {
        self.event_rx.clone()
    }

    /// Receiver of the processor's bus subscription, for `select!` loops.
    ///
    /// Events taken from it must be handed to [`AutoDjProcessor::dispatch`].
    pub fn bus_events(&self) -> Receiver<BusEvent> {
        self.subscription.receiver.clone()
    }

    /// Whether bus notifications are waiting to be processed
    pub fn has_pending(&self) -> bool {
        !self.subscription.receiver.is_empty()
    }

    /// Normalised crossfader position, -1 = fully left, 1 = fully right
    pub fn crossfader(&self) -> f64 {
        let raw = self.bus.get_or(&crossfader_key(), 0.0);
        if self.crossfader_reversed() {
            -raw
        } else {
            raw
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────

    /// Handle every queued bus notification in order
    pub fn process_pending(&mut self) {
        if self.in_dispatch {
            return;
        }
        self.in_dispatch = true;
        while let Ok(event) = self.subscription.receiver.try_recv() {
            self.handle_bus_event(event);
        }
        self.in_dispatch = false;
    }

    /// Handle one notification received through [`AutoDjProcessor::bus_events`],
    /// then everything it caused
    pub fn dispatch(&mut self, event: BusEvent) {
        if self.in_dispatch {
            return;
        }
        self.in_dispatch = true;
        self.handle_bus_event(event);
        self.in_dispatch = false;
        self.process_pending();
    }

    // ─────────────────────────────────────────────────────────────
    // Control surface
    // ─────────────────────────────────────────────────────────────

    /// Enable or disable automation.
    ///
    /// Enabling fails without a state change if there is no deck on each side
    /// of the crossfader, a deck outside the pair is playing, both pair decks
    /// are playing, or the queue is empty. Disabling always succeeds and
    /// leaves decks and crossfader untouched.
    pub fn toggle_auto_dj(&mut self, enable: bool) -> AutoDjResult {
        self.process_pending();
        let result = self.set_enabled(enable);
        self.process_pending();
        result
    }

    /// Replace the track on the waiting deck with the next one from the queue
    pub fn skip_next(&mut self) -> AutoDjResult {
        self.process_pending();
        let result = self.skip_next_track();
        self.process_pending();
        result
    }

    /// Start the transition now. A no-op unless `Idle`.
    pub fn fade_now(&mut self) {
        self.process_pending();
        self.start_fade_now();
        self.process_pending();
    }

    /// Shuffle part of the queue; an empty selection shuffles all of it
    pub fn shuffle_playlist(&mut self, range: Range<usize>) -> AutoDjResult {
        if !self.queue.shuffle(range) {
            return Err(AutoDjError::QueueEmpty);
        }
        log::info!("AutoDjProcessor: shuffled queue ({} tracks)", self.queue.remaining_count());
        Ok(())
    }

    pub fn set_transition_time(&mut self, seconds: f64) {
        if seconds == self.transition_time {
            return;
        }
        self.process_pending();
        self.transition_time = seconds;
        log::info!("AutoDjProcessor: transition time {}s", seconds);
        self.emit(AutoDjEvent::TransitionTimeChanged(seconds));
        self.recalculate_transition();
        self.process_pending();
    }

    pub fn set_transition_mode(&mut self, mode: TransitionMode) {
        if mode == self.transition_mode {
            return;
        }
        self.process_pending();
        self.transition_mode = mode;
        log::info!("AutoDjProcessor: transition mode {}", mode.name());
        self.emit(AutoDjEvent::TransitionModeChanged(mode));
        self.recalculate_transition();
        self.process_pending();
    }

    /// Append tracks to the queue, filling an empty waiting deck right away
    pub fn append_tracks<I: IntoIterator<Item = TrackId>>(&mut self, tracks: I) {
        self.process_pending();
        self.queue.append(tracks);
        self.fill_waiting_deck();
        self.process_pending();
    }

    /// Periodic low-frequency timer; refreshes the remaining-time estimate
    pub fn tick(&mut self) {
        self.process_pending();
        self.refresh_remaining_time();
    }

    // ─────────────────────────────────────────────────────────────
    // Helpers shared with the state machine
    // ─────────────────────────────────────────────────────────────

    fn emit(&self, event: AutoDjEvent) {
        // The processor holds a receiver itself, so this cannot fail
        let _ = self.event_tx.send(event);
    }

    fn set_state(&mut self, state: AutoDjState) {
        if self.state == state {
            return;
        }
        log::info!("AutoDjProcessor: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.emit(AutoDjEvent::StateChanged(state));
    }

    fn control_key(item: &str) -> ParamKey {
        ParamKey::new(controls::AUTODJ_GROUP, item)
    }

    fn write_control(&self, item: &str, value: f64) {
        self.bus.set_from(self.origin, Self::control_key(item), value);
    }

    fn crossfader_reversed(&self) -> bool {
        self.bus
            .get_or(&ParamKey::new(controls::MIXER_PROFILE_GROUP, controls::XFADER_REVERSE), 0.0)
            > 0.0
    }

    /// Write a normalised crossfader position
    fn set_crossfader(&self, value: f64) {
        let value = value.clamp(-1.0, 1.0);
        let raw = if self.crossfader_reversed() { -value } else { value };
        self.bus.set_from(self.origin, crossfader_key(), raw);
    }

    fn refresh_remaining_time(&mut self) {
        let playing = self
            .pair
            .into_iter()
            .flat_map(|pair| [pair.left, pair.right])
            .find(|&i| self.decks[i].is_playing())
            .and_then(|i| self.decks[i].loaded_track());
        let tracks = self.queue.remaining_count();
        let duration = self.queue.remaining_duration(playing);
        if self.last_remaining == Some((tracks, duration)) {
            return;
        }
        self.last_remaining = Some((tracks, duration));
        self.write_control(controls::TRACKS_REMAINING, tracks as f64);
        self.write_control(controls::TIME_REMAINING, duration.as_secs_f64());
        self.emit(AutoDjEvent::RemainingTimeChanged { tracks, duration });
    }

    /// Ask for random tracks if the queue runs low
    fn maybe_fill_random_tracks(&self) {
        if let Some(count) = self.queue.request_more_if_empty() {
            log::debug!("AutoDjProcessor: requesting {} random tracks", count);
            self.emit(AutoDjEvent::RandomTracksRequested(count));
        }
    }
}

impl Drop for AutoDjProcessor {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription.id);
    }
}

fn crossfader_key() -> ParamKey {
    ParamKey::new(controls::MASTER_GROUP, controls::CROSSFADER)
}
