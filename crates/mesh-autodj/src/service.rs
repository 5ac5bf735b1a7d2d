//! Auto DJ service
//!
//! Runs an [`AutoDjProcessor`] on its own thread so callers never share it.
//!
//! ```text
//! ┌─────────────┐     Commands      ┌─────────────────────┐
//! │  UI / MIDI  │ ───────────────►  │    AutoDjService    │
//! │             │ ◄───────────────  │    (background)     │
//! └─────────────┘     Events        └─────────────────────┘
//!                                            │ ▲
//!                                   writes   │ │  notifications
//!                                            ▼ │
//!                                   ┌─────────────────────┐
//!                                   │     ControlBus      │
//!                                   └─────────────────────┘
//! ```
//!
//! The loop waits on three sources at once: bus notifications, commands from
//! the [`AutoDjHandle`], and the remaining-time refresh timer.

use std::ops::Range;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

use crate::config::AutoDjConfig;
use crate::error::AutoDjResult;
use crate::events::AutoDjEvent;
use crate::processor::{AutoDjProcessor, AutoDjState};
use crate::transition::TransitionMode;
use crate::types::TrackId;

// ============================================================================
// Commands
// ============================================================================

/// Commands for the AutoDjService
pub enum AutoDjCommand {
    Toggle {
        enable: bool,
        reply: Sender<AutoDjResult>,
    },
    SkipNext {
        reply: Sender<AutoDjResult>,
    },
    FadeNow,
    ShufflePlaylist {
        range: Range<usize>,
        reply: Sender<AutoDjResult>,
    },
    SetTransitionTime(f64),
    SetTransitionMode(TransitionMode),
    AppendTracks(Vec<TrackId>),
    GetState {
        reply: Sender<AutoDjState>,
    },
    /// Stop the service thread
    Shutdown,
}

// ============================================================================
// Service
// ============================================================================

/// Background thread owning the processor
pub struct AutoDjService;

impl AutoDjService {
    /// Move `processor` onto a new thread and return a handle to it
    pub fn spawn(processor: AutoDjProcessor, config: &AutoDjConfig) -> Result<AutoDjHandle> {
        let (command_tx, command_rx) = channel::unbounded();
        let events = processor.events();
        let refresh = Duration::from_millis(config.remaining_time_refresh_ms.max(1));

        let thread_handle = thread::Builder::new()
            .name("autodj".to_string())
            .spawn(move || Self::run(processor, command_rx, refresh))
            .context("failed to spawn Auto DJ service thread")?;

        Ok(AutoDjHandle {
            command_tx,
            thread_handle: Some(thread_handle),
            events,
        })
    }

    /// Main service loop
    fn run(mut processor: AutoDjProcessor, command_rx: Receiver<AutoDjCommand>, refresh: Duration) {
        log::info!("AutoDjService started");
        let bus_rx = processor.bus_events();
        let ticker = channel::tick(refresh);

        loop {
            select! {
                recv(bus_rx) -> msg => match msg {
                    Ok(event) => processor.dispatch(event),
                    Err(_) => {
                        log::warn!("AutoDjService: bus subscription closed");
                        break;
                    }
                },
                recv(command_rx) -> msg => match msg {
                    Ok(AutoDjCommand::Shutdown) | Err(_) => {
                        log::info!("AutoDjService shutting down");
                        break;
                    }
                    Ok(cmd) => Self::handle_command(&mut processor, cmd),
                },
                recv(ticker) -> _ => processor.tick(),
            }
        }
    }

    fn handle_command(processor: &mut AutoDjProcessor, cmd: AutoDjCommand) {
        match cmd {
            AutoDjCommand::Toggle { enable, reply } => {
                let _ = reply.send(processor.toggle_auto_dj(enable));
            }
            AutoDjCommand::SkipNext { reply } => {
                let _ = reply.send(processor.skip_next());
            }
            AutoDjCommand::FadeNow => processor.fade_now(),
            AutoDjCommand::ShufflePlaylist { range, reply } => {
                let _ = reply.send(processor.shuffle_playlist(range));
            }
            AutoDjCommand::SetTransitionTime(seconds) => processor.set_transition_time(seconds),
            AutoDjCommand::SetTransitionMode(mode) => processor.set_transition_mode(mode),
            AutoDjCommand::AppendTracks(tracks) => processor.append_tracks(tracks),
            AutoDjCommand::GetState { reply } => {
                let _ = reply.send(processor.state());
            }
            AutoDjCommand::Shutdown => {}
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Caller side of a running [`AutoDjService`]
///
/// Operations that can fail return the processor's
/// [`AutoDjError`](crate::AutoDjError) wrapped in `anyhow::Error`; use
/// `downcast_ref` to inspect it. Dropping the handle stops the service.
pub struct AutoDjHandle {
    command_tx: Sender<AutoDjCommand>,
    thread_handle: Option<thread::JoinHandle<()>>,
    events: Receiver<AutoDjEvent>,
}

impl AutoDjHandle {
    /// Send a command without waiting for the service
    pub fn send(&self, cmd: AutoDjCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|_| anyhow!("Auto DJ service is not running"))
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> AutoDjCommand) -> Result<T> {
        let (reply, rx) = channel::bounded(1);
        self.send(make(reply))?;
        rx.recv().context("Auto DJ service stopped before replying")
    }

    pub fn toggle_auto_dj(&self, enable: bool) -> Result<()> {
        Ok(self.request(|reply| AutoDjCommand::Toggle { enable, reply })??)
    }

    pub fn skip_next(&self) -> Result<()> {
        Ok(self.request(|reply| AutoDjCommand::SkipNext { reply })??)
    }

    pub fn fade_now(&self) -> Result<()> {
        self.send(AutoDjCommand::FadeNow)
    }

    pub fn shuffle_playlist(&self, range: Range<usize>) -> Result<()> {
        Ok(self.request(|reply| AutoDjCommand::ShufflePlaylist { range, reply })??)
    }

    pub fn set_transition_time(&self, seconds: f64) -> Result<()> {
        self.send(AutoDjCommand::SetTransitionTime(seconds))
    }

    pub fn set_transition_mode(&self, mode: TransitionMode) -> Result<()> {
        self.send(AutoDjCommand::SetTransitionMode(mode))
    }

    pub fn append_tracks(&self, tracks: Vec<TrackId>) -> Result<()> {
        self.send(AutoDjCommand::AppendTracks(tracks))
    }

    pub fn state(&self) -> Result<AutoDjState> {
        self.request(|reply| AutoDjCommand::GetState { reply })
    }

    /// Receiver of the processor's outward events
    pub fn events(&self) -> Receiver<AutoDjEvent> {
        self.events.clone()
    }

    /// Check if the service is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop the service and wait for its thread
    pub fn shutdown(&mut self) {
        let _ = self.command_tx.send(AutoDjCommand::Shutdown);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("AutoDjService thread panicked");
            }
        }
    }
}

impl Drop for AutoDjHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ControlBus;
    use crate::error::AutoDjError;
    use crate::sim::SimulatedEngine;
    use crate::track::{TrackLibrary, TrackMetadata};
    use crate::types::Orientation;
    use std::sync::Arc;
    use std::time::Instant;

    fn setup() -> (Arc<TrackLibrary>, SimulatedEngine, AutoDjHandle) {
        let bus = Arc::new(ControlBus::new());
        let library = Arc::new(TrackLibrary::new());
        let engine = SimulatedEngine::new(
            bus.clone(),
            library.clone(),
            &[Orientation::Left, Orientation::Right],
        );
        let config = AutoDjConfig::default();
        let processor = AutoDjProcessor::new(bus, library.clone(), 2, &config);
        let handle = AutoDjService::spawn(processor, &config).unwrap();
        (library, engine, handle)
    }

    #[test]
    fn test_enable_through_handle() {
        let (library, mut engine, handle) = setup();
        let events = handle.events();

        let err = handle.toggle_auto_dj(true).unwrap_err();
        assert_eq!(err.downcast_ref::<AutoDjError>(), Some(&AutoDjError::QueueEmpty));

        let tracks: Vec<TrackId> = [180.0, 200.0, 220.0]
            .iter()
            .map(|secs| library.add(TrackMetadata::new("t", 44100.0, *secs)))
            .collect();
        handle.append_tracks(tracks.clone()).unwrap();
        handle.toggle_auto_dj(true).unwrap();

        // Play the engine side until both decks are loaded
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut states = Vec::new();
        while !states.contains(&AutoDjState::Idle) && Instant::now() < deadline {
            engine.process();
            let event = events.recv_timeout(Duration::from_millis(10));
            if let Ok(AutoDjEvent::StateChanged(state)) = event {
                states.push(state);
            }
        }
        assert!(states.contains(&AutoDjState::Idle), "states {:?}", states);
        assert_eq!(handle.state().unwrap(), AutoDjState::Idle);
        assert_eq!(engine.loaded_track(0), Some(tracks[0]));
        assert_eq!(engine.loaded_track(1), Some(tracks[1]));
    }

    #[test]
    fn test_shutdown() {
        let (_library, _engine, mut handle) = setup();
        assert!(handle.is_running());
        handle.shutdown();
        assert!(!handle.is_running());
        assert!(handle.state().is_err());
    }
}
