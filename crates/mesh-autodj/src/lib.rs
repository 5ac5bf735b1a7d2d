//! Mesh Auto DJ - automatic two-deck mixing coordinator
//!
//! Watches two playback decks through the [`ControlBus`], plans the fade
//! between the outgoing and the incoming track from their cue points, drives
//! the crossfader through it, and keeps the idle deck loaded from a queue.

pub mod attributes;
pub mod bus;
pub mod config;
pub mod deck;
pub mod error;
pub mod events;
pub mod processor;
pub mod queue;
pub mod service;
pub mod sim;
pub mod track;
pub mod transition;
pub mod types;

pub use bus::ControlBus;
pub use error::{AutoDjError, AutoDjResult};
pub use events::AutoDjEvent;
pub use processor::{AutoDjProcessor, AutoDjState};
pub use service::{AutoDjHandle, AutoDjService};
pub use transition::TransitionMode;
pub use types::*;
