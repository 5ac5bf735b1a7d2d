//! Outward notifications of the coordinator

use std::time::Duration;

use crate::error::AutoDjError;
use crate::processor::AutoDjState;
use crate::transition::TransitionMode;

/// Event emitted by [`crate::AutoDjProcessor`]
///
/// Delivered in emission order over a crossbeam channel; see
/// [`crate::AutoDjProcessor::events`].
#[derive(Debug, Clone, PartialEq)]
pub enum AutoDjEvent {
    StateChanged(AutoDjState),
    /// A control surface operation failed
    Error(AutoDjError),
    /// Queue estimate changed (debounced, not per position tick)
    RemainingTimeChanged { tracks: usize, duration: Duration },
    TransitionTimeChanged(f64),
    TransitionModeChanged(TransitionMode),
    /// The queue runs low; the owner should append this many tracks
    RandomTracksRequested(usize),
}
