//! Auto DJ error types

use thiserror::Error;

/// Errors reported by the Auto DJ control surface
///
/// None of these change the coordinator's state; the failed operation simply
/// didn't happen.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDjError {
    /// The operation needs Auto DJ to be enabled
    #[error("Auto DJ is not active")]
    IsInactive,

    /// No track left in the queue to load or shuffle
    #[error("Auto DJ queue is empty")]
    QueueEmpty,

    /// Both automation decks are playing, so there is no deck to load the next track on
    #[error("Both decks are playing")]
    BothDecksPlaying,

    /// A deck outside the automation pair is playing
    #[error("A deck other than the first left and right deck is playing")]
    DecksPlayingOnOtherThanTheFirstTwo,

    /// There is no deck on one side of the crossfader
    #[error("Auto DJ needs exactly one left and one right deck")]
    NotExactlyTwoDecks,
}

/// Result type for control surface operations
pub type AutoDjResult<T = ()> = Result<T, AutoDjError>;
