//! Auto DJ configuration
//!
//! Persisted settings of the coordinator. Transition time and mode are also
//! changeable at runtime through the control surface; callers that want the
//! change to survive a restart save the config again.
//!
//! ```ignore
//! use mesh_autodj::config::{default_config_path, load_config, AutoDjConfig};
//!
//! let config: AutoDjConfig = load_config(&default_config_path());
//! ```

mod io;
mod paths;

use serde::{Deserialize, Serialize};

use crate::transition::{TransitionMode, DEFAULT_TRANSITION_TIME};

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};

/// Top-level Auto DJ configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDjConfig {
    /// Fade length in seconds for fixed-length modes and cue fallbacks
    /// Negative values are treated as an instant cut.
    /// Default: 10.0
    pub transition_time: f64,

    /// Where the fade window is placed
    /// Default: FullIntroOutro
    pub transition_mode: TransitionMode,

    /// Append each consumed track to the end of the queue again
    /// Default: false
    pub requeue: bool,

    /// Automatic queue refill
    pub random_queue: RandomQueueConfig,

    /// Interval of the remaining-time refresh timer in milliseconds
    /// Default: 1000
    pub remaining_time_refresh_ms: u64,
}

impl Default for AutoDjConfig {
    fn default() -> Self {
        Self {
            transition_time: DEFAULT_TRANSITION_TIME,
            transition_mode: TransitionMode::default(),
            requeue: false,
            random_queue: RandomQueueConfig::default(),
            remaining_time_refresh_ms: 1000,
        }
    }
}

/// Random queue refill settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomQueueConfig {
    /// Ask for random tracks when the queue runs low
    /// Default: false
    pub enabled: bool,

    /// Queue length below which more tracks are requested
    /// Default: 5
    pub minimum_tracks: usize,
}

impl Default for RandomQueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            minimum_tracks: 5,
        }
    }
}
