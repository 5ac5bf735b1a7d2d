//! Auto DJ simulator - runs the coordinator against a simulated two-deck engine
//!
//! Plays a small generated playlist in accelerated time and logs every state
//! change, so transitions can be inspected without audio hardware.
//!
//! ## Command line flags
//!
//! - `--config <path>`: Load settings from this file instead of the default location
//! - `--shuffle`: Shuffle the playlist before starting

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mesh_autodj::config::{default_config_path, load_config, AutoDjConfig};
use mesh_autodj::sim::SimulatedEngine;
use mesh_autodj::track::{TrackLibrary, TrackMetadata};
use mesh_autodj::types::Orientation;
use mesh_autodj::{AutoDjEvent, AutoDjProcessor, AutoDjState, ControlBus};

/// Simulated seconds per step
const STEP_SECS: f64 = 0.25;
/// Give up after this much simulated time
const MAX_SECS: f64 = 3.0 * 60.0 * 60.0;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let shuffle = args.iter().any(|arg| arg == "--shuffle");

    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config: AutoDjConfig = load_config(&config_path);
    log::info!(
        "autodj-sim: config {:?}, transition {}s ({})",
        config_path,
        config.transition_time,
        config.transition_mode.name()
    );

    let bus = Arc::new(ControlBus::new());
    let library = Arc::new(TrackLibrary::new());
    let playlist = vec![
        library.add(
            TrackMetadata::new("Opening", 44100.0, 95.0)
                .with_intro(0.0, 8.0)
                .with_outro(80.0, 95.0),
        ),
        library.add(
            TrackMetadata::new("Warm Up", 48000.0, 120.0)
                .with_intro(4.0, 16.0)
                .with_outro(104.0, 118.0)
                .with_sound_range(1.5, 119.0),
        ),
        library.add(TrackMetadata::new("No Cues", 44100.0, 70.0)),
        library.add(
            TrackMetadata::new("Closer", 44100.0, 110.0)
                .with_intro(2.0, 10.0)
                .with_outro(96.0, 108.0),
        ),
    ];

    let mut engine = SimulatedEngine::new(
        bus.clone(),
        library.clone(),
        &[Orientation::Left, Orientation::Right],
    );
    let mut processor = AutoDjProcessor::new(bus, library, 2, &config);
    let events = processor.events();

    processor.append_tracks(playlist);
    if shuffle {
        processor.shuffle_playlist(0..0)?;
    }
    processor.toggle_auto_dj(true)?;

    let mut elapsed = 0.0;
    let mut since_tick = 0.0;
    let refresh = Duration::from_millis(config.remaining_time_refresh_ms.max(1)).as_secs_f64();
    while elapsed < MAX_SECS {
        engine.advance(STEP_SECS);
        while engine.process() > 0 || processor.has_pending() {
            processor.process_pending();
        }
        elapsed += STEP_SECS;
        since_tick += STEP_SECS;
        if since_tick >= refresh {
            since_tick = 0.0;
            processor.tick();
        }

        for event in events.try_iter() {
            match event {
                AutoDjEvent::StateChanged(state) => {
                    log::info!(
                        "[{:>7.2}s] {:?} (crossfader {:+.2})",
                        elapsed,
                        state,
                        processor.crossfader()
                    );
                }
                AutoDjEvent::RemainingTimeChanged { tracks, duration } => {
                    log::debug!(
                        "[{:>7.2}s] {} queued, {:.0}s left",
                        elapsed,
                        tracks,
                        duration.as_secs_f64()
                    );
                }
                AutoDjEvent::Error(e) => log::warn!("[{:>7.2}s] {}", elapsed, e),
                other => log::debug!("[{:>7.2}s] {:?}", elapsed, other),
            }
        }

        let silent = !engine.is_playing(0) && !engine.is_playing(1);
        if processor.state() == AutoDjState::Disabled && silent {
            break;
        }
    }

    log::info!("autodj-sim: finished after {:.0}s of simulated time", elapsed);
    Ok(())
}
