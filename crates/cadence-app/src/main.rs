//! Cadence - headless voice-channel music player.
//!
//! Queues the sources given on the command line, plays them through the
//! Cadence pipeline, and writes s16le stereo 48 kHz PCM to stdout in real
//! time. Logs go to stderr.

mod cli;
mod sink;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use cadence_audio::{EngineEvent, PlaybackState, PlayerRegistry};
use cadence_core::{PlayerConfig, SessionId};
use crossbeam_channel::Receiver;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{track_for, Options};

/// The command line drives a single session.
const SESSION: SessionId = 0;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries audio, so every log line goes to stderr
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info,cadence_audio=info,cadence_core=info".into()),
        )
        .init();

    info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));

    let options = Options::parse(std::env::args().skip(1))?;
    let mut config = match &options.config {
        Some(path) => PlayerConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PlayerConfig::load_default().context("Failed to load configuration")?,
    };
    config.fair_play |= options.fair_play;

    let registry = PlayerRegistry::new(config.clone());
    let engine = registry.get_or_create(SESSION);

    for source in &options.sources {
        engine.queue().enqueue(track_for(source), "cli")?;
    }
    engine.queue().set_repeat(options.repeat);
    if let Some(volume) = options.volume {
        engine.set_volume(volume)?;
    }
    info!("Queued {} tracks", engine.queue().len());

    let running = Arc::new(AtomicBool::new(true));
    let sink = sink::spawn_stdout_sink(engine.clone(), config.frame_size, running.clone());

    let events = engine.events();
    engine.play()?;

    tokio::select! {
        result = tokio::task::spawn_blocking(move || watch_events(&events)) => {
            result.context("Event watcher failed")?;
        }
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    running.store(false, Ordering::Release);
    registry.shutdown_all();

    let frames = sink
        .join()
        .map_err(|_| anyhow!("Output thread panicked"))?
        .context("Failed to write audio")?;
    info!("Wrote {frames} frames");
    Ok(())
}

/// Log engine events until playback can no longer continue on its own.
fn watch_events(events: &Receiver<EngineEvent>) {
    while let Ok(event) = events.recv() {
        match event {
            EngineEvent::TrackStarted { item, index } => {
                info!("Now playing [{index}] {}", item.track.title);
            }
            EngineEvent::TrackCompleted { item, index } => {
                info!("Finished [{index}] {}", item.track.title);
            }
            EngineEvent::PlaybackError { message, item } => match item {
                Some(item) => error!("{}: {message}", item.track.title),
                None => error!("{message}"),
            },
            EngineEvent::QueueExhausted => {
                info!("End of queue");
                return;
            }
            EngineEvent::StateChanged(
                PlaybackState::Stopped | PlaybackState::Idle | PlaybackState::Killed,
            ) => {
                warn!("Playback ended");
                return;
            }
            EngineEvent::StateChanged(_) => {}
        }
    }
}
