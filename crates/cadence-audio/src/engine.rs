//! Playback engine driving the queue, track buffers, and frame delivery.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{
    Error, PlaybackQueue, PlayerConfig, QueueItem, QueueSnapshot, Result, TrackDuration, Volume,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

use crate::decoder::DecoderCommand;
use crate::pcm;
use crate::track_buffer::{BufferSettings, PrebufferOutcome, TrackBuffer};

/// Playback state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing to play yet.
    #[default]
    Idle,
    Playing,
    Paused,
    /// Halted; the queue is kept and playback can resume.
    Stopped,
    /// Terminal.
    Killed,
}

impl PlaybackState {
    /// States in which the engine wants a track loaded.
    const fn wants_track(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Events emitted by the engine for the chat layer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Playback state changed.
    StateChanged(PlaybackState),
    /// A track started producing frames.
    TrackStarted { item: QueueItem, index: usize },
    /// A started track finished or was skipped.
    TrackCompleted { item: QueueItem, index: usize },
    /// The last track finished with repeat off.
    QueueExhausted,
    /// A track could not be played.
    PlaybackError {
        message: String,
        item: Option<QueueItem>,
    },
}

/// Commands handled by the engine worker.
#[derive(Debug, Clone, Copy)]
enum EngineCommand {
    /// Start or resume playback.
    Play,
    /// Stop playback, keeping the queue.
    Stop,
    /// Skip ahead by this many tracks.
    Next(usize),
    /// Drop the current buffer and play whatever the queue cursor points at.
    Restart,
    /// Shut the engine down for good.
    Kill,
}

/// State shared between the handle, the worker, and the output sink.
struct Shared {
    state: RwLock<PlaybackState>,
    volume: AtomicU8,
    /// Buffer the sink reads from; only set once pre-buffering is done.
    output: Mutex<Option<Arc<TrackBuffer>>>,
    now_playing: RwLock<Option<(usize, QueueItem)>>,
    /// Signalled by the sink when the output buffer ran dry for good.
    track_end: Notify,
    event_tx: Sender<EngineEvent>,
}

impl Shared {
    fn state(&self) -> PlaybackState {
        *self.state.read()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Change state. Nothing leaves `Killed`.
    fn set_state(&self, new_state: PlaybackState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            if old == PlaybackState::Killed {
                return;
            }
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("State changed: {:?} -> {:?}", old_state, new_state);
            self.emit(EngineEvent::StateChanged(new_state));
        }
    }
}

/// Queue-driven player for one voice session.
///
/// The output sink pulls PCM with [`PlaybackEngine::read`]; everything else
/// is control. Dropping the handle shuts the engine down.
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    queue: Arc<PlaybackQueue>,
    command_tx: mpsc::UnboundedSender<EngineCommand>,
    event_rx: Receiver<EngineEvent>,
}

impl PlaybackEngine {
    /// Create an engine using the decoder named by `config`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(queue: Arc<PlaybackQueue>, config: &PlayerConfig) -> Self {
        Self::with_decoder(queue, config, DecoderCommand::from_config(config))
    }

    /// Create an engine with an explicit decoder command.
    pub fn with_decoder(
        queue: Arc<PlaybackQueue>,
        config: &PlayerConfig,
        decoder: DecoderCommand,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = unbounded();

        let volume = Volume::new(u16::from(config.default_volume)).unwrap_or_default();
        let shared = Arc::new(Shared {
            state: RwLock::new(PlaybackState::Idle),
            volume: AtomicU8::new(volume.as_percentage()),
            output: Mutex::new(None),
            now_playing: RwLock::new(None),
            track_end: Notify::new(),
            event_tx,
        });

        let worker = EngineWorker {
            shared: shared.clone(),
            queue: queue.clone(),
            command_rx,
            decoder,
            settings: BufferSettings::from_config(config),
            max_track_duration: config.max_track_duration_secs,
            fair_play: config.fair_play,
            active: None,
        };
        tokio::spawn(worker.run());

        Self {
            shared,
            queue,
            command_tx,
            event_rx,
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.shared.state() == PlaybackState::Killed {
            return Err(Error::EngineKilled);
        }
        Ok(())
    }

    fn send_command(&self, command: EngineCommand) -> Result<()> {
        self.ensure_alive()?;
        self.command_tx
            .send(command)
            .map_err(|_| Error::EngineKilled)
    }

    /// Start playing the current queue track, or resume from pause.
    pub fn play(&self) -> Result<()> {
        self.send_command(EngineCommand::Play)
    }

    /// Pause or resume frame delivery. Returns whether the engine is now paused.
    pub fn toggle_pause(&self) -> Result<bool> {
        self.ensure_alive()?;
        let new_state = match self.shared.state() {
            PlaybackState::Playing => PlaybackState::Paused,
            PlaybackState::Paused => PlaybackState::Playing,
            _ => return Ok(false),
        };
        self.shared.set_state(new_state);
        Ok(new_state == PlaybackState::Paused)
    }

    /// Stop playback. The queue and its cursor are kept.
    pub fn stop(&self) -> Result<()> {
        self.send_command(EngineCommand::Stop)
    }

    /// Skip `count` tracks ahead (at least one) and play.
    pub fn next(&self, count: usize) -> Result<()> {
        self.send_command(EngineCommand::Next(count.max(1)))
    }

    /// Jump to the track at `index` and play it.
    pub fn play_at(&self, index: usize) -> Result<()> {
        self.ensure_alive()?;
        self.queue.set_index(index)?;
        self.send_command(EngineCommand::Restart)
    }

    /// Shut the engine down. Every later call fails with `EngineKilled`.
    pub fn kill(&self) {
        if self.shared.state() == PlaybackState::Killed {
            return;
        }
        info!("Killing playback engine");
        let _ = self.command_tx.send(EngineCommand::Kill);
        self.shared.set_state(PlaybackState::Killed);
    }

    /// Set the output volume in percent; values above 100 are rejected.
    pub fn set_volume(&self, percent: u16) -> Result<()> {
        self.ensure_alive()?;
        let volume = Volume::new(percent)?;
        self.shared
            .volume
            .store(volume.as_percentage(), Ordering::Release);
        debug!("Volume set to {percent}%");
        Ok(())
    }

    pub fn volume(&self) -> Volume {
        Volume::new(u16::from(self.shared.volume.load(Ordering::Acquire))).unwrap_or_default()
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// The track currently producing frames, with its queue index.
    pub fn current_track(&self) -> Option<(usize, QueueItem)> {
        self.shared.now_playing.read().clone()
    }

    pub fn queued_tracks(&self) -> QueueSnapshot {
        self.queue.snapshot()
    }

    pub fn queue(&self) -> &Arc<PlaybackQueue> {
        &self.queue
    }

    /// Fill `output` with the next PCM bytes, returning how many were written.
    ///
    /// Returns fewer bytes than requested on underrun, while paused or
    /// stopped, and at the end of a track.
    pub fn read(&self, output: &mut [u8]) -> usize {
        if self.shared.state() != PlaybackState::Playing {
            return 0;
        }
        let Some(buffer) = self.shared.output.lock().clone() else {
            return 0;
        };

        let read = buffer.read(output);
        if read < output.len() {
            if buffer.is_exhausted() {
                self.shared.track_end.notify_one();
            } else {
                trace!("Buffer underrun: {read} of {} bytes", output.len());
            }
        }

        pcm::apply_volume(&mut output[..read], self.volume());
        read
    }

    /// Try to receive an event without blocking.
    pub fn try_recv_event(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Event receiver for the chat layer.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.kill();
    }
}

/// A track that has a buffer, started or still pre-buffering.
struct ActiveTrack {
    buffer: Arc<TrackBuffer>,
    item: QueueItem,
    index: usize,
    /// Pre-buffering finished and the sink can read it.
    started: bool,
}

/// Internal worker that owns track transitions.
struct EngineWorker {
    shared: Arc<Shared>,
    queue: Arc<PlaybackQueue>,
    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    decoder: DecoderCommand,
    settings: BufferSettings,
    max_track_duration: Option<u64>,
    fair_play: bool,
    active: Option<ActiveTrack>,
}

impl EngineWorker {
    async fn run(mut self) {
        info!("Playback engine worker started");

        loop {
            let state = self.shared.state();
            if state == PlaybackState::Killed {
                break;
            }

            if self.active.is_none() && state.wants_track() {
                self.load_current();
                continue;
            }

            let pending = self
                .active
                .as_ref()
                .filter(|active| !active.started)
                .map(|active| active.buffer.clone());
            let buffering = pending.is_some();
            let playing = self.active.as_ref().is_some_and(|active| active.started);

            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("Command channel closed, shutting down");
                        self.shared.set_state(PlaybackState::Killed);
                    }
                },
                outcome = prebuffered(pending), if buffering => {
                    self.begin_output(outcome).await;
                }
                () = self.shared.track_end.notified(), if playing => {
                    self.on_track_end().await;
                }
            }
        }

        self.release_active().await;
        info!("Playback engine worker stopped");
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        debug!("Handling command {:?}", command);
        match command {
            EngineCommand::Play => self.shared.set_state(PlaybackState::Playing),
            EngineCommand::Stop => {
                self.release_active().await;
                if self.shared.state() != PlaybackState::Idle {
                    self.shared.set_state(PlaybackState::Stopped);
                }
            }
            EngineCommand::Next(count) => {
                match self.finish_active().await {
                    Some(skipped) => self.queue.skip(skipped.id, count),
                    None => self.queue.advance(count),
                };
                self.shared.set_state(PlaybackState::Playing);
            }
            EngineCommand::Restart => {
                self.finish_active().await;
                self.shared.set_state(PlaybackState::Playing);
            }
            EngineCommand::Kill => {
                self.shared.set_state(PlaybackState::Killed);
            }
        }
    }

    /// Create and start a buffer for the queue's current track.
    fn load_current(&mut self) {
        let Some((index, item)) = self.queue.start_current() else {
            debug!("Queue is empty, nothing to play");
            self.shared.set_state(PlaybackState::Idle);
            return;
        };

        if let Some(limit) = self.max_track_duration {
            if item.track.duration.exceeds(limit) {
                warn!("Skipping {}: longer than {limit}s", item.track.title);
                self.queue.remove_by_id(item.id);
                let id = item.id;
                self.shared.emit(EngineEvent::PlaybackError {
                    message: format!(
                        "{} is longer than the {} limit",
                        item.track.title,
                        TrackDuration::Finite(limit).format()
                    ),
                    item: Some(item),
                });
                if self.queue.complete(id).is_none() {
                    self.exhaust();
                }
                return;
            }
        }

        let buffer = Arc::new(TrackBuffer::new(
            self.decoder.clone(),
            item.track.source.clone(),
            self.settings,
        ));

        match buffer.start_buffering() {
            Ok(()) => {
                debug!("Buffering {} (index {index})", item.track.title);
                self.active = Some(ActiveTrack {
                    buffer,
                    item,
                    index,
                    started: false,
                });
            }
            Err(e) => {
                error!("Failed to start {}: {e}", item.track.title);
                self.shared.emit(EngineEvent::PlaybackError {
                    message: e.to_string(),
                    item: Some(item),
                });
                self.shared.set_state(PlaybackState::Stopped);
            }
        }
    }

    /// Pre-buffering finished: hand the buffer to the sink.
    async fn begin_output(&mut self, outcome: PrebufferOutcome) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match outcome {
            PrebufferOutcome::Ready => trace!("Buffer ready for {}", active.item.track.title),
            PrebufferOutcome::SourceEnded => {
                debug!("{} ended before the buffer filled", active.item.track.title);
            }
            PrebufferOutcome::Failed => {
                warn!("Decoder output failed for {}", active.item.track.title);
            }
        }

        active.started = true;
        *self.shared.output.lock() = Some(active.buffer.clone());
        *self.shared.now_playing.write() = Some((active.index, active.item.clone()));

        info!("Now playing: {} (index {})", active.item.track.title, active.index);
        self.shared.emit(EngineEvent::TrackStarted {
            item: active.item.clone(),
            index: active.index,
        });

        // Sources that produced nothing complete straight away
        if active.buffer.is_exhausted() {
            self.on_track_end().await;
        }
    }

    /// The sink drained the buffer: finish the track and move the queue on.
    async fn on_track_end(&mut self) {
        let drained = self
            .active
            .as_ref()
            .is_some_and(|active| active.started && active.buffer.is_exhausted());
        if !drained {
            trace!("Ignoring stale track end signal");
            return;
        }

        let Some(finished) = self.finish_active().await else {
            return;
        };

        if self.fair_play {
            self.queue.promote_fair_next(&finished.queuer);
        }

        match self.queue.complete(finished.id) {
            Some(next) => debug!("Advancing to index {next}"),
            None => self.exhaust(),
        }
    }

    fn exhaust(&self) {
        info!("Queue exhausted");
        self.shared.emit(EngineEvent::QueueExhausted);
        self.shared.set_state(PlaybackState::Stopped);
    }

    /// Release the active buffer, announcing completion if it had started.
    async fn finish_active(&mut self) -> Option<QueueItem> {
        let active = self.release_active().await?;
        if active.started {
            info!("Finished: {}", active.item.track.title);
            self.shared.emit(EngineEvent::TrackCompleted {
                item: active.item.clone(),
                index: active.index,
            });
        }
        Some(active.item)
    }

    /// Detach the active buffer from the sink and dispose it.
    async fn release_active(&mut self) -> Option<ActiveTrack> {
        *self.shared.output.lock() = None;
        *self.shared.now_playing.write() = None;
        let active = self.active.take()?;
        active.buffer.dispose().await;
        Some(active)
    }
}

async fn prebuffered(buffer: Option<Arc<TrackBuffer>>) -> PrebufferOutcome {
    match buffer {
        Some(buffer) => buffer.prebuffering_completed().await,
        None => std::future::pending().await,
    }
}
