//! Per-track streaming unit: a decoder process feeding a ring buffer.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Error, PlayerConfig, Result, TrackSource};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::buffer::{shared_ring_buffer, SharedRingBuffer};
use crate::decoder::{DecoderCommand, DecoderProcess};

/// Sizes and timings for one track buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSettings {
    /// Ring buffer capacity in bytes.
    pub capacity: usize,
    /// Bytes read from the decoder per step.
    pub chunk_size: usize,
    /// Longest wait before rechecking free space.
    pub recheck: Duration,
    /// Time the decoder gets to exit on dispose.
    pub shutdown_grace: Duration,
}

impl BufferSettings {
    pub const fn from_config(config: &PlayerConfig) -> Self {
        Self {
            capacity: config.buffer_capacity,
            chunk_size: config.chunk_size,
            recheck: config.buffer_recheck(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self::from_config(&PlayerConfig::default())
    }
}

/// How the pre-buffering phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrebufferOutcome {
    /// The buffer filled up.
    Ready,
    /// The source ended before the buffer filled.
    SourceEnded,
    /// Reading the decoder output failed.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BufferStatus {
    Idle,
    Buffering,
    Done(PrebufferOutcome),
}

/// Buffers one track's decoded PCM ahead of playback.
///
/// A track buffer is started once and disposed once; it is never reused for
/// another track.
pub struct TrackBuffer {
    command: DecoderCommand,
    source: TrackSource,
    settings: BufferSettings,
    ring: SharedRingBuffer,
    /// Signalled by the reader whenever space frees up.
    space_freed: Arc<Notify>,
    status_tx: Arc<watch::Sender<BufferStatus>>,
    source_ended: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
    decoder: Mutex<Option<DecoderProcess>>,
    started: AtomicBool,
    disposed: AtomicBool,
}

impl TrackBuffer {
    pub fn new(command: DecoderCommand, source: TrackSource, settings: BufferSettings) -> Self {
        let (status_tx, _) = watch::channel(BufferStatus::Idle);
        Self {
            command,
            source,
            ring: shared_ring_buffer(settings.capacity),
            settings,
            space_freed: Arc::new(Notify::new()),
            status_tx: Arc::new(status_tx),
            source_ended: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
            decoder: Mutex::new(None),
            started: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    pub const fn source(&self) -> &TrackSource {
        &self.source
    }

    /// Spawn the decoder and the buffering loop. Must be called within a Tokio runtime.
    pub fn start_buffering(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(Error::Internal("Track buffer already disposed".to_string()));
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(Error::Internal("Track buffer already started".to_string()));
        }

        let mut decoder = DecoderProcess::spawn(&self.command, &self.source)?;
        let stdout = decoder
            .take_stdout()
            .ok_or_else(|| Error::DecoderSpawn("Decoder stdout unavailable".to_string()))?;

        self.status_tx.send_replace(BufferStatus::Buffering);
        let pump = Pump {
            ring: self.ring.clone(),
            space_freed: self.space_freed.clone(),
            status_tx: self.status_tx.clone(),
            source_ended: self.source_ended.clone(),
            chunk_size: self.settings.chunk_size,
            recheck: self.settings.recheck,
            source: self.source.clone(),
        };
        *self.task.lock() = Some(tokio::spawn(pump.run(stdout)));
        *self.decoder.lock() = Some(decoder);

        debug!("Buffering started for {}", self.source);
        Ok(())
    }

    /// Copy buffered PCM into `output`, returning how many bytes were available.
    pub fn read(&self, output: &mut [u8]) -> usize {
        let read = self.ring.read(output);
        if read > 0 {
            self.space_freed.notify_one();
        }
        read
    }

    /// Resolves once the buffer is ready to be played from.
    ///
    /// Returns `Failed` immediately for a buffer that was never started.
    pub async fn prebuffering_completed(&self) -> PrebufferOutcome {
        let mut status_rx = self.status_tx.subscribe();
        let result = status_rx
            .wait_for(|status| !matches!(status, BufferStatus::Buffering))
            .await
            .map(|status| *status);
        match result {
            Ok(BufferStatus::Done(outcome)) => outcome,
            Ok(_) | Err(_) => PrebufferOutcome::Failed,
        }
    }

    /// Bytes ready to be read.
    pub fn buffered(&self) -> usize {
        self.ring.content_length()
    }

    /// The decoder stream ended (or failed); no more bytes will arrive.
    pub fn source_ended(&self) -> bool {
        self.source_ended.load(Ordering::Acquire)
    }

    /// Everything the decoder produced has been read.
    pub fn is_exhausted(&self) -> bool {
        self.source_ended() && self.ring.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop buffering and shut the decoder down. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            // Wait for the loop to drop the decoder's stdout
            let _ = task.await;
        }

        let decoder = self.decoder.lock().take();
        if let Some(decoder) = decoder {
            decoder.shutdown(self.settings.shutdown_grace).await;
        }

        self.source_ended.store(true, Ordering::Release);
        self.status_tx.send_if_modified(|status| {
            if matches!(status, BufferStatus::Done(_)) {
                false
            } else {
                *status = BufferStatus::Done(PrebufferOutcome::Failed);
                true
            }
        });
        debug!("Track buffer for {} disposed", self.source);
    }
}

impl Drop for TrackBuffer {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
        // The decoder handle kills its process when dropped
    }
}

/// Producer side of a track buffer.
struct Pump {
    ring: SharedRingBuffer,
    space_freed: Arc<Notify>,
    status_tx: Arc<watch::Sender<BufferStatus>>,
    source_ended: Arc<AtomicBool>,
    chunk_size: usize,
    recheck: Duration,
    source: TrackSource,
}

impl Pump {
    async fn run(self, mut stdout: impl AsyncRead + Unpin) {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut total = 0usize;

        let outcome = loop {
            while self.ring.free_space() < self.chunk_size {
                if self.ring.mark_prebuffered() {
                    debug!("Pre-buffering complete for {} ({total} bytes)", self.source);
                    self.finish(PrebufferOutcome::Ready);
                }
                let _ = tokio::time::timeout(self.recheck, self.space_freed.notified()).await;
            }

            match read_chunk(&mut stdout, &mut chunk).await {
                Ok(0) => break PrebufferOutcome::SourceEnded,
                Ok(read) => {
                    self.ring.write(&chunk[..read]);
                    total += read;
                    trace!("Buffered {read} bytes for {}", self.source);
                    if read < self.chunk_size {
                        break PrebufferOutcome::SourceEnded;
                    }
                }
                Err(e) => {
                    warn!("Reading decoder output for {} failed: {e}", self.source);
                    break PrebufferOutcome::Failed;
                }
            }
        };

        if total == 0 {
            warn!("Decoder produced no audio for {}", self.source);
        }
        info!("Decoder output for {} ended after {total} bytes", self.source);
        self.source_ended.store(true, Ordering::Release);
        self.finish(outcome);
    }

    /// Publish the first outcome; later ones are ignored.
    fn finish(&self, outcome: PrebufferOutcome) {
        self.status_tx.send_if_modified(|status| {
            if matches!(status, BufferStatus::Done(_)) {
                false
            } else {
                *status = BufferStatus::Done(outcome);
                true
            }
        });
    }
}

/// Fill `chunk` from `reader`, stopping early only at end of stream.
async fn read_chunk(
    reader: &mut (impl AsyncRead + Unpin),
    chunk: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < chunk.len() {
        match reader.read(&mut chunk[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn settings(capacity: usize, chunk_size: usize) -> BufferSettings {
        BufferSettings {
            capacity,
            chunk_size,
            recheck: Duration::from_millis(10),
            shutdown_grace: Duration::from_millis(200),
        }
    }

    fn cat() -> DecoderCommand {
        DecoderCommand::Custom {
            program: PathBuf::from("cat"),
            args: vec!["{uri}".to_string()],
        }
    }

    fn fixture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    fn source_of(file: &tempfile::NamedTempFile) -> TrackSource {
        TrackSource::new(file.path().display().to_string())
    }

    async fn drain(buffer: &TrackBuffer) -> Vec<u8> {
        let mut output = Vec::new();
        let mut frame = [0u8; 100];
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !buffer.is_exhausted() {
            assert!(tokio::time::Instant::now() < deadline, "buffer never drained");
            let read = buffer.read(&mut frame);
            output.extend_from_slice(&frame[..read]);
            if read == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
        output
    }

    #[tokio::test]
    async fn test_read_chunk_stops_at_eof() {
        let data = vec![3u8; 10];
        let mut reader = data.as_slice();
        let mut chunk = [0u8; 8];
        assert_eq!(read_chunk(&mut reader, &mut chunk).await.unwrap(), 8);
        assert_eq!(read_chunk(&mut reader, &mut chunk).await.unwrap(), 2);
        assert_eq!(read_chunk(&mut reader, &mut chunk).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unstarted_buffer_reports_failed() {
        let buffer = TrackBuffer::new(cat(), TrackSource::new("x"), settings(64, 16));
        assert_eq!(buffer.prebuffering_completed().await, PrebufferOutcome::Failed);
        assert_eq!(buffer.read(&mut [0u8; 4]), 0);
    }

    #[tokio::test]
    async fn test_missing_decoder_fails_to_start() {
        let command = DecoderCommand::Ffmpeg {
            program: PathBuf::from("/nonexistent/cadence-test-decoder"),
        };
        let buffer = TrackBuffer::new(command, TrackSource::new("/a.mp3"), settings(64, 16));
        assert!(matches!(
            buffer.start_buffering(),
            Err(Error::DecoderMissing(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_short_track_completes_prebuffering_on_end() {
        let file = fixture(&[1u8; 50]);
        let buffer = TrackBuffer::new(cat(), source_of(&file), settings(1024, 64));
        buffer.start_buffering().unwrap();

        assert_eq!(
            buffer.prebuffering_completed().await,
            PrebufferOutcome::SourceEnded
        );
        assert_eq!(drain(&buffer).await, vec![1u8; 50]);
        buffer.dispose().await;
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_long_track_streams_in_order_with_backpressure() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let file = fixture(&data);
        let buffer = TrackBuffer::new(cat(), source_of(&file), settings(1024, 256));
        buffer.start_buffering().unwrap();

        assert_eq!(buffer.prebuffering_completed().await, PrebufferOutcome::Ready);
        assert!(buffer.buffered() > 1024 - 256);
        assert!(!buffer.source_ended());

        assert_eq!(drain(&buffer).await, data);
        buffer.dispose().await;
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispose_is_idempotent_and_stops_source() {
        let command = DecoderCommand::Custom {
            program: PathBuf::from("cat"),
            args: vec!["/dev/zero".to_string()],
        };
        let buffer = TrackBuffer::new(command, TrackSource::new("zero"), settings(4096, 512));
        buffer.start_buffering().unwrap();
        assert_eq!(buffer.prebuffering_completed().await, PrebufferOutcome::Ready);

        buffer.dispose().await;
        assert!(buffer.is_disposed());
        assert!(buffer.source_ended());
        buffer.dispose().await;

        assert!(buffer.start_buffering().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let file = fixture(&[0u8; 8]);
        let buffer = TrackBuffer::new(cat(), source_of(&file), settings(64, 16));
        buffer.start_buffering().unwrap();
        assert!(buffer.start_buffering().is_err());
        buffer.dispose().await;
    }
}
