//! Real-time output sink writing PCM frames to stdout.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_audio::pcm::playback_duration;
use cadence_audio::PlaybackEngine;
use tracing::{debug, info};

/// Pull one frame per frame period from `engine` and write it to `output`.
///
/// Short reads are padded with silence so the stream keeps its cadence.
/// Runs until `running` is cleared or the output is closed.
pub fn run_sink(
    engine: &PlaybackEngine,
    frame_size: usize,
    running: &AtomicBool,
    mut output: impl Write,
) -> io::Result<u64> {
    let period = playback_duration(frame_size);
    let mut frame = vec![0u8; frame_size];
    let mut frames = 0u64;
    let mut next_tick = Instant::now();

    info!("Output sink started ({frame_size} bytes every {period:?})");

    while running.load(Ordering::Acquire) {
        let read = engine.read(&mut frame);
        frame[read..].fill(0);

        match output.write_all(&frame) {
            Ok(()) => frames += 1,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Output closed");
                break;
            }
            Err(e) => return Err(e),
        }

        next_tick += period;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            // Fell behind; don't try to catch up with a burst
            next_tick = now;
        }
    }

    output.flush()?;
    info!("Output sink stopped after {frames} frames");
    Ok(frames)
}

/// Run the sink on its own thread, writing to stdout.
pub fn spawn_stdout_sink(
    engine: Arc<PlaybackEngine>,
    frame_size: usize,
    running: Arc<AtomicBool>,
) -> std::thread::JoinHandle<io::Result<u64>> {
    std::thread::spawn(move || {
        let stdout = io::stdout().lock();
        run_sink(&engine, frame_size, &running, stdout)
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use cadence_core::{PlaybackQueue, PlayerConfig};

    #[tokio::test]
    async fn test_idle_engine_produces_silence_at_frame_size() {
        let engine = Arc::new(PlaybackEngine::new(
            Arc::new(PlaybackQueue::new()),
            &PlayerConfig::default(),
        ));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let engine = engine.clone();
            let running = running.clone();
            std::thread::spawn(move || {
                let mut output = Vec::new();
                let frames = run_sink(&engine, 64, &running, &mut output).unwrap();
                (frames, output)
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        running.store(false, Ordering::Release);
        let (frames, output) = handle.join().unwrap();

        assert!(frames > 0);
        assert_eq!(output.len() as u64, frames * 64);
        assert!(output.iter().all(|&byte| byte == 0));
    }
}
