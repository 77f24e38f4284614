//! Player configuration.
//!
//! Every field has a built-in default, so an empty JSON object (or no file
//! at all) is a valid configuration.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Bytes read from the decoder per buffering step (200 ms of s16le stereo 48 kHz).
pub const DEFAULT_CHUNK_SIZE: usize = 38_400;

/// Bytes in one output frame (20 ms of s16le stereo 48 kHz).
pub const DEFAULT_FRAME_SIZE: usize = 3_840;

/// Ring buffer capacity, about 5.5 seconds of audio.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1 << 20;

const CONFIG_FILE_NAME: &str = "config.json";

/// Settings shared by every player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Decoder executable. `None` looks for a cached ffmpeg, then `ffmpeg` on `PATH`.
    pub decoder_path: Option<PathBuf>,
    /// Ring buffer capacity in bytes, rounded up to a power of two.
    pub buffer_capacity: usize,
    /// Bytes read from the decoder per step.
    pub chunk_size: usize,
    /// Bytes per output frame.
    pub frame_size: usize,
    /// Volume new players start at, in percent.
    pub default_volume: u8,
    /// Upper bound on queued tracks.
    pub max_queue_size: Option<usize>,
    /// Tracks longer than this are skipped.
    pub max_track_duration_secs: Option<u64>,
    /// Alternate between queuers when picking the next track.
    pub fair_play: bool,
    /// How long a decoder gets to exit after its output is closed.
    pub shutdown_grace_ms: u64,
    /// Longest the buffering loop waits before rechecking free space.
    pub buffer_recheck_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            decoder_path: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            frame_size: DEFAULT_FRAME_SIZE,
            default_volume: 100,
            max_queue_size: None,
            max_track_duration_secs: None,
            fair_play: false,
            shutdown_grace_ms: 1_000,
            buffer_recheck_ms: 50,
        }
    }
}

impl PlayerConfig {
    /// Load and validate a configuration file.
    ///
    /// Unreadable files fail with `Error::Io`, malformed JSON with `Error::Json`
    /// and out-of-range values with `Error::Config`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `config.json` from the project config directory, or fall back to defaults.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Path of the default configuration file.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "cadence")
            .map(|d| d.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 || self.chunk_size == 0 || self.frame_size == 0 {
            return Err(Error::Config(
                "buffer_capacity, chunk_size and frame_size must be non-zero".to_string(),
            ));
        }
        if self.chunk_size > self.buffer_capacity.next_power_of_two() {
            return Err(Error::Config(format!(
                "chunk_size {} does not fit in a buffer of {} bytes",
                self.chunk_size, self.buffer_capacity
            )));
        }
        if self.frame_size % 4 != 0 {
            return Err(Error::Config(format!(
                "frame_size {} is not a whole number of stereo s16 samples",
                self.frame_size
            )));
        }
        if self.default_volume > 100 {
            return Err(Error::InvalidVolume(u16::from(self.default_volume)));
        }
        Ok(())
    }

    /// Resolve the decoder executable.
    pub fn decoder_program(&self) -> PathBuf {
        if let Some(path) = &self.decoder_path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "cadence")
            .map(|d| d.cache_dir().join("ffmpeg"))
            .filter(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub const fn buffer_recheck(&self) -> Duration {
        Duration::from_millis(self.buffer_recheck_ms)
    }
}
