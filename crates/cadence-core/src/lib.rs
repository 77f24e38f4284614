//! # cadence-core
//!
//! Core types, queue state, configuration, and error handling for the Cadence
//! voice-channel music player.

pub mod config;
pub mod error;
pub mod playback_queue;
pub mod types;

pub use config::PlayerConfig;
pub use error::{Error, Result};
pub use playback_queue::PlaybackQueue;
pub use types::*;
