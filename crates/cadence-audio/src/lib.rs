//! # cadence-audio
//!
//! Streaming audio pipeline for Cadence.
//!
//! Features:
//! - Lock-free byte ring buffer between the decoder and the output sink
//! - ffmpeg subprocess decoding to s16le stereo 48 kHz PCM
//! - Per-track buffering with pre-buffer signalling
//! - Queue-driven playback engine with pull-based frame delivery

pub mod buffer;
pub mod decoder;
pub mod engine;
pub mod pcm;
pub mod registry;
pub mod track_buffer;

pub use buffer::{shared_ring_buffer, RingBuffer, SharedRingBuffer};
pub use decoder::{DecoderCommand, DecoderProcess};
pub use engine::{EngineEvent, PlaybackEngine, PlaybackState};
pub use registry::PlayerRegistry;
pub use track_buffer::{BufferSettings, PrebufferOutcome, TrackBuffer};
