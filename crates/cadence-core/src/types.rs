//! Core domain types for Cadence.

pub mod common;
pub mod queue;
pub mod track;

pub use common::*;
pub use queue::{Queue, QueueItem, QueueSnapshot, RepeatMode};
pub use track::{Platform, Track, TrackSource};
