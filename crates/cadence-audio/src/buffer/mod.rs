//! Lock-free buffer implementations for streamed PCM.

pub mod ring;

pub use ring::{shared_ring_buffer, RingBuffer, SharedRingBuffer};
