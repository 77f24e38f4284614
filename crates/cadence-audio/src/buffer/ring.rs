//! Lock-free ring buffer for PCM byte streaming.
//!
//! This buffer is designed for single-producer, single-consumer scenarios
//! where a buffering task writes decoder output and the output sink reads
//! frames.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free single-producer, single-consumer byte ring buffer.
///
/// Cursors are monotonically increasing counters; the content length is their
/// wrapping difference, so the full capacity is usable.
pub struct RingBuffer {
    /// The underlying buffer storage.
    buffer: Box<[UnsafeCell<u8>]>,
    /// Total bytes ever read.
    read_pos: AtomicUsize,
    /// Total bytes ever written.
    write_pos: AtomicUsize,
    /// Buffer capacity (power of 2 for efficient modulo).
    capacity: usize,
    /// Mask for efficient modulo (capacity - 1).
    mask: usize,
    /// Set the first time the writer found the buffer too full for a chunk.
    prebuffered: AtomicBool,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity in bytes.
    ///
    /// The capacity will be rounded up to the next power of 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        let buffer = (0..capacity).map(|_| UnsafeCell::new(0)).collect();

        Self {
            buffer,
            read_pos: AtomicUsize::new(0),
            write_pos: AtomicUsize::new(0),
            capacity,
            mask: capacity - 1,
            prebuffered: AtomicBool::new(false),
        }
    }

    /// Get the buffer capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of bytes available for reading.
    pub fn content_length(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Get the number of free bytes for writing.
    pub fn free_space(&self) -> usize {
        self.capacity - self.content_length()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.content_length() == 0
    }

    /// Check if the buffer is full.
    pub fn is_full(&self) -> bool {
        self.free_space() == 0
    }

    fn storage(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.buffer.as_ptr())
    }

    /// Write bytes to the buffer.
    ///
    /// Returns the number of bytes actually written, which is less than
    /// `data.len()` only when the buffer runs out of space.
    /// This method is designed to be called from the producer task.
    pub fn write(&self, data: &[u8]) -> usize {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);

        let available_space = self.capacity - write_pos.wrapping_sub(read_pos);
        let to_write = data.len().min(available_space);

        if to_write == 0 {
            return 0;
        }

        let start_idx = write_pos & self.mask;
        let first_chunk = to_write.min(self.capacity - start_idx);
        let storage = self.storage();

        // SAFETY: We're the only writer. The range [write_pos, write_pos + to_write)
        // is free space the reader will not touch until write_pos is published,
        // and both copies stay within the allocation.
        #[allow(unsafe_code)]
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), storage.add(start_idx), first_chunk);
            std::ptr::copy_nonoverlapping(
                data.as_ptr().add(first_chunk),
                storage,
                to_write - first_chunk,
            );
        }

        self.write_pos
            .store(write_pos.wrapping_add(to_write), Ordering::Release);

        to_write
    }

    /// Read bytes from the buffer.
    ///
    /// Returns the number of bytes actually read. Never blocks: an empty
    /// buffer reads zero bytes.
    /// This method is designed to be called from the consumer thread.
    pub fn read(&self, output: &mut [u8]) -> usize {
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let write_pos = self.write_pos.load(Ordering::Acquire);

        let available = write_pos.wrapping_sub(read_pos);
        let to_read = output.len().min(available);

        if to_read == 0 {
            return 0;
        }

        let start_idx = read_pos & self.mask;
        let first_chunk = to_read.min(self.capacity - start_idx);
        let storage = self.storage();

        // SAFETY: We're the only reader. The range [read_pos, read_pos + to_read)
        // was published by the writer with Release ordering and will not be
        // overwritten until read_pos moves past it.
        #[allow(unsafe_code)]
        unsafe {
            std::ptr::copy_nonoverlapping(
                storage.add(start_idx),
                output.as_mut_ptr(),
                first_chunk,
            );
            std::ptr::copy_nonoverlapping(
                storage,
                output.as_mut_ptr().add(first_chunk),
                to_read - first_chunk,
            );
        }

        self.read_pos
            .store(read_pos.wrapping_add(to_read), Ordering::Release);

        to_read
    }

    /// Drop everything that has not been read yet.
    ///
    /// Must only be called from the consumer side.
    pub fn clear(&self) {
        let write_pos = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(write_pos, Ordering::Release);
    }

    /// Record that the buffer has filled up.
    ///
    /// Returns `true` only for the first call over the buffer's lifetime.
    pub fn mark_prebuffered(&self) -> bool {
        !self.prebuffered.swap(true, Ordering::AcqRel)
    }

    pub fn is_prebuffered(&self) -> bool {
        self.prebuffered.load(Ordering::Acquire)
    }
}

// SAFETY: RingBuffer is safe to share between threads (Send + Sync).
// The producer and consumer operate on disjoint byte ranges, coordinated by
// the atomic cursors, so no byte is accessed by both roles at once.
#[allow(unsafe_code)]
unsafe impl Send for RingBuffer {}
#[allow(unsafe_code)]
unsafe impl Sync for RingBuffer {}

/// Thread-safe reference to a ring buffer.
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared ring buffer.
pub fn shared_ring_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}
