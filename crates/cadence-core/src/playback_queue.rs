//! Thread-safe playback queue shared by the engine and the command layer.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::types::{Queue, QueueItem, QueueSnapshot, RepeatMode, Track};
use crate::Result;

/// Playback queue guarded by a single mutex.
///
/// Queues are small and mutated from command handlers, so one lock per queue
/// serializes every read and write.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    inner: Mutex<Queue>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(max_size: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Queue::with_max_size(max_size)),
        }
    }

    /// Append a track, returning its index.
    pub fn enqueue(&self, track: Track, queuer: impl Into<String>) -> Result<usize> {
        let index = self.inner.lock().push(QueueItem::new(track, queuer))?;
        debug!("Enqueued track at index {index}");
        Ok(index)
    }

    /// Insert a track right after the current one, returning its index.
    pub fn enqueue_next(&self, track: Track, queuer: impl Into<String>) -> Result<usize> {
        let index = self.inner.lock().push_next(QueueItem::new(track, queuer))?;
        debug!("Enqueued track next at index {index}");
        Ok(index)
    }

    /// Append tracks in order until the queue is full, returning how many fit.
    pub fn enqueue_many(
        &self,
        tracks: impl IntoIterator<Item = Track>,
        queuer: &str,
    ) -> Result<usize> {
        let items = tracks
            .into_iter()
            .map(|track| QueueItem::new(track, queuer))
            .collect::<Vec<_>>();
        let added = self.inner.lock().extend(items)?;
        debug!("Enqueued {added} tracks for {queuer}");
        Ok(added)
    }

    /// Move the cursor forward, returning the new current item.
    pub fn advance(&self, count: usize) -> Option<QueueItem> {
        self.inner.lock().advance(count).cloned()
    }

    /// Move the cursor according to the repeat mode after a track finished.
    pub fn advance_after_completion(&self) -> Option<usize> {
        self.inner.lock().advance_after_completion()
    }

    /// Move the cursor past the finished track `id`, which may have been
    /// removed while it played.
    pub fn complete(&self, id: Uuid) -> Option<usize> {
        self.inner.lock().complete(id)
    }

    /// Skip `count` tracks past the playing track `id`.
    pub fn skip(&self, id: Uuid, count: usize) -> Option<QueueItem> {
        self.inner.lock().skip(id, count).cloned()
    }

    /// Current index and item, marked as the track now playing.
    pub fn start_current(&self) -> Option<(usize, QueueItem)> {
        self.inner
            .lock()
            .start_current()
            .map(|(index, item)| (index, item.clone()))
    }

    /// Current index together with the current item.
    pub fn current(&self) -> Option<(usize, QueueItem)> {
        let queue = self.inner.lock();
        queue
            .current()
            .map(|item| (queue.current_index(), item.clone()))
    }

    pub fn current_index(&self) -> usize {
        self.inner.lock().current_index()
    }

    pub fn set_index(&self, index: usize) -> Result<QueueItem> {
        self.inner.lock().jump_to(index).cloned()
    }

    pub fn remove_at(&self, index: usize) -> Result<QueueItem> {
        self.inner.lock().remove_at(index)
    }

    pub fn remove_by_id(&self, id: Uuid) -> Option<QueueItem> {
        self.inner.lock().remove(id)
    }

    pub fn remove_by_queuer(&self, queuer: &str) -> usize {
        self.inner.lock().remove_by_queuer(queuer)
    }

    pub fn move_track(&self, from: usize, to: usize) -> Option<QueueItem> {
        self.inner.lock().move_track(from, to)
    }

    pub fn shuffle(&self, rng: &mut impl Rng) {
        self.inner.lock().shuffle(rng);
    }

    pub fn promote_fair_next(&self, last_queuer: &str) -> Option<usize> {
        self.inner.lock().promote_fair_next(last_queuer)
    }

    pub fn is_last(&self) -> bool {
        self.inner.lock().is_last()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn repeat(&self) -> RepeatMode {
        self.inner.lock().repeat_mode()
    }

    pub fn set_repeat(&self, mode: RepeatMode) {
        self.inner.lock().set_repeat_mode(mode);
    }

    pub fn cycle_repeat(&self) -> RepeatMode {
        self.inner.lock().cycle_repeat()
    }

    pub fn set_max_size(&self, max_size: Option<usize>) {
        self.inner.lock().set_max_size(max_size);
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.lock().snapshot()
    }
}
