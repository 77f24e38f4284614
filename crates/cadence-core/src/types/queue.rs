//! Queue management types.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Track;
use crate::{Error, Result};

/// A single item in the playback queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueItem {
    /// Stable identity, independent of the item's position.
    pub id: Uuid,
    /// The track to play.
    pub track: Track,
    /// Who asked for this track.
    pub queuer: String,
}

impl QueueItem {
    pub fn new(track: Track, queuer: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            track,
            queuer: queuer.into(),
        }
    }
}

/// Repeat mode for playback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop after the last track.
    #[default]
    Off,
    /// Replay the current track.
    Track,
    /// Wrap around to the first track after the last one.
    Queue,
}

/// Point-in-time copy of the queue for rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub current_index: usize,
    pub items: Vec<QueueItem>,
    pub repeat: RepeatMode,
}

impl QueueSnapshot {
    pub fn current(&self) -> Option<&QueueItem> {
        self.items.get(self.current_index)
    }
}

/// What became of the cursor's track since it started playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CursorTrack {
    #[default]
    Present,
    /// Removed; the cursor already sits on its successor.
    Removed,
    /// Removed while it was the last track; the cursor wrapped to 0.
    RemovedLast,
}

/// The playback queue.
///
/// `current_index` is always in `[0, len)` while the queue has items and `0`
/// when it is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Queue {
    /// All items in the queue.
    items: Vec<QueueItem>,
    /// Current playback index.
    current_index: usize,
    /// Repeat mode.
    repeat_mode: RepeatMode,
    /// Upper bound on `items.len()`.
    max_size: Option<usize>,
    #[serde(skip)]
    cursor_track: CursorTrack,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(max_size: Option<usize>) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Get all items in the queue.
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Get the current track.
    pub fn current(&self) -> Option<&QueueItem> {
        self.items.get(self.current_index)
    }

    /// Get the current index.
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    /// Get the number of items in the queue.
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the queue is empty.
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True when the current track is the last one.
    pub const fn is_last(&self) -> bool {
        !self.items.is_empty() && self.current_index == self.items.len() - 1
    }

    pub const fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    /// Change the size bound. Tracks already queued beyond it are kept.
    pub const fn set_max_size(&mut self, max_size: Option<usize>) {
        self.max_size = max_size;
    }

    fn ensure_room(&self) -> Result<()> {
        match self.max_size {
            Some(max) if self.items.len() >= max => Err(Error::QueueFull { max }),
            _ => Ok(()),
        }
    }

    /// Slot of the track that follows the current one.
    const fn upcoming_slot(&self) -> usize {
        match self.cursor_track {
            CursorTrack::Present => self.current_index + 1,
            CursorTrack::Removed => self.current_index,
            CursorTrack::RemovedLast => self.items.len(),
        }
    }

    /// Add an item to the end of the queue, returning its index.
    pub fn push(&mut self, item: QueueItem) -> Result<usize> {
        self.ensure_room()?;
        self.items.push(item);
        let index = self.items.len() - 1;

        // A removed last track gets the new one as its successor
        if self.cursor_track == CursorTrack::RemovedLast {
            self.cursor_track = CursorTrack::Removed;
            self.current_index = index;
        }
        Ok(index)
    }

    /// Insert an item right after the current one, returning its index.
    pub fn push_next(&mut self, item: QueueItem) -> Result<usize> {
        let index = self.upcoming_slot();
        if index >= self.items.len() {
            return self.push(item);
        }
        self.ensure_room()?;
        self.items.insert(index, item);
        Ok(index)
    }

    /// Push items in order until the queue is full.
    ///
    /// Returns how many were added. Fails only when none could be added.
    pub fn extend(&mut self, items: impl IntoIterator<Item = QueueItem>) -> Result<usize> {
        let mut added = 0;
        for item in items {
            match self.push(item) {
                Ok(_) => added += 1,
                Err(e) if added == 0 => return Err(e),
                Err(_) => break,
            }
        }
        Ok(added)
    }

    /// Move the cursor forward by `count`, wrapping around the end.
    pub fn advance(&mut self, count: usize) -> Option<&QueueItem> {
        self.cursor_track = CursorTrack::Present;
        if self.items.is_empty() {
            return None;
        }
        let len = self.items.len();
        self.current_index = (self.current_index + count % len) % len;
        self.items.get(self.current_index)
    }

    /// Move the cursor after the current track finished playing.
    ///
    /// Returns the index to play next, or `None` when the queue ran out. In
    /// that case the cursor goes back to the first track.
    pub fn advance_after_completion(&mut self) -> Option<usize> {
        self.cursor_track = CursorTrack::Present;
        if self.items.is_empty() {
            return None;
        }
        match self.repeat_mode {
            RepeatMode::Track => Some(self.current_index),
            RepeatMode::Queue => {
                self.advance(1);
                Some(self.current_index)
            }
            RepeatMode::Off => {
                if self.is_last() {
                    self.current_index = 0;
                    None
                } else {
                    self.advance(1);
                    Some(self.current_index)
                }
            }
        }
    }

    /// The current track, marked as the one now playing.
    pub fn start_current(&mut self) -> Option<(usize, &QueueItem)> {
        self.cursor_track = CursorTrack::Present;
        let index = self.current_index;
        self.items.get(index).map(|item| (index, item))
    }

    /// Move the cursor past the finished track `id`.
    ///
    /// Same as [`Queue::advance_after_completion`] while `id` is under the
    /// cursor. If `id` was removed while it played, the cursor already sits on
    /// its successor and stays there; a removed last track ends the queue
    /// unless repeat is [`RepeatMode::Queue`].
    pub fn complete(&mut self, id: Uuid) -> Option<usize> {
        let cursor_track = std::mem::take(&mut self.cursor_track);
        if self.items.is_empty() {
            self.current_index = 0;
            return None;
        }
        if self.current().is_some_and(|item| item.id == id) {
            return self.advance_after_completion();
        }
        if self.items.iter().any(|item| item.id == id) {
            // The cursor was moved while `id` played
            return Some(self.current_index);
        }

        match cursor_track {
            CursorTrack::RemovedLast if self.repeat_mode != RepeatMode::Queue => None,
            _ => Some(self.current_index),
        }
    }

    /// Skip `count` tracks past `id`. If `id` was removed while it played,
    /// its successor counts as the first skipped-to track.
    pub fn skip(&mut self, id: Uuid, count: usize) -> Option<&QueueItem> {
        let removed = !self.items.iter().any(|item| item.id == id);
        let count = if removed { count.saturating_sub(1) } else { count };
        self.advance(count)
    }

    /// Jump to a specific index.
    pub fn jump_to(&mut self, index: usize) -> Result<&QueueItem> {
        let len = self.items.len();
        let item = self
            .items
            .get(index)
            .ok_or(Error::IndexOutOfBounds { index, len })?;
        self.current_index = index;
        self.cursor_track = CursorTrack::Present;
        Ok(item)
    }

    /// Remove the item at `index`.
    ///
    /// Removing an item before the cursor shifts the cursor back so it keeps
    /// pointing at the same track. Removing the current item leaves the cursor
    /// on whatever slid into its place.
    pub fn remove_at(&mut self, index: usize) -> Result<QueueItem> {
        let len = self.items.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }

        let was_current = index == self.current_index;
        let item = self.items.remove(index);

        if index < self.current_index {
            self.current_index -= 1;
        }
        let wrapped = self.current_index >= self.items.len();
        if wrapped {
            self.current_index = 0;
        }
        if was_current {
            self.cursor_track = if wrapped {
                CursorTrack::RemovedLast
            } else {
                CursorTrack::Removed
            };
        }

        Ok(item)
    }

    /// Remove an item by its UUID.
    pub fn remove(&mut self, id: Uuid) -> Option<QueueItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        self.remove_at(index).ok()
    }

    /// Remove every track added by `queuer`, returning how many went.
    pub fn remove_by_queuer(&mut self, queuer: &str) -> usize {
        let mut removed = 0;
        for index in (0..self.items.len()).rev() {
            if self.items[index].queuer == queuer && self.remove_at(index).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Relocate a track. Returns `None` without touching anything when
    /// `from == to` or either index is out of range.
    pub fn move_track(&mut self, from: usize, to: usize) -> Option<QueueItem> {
        let len = self.items.len();
        if from == to || from >= len || to >= len {
            return None;
        }

        let current_id = self.current().map(|item| item.id);
        let item = self.items.remove(from);
        self.items.insert(to, item.clone());

        if let Some(id) = current_id {
            self.current_index = self
                .items
                .iter()
                .position(|item| item.id == id)
                .unwrap_or(0);
        }

        Some(item)
    }

    /// Shuffle the queue. The current track moves to the front and stays current.
    pub fn shuffle(&mut self, rng: &mut impl Rng) {
        if self.items.len() < 2 {
            return;
        }
        let current = self.items.remove(self.current_index);
        self.items.shuffle(rng);
        self.items.insert(0, current);
        self.current_index = 0;
        self.cursor_track = CursorTrack::Present;
    }

    /// Move the first upcoming track from someone other than `last_queuer`
    /// right behind the current track.
    ///
    /// Returns the index the promoted track now sits at.
    pub fn promote_fair_next(&mut self, last_queuer: &str) -> Option<usize> {
        let next = self.upcoming_slot();
        let found = self
            .items
            .iter()
            .skip(next)
            .position(|item| item.queuer != last_queuer)?
            + next;

        if found != next {
            let item = self.items.remove(found);
            self.items.insert(next, item);
        }
        Some(next)
    }

    /// Clear the entire queue.
    pub fn clear(&mut self) {
        self.items.clear();
        self.current_index = 0;
        self.cursor_track = CursorTrack::Present;
    }

    /// Get repeat mode.
    pub const fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Set repeat mode.
    pub const fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
    }

    /// Cycle through repeat modes.
    pub const fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat_mode = match self.repeat_mode {
            RepeatMode::Off => RepeatMode::Queue,
            RepeatMode::Queue => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Off,
        };
        self.repeat_mode
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current_index: self.current_index,
            items: self.items.clone(),
            repeat: self.repeat_mode,
        }
    }
}
