//! The ordered play queue and its cursor.
//!
//! Insertion order is playback order. Whenever the queue is non-empty the
//! cursor points inside it; every index-taking mutation validates bounds
//! and fails without touching state rather than wrapping or clamping.

use crate::{
    error::{Error, Result},
    track::{QueueItem, TrackMetadata},
};

#[derive(Debug, Default)]
pub struct Queue {
    items: Vec<QueueItem>,
    current: usize,
}

impl Queue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The cursor, inactive when the queue is empty.
    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        (!self.items.is_empty()).then_some(self.current)
    }

    #[must_use]
    pub fn current_item(&self) -> Option<&QueueItem> {
        self.items.get(self.current)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&QueueItem> {
        self.items.get(index)
    }

    #[must_use]
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    /// Replaces the queue wholesale and rewinds the cursor.
    pub fn replace(&mut self, items: Vec<QueueItem>) -> Result<()> {
        if items.is_empty() {
            return Err(Error::invalid_input(
                "cannot replace the queue with an empty track list",
            ));
        }

        self.items = items;
        self.current = 0;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.current = 0;
    }

    /// Index of the item after the cursor; fails at the tail, no wrapping.
    pub fn next_index(&self) -> Result<usize> {
        let next = self.current.saturating_add(1);
        if next >= self.items.len() {
            return Err(Error::out_of_bounds(next, self.items.len()));
        }
        Ok(next)
    }

    /// Index of the item before the cursor; fails at the head, no wrapping.
    pub fn previous_index(&self) -> Result<usize> {
        if self.items.is_empty() || self.current == 0 {
            return Err(Error::out_of_bounds(0, self.items.len()));
        }
        Ok(self.current - 1)
    }

    /// Moves the cursor to `index`.
    pub fn jump(&mut self, index: usize) -> Result<&QueueItem> {
        let len = self.items.len();
        if index >= len {
            return Err(Error::out_of_bounds(index, len));
        }

        self.current = index;
        Ok(&self.items[index])
    }

    /// Appends at the tail; the cursor is untouched.
    pub fn push(&mut self, item: QueueItem) {
        self.items.push(item);
    }

    /// Inserts right after the cursor, or appends when the queue is empty.
    pub fn insert_after_current(&mut self, item: QueueItem) {
        if self.items.is_empty() {
            self.items.push(item);
        } else {
            let position = (self.current + 1).min(self.items.len());
            self.items.insert(position, item);
        }
    }

    /// Removes an unplayed item. Items at or before the cursor stay put.
    pub fn remove(&mut self, index: usize) -> Result<()> {
        if index <= self.current || index >= self.items.len() {
            return Err(Error::out_of_bounds(index, self.items.len()));
        }

        self.items.remove(index);
        Ok(())
    }

    /// Reorders unplayed items. Both positions must be after the cursor.
    pub fn move_item(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.items.len();
        if from <= self.current || from >= len {
            return Err(Error::out_of_bounds(from, len));
        }
        if to <= self.current || to >= len {
            return Err(Error::out_of_bounds(to, len));
        }
        if from == to {
            return Ok(());
        }

        let item = self.items.remove(from);
        self.items.insert(to, item);
        Ok(())
    }

    /// Drops everything after the cursor; the current and played items stay.
    pub fn clear_upcoming(&mut self) {
        if !self.items.is_empty() {
            self.items.truncate(self.current + 1);
        }
    }

    /// Fills in metadata for a lazily resolved item. The URI must still
    /// match; a stale index (edits shifted the queue meanwhile) is
    /// ignored.
    pub fn fill(&mut self, index: usize, uri: &str, metadata: TrackMetadata) {
        if let Some(item) = self.items.get_mut(index) {
            if item.uri == uri {
                item.metadata = Some(metadata);
            }
        }
    }

    /// The whole queue as one serialized array-of-objects document.
    pub fn snapshot_json(&self) -> Result<String> {
        serde_json::to_string(&self.items).map_err(Into::into)
    }
}
