//! Diff-based undo/redo.
//!
//! History stores the committed [`RecordChanges`] of each undoable
//! transaction and a cursor into that list. Undo replays the entry at
//! `cursor - 1` backward, redo replays the entry at `cursor` forward.
//! Committing while redo entries exist drops them. When a replay
//! conflicts with the live records (an external write slipped in), the
//! stale span is dropped and the operation becomes a no-op.

use crate::store::RecordChanges;

/// Entries kept before the oldest is discarded.
const MAX_HISTORY: usize = 100;

#[derive(Debug, Default)]
pub struct History {
    entries: Vec<RecordChanges>,
    /// Number of entries currently applied; entries `cursor..` are the
    /// redo tail.
    cursor: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Append a committed diff, discarding any redo tail. Empty diffs
    /// are not recorded.
    pub fn record(&mut self, changes: RecordChanges) {
        if changes.is_empty() {
            return;
        }
        self.entries.truncate(self.cursor);
        self.entries.push(changes);
        if self.entries.len() > MAX_HISTORY {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len();
    }

    /// The entry undo would replay next.
    pub fn peek_undo(&self) -> Option<&RecordChanges> {
        self.cursor.checked_sub(1).map(|i| &self.entries[i])
    }

    /// The entry redo would replay next.
    pub fn peek_redo(&self) -> Option<&RecordChanges> {
        self.entries.get(self.cursor)
    }

    /// Move the cursor back after a successful backward replay.
    pub fn step_back(&mut self) {
        debug_assert!(self.cursor > 0);
        self.cursor -= 1;
    }

    /// Move the cursor forward after a successful forward replay.
    pub fn step_forward(&mut self) {
        debug_assert!(self.cursor < self.entries.len());
        self.cursor += 1;
    }

    /// Drop the applied span after an undo conflict: every entry at or
    /// below the cursor is stale relative to the live records.
    pub fn drop_undo_span(&mut self) {
        self.entries.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Drop the redo tail after a redo conflict.
    pub fn drop_redo_span(&mut self) {
        self.entries.truncate(self.cursor);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
