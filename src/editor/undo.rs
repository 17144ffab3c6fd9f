use std::collections::VecDeque;

use super::buffer::LineBuffer;
use super::cursor::Cursor;
use super::viewport::ScrollPosition;

/// Default number of snapshots kept
pub const DEFAULT_UNDO_LIMIT: usize = 1000;

/// Full copy of the session state taken just before a mutating command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoFrame {
    pub buffer: LineBuffer,
    pub cursor: Cursor,
    pub scroll: ScrollPosition,
}

impl UndoFrame {
    pub fn new(buffer: &LineBuffer, cursor: Cursor, scroll: ScrollPosition) -> Self {
        Self {
            buffer: buffer.clone(),
            cursor,
            scroll,
        }
    }
}

/// Linear snapshot-based undo/redo history
#[derive(Debug, Clone)]
pub struct UndoStack {
    /// Oldest snapshot at the front (VecDeque for O(1) trimming)
    undo_stack: VecDeque<UndoFrame>,
    redo_stack: Vec<UndoFrame>,
    max_entries: usize,
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::with_limit(DEFAULT_UNDO_LIMIT)
    }
}

impl UndoStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_entries: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_entries: max_entries.max(1),
        }
    }

    /// Store a copy of the given state. Clears the redo history.
    pub fn snapshot(&mut self, buffer: &LineBuffer, cursor: Cursor, scroll: ScrollPosition) {
        self.push_undo(UndoFrame::new(buffer, cursor, scroll));
        self.redo_stack.clear();
    }

    /// Step back one snapshot.
    ///
    /// `current` is the live state, kept for redo. Returns `None` (and
    /// drops nothing) when there is nothing to undo.
    pub fn undo(&mut self, current: UndoFrame) -> Option<UndoFrame> {
        let frame = self.undo_stack.pop_back()?;
        self.redo_stack.push(current);
        Some(frame)
    }

    /// Step forward again after an undo
    pub fn redo(&mut self, current: UndoFrame) -> Option<UndoFrame> {
        let frame = self.redo_stack.pop()?;
        self.push_undo(current);
        Some(frame)
    }

    fn push_undo(&mut self, frame: UndoFrame) {
        self.undo_stack.push_back(frame);
        while self.undo_stack.len() > self.max_entries {
            self.undo_stack.pop_front();
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all history (a new file was loaded)
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str, line: usize) -> UndoFrame {
        UndoFrame::new(
            &LineBuffer::from_text(text),
            Cursor::new(line, 0),
            ScrollPosition::default(),
        )
    }

    #[test]
    fn test_undo_then_redo_round_trip() {
        let mut undo = UndoStack::new();
        let before = frame("a\nb", 0);
        undo.snapshot(&before.buffer, before.cursor, before.scroll);

        let after = frame("a\nb\nc", 2);
        let restored = undo.undo(after.clone()).unwrap();
        assert_eq!(restored, before);

        let again = undo.redo(restored).unwrap();
        assert_eq!(again, after);
        assert!(undo.can_undo());
        assert!(!undo.can_redo());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut undo = UndoStack::new();
        let mut live = LineBuffer::from_text("one");
        undo.snapshot(&live, Cursor::default(), ScrollPosition::default());
        live.set(0, "changed");
        live.insert_after(0, "more");

        let restored = undo.undo(frame("x", 0)).unwrap();
        assert_eq!(restored.buffer.to_string(), "one");
    }

    #[test]
    fn test_empty_stack_is_noop() {
        let mut undo = UndoStack::new();
        assert!(undo.undo(frame("x", 0)).is_none());
        assert!(undo.redo(frame("x", 0)).is_none());
        assert_eq!(undo.undo_count(), 0);
        assert_eq!(undo.redo_count(), 0);
    }

    #[test]
    fn test_new_snapshot_discards_redo() {
        let mut undo = UndoStack::new();
        let f = frame("a", 0);
        undo.snapshot(&f.buffer, f.cursor, f.scroll);
        undo.undo(frame("b", 0)).unwrap();
        assert!(undo.can_redo());

        undo.snapshot(&f.buffer, f.cursor, f.scroll);
        assert!(!undo.can_redo());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut undo = UndoStack::with_limit(2);
        for text in ["1", "2", "3"] {
            let f = frame(text, 0);
            undo.snapshot(&f.buffer, f.cursor, f.scroll);
        }
        assert_eq!(undo.undo_count(), 2);
        assert_eq!(undo.undo(frame("4", 0)).unwrap().buffer.to_string(), "3");
        assert_eq!(undo.undo(frame("3", 0)).unwrap().buffer.to_string(), "2");
        assert!(undo.undo(frame("2", 0)).is_none());
    }
}
