//! Maps logical line indices onto the rows of a terminal window.
//!
//! The viewport owns the scroll state of one session: the first logical line
//! on screen (`offset_y`) and the cursor's row and display column inside the
//! window. The logical line under the cursor is always `offset_y + screen_y`.

use std::ops::Range;

use unicode_width::UnicodeWidthChar;

use super::buffer::LineBuffer;

/// Height used before the terminal size is known
pub const DEFAULT_HEIGHT: usize = 25;

/// Scroll state saved in undo frames and restored on undo/redo
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollPosition {
    /// First logical line rendered
    pub offset_y: usize,
    /// Cursor row within the window
    pub screen_y: usize,
    /// Cursor display column within the window (tabs expanded)
    pub screen_x: usize,
}

/// Outcome of [`Viewport::go_to`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoTo {
    /// Something changed on screen (at least the cursor)
    pub redraw: bool,
    /// `offset_y` moved, so every row must be repainted
    pub scrolled: bool,
    /// The target was past the last line and got clamped to it
    pub reached_end: bool,
}

#[derive(Debug, Clone)]
pub struct Viewport {
    pos: ScrollPosition,
    height: usize,
    tab_width: usize,
}

impl Viewport {
    pub fn new(height: usize, tab_width: usize) -> Self {
        Self {
            pos: ScrollPosition::default(),
            height: height.max(1),
            tab_width: tab_width.max(1),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn tab_width(&self) -> usize {
        self.tab_width
    }

    /// Resize the window, keeping the cursor on the same logical line
    pub fn set_height(&mut self, height: usize) {
        self.height = height.max(1);
        if self.pos.screen_y >= self.height {
            let overflow = self.pos.screen_y - (self.height - 1);
            self.pos.offset_y += overflow;
            self.pos.screen_y = self.height - 1;
        }
    }

    pub fn position(&self) -> ScrollPosition {
        self.pos
    }

    /// Restore a saved position (from an undo frame)
    pub fn restore(&mut self, pos: ScrollPosition) {
        self.pos = pos;
        // The window may have shrunk since the position was saved
        self.set_height(self.height);
    }

    pub fn offset_y(&self) -> usize {
        self.pos.offset_y
    }

    pub fn screen_y(&self) -> usize {
        self.pos.screen_y
    }

    pub fn screen_x(&self) -> usize {
        self.pos.screen_x
    }

    /// Logical line under the cursor
    pub fn line(&self) -> usize {
        self.pos.offset_y + self.pos.screen_y
    }

    /// Logical lines currently mapped onto the window
    pub fn visible_range(&self, len: usize) -> Range<usize> {
        let start = self.pos.offset_y.min(len);
        start..(self.pos.offset_y + self.height).min(len)
    }

    /// Bring `target` on screen with as little scrolling as possible.
    ///
    /// Targets past the last line are clamped to it (`reached_end`). A target
    /// inside the current window only moves the cursor row. Otherwise the
    /// window snaps to the top for targets on the first page, to the last page
    /// when the end was reached, and in every other case keeps the cursor on
    /// the same screen row it had before the jump.
    pub fn go_to(&mut self, target: usize, buffer: &LineBuffer) -> GoTo {
        let len = buffer.len().max(1);
        let h = self.height;
        let reached_end = target >= len;
        let target = target.min(len - 1);

        if target == self.line() {
            return GoTo {
                redraw: true,
                scrolled: false,
                reached_end,
            };
        }

        let old_offset = self.pos.offset_y;
        if target >= old_offset && target < old_offset + h {
            self.pos.screen_y = target - old_offset;
        } else if target < h {
            self.pos.offset_y = 0;
            self.pos.screen_y = target;
        } else if reached_end {
            self.pos.offset_y = len.saturating_sub(h);
            self.pos.screen_y = target - self.pos.offset_y;
        } else {
            // target >= h here, so keeping the old row never underflows
            let keep = self.pos.screen_y.min(h - 1);
            self.pos.offset_y = target - keep;
            self.pos.screen_y = keep;
        }

        let line = buffer.get(target).unwrap_or("");
        self.pos.screen_x = first_screen_position(line, self.tab_width).1;

        GoTo {
            redraw: true,
            scrolled: self.pos.offset_y != old_offset,
            reached_end,
        }
    }

    /// Go to a 1-based line and column. Returns the outcome and the char
    /// index of the column (clamped to the end of the line).
    pub fn go_to_line_and_column(
        &mut self,
        line_number: usize,
        col_number: usize,
        buffer: &LineBuffer,
    ) -> (GoTo, usize) {
        let mut outcome = self.go_to(line_number.max(1) - 1, buffer);
        let text = buffer.get(self.line()).unwrap_or("");
        let col = (col_number.max(1) - 1).min(text.chars().count());
        let screen_x = display_column(text, col, self.tab_width);
        if self.pos.screen_x != screen_x {
            outcome.redraw = true;
        }
        self.pos.screen_x = screen_x;
        (outcome, col)
    }

    /// Place the cursor at char index `col` of the current line
    pub fn set_column(&mut self, buffer: &LineBuffer, col: usize) {
        let text = buffer.get(self.line()).unwrap_or("");
        self.pos.screen_x = display_column(text, col, self.tab_width);
    }

    /// Scroll so the cursor line sits in the middle row, without scrolling
    /// past the first or last page. Returns true if `offset_y` moved.
    pub fn center(&mut self, len: usize) -> bool {
        let line = self.line();
        let last_page = len.max(1).saturating_sub(self.height);
        let offset = line.saturating_sub(self.height / 2).min(last_page);
        if offset == self.pos.offset_y {
            return false;
        }
        self.pos.offset_y = offset;
        self.pos.screen_y = line - offset;
        true
    }
}

/// Display width of one char at display column `at`
fn char_width(ch: char, at: usize, tab_width: usize) -> usize {
    if ch == '\t' {
        tab_width - (at % tab_width)
    } else {
        ch.width().unwrap_or(0)
    }
}

/// Display column of char index `col`, with tabs expanded to the next tab stop
pub fn display_column(text: &str, col: usize, tab_width: usize) -> usize {
    let tab_width = tab_width.max(1);
    text.chars()
        .take(col)
        .fold(0, |at, ch| at + char_width(ch, at, tab_width))
}

/// First non-blank position of a line as (char index, display column)
pub fn first_screen_position(text: &str, tab_width: usize) -> (usize, usize) {
    let blanks = text.chars().take_while(|c| *c == ' ' || *c == '\t').count();
    (blanks, display_column(text, blanks, tab_width))
}

/// Expand tabs into spaces for rendering
pub fn expand_tabs(text: &str, tab_width: usize) -> String {
    let tab_width = tab_width.max(1);
    let mut out = String::with_capacity(text.len());
    let mut at = 0;
    for ch in text.chars() {
        let w = char_width(ch, at, tab_width);
        if ch == '\t' {
            out.extend(std::iter::repeat(' ').take(w));
        } else {
            out.push(ch);
        }
        at += w;
    }
    out
}
