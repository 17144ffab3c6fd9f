mod buffer;
mod cursor;
mod jump;
mod undo;
mod viewport;

pub use buffer::LineBuffer;
pub use cursor::Cursor;
pub use jump::JumpMarks;
pub use undo::{UndoFrame, UndoStack, DEFAULT_UNDO_LIMIT};
pub use viewport::{
    display_column, expand_tabs, first_screen_position, GoTo, ScrollPosition, Viewport,
    DEFAULT_HEIGHT,
};

use crate::commands::CommandLine;
use crate::config::{Paths, Settings};
use crate::last_command;
use crate::location::LocationHistory;
use crate::lock::{LockKeeper, LockOutcome};
use crate::portal::{Portal, PortalError, PullOutcome};
use std::path::{Path, PathBuf};

/// The current mode of the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Insert,
    Command,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Insert => "INSERT",
            Mode::Command => "COMMAND",
        }
    }
}

/// How much of the screen must be repainted. Ordered so that `max` merges requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Redraw {
    #[default]
    None,
    /// Cursor position and status line only
    Cursor,
    /// Every row
    Full,
}

/// Status line message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub text: String,
    pub is_error: bool,
}

/// Result of [`Editor::open_file`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// Another live session holds the file and `force` was not given
    Locked { owner: u32 },
}

/// One editing session: a single file, its undo history and scroll state,
/// plus the handles to the files shared with other sessions.
pub struct Editor {
    pub buffer: LineBuffer,
    /// Char index of the cursor in the current line
    col: usize,
    pub viewport: Viewport,
    pub undo_stack: UndoStack,
    pub mode: Mode,
    pub command_line: CommandLine,
    pub settings: Settings,
    paths: Paths,
    path: Option<PathBuf>,
    locks: LockKeeper,
    portal: Portal,
    locations: LocationHistory,
    jump_marks: JumpMarks,
    /// Buffer differs from the file on disk
    pub modified: bool,
    redraw: Redraw,
    pub status: Option<Status>,
    pub should_quit: bool,
    /// First key of a two-key normal mode command (`gg`, `dd`, `ma`, `'a`)
    pub pending_key: Option<char>,
    /// Shell command to run with the terminal suspended (handled by main loop)
    pub pending_external_command: Option<String>,
    /// Export command to hand to the background runner (handled by main loop)
    pub pending_export: Option<String>,
    /// An insert session already took its snapshot
    insert_group_open: bool,
}

impl Editor {
    pub fn new(settings: Settings, paths: Paths) -> Self {
        let locks = LockKeeper::new(&paths.lock_file);
        let portal = Portal::new(&paths.portal_file);
        Self::with_coordination(settings, paths, locks, portal)
    }

    /// Build a session around explicit lock and portal handles
    pub fn with_coordination(
        settings: Settings,
        paths: Paths,
        locks: LockKeeper,
        portal: Portal,
    ) -> Self {
        let locations = LocationHistory::load(&paths.location_file);
        Self {
            buffer: LineBuffer::new(),
            col: 0,
            viewport: Viewport::new(DEFAULT_HEIGHT, settings.editor.tab_width),
            undo_stack: UndoStack::with_limit(settings.editor.undo_limit),
            mode: Mode::Normal,
            command_line: CommandLine::new(),
            settings,
            paths,
            path: None,
            locks,
            portal,
            locations,
            jump_marks: JumpMarks::new(),
            modified: false,
            redraw: Redraw::Full,
            status: None,
            should_quit: false,
            pending_key: None,
            pending_external_command: None,
            pending_export: None,
            insert_group_open: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn display_name(&self) -> String {
        self.path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "[No Name]".to_string())
    }

    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.viewport.line(), self.col)
    }

    pub fn current_line(&self) -> &str {
        self.buffer.get(self.viewport.line()).unwrap_or("")
    }

    fn line_chars(&self) -> usize {
        self.current_line().chars().count()
    }

    /// Last valid cursor column (insert mode may sit past the last char)
    fn max_col(&self) -> usize {
        let len = self.line_chars();
        if self.mode == Mode::Insert {
            len
        } else {
            len.saturating_sub(1)
        }
    }

    // ---- Redraw and status ----

    fn mark(&mut self, redraw: Redraw) {
        self.redraw = self.redraw.max(redraw);
    }

    /// Pending repaint request, reset to [`Redraw::None`]
    pub fn take_redraw(&mut self) -> Redraw {
        std::mem::take(&mut self.redraw)
    }

    /// Force a full repaint (terminal resized, external command returned)
    pub fn invalidate(&mut self) {
        self.mark(Redraw::Full);
    }

    /// Repaint the status and message lines (command line input changed)
    pub fn invalidate_status_line(&mut self) {
        self.mark(Redraw::Cursor);
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some(Status {
            text: msg.into(),
            is_error: false,
        });
        self.mark(Redraw::Cursor);
    }

    pub fn set_error(&mut self, msg: impl Into<String>) {
        self.status = Some(Status {
            text: msg.into(),
            is_error: true,
        });
        self.mark(Redraw::Cursor);
    }

    pub fn clear_status(&mut self) {
        if self.status.take().is_some() {
            self.mark(Redraw::Cursor);
        }
    }

    /// New terminal height for the text area
    pub fn resize(&mut self, height: usize) {
        self.viewport.set_height(height);
        self.mark(Redraw::Full);
    }

    // ---- Mutation entry point ----

    /// Run a mutating action. The current state is snapshotted first, so
    /// every change made through here can be undone.
    ///
    /// An insert session snapshots once, on its first change.
    pub fn edit<R>(&mut self, action: impl FnOnce(&mut Self) -> R) -> R {
        let grouped = self.mode == Mode::Insert && self.insert_group_open;
        if !grouped {
            self.undo_stack
                .snapshot(&self.buffer, self.cursor(), self.viewport.position());
        }
        if self.mode == Mode::Insert {
            self.insert_group_open = true;
        }
        let result = action(self);
        self.modified = true;
        self.mark(Redraw::Full);
        result
    }

    pub fn undo(&mut self) -> bool {
        let current = UndoFrame::new(&self.buffer, self.cursor(), self.viewport.position());
        match self.undo_stack.undo(current) {
            Some(frame) => {
                self.apply_frame(frame);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        let current = UndoFrame::new(&self.buffer, self.cursor(), self.viewport.position());
        match self.undo_stack.redo(current) {
            Some(frame) => {
                self.apply_frame(frame);
                true
            }
            None => false,
        }
    }

    fn apply_frame(&mut self, frame: UndoFrame) {
        self.buffer = frame.buffer;
        self.viewport.restore(frame.scroll);
        self.col = frame.cursor.col.min(self.max_col());
        self.viewport.set_column(&self.buffer, self.col);
        self.modified = true;
        self.mark(Redraw::Full);
    }

    // ---- Modes ----

    pub fn enter_insert_mode(&mut self) {
        self.mode = Mode::Insert;
        self.insert_group_open = false;
        self.mark(Redraw::Cursor);
    }

    /// `a`: insert after the cursor
    pub fn append(&mut self) {
        self.enter_insert_mode();
        self.col = (self.col + 1).min(self.max_col());
        self.sync_column();
    }

    pub fn leave_insert_mode(&mut self) {
        self.mode = Mode::Normal;
        self.insert_group_open = false;
        self.col = self.col.saturating_sub(1).min(self.max_col());
        self.sync_column();
    }

    pub fn enter_command_mode(&mut self) {
        self.mode = Mode::Command;
        self.command_line.clear();
        self.mark(Redraw::Cursor);
    }

    /// Esc on the command line: discard the input, nothing else
    pub fn cancel_command(&mut self) {
        self.command_line.clear();
        self.mode = Mode::Normal;
        self.mark(Redraw::Cursor);
    }

    // ---- Navigation ----

    fn sync_column(&mut self) {
        self.viewport.set_column(&self.buffer, self.col);
        self.mark(Redraw::Cursor);
    }

    /// Move to a logical line (clamped), cursor on its first non-blank char
    pub fn goto_line(&mut self, target: usize) -> GoTo {
        let outcome = self.viewport.go_to(target, &self.buffer);
        self.col = first_screen_position(self.current_line(), self.viewport.tab_width()).0;
        // go_to leaves the column alone when the line does not change
        self.viewport.set_column(&self.buffer, self.col);
        self.status = None;
        self.mark(if outcome.scrolled {
            Redraw::Full
        } else {
            Redraw::Cursor
        });
        outcome
    }

    /// Move to a 1-based line number (0 counts as 1). With `center`, the
    /// window is then scrolled to put that line in the middle.
    pub fn goto_line_number(&mut self, line_number: usize, center: bool) -> GoTo {
        let outcome = self.goto_line(line_number.max(1) - 1);
        self.center_after(outcome, center)
    }

    /// Move to a 1-based line and column
    pub fn goto_line_and_column(
        &mut self,
        line_number: usize,
        col_number: usize,
        center: bool,
    ) -> GoTo {
        let (outcome, col) =
            self.viewport
                .go_to_line_and_column(line_number, col_number, &self.buffer);
        self.col = col;
        self.status = None;
        self.mark(if outcome.scrolled {
            Redraw::Full
        } else {
            Redraw::Cursor
        });
        self.center_after(outcome, center)
    }

    fn center_after(&mut self, mut outcome: GoTo, center: bool) -> GoTo {
        if center && outcome.redraw && self.viewport.center(self.buffer.len()) {
            outcome.scrolled = true;
            self.mark(Redraw::Full);
        }
        outcome
    }

    // ---- Jump marks ----

    /// Remember the cursor under `ch`. Returns false if `ch` cannot name a mark.
    pub fn register_jump_mark(&mut self, ch: char) -> bool {
        let at = self.cursor();
        self.jump_marks.register(ch, at)
    }

    pub fn has_jump_mark(&self, ch: char) -> bool {
        self.jump_marks.contains(ch)
    }

    /// Move to the position stored under `ch`, clamped to the current buffer
    pub fn jump_to_mark(&mut self, ch: char) -> bool {
        let Some(at) = self.jump_marks.get(ch) else {
            return false;
        };
        self.goto_line_and_column(at.line + 1, at.col + 1, false);
        self.col = self.col.min(self.max_col());
        self.sync_column();
        true
    }

    pub fn clear_jump_marks(&mut self) {
        self.jump_marks.clear();
    }

    /// Vertical move that tries to keep the column
    fn move_vertical(&mut self, target: usize) {
        let col = self.col;
        self.goto_line(target);
        self.col = col.min(self.max_col());
        self.sync_column();
    }

    pub fn move_up(&mut self) {
        let line = self.viewport.line();
        if line > 0 {
            self.move_vertical(line - 1);
        }
    }

    pub fn move_down(&mut self) {
        let line = self.viewport.line();
        if line + 1 < self.buffer.len() {
            self.move_vertical(line + 1);
        }
    }

    pub fn move_left(&mut self) {
        self.col = self.col.saturating_sub(1);
        self.sync_column();
    }

    pub fn move_right(&mut self) {
        self.col = (self.col + 1).min(self.max_col());
        self.sync_column();
    }

    pub fn move_to_line_start(&mut self) {
        self.col = 0;
        self.sync_column();
    }

    pub fn move_to_line_end(&mut self) {
        self.col = self.max_col();
        self.sync_column();
    }

    pub fn goto_first_line(&mut self) {
        self.goto_line(0);
    }

    /// `G`: past-the-end target, so the last page is shown
    pub fn goto_last_line(&mut self) {
        self.goto_line(self.buffer.len());
    }

    pub fn half_page_down(&mut self) {
        let step = (self.viewport.height() / 2).max(1);
        self.goto_line(self.viewport.line() + step);
    }

    pub fn half_page_up(&mut self) {
        let step = (self.viewport.height() / 2).max(1);
        self.goto_line(self.viewport.line().saturating_sub(step));
    }

    // ---- Editing ----

    pub fn insert_char(&mut self, ch: char) {
        self.edit(|e| {
            let line = e.viewport.line();
            let mut text = e.current_line().to_string();
            text.insert(byte_index(&text, e.col), ch);
            e.buffer.set(line, text);
            e.col += 1;
            e.sync_column();
        });
    }

    /// Split the current line at the cursor
    pub fn insert_newline(&mut self) {
        self.edit(|e| {
            let line = e.viewport.line();
            let text = e.current_line().to_string();
            let (left, right) = text.split_at(byte_index(&text, e.col));
            e.buffer.set(line, left);
            e.buffer.insert_after(line, right);
            e.goto_line(line + 1);
            e.col = 0;
            e.sync_column();
        });
    }

    /// Delete the char before the cursor, joining with the previous line at column 0
    pub fn backspace(&mut self) {
        let line = self.viewport.line();
        if self.col == 0 && line == 0 {
            return;
        }
        self.edit(|e| {
            if e.col > 0 {
                let mut text = e.current_line().to_string();
                text.remove(byte_index(&text, e.col - 1));
                e.buffer.set(line, text);
                e.col -= 1;
                e.sync_column();
                return;
            }
            let current = e.current_line().to_string();
            let previous = e.buffer.get(line - 1).unwrap_or("").to_string();
            let join_at = previous.chars().count();
            e.buffer.set(line - 1, previous + &current);
            e.buffer.delete_range(line, line);
            e.buffer.compact();
            e.goto_line(line - 1);
            e.col = join_at;
            e.sync_column();
        });
    }

    /// `x`: delete the char under the cursor
    pub fn delete_char(&mut self) {
        if self.col >= self.line_chars() {
            return;
        }
        self.edit(|e| {
            let line = e.viewport.line();
            let mut text = e.current_line().to_string();
            text.remove(byte_index(&text, e.col));
            e.buffer.set(line, text);
            e.col = e.col.min(e.max_col());
            e.sync_column();
        });
    }

    /// `dd`: delete the current line. The last remaining line is emptied instead.
    pub fn delete_line(&mut self) {
        if self.buffer.len() <= 1 && self.current_line().is_empty() {
            return;
        }
        self.edit(|e| {
            let line = e.viewport.line();
            if e.buffer.len() == 1 {
                e.buffer.set(0, "");
            } else {
                e.buffer.delete_range(line, line);
                e.buffer.compact();
            }
            e.goto_line(line);
        });
    }

    /// Delete every line from the cursor to the end of the file.
    ///
    /// One snapshot covers the whole batch. An open portal is closed first
    /// since it may point into the deleted lines.
    pub fn delete_rest_of_file(&mut self) {
        if self.buffer.len() <= 1 && self.current_line().is_empty() {
            return;
        }
        self.edit(|e| {
            if let Err(err) = e.portal.clear() {
                tracing::warn!(error = %err, "could not close portal");
            }
            let line = e.viewport.line();
            let removed = e.buffer.delete_range(line, usize::MAX);
            e.buffer.compact();
            if e.buffer.is_empty() {
                e.buffer.insert_at(0, "");
            }
            tracing::debug!(from = line, removed, "deleted rest of file");
            e.goto_line(line);
        });
    }

    /// `o`: open a line below and start inserting
    pub fn open_line_below(&mut self) {
        self.enter_insert_mode();
        self.edit(|e| {
            let line = e.viewport.line();
            e.buffer.insert_after(line, "");
            e.goto_line(line + 1);
        });
    }

    /// `O`: open a line above and start inserting
    pub fn open_line_above(&mut self) {
        self.enter_insert_mode();
        self.edit(|e| {
            let line = e.viewport.line();
            e.buffer.insert_at(line, "");
            e.col = 0;
            e.sync_column();
        });
    }

    // ---- File lifecycle ----

    /// Claim `path` in the lock registry and load it.
    ///
    /// A file held by another live session is refused unless `force` is set.
    /// The cursor is restored from the location history.
    pub fn open_file(&mut self, path: &Path, force: bool) -> anyhow::Result<OpenOutcome> {
        let path = absolute_path(path);
        let mut unlocked = None;
        match self.locks.acquire(&path, force) {
            Ok(LockOutcome::Held { owner }) => return Ok(OpenOutcome::Locked { owner }),
            Ok(LockOutcome::Overridden { previous }) => {
                self.set_status(format!("Forced open (was locked by pid {})", previous));
            }
            Ok(LockOutcome::Reclaimed { .. } | LockOutcome::Acquired) => {}
            // A registry we cannot read must not keep the file closed
            Err(e) if e.is_unreadable() => {
                tracing::warn!(error = %e, path = %path.display(), "opening without a lock");
                unlocked = Some(e);
            }
            Err(e) => return Err(e.into()),
        }

        let buffer = match LineBuffer::from_file(&path) {
            Ok(buffer) => buffer,
            Err(e) => {
                if unlocked.is_none() {
                    if let Err(release) = self.locks.release(&path) {
                        tracing::warn!(error = %release, "could not release lock");
                    }
                }
                return Err(e);
            }
        };

        self.buffer = buffer;
        self.undo_stack.clear();
        self.modified = false;
        self.col = 0;
        self.viewport.restore(ScrollPosition::default());
        self.jump_marks.clear();
        if let Some(e) = unlocked {
            self.set_error(format!("Opened without locking: {}", e));
        }
        tracing::info!(path = %path.display(), lines = self.buffer.len(), "opened file");

        let restore = self.locations.get(&path);
        self.path = Some(path);
        if let Some(location) = restore {
            let status = self.status.take();
            self.goto_line_and_column(location.line + 1, location.col + 1, true);
            self.status = status;
        }
        self.mark(Redraw::Full);
        Ok(OpenOutcome::Opened)
    }

    /// Write the buffer and remember where the cursor was
    pub fn save(&mut self) -> anyhow::Result<()> {
        let Some(path) = self.path.clone() else {
            anyhow::bail!("No file name");
        };
        self.buffer.compact();
        self.buffer.save(&path)?;
        self.modified = false;

        let cursor = self.cursor();
        if let Err(e) = self.locations.record(&path, cursor.line, cursor.col) {
            tracing::warn!(error = %e, "could not record location");
        }
        self.set_status(format!("\"{}\" written", self.display_name()));
        Ok(())
    }

    /// Release our lock on the current file
    pub fn close(&mut self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        match self.locks.release(path) {
            Ok(true) => tracing::debug!(path = %path.display(), "released lock"),
            Ok(false) => tracing::debug!(path = %path.display(), "lock was not ours"),
            Err(e) => tracing::warn!(error = %e, "could not release lock"),
        }
    }

    /// Remove the lock entry for the current file, whoever holds it
    pub fn unlock(&mut self) {
        let Some(path) = self.path.clone() else {
            self.set_error("No file name");
            return;
        };
        match self.locks.release_any(&path) {
            Ok(true) => self.set_status("Unlocked"),
            Ok(false) => self.set_status("The file was not locked"),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Delete the whole lock registry
    pub fn clear_locks(&mut self) {
        match LockKeeper::clear_all(self.locks.registry()) {
            Ok(true) => self.set_status("Cleared all locks"),
            Ok(false) => self.set_status("There were no locks"),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    // ---- Portal ----

    /// Close the portal if one is open, otherwise open one at the cursor
    pub fn toggle_portal(&mut self) {
        match self.portal.load() {
            Ok(Some(_)) => self.close_portal(),
            Ok(None) => self.open_portal(),
            // Closing removes the broken descriptor
            Err(PortalError::Parse { .. }) => self.close_portal(),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Offer the current line of this file to other sessions
    pub fn open_portal(&mut self) {
        let Some(path) = self.path.clone() else {
            self.set_error("Save the file before opening a portal");
            return;
        };
        if self.modified {
            // Other sessions read the line from disk
            if let Err(e) = self.save() {
                self.set_error(e.to_string());
                return;
            }
        }
        match self.portal.open(&path, self.viewport.line()) {
            Ok(descriptor) => self.set_status(format!("Opened portal at {}", descriptor)),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Close the portal. Opened by another session, its line is pulled in
    /// below the cursor.
    pub fn close_portal(&mut self) {
        match self.portal.close() {
            Ok(None) => self.set_status("No portal is open"),
            Ok(Some(PullOutcome::Cancelled(descriptor))) => {
                self.set_status(format!("Closed portal at {}", descriptor));
            }
            Ok(Some(PullOutcome::NothingToTransfer(descriptor))) => {
                self.set_status(format!("Closed portal, nothing to transfer from {}", descriptor));
            }
            Ok(Some(PullOutcome::Unreadable)) => {
                self.set_status("Closed an unreadable portal");
            }
            Ok(Some(PullOutcome::Transferred { text, from })) => {
                self.edit(|e| {
                    let line = e.viewport.line();
                    e.buffer.insert_after(line, text);
                    e.goto_line(line + 1);
                });
                self.set_status(format!("Pulled line from {}", from));
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    pub fn clear_portal(&mut self) {
        match self.portal.clear() {
            Ok(true) => self.set_status("Closed the portal"),
            Ok(false) => self.set_status("No portal is open"),
            Err(e) => self.set_error(e.to_string()),
        }
    }

    // ---- External commands ----

    /// Queue the configured export for the current file
    pub fn request_export(&mut self) {
        let Some(path) = self.path.clone() else {
            self.set_error("No file name");
            return;
        };
        if self.modified {
            if let Err(e) = self.save() {
                self.set_error(e.to_string());
                return;
            }
        }
        let command = self.settings.export.command_for(&path);
        self.record_last_command(&command);
        self.set_status(format!("Exporting: {}", command));
        self.pending_export = Some(command);
    }

    /// Queue a shell command to run with the terminal suspended
    pub fn request_external_command(&mut self, command: String) {
        self.record_last_command(&command);
        self.pending_external_command = Some(command);
    }

    fn record_last_command(&self, command: &str) {
        if let Err(e) = last_command::record(&self.paths.last_command_file, command) {
            tracing::warn!(error = %e, "could not record last command");
        }
    }
}

/// Byte offset of char index `col`, or the end of `text`
fn byte_index(text: &str, col: usize) -> usize {
    text.char_indices()
        .nth(col)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

fn absolute_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
