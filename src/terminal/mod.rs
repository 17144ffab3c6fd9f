mod resize;

pub use resize::{ResizeWatcher, Size};

use crossterm::{
    cursor,
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    terminal::{self, ClearType},
};
use std::io::{self, Stdout, Write};
use unicode_width::UnicodeWidthChar;

use crate::commands::{Command, PortalAction};
use crate::editor::{expand_tabs, Editor, Mode, Redraw};

/// Terminal handler responsible for rendering
pub struct Terminal {
    stdout: Stdout,
}

impl Terminal {
    pub fn new() -> anyhow::Result<Self> {
        let mut stdout = io::stdout();

        terminal::enable_raw_mode()?;
        execute!(stdout, terminal::EnterAlternateScreen, cursor::Hide)?;

        Ok(Self { stdout })
    }

    /// Get terminal size
    pub fn size() -> anyhow::Result<Size> {
        let (width, height) = terminal::size()?;
        Ok(Size::new(width, height))
    }

    /// Run a shell command with the editor suspended.
    /// The terminal is restored before running and re-initialized after.
    pub fn run_external_process(&mut self, command: &str) -> anyhow::Result<()> {
        execute!(self.stdout, cursor::Show, terminal::LeaveAlternateScreen)?;
        self.stdout.flush()?;
        terminal::disable_raw_mode()?;

        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status();

        if status.is_ok() {
            // Let the user read the output before the editor repaints
            print!("\r\nPress Enter to return to the editor");
            self.stdout.flush()?;
            let mut line = String::new();
            let _ = io::stdin().read_line(&mut line);
        }

        terminal::enable_raw_mode()?;
        execute!(self.stdout, terminal::EnterAlternateScreen, cursor::Hide)?;

        match status {
            Ok(exit) if exit.success() => Ok(()),
            Ok(exit) => Err(anyhow::anyhow!("'{}' exited with {}", command, exit)),
            Err(e) => Err(anyhow::anyhow!("Failed to run command '{}': {}", command, e)),
        }
    }

    /// Paint whatever the editor asked to have repainted.
    ///
    /// A full redraw repaints every text row; a cursor redraw only touches
    /// the status and message lines and moves the cursor.
    pub fn render(&mut self, editor: &mut Editor, size: &Size) -> anyhow::Result<()> {
        let redraw = editor.take_redraw();
        if redraw == Redraw::None {
            return Ok(());
        }

        let width = size.width as usize;
        let text_rows = editor.viewport.height();
        queue!(self.stdout, cursor::Hide)?;

        if redraw == Redraw::Full {
            self.render_text(editor, width, text_rows)?;
        }
        self.render_status(editor, width, text_rows)?;
        self.render_message(editor, width, text_rows + 1)?;

        let (x, y) = match editor.mode {
            Mode::Command => (editor.command_line.cursor + 1, text_rows + 1),
            _ => (editor.viewport.screen_x(), editor.viewport.screen_y()),
        };
        queue!(
            self.stdout,
            cursor::MoveTo(x.min(width.saturating_sub(1)) as u16, y as u16),
            cursor::Show
        )?;
        self.stdout.flush()?;
        Ok(())
    }

    fn render_text(&mut self, editor: &Editor, width: usize, text_rows: usize) -> anyhow::Result<()> {
        let visible = editor.viewport.visible_range(editor.buffer.len());
        let tab_width = editor.viewport.tab_width();

        for row in 0..text_rows {
            queue!(
                self.stdout,
                cursor::MoveTo(0, row as u16),
                terminal::Clear(ClearType::CurrentLine)
            )?;
            let line = visible.start + row;
            match editor.buffer.get(line).filter(|_| line < visible.end) {
                Some(text) => {
                    let shown = fit_width(&expand_tabs(text, tab_width), width);
                    queue!(self.stdout, Print(shown))?;
                }
                None => {
                    queue!(
                        self.stdout,
                        SetForegroundColor(Color::DarkGrey),
                        Print("~"),
                        ResetColor
                    )?;
                }
            }
        }
        Ok(())
    }

    fn render_status(&mut self, editor: &Editor, width: usize, row: usize) -> anyhow::Result<()> {
        let modified = if editor.modified { " [+]" } else { "" };
        let left = format!(" {}  {}{}", editor.mode.as_str(), editor.display_name(), modified);
        let right = format!("{} ", editor.cursor().display());
        let gap = width.saturating_sub(left.chars().count() + right.chars().count());
        let bar = fit_width(&format!("{}{}{}", left, " ".repeat(gap), right), width);

        queue!(
            self.stdout,
            cursor::MoveTo(0, row as u16),
            terminal::Clear(ClearType::CurrentLine),
            SetAttribute(Attribute::Reverse),
            Print(bar),
            SetAttribute(Attribute::Reset)
        )?;
        Ok(())
    }

    fn render_message(&mut self, editor: &Editor, width: usize, row: usize) -> anyhow::Result<()> {
        queue!(
            self.stdout,
            cursor::MoveTo(0, row as u16),
            terminal::Clear(ClearType::CurrentLine)
        )?;
        if editor.mode == Mode::Command {
            queue!(self.stdout, Print(fit_width(&editor.command_line.display(), width)))?;
        } else if let Some(status) = &editor.status {
            let color = if status.is_error { Color::Red } else { Color::Reset };
            queue!(
                self.stdout,
                SetForegroundColor(color),
                Print(fit_width(&status.text, width)),
                ResetColor
            )?;
        }
        Ok(())
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        // Restore terminal state
        let _ = execute!(self.stdout, cursor::Show, terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// Cut `text` to at most `width` display columns
fn fit_width(text: &str, width: usize) -> String {
    let mut used = 0;
    text.chars()
        .take_while(|ch| {
            used += ch.width().unwrap_or(0);
            used <= width
        })
        .collect()
}

/// Handle a key event and update editor state
pub fn handle_key(editor: &mut Editor, key: KeyEvent) {
    if editor.mode != Mode::Command && editor.pending_key.is_none() {
        editor.clear_status();
    }

    match editor.mode {
        Mode::Normal => handle_normal_mode(editor, key),
        Mode::Insert => handle_insert_mode(editor, key),
        Mode::Command => handle_command_mode(editor, key),
    }
}

fn handle_normal_mode(editor: &mut Editor, key: KeyEvent) {
    if let Some(first) = editor.pending_key.take() {
        match (first, key.code) {
            ('g', KeyCode::Char('g')) => editor.goto_first_line(),
            ('d', KeyCode::Char('d')) => editor.delete_line(),
            ('m', KeyCode::Char(c)) => {
                if !editor.register_jump_mark(c) {
                    editor.set_error(format!("Cannot use {:?} as a jump mark", c));
                }
            }
            ('\'', KeyCode::Char(c)) => {
                if !editor.jump_to_mark(c) {
                    editor.set_error(format!("No jump mark {:?}", c));
                }
            }
            _ => {}
        }
        return;
    }

    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('d')) => editor.half_page_down(),
        (KeyModifiers::CONTROL, KeyCode::Char('u')) => editor.half_page_up(),
        (KeyModifiers::CONTROL, KeyCode::Char('r')) => {
            if !editor.redo() {
                editor.set_status("Already at newest change");
            }
        }
        (KeyModifiers::CONTROL, KeyCode::Char('o')) => editor.enter_command_mode(),

        (_, KeyCode::Char('h')) | (_, KeyCode::Left) => editor.move_left(),
        (_, KeyCode::Char('j')) | (_, KeyCode::Down) => editor.move_down(),
        (_, KeyCode::Char('k')) | (_, KeyCode::Up) => editor.move_up(),
        (_, KeyCode::Char('l')) | (_, KeyCode::Right) => editor.move_right(),
        (_, KeyCode::Char('0')) | (_, KeyCode::Home) => editor.move_to_line_start(),
        (_, KeyCode::Char('$')) | (_, KeyCode::End) => editor.move_to_line_end(),
        (_, KeyCode::PageDown) => editor.half_page_down(),
        (_, KeyCode::PageUp) => editor.half_page_up(),
        (_, KeyCode::Char('G')) => editor.goto_last_line(),
        (_, KeyCode::Char(c @ ('g' | 'd' | 'm' | '\''))) => editor.pending_key = Some(c),

        (_, KeyCode::Char('i')) => editor.enter_insert_mode(),
        (_, KeyCode::Char('a')) => editor.append(),
        (_, KeyCode::Char('o')) => editor.open_line_below(),
        (_, KeyCode::Char('O')) => editor.open_line_above(),
        (_, KeyCode::Char('x')) | (_, KeyCode::Delete) => editor.delete_char(),
        (_, KeyCode::Char('D')) => editor.delete_rest_of_file(),
        (_, KeyCode::Char('u')) => {
            if !editor.undo() {
                editor.set_status("Already at oldest change");
            }
        }
        (_, KeyCode::Char(':')) => editor.enter_command_mode(),
        _ => {}
    }
}

fn handle_insert_mode(editor: &mut Editor, key: KeyEvent) {
    match (key.modifiers, key.code) {
        (_, KeyCode::Esc) | (KeyModifiers::CONTROL, KeyCode::Char('[')) => {
            editor.leave_insert_mode();
        }
        (_, KeyCode::Enter) => editor.insert_newline(),
        (_, KeyCode::Backspace) => editor.backspace(),
        (_, KeyCode::Delete) => editor.delete_char(),
        (_, KeyCode::Tab) => editor.insert_char('\t'),
        (_, KeyCode::Left) => editor.move_left(),
        (_, KeyCode::Right) => editor.move_right(),
        (_, KeyCode::Up) => editor.move_up(),
        (_, KeyCode::Down) => editor.move_down(),
        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => editor.insert_char(c),
        _ => {}
    }
}

fn handle_command_mode(editor: &mut Editor, key: KeyEvent) {
    match (key.modifiers, key.code) {
        // Cancel command
        (KeyModifiers::NONE, KeyCode::Esc)
        | (KeyModifiers::CONTROL, KeyCode::Char('['))
        | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
            editor.cancel_command();
        }

        (KeyModifiers::NONE, KeyCode::Enter) => {
            let cmd = editor.command_line.execute();
            editor.mode = Mode::Normal;
            execute_command(editor, cmd);
        }

        (KeyModifiers::NONE, KeyCode::Backspace) => {
            if editor.command_line.input.is_empty() {
                editor.cancel_command();
            } else {
                editor.command_line.delete_char_before();
            }
        }

        (KeyModifiers::NONE, KeyCode::Left) => editor.command_line.move_left(),
        (KeyModifiers::NONE, KeyCode::Right) => editor.command_line.move_right(),
        (KeyModifiers::NONE, KeyCode::Up) => editor.command_line.history_prev(),
        (KeyModifiers::NONE, KeyCode::Down) => editor.command_line.history_next(),

        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(c)) => {
            editor.command_line.insert_char(c);
        }

        _ => {}
    }
    editor.invalidate_status_line();
}

/// Result of executing a command
#[derive(Debug)]
pub enum CommandResult {
    /// Command executed successfully
    Ok,
    /// Command executed with a message to display
    Message(String),
    /// Command failed with an error
    Error(String),
    /// Quit the editor
    Quit,
}

/// Execute a parsed command
pub fn execute_command(editor: &mut Editor, cmd: Command) {
    let result = match cmd {
        Command::Write => match editor.save() {
            Ok(()) => CommandResult::Ok,
            Err(e) => CommandResult::Error(format!("Error saving: {}", e)),
        },

        Command::Quit => {
            if editor.modified {
                CommandResult::Error("No write since last change (add ! to override)".to_string())
            } else {
                CommandResult::Quit
            }
        }

        Command::ForceQuit => CommandResult::Quit,

        Command::WriteQuit => match editor.save() {
            Ok(()) => CommandResult::Quit,
            Err(e) => CommandResult::Error(format!("Error saving: {}", e)),
        },

        Command::GotoLine(line) => {
            editor.goto_line_number(line, true);
            CommandResult::Ok
        }

        Command::GotoLineColumn(line, col) => {
            editor.goto_line_and_column(line, col, true);
            CommandResult::Ok
        }

        Command::ClearMarks => {
            editor.clear_jump_marks();
            CommandResult::Message("Cleared jump marks".to_string())
        }

        Command::Portal(action) => {
            match action {
                PortalAction::Toggle => editor.toggle_portal(),
                PortalAction::Open => editor.open_portal(),
                PortalAction::Close => editor.close_portal(),
                PortalAction::Clear => editor.clear_portal(),
            }
            CommandResult::Ok
        }

        Command::Unlock => {
            editor.unlock();
            CommandResult::Ok
        }

        Command::ClearLocks => {
            editor.clear_locks();
            CommandResult::Ok
        }

        Command::DeleteRest => {
            editor.delete_rest_of_file();
            CommandResult::Ok
        }

        Command::Undo => {
            if editor.undo() {
                CommandResult::Ok
            } else {
                CommandResult::Message("Already at oldest change".to_string())
            }
        }

        Command::Redo => {
            if editor.redo() {
                CommandResult::Ok
            } else {
                CommandResult::Message("Already at newest change".to_string())
            }
        }

        Command::Export => {
            editor.request_export();
            CommandResult::Ok
        }

        Command::Shell(cmd) => {
            if cmd.is_empty() {
                CommandResult::Error("Missing shell command".to_string())
            } else {
                editor.request_external_command(cmd);
                CommandResult::Ok
            }
        }

        Command::Unknown(cmd) => {
            if cmd.is_empty() {
                CommandResult::Ok
            } else {
                CommandResult::Error(format!("Not an editor command: {}", cmd))
            }
        }
    };

    match result {
        CommandResult::Ok => {}
        CommandResult::Message(msg) => editor.set_status(msg),
        CommandResult::Error(msg) => editor.set_error(msg),
        CommandResult::Quit => editor.should_quit = true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Paths, Settings};
    use crate::editor::{Cursor, LineBuffer};
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..key(KeyCode::Char(c))
        }
    }

    fn type_keys(editor: &mut Editor, keys: &str) {
        for c in keys.chars() {
            handle_key(editor, key(KeyCode::Char(c)));
        }
    }

    fn editor_with(dir: &std::path::Path, text: &str) -> Editor {
        let mut editor = Editor::new(Settings::default(), Paths::in_dir(dir));
        editor.buffer = LineBuffer::from_text(text);
        editor
    }

    #[test]
    fn test_fit_width() {
        assert_eq!(fit_width("hello", 3), "hel");
        assert_eq!(fit_width("日本語", 5), "日本");
        assert_eq!(fit_width("hi", 10), "hi");
    }

    #[test]
    fn test_normal_mode_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with(dir.path(), "a\nb\nc\nd");
        type_keys(&mut editor, "G");
        assert_eq!(editor.cursor().line, 3);
        type_keys(&mut editor, "gg");
        assert_eq!(editor.cursor().line, 0);
        type_keys(&mut editor, "jdd");
        assert_eq!(editor.buffer.iter().collect::<Vec<_>>(), ["a", "c", "d"]);
        type_keys(&mut editor, "u");
        assert_eq!(editor.buffer.len(), 4);
        handle_key(&mut editor, ctrl('r'));
        assert_eq!(editor.buffer.len(), 3);
    }

    #[test]
    fn test_insert_then_escape() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with(dir.path(), "");
        type_keys(&mut editor, "ihi");
        handle_key(&mut editor, key(KeyCode::Esc));
        assert_eq!(editor.mode, Mode::Normal);
        assert_eq!(editor.buffer.get(0), Some("hi"));
        assert_eq!(editor.cursor(), Cursor::new(0, 1));
    }

    #[test]
    fn test_command_line_goto_and_quit() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with(dir.path(), "a\nb\nc");
        type_keys(&mut editor, ":3");
        handle_key(&mut editor, key(KeyCode::Enter));
        assert_eq!(editor.cursor().line, 2);
        assert_eq!(editor.mode, Mode::Normal);

        type_keys(&mut editor, "x:q");
        handle_key(&mut editor, key(KeyCode::Enter));
        assert!(!editor.should_quit);
        assert!(editor.status.as_ref().unwrap().is_error);

        type_keys(&mut editor, ":q!");
        handle_key(&mut editor, key(KeyCode::Enter));
        assert!(editor.should_quit);
    }

    #[test]
    fn test_jump_mark_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with(dir.path(), "a\nb\nc\nd");
        type_keys(&mut editor, "jjmqgg");
        assert_eq!(editor.cursor().line, 0);
        type_keys(&mut editor, "'q");
        assert_eq!(editor.cursor().line, 2);

        type_keys(&mut editor, "m5");
        assert!(editor.status.as_ref().unwrap().is_error);
        type_keys(&mut editor, "'z");
        assert!(editor.status.as_ref().unwrap().is_error);
        assert_eq!(editor.cursor().line, 2);

        type_keys(&mut editor, ":clearmarks");
        handle_key(&mut editor, key(KeyCode::Enter));
        assert!(!editor.has_jump_mark('q'));
    }

    #[test]
    fn test_dd_on_empty_buffer_still_quits() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with(dir.path(), "");
        type_keys(&mut editor, "dd:q");
        handle_key(&mut editor, key(KeyCode::Enter));
        assert!(editor.should_quit);
    }

    #[test]
    fn test_escape_cancels_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with(dir.path(), "a");
        type_keys(&mut editor, ":q!");
        handle_key(&mut editor, key(KeyCode::Esc));
        assert!(!editor.should_quit);
        assert_eq!(editor.mode, Mode::Normal);
    }

    #[test]
    fn test_shell_command_is_queued() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with(dir.path(), "a");
        execute_command(&mut editor, Command::Shell("make".to_string()));
        assert_eq!(editor.pending_external_command.as_deref(), Some("make"));
        assert_eq!(
            crate::last_command::read(&editor.paths().last_command_file).unwrap(),
            Some("make".to_string())
        );
    }
}
