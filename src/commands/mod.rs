/// Action on the portal named by `:portal [open|close|clear]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalAction {
    /// Close if one is open, otherwise open
    Toggle,
    Open,
    Close,
    Clear,
}

/// Parsed command from command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// :w - Write buffer to file
    Write,
    /// :q - Quit (fails if unsaved changes)
    Quit,
    /// :q! - Force quit (discard changes)
    ForceQuit,
    /// :wq - Write and quit
    WriteQuit,
    /// :[number] - Go to line number
    GotoLine(usize),
    /// :[line]:[col] - Go to line and column
    GotoLineColumn(usize, usize),
    /// :portal [open|close|clear]
    Portal(PortalAction),
    /// :unlock - Remove the lock entry for this file
    Unlock,
    /// :clearlocks - Delete the whole lock registry
    ClearLocks,
    /// :delrest - Delete from the cursor line to the end of the file
    DeleteRest,
    /// :clearmarks - Forget every jump mark
    ClearMarks,
    Undo,
    Redo,
    /// :export - Run the configured export command in the background
    Export,
    /// :! command - Run shell command
    Shell(String),
    /// Unknown command
    Unknown(String),
}

/// Parse a command string into a Command
pub fn parse_command(input: &str) -> Command {
    let input = input.trim();

    if input.is_empty() {
        return Command::Unknown(String::new());
    }

    // Handle shell command :!command
    if let Some(shell_cmd) = input.strip_prefix('!') {
        return Command::Shell(shell_cmd.trim().to_string());
    }

    if let Ok(line_num) = input.parse::<usize>() {
        return Command::GotoLine(line_num);
    }

    if let Some((line, col)) = input.split_once(':') {
        if let (Ok(line), Ok(col)) = (line.parse::<usize>(), col.parse::<usize>()) {
            return Command::GotoLineColumn(line, col);
        }
    }

    let mut parts = input.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("");
    let args = parts.next().map(str::trim).unwrap_or("");

    match cmd {
        "w" | "write" => Command::Write,
        "q" | "quit" => Command::Quit,
        "q!" | "quit!" => Command::ForceQuit,
        "wq" | "x" => Command::WriteQuit,

        "portal" | "p" => match args {
            "" => Command::Portal(PortalAction::Toggle),
            "open" => Command::Portal(PortalAction::Open),
            "close" => Command::Portal(PortalAction::Close),
            "clear" => Command::Portal(PortalAction::Clear),
            other => Command::Unknown(format!("portal {}", other)),
        },

        "unlock" => Command::Unlock,
        "clearlocks" => Command::ClearLocks,
        "delrest" => Command::DeleteRest,
        "clearmarks" => Command::ClearMarks,
        "u" | "undo" => Command::Undo,
        "redo" => Command::Redo,
        "export" => Command::Export,

        _ => Command::Unknown(cmd.to_string()),
    }
}

/// Command line state
#[derive(Debug, Clone, Default)]
pub struct CommandLine {
    /// The current input buffer
    pub input: String,
    /// Cursor position in the input, in chars
    pub cursor: usize,
    /// Command history
    pub history: Vec<String>,
    /// Current position in history (for up/down navigation)
    pub history_index: Option<usize>,
    /// Saved input when browsing history
    pub saved_input: Option<String>,
}

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the command line, keeping history
    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor = 0;
        self.history_index = None;
        self.saved_input = None;
    }

    fn byte_pos(&self, cursor: usize) -> usize {
        self.input
            .char_indices()
            .nth(cursor)
            .map(|(idx, _)| idx)
            .unwrap_or(self.input.len())
    }

    fn char_len(&self) -> usize {
        self.input.chars().count()
    }

    pub fn insert_char(&mut self, ch: char) {
        let at = self.byte_pos(self.cursor);
        self.input.insert(at, ch);
        self.cursor += 1;
    }

    /// Backspace
    pub fn delete_char_before(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let at = self.byte_pos(self.cursor);
            self.input.remove(at);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_len());
    }

    /// Navigate to previous history entry
    pub fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }

        match self.history_index {
            None => {
                self.saved_input = Some(self.input.clone());
                self.history_index = Some(self.history.len() - 1);
                self.input = self.history[self.history.len() - 1].clone();
            }
            Some(idx) if idx > 0 => {
                self.history_index = Some(idx - 1);
                self.input = self.history[idx - 1].clone();
            }
            _ => {}
        }
        self.cursor = self.char_len();
    }

    /// Navigate to next history entry
    pub fn history_next(&mut self) {
        let Some(idx) = self.history_index else {
            return;
        };
        if idx + 1 < self.history.len() {
            self.history_index = Some(idx + 1);
            self.input = self.history[idx + 1].clone();
        } else {
            self.history_index = None;
            if let Some(saved) = self.saved_input.take() {
                self.input = saved;
            }
        }
        self.cursor = self.char_len();
    }

    /// Add current input to history and parse it
    pub fn execute(&mut self) -> Command {
        let input = self.input.trim().to_string();

        if !input.is_empty() && self.history.last() != Some(&input) {
            self.history.push(input.clone());
        }

        let cmd = parse_command(&input);
        self.clear();
        cmd
    }

    /// Get display string (with ':' prefix)
    pub fn display(&self) -> String {
        format!(":{}", self.input)
    }
}
