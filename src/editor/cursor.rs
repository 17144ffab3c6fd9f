/// Logical cursor position in the buffer (0-indexed)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    /// Line number (0-indexed)
    pub line: usize,
    /// Column as a char index into the line (0-indexed)
    pub col: usize,
}

impl Cursor {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }

    /// 1-based "line:col" form used in the status line
    pub fn display(&self) -> String {
        format!("{}:{}", self.line + 1, self.col + 1)
    }
}
