use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Line store keyed by logical line index.
///
/// Keys are normally the contiguous range `0..len()`. [`LineBuffer::delete_range`]
/// removes keys without renumbering the lines after them, so a batch of
/// deletions can leave gaps. Call [`LineBuffer::compact`] once the batch is
/// done, before anything that walks indices (rendering, viewport math, saving).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuffer {
    lines: BTreeMap<usize, String>,
}

impl LineBuffer {
    /// Create a buffer holding a single empty line (a new file)
    pub fn new() -> Self {
        let mut lines = BTreeMap::new();
        lines.insert(0, String::new());
        Self { lines }
    }

    /// Build a buffer from file contents, one entry per line.
    /// A trailing newline does not produce an extra empty line.
    pub fn from_text(text: &str) -> Self {
        let mut lines = BTreeMap::new();
        for (idx, line) in text.lines().enumerate() {
            lines.insert(idx, line.strip_suffix('\r').unwrap_or(line).to_string());
        }
        if lines.is_empty() {
            lines.insert(0, String::new());
        }
        Self { lines }
    }

    /// Load a buffer from disk. A missing file gives an empty buffer.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(&text))
    }

    /// Get a line. Absent keys (past the end, or a gap mid-batch) are `None`.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.lines.get(&idx).map(String::as_str)
    }

    /// Replace the text of an existing line. Returns false if there is no such line.
    pub fn set(&mut self, idx: usize, text: impl Into<String>) -> bool {
        match self.lines.get_mut(&idx) {
            Some(line) => {
                *line = text.into();
                true
            }
            None => false,
        }
    }

    /// Insert a new line so that it ends up at `idx`, shifting later lines down by one
    pub fn insert_at(&mut self, idx: usize, text: impl Into<String>) {
        let tail = self.lines.split_off(&idx);
        self.lines.extend(tail.into_iter().map(|(k, v)| (k + 1, v)));
        self.lines.insert(idx, text.into());
    }

    /// Insert a new line directly after `idx`. On an empty buffer the line becomes line 0.
    pub fn insert_after(&mut self, idx: usize, text: impl Into<String>) {
        if self.lines.is_empty() {
            self.lines.insert(0, text.into());
        } else {
            self.insert_at(idx + 1, text);
        }
    }

    /// Remove the lines `from..=to` without renumbering the lines after them.
    ///
    /// Costs O(k log n) for k removed keys. Leaves a gap unless the range
    /// reaches the end of the buffer; call [`LineBuffer::compact`] afterwards.
    pub fn delete_range(&mut self, from: usize, to: usize) -> usize {
        if to < from {
            return 0;
        }
        // Only visit keys that exist, so "delete to usize::MAX" stays cheap
        let doomed: Vec<usize> = self.lines.range(from..=to).map(|(k, _)| *k).collect();
        for key in &doomed {
            self.lines.remove(key);
        }
        doomed.len()
    }

    /// Number of lines currently stored
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the keys are exactly `0..len()`
    pub fn is_contiguous(&self) -> bool {
        match self.lines.last_key_value() {
            Some((last, _)) => *last + 1 == self.lines.len(),
            None => true,
        }
    }

    /// Renumber the remaining lines to `0..len()`, keeping their order
    pub fn compact(&mut self) {
        if self.is_contiguous() {
            return;
        }
        let old = std::mem::take(&mut self.lines);
        self.lines = old.into_values().enumerate().collect();
    }

    /// Iterate lines in logical order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.values().map(String::as_str)
    }

    /// Number of chars in a line (0 for missing lines)
    pub fn line_len(&self, idx: usize) -> usize {
        self.get(idx).map(|l| l.chars().count()).unwrap_or(0)
    }

    /// Write the buffer to disk with a trailing newline
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let mut text = self.to_string();
        text.push('\n');
        std::fs::write(path, text)?;
        Ok(())
    }
}

impl fmt::Display for LineBuffer {
    /// The full text, lines joined by `\n` without a trailing newline
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.values().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}
