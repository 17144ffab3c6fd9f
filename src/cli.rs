use clap::Parser;
use regex::Regex;
use std::path::PathBuf;

/// Terminal editor whose sessions coordinate through the filesystem
#[derive(Parser, Debug)]
#[command(name = "hatch", version, about)]
pub struct Cli {
    /// File to edit, optionally written as FILE:LINE or FILE:LINE:COL
    pub file: Option<String>,

    /// Line number to jump to (1-based, "+N" also accepted)
    pub line: Option<String>,

    /// Column number to jump to (1-based)
    pub col: Option<usize>,

    /// Open even if another session has the file open
    #[arg(short, long)]
    pub force: bool,

    /// Clear all file locks and close the portal, then exit
    #[arg(short = 'r', long)]
    pub clear_locks: bool,

    /// Print the last build or export command, then exit
    #[arg(short, long)]
    pub last_command: bool,
}

/// File to open and where to put the cursor (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub col: Option<usize>,
}

impl Cli {
    pub fn target(&self) -> Option<Target> {
        let file = self.file.as_deref()?;
        let mut target = split_location(file);
        if let Some(line) = self.line.as_deref().and_then(parse_line) {
            target.line = Some(line);
        }
        if self.col.is_some() {
            target.col = self.col;
        }
        Some(target)
    }
}

fn parse_line(arg: &str) -> Option<usize> {
    arg.trim_start_matches('+').parse().ok()
}

/// Split `FILE:LINE[:COL]`, unless a file with the literal name exists
pub fn split_location(arg: &str) -> Target {
    let literal = Target {
        path: PathBuf::from(arg),
        line: None,
        col: None,
    };
    if literal.path.exists() {
        return literal;
    }
    let Ok(re) = Regex::new(r"^(.+?):(\d+)(?::(\d+))?:?$") else {
        return literal;
    };
    let Some(caps) = re.captures(arg) else {
        return literal;
    };
    Target {
        path: PathBuf::from(&caps[1]),
        line: caps[2].parse().ok(),
        col: caps.get(3).and_then(|m| m.as_str().parse().ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_location() {
        let t = split_location("/no/such/src/main.rs:42:7");
        assert_eq!(t.path, PathBuf::from("/no/such/src/main.rs"));
        assert_eq!((t.line, t.col), (Some(42), Some(7)));

        let t = split_location("/no/such/notes.md:3");
        assert_eq!((t.line, t.col), (Some(3), None));

        let t = split_location("/no/such/plain.txt");
        assert_eq!((t.line, t.col), (None, None));
    }

    #[test]
    fn test_existing_file_with_colon_is_literal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd:12");
        std::fs::write(&path, "").unwrap();
        let t = split_location(path.to_str().unwrap());
        assert_eq!(t.path, path);
        assert_eq!(t.line, None);
    }

    #[test]
    fn test_flags_and_positional_line() {
        let cli = Cli::parse_from(["hatch", "-f", "/no/such/a.txt", "+12", "4"]);
        assert!(cli.force);
        let t = cli.target().unwrap();
        assert_eq!((t.line, t.col), (Some(12), Some(4)));

        let cli = Cli::parse_from(["hatch", "--clear-locks"]);
        assert!(cli.clear_locks);
        assert!(cli.target().is_none());
    }
}
