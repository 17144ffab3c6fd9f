//! Location history - remembers where the cursor was when a file was last saved

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Entries kept before the oldest are evicted
pub const MAX_ENTRIES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 0-indexed line
    pub line: usize,
    /// 0-indexed char column
    pub col: usize,
    /// Unix timestamp of the save that recorded it
    pub saved_at: u64,
}

#[derive(Debug, Default)]
pub struct LocationHistory {
    file: PathBuf,
    entries: HashMap<PathBuf, Location>,
}

impl LocationHistory {
    /// Load the history file. Missing or unreadable files give an empty history.
    pub fn load(file: impl Into<PathBuf>) -> Self {
        let file = file.into();
        let entries = match fs::read_to_string(&file) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(file = %file.display(), error = %e, "ignoring corrupt location history");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self { file, entries }
    }

    pub fn get(&self, path: &Path) -> Option<Location> {
        self.entries.get(path).copied()
    }

    /// Record a location and write the whole history back
    pub fn record(&mut self, path: &Path, line: usize, col: usize) -> anyhow::Result<()> {
        // Pick up entries written by other sessions since we loaded
        let mut fresh = Self::load(self.file.clone());
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        fresh.entries.insert(path.to_path_buf(), Location { line, col, saved_at });
        fresh.prune();
        fresh.save()?;
        *self = fresh;
        Ok(())
    }

    fn prune(&mut self) {
        while self.entries.len() > MAX_ENTRIES {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, loc)| loc.saved_at)
                .map(|(path, _)| path.clone());
            match oldest {
                Some(path) => {
                    self.entries.remove(&path);
                }
                None => break,
            }
        }
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.file, json)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("locations.json");
        let mut history = LocationHistory::load(&file);
        assert!(history.is_empty());

        history.record(Path::new("/a.txt"), 12, 3).unwrap();
        let reloaded = LocationHistory::load(&file);
        let loc = reloaded.get(Path::new("/a.txt")).unwrap();
        assert_eq!((loc.line, loc.col), (12, 3));
        assert_eq!(reloaded.get(Path::new("/b.txt")), None);
    }

    #[test]
    fn test_record_merges_other_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("locations.json");
        let mut one = LocationHistory::load(&file);
        let mut two = LocationHistory::load(&file);

        one.record(Path::new("/a"), 1, 0).unwrap();
        two.record(Path::new("/b"), 2, 0).unwrap();

        let merged = LocationHistory::load(&file);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("locations.json");
        fs::write(&file, "garbage").unwrap();
        assert!(LocationHistory::load(&file).is_empty());
    }

    #[test]
    fn test_prune_evicts_oldest() {
        let mut history = LocationHistory::default();
        for i in 0..(MAX_ENTRIES + 2) {
            history.entries.insert(
                PathBuf::from(format!("/f{}", i)),
                Location {
                    line: 0,
                    col: 0,
                    saved_at: i as u64,
                },
            );
        }
        history.prune();
        assert_eq!(history.len(), MAX_ENTRIES);
        assert!(history.get(Path::new("/f0")).is_none());
        assert!(history.get(Path::new("/f1")).is_none());
        assert!(history.get(Path::new("/f2")).is_some());
    }
}
