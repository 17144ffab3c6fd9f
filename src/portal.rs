//! Portal - a single-slot mailbox for handing one line to another session
//!
//! One session opens the portal at its current file and line. Any other
//! session can later close it, which copies that line (read fresh from disk)
//! into its own buffer. Closing from the session that opened it just cancels.
//! Only one portal exists per machine; opening a second one is refused.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::lock::write_replace;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("could not access portal {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("portal {} is unreadable: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode portal {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("close the existing portal at {0} first")]
    AlreadyOpen(PortalDescriptor),
}

/// Where the portal points: an absolute path and a 0-indexed line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalDescriptor {
    pub path: PathBuf,
    pub line: usize,
    /// Session that opened the portal
    pub pid: u32,
}

impl fmt::Display for PortalDescriptor {
    /// `<path>:<line+1>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path.display(), self.line + 1)
    }
}

/// What closing the portal did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Another session's line, ready to be inserted
    Transferred { text: String, from: PortalDescriptor },
    /// We opened it ourselves, so closing only cancels
    Cancelled(PortalDescriptor),
    /// The file or line is gone; the portal was closed anyway
    NothingToTransfer(PortalDescriptor),
    /// The descriptor could not be decoded; it was removed
    Unreadable,
}

pub struct Portal {
    file: PathBuf,
    owner: u32,
}

impl Portal {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self::with_owner(file, std::process::id())
    }

    pub fn with_owner(file: impl Into<PathBuf>, owner: u32) -> Self {
        Self {
            file: file.into(),
            owner,
        }
    }

    /// Read the current descriptor, if a portal is open
    pub fn load(&self) -> Result<Option<PortalDescriptor>, PortalError> {
        let content = match fs::read_to_string(&self.file) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| PortalError::Parse {
                path: self.file.clone(),
                source,
            })
    }

    /// Open a portal at `path:line`. Refused while another portal is open.
    /// An undecodable descriptor does not count as open and is overwritten.
    pub fn open(&self, path: &Path, line: usize) -> Result<PortalDescriptor, PortalError> {
        match self.load() {
            Ok(Some(existing)) => return Err(PortalError::AlreadyOpen(existing)),
            Ok(None) => {}
            Err(PortalError::Parse { source, .. }) => {
                tracing::warn!(error = %source, "replacing unreadable portal");
            }
            Err(e) => return Err(e),
        }
        let descriptor = PortalDescriptor {
            path: path.to_path_buf(),
            line,
            pid: self.owner,
        };
        if let Some(dir) = self.file.parent() {
            fs::create_dir_all(dir).map_err(|source| self.io_error(source))?;
        }
        let json =
            serde_json::to_string_pretty(&descriptor).map_err(|source| PortalError::Serialize {
                path: self.file.clone(),
                source,
            })?;
        write_replace(&self.file, json.as_bytes()).map_err(|source| self.io_error(source))?;
        tracing::info!(portal = %descriptor, "opened portal");
        Ok(descriptor)
    }

    /// Close the portal. Returns `None` when no portal was open.
    ///
    /// The descriptor is always removed. When another session opened it, the
    /// referenced line is read from disk (the opener may have saved changes
    /// since) and handed back for insertion.
    pub fn close(&self) -> Result<Option<PullOutcome>, PortalError> {
        let descriptor = match self.load() {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => return Ok(None),
            Err(PortalError::Parse { source, .. }) => {
                self.remove()?;
                tracing::info!(error = %source, "removed unreadable portal");
                return Ok(Some(PullOutcome::Unreadable));
            }
            Err(e) => return Err(e),
        };
        self.remove()?;

        if descriptor.pid == self.owner {
            tracing::debug!(portal = %descriptor, "cancelled own portal");
            return Ok(Some(PullOutcome::Cancelled(descriptor)));
        }

        match read_line(&descriptor.path, descriptor.line) {
            Some(text) => {
                tracing::info!(portal = %descriptor, "pulled line through portal");
                Ok(Some(PullOutcome::Transferred {
                    text,
                    from: descriptor,
                }))
            }
            None => {
                tracing::info!(portal = %descriptor, "portal target is gone");
                Ok(Some(PullOutcome::NothingToTransfer(descriptor)))
            }
        }
    }

    /// Remove the descriptor unconditionally. Returns false if none existed.
    pub fn clear(&self) -> Result<bool, PortalError> {
        match fs::remove_file(&self.file) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn remove(&self) -> Result<(), PortalError> {
        self.clear().map(|_| ())
    }

    fn io_error(&self, source: io::Error) -> PortalError {
        PortalError::Io {
            path: self.file.clone(),
            source,
        }
    }
}

/// Line `idx` of the file on disk, if both still exist
fn read_line(path: &Path, idx: usize) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().nth(idx).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.txt");
        fs::write(&source, "zero\none\ntwo\n").unwrap();
        (dir, source)
    }

    #[test]
    fn test_second_open_leaves_first_descriptor() {
        let (dir, source) = setup();
        let portal_file = dir.path().join("portal.json");
        let a = Portal::with_owner(&portal_file, 1);
        let b = Portal::with_owner(&portal_file, 2);

        let first = a.open(&source, 1).unwrap();
        match b.open(&source, 2) {
            Err(PortalError::AlreadyOpen(existing)) => assert_eq!(existing, first),
            other => panic!("expected AlreadyOpen, got {:?}", other),
        }
        assert_eq!(b.load().unwrap(), Some(first));
    }

    #[test]
    fn test_close_from_other_session_pulls_fresh_line() {
        let (dir, source) = setup();
        let portal_file = dir.path().join("portal.json");
        Portal::with_owner(&portal_file, 1).open(&source, 1).unwrap();

        // The opener saved a change after opening the portal
        fs::write(&source, "zero\nONE\ntwo\n").unwrap();

        let outcome = Portal::with_owner(&portal_file, 2).close().unwrap();
        match outcome {
            Some(PullOutcome::Transferred { text, from }) => {
                assert_eq!(text, "ONE");
                assert_eq!(from.line, 1);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!portal_file.exists());
    }

    #[test]
    fn test_close_from_same_session_cancels() {
        let (dir, source) = setup();
        let portal = Portal::with_owner(dir.path().join("portal.json"), 1);
        portal.open(&source, 0).unwrap();
        assert!(matches!(portal.close().unwrap(), Some(PullOutcome::Cancelled(_))));
        assert_eq!(portal.load().unwrap(), None);
    }

    #[test]
    fn test_vanished_target_fails_softly() {
        let (dir, source) = setup();
        let portal_file = dir.path().join("portal.json");

        Portal::with_owner(&portal_file, 1).open(&source, 10).unwrap();
        let outcome = Portal::with_owner(&portal_file, 2).close().unwrap();
        assert!(matches!(outcome, Some(PullOutcome::NothingToTransfer(_))));
        assert!(!portal_file.exists());

        Portal::with_owner(&portal_file, 1).open(&source, 0).unwrap();
        fs::remove_file(&source).unwrap();
        let outcome = Portal::with_owner(&portal_file, 2).close().unwrap();
        assert!(matches!(outcome, Some(PullOutcome::NothingToTransfer(_))));
        assert!(!portal_file.exists());
    }

    #[test]
    fn test_close_without_portal() {
        let dir = tempfile::tempdir().unwrap();
        let portal = Portal::with_owner(dir.path().join("portal.json"), 1);
        assert_eq!(portal.close().unwrap(), None);
        assert!(!portal.clear().unwrap());
    }

    #[test]
    fn test_clear_removes_any_portal() {
        let (dir, source) = setup();
        let portal_file = dir.path().join("portal.json");
        Portal::with_owner(&portal_file, 1).open(&source, 0).unwrap();
        assert!(Portal::with_owner(&portal_file, 2).clear().unwrap());
        assert_eq!(Portal::with_owner(&portal_file, 2).load().unwrap(), None);
    }

    #[test]
    fn test_corrupt_descriptor_is_closed_and_replaced() {
        let (dir, source) = setup();
        let portal_file = dir.path().join("portal.json");
        fs::write(&portal_file, "{\"path\": 3").unwrap();

        let portal = Portal::with_owner(&portal_file, 2);
        assert!(matches!(portal.load(), Err(PortalError::Parse { .. })));
        assert_eq!(portal.close().unwrap(), Some(PullOutcome::Unreadable));
        assert!(!portal_file.exists());
        assert_eq!(portal.close().unwrap(), None);

        fs::write(&portal_file, "garbage").unwrap();
        let opened = portal.open(&source, 2).unwrap();
        assert_eq!(portal.load().unwrap(), Some(opened));
    }

    #[cfg(unix)]
    #[test]
    fn test_unencodable_path_is_a_serialize_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let portal = Portal::with_owner(dir.path().join("portal.json"), 1);
        let bad = Path::new(OsStr::from_bytes(b"/tmp/bad\xff"));
        assert!(matches!(portal.open(bad, 0), Err(PortalError::Serialize { .. })));
        assert_eq!(portal.load().unwrap(), None);
    }

    #[test]
    fn test_display_is_one_based() {
        let d = PortalDescriptor {
            path: PathBuf::from("/tmp/x.rs"),
            line: 41,
            pid: 1,
        };
        assert_eq!(d.to_string(), "/tmp/x.rs:42");
    }
}
