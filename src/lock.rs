//! Lock keeper - advisory, machine-wide "this file is being edited" registry
//!
//! Every session shares one registry file mapping absolute paths to the pid
//! that opened them. There is no daemon: a session reloads the whole file,
//! changes its own entry and rewrites the whole file. Two sessions racing on
//! the same instant can both win; that is accepted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("could not create lock directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not read lock registry {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write lock registry {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("lock registry {} is unreadable: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode lock registry {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LockError {
    /// True when the registry exists but cannot be read or decoded. A
    /// session can still edit without coordination in that case.
    pub fn is_unreadable(&self) -> bool {
        matches!(self, LockError::Read { .. } | LockError::Parse { .. })
    }
}

/// Who holds a path, and since when
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    /// Unix timestamp (seconds)
    pub locked_at: u64,
}

impl LockRecord {
    fn now(pid: u32) -> Self {
        let locked_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self { pid, locked_at }
    }
}

/// Answers "does this process still exist?" for staleness checks
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the OS process table
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_some()
    }
}

/// Result of [`LockKeeper::acquire`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// No one held the path (or we already did)
    Acquired,
    /// The previous holder is gone; its entry was taken over
    Reclaimed { previous: u32 },
    /// A live holder was overwritten because the caller forced it
    Overridden { previous: u32 },
    /// A live process holds the path; nothing was written
    Held { owner: u32 },
}

pub struct LockKeeper {
    registry: PathBuf,
    owner: u32,
    entries: BTreeMap<PathBuf, LockRecord>,
    probe: Box<dyn ProcessProbe>,
}

impl LockKeeper {
    /// Keeper for the current process
    pub fn new(registry: impl Into<PathBuf>) -> Self {
        Self::with_owner(registry, std::process::id(), SystemProbe)
    }

    pub fn with_owner(
        registry: impl Into<PathBuf>,
        owner: u32,
        probe: impl ProcessProbe + 'static,
    ) -> Self {
        Self {
            registry: registry.into(),
            owner,
            entries: BTreeMap::new(),
            probe: Box::new(probe),
        }
    }

    pub fn registry(&self) -> &Path {
        &self.registry
    }

    /// Replace the in-memory copy with the registry file. A missing or empty
    /// file means no locks. So does a path that cannot exist yet (a parent
    /// that is not a directory); `save` reports that one.
    pub fn load(&mut self) -> Result<(), LockError> {
        let content = match fs::read_to_string(&self.registry) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound || !self.registry.exists() => {
                self.entries.clear();
                return Ok(());
            }
            Err(source) => {
                return Err(LockError::Read {
                    path: self.registry.clone(),
                    source,
                })
            }
        };
        self.entries = if content.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_json::from_str(&content).map_err(|source| LockError::Parse {
                path: self.registry.clone(),
                source,
            })?
        };
        Ok(())
    }

    /// Rewrite the whole registry file from the in-memory copy
    pub fn save(&self) -> Result<(), LockError> {
        if let Some(dir) = self.registry.parent() {
            fs::create_dir_all(dir).map_err(|source| LockError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let json =
            serde_json::to_string_pretty(&self.entries).map_err(|source| LockError::Serialize {
                path: self.registry.clone(),
                source,
            })?;
        write_replace(&self.registry, json.as_bytes()).map_err(|source| LockError::Write {
            path: self.registry.clone(),
            source,
        })
    }

    /// Claim `path` in memory. Fails only if another live process holds it.
    pub fn try_lock(&mut self, path: &Path) -> bool {
        if let Some(record) = self.entries.get(path) {
            if record.pid != self.owner && self.probe.is_alive(record.pid) {
                return false;
            }
        }
        self.entries.insert(path.to_path_buf(), LockRecord::now(self.owner));
        true
    }

    /// Claim `path` in memory regardless of the current holder
    pub fn force_lock(&mut self, path: &Path) -> Option<u32> {
        self.entries
            .insert(path.to_path_buf(), LockRecord::now(self.owner))
            .map(|previous| previous.pid)
    }

    /// Drop the entry for `path`, whoever holds it
    pub fn unlock(&mut self, path: &Path) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn owner_of(&self, path: &Path) -> Option<u32> {
        self.entries.get(path).map(|r| r.pid)
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Reload, claim `path` and write back.
    ///
    /// When the path is held by a live process and `force` is false, nothing
    /// is written and [`LockOutcome::Held`] is returned.
    pub fn acquire(&mut self, path: &Path, force: bool) -> Result<LockOutcome, LockError> {
        self.load()?;
        let outcome = match self.owner_of(path) {
            None => {
                self.try_lock(path);
                LockOutcome::Acquired
            }
            Some(pid) if pid == self.owner => {
                self.try_lock(path);
                LockOutcome::Acquired
            }
            Some(pid) => {
                if self.try_lock(path) {
                    tracing::info!(path = %path.display(), pid, "reclaimed stale lock");
                    LockOutcome::Reclaimed { previous: pid }
                } else if force {
                    self.force_lock(path);
                    tracing::warn!(path = %path.display(), pid, "overriding live lock");
                    LockOutcome::Overridden { previous: pid }
                } else {
                    tracing::debug!(path = %path.display(), pid, "file is locked");
                    return Ok(LockOutcome::Held { owner: pid });
                }
            }
        };
        self.save()?;
        Ok(outcome)
    }

    /// Reload and remove our own entry for `path`. Entries of other
    /// processes are left alone (someone forced the file open after us).
    pub fn release(&mut self, path: &Path) -> Result<bool, LockError> {
        self.load()?;
        if self.owner_of(path) != Some(self.owner) {
            return Ok(false);
        }
        self.unlock(path);
        self.save()?;
        Ok(true)
    }

    /// Reload and remove the entry for `path` whoever holds it
    pub fn release_any(&mut self, path: &Path) -> Result<bool, LockError> {
        self.load()?;
        if !self.unlock(path) {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Delete the registry file. Returns false if there was nothing to delete.
    pub fn clear_all(registry: &Path) -> Result<bool, LockError> {
        match fs::remove_file(registry) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(LockError::Write {
                path: registry.to_path_buf(),
                source,
            }),
        }
    }
}

/// Write through a sibling temp file and rename it into place, so readers
/// never see a half-written file
pub(crate) fn write_replace(path: &Path, data: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "registry".to_string());
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
    fs::write(&tmp, data)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
