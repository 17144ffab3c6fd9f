//! Configuration system for hatch
//!
//! Loads settings from ~/.config/hatch/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::editor::DEFAULT_UNDO_LIMIT;

/// Main settings structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub editor: EditorSettings,
    pub paths: PathSettings,
    pub export: ExportSettings,
}

/// Editor behavior settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Display width of a tab stop (default: 4)
    pub tab_width: usize,
    /// Snapshots kept for undo (default: 1000)
    pub undo_limit: usize,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            tab_width: 4,
            undo_limit: DEFAULT_UNDO_LIMIT,
        }
    }
}

/// Overrides for the files shared between sessions.
/// Anything left unset lives in the cache directory.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub lock_file: Option<PathBuf>,
    pub portal_file: Option<PathBuf>,
    pub location_file: Option<PathBuf>,
    pub last_command_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

/// Export settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Shell command run by `:export`. `{file}` is replaced by the file
    /// path and `{stem}` by the file name without extension.
    pub command: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            command: "pandoc {file} -o {stem}.pdf".to_string(),
        }
    }
}

impl ExportSettings {
    /// Expand the command template for `file`
    pub fn command_for(&self, file: &Path) -> String {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "export".to_string());
        self.command
            .replace("{file}", &file.to_string_lossy())
            .replace("{stem}", &stem)
    }
}

/// Resolved locations of every file shared between sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub lock_file: PathBuf,
    pub portal_file: PathBuf,
    pub location_file: PathBuf,
    pub last_command_file: PathBuf,
    pub log_file: PathBuf,
}

impl Paths {
    /// All shared files inside one directory
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            lock_file: dir.join("locks.json"),
            portal_file: dir.join("portal.json"),
            location_file: dir.join("locations.json"),
            last_command_file: dir.join("last_command.sh"),
            log_file: dir.join("hatch.log"),
        }
    }

    /// ~/.cache/hatch (or ./hatch when there is no cache directory)
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hatch")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::in_dir(&Self::default_dir())
    }
}

impl Settings {
    /// Shared file locations with config overrides applied
    pub fn paths(&self) -> Paths {
        let defaults = Paths::default();
        let p = &self.paths;
        Paths {
            lock_file: p.lock_file.clone().unwrap_or(defaults.lock_file),
            portal_file: p.portal_file.clone().unwrap_or(defaults.portal_file),
            location_file: p.location_file.clone().unwrap_or(defaults.location_file),
            last_command_file: p.last_command_file.clone().unwrap_or(defaults.last_command_file),
            log_file: p.log_file.clone().unwrap_or(defaults.log_file),
        }
    }
}

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config/hatch/config.toml"))
}

/// Load configuration from the config file, falling back to defaults
pub fn load_config() -> Settings {
    let Some(path) = config_path() else {
        return Settings::default();
    };
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => parse_settings(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config file");
            Settings::default()
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read config file");
            Settings::default()
        }
    }
}

fn parse_settings(content: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str::<Settings>(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let settings = parse_settings("[editor]\ntab_width = 8\n").unwrap();
        assert_eq!(settings.editor.tab_width, 8);
        assert_eq!(settings.editor.undo_limit, DEFAULT_UNDO_LIMIT);
        assert!(settings.paths.lock_file.is_none());
    }

    #[test]
    fn test_path_overrides() {
        let settings = parse_settings("[paths]\nlock_file = \"/tmp/l.json\"\n").unwrap();
        let paths = settings.paths();
        assert_eq!(paths.lock_file, PathBuf::from("/tmp/l.json"));
        assert_eq!(paths.portal_file, Paths::default().portal_file);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "editor = 3").unwrap();
        let settings = load_config_from(&path);
        assert_eq!(settings.editor.tab_width, 4);
    }

    #[test]
    fn test_export_template() {
        let export = ExportSettings::default();
        assert_eq!(
            export.command_for(Path::new("/docs/notes.md")),
            "pandoc /docs/notes.md -o notes.pdf"
        );
    }
}
