//! Last command - the most recent external build/export invocation, kept as a
//! runnable shell script for later inspection

use std::fs;
use std::path::Path;

/// Record `command` as `#!/bin/sh\n<command>\n`
pub fn record(file: &Path, command: &str) -> anyhow::Result<()> {
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file, format!("#!/bin/sh\n{}\n", command.trim()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(file, fs::Permissions::from_mode(0o700))?;
    }

    tracing::debug!(file = %file.display(), command, "recorded last command");
    Ok(())
}

/// Read back the recorded command without its shebang line.
///
/// `Ok(None)` when nothing was recorded; an error when the file does not
/// look like a script written by [`record`].
pub fn read(file: &Path) -> anyhow::Result<Option<String>> {
    let Ok(data) = fs::read_to_string(file) else {
        return Ok(None);
    };
    match data.split_once('\n') {
        Some((shebang, rest)) if shebang.starts_with('#') => Ok(Some(rest.trim().to_string())),
        _ => anyhow::bail!("unrecognized contents in {}", file.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache").join("last_command.sh");
        record(&file, "pandoc notes.md -o notes.pdf").unwrap();

        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "#!/bin/sh\npandoc notes.md -o notes.pdf\n"
        );
        assert_eq!(read(&file).unwrap().as_deref(), Some("pandoc notes.md -o notes.pdf"));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read(&dir.path().join("nope.sh")).unwrap(), None);
    }

    #[test]
    fn test_unrecognized_contents() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("last_command.sh");
        fs::write(&file, "make all").unwrap();
        assert!(read(&file).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("last_command.sh");
        record(&file, "make").unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
