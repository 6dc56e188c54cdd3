//! Sink file I/O: crash-safe state replacement and tolerant reads.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::DEFAULT_PERSISTENCE_TARGET;

/// Hidden sibling of `path` that a new state document is staged in.
fn staging_path(path: &Path) -> (PathBuf, PathBuf) {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let stem = path
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_PERSISTENCE_TARGET);
    let staged = dir.join(format!(".{stem}.{}.tmp", uuid::Uuid::new_v4()));
    (dir, staged)
}

/// Replace the state document at `path` so readers see either the old or the new text.
///
/// The text is staged next to the target, synced, then renamed over it. A
/// staging file that could not be fully written is removed.
pub(crate) fn atomic_write_text(path: &Path, content: &str) -> Result<()> {
    let (dir, staged) = staging_path(path);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create state directory {}", dir.display()))?;

    let staged_write = std::fs::File::create(&staged).and_then(|mut file| {
        file.write_all(content.as_bytes())?;
        file.sync_all()
    });
    if let Err(error) = staged_write {
        let _ = std::fs::remove_file(&staged);
        return Err(error)
            .with_context(|| format!("cannot stage conversation state at {}", staged.display()));
    }

    if let Err(error) = std::fs::rename(&staged, path) {
        let _ = std::fs::remove_file(&staged);
        return Err(error)
            .with_context(|| format!("cannot move staged conversation state into {}", path.display()));
    }
    Ok(())
}

/// Read a state file, treating an absent or blank file as "no content".
pub(crate) fn read_text_if_present(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(None),
        Ok(text) => Ok(Some(text)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => {
            Err(error).with_context(|| format!("cannot read conversation state {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_nested_parent_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("a").join("b").join("state.json");

        atomic_write_text(&target, "{}").expect("write");

        assert_eq!(std::fs::read_to_string(&target).expect("read"), "{}");
        let leftovers = std::fs::read_dir(target.parent().expect("parent"))
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn rewrite_replaces_previous_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("state.json");

        atomic_write_text(&target, "{\"execution_count\": 1}").expect("first write");
        atomic_write_text(&target, "{\"execution_count\": 2}").expect("second write");

        let text = read_text_if_present(&target).expect("read").expect("present");
        assert_eq!(text, "{\"execution_count\": 2}");
    }

    #[test]
    fn staging_file_sits_beside_target() {
        let (dir, staged) = staging_path(Path::new("conversation.json"));
        assert_eq!(dir, PathBuf::from("."));
        let name = staged.file_name().and_then(|name| name.to_str()).expect("name");
        assert!(name.starts_with(".conversation.json."));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn blank_and_missing_files_read_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing.json");
        assert!(read_text_if_present(&missing).expect("missing").is_none());

        let blank = dir.path().join("blank.json");
        std::fs::write(&blank, "  \n").expect("write blank");
        assert!(read_text_if_present(&blank).expect("blank").is_none());
    }
}
