//! Filesystem helpers.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Writes `content` to `path` without ever exposing a partial file.
///
/// The bytes go to a randomly named temp file in the destination's
/// directory, are synced to disk, and the temp file is then renamed over
/// `path`. On any failure the temp file is removed and an existing `path`
/// is left untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Randomized temp filename, created exclusively, so nothing
    // can be planted at a predictable path ahead of the rename.
    let mut temp = tempfile::Builder::new()
        .prefix(".appcast-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| {
            format!(
                "Failed to create temporary file in '{}': check directory permissions",
                dir.display()
            )
        })?;

    temp.write_all(content).with_context(|| {
        format!(
            "Failed to write temporary file '{}': disk may be full",
            temp.path().display()
        )
    })?;

    temp.as_file().sync_all().with_context(|| {
        format!(
            "Failed to sync temporary file '{}' to disk",
            temp.path().display()
        )
    })?;

    temp.persist(path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to rename '{}' to '{}': {}",
            e.file.path().display(),
            path.display(),
            e.error
        )
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xml");
        atomic_write(&path, b"<rss/>").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<rss/>");
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xml");
        std::fs::write(&path, "old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_atomic_write_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.xml");
        assert!(atomic_write(&path, b"x").is_err());
        assert!(!path.exists());
    }
}
