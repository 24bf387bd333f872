use crate::error::CaptureError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SESSION_PREFIX: &str = "session_";

/// Temporary root holding one directory of raw photos per burst
#[derive(Debug, Clone)]
pub struct SessionWorkspace {
    root: PathBuf,
}

impl SessionWorkspace {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sweep previous sessions and create a fresh session directory
    pub fn begin_session(&self) -> Result<PathBuf, CaptureError> {
        self.sweep();

        let dir = self
            .root
            .join(format!("{}{}", SESSION_PREFIX, Uuid::new_v4().simple()));
        fs::create_dir_all(&dir).map_err(|source| CaptureError::SessionDirectory {
            path: dir.clone(),
            source,
        })?;

        debug!("Created session directory {}", dir.display());
        Ok(dir)
    }

    /// Delete `session_*` directories and stray files left under the root
    /// by earlier sessions. Other directories are never touched. Failures
    /// are logged and skipped.
    pub fn sweep(&self) -> usize {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!("Cannot read temp root {}: {}", self.root.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let result = if file_type.is_dir() {
                if !entry.file_name().to_string_lossy().starts_with(SESSION_PREFIX) {
                    debug!("Leaving {} in place", path.display());
                    continue;
                }
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            info!(
                "Cleaned {} stale entries from {}",
                removed,
                self.root.display()
            );
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_begin_session_sweeps_previous() {
        let temp = TempDir::new().unwrap();
        let workspace = SessionWorkspace::new(temp.path().join("Temp"));

        let first = workspace.begin_session().unwrap();
        fs::write(first.join("photo_1.jpg"), b"x").unwrap();
        fs::write(workspace.root().join("stray.gif"), b"x").unwrap();

        let second = workspace.begin_session().unwrap();

        assert!(!first.exists());
        assert!(!workspace.root().join("stray.gif").exists());
        assert!(second.is_dir());
        assert!(second
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(SESSION_PREFIX));
    }

    #[test]
    fn test_sweep_keeps_foreign_directories() {
        let temp = TempDir::new().unwrap();
        let workspace = SessionWorkspace::new(temp.path().join("Temp"));
        let archive = workspace.root().join("Photos");
        fs::create_dir_all(&archive).unwrap();
        fs::write(archive.join("photo_20260101_000000.jpg"), b"x").unwrap();

        let session = workspace.begin_session().unwrap();
        fs::write(session.join("photo_1.jpg"), b"x").unwrap();
        workspace.sweep();

        assert!(archive.join("photo_20260101_000000.jpg").exists());
        assert!(!session.exists());
    }

    #[test]
    fn test_sweep_missing_root_is_noop() {
        let temp = TempDir::new().unwrap();
        let workspace = SessionWorkspace::new(temp.path().join("absent"));
        assert_eq!(workspace.sweep(), 0);
    }
}
