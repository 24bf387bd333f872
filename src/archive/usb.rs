use crate::error::ArchiveError;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Removable drive chosen for archiving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    pub mount_path: PathBuf,
    pub writable: bool,
}

/// Copies artifacts to the first writable removable drive. The drive is
/// found on first use and kept until a copy to it fails.
#[derive(Debug)]
pub struct UsbArchiver {
    root: PathBuf,
    reserved_marker: String,
    subdir: String,
    cached: Mutex<Option<ArchiveTarget>>,
    scans: AtomicUsize,
}

impl UsbArchiver {
    pub fn new<P: Into<PathBuf>>(root: P, reserved_marker: &str, subdir: &str) -> Self {
        Self {
            root: root.into(),
            reserved_marker: reserved_marker.to_string(),
            subdir: subdir.to_string(),
            cached: Mutex::new(None),
            scans: AtomicUsize::new(0),
        }
    }

    /// Number of times the mount root has been enumerated
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn cached_target(&self) -> Option<ArchiveTarget> {
        self.cached.lock().clone()
    }

    pub fn invalidate(&self) {
        if self.cached.lock().take().is_some() {
            debug!("Archive target cache invalidated");
        }
    }

    /// Cached target, or the result of a fresh scan
    pub fn target(&self) -> Result<Option<ArchiveTarget>, ArchiveError> {
        let mut cached = self.cached.lock();
        if let Some(target) = cached.as_ref() {
            return Ok(Some(target.clone()));
        }

        let found = self.scan()?;
        if let Some(target) = &found {
            info!("Archiving to {}", target.mount_path.display());
        }
        *cached = found.clone();
        Ok(found)
    }

    /// Copy the artifact onto the drive. `Ok(None)` when no drive is present.
    pub fn archive(&self, artifact: &Path) -> Result<Option<PathBuf>, ArchiveError> {
        let target = match self.target()? {
            Some(target) => target,
            None => {
                info!("No writable USB drive found, skipping archive");
                return Ok(None);
            }
        };

        let dest_dir = target.mount_path.join(&self.subdir);
        let file_name = artifact.file_name().unwrap_or(artifact.as_os_str());
        let dest = dest_dir.join(file_name);

        let copy_error = |source: io::Error| ArchiveError::Copy {
            from: artifact.to_path_buf(),
            to: dest.clone(),
            source,
        };

        let result = fs::create_dir_all(&dest_dir)
            .and_then(|_| fs::copy(artifact, &dest))
            .map_err(copy_error);

        match result {
            Ok(bytes) => {
                info!("Archived {} ({} bytes)", dest.display(), bytes);
                Ok(Some(dest))
            }
            Err(e) => {
                // The drive may have been pulled; look again next time
                self.invalidate();
                Err(e)
            }
        }
    }

    fn scan(&self) -> Result<Option<ArchiveTarget>, ArchiveError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        debug!("Scanning {} for removable drives", self.root.display());

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ArchiveError::Scan {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut mounts: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        mounts.sort();

        for mount in mounts {
            if !self.reserved_marker.is_empty()
                && mount.to_string_lossy().contains(&self.reserved_marker)
            {
                debug!("Skipping reserved mount {}", mount.display());
                continue;
            }
            if is_writable(&mount) {
                return Ok(Some(ArchiveTarget {
                    mount_path: mount,
                    writable: true,
                }));
            }
            warn!("Mount {} is not writable", mount.display());
        }

        Ok(None)
    }
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the call's duration
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
