use super::*;
use crate::assembly::{AssembledArtifact, CaptureKind};
use crate::error::UploadError;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct RecordingUploader {
    uploads: parking_lot::Mutex<Vec<PathBuf>>,
    fail: bool,
    delay_ms: u64,
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, path: &Path) -> Result<(), UploadError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        self.uploads.lock().push(path.to_path_buf());
        if self.fail {
            return Err(UploadError::Exit {
                program: "uploader".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "network unreachable".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: parking_lot::Mutex<Vec<(String, PathBuf)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, path: &Path) -> Result<(), UploadError> {
        self.sent
            .lock()
            .push((recipient.to_string(), path.to_path_buf()));
        Ok(())
    }
}

fn create_test_artifact(dir: &TempDir, name: &str) -> AssembledArtifact {
    let path = dir.path().join(name);
    fs::write(&path, b"artifact").unwrap();
    AssembledArtifact {
        kind: CaptureKind::Collage,
        path,
        source_count: 4,
    }
}

fn create_mounts(dir: &TempDir, names: &[&str]) -> PathBuf {
    let root = dir.path().join("media");
    for name in names {
        fs::create_dir_all(root.join(name)).unwrap();
    }
    root
}

#[test]
fn test_usb_skips_reserved_mount() {
    let dir = TempDir::new().unwrap();
    let root = create_mounts(&dir, &["A_SETTINGS", "B_DRIVE", "C_DRIVE"]);
    let usb = UsbArchiver::new(&root, "SETTINGS", "PhotoboothPhotos");

    let target = usb.target().unwrap().unwrap();

    assert_eq!(target.mount_path, root.join("B_DRIVE"));
    assert!(target.writable);
}

#[test]
fn test_usb_target_cached_after_first_scan() {
    let dir = TempDir::new().unwrap();
    let root = create_mounts(&dir, &["DRIVE"]);
    let usb = UsbArchiver::new(&root, "SETTINGS", "PhotoboothPhotos");
    let artifact = create_test_artifact(&dir, "photo_1.jpg");

    let first = usb.archive(&artifact.path).unwrap().unwrap();
    // A new, earlier-sorting drive is not noticed without a rescan
    fs::create_dir_all(root.join("AAA")).unwrap();
    let second = usb.archive(&artifact.path).unwrap().unwrap();

    assert_eq!(usb.scan_count(), 1);
    assert_eq!(first, second);
    assert_eq!(first, root.join("DRIVE/PhotoboothPhotos/photo_1.jpg"));
    assert_eq!(fs::read(&first).unwrap(), b"artifact");
}

#[test]
fn test_usb_no_drive_skips_archive() {
    let dir = TempDir::new().unwrap();
    let root = create_mounts(&dir, &["SETTINGS"]);
    let usb = UsbArchiver::new(&root, "SETTINGS", "PhotoboothPhotos");
    let artifact = create_test_artifact(&dir, "photo_1.jpg");

    assert_eq!(usb.archive(&artifact.path).unwrap(), None);
    assert!(usb.cached_target().is_none());

    // Missing root is the same as no drive
    let usb = UsbArchiver::new(dir.path().join("nowhere"), "SETTINGS", "PhotoboothPhotos");
    assert_eq!(usb.target().unwrap(), None);
}

#[test]
fn test_usb_copy_failure_invalidates_cache() {
    let dir = TempDir::new().unwrap();
    let root = create_mounts(&dir, &["DRIVE"]);
    let usb = UsbArchiver::new(&root, "SETTINGS", "PhotoboothPhotos");
    let artifact = create_test_artifact(&dir, "photo_1.jpg");
    usb.archive(&artifact.path).unwrap();

    let missing = dir.path().join("gone.jpg");
    assert!(usb.archive(&missing).is_err());
    assert!(usb.cached_target().is_none());

    usb.archive(&artifact.path).unwrap();
    assert_eq!(usb.scan_count(), 2);
}

#[cfg(unix)]
#[test]
fn test_usb_skips_read_only_mount() {
    use std::os::unix::fs::PermissionsExt;

    // access(2) ignores permission bits for root
    if unsafe { libc::geteuid() } == 0 {
        return;
    }

    let dir = TempDir::new().unwrap();
    let root = create_mounts(&dir, &["A_LOCKED", "B_OPEN"]);
    fs::set_permissions(root.join("A_LOCKED"), fs::Permissions::from_mode(0o555)).unwrap();
    let usb = UsbArchiver::new(&root, "SETTINGS", "PhotoboothPhotos");

    let target = usb.target().unwrap().unwrap();
    assert_eq!(target.mount_path, root.join("B_OPEN"));

    fs::set_permissions(root.join("A_LOCKED"), fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_status_queue_drains_in_order() {
    let (sender, mut queue) = status_channel();
    let worker_side = sender.clone();

    std::thread::spawn(move || {
        worker_side.report("first", Severity::Info);
        worker_side.report("second", Severity::Warning);
    })
    .join()
    .unwrap();

    let updates = queue.drain();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].message, "first");
    assert_eq!(updates[1].severity, Severity::Warning);
    assert!(queue.drain().is_empty());
}

#[test]
fn test_command_hook_requires_program() {
    assert!(matches!(
        CommandHook::from_command(&[]),
        Err(UploadError::Misconfigured { .. })
    ));

    let hook = CommandHook::from_command(&["rclone".to_string(), "{file}".to_string()]).unwrap();
    assert_eq!(hook.program(), "rclone");
}

#[test]
fn test_worker_reports_upload_complete() {
    let dir = TempDir::new().unwrap();
    let uploader = Arc::new(RecordingUploader::default());
    let (status, mut queue) = status_channel();
    let services = WorkerServices {
        uploader: Some(uploader.clone()),
        ..Default::default()
    };
    let mut worker = ArchiveUploadWorker::new(2, services, status).unwrap();
    let artifact = create_test_artifact(&dir, "photo_1.jpg");

    let id = worker.dispatch(&artifact);
    assert!(worker.wait_idle(WAIT));

    let tasks = worker.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, id);
    assert_eq!(tasks[0].status, TaskStatus::Succeeded);
    assert_eq!(uploader.uploads.lock().as_slice(), &[artifact.path.clone()]);

    let updates = queue.drain();
    assert_eq!(
        updates,
        vec![StatusUpdate {
            message: "Upload complete".to_string(),
            severity: Severity::Info,
        }]
    );

    assert!(worker.shutdown(WAIT));
}

#[test]
fn test_worker_reports_failure_distinctly() {
    let dir = TempDir::new().unwrap();
    let uploader = Arc::new(RecordingUploader {
        fail: true,
        ..Default::default()
    });
    let (status, mut queue) = status_channel();
    let services = WorkerServices {
        uploader: Some(uploader),
        ..Default::default()
    };
    let worker = ArchiveUploadWorker::new(2, services, status).unwrap();

    worker.dispatch(&create_test_artifact(&dir, "photo_1.jpg"));
    assert!(worker.wait_idle(WAIT));

    let task = &worker.tasks()[0];
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.detail.as_deref().unwrap().contains("upload failed"));

    let updates = queue.drain();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].severity, Severity::Warning);
    assert!(updates[0].message.contains("network unreachable"));
}

#[test]
fn test_worker_archives_to_usb() {
    let dir = TempDir::new().unwrap();
    let root = create_mounts(&dir, &["SETTINGS", "STICK"]);
    let usb = Arc::new(UsbArchiver::new(&root, "SETTINGS", "PhotoboothPhotos"));
    let (status, mut queue) = status_channel();
    let services = WorkerServices {
        usb: Some(usb.clone()),
        ..Default::default()
    };
    let worker = ArchiveUploadWorker::new(2, services, status).unwrap();

    worker.dispatch(&create_test_artifact(&dir, "photo_1.jpg"));
    worker.dispatch(&create_test_artifact(&dir, "photo_2.jpg"));
    assert!(worker.wait_idle(WAIT));

    assert!(root.join("STICK/PhotoboothPhotos/photo_1.jpg").exists());
    assert!(root.join("STICK/PhotoboothPhotos/photo_2.jpg").exists());
    assert_eq!(usb.scan_count(), 1);
    assert!(queue
        .drain()
        .iter()
        .all(|u| u.severity == Severity::Info));
}

#[test]
fn test_worker_pool_is_bounded() {
    let dir = TempDir::new().unwrap();
    let uploader = Arc::new(RecordingUploader {
        delay_ms: 50,
        ..Default::default()
    });
    let (status, _queue) = status_channel();
    let services = WorkerServices {
        uploader: Some(uploader.clone()),
        ..Default::default()
    };
    let worker = ArchiveUploadWorker::new(2, services, status).unwrap();

    for n in 0..6 {
        worker.dispatch(&create_test_artifact(&dir, &format!("photo_{}.jpg", n)));
    }
    assert!(worker.wait_idle(WAIT));

    assert_eq!(uploader.uploads.lock().len(), 6);
    assert!(uploader.peak.load(Ordering::SeqCst) <= 2);
    assert!(worker
        .tasks()
        .iter()
        .all(|t| t.status == TaskStatus::Succeeded));
}

#[test]
fn test_dispatch_does_not_block_caller() {
    let dir = TempDir::new().unwrap();
    let uploader = Arc::new(RecordingUploader {
        delay_ms: 500,
        ..Default::default()
    });
    let (status, _queue) = status_channel();
    let services = WorkerServices {
        uploader: Some(uploader),
        ..Default::default()
    };
    let worker = ArchiveUploadWorker::new(2, services, status).unwrap();

    let started = std::time::Instant::now();
    worker.dispatch(&create_test_artifact(&dir, "photo_1.jpg"));
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(!worker.is_idle());
    assert!(worker.wait_idle(WAIT));
}

#[test]
fn test_email_dispatch() {
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let (status, mut queue) = status_channel();
    let services = WorkerServices {
        notifier: Some(notifier.clone()),
        ..Default::default()
    };
    let worker = ArchiveUploadWorker::new(2, services, status).unwrap();
    let artifact = create_test_artifact(&dir, "photo_1.jpg");

    let id = worker.dispatch_email("guest@example.com", &artifact.path);
    assert!(id.is_some());
    assert!(worker.wait_idle(WAIT));

    assert_eq!(
        notifier.sent.lock().as_slice(),
        &[("guest@example.com".to_string(), artifact.path.clone())]
    );
    assert_eq!(worker.tasks()[0].kind, TaskKind::Email);
    assert_eq!(queue.drain()[0].severity, Severity::Info);
}

#[test]
fn test_email_disabled_reports_warning() {
    let dir = TempDir::new().unwrap();
    let (status, mut queue) = status_channel();
    let worker = ArchiveUploadWorker::new(2, WorkerServices::default(), status).unwrap();

    let id = worker.dispatch_email("guest@example.com", &dir.path().join("photo.jpg"));

    assert!(id.is_none());
    assert!(worker.tasks().is_empty());
    assert_eq!(queue.drain()[0].severity, Severity::Warning);
}

#[cfg(unix)]
#[test]
fn test_command_hook_runs_program() {
    let dir = TempDir::new().unwrap();
    let artifact = create_test_artifact(&dir, "photo_1.jpg");
    let copy = dir.path().join("uploaded.jpg");
    let hook = CommandHook::from_command(&[
        "cp".to_string(),
        "{file}".to_string(),
        copy.to_string_lossy().to_string(),
    ])
    .unwrap();
    let failing = CommandHook::from_command(&["false".to_string()]).unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        hook.upload(&artifact.path).await.unwrap();
        assert!(matches!(
            failing.upload(&artifact.path).await,
            Err(UploadError::Exit { .. })
        ));
    });

    assert_eq!(fs::read(copy).unwrap(), b"artifact");
}

#[test]
fn test_services_from_config() {
    let mut config = crate::config::PhotoboothConfig::default();
    let services = WorkerServices::from_config(&config).unwrap();
    assert!(services.uploader.is_none());
    assert!(services.notifier.is_none());
    assert!(services.usb.is_some());

    config.upload.command = Some(vec![]);
    assert!(WorkerServices::from_config(&config).is_err());
}

#[test]
fn test_task_ledger_history_is_bounded() {
    let dir = TempDir::new().unwrap();
    let artifact = create_test_artifact(&dir, "photo_1.jpg");
    let (status, _queue) = status_channel();
    let worker = ArchiveUploadWorker::new(2, WorkerServices::default(), status).unwrap();

    for _ in 0..TASK_HISTORY_LIMIT + 10 {
        worker.dispatch(&artifact);
    }
    assert!(worker.wait_idle(WAIT));
    let last = worker.dispatch(&artifact);
    assert!(worker.wait_idle(WAIT));

    let tasks = worker.tasks();
    assert_eq!(tasks.len(), TASK_HISTORY_LIMIT);
    assert_eq!(tasks.last().map(|t| t.id), Some(last));
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Succeeded));
}
