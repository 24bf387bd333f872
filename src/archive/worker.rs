use super::services::{CommandHook, Notifier, Uploader};
use super::status::{Severity, StatusSender};
use super::usb::UsbArchiver;
use crate::assembly::AssembledArtifact;
use crate::config::PhotoboothConfig;
use crate::error::{PhotoboothError, Result, UploadError};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Finished tasks kept in the ledger; older terminal entries are dropped
pub const TASK_HISTORY_LIMIT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Remote upload plus USB archive of a new artifact
    Archive,
    /// Email of a previously archived artifact
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Ledger entry for one dispatched background job. Never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub id: u64,
    pub kind: TaskKind,
    pub artifact_path: PathBuf,
    pub status: TaskStatus,
    pub detail: Option<String>,
}

/// Collaborators the worker delegates to. `None` disables that step.
#[derive(Clone, Default)]
pub struct WorkerServices {
    pub uploader: Option<Arc<dyn Uploader>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub usb: Option<Arc<UsbArchiver>>,
}

impl WorkerServices {
    pub fn from_config(config: &PhotoboothConfig) -> std::result::Result<Self, UploadError> {
        let uploader = match &config.upload.command {
            Some(command) => Some(Arc::new(CommandHook::from_command(command)?) as Arc<dyn Uploader>),
            None => None,
        };
        let notifier = match &config.email.command {
            Some(command) => Some(Arc::new(CommandHook::from_command(command)?) as Arc<dyn Notifier>),
            None => None,
        };
        let usb = config.archive.usb_enabled.then(|| {
            Arc::new(UsbArchiver::new(
                &config.archive.usb_root,
                &config.archive.reserved_marker,
                &config.archive.usb_subdir,
            ))
        });

        Ok(Self {
            uploader,
            notifier,
            usb,
        })
    }
}

/// Bounded background pool for upload, archive and email work. Results go
/// back to the loop only through the status channel.
pub struct ArchiveUploadWorker {
    runtime: Option<Runtime>,
    handle: Handle,
    permits: Arc<Semaphore>,
    services: WorkerServices,
    status: StatusSender,
    tasks: Arc<Mutex<Vec<UploadTask>>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl ArchiveUploadWorker {
    pub fn new(pool_size: usize, services: WorkerServices, status: StatusSender) -> Result<Self> {
        if pool_size == 0 {
            return Err(PhotoboothError::system("Worker pool size must be greater than 0"));
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(pool_size)
            .thread_name("photobooth-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        info!(
            "Background worker started with {} workers (upload: {}, email: {}, usb: {})",
            pool_size,
            services.uploader.is_some(),
            services.notifier.is_some(),
            services.usb.is_some()
        );

        Ok(Self {
            runtime: Some(runtime),
            handle,
            permits: Arc::new(Semaphore::new(pool_size)),
            services,
            status,
            tasks: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        })
    }

    /// Queue upload and archive of a finished artifact. Returns at once.
    pub fn dispatch(&self, artifact: &AssembledArtifact) -> u64 {
        let id = self.register(TaskKind::Archive, &artifact.path);
        let path = artifact.path.clone();
        let services = self.services.clone();
        let ledger = self.ledger(id);
        let status = self.status.clone();
        let permits = self.permits.clone();
        let shutdown = self.shutdown.clone();

        self.handle.spawn(async move {
            let Some(_permit) = acquire(&permits, &shutdown, &ledger).await else {
                return;
            };
            ledger.set(TaskStatus::Running, None);

            let mut failures = Vec::new();

            match &services.uploader {
                Some(uploader) => match uploader.upload(&path).await {
                    Ok(()) => info!("Uploaded {}", path.display()),
                    Err(e) => {
                        error!("Upload of {} failed: {}", path.display(), e);
                        failures.push(format!("upload failed: {}", e));
                    }
                },
                None => debug!("Upload disabled, skipping {}", path.display()),
            }

            if let Some(usb) = services.usb.clone() {
                let source = path.clone();
                match tokio::task::spawn_blocking(move || usb.archive(&source)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        error!("USB archive of {} failed: {}", path.display(), e);
                        failures.push(format!("USB archive failed: {}", e));
                    }
                    Err(e) => {
                        error!("USB archive task panicked: {}", e);
                        failures.push("USB archive failed".to_string());
                    }
                }
            }

            // Status goes out before the ledger turns terminal
            if failures.is_empty() {
                status.report("Upload complete", Severity::Info);
                ledger.set(TaskStatus::Succeeded, None);
            } else {
                let detail = failures.join("; ");
                status.report(format!("Upload incomplete: {}", detail), Severity::Warning);
                ledger.set(TaskStatus::Failed, Some(detail));
            }
        });

        id
    }

    /// Queue an email of `path` to `recipient`. `None` when email is disabled.
    pub fn dispatch_email(&self, recipient: &str, path: &Path) -> Option<u64> {
        let Some(notifier) = self.services.notifier.clone() else {
            warn!("Email requested but no email command is configured");
            self.status
                .report("Email is not configured", Severity::Warning);
            return None;
        };

        let id = self.register(TaskKind::Email, path);
        let path = path.to_path_buf();
        let recipient = recipient.to_string();
        let ledger = self.ledger(id);
        let status = self.status.clone();
        let permits = self.permits.clone();
        let shutdown = self.shutdown.clone();

        self.handle.spawn(async move {
            let Some(_permit) = acquire(&permits, &shutdown, &ledger).await else {
                return;
            };
            ledger.set(TaskStatus::Running, None);

            match notifier.send(&recipient, &path).await {
                Ok(()) => {
                    info!("Emailed {} to {}", path.display(), recipient);
                    status.report(format!("Sent to {}", recipient), Severity::Info);
                    ledger.set(TaskStatus::Succeeded, None);
                }
                Err(e) => {
                    error!("Email of {} failed: {}", path.display(), e);
                    status.report(format!("Email failed: {}", e), Severity::Warning);
                    ledger.set(TaskStatus::Failed, Some(e.to_string()));
                }
            }
        });

        Some(id)
    }

    /// Snapshot of every task dispatched so far
    pub fn tasks(&self) -> Vec<UploadTask> {
        self.tasks.lock().clone()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks
            .lock()
            .iter()
            .all(|task| task.status.is_terminal())
    }

    /// Block the caller until no task is pending or running
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Let running work finish within `timeout`, then stop the pool.
    /// Tasks that never started are marked failed.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let Some(runtime) = self.runtime.take() else {
            return true;
        };

        info!("Shutting down background worker");
        let drained = self.wait_idle(timeout);
        if !drained {
            warn!("Background work still running after {:?}", timeout);
        }

        self.shutdown.cancel();
        runtime.shutdown_timeout(timeout);

        for task in self.tasks.lock().iter_mut() {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Failed;
                task.detail = Some("worker shut down".to_string());
            }
        }

        drained
    }

    fn register(&self, kind: TaskKind, path: &Path) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut tasks = self.tasks.lock();
        tasks.push(UploadTask {
            id,
            kind,
            artifact_path: path.to_path_buf(),
            status: TaskStatus::Pending,
            detail: None,
        });
        prune_history(&mut tasks, TASK_HISTORY_LIMIT);
        drop(tasks);
        debug!("Queued {:?} task {} for {}", kind, id, path.display());
        id
    }

    fn ledger(&self, id: u64) -> TaskLedger {
        TaskLedger {
            id,
            tasks: self.tasks.clone(),
        }
    }
}

impl Drop for ArchiveUploadWorker {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            self.shutdown.cancel();
            runtime.shutdown_background();
        }
    }
}

/// Drop the oldest terminal entries until at most `limit` remain.
/// Pending and running tasks are always kept.
fn prune_history(tasks: &mut Vec<UploadTask>, limit: usize) {
    let mut excess = tasks.len().saturating_sub(limit);
    if excess == 0 {
        return;
    }
    tasks.retain(|task| {
        if excess > 0 && task.status.is_terminal() {
            excess -= 1;
            false
        } else {
            true
        }
    });
}

/// Handle a spawned task uses to update its own ledger entry
struct TaskLedger {
    id: u64,
    tasks: Arc<Mutex<Vec<UploadTask>>>,
}

impl TaskLedger {
    fn set(&self, status: TaskStatus, detail: Option<String>) {
        if let Some(task) = self.tasks.lock().iter_mut().find(|t| t.id == self.id) {
            task.status = status;
            task.detail = detail;
        }
    }
}

async fn acquire(
    permits: &Arc<Semaphore>,
    shutdown: &CancellationToken,
    ledger: &TaskLedger,
) -> Option<tokio::sync::OwnedSemaphorePermit> {
    let permit = tokio::select! {
        permit = permits.clone().acquire_owned() => permit.ok(),
        _ = shutdown.cancelled() => None,
    };

    if permit.is_none() {
        ledger.set(TaskStatus::Failed, Some("worker shut down".to_string()));
    }
    permit
}
