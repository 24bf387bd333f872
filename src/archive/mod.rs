mod services;
mod status;
mod usb;
mod worker;
#[cfg(test)]
mod tests;

pub use services::{CommandHook, Notifier, Uploader};
pub use status::{status_channel, Severity, StatusQueue, StatusSender, StatusUpdate};
pub use usb::{ArchiveTarget, UsbArchiver};
pub use worker::{
    ArchiveUploadWorker, TASK_HISTORY_LIMIT, TaskKind, TaskStatus, UploadTask, WorkerServices,
};
