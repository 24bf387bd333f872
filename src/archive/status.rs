use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub message: String,
    pub severity: Severity,
}

/// Thread-safe end of the status hand-off; clone freely into workers
#[derive(Debug, Clone)]
pub struct StatusSender {
    tx: mpsc::UnboundedSender<StatusUpdate>,
}

impl StatusSender {
    pub fn report<S: Into<String>>(&self, message: S, severity: Severity) {
        // Receiver gone means the loop is shutting down
        let _ = self.tx.send(StatusUpdate {
            message: message.into(),
            severity,
        });
    }
}

/// Loop end of the hand-off, drained without blocking on every tick
#[derive(Debug)]
pub struct StatusQueue {
    rx: mpsc::UnboundedReceiver<StatusUpdate>,
}

impl StatusQueue {
    pub fn drain(&mut self) -> Vec<StatusUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.rx.try_recv() {
            updates.push(update);
        }
        updates
    }
}

pub fn status_channel() -> (StatusSender, StatusQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatusSender { tx }, StatusQueue { rx })
}
