use crate::assembly::CaptureKind;
use crate::camera::Resolution;
use crate::config::{BoothMode, PhotoboothConfig};
use std::path::PathBuf;

/// A user's capture request as the orchestrator consumes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoothRequest {
    pub shot_count: u32,
    /// Full sensor resolution when unset
    pub per_shot_size: Option<Resolution>,
    pub inter_shot_interval_ms: u64,
    pub countdown_seconds: u32,
    pub kind: CaptureKind,
    pub overlay_path: Option<PathBuf>,
    pub frame_period_ms: Option<u64>,
}

impl BoothRequest {
    pub fn from_mode(mode: &BoothMode) -> Self {
        Self {
            shot_count: mode.shot_count,
            per_shot_size: mode.photo_size.map(Resolution::from),
            inter_shot_interval_ms: mode.snap_period_ms,
            countdown_seconds: mode.countdown_seconds,
            kind: mode.kind,
            overlay_path: mode.overlay.as_ref().map(PathBuf::from),
            frame_period_ms: mode.frame_period_ms,
        }
    }
}

/// Where the booth is in its request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothPhase {
    Idle,
    Capturing,
    /// Showing the last artifact until the given time
    Review { until_ms: u64 },
}

/// Loop-level knobs
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub jpeg_quality: u8,
    pub preview_interval_ms: u64,
    pub review_millis: u64,
    /// 0 disables the idle preview
    pub idle_preview_millis: u64,
    pub email_recipient: Option<String>,
}

impl OrchestratorSettings {
    pub fn from_config(config: &PhotoboothConfig) -> Self {
        Self {
            jpeg_quality: config.capture.jpeg_quality,
            preview_interval_ms: config.capture.preview_interval_ms,
            review_millis: config.system.review_millis,
            idle_preview_millis: config.system.idle_preview_millis,
            email_recipient: config.email.recipient.clone(),
        }
    }
}
