use crate::camera::{CameraResourceManager, Resolution};
use crate::error::{CaptureError, PhotoboothError};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One burst worth of capture parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub shot_count: u32,
    /// Per-shot size; full sensor resolution when unset
    pub shot_size: Option<Resolution>,
    pub interval_ms: u64,
    pub countdown_seconds: u32,
}

/// A photo written to the session directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoArtifact {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// 1-based position within the burst
    pub index: u32,
}

/// Why a burst ended before reaching its shot count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurstAbort {
    Resource(String),
    Capture(String),
    Cancelled,
}

impl fmt::Display for BurstAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurstAbort::Resource(details) => write!(f, "camera failure: {}", details),
            BurstAbort::Capture(details) => write!(f, "capture failure: {}", details),
            BurstAbort::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BurstResult {
    /// Ordered by index
    pub photos: Vec<PhotoArtifact>,
    pub requested: u32,
    pub abort: Option<BurstAbort>,
}

impl BurstResult {
    pub fn is_complete(&self) -> bool {
        self.abort.is_none() && self.photos.len() == self.requested as usize
    }
}

/// What happened during one tick
#[derive(Debug, Default)]
pub struct SequencerTick {
    /// Countdown still running
    pub counting: bool,
    /// Countdown index to display
    pub countdown: Option<u32>,
    /// Fresh live preview frame
    pub preview: Option<RgbImage>,
    /// Photo taken this tick
    pub photo: Option<PhotoArtifact>,
    pub finished: bool,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Countdown,
    Capturing,
    Done,
}

/// Polling state machine for one countdown plus burst. Never sleeps; the
/// host calls `tick` from its loop with the current monotonic time.
pub struct CaptureSequencer {
    request: CaptureRequest,
    session_dir: PathBuf,
    jpeg_quality: u8,
    preview_interval_ms: u64,
    started_ms: u64,
    phase: Phase,
    last_preview_ms: Option<u64>,
    last_shot_ms: Option<u64>,
    photos: Vec<PhotoArtifact>,
    abort: Option<BurstAbort>,
    cancel: CancellationToken,
}

impl CaptureSequencer {
    pub fn new(
        request: CaptureRequest,
        session_dir: PathBuf,
        jpeg_quality: u8,
        preview_interval_ms: u64,
        now_ms: u64,
        cancel: CancellationToken,
    ) -> Self {
        info!(
            "Starting burst: {} shots, {}s countdown, {}ms interval",
            request.shot_count, request.countdown_seconds, request.interval_ms
        );

        Self {
            request,
            session_dir,
            jpeg_quality,
            preview_interval_ms,
            started_ms: now_ms,
            phase: Phase::Countdown,
            last_preview_ms: None,
            last_shot_ms: None,
            photos: Vec::new(),
            abort: None,
            cancel,
        }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn photos(&self) -> &[PhotoArtifact] {
        &self.photos
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Countdown index at `now_ms`, or None once it has dropped below zero
    pub fn countdown_index(&self, now_ms: u64) -> Option<u32> {
        let elapsed_secs = now_ms.saturating_sub(self.started_ms) / 1000;
        let index = self.request.countdown_seconds as i64 - 1 - elapsed_secs as i64;
        (index >= 0).then_some(index as u32)
    }

    pub fn tick(&mut self, camera: &mut CameraResourceManager, now_ms: u64) -> SequencerTick {
        let mut tick = SequencerTick::default();

        if self.phase == Phase::Done {
            tick.finished = true;
            return tick;
        }

        if self.cancel.is_cancelled() {
            info!("Burst cancelled after {} photos", self.photos.len());
            self.finish_with(Some(BurstAbort::Cancelled));
            tick.finished = true;
            return tick;
        }

        if self.phase == Phase::Countdown {
            match self.countdown_index(now_ms) {
                Some(index) => {
                    tick.counting = true;
                    tick.countdown = Some(index);
                    self.refresh_preview(camera, now_ms, &mut tick);
                    return tick;
                }
                None => {
                    debug!("Countdown finished");
                    self.phase = Phase::Capturing;
                }
            }
        }

        // First shot goes immediately, later ones wait for the interval
        let due = match self.last_shot_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.request.interval_ms,
        };

        if due {
            match self.take_shot(camera) {
                Ok(photo) => {
                    self.last_shot_ms = Some(now_ms);
                    self.photos.push(photo.clone());
                    tick.photo = Some(photo);
                    if self.photos.len() >= self.request.shot_count as usize {
                        info!("Burst complete: {} photos", self.photos.len());
                        self.finish_with(None);
                    }
                }
                Err(abort) => {
                    error!(
                        "Burst aborted after {} of {} photos: {}",
                        self.photos.len(),
                        self.request.shot_count,
                        abort
                    );
                    self.finish_with(Some(abort));
                }
            }
        }

        tick.finished = self.phase == Phase::Done;
        tick
    }

    pub fn finish(self) -> BurstResult {
        BurstResult {
            photos: self.photos,
            requested: self.request.shot_count,
            abort: self.abort,
        }
    }

    fn refresh_preview(
        &mut self,
        camera: &mut CameraResourceManager,
        now_ms: u64,
        tick: &mut SequencerTick,
    ) {
        let due = match self.last_preview_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.preview_interval_ms,
        };
        if !due {
            return;
        }
        self.last_preview_ms = Some(now_ms);

        match camera.capture(true, None, None) {
            Ok(frame) => tick.preview = Some(frame),
            Err(PhotoboothError::Resource(e)) => {
                error!("Camera failed during countdown: {}", e);
                self.finish_with(Some(BurstAbort::Resource(e.to_string())));
                tick.counting = false;
                tick.countdown = None;
                tick.finished = true;
            }
            Err(e) => {
                // A dropped preview frame is not worth aborting for
                warn!("Preview frame skipped: {}", e);
                tick.warning = Some(format!("Preview frame skipped: {}", e));
            }
        }
    }

    fn take_shot(&mut self, camera: &mut CameraResourceManager) -> Result<PhotoArtifact, BurstAbort> {
        let index = self.photos.len() as u32 + 1;
        let (width, height) = match self.request.shot_size {
            Some(size) => (Some(size.width), Some(size.height)),
            None => (None, None),
        };

        let frame = camera.capture(false, width, height).map_err(|e| match e {
            PhotoboothError::Resource(e) => BurstAbort::Resource(e.to_string()),
            other => BurstAbort::Capture(other.to_string()),
        })?;

        let path = self.session_dir.join(format!("photo_{}.jpg", index));
        self.save_photo(&frame, &path)
            .map_err(|e| BurstAbort::Capture(e.to_string()))?;

        info!(
            "Captured photo {}/{} ({}x{})",
            index,
            self.request.shot_count,
            frame.width(),
            frame.height()
        );

        Ok(PhotoArtifact {
            path,
            width: frame.width(),
            height: frame.height(),
            index,
        })
    }

    /// Written straight to disk so an interrupted burst leaves its photos
    fn save_photo(&self, frame: &RgbImage, path: &Path) -> Result<(), CaptureError> {
        let save_error = |source: image::ImageError| CaptureError::Save {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(|e| save_error(image::ImageError::IoError(e)))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
            .encode(frame.as_raw(), frame.width(), frame.height(), ColorType::Rgb8)
            .map_err(save_error)?;
        writer
            .flush()
            .map_err(|e| save_error(image::ImageError::IoError(e)))?;

        Ok(())
    }

    fn finish_with(&mut self, abort: Option<BurstAbort>) {
        self.phase = Phase::Done;
        self.abort = abort;
    }
}
