use super::types::{BoothPhase, BoothRequest, OrchestratorSettings};
use super::view::BoothView;
use crate::archive::{
    status_channel, ArchiveUploadWorker, Severity, StatusQueue, WorkerServices,
};
use crate::assembly::{
    AssembledArtifact, AssemblyJob, AssemblyPipeline, AssemblySettings, CaptureKind,
    SidecarMetadataWriter,
};
use crate::camera::{CameraResourceManager, CameraResourceManagerBuilder, SessionState};
use crate::config::PhotoboothConfig;
use crate::error::Result;
use crate::sequencer::{
    BurstAbort, BurstResult, CaptureRequest, CaptureSequencer, Clock, SessionWorkspace,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything the orchestrator drives
pub struct BoothComponents {
    pub camera: CameraResourceManager,
    pub pipeline: AssemblyPipeline,
    pub worker: ArchiveUploadWorker,
    pub status_queue: StatusQueue,
    pub workspace: SessionWorkspace,
}

struct ActiveBurst {
    request: BoothRequest,
    sequencer: CaptureSequencer,
    cancel: CancellationToken,
}

/// Composes camera, sequencer, assembly and the background worker. Lives
/// on the cooperative loop; `tick` must be called on every iteration.
pub struct Orchestrator {
    camera: CameraResourceManager,
    pipeline: AssemblyPipeline,
    worker: ArchiveUploadWorker,
    status_queue: StatusQueue,
    workspace: SessionWorkspace,
    view: Box<dyn BoothView>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
    phase: BoothPhase,
    active: Option<ActiveBurst>,
    last_countdown: Option<u32>,
    last_artifact: Option<AssembledArtifact>,
    last_idle_preview_ms: Option<u64>,
}

impl Orchestrator {
    pub fn new(
        components: BoothComponents,
        view: Box<dyn BoothView>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            camera: components.camera,
            pipeline: components.pipeline,
            worker: components.worker,
            status_queue: components.status_queue,
            workspace: components.workspace,
            view,
            clock,
            settings,
            phase: BoothPhase::Idle,
            active: None,
            last_countdown: None,
            last_artifact: None,
            last_idle_preview_ms: None,
        }
    }

    /// Wire every component from configuration
    pub fn from_config(
        config: &PhotoboothConfig,
        view: Box<dyn BoothView>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let camera = CameraResourceManagerBuilder::new()
            .config(config.camera.clone())
            .build()?;

        let pipeline = AssemblyPipeline::new(
            AssemblySettings::from_config(&config.capture, &config.assembly),
            config.metadata.clone(),
            Arc::new(SidecarMetadataWriter),
        );

        let (status, status_queue) = status_channel();
        let services = WorkerServices::from_config(config)?;
        let worker = ArchiveUploadWorker::new(config.system.worker_pool_size, services, status)?;

        let components = BoothComponents {
            camera,
            pipeline,
            worker,
            status_queue,
            workspace: SessionWorkspace::new(&config.capture.temp_root),
        };

        Ok(Self::new(
            components,
            view,
            clock,
            OrchestratorSettings::from_config(config),
        ))
    }

    /// Clean the temp root and bring the camera up
    pub fn start(&mut self) -> Result<()> {
        info!("Starting photobooth");
        self.workspace.sweep();

        if let Err(e) = self.camera.initialize() {
            self.view
                .report_status(&format!("Camera unavailable: {}", e), Severity::Error);
            return Err(e);
        }

        self.view.report_status("Ready", Severity::Info);
        Ok(())
    }

    /// Begin a countdown and burst. Returns false when the request was
    /// rejected; the reason has already been reported to the view.
    pub fn request(&mut self, request: BoothRequest) -> bool {
        if self.active.is_some() {
            warn!("Capture requested while a burst is running");
            self.view
                .report_status("Busy: a capture is already in progress", Severity::Warning);
            return false;
        }

        if request.shot_count == 0 {
            self.view
                .report_status("Capture request has no shots", Severity::Warning);
            return false;
        }

        if matches!(
            self.camera.state(),
            SessionState::Uninitialized | SessionState::Failed
        ) {
            if let Err(e) = self.camera.initialize() {
                error!("Camera initialization failed: {}", e);
                self.view
                    .report_status(&format!("Camera unavailable: {}", e), Severity::Error);
                return false;
            }
        }

        let session_dir = match self.workspace.begin_session() {
            Ok(dir) => dir,
            Err(e) => {
                error!("Cannot prepare session: {}", e);
                self.view
                    .report_status(&format!("Cannot prepare session: {}", e), Severity::Error);
                return false;
            }
        };

        info!(
            "Capture requested: {} x{} into {}",
            request.kind,
            request.shot_count,
            session_dir.display()
        );

        let cancel = CancellationToken::new();
        let sequencer = CaptureSequencer::new(
            CaptureRequest {
                shot_count: request.shot_count,
                shot_size: request.per_shot_size,
                interval_ms: request.inter_shot_interval_ms,
                countdown_seconds: request.countdown_seconds,
            },
            session_dir,
            self.settings.jpeg_quality,
            self.settings.preview_interval_ms,
            self.clock.now_ms(),
            cancel.clone(),
        );

        self.active = Some(ActiveBurst {
            request,
            sequencer,
            cancel,
        });
        self.phase = BoothPhase::Capturing;
        self.last_countdown = None;
        self.view.report_status("Get ready!", Severity::Info);
        true
    }

    /// One iteration of the cooperative loop
    pub fn tick(&mut self) {
        self.drain_status();
        let now = self.clock.now_ms();

        match self.phase {
            BoothPhase::Capturing => self.tick_burst(now),
            BoothPhase::Review { until_ms } => {
                if now >= until_ms {
                    debug!("Review finished");
                    self.phase = BoothPhase::Idle;
                    self.view.report_status("Ready", Severity::Info);
                }
            }
            BoothPhase::Idle => self.tick_idle_preview(now),
        }
    }

    /// Ask the running burst to stop at its next tick
    pub fn cancel_burst(&mut self) -> bool {
        match &self.active {
            Some(active) => {
                info!("Cancelling burst");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Email the most recent artifact through the worker pool
    pub fn email_last_artifact(&mut self, recipient: Option<&str>) -> bool {
        if self.active.is_some() {
            self.view
                .report_status("Busy: wait for the capture to finish", Severity::Warning);
            return false;
        }

        let Some(recipient) = recipient
            .map(str::to_string)
            .or_else(|| self.settings.email_recipient.clone())
        else {
            self.view
                .report_status("No email recipient configured", Severity::Warning);
            return false;
        };

        let Some(artifact) = &self.last_artifact else {
            self.view
                .report_status("Nothing to send yet", Severity::Warning);
            return false;
        };

        let queued = self
            .worker
            .dispatch_email(&recipient, &artifact.path)
            .is_some();
        if queued {
            self.view
                .report_status(&format!("Sending to {}", recipient), Severity::Info);
        }
        queued
    }

    /// Forward background status updates to the view
    pub fn drain_status(&mut self) {
        for update in self.status_queue.drain() {
            self.view.report_status(&update.message, update.severity);
        }
    }

    pub fn phase(&self) -> BoothPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == BoothPhase::Idle && self.active.is_none()
    }

    pub fn last_artifact(&self) -> Option<&AssembledArtifact> {
        self.last_artifact.as_ref()
    }

    pub fn camera(&self) -> &CameraResourceManager {
        &self.camera
    }

    pub fn worker(&self) -> &ArchiveUploadWorker {
        &self.worker
    }

    /// Stop everything: cancel any burst, release the camera, drain the
    /// worker pool and clean the temp root.
    pub fn shutdown(&mut self, timeout: Duration) {
        info!("Shutting down photobooth");

        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            warn!(
                "Discarding burst with {} photos at shutdown",
                active.sequencer.photos().len()
            );
        }

        if let Err(e) = self.camera.stop() {
            error!("Failed to stop camera: {}", e);
        }

        if !self.worker.shutdown(timeout) {
            warn!("Some background work did not finish before shutdown");
        }
        self.drain_status();
        self.workspace.sweep();
    }

    fn tick_burst(&mut self, now: u64) {
        let Some(active) = self.active.as_mut() else {
            self.phase = BoothPhase::Idle;
            return;
        };

        let tick = active.sequencer.tick(&mut self.camera, now);

        if tick.countdown != self.last_countdown {
            self.last_countdown = tick.countdown;
            self.view.show_countdown(tick.countdown);
        }
        if let Some(frame) = &tick.preview {
            self.view.show_preview(frame);
        }
        if let Some(warning) = &tick.warning {
            self.view.report_status(warning, Severity::Warning);
        }
        if let Some(photo) = &tick.photo {
            self.view.report_status(
                &format!("Photo {} of {}", photo.index, active.request.shot_count),
                Severity::Info,
            );
        }

        if tick.finished {
            self.complete_burst();
        }
    }

    fn complete_burst(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let request = active.request;
        let result = active.sequencer.finish();

        // Leave the camera stopped between bursts
        if let Err(e) = self.camera.stop() {
            error!("Failed to stop camera after burst: {}", e);
        }
        if self.last_countdown.take().is_some() {
            self.view.show_countdown(None);
        }
        self.phase = BoothPhase::Idle;

        if !self.report_burst(&request, &result) {
            return;
        }

        let job = AssemblyJob {
            kind: request.kind,
            photos: result.photos.iter().map(|p| p.path.clone()).collect(),
            expected: request.shot_count as usize,
            overlay: request.overlay_path.clone(),
            frame_period_ms: request.frame_period_ms,
        };

        self.view.report_status("Processing...", Severity::Info);
        match self.pipeline.assemble(&job) {
            Ok(artifact) => {
                info!("Artifact ready: {}", artifact.path.display());
                self.view.show_artifact(&artifact);
                self.worker.dispatch(&artifact);
                self.last_artifact = Some(artifact);
                self.phase = BoothPhase::Review {
                    until_ms: self.clock.now_ms() + self.settings.review_millis,
                };
            }
            Err(e) => {
                error!("Assembly failed: {}", e);
                self.view
                    .report_status(&format!("Could not assemble photos: {}", e), Severity::Error);
            }
        }
    }

    /// Report how the burst ended. False when there is nothing to assemble.
    fn report_burst(&mut self, request: &BoothRequest, result: &BurstResult) -> bool {
        match &result.abort {
            None => true,
            Some(BurstAbort::Cancelled) => {
                self.view.report_status("Capture cancelled", Severity::Info);
                false
            }
            Some(abort) if result.photos.is_empty() => {
                self.view
                    .report_status(&format!("No photos captured: {}", abort), Severity::Error);
                false
            }
            Some(abort) if request.kind == CaptureKind::Collage => {
                self.view.report_status(
                    &format!(
                        "Capture failed after {} of {} photos: {}",
                        result.photos.len(),
                        result.requested,
                        abort
                    ),
                    Severity::Error,
                );
                false
            }
            Some(abort) => {
                self.view.report_status(
                    &format!(
                        "Capture stopped early ({}), using {} of {} photos",
                        abort,
                        result.photos.len(),
                        result.requested
                    ),
                    Severity::Warning,
                );
                true
            }
        }
    }

    fn tick_idle_preview(&mut self, now: u64) {
        if self.settings.idle_preview_millis == 0 {
            return;
        }
        let due = match self.last_idle_preview_ms {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.settings.idle_preview_millis,
        };
        if !due {
            return;
        }
        self.last_idle_preview_ms = Some(now);

        if matches!(
            self.camera.state(),
            SessionState::Uninitialized | SessionState::Failed
        ) {
            return;
        }

        match self.camera.capture(true, None, None) {
            Ok(frame) => self.view.show_preview(&frame),
            Err(e) => debug!("Idle preview skipped: {}", e),
        }
    }
}
