use super::driver::CameraDriver;
use super::profile::{CaptureMode, CaptureProfile, Resolution};
use crate::error::{ResourceError, Result};
use image::RgbImage;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of the camera hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    PreviewMode,
    StillMode,
    Stopped,
    Failed,
}

/// The (mode, size) pair that was last pushed to the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedConfig {
    pub mode: CaptureMode,
    pub size: Resolution,
}

/// Reconfiguration is needed exactly when the requested (mode, size)
/// differs from what is already applied.
pub fn needs_reconfigure(applied: Option<AppliedConfig>, requested: AppliedConfig) -> bool {
    applied != Some(requested)
}

/// Hardware session owned by the manager
#[derive(Debug, Clone)]
pub struct CameraSession {
    pub state: SessionState,
    pub sensor: Resolution,
    pub model: String,
    pub applied: Option<AppliedConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub reconfigurations: u64,
    pub cheap_captures: u64,
    pub restarts: u64,
}

/// Settings the manager needs to build its profiles
#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub preview_box: Resolution,
    pub preview_max_width: u32,
    pub buffer_count: u32,
    pub hflip_preview: bool,
    pub stabilization_delay: Duration,
}

/// Owns the camera driver and keeps reconfiguration to a minimum.
/// Every call may block for the stabilization delay or a reconfiguration.
pub struct CameraResourceManager {
    driver: Box<dyn CameraDriver>,
    settings: CameraSettings,
    session: CameraSession,
    preview_profile: Option<CaptureProfile>,
    still_profile: Option<CaptureProfile>,
    stats: CameraStats,
}

impl CameraResourceManager {
    pub fn new(driver: Box<dyn CameraDriver>, settings: CameraSettings) -> Self {
        Self {
            driver,
            settings,
            session: CameraSession {
                state: SessionState::Uninitialized,
                sensor: Resolution::new(0, 0),
                model: String::new(),
                applied: None,
            },
            preview_profile: None,
            still_profile: None,
            stats: CameraStats::default(),
        }
    }

    /// Open the device, build both profiles, start in preview mode and
    /// wait for the sensor to settle.
    pub fn initialize(&mut self) -> Result<()> {
        match self.session.state {
            SessionState::PreviewMode | SessionState::StillMode => {
                debug!("Camera already initialized");
                return Ok(());
            }
            SessionState::Stopped | SessionState::Failed => {
                // Release whatever the previous session left running
                let _ = self.driver.stop();
            }
            SessionState::Uninitialized => {}
        }

        info!("Initializing {} camera", self.driver.name());

        let sensor_info = self.driver.open().map_err(|e| self.fail(e))?;
        let sensor = sensor_info.resolution;

        let preview = CaptureProfile::preview(
            sensor,
            self.settings.preview_box,
            self.settings.preview_max_width,
            self.settings.buffer_count,
            self.settings.hflip_preview,
        );
        let still = CaptureProfile::still(sensor, self.settings.buffer_count);

        self.driver.configure(&preview).map_err(|e| self.fail(e))?;
        self.driver.start().map_err(|e| self.fail(e))?;
        self.stabilize();

        info!(
            "Camera '{}' ready: sensor {}, preview {}",
            sensor_info.model, sensor, preview.resolution
        );

        self.session = CameraSession {
            state: SessionState::PreviewMode,
            sensor,
            model: sensor_info.model,
            applied: Some(AppliedConfig {
                mode: CaptureMode::Preview,
                size: sensor.even(),
            }),
        };
        self.preview_profile = Some(preview);
        self.still_profile = Some(still);

        Ok(())
    }

    /// Capture one frame. Unspecified dimensions default to the sensor
    /// resolution and both are rounded down to even values. The hardware
    /// is only reconfigured when (mode, size) differs from the last call.
    pub fn capture(
        &mut self,
        for_preview: bool,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<RgbImage> {
        match self.session.state {
            SessionState::Uninitialized => return Err(ResourceError::NotInitialized.into()),
            SessionState::Failed => return Err(ResourceError::Failed.into()),
            _ => {}
        }

        let size = match (width, height) {
            (Some(w), Some(h)) => Resolution::new(w, h),
            _ => self.session.sensor,
        }
        .even();
        if size.width == 0 || size.height == 0 {
            warn!("Rejecting capture size {:?}x{:?}", width, height);
            return Err(ResourceError::InvalidSize {
                width: width.unwrap_or(0),
                height: height.unwrap_or(0),
            }
            .into());
        }

        if self.session.state == SessionState::Stopped {
            self.restart()?;
        }

        let requested = AppliedConfig {
            mode: CaptureMode::from_preview_flag(for_preview),
            size,
        };

        if needs_reconfigure(self.session.applied, requested) {
            let profile = self.profile_for(requested, width.is_some() && height.is_some())?;
            debug!(
                "Reconfiguring camera to {} {} (was {:?})",
                requested.mode, profile.resolution, self.session.applied
            );

            self.driver.configure(&profile).map_err(|e| self.fail(e))?;
            self.stats.reconfigurations += 1;
            self.session.applied = Some(requested);
            self.session.state = match requested.mode {
                CaptureMode::Preview => SessionState::PreviewMode,
                CaptureMode::Still => SessionState::StillMode,
            };
        } else {
            self.stats.cheap_captures += 1;
        }

        let frame = self.driver.capture_frame()?;
        Ok(frame)
    }

    /// Halt the device. A no-op when already stopped.
    pub fn stop(&mut self) -> Result<()> {
        match self.session.state {
            SessionState::Stopped | SessionState::Uninitialized => {
                debug!("Camera already stopped");
                return Ok(());
            }
            SessionState::Failed => {
                if let Err(e) = self.driver.stop() {
                    warn!("Stopping failed camera: {}", e);
                }
                return Ok(());
            }
            SessionState::PreviewMode | SessionState::StillMode => {}
        }

        info!("Stopping camera");
        self.driver.stop().map_err(|e| self.fail(e))?;
        self.session.state = SessionState::Stopped;
        self.stabilize();

        info!(
            "Camera stopped ({} reconfigurations, {} cheap captures, {} restarts)",
            self.stats.reconfigurations, self.stats.cheap_captures, self.stats.restarts
        );
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    pub fn stats(&self) -> &CameraStats {
        &self.stats
    }

    pub fn preview_profile(&self) -> Option<&CaptureProfile> {
        self.preview_profile.as_ref()
    }

    pub fn still_profile(&self) -> Option<&CaptureProfile> {
        self.still_profile.as_ref()
    }

    /// Restart a stopped device in preview mode
    fn restart(&mut self) -> Result<()> {
        info!("Restarting stopped camera in preview mode");

        let preview = self
            .preview_profile
            .clone()
            .ok_or(ResourceError::NotInitialized)?;

        self.driver.configure(&preview).map_err(|e| self.fail(e))?;
        self.driver.start().map_err(|e| self.fail(e))?;
        self.stabilize();

        self.stats.restarts += 1;
        self.session.state = SessionState::PreviewMode;
        self.session.applied = Some(AppliedConfig {
            mode: CaptureMode::Preview,
            size: self.session.sensor.even(),
        });
        Ok(())
    }

    /// Profile to push for a request. A preview without an explicit size
    /// keeps the preview profile's own resolution.
    fn profile_for(&self, requested: AppliedConfig, explicit_size: bool) -> Result<CaptureProfile> {
        match requested.mode {
            CaptureMode::Preview => {
                let preview = self
                    .preview_profile
                    .as_ref()
                    .ok_or(ResourceError::NotInitialized)?;
                if explicit_size {
                    Ok(preview.with_resolution(requested.size))
                } else {
                    Ok(preview.clone())
                }
            }
            CaptureMode::Still => {
                let still = self
                    .still_profile
                    .as_ref()
                    .ok_or(ResourceError::NotInitialized)?;
                Ok(still.with_resolution(requested.size))
            }
        }
    }

    fn stabilize(&self) {
        if !self.settings.stabilization_delay.is_zero() {
            std::thread::sleep(self.settings.stabilization_delay);
        }
    }

    fn fail(&mut self, error: ResourceError) -> ResourceError {
        error!("Camera resource failure: {}", error);
        self.session.state = SessionState::Failed;
        self.session.applied = None;
        error
    }
}
