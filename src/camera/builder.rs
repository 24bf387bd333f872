use super::driver::CameraDriver;
use super::manager::{CameraResourceManager, CameraSettings};
use super::mock::MockCameraDriver;
use super::profile::Resolution;
use crate::config::CameraConfig;
use crate::error::{PhotoboothError, ResourceError, Result};
use std::time::Duration;

/// Builder for the camera resource manager
pub struct CameraResourceManagerBuilder {
    config: Option<CameraConfig>,
    driver: Option<Box<dyn CameraDriver>>,
}

impl CameraResourceManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            driver: None,
        }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a specific driver instead of the one named in the config
    pub fn driver(mut self, driver: Box<dyn CameraDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn build(self) -> Result<CameraResourceManager> {
        let config = self
            .config
            .ok_or_else(|| PhotoboothError::system("Camera configuration must be specified"))?;

        let driver = match self.driver {
            Some(driver) => driver,
            None => build_driver(&config)?,
        };

        Ok(CameraResourceManager::new(driver, settings_from_config(&config)))
    }
}

impl Default for CameraResourceManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn settings_from_config(config: &CameraConfig) -> CameraSettings {
    CameraSettings {
        preview_box: config.preview_box.into(),
        preview_max_width: config.preview_max_width,
        buffer_count: config.buffer_count,
        hflip_preview: config.hflip_preview,
        stabilization_delay: Duration::from_millis(config.stabilization_delay_ms),
    }
}

/// Instantiate the driver named by `camera.driver`
pub fn build_driver(config: &CameraConfig) -> Result<Box<dyn CameraDriver>> {
    match config.driver.to_lowercase().as_str() {
        "mock" => Ok(Box::new(MockCameraDriver::new(Resolution::from(
            config.sensor_resolution,
        )))),
        #[cfg(all(feature = "camera", target_os = "linux"))]
        "libcamera" | "gstreamer" => Ok(Box::new(super::gst::GstCameraDriver::new(
            config.source.clone(),
            Resolution::from(config.sensor_resolution),
        ))),
        other => Err(ResourceError::DriverUnavailable {
            driver: other.to_string(),
        }
        .into()),
    }
}
