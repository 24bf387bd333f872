use super::profile::{CaptureProfile, Resolution};
use crate::error::{CaptureError, ResourceError};
use image::RgbImage;

/// Static facts reported by the hardware when it is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub resolution: Resolution,
    pub model: String,
}

/// Low-level camera hardware. Only the resource manager calls into it,
/// always from the cooperative loop thread.
pub trait CameraDriver: Send {
    /// Short backend name for logs
    fn name(&self) -> &str;

    fn open(&mut self) -> Result<SensorInfo, ResourceError>;

    /// Apply a profile. Expensive on real hardware.
    fn configure(&mut self, profile: &CaptureProfile) -> Result<(), ResourceError>;

    fn start(&mut self) -> Result<(), ResourceError>;

    fn stop(&mut self) -> Result<(), ResourceError>;

    /// Grab one frame under the currently applied profile
    fn capture_frame(&mut self) -> Result<RgbImage, CaptureError>;
}
