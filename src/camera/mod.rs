mod builder;
mod driver;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod manager;
mod mock;
mod profile;
#[cfg(test)]
mod tests;

pub use builder::{build_driver, settings_from_config, CameraResourceManagerBuilder};
pub use driver::{CameraDriver, SensorInfo};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstCameraDriver;
pub use manager::{
    needs_reconfigure, AppliedConfig, CameraResourceManager, CameraSession, CameraSettings,
    CameraStats, SessionState,
};
pub use mock::{MockCameraDriver, MockCameraHandle, MOCK_MARKER};
pub use profile::{CaptureMode, CaptureProfile, PixelLayout, Resolution};
