use super::driver::{CameraDriver, SensorInfo};
use super::profile::{CaptureProfile, Resolution};
use crate::error::{CaptureError, ResourceError};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Marker painted into the top-left corner of every synthetic frame,
/// so mirroring is observable.
pub const MOCK_MARKER: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Debug, Default)]
struct MockState {
    configure_calls: u64,
    start_calls: u64,
    stop_calls: u64,
    frames: u64,
    running: bool,
    applied: Option<CaptureProfile>,
    fail_open: bool,
    fail_start: bool,
    fail_configure: bool,
    failing_frames: HashSet<u64>,
}

/// Shared view into a mock driver: counters plus failure injection.
/// Stays usable after the driver itself is boxed into a manager.
#[derive(Debug, Clone, Default)]
pub struct MockCameraHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockCameraHandle {
    pub fn configure_calls(&self) -> u64 {
        self.state.lock().configure_calls
    }

    pub fn start_calls(&self) -> u64 {
        self.state.lock().start_calls
    }

    pub fn stop_calls(&self) -> u64 {
        self.state.lock().stop_calls
    }

    pub fn frames_captured(&self) -> u64 {
        self.state.lock().frames
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn applied_profile(&self) -> Option<CaptureProfile> {
        self.state.lock().applied.clone()
    }

    pub fn fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    pub fn fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    pub fn fail_configure(&self, fail: bool) {
        self.state.lock().fail_configure = fail;
    }

    /// Make the Nth frame request (1-based, counting every capture) fail
    pub fn fail_frame(&self, n: u64) {
        self.state.lock().failing_frames.insert(n);
    }
}

/// Camera driver producing synthetic frames at the applied profile size
pub struct MockCameraDriver {
    sensor: Resolution,
    handle: MockCameraHandle,
}

impl MockCameraDriver {
    pub fn new(sensor: Resolution) -> Self {
        Self {
            sensor,
            handle: MockCameraHandle::default(),
        }
    }

    pub fn handle(&self) -> MockCameraHandle {
        self.handle.clone()
    }
}

impl CameraDriver for MockCameraDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&mut self) -> Result<SensorInfo, ResourceError> {
        let state = self.handle.state.lock();
        if state.fail_open {
            return Err(ResourceError::DeviceOpen {
                details: "mock device unavailable".to_string(),
            });
        }

        debug!("Mock camera opened with sensor {}", self.sensor);
        Ok(SensorInfo {
            resolution: self.sensor,
            model: "Mock Camera".to_string(),
        })
    }

    fn configure(&mut self, profile: &CaptureProfile) -> Result<(), ResourceError> {
        let mut state = self.handle.state.lock();
        state.configure_calls += 1;
        if state.fail_configure {
            return Err(ResourceError::Configuration {
                profile: profile.mode.to_string(),
                details: "mock configure failure".to_string(),
            });
        }

        trace!("Mock camera configured: {:?}", profile);
        state.applied = Some(profile.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), ResourceError> {
        let mut state = self.handle.state.lock();
        state.start_calls += 1;
        if state.fail_start {
            return Err(ResourceError::Start {
                details: "mock start failure".to_string(),
            });
        }

        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ResourceError> {
        let mut state = self.handle.state.lock();
        state.stop_calls += 1;
        state.running = false;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let mut state = self.handle.state.lock();
        state.frames += 1;
        let frame_number = state.frames;

        if state.failing_frames.contains(&frame_number) {
            return Err(CaptureError::Frame {
                details: format!("injected failure on frame {}", frame_number),
            });
        }

        if !state.running {
            return Err(CaptureError::Frame {
                details: "camera is not running".to_string(),
            });
        }

        let profile = state.applied.as_ref().ok_or_else(|| CaptureError::Frame {
            details: "no profile applied".to_string(),
        })?;

        let Resolution { width, height } = profile.resolution;
        let shade = ((frame_number * 37) % 200) as u8;
        let mut frame = RgbImage::from_pixel(width, height, Rgb([shade, 96, 200 - shade]));
        if width > 0 && height > 0 {
            let marker_x = if profile.hflip { width - 1 } else { 0 };
            frame.put_pixel(marker_x, 0, MOCK_MARKER);
        }

        Ok(frame)
    }
}
