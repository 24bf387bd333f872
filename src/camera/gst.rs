use super::driver::{CameraDriver, SensorInfo};
use super::profile::{CaptureProfile, PixelLayout, Resolution};
use crate::error::{CaptureError, ResourceError};
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use tracing::{debug, info, trace, warn};

const PULL_TIMEOUT_SECS: u64 = 5;

/// libcamera capture through a GStreamer appsink pipeline. Each profile
/// change tears the pipeline down and builds a new one.
pub struct GstCameraDriver {
    source: String,
    sensor: Resolution,
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    profile: Option<CaptureProfile>,
    running: bool,
}

impl GstCameraDriver {
    pub fn new(source: String, sensor: Resolution) -> Self {
        Self {
            source,
            sensor,
            pipeline: None,
            appsink: None,
            profile: None,
            running: false,
        }
    }

    fn build_pipeline_string(&self, profile: &CaptureProfile) -> String {
        let flip = if profile.hflip {
            "horizontal-flip"
        } else {
            "none"
        };

        format!(
            "{} ! videoconvert ! videoscale ! videoflip method={} ! \
             video/x-raw,format={},width={},height={} ! \
             appsink name=sink max-buffers={} drop=true sync=false emit-signals=false",
            self.source,
            flip,
            profile.pixel_layout.gst_format(),
            profile.resolution.width,
            profile.resolution.height,
            profile.buffer_count.max(1)
        )
    }

    fn teardown(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
        self.appsink = None;
    }
}

impl CameraDriver for GstCameraDriver {
    fn name(&self) -> &str {
        "libcamera"
    }

    fn open(&mut self) -> Result<SensorInfo, ResourceError> {
        gstreamer::init().map_err(|e| ResourceError::DeviceOpen {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        if gstreamer::ElementFactory::find(self.source.split_whitespace().next().unwrap_or(""))
            .is_none()
        {
            return Err(ResourceError::DeviceOpen {
                details: format!("GStreamer element '{}' not found", self.source),
            });
        }

        Ok(SensorInfo {
            resolution: self.sensor,
            model: "Camera Module".to_string(),
        })
    }

    fn configure(&mut self, profile: &CaptureProfile) -> Result<(), ResourceError> {
        let was_running = self.running;
        self.teardown();

        let pipeline_desc = self.build_pipeline_string(profile);
        debug!("Creating GStreamer pipeline: {}", pipeline_desc);

        let configuration_error = |details: String| ResourceError::Configuration {
            profile: profile.mode.to_string(),
            details,
        };

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| configuration_error(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| configuration_error("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| configuration_error("Failed to get appsink".to_string()))?
            .downcast::<AppSink>()
            .map_err(|_| configuration_error("Failed to downcast to AppSink".to_string()))?;

        if was_running {
            pipeline
                .set_state(gstreamer::State::Playing)
                .map_err(|e| configuration_error(format!("Failed to resume pipeline: {}", e)))?;
        }

        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        self.profile = Some(profile.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), ResourceError> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| ResourceError::Start {
            details: "Pipeline not configured".to_string(),
        })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| ResourceError::Start {
                details: format!("Failed to start pipeline: {}", e),
            })?;

        info!("GStreamer camera pipeline playing");
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ResourceError> {
        if let Some(pipeline) = &self.pipeline {
            pipeline
                .set_state(gstreamer::State::Null)
                .map_err(|e| ResourceError::Stop {
                    details: format!("Failed to stop pipeline: {}", e),
                })?;
        }
        self.running = false;
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CaptureError> {
        let appsink = self.appsink.as_ref().ok_or_else(|| CaptureError::Frame {
            details: "Pipeline not configured".to_string(),
        })?;

        let sample = appsink
            .try_pull_sample(gstreamer::ClockTime::from_seconds(PULL_TIMEOUT_SECS))
            .ok_or_else(|| CaptureError::Frame {
                details: format!("No frame within {}s", PULL_TIMEOUT_SECS),
            })?;

        let buffer = sample.buffer().ok_or_else(|| CaptureError::Frame {
            details: "No buffer in sample".to_string(),
        })?;
        let caps = sample.caps().ok_or_else(|| CaptureError::Frame {
            details: "No caps in sample".to_string(),
        })?;
        let video_info = VideoInfo::from_caps(caps).map_err(|e| CaptureError::Frame {
            details: format!("Failed to get video info: {}", e),
        })?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_bytes = width as usize * 3;

        let map = buffer.map_readable().map_err(|e| CaptureError::Frame {
            details: format!("Failed to map buffer: {}", e),
        })?;
        let data = map.as_slice();

        if height == 0
            || stride < row_bytes
            || data.len() < stride * (height as usize - 1) + row_bytes
        {
            return Err(CaptureError::Frame {
                details: format!(
                    "Buffer too small for {}x{} (stride {}, {} bytes)",
                    width,
                    height,
                    stride,
                    data.len()
                ),
            });
        }

        // Rows may be padded, repack tightly
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }

        let bgr = self
            .profile
            .as_ref()
            .map(|p| p.pixel_layout == PixelLayout::Bgr888)
            .unwrap_or(false);
        if bgr {
            for px in pixels.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
        }

        trace!("Pulled {}x{} frame ({} bytes)", width, height, data.len());

        RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            warn!("Frame buffer size mismatch for {}x{}", width, height);
            CaptureError::Frame {
                details: "Frame buffer size mismatch".to_string(),
            }
        })
    }
}

impl Drop for GstCameraDriver {
    fn drop(&mut self) {
        self.teardown();
    }
}
