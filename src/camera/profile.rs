use serde::{Deserialize, Serialize};
use std::fmt;

/// Width/height pair in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Round both dimensions down to the nearest even value; the encoder
    /// rejects odd sizes.
    pub fn even(self) -> Self {
        Self {
            width: self.width & !1,
            height: self.height & !1,
        }
    }

    pub fn aspect_ratio(self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which of the two camera profiles a capture runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureMode {
    Preview,
    Still,
}

impl CaptureMode {
    pub fn from_preview_flag(for_preview: bool) -> Self {
        if for_preview {
            CaptureMode::Preview
        } else {
            CaptureMode::Still
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Preview => write!(f, "preview"),
            CaptureMode::Still => write!(f, "still"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Bgr888,
    Rgb888,
}

impl PixelLayout {
    /// GStreamer raw video format name
    pub fn gst_format(self) -> &'static str {
        match self {
            PixelLayout::Bgr888 => "BGR",
            PixelLayout::Rgb888 => "RGB",
        }
    }
}

/// Immutable camera configuration applied on reconfiguration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureProfile {
    pub mode: CaptureMode,
    pub resolution: Resolution,
    pub buffer_count: u32,
    pub pixel_layout: PixelLayout,
    pub hflip: bool,
}

impl CaptureProfile {
    /// Preview profile: fit the sensor aspect ratio into the preview box,
    /// clamp the width, then derive the height from the sensor aspect.
    pub fn preview(
        sensor: Resolution,
        preview_box: Resolution,
        max_width: u32,
        buffer_count: u32,
        hflip: bool,
    ) -> Self {
        let sensor_ratio = sensor.aspect_ratio();
        let fitted_width = if sensor_ratio > preview_box.aspect_ratio() {
            preview_box.width
        } else {
            (preview_box.height as f64 * sensor_ratio) as u32
        };

        let width = fitted_width.min(max_width).max(2);
        let height = ((width as u64 * sensor.height as u64) / sensor.width.max(1) as u64) as u32;

        Self {
            mode: CaptureMode::Preview,
            resolution: Resolution::new(width, height.max(2)).even(),
            buffer_count,
            pixel_layout: PixelLayout::Rgb888,
            hflip,
        }
    }

    /// Still profile at full sensor resolution
    pub fn still(sensor: Resolution, buffer_count: u32) -> Self {
        Self {
            mode: CaptureMode::Still,
            resolution: sensor.even(),
            buffer_count,
            pixel_layout: PixelLayout::Rgb888,
            hflip: false,
        }
    }

    /// Same profile with a different output size
    pub fn with_resolution(&self, resolution: Resolution) -> Self {
        Self {
            resolution,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_rounding() {
        assert_eq!(Resolution::new(1093, 821).even(), Resolution::new(1092, 820));
        assert_eq!(Resolution::new(1640, 1232).even(), Resolution::new(1640, 1232));
        assert_eq!(Resolution::new(1, 1).even(), Resolution::new(0, 0));
    }

    #[test]
    fn test_preview_profile_preserves_sensor_aspect() {
        let profile = CaptureProfile::preview(
            Resolution::new(3280, 2464),
            Resolution::new(640, 480),
            640,
            2,
            true,
        );
        // 3280x2464 is marginally narrower than 4:3, so the box height binds
        assert_eq!(profile.resolution, Resolution::new(638, 478));
        assert!(profile.hflip);

        let wide = CaptureProfile::preview(
            Resolution::new(1920, 1080),
            Resolution::new(640, 480),
            640,
            2,
            false,
        );
        assert_eq!(wide.resolution, Resolution::new(640, 360));
    }

    #[test]
    fn test_preview_width_clamped() {
        let profile = CaptureProfile::preview(
            Resolution::new(4000, 3000),
            Resolution::new(1600, 1200),
            640,
            2,
            true,
        );
        assert_eq!(profile.resolution.width, 640);
        assert_eq!(profile.resolution.height, 480);
    }

    #[test]
    fn test_tall_sensor_fits_box_height() {
        let profile = CaptureProfile::preview(
            Resolution::new(1000, 2000),
            Resolution::new(640, 480),
            640,
            2,
            true,
        );
        assert_eq!(profile.resolution, Resolution::new(240, 480));
    }
}
