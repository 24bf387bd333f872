use crate::assembly::CaptureKind;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Longest animation frame period accepted (one minute)
pub const MAX_FRAME_PERIOD_MS: u64 = 60_000;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PhotoboothConfig {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub assembly: AssemblyConfig,
    pub metadata: MetadataConfig,
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub email: EmailConfig,
    pub system: SystemConfig,
    #[serde(default = "default_modes")]
    pub modes: Vec<BoothMode>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Driver backend: "mock" or "libcamera"
    #[serde(default = "default_camera_driver")]
    pub driver: String,

    /// GStreamer source element used by the libcamera driver
    #[serde(default = "default_camera_source")]
    pub source: String,

    /// Sensor resolution (width, height) reported to the manager
    #[serde(default = "default_sensor_resolution")]
    pub sensor_resolution: (u32, u32),

    /// Preview box the live image is fitted into
    #[serde(default = "default_preview_box")]
    pub preview_box: (u32, u32),

    /// Upper bound on preview width
    #[serde(default = "default_preview_max_width")]
    pub preview_max_width: u32,

    /// Wait after start/stop before frames are trusted
    #[serde(default = "default_stabilization_delay_ms")]
    pub stabilization_delay_ms: u64,

    /// Buffers allocated per profile
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,

    /// Mirror the preview image
    #[serde(default = "default_hflip_preview")]
    pub hflip_preview: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Root under which per-session photo directories are created
    #[serde(default = "default_temp_root")]
    pub temp_root: String,

    /// Directory that keeps assembled artifacts
    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,

    /// JPEG quality for per-shot photos and collages
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Live preview refresh period during the countdown
    #[serde(default = "default_preview_interval_ms")]
    pub preview_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AssemblyConfig {
    /// Bounding box for animation frames (aspect ratio preserved)
    #[serde(default = "default_animation_max_size")]
    pub animation_max_size: (u32, u32),

    /// Display duration of each animation frame
    #[serde(default = "default_frame_period_ms")]
    pub frame_period_ms: u64,

    /// External encoder used when the built-in GIF encoder fails
    #[serde(default = "default_fallback_command")]
    pub fallback_command: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetadataConfig {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_author")]
    pub author: String,

    #[serde(default = "default_comment")]
    pub comment: String,

    #[serde(default = "default_camera_make")]
    pub camera_make: String,

    #[serde(default = "default_camera_model")]
    pub camera_model: String,

    #[serde(default = "default_software")]
    pub software: String,

    #[serde(default = "default_keywords")]
    pub keywords: String,

    /// IANA timezone used to render the metadata timestamp
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArchiveConfig {
    /// Copy artifacts to the first writable removable drive
    #[serde(default = "default_usb_enabled")]
    pub usb_enabled: bool,

    /// Directory whose children are removable-media mount points
    #[serde(default = "default_usb_root")]
    pub usb_root: String,

    /// Mount points containing this marker are never written
    #[serde(default = "default_reserved_marker")]
    pub reserved_marker: String,

    /// Directory created on the drive to hold archived artifacts
    #[serde(default = "default_usb_subdir")]
    pub usb_subdir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct UploadConfig {
    /// Program and arguments; `{file}` is replaced by the artifact path.
    /// Unset disables uploading.
    #[serde(default)]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct EmailConfig {
    /// Program and arguments; `{recipient}` and `{file}` are substituted
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Default recipient for the email key
    #[serde(default)]
    pub recipient: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Background upload/archive workers
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Host loop input poll timeout
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a finished artifact stays on screen
    #[serde(default = "default_review_millis")]
    pub review_millis: u64,

    /// Preview refresh while idle (0 disables)
    #[serde(default = "default_idle_preview_millis")]
    pub idle_preview_millis: u64,

    /// Grace period for background work at shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// A named capture preset bound to a key
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BoothMode {
    pub key: String,
    pub name: String,
    pub kind: CaptureKind,
    pub shot_count: u32,
    /// Per-shot size; full sensor resolution when unset
    #[serde(default)]
    pub photo_size: Option<(u32, u32)>,
    #[serde(default = "default_snap_period_ms")]
    pub snap_period_ms: u64,
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,
    #[serde(default)]
    pub overlay: Option<String>,
    /// Overrides `assembly.frame_period_ms` for this mode
    #[serde(default)]
    pub frame_period_ms: Option<u64>,
}

impl PhotoboothConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("photobooth.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.driver", default_camera_driver())?
            .set_default("camera.source", default_camera_source())?
            .set_default(
                "camera.sensor_resolution",
                vec![default_sensor_resolution().0, default_sensor_resolution().1],
            )?
            .set_default(
                "camera.preview_box",
                vec![default_preview_box().0, default_preview_box().1],
            )?
            .set_default("camera.preview_max_width", default_preview_max_width())?
            .set_default(
                "camera.stabilization_delay_ms",
                default_stabilization_delay_ms() as i64,
            )?
            .set_default("camera.buffer_count", default_buffer_count())?
            .set_default("camera.hflip_preview", default_hflip_preview())?
            .set_default("capture.temp_root", default_temp_root())?
            .set_default("capture.archive_dir", default_archive_dir())?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default(
                "capture.preview_interval_ms",
                default_preview_interval_ms() as i64,
            )?
            .set_default(
                "assembly.animation_max_size",
                vec![
                    default_animation_max_size().0,
                    default_animation_max_size().1,
                ],
            )?
            .set_default("assembly.frame_period_ms", default_frame_period_ms() as i64)?
            .set_default("assembly.fallback_command", default_fallback_command())?
            .set_default("metadata.title", default_title())?
            .set_default("metadata.author", default_author())?
            .set_default("metadata.comment", default_comment())?
            .set_default("metadata.camera_make", default_camera_make())?
            .set_default("metadata.camera_model", default_camera_model())?
            .set_default("metadata.software", default_software())?
            .set_default("metadata.keywords", default_keywords())?
            .set_default("metadata.timezone", default_timezone())?
            .set_default("archive.usb_enabled", default_usb_enabled())?
            .set_default("archive.usb_root", default_usb_root())?
            .set_default("archive.reserved_marker", default_reserved_marker())?
            .set_default("archive.usb_subdir", default_usb_subdir())?
            .set_default(
                "system.worker_pool_size",
                default_worker_pool_size() as i64,
            )?
            .set_default("system.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("system.review_millis", default_review_millis() as i64)?
            .set_default(
                "system.idle_preview_millis",
                default_idle_preview_millis() as i64,
            )?
            .set_default(
                "system.shutdown_timeout_secs",
                default_shutdown_timeout_secs() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // PHOTOBOOTH__CAMERA__DRIVER=mock style overrides
            .add_source(Environment::with_prefix("PHOTOBOOTH").separator("__"))
            .build()?;

        let config: PhotoboothConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.sensor_resolution.0 == 0 || self.camera.sensor_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera sensor resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.preview_box.0 == 0
            || self.camera.preview_box.1 == 0
            || self.camera.preview_max_width == 0
        {
            return Err(ConfigError::Message(
                "Camera preview geometry must be greater than 0".to_string(),
            ));
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if nested_in(&self.capture.archive_dir, &self.capture.temp_root) {
            return Err(ConfigError::Message(format!(
                "Archive directory '{}' must not be inside temp root '{}'",
                self.capture.archive_dir, self.capture.temp_root
            )));
        }

        if self.assembly.frame_period_ms == 0 || self.assembly.frame_period_ms > MAX_FRAME_PERIOD_MS {
            return Err(ConfigError::Message(format!(
                "Animation frame period must be between 1 and {} ms",
                MAX_FRAME_PERIOD_MS
            )));
        }

        if self.assembly.animation_max_size.0 == 0 || self.assembly.animation_max_size.1 == 0 {
            return Err(ConfigError::Message(
                "Animation max size must be greater than 0".to_string(),
            ));
        }

        if self.system.worker_pool_size == 0 {
            return Err(ConfigError::Message(
                "Worker pool size must be greater than 0".to_string(),
            ));
        }

        if self.modes.is_empty() {
            return Err(ConfigError::Message(
                "At least one capture mode must be configured".to_string(),
            ));
        }

        let mut keys = HashSet::new();
        for mode in &self.modes {
            if mode.key.chars().count() != 1 {
                return Err(ConfigError::Message(format!(
                    "Mode '{}' key must be a single character",
                    mode.name
                )));
            }
            if !keys.insert(mode.key.clone()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate mode key '{}'",
                    mode.key
                )));
            }
            if mode.shot_count == 0 {
                return Err(ConfigError::Message(format!(
                    "Mode '{}' shot_count must be greater than 0",
                    mode.name
                )));
            }
            if let Some((w, h)) = mode.photo_size {
                if w < 2 || h < 2 {
                    return Err(ConfigError::Message(format!(
                        "Mode '{}' photo_size must be at least 2x2",
                        mode.name
                    )));
                }
            }
            if let Some(period) = mode.frame_period_ms {
                if period == 0 || period > MAX_FRAME_PERIOD_MS {
                    return Err(ConfigError::Message(format!(
                        "Mode '{}' frame_period_ms must be between 1 and {}",
                        mode.name, MAX_FRAME_PERIOD_MS
                    )));
                }
            }
            if mode.kind == CaptureKind::Collage
                && crate::assembly::grid_side(mode.shot_count as usize).is_none()
            {
                return Err(ConfigError::Message(format!(
                    "Collage mode '{}' needs a perfect-square shot_count, got {}",
                    mode.name, mode.shot_count
                )));
            }
        }

        Ok(())
    }

    /// Find the mode bound to a key
    pub fn mode_for_key(&self, key: char) -> Option<&BoothMode> {
        self.modes
            .iter()
            .find(|mode| mode.key.chars().next() == Some(key))
    }

    /// Find a mode by name (case-insensitive)
    pub fn mode_by_name(&self, name: &str) -> Option<&BoothMode> {
        self.modes
            .iter()
            .find(|mode| mode.name.eq_ignore_ascii_case(name))
    }
}

/// True when `inner` is `outer` or lies below it, ignoring `.` components
fn nested_in(inner: &str, outer: &str) -> bool {
    let normalize = |p: &str| -> PathBuf {
        Path::new(p)
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    };
    normalize(inner).starts_with(normalize(outer))
}

impl Default for PhotoboothConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                driver: default_camera_driver(),
                source: default_camera_source(),
                sensor_resolution: default_sensor_resolution(),
                preview_box: default_preview_box(),
                preview_max_width: default_preview_max_width(),
                stabilization_delay_ms: default_stabilization_delay_ms(),
                buffer_count: default_buffer_count(),
                hflip_preview: default_hflip_preview(),
            },
            capture: CaptureConfig {
                temp_root: default_temp_root(),
                archive_dir: default_archive_dir(),
                jpeg_quality: default_jpeg_quality(),
                preview_interval_ms: default_preview_interval_ms(),
            },
            assembly: AssemblyConfig {
                animation_max_size: default_animation_max_size(),
                frame_period_ms: default_frame_period_ms(),
                fallback_command: default_fallback_command(),
            },
            metadata: MetadataConfig {
                title: default_title(),
                author: default_author(),
                comment: default_comment(),
                camera_make: default_camera_make(),
                camera_model: default_camera_model(),
                software: default_software(),
                keywords: default_keywords(),
                timezone: default_timezone(),
            },
            archive: ArchiveConfig {
                usb_enabled: default_usb_enabled(),
                usb_root: default_usb_root(),
                reserved_marker: default_reserved_marker(),
                usb_subdir: default_usb_subdir(),
            },
            upload: UploadConfig::default(),
            email: EmailConfig::default(),
            system: SystemConfig {
                worker_pool_size: default_worker_pool_size(),
                poll_interval_ms: default_poll_interval_ms(),
                review_millis: default_review_millis(),
                idle_preview_millis: default_idle_preview_millis(),
                shutdown_timeout_secs: default_shutdown_timeout_secs(),
            },
            modes: default_modes(),
        }
    }
}

// Default value functions
fn default_camera_driver() -> String {
    "mock".to_string()
}
fn default_camera_source() -> String {
    "libcamerasrc".to_string()
}
fn default_sensor_resolution() -> (u32, u32) {
    (3280, 2464)
}
fn default_preview_box() -> (u32, u32) {
    (640, 480)
}
fn default_preview_max_width() -> u32 {
    640
}
fn default_stabilization_delay_ms() -> u64 {
    2000
}
fn default_buffer_count() -> u32 {
    2
}
fn default_hflip_preview() -> bool {
    true
}

fn default_temp_root() -> String {
    "./Temp".to_string()
}
fn default_archive_dir() -> String {
    "./Photos".to_string()
}
fn default_jpeg_quality() -> u8 {
    92
}
fn default_preview_interval_ms() -> u64 {
    100
}

fn default_animation_max_size() -> (u32, u32) {
    (800, 600)
}
fn default_frame_period_ms() -> u64 {
    50
}
fn default_fallback_command() -> String {
    "convert".to_string()
}

fn default_title() -> String {
    "Photobooth".to_string()
}
fn default_author() -> String {
    "Photobooth".to_string()
}
fn default_comment() -> String {
    String::new()
}
fn default_camera_make() -> String {
    "Raspberry Pi".to_string()
}
fn default_camera_model() -> String {
    "Raspberry Pi Camera Module v2".to_string()
}
fn default_software() -> String {
    format!("photobooth {}", env!("CARGO_PKG_VERSION"))
}
fn default_keywords() -> String {
    "Photobooth, Raspberry Pi".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_usb_enabled() -> bool {
    true
}
fn default_usb_root() -> String {
    "/media/pi".to_string()
}
fn default_reserved_marker() -> String {
    "SETTINGS".to_string()
}
fn default_usb_subdir() -> String {
    "PhotoboothPhotos".to_string()
}

fn default_worker_pool_size() -> usize {
    2
}
fn default_poll_interval_ms() -> u64 {
    20
}
fn default_review_millis() -> u64 {
    3000
}
fn default_idle_preview_millis() -> u64 {
    0
}
fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_snap_period_ms() -> u64 {
    1000
}
fn default_countdown_seconds() -> u32 {
    5
}

fn default_modes() -> Vec<BoothMode> {
    vec![
        BoothMode {
            key: "1".to_string(),
            name: "single".to_string(),
            kind: CaptureKind::Collage,
            shot_count: 1,
            photo_size: Some((3280, 2464)),
            snap_period_ms: default_snap_period_ms(),
            countdown_seconds: default_countdown_seconds(),
            overlay: Some("logos/single_logo.png".to_string()),
            frame_period_ms: None,
        },
        BoothMode {
            key: "4".to_string(),
            name: "four".to_string(),
            kind: CaptureKind::Collage,
            shot_count: 4,
            photo_size: Some((1640, 1232)),
            snap_period_ms: default_snap_period_ms(),
            countdown_seconds: default_countdown_seconds(),
            overlay: Some("logos/collage_four_square_logo.png".to_string()),
            frame_period_ms: None,
        },
        BoothMode {
            key: "9".to_string(),
            name: "nine".to_string(),
            kind: CaptureKind::Collage,
            shot_count: 9,
            photo_size: Some((1093, 821)),
            snap_period_ms: default_snap_period_ms(),
            countdown_seconds: default_countdown_seconds(),
            overlay: Some("logos/collage_nine_square_logo.png".to_string()),
            frame_period_ms: None,
        },
        BoothMode {
            key: "a".to_string(),
            name: "animation".to_string(),
            kind: CaptureKind::Animation,
            shot_count: 10,
            photo_size: Some((1093, 821)),
            snap_period_ms: 200,
            countdown_seconds: default_countdown_seconds(),
            overlay: None,
            frame_period_ms: Some(50),
        },
    ]
}
