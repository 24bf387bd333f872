use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhotoboothError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("System error: {message}")]
    System { message: String },
}

impl PhotoboothError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Camera open/start/stop/reconfigure failures. Any of these leaves the
/// session `Failed` until the manager is initialized again.
#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    #[error("Failed to open camera device: {details}")]
    DeviceOpen { details: String },

    #[error("Failed to apply {profile} profile: {details}")]
    Configuration { profile: String, details: String },

    #[error("Failed to start camera: {details}")]
    Start { details: String },

    #[error("Failed to stop camera: {details}")]
    Stop { details: String },

    #[error("Camera is not initialized")]
    NotInitialized,

    #[error("Camera is in a failed state and must be re-initialized")]
    Failed,

    #[error("Capture size {width}x{height} is too small")]
    InvalidSize { width: u32, height: u32 },

    #[error("Camera driver '{driver}' is not available in this build")]
    DriverUnavailable { driver: String },
}

/// A single frame could not be acquired or persisted.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Frame acquisition failed: {details}")]
    Frame { details: String },

    #[error("Failed to save photo {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to prepare session directory {path}: {source}")]
    SessionDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("No photos to assemble")]
    NoPhotos,

    #[error("Collage needs a perfect-square photo count, got {count}")]
    NotPerfectSquare { count: usize },

    #[error("Burst incomplete: expected {expected} photos, got {actual}")]
    IncompleteBurst { expected: usize, actual: usize },

    #[error("Source photo missing: {path}")]
    MissingSource { path: PathBuf },

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode {path}: {details}")]
    Encode { path: PathBuf, details: String },

    #[error("Animation encoding failed and fallback produced no output: {details}")]
    FallbackFailed { details: String },
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Upload hook is misconfigured: {details}")]
    Misconfigured { details: String },
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to scan mount root {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Artifact does not exist: {path}")]
    MissingArtifact { path: PathBuf },

    #[error("Failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write metadata: {0}")]
    Write(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PhotoboothError>;
