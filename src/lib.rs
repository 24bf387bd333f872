pub mod app;
pub mod archive;
pub mod assembly;
pub mod camera;
pub mod config;
pub mod console;
pub mod error;
pub mod keyboard_input;
pub mod sequencer;

pub use app::{BoothPhase, BoothRequest, BoothView, Orchestrator};
pub use archive::{ArchiveUploadWorker, Severity, StatusUpdate, UploadTask, UsbArchiver};
pub use assembly::{AssembledArtifact, AssemblyPipeline, CaptureKind};
pub use camera::{CameraResourceManager, CameraResourceManagerBuilder, CaptureMode, Resolution};
pub use config::{BoothMode, PhotoboothConfig};
pub use error::{PhotoboothError, Result};
pub use sequencer::{CaptureSequencer, Clock, ManualClock, MonotonicClock};
