mod animation;
mod collage;
mod metadata;

pub use metadata::{ArtifactMetadata, MetadataWriter, SidecarMetadataWriter};

use crate::camera::Resolution;
use crate::config::{AssemblyConfig, CaptureConfig, MetadataConfig};
use crate::error::AssemblyError;
use chrono::{Local, NaiveDateTime, Utc};
use chrono_tz::Tz;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// What a burst is assembled into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Collage,
    Animation,
}

impl CaptureKind {
    pub fn extension(self) -> &'static str {
        match self {
            CaptureKind::Collage => "jpg",
            CaptureKind::Animation => "gif",
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureKind::Collage => write!(f, "collage"),
            CaptureKind::Animation => write!(f, "animation"),
        }
    }
}

/// Side length `k` of a `k×k` grid, if `count` is a non-zero perfect square
pub fn grid_side(count: usize) -> Option<u32> {
    if count == 0 {
        return None;
    }
    let side = (count as f64).sqrt().round() as usize;
    (side * side == count).then_some(side as u32)
}

/// Finished artifact in the archive directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledArtifact {
    pub kind: CaptureKind,
    pub path: PathBuf,
    pub source_count: usize,
}

/// One assembly request
#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub kind: CaptureKind,
    /// Ordered source photos
    pub photos: Vec<PathBuf>,
    /// Shot count the burst was asked for
    pub expected: usize,
    pub overlay: Option<PathBuf>,
    /// Overrides the default animation frame period
    pub frame_period_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AssemblySettings {
    pub archive_dir: PathBuf,
    pub jpeg_quality: u8,
    pub animation_max_size: Resolution,
    pub frame_period_ms: u64,
    pub fallback_command: String,
}

impl AssemblySettings {
    pub fn from_config(capture: &CaptureConfig, assembly: &AssemblyConfig) -> Self {
        Self {
            archive_dir: PathBuf::from(&capture.archive_dir),
            jpeg_quality: capture.jpeg_quality,
            animation_max_size: assembly.animation_max_size.into(),
            frame_period_ms: assembly.frame_period_ms,
            fallback_command: assembly.fallback_command.clone(),
        }
    }
}

/// Turns a list of photos into one archived artifact
pub struct AssemblyPipeline {
    settings: AssemblySettings,
    metadata: MetadataConfig,
    timezone: Tz,
    writer: Arc<dyn MetadataWriter>,
}

impl AssemblyPipeline {
    pub fn new(
        settings: AssemblySettings,
        metadata: MetadataConfig,
        writer: Arc<dyn MetadataWriter>,
    ) -> Self {
        let timezone = metadata::resolve_timezone(&metadata.timezone);
        Self {
            settings,
            metadata,
            timezone,
            writer,
        }
    }

    pub fn settings(&self) -> &AssemblySettings {
        &self.settings
    }

    pub fn assemble(&self, job: &AssemblyJob) -> Result<AssembledArtifact, AssemblyError> {
        if job.photos.is_empty() {
            return Err(AssemblyError::NoPhotos);
        }

        // A collage with holes is never presented as a finished artifact
        if job.kind == CaptureKind::Collage && job.photos.len() != job.expected {
            return Err(AssemblyError::IncompleteBurst {
                expected: job.expected,
                actual: job.photos.len(),
            });
        }
        if job.kind == CaptureKind::Collage && grid_side(job.photos.len()).is_none() {
            return Err(AssemblyError::NotPerfectSquare {
                count: job.photos.len(),
            });
        }

        if let Some(missing) = job.photos.iter().find(|path| !path.is_file()) {
            return Err(AssemblyError::MissingSource {
                path: missing.clone(),
            });
        }

        fs::create_dir_all(&self.settings.archive_dir).map_err(|e| AssemblyError::Encode {
            path: self.settings.archive_dir.clone(),
            details: format!("cannot create archive directory: {}", e),
        })?;
        let output = artifact_path(
            &self.settings.archive_dir,
            job.kind,
            Local::now().naive_local(),
        );

        info!(
            "Assembling {} from {} photos into {}",
            job.kind,
            job.photos.len(),
            output.display()
        );

        match job.kind {
            CaptureKind::Collage => {
                collage::assemble_collage(
                    &job.photos,
                    job.overlay.as_deref(),
                    &output,
                    self.settings.jpeg_quality,
                )?;
            }
            CaptureKind::Animation => {
                animation::assemble_animation(
                    &job.photos,
                    self.settings.animation_max_size,
                    job.frame_period_ms.unwrap_or(self.settings.frame_period_ms),
                    &output,
                    &self.settings.fallback_command,
                )?;
            }
        }

        let metadata = ArtifactMetadata::from_config(&self.metadata, self.timezone, Utc::now());
        if let Err(e) = self.writer.attach(&output, &metadata) {
            warn!("Failed to attach metadata to {}: {}", output.display(), e);
        }

        Ok(AssembledArtifact {
            kind: job.kind,
            path: output,
            source_count: job.photos.len(),
        })
    }
}

/// `photo_<YYYYmmdd_HHMMSS>.<ext>` in `dir`, suffixed when the name is taken
pub fn artifact_path(dir: &Path, kind: CaptureKind, timestamp: NaiveDateTime) -> PathBuf {
    let stem = format!("photo_{}", timestamp.format("%Y%m%d_%H%M%S"));
    let ext = kind.extension();

    let candidate = dir.join(format!("{}.{}", stem, ext));
    if !candidate.exists() {
        return candidate;
    }

    let mut n = 1;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, n, ext));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

pub(crate) fn load_photo(path: &Path) -> Result<DynamicImage, AssemblyError> {
    if !path.is_file() {
        return Err(AssemblyError::MissingSource {
            path: path.to_path_buf(),
        });
    }
    image::open(path).map_err(|source| AssemblyError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
