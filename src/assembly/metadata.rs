use crate::config::MetadataConfig;
use crate::error::MetadataError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Descriptive fields attached to every finished artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub title: String,
    pub author: String,
    pub comment: String,
    pub timestamp: String,
    pub camera_make: String,
    pub camera_model: String,
    pub software: String,
    pub keywords: String,
}

impl ArtifactMetadata {
    pub fn from_config(config: &MetadataConfig, tz: Tz, now: DateTime<Utc>) -> Self {
        Self {
            title: config.title.clone(),
            author: config.author.clone(),
            comment: config.comment.clone(),
            timestamp: now.with_timezone(&tz).to_rfc3339(),
            camera_make: config.camera_make.clone(),
            camera_model: config.camera_model.clone(),
            software: config.software.clone(),
            keywords: config.keywords.clone(),
        }
    }
}

/// Attaches metadata to a finished artifact file
pub trait MetadataWriter: Send + Sync {
    fn attach(&self, path: &Path, metadata: &ArtifactMetadata) -> Result<(), MetadataError>;
}

/// Writes `<artifact>.json` next to the artifact
#[derive(Debug, Clone, Default)]
pub struct SidecarMetadataWriter;

impl SidecarMetadataWriter {
    pub fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".json");
        PathBuf::from(name)
    }
}

impl MetadataWriter for SidecarMetadataWriter {
    fn attach(&self, path: &Path, metadata: &ArtifactMetadata) -> Result<(), MetadataError> {
        if !path.is_file() {
            return Err(MetadataError::MissingArtifact {
                path: path.to_path_buf(),
            });
        }

        let metadata_json = serde_json::to_string_pretty(metadata)?;
        let sidecar = Self::sidecar_path(path);
        fs::write(&sidecar, metadata_json)?;

        debug!("Saved metadata to {}", sidecar.display());
        Ok(())
    }
}

pub(crate) fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid metadata timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}
