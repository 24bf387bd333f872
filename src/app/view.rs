use crate::archive::Severity;
use crate::assembly::AssembledArtifact;
use image::RgbImage;

/// Narrow presentation interface the orchestrator reports through.
/// Only ever called from the cooperative loop.
pub trait BoothView {
    fn report_status(&mut self, message: &str, severity: Severity);

    /// `None` clears the countdown
    fn show_countdown(&mut self, remaining: Option<u32>);

    fn show_preview(&mut self, frame: &RgbImage);

    fn show_artifact(&mut self, artifact: &AssembledArtifact);
}
