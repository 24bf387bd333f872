use crate::app::BoothView;
use crate::archive::Severity;
use crate::assembly::AssembledArtifact;
use image::RgbImage;
use std::io::{self, Write};
use tracing::{debug, info, warn};

/// Line-oriented terminal front end. Writes `\r\n` so output stays
/// readable while the keyboard is in raw mode.
pub struct TerminalView<W: Write> {
    out: W,
    previews: u64,
}

impl TerminalView<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self { out, previews: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        let result = write!(self.out, "{}\r\n", text).and_then(|_| self.out.flush());
        if let Err(e) = result {
            warn!("Failed to write to terminal: {}", e);
        }
    }
}

impl<W: Write> BoothView for TerminalView<W> {
    fn report_status(&mut self, message: &str, severity: Severity) {
        info!(%severity, "{}", message);
        let prefix = match severity {
            Severity::Info => "",
            Severity::Warning => "! ",
            Severity::Error => "!! ",
        };
        self.line(&format!("{}{}", prefix, message));
    }

    fn show_countdown(&mut self, remaining: Option<u32>) {
        match remaining {
            Some(0) => self.line("  Smile!"),
            Some(n) => self.line(&format!("  {}...", n)),
            None => {}
        }
    }

    fn show_preview(&mut self, frame: &RgbImage) {
        self.previews += 1;
        debug!(
            "Preview frame {} ({}x{})",
            self.previews,
            frame.width(),
            frame.height()
        );
    }

    fn show_artifact(&mut self, artifact: &AssembledArtifact) {
        self.line(&format!(
            "Saved {} of {} photos: {}",
            artifact.kind,
            artifact.source_count,
            artifact.path.display()
        ));
    }
}

/// Key help printed when the interactive loop starts
pub fn key_help(modes: &[crate::config::BoothMode]) -> Vec<String> {
    let mut lines: Vec<String> = modes
        .iter()
        .map(|mode| {
            format!(
                "  [{}] {} ({} x{})",
                mode.key, mode.name, mode.kind, mode.shot_count
            )
        })
        .collect();
    lines.push("  [e] email last photo  [c] cancel  [q] quit".to_string());
    lines
}
