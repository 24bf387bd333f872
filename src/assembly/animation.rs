use super::load_photo;
use crate::camera::Resolution;
use crate::error::AssemblyError;
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{Delay, Frame, RgbaImage};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Encode photos as a looping GIF, falling back to an external encoder when
/// the built-in one fails. Returns the number of frames written.
pub(crate) fn assemble_animation(
    photos: &[PathBuf],
    max_size: Resolution,
    frame_period_ms: u64,
    output: &Path,
    fallback_command: &str,
) -> Result<usize, AssemblyError> {
    if photos.is_empty() {
        return Err(AssemblyError::NoPhotos);
    }

    let frames = photos
        .iter()
        .map(|path| load_frame(path, max_size))
        .collect::<Result<Vec<_>, _>>()?;

    match encode_gif(frames, frame_period_ms, output) {
        Ok(count) => {
            info!("Animation saved to {} ({} frames)", output.display(), count);
            Ok(count)
        }
        Err(details) => {
            warn!(
                "GIF encoder failed ({}), falling back to '{}'",
                details, fallback_command
            );
            let _ = fs::remove_file(output);
            run_fallback(fallback_command, photos, frame_period_ms, output)?;
            info!("Animation saved to {} by fallback encoder", output.display());
            Ok(photos.len())
        }
    }
}

/// Downsize to fit `max_size` keeping aspect; smaller photos are left alone
fn load_frame(path: &Path, max_size: Resolution) -> Result<RgbaImage, AssemblyError> {
    let photo = load_photo(path)?;
    let photo = if photo.width() > max_size.width || photo.height() > max_size.height {
        photo.resize(max_size.width, max_size.height, FilterType::Triangle)
    } else {
        photo
    };
    Ok(photo.to_rgba8())
}

fn encode_gif(frames: Vec<RgbaImage>, frame_period_ms: u64, output: &Path) -> Result<usize, String> {
    let count = frames.len();
    let delay = Delay::from_numer_denom_ms(u32::try_from(frame_period_ms).unwrap_or(u32::MAX), 1);

    let file = File::create(output).map_err(|e| e.to_string())?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .map_err(|e| e.to_string())?;
    encoder
        .encode_frames(
            frames
                .into_iter()
                .map(|frame| Frame::from_parts(frame, 0, 0, delay)),
        )
        .map_err(|e| e.to_string())?;

    debug!("Encoded {} GIF frames", count);
    Ok(count)
}

/// `convert -delay <cs> -loop 0 <photos...> <output>`
pub(crate) fn run_fallback(
    command: &str,
    photos: &[PathBuf],
    frame_period_ms: u64,
    output: &Path,
) -> Result<(), AssemblyError> {
    // GIF delays are in hundredths of a second
    let delay_cs = (frame_period_ms / 10).max(1);

    let result = Command::new(command)
        .arg("-delay")
        .arg(delay_cs.to_string())
        .arg("-loop")
        .arg("0")
        .args(photos)
        .arg(output)
        .output();

    let details = match result {
        Ok(out) if out.status.success() => None,
        Ok(out) => Some(format!(
            "'{}' exited with {}: {}",
            command,
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )),
        Err(e) => Some(format!("failed to run '{}': {}", command, e)),
    };

    let produced = fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false);
    match (produced, details) {
        (true, _) => Ok(()),
        (false, Some(details)) => Err(AssemblyError::FallbackFailed { details }),
        (false, None) => Err(AssemblyError::FallbackFailed {
            details: format!("'{}' produced no output", command),
        }),
    }
}
