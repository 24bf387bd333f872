use super::{grid_side, load_photo};
use crate::error::AssemblyError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, DynamicImage, RgbImage};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Paste `k²` photos row-major into a `k×k` grid, composite the optional
/// overlay and write a JPEG. Returns the canvas size.
pub(crate) fn assemble_collage(
    photos: &[PathBuf],
    overlay: Option<&Path>,
    output: &Path,
    quality: u8,
) -> Result<(u32, u32), AssemblyError> {
    if photos.is_empty() {
        return Err(AssemblyError::NoPhotos);
    }
    let side = grid_side(photos.len()).ok_or(AssemblyError::NotPerfectSquare {
        count: photos.len(),
    })?;

    let first = load_photo(&photos[0])?.to_rgb8();
    let (tile_width, tile_height) = first.dimensions();
    debug!(
        "Building {}x{} collage of {}x{} tiles",
        side, side, tile_width, tile_height
    );

    let mut canvas = RgbImage::new(side * tile_width, side * tile_height);
    for (i, path) in photos.iter().enumerate() {
        let tile = if i == 0 {
            first.clone()
        } else {
            let tile = load_photo(path)?.to_rgb8();
            if tile.dimensions() != (tile_width, tile_height) {
                warn!(
                    "{} is {}x{}, resizing to {}x{}",
                    path.display(),
                    tile.width(),
                    tile.height(),
                    tile_width,
                    tile_height
                );
                imageops::resize(&tile, tile_width, tile_height, FilterType::Triangle)
            } else {
                tile
            }
        };

        let col = i as u32 % side;
        let row = i as u32 / side;
        imageops::replace(
            &mut canvas,
            &tile,
            (col * tile_width) as i64,
            (row * tile_height) as i64,
        );
    }

    let canvas = match overlay {
        Some(path) if path.is_file() => composite_overlay(canvas, path)?,
        Some(path) => {
            warn!("Overlay {} not found, skipping", path.display());
            canvas
        }
        None => canvas,
    };

    write_jpeg(&canvas, output, quality)?;
    info!(
        "Collage saved to {} ({}x{})",
        output.display(),
        canvas.width(),
        canvas.height()
    );
    Ok(canvas.dimensions())
}

/// Alpha-blend the overlay, stretched to the canvas, then flatten back to RGB
fn composite_overlay(canvas: RgbImage, overlay_path: &Path) -> Result<RgbImage, AssemblyError> {
    let overlay = image::open(overlay_path).map_err(|source| AssemblyError::Decode {
        path: overlay_path.to_path_buf(),
        source,
    })?;
    if !overlay.color().has_alpha() {
        warn!(
            "Overlay {} has no alpha channel, it will cover the collage",
            overlay_path.display()
        );
    }

    let (width, height) = canvas.dimensions();
    let overlay = imageops::resize(&overlay.to_rgba8(), width, height, FilterType::Triangle);

    let mut composed = DynamicImage::ImageRgb8(canvas).to_rgba8();
    imageops::overlay(&mut composed, &overlay, 0, 0);

    Ok(DynamicImage::ImageRgba8(composed).to_rgb8())
}

fn write_jpeg(image: &RgbImage, output: &Path, quality: u8) -> Result<(), AssemblyError> {
    let encode_error = |details: String| AssemblyError::Encode {
        path: output.to_path_buf(),
        details,
    };

    let file = File::create(output).map_err(|e| encode_error(e.to_string()))?;
    encode_jpeg(image, BufWriter::new(file), quality).map_err(|details| {
        let _ = fs::remove_file(output);
        encode_error(details)
    })
}

/// Encode and flush; a short final write counts as a failure
pub(super) fn encode_jpeg<W: Write>(image: &RgbImage, mut writer: W, quality: u8) -> Result<(), String> {
    JpegEncoder::new_with_quality(&mut writer, quality)
        .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
        .map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())
}
