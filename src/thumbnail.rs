use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use image::codecs::jpeg;
use image::imageops::FilterType;
use tracing::info;

pub(crate) const THUMBNAIL_WIDTH: u32 = 1280;
pub(crate) const THUMBNAIL_HEIGHT: u32 = 720;
pub(crate) const MAX_THUMBNAIL_BYTES: usize = 2 * 1024 * 1024;
const QUALITY_STEPS: [u8; 5] = [90, 80, 70, 60, 50];

/// Writes a 1280x720 JPEG thumbnail of `image_path`, cropped to fill the frame.
pub(crate) fn create_thumbnail(image_path: &Path, output_path: &Path) -> anyhow::Result<PathBuf> {
    let source = image::open(image_path)
        .with_context(|| format!("Failed to open image {}", image_path.display()))?;
    let framed = source
        .resize_to_fill(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT, FilterType::Lanczos3)
        .to_rgb8();

    let mut jpeg_data = Vec::new();
    let mut quality = QUALITY_STEPS[0];
    for step in QUALITY_STEPS {
        jpeg_data.clear();
        quality = step;
        let mut encoder = jpeg::JpegEncoder::new_with_quality(&mut jpeg_data, step);
        encoder.encode(
            &framed,
            framed.width(),
            framed.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        if jpeg_data.len() <= MAX_THUMBNAIL_BYTES {
            break;
        }
    }
    if jpeg_data.len() > MAX_THUMBNAIL_BYTES {
        anyhow::bail!("Thumbnail is still {} bytes at quality {quality}", jpeg_data.len());
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_path, &jpeg_data)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    info!(
        path = %output_path.display(),
        bytes = jpeg_data.len(),
        quality,
        "Created thumbnail"
    );
    Ok(output_path.to_path_buf())
}
