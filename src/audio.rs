use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::ffmpeg::Ffmpeg;

/// Duration of an audio file in seconds.
///
/// Uses ffprobe when available, then the WAV header, and as a last resort a
/// bitrate guess from the file size.
pub(crate) async fn duration(ffmpeg: Option<&Ffmpeg>, path: &Path) -> anyhow::Result<f64> {
    if !path.exists() {
        anyhow::bail!("Audio file not found: {}", path.display());
    }

    if let Some(ffmpeg) = ffmpeg {
        match ffmpeg.probe(path).await {
            Ok(info) => {
                if let Some(secs) = info.duration_secs() {
                    info!(path = %path.display(), duration = secs, "Probed audio duration");
                    return Ok(secs);
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "ffprobe failed"),
        }
    }

    let ext = extension(path);
    if ext == "wav" {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match wav_duration(&bytes) {
            Some(secs) => {
                info!(path = %path.display(), duration = secs, "WAV duration");
                return Ok(secs);
            }
            None => warn!(path = %path.display(), "WAV header parsing failed"),
        }
    }

    let size = fs::metadata(path)?.len();
    let secs = estimate_from_size(size, &ext);
    warn!(
        path = %path.display(),
        duration = secs,
        "Using estimated duration based on file size"
    );
    Ok(secs)
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Assumes 256 kbps for m4a and 128 kbps for everything else.
pub(crate) fn estimate_from_size(size_bytes: u64, ext: &str) -> f64 {
    let kbps = if ext == "m4a" { 256.0 } else { 128.0 };
    size_bytes as f64 * 8.0 / (kbps * 1000.0)
}

/// Reads `byte_rate` from the `fmt ` chunk and the size of the `data` chunk.
pub(crate) fn wav_duration(bytes: &[u8]) -> Option<f64> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut byte_rate = None;
    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes(bytes[pos + 4..pos + 8].try_into().ok()?) as usize;
        let body = pos + 8;
        match id {
            b"fmt " if body + 12 <= bytes.len() => {
                byte_rate = Some(u32::from_le_bytes(bytes[body + 8..body + 12].try_into().ok()?));
            }
            b"data" => {
                let rate = byte_rate.filter(|r| *r > 0)?;
                let available = bytes.len().saturating_sub(body);
                return Some(size.min(available) as f64 / rate as f64);
            }
            _ => {}
        }
        // chunks are word aligned
        pos = body + size + (size & 1);
    }
    None
}
