use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::MediaError;

#[cfg(windows)]
const EXE_SUFFIX: &str = ".exe";
#[cfg(not(windows))]
const EXE_SUFFIX: &str = "";

/// Resolved `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone)]
pub(crate) struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Ffmpeg {
    #[cfg(test)]
    pub(crate) fn with_paths(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Finds ffmpeg: explicit override, bundled locations, then `PATH`.
    pub(crate) async fn locate(override_path: Option<&Path>) -> Result<Self, MediaError> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = override_path {
            candidates.push(path.to_path_buf());
        }
        let exe_name = format!("ffmpeg{EXE_SUFFIX}");
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join("ffmpeg").join(&exe_name));
            candidates.push(cwd.join(&exe_name));
        }
        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            candidates.push(dir.join(&exe_name));
            candidates.push(dir.join("ffmpeg").join(&exe_name));
        }

        for candidate in candidates {
            if candidate.is_file() && responds_to_version(&candidate).await {
                info!(path = %candidate.display(), "Found FFmpeg");
                return Ok(Self::beside(candidate));
            }
        }

        let on_path = PathBuf::from("ffmpeg");
        if responds_to_version(&on_path).await {
            info!("Found FFmpeg in system PATH");
            return Ok(Self::beside(on_path));
        }

        warn!("FFmpeg not found");
        Err(MediaError::FfmpegNotFound)
    }

    fn beside(ffmpeg: PathBuf) -> Self {
        let probe_name = format!("ffprobe{EXE_SUFFIX}");
        let ffprobe = match ffmpeg.parent() {
            Some(dir) if !dir.as_os_str().is_empty() && dir.join(&probe_name).is_file() => {
                dir.join(probe_name)
            }
            _ => PathBuf::from("ffprobe"),
        };
        Self { ffmpeg, ffprobe }
    }

    pub(crate) async fn run<I, S>(&self, args: I) -> Result<String, MediaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run_command(&self.ffmpeg, args).await
    }

    pub(crate) async fn probe(&self, path: &Path) -> Result<ProbeInfo, MediaError> {
        let stdout = run_command(
            &self.ffprobe,
            [
                OsStr::new("-v"),
                OsStr::new("quiet"),
                OsStr::new("-print_format"),
                OsStr::new("json"),
                OsStr::new("-show_format"),
                OsStr::new("-show_streams"),
                path.as_os_str(),
            ],
        )
        .await?;
        Ok(serde_json::from_str(&stdout)?)
    }
}

async fn responds_to_version(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn run_command<I, S>(program: &Path, args: I) -> Result<String, MediaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    debug!(
        command = %format!(
            "{} {}",
            program.display(),
            args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" ")
        ),
        "Running"
    );

    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MediaError::FfmpegNotFound
            } else {
                MediaError::Spawn {
                    program: program.display().to_string(),
                    source: e,
                }
            }
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(MediaError::CommandFailed {
            program: program.display().to_string(),
            status: output.status,
            stderr: tail(&stderr, 20),
        });
    }
    debug!(stderr = %tail(&stderr, 5), "Command finished");
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProbeInfo {
    #[serde(default)]
    pub(crate) format: ProbeFormat,
    #[serde(default)]
    pub(crate) streams: Vec<ProbeStream>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProbeFormat {
    pub(crate) duration: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ProbeStream {
    pub(crate) codec_type: Option<String>,
    pub(crate) codec_name: Option<String>,
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
}

impl ProbeInfo {
    pub(crate) fn duration_secs(&self) -> Option<f64> {
        self.format.duration.as_deref()?.parse().ok()
    }

    pub(crate) fn first_stream(&self, codec_type: &str) -> Option<&ProbeStream> {
        self.streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(codec_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_name": "h264", "codec_type": "video", "width": 1920, "height": 1080},
            {"index": 1, "codec_name": "aac", "codec_type": "audio", "sample_rate": "48000"}
        ],
        "format": {"filename": "a.mp4", "duration": "61.250000", "size": "1048576"}
    }"#;

    #[test]
    fn parses_ffprobe_json() {
        let info: ProbeInfo = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(info.duration_secs(), Some(61.25));
        let video = info.first_stream("video").unwrap();
        assert_eq!(video.codec_name.as_deref(), Some("h264"));
        assert_eq!((video.width, video.height), (Some(1920), Some(1080)));
        assert_eq!(
            info.first_stream("audio").unwrap().codec_name.as_deref(),
            Some("aac")
        );
        assert!(info.first_stream("subtitle").is_none());
    }

    #[test]
    fn tolerates_missing_sections() {
        let info: ProbeInfo = serde_json::from_str("{}").unwrap();
        assert!(info.duration_secs().is_none());
        assert!(info.streams.is_empty());
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("a", 5), "a");
    }

    #[test]
    fn ffprobe_defaults_to_path_lookup() {
        let ff = Ffmpeg::beside(PathBuf::from("ffmpeg"));
        assert_eq!(ff.ffprobe, PathBuf::from("ffprobe"));
    }

    #[tokio::test]
    async fn missing_binary_maps_to_not_found() {
        let ff = Ffmpeg::with_paths("/nonexistent/ffmpeg-bin", "/nonexistent/ffprobe-bin");
        let err = ff.run(["-version"]).await.unwrap_err();
        assert!(matches!(err, MediaError::FfmpegNotFound));
    }
}
