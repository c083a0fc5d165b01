use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::MediaError;
use crate::ffmpeg::Ffmpeg;
use crate::youtube::{self, Resolution};

/// Above this many clips the concat demuxer copies streams instead of re-encoding.
const STREAM_COPY_THRESHOLD: usize = 10;

/// A generated still and the slice of the voiceover it covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SceneImage {
    /// 1-based position in the script, kept when earlier scenes were skipped.
    pub(crate) scene: usize,
    pub(crate) path: PathBuf,
    pub(crate) timestamp: f64,
    pub(crate) duration: f64,
}

/// Builds ffmpeg invocations for stills, concatenation and audio muxing.
pub(crate) struct VideoProcessor {
    ffmpeg: Ffmpeg,
    resolution: Resolution,
    fps: u32,
}

impl VideoProcessor {
    pub(crate) fn new(ffmpeg: Ffmpeg, resolution: Resolution, fps: u32) -> Self {
        Self {
            ffmpeg,
            resolution,
            fps,
        }
    }

    pub(crate) fn ffmpeg(&self) -> &Ffmpeg {
        &self.ffmpeg
    }

    /// One silent `scene_NNN.mp4` per image.
    pub(crate) async fn images_to_clips(
        &self,
        images: &[SceneImage],
        output_dir: &Path,
    ) -> anyhow::Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir)?;
        let mut clips = Vec::with_capacity(images.len());
        for image in images {
            info!(
                image = %image.path.display(),
                duration = image.duration,
                "Creating video clip from image"
            );
            let out = output_dir.join(clip_name(image));
            self.ffmpeg.run(self.still_clip_args(image, &out)).await?;
            clips.push(out);
        }
        Ok(clips)
    }

    fn still_clip_args(&self, image: &SceneImage, out: &Path) -> Vec<OsString> {
        let mut args = os_args(["-y", "-hide_banner", "-loop", "1", "-i"]);
        args.push(image.path.clone().into());
        args.extend(os_args(["-t", format_secs(image.duration).as_str()]));
        args.extend(os_args(["-vf", self.still_filter().as_str()]));
        args.extend(os_args([
            "-c:v", "libx264", "-preset", "medium", "-pix_fmt", "yuv420p", "-an",
        ]));
        args.push(out.into());
        args
    }

    fn still_filter(&self) -> String {
        let (w, h) = self.resolution.frame_size();
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={},format=yuv420p",
            self.fps
        )
    }

    /// Slideshow of `images` over the voiceover, exactly as long as the audio.
    pub(crate) async fn create_full_video(
        &self,
        images: &[SceneImage],
        audio_path: &Path,
        audio_duration: f64,
        output_path: &Path,
    ) -> anyhow::Result<PathBuf> {
        if images.is_empty() {
            anyhow::bail!("No images to assemble into a video");
        }
        info!("Creating full video with voiceover");

        let entries = slideshow_entries(images, audio_duration);
        let list = write_concat_list(&entries)?;
        let output_path = ensure_writable(output_path)?;
        let args = self.full_video_args(list.path(), audio_path, audio_duration, &output_path);
        self.ffmpeg.run(args).await?;
        require_output(&output_path)?;
        info!(path = %output_path.display(), "Created full video");
        Ok(output_path)
    }

    fn full_video_args(
        &self,
        list_path: &Path,
        audio_path: &Path,
        audio_duration: f64,
        output_path: &Path,
    ) -> Vec<OsString> {
        let mut args = os_args(["-y", "-hide_banner", "-f", "concat", "-safe", "0", "-i"]);
        args.push(list_path.into());
        args.push("-i".into());
        args.push(audio_path.into());
        args.extend(os_args(["-map", "0:v:0", "-map", "1:a:0", "-vf", self.still_filter().as_str()]));
        args.extend(youtube::ffmpeg_params(self.resolution).into_iter().map(OsString::from));
        args.extend(os_args(["-t", format_secs(audio_duration).as_str()]));
        args.push(output_path.into());
        args
    }

    /// Joins clips in order, optionally cut to `target_duration` seconds.
    ///
    /// Missing inputs are skipped. Large batches are stream-copied through the
    /// concat demuxer. Small ones go through the concat filter, so clips with
    /// different sizes, frame rates or no audio can be mixed.
    pub(crate) async fn concatenate_clips(
        &self,
        video_paths: &[PathBuf],
        output_path: &Path,
        target_duration: Option<f64>,
    ) -> anyhow::Result<PathBuf> {
        info!(count = video_paths.len(), "Concatenating video clips");

        let existing: Vec<&PathBuf> = video_paths
            .iter()
            .filter(|p| {
                let found = p.exists();
                if !found {
                    warn!(path = %p.display(), "Video file not found");
                }
                found
            })
            .collect();
        if existing.is_empty() {
            return Err(MediaError::NoClips.into());
        }

        let output_path = ensure_writable(output_path)?;
        if existing.len() > STREAM_COPY_THRESHOLD {
            let entries: Vec<(PathBuf, Option<f64>)> =
                existing.iter().map(|p| ((*p).clone(), None)).collect();
            let list = write_concat_list(&entries)?;
            let args = self.stream_copy_args(list.path(), target_duration, &output_path);
            self.ffmpeg.run(args).await?;
        } else {
            let mut clips = Vec::with_capacity(existing.len());
            for path in existing {
                let info = self.ffmpeg.probe(path).await?;
                clips.push(ClipInput {
                    path: path.clone(),
                    duration: info.duration_secs().unwrap_or(0.0),
                    has_audio: info.first_stream("audio").is_some(),
                });
            }
            let args = self.concat_filter_args(&clips, target_duration, &output_path);
            self.ffmpeg.run(args).await?;
        }
        require_output(&output_path)?;
        info!(path = %output_path.display(), "Created concatenated video");
        Ok(output_path)
    }

    fn stream_copy_args(
        &self,
        list_path: &Path,
        target_duration: Option<f64>,
        output_path: &Path,
    ) -> Vec<OsString> {
        let mut args = os_args(["-y", "-hide_banner", "-f", "concat", "-safe", "0", "-i"]);
        args.push(list_path.into());
        args.extend(os_args(["-c", "copy"]));
        if let Some(secs) = target_duration {
            args.extend(os_args(["-t", format_secs(secs).as_str()]));
        }
        args.push(output_path.into());
        args
    }

    fn concat_filter_args(
        &self,
        clips: &[ClipInput],
        target_duration: Option<f64>,
        output_path: &Path,
    ) -> Vec<OsString> {
        let mut args = os_args(["-y", "-hide_banner"]);
        for clip in clips {
            args.push("-i".into());
            args.push(clip.path.clone().into());
        }
        args.extend(os_args([
            "-filter_complex",
            self.concat_filter(clips).as_str(),
            "-map",
            "[outv]",
            "-map",
            "[outa]",
        ]));
        args.extend(youtube::ffmpeg_params(self.resolution).into_iter().map(OsString::from));
        if let Some(secs) = target_duration {
            args.extend(os_args(["-t", format_secs(secs).as_str()]));
        }
        args.push(output_path.into());
        args
    }

    /// Every input is normalized to the profile frame, then joined by the
    /// concat filter. Silent clips get a matching stretch of silence.
    fn concat_filter(&self, clips: &[ClipInput]) -> String {
        let still = self.still_filter();
        let audio_format = format!(
            "aformat=sample_rates={}:channel_layouts=stereo",
            youtube::AUDIO_SAMPLE_RATE
        );
        let mut graph = String::new();
        let mut pads = String::new();
        for (i, clip) in clips.iter().enumerate() {
            graph.push_str(&format!("[{i}:v]{still}[v{i}];"));
            if clip.has_audio {
                graph.push_str(&format!("[{i}:a]{audio_format}[a{i}];"));
            } else {
                graph.push_str(&format!(
                    "anullsrc=r={}:cl=stereo,atrim=duration={}[a{i}];",
                    youtube::AUDIO_SAMPLE_RATE,
                    format_secs(clip.duration)
                ));
            }
            pads.push_str(&format!("[v{i}][a{i}]"));
        }
        graph.push_str(&format!("{pads}concat=n={}:v=1:a=1[outv][outa]", clips.len()));
        graph
    }

    /// Replaces the audio of `video_path` with `audio_path`, cut to the shorter stream.
    pub(crate) async fn add_audio_to_video(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> anyhow::Result<PathBuf> {
        info!("Adding audio to video");
        let output_path = ensure_writable(output_path)?;
        self.ffmpeg
            .run(add_audio_args(video_path, audio_path, &output_path))
            .await?;
        info!(path = %output_path.display(), "Created video with audio");
        Ok(output_path)
    }

    pub(crate) async fn extract_audio(
        &self,
        video_path: &Path,
        output_path: &Path,
    ) -> anyhow::Result<()> {
        let mut args = os_args(["-y", "-hide_banner", "-i"]);
        args.push(video_path.into());
        args.extend(os_args(["-vn", "-acodec", "copy"]));
        args.push(output_path.into());
        self.ffmpeg.run(args).await?;
        info!(path = %output_path.display(), "Extracted audio");
        Ok(())
    }

    /// Re-encodes any input with the YouTube profile.
    pub(crate) async fn encode_for_youtube(
        &self,
        input: &Path,
        output_path: &Path,
    ) -> anyhow::Result<PathBuf> {
        let output_path = ensure_writable(output_path)?;
        let mut args = os_args(["-y", "-hide_banner", "-i"]);
        args.push(input.into());
        args.extend(youtube::ffmpeg_params(self.resolution).into_iter().map(OsString::from));
        args.push(output_path.clone().into());
        self.ffmpeg.run(args).await?;
        require_output(&output_path)?;
        Ok(output_path)
    }
}

/// A clip headed for the concat filter.
struct ClipInput {
    path: PathBuf,
    duration: f64,
    has_audio: bool,
}

fn clip_name(image: &SceneImage) -> String {
    format!("scene_{:03}.mp4", image.scene)
}

fn add_audio_args(video_path: &Path, audio_path: &Path, output_path: &Path) -> Vec<OsString> {
    let mut args = os_args(["-y", "-hide_banner", "-i"]);
    args.push(video_path.into());
    args.push("-i".into());
    args.push(audio_path.into());
    args.extend(os_args([
        "-c:v", "copy",
        "-c:a", "aac",
        "-b:a", youtube::AUDIO_BITRATE,
        "-map", "0:v:0",
        "-map", "1:a:0",
        "-shortest",
    ]));
    args.push(output_path.into());
    args
}

fn os_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs.max(0.0))
}

/// Scene stills with durations; the last one absorbs any gap to `total`.
fn slideshow_entries(images: &[SceneImage], total: f64) -> Vec<(PathBuf, Option<f64>)> {
    let covered: f64 = images.iter().map(|i| i.duration).sum();
    let gap = (total - covered).max(0.0);
    let mut entries: Vec<(PathBuf, Option<f64>)> = images
        .iter()
        .map(|i| (i.path.clone(), Some(i.duration)))
        .collect();
    if let Some(last) = images.last() {
        if let Some((_, Some(duration))) = entries.last_mut() {
            *duration += gap;
        }
        // the concat demuxer ignores the final duration unless the file repeats
        entries.push((last.path.clone(), None));
    }
    entries
}

fn concat_list(entries: &[(PathBuf, Option<f64>)]) -> anyhow::Result<String> {
    let mut out = String::new();
    for (path, duration) in entries {
        let abs = std::path::absolute(path)
            .with_context(|| format!("Invalid path {}", path.display()))?;
        let escaped = abs.to_string_lossy().replace('\'', r"'\''");
        out.push_str(&format!("file '{escaped}'\n"));
        if let Some(secs) = duration {
            out.push_str(&format!("duration {}\n", format_secs(*secs)));
        }
    }
    Ok(out)
}

fn write_concat_list(entries: &[(PathBuf, Option<f64>)]) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut list = tempfile::Builder::new()
        .prefix("concat_list")
        .suffix(".txt")
        .tempfile()
        .context("Failed to create concat list file")?;
    list.write_all(concat_list(entries)?.as_bytes())?;
    list.flush()?;
    Ok(list)
}

fn require_output(path: &Path) -> Result<(), MediaError> {
    if path.exists() {
        Ok(())
    } else {
        Err(MediaError::MissingOutput(path.to_path_buf()))
    }
}

/// Returns `path` if its directory is writable, otherwise the same file name
/// inside a fresh temp directory.
pub(crate) fn ensure_writable(path: &Path) -> anyhow::Result<PathBuf> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let writable = fs::create_dir_all(dir).is_ok()
        && tempfile::Builder::new()
            .prefix(".write_test")
            .tempfile_in(dir)
            .is_ok();
    if writable {
        return Ok(path.to_path_buf());
    }

    let fallback_dir = tempfile::Builder::new()
        .prefix("scenereel_")
        .tempdir()?
        .keep();
    let file_name = path
        .file_name()
        .ok_or(anyhow::anyhow!("Invalid output path {}", path.display()))?;
    let fallback = fallback_dir.join(file_name);
    warn!(
        wanted = %path.display(),
        using = %fallback.display(),
        "No write permission, using temp directory"
    );
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor() -> VideoProcessor {
        VideoProcessor::new(Ffmpeg::with_paths("ffmpeg", "ffprobe"), Resolution::P1080, 30)
    }

    fn joined(args: &[OsString]) -> String {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn scene(path: &str, timestamp: f64, duration: f64) -> SceneImage {
        SceneImage {
            scene: 1,
            path: PathBuf::from(path),
            timestamp,
            duration,
        }
    }

    #[test]
    fn still_clip_command() {
        let args = processor().still_clip_args(&scene("/img/a.png", 0.0, 2.5), Path::new("/out/scene_001.mp4"));
        let cmd = joined(&args);
        assert!(cmd.starts_with("-y -hide_banner -loop 1 -i /img/a.png -t 2.500 -vf scale=1920:1080"));
        assert!(cmd.contains("fps=30,format=yuv420p"));
        assert!(cmd.ends_with("-c:v libx264 -preset medium -pix_fmt yuv420p -an /out/scene_001.mp4"));
    }

    fn clip(path: &str, duration: f64, has_audio: bool) -> ClipInput {
        ClipInput {
            path: PathBuf::from(path),
            duration,
            has_audio,
        }
    }

    #[test]
    fn large_batches_copy_streams() {
        let args = processor().stream_copy_args(Path::new("/tmp/l.txt"), None, Path::new("o.mp4"));
        let cmd = joined(&args);
        assert_eq!(cmd, "-y -hide_banner -f concat -safe 0 -i /tmp/l.txt -c copy o.mp4");
    }

    #[test]
    fn small_batches_normalize_each_input() {
        let clips = [clip("/c/wide.mp4", 4.0, true), clip("/c/silent.mp4", 2.5, false)];
        let args = processor().concat_filter_args(&clips, Some(12.0), Path::new("o.mp4"));
        let cmd = joined(&args);

        assert!(cmd.starts_with("-y -hide_banner -i /c/wide.mp4 -i /c/silent.mp4 -filter_complex "));
        assert!(!cmd.contains("-f concat"));
        assert!(cmd.contains("-map [outv] -map [outa] -c:v libx264"));
        assert!(cmd.ends_with("-t 12.000 o.mp4"));

        let graph = processor().concat_filter(&clips);
        assert!(graph.starts_with("[0:v]scale=1920:1080:force_original_aspect_ratio=decrease"));
        assert!(graph.contains("[1:v]scale=1920:1080"));
        assert!(graph.contains("[0:a]aformat=sample_rates=48000:channel_layouts=stereo[a0];"));
        assert!(graph.contains("anullsrc=r=48000:cl=stereo,atrim=duration=2.500[a1];"));
        assert!(graph.ends_with("[v0][a0][v1][a1]concat=n=2:v=1:a=1[outv][outa]"));
    }

    #[test]
    fn full_video_follows_the_voiceover() {
        let args = processor().full_video_args(
            Path::new("/tmp/list.txt"),
            Path::new("/a/voice.mp3"),
            93.25,
            Path::new("/out/final_video.mp4"),
        );
        let cmd = joined(&args);
        assert!(cmd.starts_with(
            "-y -hide_banner -f concat -safe 0 -i /tmp/list.txt -i /a/voice.mp3 -map 0:v:0 -map 1:a:0 -vf scale=1920:1080"
        ));
        assert!(cmd.contains("-c:a aac -b:a 192k -ar 48000 -ac 2"));
        assert!(cmd.ends_with("-t 93.250 /out/final_video.mp4"));
    }

    #[test]
    fn voiceover_mux_keeps_video_and_cuts_to_shortest() {
        let args = add_audio_args(Path::new("v.mp4"), Path::new("voice.wav"), Path::new("out.mp4"));
        assert_eq!(
            joined(&args),
            "-y -hide_banner -i v.mp4 -i voice.wav -c:v copy -c:a aac -b:a 192k \
             -map 0:v:0 -map 1:a:0 -shortest out.mp4"
        );
    }

    #[test]
    fn clips_are_named_after_their_scene() {
        let image = SceneImage {
            scene: 4,
            ..scene("scene_004_1700000000.png", 9.0, 3.0)
        };
        assert_eq!(clip_name(&image), "scene_004.mp4");
    }

    #[test]
    fn slideshow_extends_last_image() {
        let images = [scene("a.png", 0.0, 2.0), scene("b.png", 2.0, 2.0)];
        let entries = slideshow_entries(&images, 5.0);
        assert_eq!(
            entries,
            vec![
                (PathBuf::from("a.png"), Some(2.0)),
                (PathBuf::from("b.png"), Some(3.0)),
                (PathBuf::from("b.png"), None),
            ]
        );
    }

    #[test]
    fn slideshow_never_shrinks() {
        let images = [scene("a.png", 0.0, 4.0)];
        let entries = slideshow_entries(&images, 3.0);
        assert_eq!(entries[0].1, Some(4.0));
    }

    #[test]
    fn concat_list_quotes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("it's.mp4");
        let list = concat_list(&[(path.clone(), Some(1.5)), (path, None)]).unwrap();
        let lines: Vec<_> = list.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("file '/"));
        assert!(lines[0].ends_with(r"it'\''s.mp4'"));
        assert_eq!(lines[1], "duration 1.500");
    }

    #[tokio::test]
    async fn concatenating_nothing_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let err = processor()
            .concatenate_clips(&[dir.path().join("missing.mp4")], &dir.path().join("o.mp4"), None)
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<MediaError>(), Some(MediaError::NoClips)));
    }

    #[test]
    fn writable_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let wanted = dir.path().join("nested").join("final.mp4");
        assert_eq!(ensure_writable(&wanted).unwrap(), wanted);
        assert!(wanted.parent().unwrap().is_dir());
    }
}
