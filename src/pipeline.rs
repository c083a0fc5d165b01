use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::ai::{self, ImageBackend, ImageSettings};
use crate::audio;
use crate::generator::SceneGenerator;
use crate::prompt::{self, ImageStyle};
use crate::script;
use crate::thumbnail;
use crate::video::{SceneImage, VideoProcessor};
use crate::youtube::{self, VideoMetadata};

pub(crate) const METADATA_FILE: &str = "generation_metadata.json";
pub(crate) const FULL_VIDEO_FILE: &str = "final_video.mp4";
pub(crate) const THUMBNAIL_FILE: &str = "thumbnail.jpg";
const API_NAME: &str = "OpenAI DALL-E 3";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ExportOptions {
    pub(crate) clips: bool,
    pub(crate) full_video: bool,
    pub(crate) thumbnail: bool,
}

impl ExportOptions {
    fn needs_ffmpeg(&self) -> bool {
        self.clips || self.full_video
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AiImagesRequest {
    pub(crate) script_path: PathBuf,
    pub(crate) voice_path: PathBuf,
    pub(crate) image_count: usize,
    pub(crate) style: ImageStyle,
    pub(crate) character_desc: String,
    pub(crate) export: ExportOptions,
    pub(crate) output_dir: PathBuf,
}

impl AiImagesRequest {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if !self.script_path.is_file() {
            anyhow::bail!("Script file not found: {}", self.script_path.display());
        }
        if !self.voice_path.is_file() {
            anyhow::bail!("Voiceover file not found: {}", self.voice_path.display());
        }
        if self.image_count == 0 {
            anyhow::bail!("Image count must be positive");
        }
        if self.character_desc.trim().is_empty() {
            anyhow::bail!("Please provide a character description");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GenerationMetadata {
    pub(crate) images: Vec<SceneImage>,
    pub(crate) script_path: PathBuf,
    pub(crate) voice_path: PathBuf,
    pub(crate) total_duration: f64,
    pub(crate) character_description: String,
    pub(crate) style: ImageStyle,
    pub(crate) api: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SessionOutput {
    pub(crate) images: Vec<SceneImage>,
    pub(crate) metadata_path: PathBuf,
    pub(crate) clips: Vec<PathBuf>,
    pub(crate) full_video: Option<PathBuf>,
    pub(crate) thumbnail: Option<PathBuf>,
    pub(crate) cancelled: bool,
}

/// Timestamped directory such as `output/ai_images_20240101_120000`.
pub(crate) fn session_dir(base: &Path, prefix: &str) -> anyhow::Result<PathBuf> {
    let dir = base.join(format!("{prefix}_{}", Local::now().format("%Y%m%d_%H%M%S")));
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(dir)
}

/// Generates one image per script segment and assembles the requested exports.
///
/// A scene that fails after all retries is logged and skipped. `cancel` is
/// checked before each scene; whatever was generated so far is still saved.
pub(crate) async fn run_ai_images<B: ImageBackend>(
    generator: &mut SceneGenerator<B>,
    processor: Option<&VideoProcessor>,
    image_settings: ImageSettings,
    request: &AiImagesRequest,
    cancel: &AtomicBool,
) -> anyhow::Result<SessionOutput> {
    request.validate()?;
    if request.export.needs_ffmpeg() && processor.is_none() {
        anyhow::bail!("Video export requested but FFmpeg is not available");
    }
    info!("Initializing AI image generation");

    let estimate = ai::estimate_cost(request.image_count, image_settings);
    info!(
        images = request.image_count,
        total_cost = %format!("${:.2}", estimate.total_cost),
        "Estimated cost"
    );

    info!("Reading script file");
    let script_text = fs::read_to_string(&request.script_path)
        .with_context(|| format!("Failed to read {}", request.script_path.display()))?;

    info!("Analyzing voiceover duration");
    let total_duration =
        audio::duration(processor.map(VideoProcessor::ffmpeg), &request.voice_path).await?;
    let timestamps = script::generate_timestamps(total_duration, request.image_count)?;
    let durations = script::scene_durations(&timestamps, total_duration);
    let segments = script::split_script(&script_text, request.image_count)?;

    fs::create_dir_all(&request.output_dir)?;
    let mut output = SessionOutput::default();
    for (i, segment) in segments.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            warn!("Generation cancelled by user");
            output.cancelled = true;
            break;
        }
        info!(scene = i + 1, of = request.image_count, "Generating image");

        let scene_prompt =
            prompt::scene_prompt(segment, &request.character_desc, request.style, i + 1);
        match generator
            .generate_and_save(
                &scene_prompt,
                &request.output_dir,
                &format!("scene_{:03}", i + 1),
                request.style,
            )
            .await
        {
            Ok(path) => {
                info!(
                    path = %path.display(),
                    at = %format!("{:.2}s", timestamps[i]),
                    progress = %format!("{}%", (i + 1) * 100 / request.image_count),
                    "Image generated"
                );
                if let Some(revised) = generator
                    .history()
                    .last()
                    .and_then(|h| h.revised_prompt.as_deref())
                {
                    debug!(scene = i + 1, revised, "DALL-E revised the prompt");
                }
                output.images.push(SceneImage {
                    scene: i + 1,
                    path,
                    timestamp: timestamps[i],
                    duration: durations[i],
                });
            }
            Err(e) => error!(scene = i + 1, error = %e, "Failed to generate image"),
        }
    }

    generator.save_history(&request.output_dir)?;
    output.metadata_path = write_metadata(request, &output.images, total_duration)?;

    if output.images.is_empty() {
        warn!("No images were generated, skipping exports");
        return Ok(output);
    }

    if let Some(processor) = processor {
        if request.export.clips {
            info!("Creating video clips from images");
            output.clips = processor
                .images_to_clips(&output.images, &request.output_dir)
                .await?;
        }
        if request.export.full_video {
            info!("Creating full video with voiceover");
            let video = processor
                .create_full_video(
                    &output.images,
                    &request.voice_path,
                    total_duration,
                    &request.output_dir.join(FULL_VIDEO_FILE),
                )
                .await?;
            youtube::create_metadata_file(
                &video,
                VideoMetadata {
                    description: youtube::seo_suggestions(&script_text, &request.character_desc)
                        .description_template,
                    tags: vec!["AI generated".to_owned(), "DALL-E 3".to_owned()],
                    ..VideoMetadata::default()
                },
            )?;
            output.full_video = Some(video);
        }
    }

    if request.export.thumbnail {
        output.thumbnail = Some(thumbnail::create_thumbnail(
            &output.images[0].path,
            &request.output_dir.join(THUMBNAIL_FILE),
        )?);
    }

    info!("AI image generation completed");
    Ok(output)
}

fn write_metadata(
    request: &AiImagesRequest,
    images: &[SceneImage],
    total_duration: f64,
) -> anyhow::Result<PathBuf> {
    let metadata = GenerationMetadata {
        images: images.to_vec(),
        script_path: request.script_path.clone(),
        voice_path: request.voice_path.clone(),
        total_duration,
        character_description: request.character_desc.clone(),
        style: request.style,
        api: API_NAME.to_owned(),
    };
    let path = request.output_dir.join(METADATA_FILE);
    fs::write(&path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
