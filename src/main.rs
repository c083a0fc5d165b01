mod ai;
mod audio;
mod broll;
mod credentials;
mod error;
mod ffmpeg;
mod generator;
mod pipeline;
mod prompt;
mod retry;
mod script;
mod settings;
mod thumbnail;
mod video;
mod youtube;

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::ai::{ImageQuality, ImageSize, OpenAiImages};
use crate::broll::BrollRequest;
use crate::credentials::{ApiKeyStore, API_KEY_ENV};
use crate::ffmpeg::Ffmpeg;
use crate::generator::SceneGenerator;
use crate::pipeline::{AiImagesRequest, ExportOptions};
use crate::prompt::ImageStyle;
use crate::retry::RetryPolicy;
use crate::settings::AppSettings;
use crate::video::VideoProcessor;
use crate::youtube::{Resolution, VideoMetadata};

#[derive(Parser)]
#[command(name = "scenereel")]
#[command(about = "Illustrate a script with DALL-E and cut YouTube-ready videos", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one image per scene of a script and export videos
    Generate {
        #[arg(short, long)]
        script: PathBuf,
        #[arg(long)]
        voice: PathBuf,
        #[arg(short = 'n', long)]
        count: usize,
        #[arg(short, long)]
        character: String,
        #[arg(long, default_value_t = ImageStyle::Photorealistic)]
        style: ImageStyle,
        /// One silent clip per image
        #[arg(long)]
        clips: bool,
        /// Slideshow with the voiceover as final_video.mp4
        #[arg(long)]
        full_video: bool,
        #[arg(long)]
        thumbnail: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip the cost confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Generate a character reference sheet
    Reference {
        #[arg(short, long)]
        character: String,
        #[arg(long, default_value_t = ImageStyle::Photorealistic)]
        style: ImageStyle,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Shuffle B-roll clips behind optional intro clips
    Broll {
        #[arg(long, num_args = 1.., required = true)]
        clips: Vec<PathBuf>,
        #[arg(long, num_args = 1..)]
        intro: Vec<PathBuf>,
        #[arg(long)]
        voiceover: Option<PathBuf>,
        /// Cut the result to the voiceover length
        #[arg(long)]
        sync_duration: bool,
        /// Also write a copy with the voiceover as audio track
        #[arg(long)]
        overlay_audio: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a video against YouTube upload limits
    Validate { file: PathBuf },
    /// Re-encode a video with YouTube settings
    Encode {
        input: PathBuf,
        output: PathBuf,
        /// 1080p, 720p or 480p; defaults to the input height
        #[arg(short, long)]
        resolution: Option<String>,
    },
    /// Copy the audio track out of a video
    ExtractAudio { video: PathBuf, output: PathBuf },
    /// Title, description and tag suggestions for a script
    Seo {
        #[arg(short, long)]
        script: PathBuf,
        #[arg(short, long)]
        character: String,
    },
    /// YouTube upload checklist
    Checklist,
    /// Estimated DALL-E cost for a number of images
    Estimate {
        #[arg(short = 'n', long)]
        count: usize,
        #[arg(short, long)]
        quality: Option<ImageQuality>,
        #[arg(long)]
        size: Option<ImageSize>,
    },
    /// Manage the stored OpenAI API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Print effective settings
    Config {
        /// Write them to the settings file
        #[arg(long)]
        init: bool,
    },
    /// Check that ffmpeg and ffprobe are usable
    CheckFfmpeg,
}

#[derive(Subcommand)]
enum KeyAction {
    Set { key: String },
    Show,
    Remove,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let settings = AppSettings::load()?;

    match cli.command {
        Command::Generate {
            script,
            voice,
            count,
            character,
            style,
            clips,
            full_video,
            thumbnail,
            output,
            yes,
        } => {
            let api_key = api_key()?;
            let mut request = AiImagesRequest {
                script_path: script,
                voice_path: voice,
                image_count: count,
                style,
                character_desc: character,
                export: ExportOptions {
                    clips,
                    full_video,
                    thumbnail,
                },
                output_dir: PathBuf::new(),
            };
            request.validate()?;

            let image_settings = settings.image_settings();
            let estimate = ai::estimate_cost(count, image_settings);
            if !yes
                && !confirm(&format!(
                    "Generate {count} images for about ${:.2}?",
                    estimate.total_cost
                ))?
            {
                info!("Aborted");
                return Ok(());
            }

            let ffmpeg = Ffmpeg::locate(settings.ffmpeg_path.as_deref()).await;
            let ffmpeg = if request.export.clips || request.export.full_video {
                Some(ffmpeg?)
            } else {
                ffmpeg.ok()
            };
            let processor = ffmpeg.map(|f| processor_for(&settings, f));

            request.output_dir = pipeline::session_dir(
                &output.unwrap_or_else(|| settings.output_dir.clone()),
                "ai_images",
            )?;
            let cancel = cancel_on_ctrl_c();
            let mut generator = SceneGenerator::new(
                OpenAiImages::new(&api_key),
                image_settings,
                RetryPolicy::with_max_attempts(settings.max_retries),
            )
            .with_cancel(Arc::clone(&cancel));
            let out = pipeline::run_ai_images(
                &mut generator,
                processor.as_ref(),
                image_settings,
                &request,
                &cancel,
            )
            .await?;

            println!("Generated {} of {} images", out.images.len(), count);
            println!("Session: {}", request.output_dir.display());
            println!("Metadata: {}", out.metadata_path.display());
            if !out.clips.is_empty() {
                println!("Clips: {}", out.clips.len());
            }
            if let Some(video) = out.full_video {
                println!("Video: {}", video.display());
            }
            if let Some(thumb) = out.thumbnail {
                println!("Thumbnail: {}", thumb.display());
            }
            if out.cancelled {
                warn!("Session was cancelled before all scenes were generated");
            }
        }
        Command::Reference {
            character,
            style,
            output,
        } => {
            if character.trim().is_empty() {
                anyhow::bail!("Please provide a character description");
            }
            let api_key = api_key()?;
            let dir = output.unwrap_or_else(|| settings.output_dir.clone());
            let mut generator = SceneGenerator::new(
                OpenAiImages::new(&api_key),
                settings.image_settings(),
                RetryPolicy::with_max_attempts(settings.max_retries),
            );
            let path = generator
                .generate_character_reference(&character, style, &dir)
                .await?;
            generator.save_history(&dir)?;
            println!("{}", path.display());
        }
        Command::Broll {
            clips,
            intro,
            voiceover,
            sync_duration,
            overlay_audio,
            output,
        } => {
            let processor = processor_for(&settings, locate(&settings).await?);
            let request = BrollRequest {
                broll_paths: clips,
                intro_paths: intro,
                voiceover_path: voiceover,
                sync_duration,
                overlay_audio,
                output_dir: pipeline::session_dir(
                    &output.unwrap_or_else(|| settings.output_dir.clone()),
                    "broll",
                )?,
            };
            let out = broll::run(&processor, &request).await?;
            println!("{}", broll::describe(&out));
        }
        Command::Validate { file } => {
            let ffmpeg = locate(&settings).await?;
            let report = youtube::validate_video_file(&ffmpeg, &file).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.valid {
                std::process::exit(1);
            }
        }
        Command::Encode {
            input,
            output,
            resolution,
        } => {
            let ffmpeg = locate(&settings).await?;
            let resolution = match resolution {
                Some(name) => Resolution::from_name(&name),
                None => ffmpeg
                    .probe(&input)
                    .await?
                    .first_stream("video")
                    .and_then(|s| s.height)
                    .map(Resolution::for_height)
                    .unwrap_or_else(|| Resolution::from_name(&settings.resolution)),
            };
            info!(?resolution, "Encoding for YouTube");
            let processor = VideoProcessor::new(ffmpeg, resolution, settings.fps);
            let encoded = processor.encode_for_youtube(&input, &output).await?;
            let metadata = youtube::create_metadata_file(&encoded, VideoMetadata::default())?;
            println!("{}", encoded.display());
            println!("{}", metadata.display());
        }
        Command::ExtractAudio { video, output } => {
            let processor = processor_for(&settings, locate(&settings).await?);
            processor.extract_audio(&video, &output).await?;
            println!("{}", output.display());
        }
        Command::Seo { script, character } => {
            let text = fs::read_to_string(&script)?;
            let suggestions = youtube::seo_suggestions(&text, &character);
            println!("{}", serde_json::to_string_pretty(&suggestions)?);
        }
        Command::Checklist => {
            for item in youtube::upload_checklist() {
                println!("[ ] {item}");
            }
        }
        Command::Estimate {
            count,
            quality,
            size,
        } => {
            let mut image_settings = settings.image_settings();
            if let Some(quality) = quality {
                image_settings.quality = quality;
            }
            if let Some(size) = size {
                image_settings.size = size;
            }
            let estimate = ai::estimate_cost(count, image_settings);
            println!("{}", serde_json::to_string_pretty(&estimate)?);
        }
        Command::Key { action } => {
            let store = ApiKeyStore::new(&settings::config_dir()?);
            match action {
                KeyAction::Set { key } => store.set(key.trim())?,
                KeyAction::Show => match store.get() {
                    Some(key) => println!("{}", credentials::mask_api_key(&key)),
                    None => println!("No API key configured"),
                },
                KeyAction::Remove => store.remove()?,
            }
        }
        Command::Config { init } => {
            if init {
                let path = settings::settings_path()?;
                settings.save_to(&path)?;
                info!(path = %path.display(), "Wrote settings");
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Command::CheckFfmpeg => {
            let ffmpeg = locate(&settings).await?;
            let version = ffmpeg.run(["-version"]).await?;
            println!("{}", version.lines().next().unwrap_or_default());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("scenereel=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scenereel=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn api_key() -> anyhow::Result<String> {
    ApiKeyStore::new(&settings::config_dir()?)
        .get()
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No OpenAI API key found. Run `scenereel key set <KEY>` or set {API_KEY_ENV}"
            )
        })
}

async fn locate(settings: &AppSettings) -> anyhow::Result<Ffmpeg> {
    Ok(Ffmpeg::locate(settings.ffmpeg_path.as_deref()).await?)
}

fn processor_for(settings: &AppSettings, ffmpeg: Ffmpeg) -> VideoProcessor {
    VideoProcessor::new(ffmpeg, Resolution::from_name(&settings.resolution), settings.fps)
}

/// Flag flipped by the first Ctrl-C; the running scene finishes, later ones
/// are skipped. A second Ctrl-C exits immediately.
fn cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt(&flag) {
                warn!("Interrupted again, exiting");
                std::process::exit(130);
            }
            warn!("Cancelling after the current scene, press Ctrl-C again to quit");
        }
    });
    cancel
}

/// Raises the cancel flag; true when it was already raised.
fn interrupt(cancel: &AtomicBool) -> bool {
    cancel.swap(true, Ordering::Relaxed)
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_interrupt_asks_to_exit() {
        let cancel = AtomicBool::new(false);
        assert!(!interrupt(&cancel));
        assert!(cancel.load(Ordering::Relaxed));
        assert!(interrupt(&cancel));
    }

    #[test]
    fn cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "scenereel", "generate", "--script", "s.txt", "--voice", "v.mp3", "-n", "4",
            "--character", "a fox", "--style", "anime-manga", "--full-video", "-y",
        ])
        .unwrap();
        match cli.command {
            Command::Generate { count, style, full_video, yes, clips, .. } => {
                assert_eq!(count, 4);
                assert_eq!(style, ImageStyle::AnimeManga);
                assert!(full_video && yes && !clips);
            }
            _ => panic!("expected generate"),
        }
    }
}
