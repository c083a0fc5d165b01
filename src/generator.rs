use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ai::{ImageBackend, ImageSettings};
use crate::error::GenerationError;
use crate::prompt::{self, ImageStyle};
use crate::retry::RetryPolicy;

pub(crate) const HISTORY_FILE: &str = "generation_history.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HistoryEntry {
    pub(crate) original_prompt: String,
    pub(crate) revised_prompt: Option<String>,
    pub(crate) image_path: PathBuf,
    pub(crate) timestamp: f64,
    pub(crate) style: ImageStyle,
}

/// Generates scene images through an [`ImageBackend`] and records what was asked.
pub(crate) struct SceneGenerator<B> {
    backend: B,
    settings: ImageSettings,
    retry: RetryPolicy,
    cancel: Arc<AtomicBool>,
    history: Vec<HistoryEntry>,
}

impl<B: ImageBackend> SceneGenerator<B> {
    pub(crate) fn new(backend: B, settings: ImageSettings, retry: RetryPolicy) -> Self {
        Self {
            backend,
            settings,
            retry,
            cancel: Arc::new(AtomicBool::new(false)),
            history: Vec::new(),
        }
    }

    /// Shares a cancellation flag that stops retries between attempts.
    pub(crate) fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub(crate) async fn generate_and_save(
        &mut self,
        prompt: &str,
        output_dir: &Path,
        filename_prefix: &str,
        style: ImageStyle,
    ) -> anyhow::Result<PathBuf> {
        let backend = &self.backend;
        let settings = self.settings;
        let max_attempts = self.retry.max_attempts;
        let generated = self
            .retry
            .run(&self.cancel, |attempt| {
                info!(attempt = attempt + 1, max_attempts, "Generating image with DALL-E");
                backend.generate(prompt, settings)
            })
            .await?;

        let image_path = save_image(&generated.bytes, output_dir, filename_prefix)?;
        write_prompt_sidecar(
            output_dir,
            filename_prefix,
            prompt,
            generated.revised_prompt.as_deref(),
            style,
        )?;

        self.history.push(HistoryEntry {
            original_prompt: prompt.to_owned(),
            revised_prompt: generated.revised_prompt,
            image_path: image_path.clone(),
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            style,
        });

        info!(path = %image_path.display(), "Saved generated image");
        Ok(image_path)
    }

    /// Neutral-pose reference image used to keep the character consistent.
    pub(crate) async fn generate_character_reference(
        &mut self,
        character_desc: &str,
        style: ImageStyle,
        output_dir: &Path,
    ) -> anyhow::Result<PathBuf> {
        let prompt = prompt::character_reference_prompt(character_desc, style);
        self.generate_and_save(&prompt, output_dir, "character_reference", style)
            .await
    }

    pub(crate) fn save_history(&self, output_dir: &Path) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(HISTORY_FILE);
        fs::write(&path, serde_json::to_string_pretty(&self.history)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

fn save_image(bytes: &[u8], output_dir: &Path, filename_prefix: &str) -> anyhow::Result<PathBuf> {
    let format = image::guess_format(bytes)
        .map_err(|e| GenerationError::Decode(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| GenerationError::Decode(e.to_string()))?;

    fs::create_dir_all(output_dir)?;
    let timestamp = Utc::now().timestamp();
    match format {
        ImageFormat::Png | ImageFormat::Jpeg => {
            let ext = if format == ImageFormat::Png { "png" } else { "jpg" };
            let path = output_dir.join(format!("{filename_prefix}_{timestamp}.{ext}"));
            fs::write(&path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(path)
        }
        _ => {
            let path = output_dir.join(format!("{filename_prefix}_{timestamp}.png"));
            decoded.save_with_format(&path, ImageFormat::Png)?;
            Ok(path)
        }
    }
}

fn write_prompt_sidecar(
    output_dir: &Path,
    filename_prefix: &str,
    prompt: &str,
    revised_prompt: Option<&str>,
    style: ImageStyle,
) -> anyhow::Result<()> {
    let path = output_dir.join(format!("{filename_prefix}_prompt.txt"));
    let body = format!(
        "Original Prompt:\n{prompt}\n\nRevised Prompt (by DALL-E):\n{}\n\nStyle: {style}\n",
        revised_prompt.unwrap_or("None")
    );
    fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))
}
