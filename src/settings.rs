use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai::{ImageQuality, ImageSettings, ImageSize};

const APP_DIR_NAME: &str = "scenereel";
const SETTINGS_FILE: &str = "settings.json";

/// Persistent application settings, stored as JSON in the platform config dir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppSettings {
    pub(crate) output_dir: PathBuf,
    pub(crate) ffmpeg_path: Option<PathBuf>,
    pub(crate) image_size: ImageSize,
    pub(crate) image_quality: ImageQuality,
    pub(crate) max_retries: u32,
    pub(crate) resolution: String,
    pub(crate) fps: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            ffmpeg_path: None,
            image_size: ImageSize::Square,
            image_quality: ImageQuality::Standard,
            max_retries: 3,
            resolution: "1080p".to_owned(),
            fps: 30,
        }
    }
}

impl AppSettings {
    /// Loads settings from the config dir, then applies environment overrides.
    pub(crate) fn load() -> anyhow::Result<Self> {
        let mut settings = Self::load_from(&settings_path()?)?;
        settings.apply_env();
        Ok(settings)
    }

    pub(crate) fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        match serde_json::from_str(&raw) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring malformed settings file");
                Ok(Self::default())
            }
        }
    }

    pub(crate) fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write settings file {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("SCENEREEL_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(bin) = std::env::var("FFMPEG_BINARY") {
            self.ffmpeg_path = Some(PathBuf::from(bin));
        }
    }

    pub(crate) fn image_settings(&self) -> ImageSettings {
        ImageSettings {
            size: self.image_size,
            quality: self.image_quality,
        }
    }
}

pub(crate) fn settings_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join(SETTINGS_FILE))
}

/// Platform-specific directory holding settings and stored credentials.
pub(crate) fn config_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from);

    let base = if cfg!(windows) {
        std::env::var_os("APPDATA").map(PathBuf::from).or(home)
    } else if cfg!(target_os = "macos") {
        home.map(|h| h.join("Library").join("Application Support"))
    } else {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| home.map(|h| h.join(".config")))
    };

    base.map(|b| b.join(APP_DIR_NAME))
        .ok_or(anyhow::anyhow!("Cannot determine a config directory"))
}
