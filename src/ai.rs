use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    CreateImageRequestArgs, Image, ImageModel, ImageQuality as ApiImageQuality,
    ImageResponseFormat, ImageSize as ApiImageSize,
};
use async_openai::Client;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GenerationError;

const MODEL_NAME: &str = "dall-e-3";
const REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) enum ImageSize {
    #[default]
    #[serde(rename = "1024x1024")]
    Square,
    #[serde(rename = "1024x1792")]
    Portrait,
    #[serde(rename = "1792x1024")]
    Landscape,
}

impl ImageSize {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Portrait => "1024x1792",
            ImageSize::Landscape => "1792x1024",
        }
    }

    fn to_api(self) -> ApiImageSize {
        match self {
            ImageSize::Square => ApiImageSize::S1024x1024,
            ImageSize::Portrait => ApiImageSize::S1024x1792,
            ImageSize::Landscape => ApiImageSize::S1792x1024,
        }
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1024x1024" => Ok(ImageSize::Square),
            "1024x1792" => Ok(ImageSize::Portrait),
            "1792x1024" => Ok(ImageSize::Landscape),
            _ => Err(anyhow::anyhow!(
                "Unsupported image size '{s}', expected 1024x1024, 1024x1792 or 1792x1024"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ImageQuality {
    #[default]
    Standard,
    Hd,
}

impl ImageQuality {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ImageQuality::Standard => "standard",
            ImageQuality::Hd => "hd",
        }
    }

    fn to_api(self) -> ApiImageQuality {
        match self {
            ImageQuality::Standard => ApiImageQuality::Standard,
            ImageQuality::Hd => ApiImageQuality::HD,
        }
    }
}

impl FromStr for ImageQuality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(ImageQuality::Standard),
            "hd" => Ok(ImageQuality::Hd),
            _ => Err(anyhow::anyhow!("Unsupported quality '{s}', expected standard or hd")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct ImageSettings {
    pub(crate) size: ImageSize,
    pub(crate) quality: ImageQuality,
}

#[derive(Debug, Clone)]
pub(crate) struct GeneratedImage {
    pub(crate) bytes: Vec<u8>,
    pub(crate) revised_prompt: Option<String>,
}

/// Text-to-image service producing one image per prompt.
pub(crate) trait ImageBackend {
    async fn generate(
        &self,
        prompt: &str,
        settings: ImageSettings,
    ) -> Result<GeneratedImage, GenerationError>;
}

pub(crate) struct OpenAiImages {
    client: Client<OpenAIConfig>,
}

impl OpenAiImages {
    pub(crate) fn new(api_key: &str) -> Self {
        Self::with_config(OpenAIConfig::new().with_api_key(api_key))
    }

    /// The client's own 429 backoff is switched off so rate limits reach
    /// [`RetryPolicy`](crate::retry::RetryPolicy).
    fn with_config(config: OpenAIConfig) -> Self {
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();
        Self {
            client: Client::with_config(config).with_backoff(no_retry),
        }
    }
}

impl ImageBackend for OpenAiImages {
    async fn generate(
        &self,
        prompt: &str,
        settings: ImageSettings,
    ) -> Result<GeneratedImage, GenerationError> {
        let request = CreateImageRequestArgs::default()
            .model(ImageModel::DallE3)
            .prompt(prompt)
            .n(1)
            .size(settings.size.to_api())
            .quality(settings.quality.to_api())
            .response_format(ImageResponseFormat::B64Json)
            .build()
            .map_err(classify)?;

        debug!(
            model = MODEL_NAME,
            size = %settings.size,
            quality = settings.quality.as_str(),
            "Sending image request"
        );
        let response = tokio::time::timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.client.images().create(request),
        )
        .await
        .map_err(|_| GenerationError::Api("Image request timed out".to_owned()))?
        .map_err(classify)?;

        let image = response.data.first().ok_or(GenerationError::EmptyResponse)?;
        match image.as_ref() {
            Image::B64Json {
                b64_json,
                revised_prompt,
            } => Ok(GeneratedImage {
                bytes: decode_b64(b64_json)?,
                revised_prompt: revised_prompt.clone(),
            }),
            Image::Url { .. } => Err(GenerationError::Api(
                "Expected base64 image data, got a URL".to_owned(),
            )),
        }
    }
}

fn decode_b64(payload: &str) -> Result<Vec<u8>, GenerationError> {
    base64::prelude::BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| GenerationError::Decode(e.to_string()))
}

fn classify(err: OpenAIError) -> GenerationError {
    let text = format!("{err} {err:?}");
    if mentions_rate_limit(&text) {
        GenerationError::RateLimited(err.to_string())
    } else {
        GenerationError::Api(err.to_string())
    }
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("rate_limit") || lower.contains("rate limit") || lower.contains("429")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct CostEstimate {
    pub(crate) cost_per_image: f64,
    pub(crate) total_cost: f64,
    pub(crate) num_images: usize,
    pub(crate) quality: ImageQuality,
}

/// DALL-E 3 list price in USD for one image.
pub(crate) fn price_per_image(quality: ImageQuality, size: ImageSize) -> f64 {
    match (quality, size) {
        (ImageQuality::Standard, ImageSize::Square) => 0.040,
        (ImageQuality::Standard, _) => 0.080,
        (ImageQuality::Hd, ImageSize::Square) => 0.080,
        (ImageQuality::Hd, _) => 0.120,
    }
}

pub(crate) fn estimate_cost(num_images: usize, settings: ImageSettings) -> CostEstimate {
    let cost_per_image = price_per_image(settings.quality, settings.size);
    CostEstimate {
        cost_per_image,
        total_cost: num_images as f64 * cost_per_image,
        num_images,
        quality: settings.quality,
    }
}
