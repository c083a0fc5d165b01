use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(Debug, thiserror::Error)]
pub(crate) enum GenerationError {
    #[error("Rate limited by the image API: {0}")]
    RateLimited(String),

    #[error("Image API error: {0}")]
    Api(String),

    #[error("Image API returned no image data")]
    EmptyResponse,

    #[error("Failed to decode generated image: {0}")]
    Decode(String),

    #[error("Failed to generate image after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("Image generation cancelled")]
    Cancelled,
}

impl GenerationError {
    pub(crate) fn is_rate_limit(&self) -> bool {
        matches!(self, GenerationError::RateLimited(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum MediaError {
    #[error("FFmpeg not found. Install it or set FFMPEG_BINARY")]
    FfmpegNotFound,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to parse ffprobe output: {0}")]
    Probe(#[from] serde_json::Error),

    #[error("No valid video clips to concatenate")]
    NoClips,

    #[error("Output file was not created: {0}")]
    MissingOutput(PathBuf),
}
