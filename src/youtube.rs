use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::ffmpeg::{Ffmpeg, ProbeInfo};

pub(crate) const VIDEO_CODEC: &str = "h264";
pub(crate) const VIDEO_PROFILE: &str = "high";
pub(crate) const VIDEO_LEVEL: &str = "4.0";
pub(crate) const PIXEL_FORMAT: &str = "yuv420p";
pub(crate) const AUDIO_BITRATE: &str = "192k";
pub(crate) const AUDIO_SAMPLE_RATE: u32 = 48_000;
pub(crate) const AUDIO_CHANNELS: u32 = 2;
pub(crate) const MAX_FILE_SIZE: u64 = 128 * 1024 * 1024 * 1024;
pub(crate) const MAX_DURATION_SECS: f64 = 12.0 * 60.0 * 60.0;
const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

const AI_DISCLOSURE_NOTICE: &str = "This video contains AI-generated content. \
     Images were created using OpenAI DALL-E based on the provided script.";

/// Output resolutions with a YouTube bitrate recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    P1080,
    P720,
    P480,
}

impl Resolution {
    /// Unknown names fall back to 1080p.
    pub(crate) fn from_name(name: &str) -> Self {
        match name {
            "720p" => Resolution::P720,
            "480p" => Resolution::P480,
            _ => Resolution::P1080,
        }
    }

    pub(crate) fn for_height(height: u32) -> Self {
        if height >= 1080 {
            Resolution::P1080
        } else if height >= 720 {
            Resolution::P720
        } else {
            Resolution::P480
        }
    }

    pub(crate) fn video_bitrate_kbps(self) -> u32 {
        match self {
            Resolution::P1080 => 8000,
            Resolution::P720 => 5000,
            Resolution::P480 => 2500,
        }
    }

    /// 16:9 frame the stills are scaled and padded into.
    pub(crate) fn frame_size(self) -> (u32, u32) {
        match self {
            Resolution::P1080 => (1920, 1080),
            Resolution::P720 => (1280, 720),
            Resolution::P480 => (854, 480),
        }
    }
}

/// FFmpeg output options for a YouTube-ready H.264/AAC MP4.
pub(crate) fn ffmpeg_params(resolution: Resolution) -> Vec<String> {
    let kbps = resolution.video_bitrate_kbps();
    let bitrate = format!("{kbps}k");
    let bufsize = format!("{}k", kbps * 2);
    let sample_rate = AUDIO_SAMPLE_RATE.to_string();
    let channels = AUDIO_CHANNELS.to_string();

    #[rustfmt::skip]
    let params: [&str; 28] = [
        // video
        "-c:v", "libx264",
        "-preset", "medium",
        "-profile:v", VIDEO_PROFILE,
        "-level", VIDEO_LEVEL,
        "-pix_fmt", PIXEL_FORMAT,
        "-b:v", &bitrate,
        "-maxrate", &bitrate,
        "-bufsize", &bufsize,
        // audio
        "-c:a", "aac",
        "-b:a", AUDIO_BITRATE,
        "-ar", &sample_rate,
        "-ac", &channels,
        // container
        "-movflags", "+faststart",
        "-f", "mp4",
    ];
    params.into_iter().map(str::to_owned).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct FileInfo {
    pub(crate) size_gb: f64,
    pub(crate) duration_minutes: f64,
    pub(crate) video_codec: Option<String>,
    pub(crate) audio_codec: Option<String>,
    pub(crate) resolution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ValidationReport {
    pub(crate) valid: bool,
    pub(crate) issues: Vec<String>,
    pub(crate) warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) file_info: Option<FileInfo>,
}

impl ValidationReport {
    fn failed(reason: String) -> Self {
        Self {
            valid: false,
            issues: vec![format!("Validation failed: {reason}")],
            warnings: Vec::new(),
            file_info: None,
        }
    }
}

/// Probes `path` and checks it against YouTube upload limits.
pub(crate) async fn validate_video_file(ffmpeg: &Ffmpeg, path: &Path) -> ValidationReport {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to validate video");
            return ValidationReport::failed(e.to_string());
        }
    };
    match ffmpeg.probe(path).await {
        Ok(info) => check_probe(&info, size),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to validate video");
            ValidationReport::failed(e.to_string())
        }
    }
}

pub(crate) fn check_probe(info: &ProbeInfo, file_size: u64) -> ValidationReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    if file_size > MAX_FILE_SIZE {
        issues.push(format!(
            "File size exceeds YouTube limit: {:.2}GB",
            file_size as f64 / GIB
        ));
    }

    let duration = info.duration_secs().unwrap_or(0.0);
    if duration > MAX_DURATION_SECS {
        issues.push(format!(
            "Duration exceeds YouTube limit: {:.2} hours",
            duration / 3600.0
        ));
    }

    let video = info.first_stream("video");
    let video_codec = video.and_then(|s| s.codec_name.clone());
    if let Some(codec) = video_codec.as_deref().filter(|c| *c != VIDEO_CODEC) {
        warnings.push(format!("Video codec {codec} may need re-encoding"));
    }

    let audio_codec = info
        .first_stream("audio")
        .and_then(|s| s.codec_name.clone());
    if let Some(codec) = audio_codec
        .as_deref()
        .filter(|c| !matches!(*c, "aac" | "mp3"))
    {
        warnings.push(format!("Audio codec {codec} may need re-encoding"));
    }

    let resolution = video.map(|s| {
        format!(
            "{}x{}",
            s.width.map_or("None".to_owned(), |w| w.to_string()),
            s.height.map_or("None".to_owned(), |h| h.to_string())
        )
    });

    ValidationReport {
        valid: issues.is_empty(),
        issues,
        warnings,
        file_info: Some(FileInfo {
            size_gb: file_size as f64 / GIB,
            duration_minutes: duration / 60.0,
            video_codec,
            audio_codec,
            resolution,
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VideoMetadata {
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) tags: Vec<String>,
    pub(crate) category: String,
    pub(crate) thumbnail: String,
    pub(crate) ai_disclosure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) ai_disclosure_notice: Option<String>,
    pub(crate) creation_date: String,
    pub(crate) tool_version: String,
}

impl Default for VideoMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            tags: Vec::new(),
            category: String::new(),
            thumbnail: String::new(),
            ai_disclosure: true,
            ai_disclosure_notice: None,
            creation_date: Local::now().to_rfc3339(),
            tool_version: TOOL_VERSION.to_owned(),
        }
    }
}

pub(crate) fn metadata_path(video_path: &Path) -> PathBuf {
    let name = video_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".mp4").unwrap_or(&name);
    video_path.with_file_name(format!("{stem}_metadata.json"))
}

/// Writes the JSON sidecar next to `video_path`; the AI disclosure is always on.
pub(crate) fn create_metadata_file(
    video_path: &Path,
    mut metadata: VideoMetadata,
) -> anyhow::Result<PathBuf> {
    metadata.ai_disclosure = true;
    metadata.ai_disclosure_notice = Some(AI_DISCLOSURE_NOTICE.to_owned());

    let path = metadata_path(video_path);
    fs::write(&path, serde_json::to_string_pretty(&metadata)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Created metadata file");
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SeoSuggestions {
    pub(crate) title_tips: Vec<String>,
    pub(crate) description_template: String,
    pub(crate) recommended_tags: Vec<String>,
    pub(crate) thumbnail_tips: Vec<String>,
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "that", "with", "this", "from", "they", "have", "were", "their",
    "there", "what", "when", "which", "into", "your", "about", "would", "could", "been", "then",
    "them", "will", "just", "like", "over", "only", "some", "than", "very",
];

/// Most frequent words of four letters or more, ties broken alphabetically.
pub(crate) fn top_keywords(script: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in script.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() < 4 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        *counts.entry(word).or_default() += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

pub(crate) fn seo_suggestions(script_text: &str, character_desc: &str) -> SeoSuggestions {
    let description_template = format!(
        "[Brief compelling hook - 1-2 sentences]\n\
         \n\
         In this video, you'll discover:\n\
         • [Key point 1]\n\
         • [Key point 2]\n\
         • [Key point 3]\n\
         \n\
         🤖 AI Disclosure: This video uses AI-generated visuals created with OpenAI DALL-E.\n\
         \n\
         ⏱️ Timestamps:\n\
         00:00 - Introduction\n\
         [Add more timestamps based on your scenes]\n\
         \n\
         📝 Character: {character_desc}\n\
         \n\
         🔗 Links:\n\
         [Add any relevant links]\n\
         \n\
         #AIGenerated #DALLE3 #[YourNiche] #[MoreRelevantHashtags]"
    );

    let mut recommended_tags: Vec<String> = ["AI generated", "DALL-E 3", "AI video", "automated content"]
        .into_iter()
        .map(str::to_owned)
        .collect();
    recommended_tags.extend(top_keywords(script_text, 5));

    SeoSuggestions {
        title_tips: vec![
            "Keep title under 70 characters".to_owned(),
            "Include main keyword at the beginning".to_owned(),
            "Use numbers or 'How to' for better CTR".to_owned(),
            "Add emotional triggers (Amazing, Incredible, etc.)".to_owned(),
        ],
        description_template,
        recommended_tags,
        thumbnail_tips: vec![
            "Use high contrast colors".to_owned(),
            "Include text overlay (max 3-4 words)".to_owned(),
            "Show emotional face or key scene".to_owned(),
            "Resolution: 1280x720 minimum".to_owned(),
            "File size: Under 2MB".to_owned(),
        ],
    }
}

pub(crate) fn upload_checklist() -> &'static [&'static str] {
    &[
        "Video file is under 128GB",
        "Video duration is under 12 hours",
        "Video format is MP4 with H.264 codec",
        "Audio is AAC at 48kHz",
        "Title is under 100 characters",
        "Description includes AI disclosure",
        "AI content disclosure is enabled in YouTube Studio",
        "Thumbnail is created (1280x720 minimum)",
        "Tags include 'AI generated' and relevant keywords",
        "Category is selected appropriately",
        "Captions/subtitles are added if available",
        "End screen and cards are configured",
        "Monetization settings are configured (if eligible)",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::{ProbeFormat, ProbeStream};

    fn probe(duration: &str, video: &str, audio: Option<&str>) -> ProbeInfo {
        let mut streams = vec![ProbeStream {
            codec_type: Some("video".to_owned()),
            codec_name: Some(video.to_owned()),
            width: Some(1920),
            height: Some(1080),
        }];
        if let Some(audio) = audio {
            streams.push(ProbeStream {
                codec_type: Some("audio".to_owned()),
                codec_name: Some(audio.to_owned()),
                ..ProbeStream::default()
            });
        }
        ProbeInfo {
            format: ProbeFormat {
                duration: Some(duration.to_owned()),
            },
            streams,
        }
    }

    #[test]
    fn params_for_1080p() {
        let params = ffmpeg_params(Resolution::P1080);
        let joined = params.join(" ");
        assert!(joined.starts_with("-c:v libx264 -preset medium -profile:v high -level 4.0"));
        assert!(joined.contains("-b:v 8000k -maxrate 8000k -bufsize 16000k"));
        assert!(joined.contains("-c:a aac -b:a 192k -ar 48000 -ac 2"));
        assert!(joined.ends_with("-movflags +faststart -f mp4"));
    }

    #[test]
    fn params_scale_bufsize_with_bitrate() {
        let joined = ffmpeg_params(Resolution::from_name("480p")).join(" ");
        assert!(joined.contains("-b:v 2500k -maxrate 2500k -bufsize 5000k"));
        assert_eq!(Resolution::from_name("4k"), Resolution::P1080);
    }

    #[test]
    fn resolution_by_height() {
        assert_eq!(Resolution::for_height(2160), Resolution::P1080);
        assert_eq!(Resolution::for_height(720), Resolution::P720);
        assert_eq!(Resolution::for_height(719), Resolution::P480);
    }

    #[test]
    fn compliant_file_is_valid() {
        let report = check_probe(&probe("120.0", "h264", Some("aac")), 50 * 1024 * 1024);
        assert!(report.valid);
        assert!(report.issues.is_empty());
        assert!(report.warnings.is_empty());
        let info = report.file_info.unwrap();
        assert_eq!(info.duration_minutes, 2.0);
        assert_eq!(info.resolution.as_deref(), Some("1920x1080"));
    }

    #[test]
    fn oversize_and_overlong_are_issues() {
        let report = check_probe(&probe("50000", "h264", Some("aac")), MAX_FILE_SIZE + 1);
        assert!(!report.valid);
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues[0].starts_with("File size exceeds YouTube limit"));
        assert_eq!(report.issues[1], "Duration exceeds YouTube limit: 13.89 hours");
    }

    #[test]
    fn odd_codecs_are_warnings() {
        let report = check_probe(&probe("10", "vp9", Some("opus")), 1000);
        assert!(report.valid);
        assert_eq!(
            report.warnings,
            vec![
                "Video codec vp9 may need re-encoding",
                "Audio codec opus may need re-encoding"
            ]
        );
        let mp3 = check_probe(&probe("10", "h264", Some("mp3")), 1000);
        assert!(mp3.warnings.is_empty());
    }

    #[test]
    fn silent_video_has_no_audio_codec() {
        let report = check_probe(&probe("10", "h264", None), 1000);
        assert!(report.file_info.unwrap().audio_codec.is_none());
    }

    #[test]
    fn sidecar_path_replaces_mp4() {
        assert_eq!(
            metadata_path(Path::new("/out/final_video.mp4")),
            PathBuf::from("/out/final_video_metadata.json")
        );
        assert_eq!(
            metadata_path(Path::new("/out/clip.mov")),
            PathBuf::from("/out/clip.mov_metadata.json")
        );
    }

    #[test]
    fn sidecar_forces_disclosure() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("final_video.mp4");
        let metadata = VideoMetadata {
            title: "A knight's tale".to_owned(),
            ai_disclosure: false,
            ..VideoMetadata::default()
        };
        let path = create_metadata_file(&video, metadata).unwrap();
        let saved: VideoMetadata = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert!(saved.ai_disclosure);
        assert!(saved.ai_disclosure_notice.unwrap().contains("AI-generated"));
        assert_eq!(saved.title, "A knight's tale");
    }

    #[test]
    fn keywords_rank_by_frequency() {
        let words = top_keywords("Dragon dragon castle. The dragon flew over the castle and knight", 2);
        assert_eq!(words, vec!["dragon", "castle"]);
    }

    #[test]
    fn seo_mentions_character_and_keywords() {
        let seo = seo_suggestions("robots robots build cities", "a shiny robot");
        assert!(seo.description_template.contains("📝 Character: a shiny robot"));
        assert!(seo.recommended_tags.contains(&"robots".to_owned()));
        assert_eq!(seo.recommended_tags[0], "AI generated");
        assert_eq!(seo.thumbnail_tips.len(), 5);
    }

    #[test]
    fn checklist_has_every_step() {
        assert_eq!(upload_checklist().len(), 13);
    }
}
