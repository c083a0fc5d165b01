use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) enum ImageStyle {
    #[default]
    Photorealistic,
    Cinematic,
    #[serde(rename = "Anime/Manga")]
    AnimeManga,
    #[serde(rename = "3D Render")]
    Render3d,
    #[serde(rename = "Oil Painting")]
    OilPainting,
    Watercolor,
    #[serde(rename = "Comic Book")]
    ComicBook,
    #[serde(rename = "Digital Art")]
    DigitalArt,
}

impl ImageStyle {
    pub(crate) const ALL: [ImageStyle; 8] = [
        ImageStyle::Photorealistic,
        ImageStyle::Cinematic,
        ImageStyle::AnimeManga,
        ImageStyle::Render3d,
        ImageStyle::OilPainting,
        ImageStyle::Watercolor,
        ImageStyle::ComicBook,
        ImageStyle::DigitalArt,
    ];

    pub(crate) fn name(self) -> &'static str {
        match self {
            ImageStyle::Photorealistic => "Photorealistic",
            ImageStyle::Cinematic => "Cinematic",
            ImageStyle::AnimeManga => "Anime/Manga",
            ImageStyle::Render3d => "3D Render",
            ImageStyle::OilPainting => "Oil Painting",
            ImageStyle::Watercolor => "Watercolor",
            ImageStyle::ComicBook => "Comic Book",
            ImageStyle::DigitalArt => "Digital Art",
        }
    }

    pub(crate) fn guidelines(self) -> &'static str {
        match self {
            ImageStyle::Photorealistic => {
                "Realistic proportions, natural textures, authentic environments"
            }
            ImageStyle::Cinematic => "Movie-like composition, dramatic angles, film color grading",
            ImageStyle::AnimeManga => {
                "Japanese animation style, expressive features, vibrant colors"
            }
            ImageStyle::Render3d => "Pixar-like quality, smooth surfaces, ambient occlusion",
            ImageStyle::OilPainting => {
                "Visible brush strokes, rich textures, classical composition"
            }
            ImageStyle::Watercolor => "Soft edges, flowing colors, paper texture visible",
            ImageStyle::ComicBook => {
                "Bold outlines, flat colors, dynamic poses, speech bubble ready"
            }
            ImageStyle::DigitalArt => {
                "Modern digital painting style, vibrant colors, fantasy elements ok"
            }
        }
    }
}

impl fmt::Display for ImageStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        ImageStyle::ALL
            .into_iter()
            .find(|style| normalize(style.name()) == wanted)
            .ok_or_else(|| {
                let names: Vec<_> = ImageStyle::ALL.iter().map(|s| s.name()).collect();
                anyhow::anyhow!("Unknown style '{s}', expected one of: {}", names.join(", "))
            })
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

pub(crate) fn scene_prompt(
    script_segment: &str,
    character_desc: &str,
    style: ImageStyle,
    scene_number: usize,
) -> String {
    let mut prompt = format!(
        "Create a {style} style image. \n\n\
         Main character: {character_desc}\n\n\
         Scene {scene_number} context: {script_segment}\n\n\
         Important guidelines:\n\
         - Maintain exact same character appearance as described\n\
         - {guidelines}\n\
         - Professional quality suitable for video content\n\
         - Clear focal point on the main character\n\
         - Appropriate lighting and composition",
        style = style.name().to_lowercase(),
        guidelines = style.guidelines(),
    );

    match style {
        ImageStyle::Cinematic => {
            prompt.push_str("\n- Wide aspect ratio feeling, dramatic lighting");
            prompt.push_str("\n- Film grain texture, color grading like a movie");
        }
        ImageStyle::Photorealistic => {
            prompt.push_str("\n- Ultra realistic details, natural lighting");
            prompt.push_str("\n- Shot with professional camera, shallow depth of field");
        }
        _ => {}
    }

    prompt
}

pub(crate) fn character_reference_prompt(character_desc: &str, style: ImageStyle) -> String {
    format!(
        "Create a character reference sheet in {} style.\n\n\
         Character: {character_desc}\n\n\
         Show the character in a neutral pose, full body visible, facing forward.\n\
         Clear details of face, clothing, and distinguishing features.\n\
         White or simple background.\n\
         Reference sheet style suitable for maintaining consistency.",
        style.name().to_lowercase()
    )
}
