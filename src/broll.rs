use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::audio;
use crate::video::VideoProcessor;

pub(crate) const REORGANIZED_FILE: &str = "broll_reorganized.mp4";
pub(crate) const WITH_VOICEOVER_FILE: &str = "broll_with_voiceover.mp4";

#[derive(Debug, Clone, Default)]
pub(crate) struct BrollRequest {
    pub(crate) broll_paths: Vec<PathBuf>,
    pub(crate) intro_paths: Vec<PathBuf>,
    pub(crate) voiceover_path: Option<PathBuf>,
    pub(crate) sync_duration: bool,
    pub(crate) overlay_audio: bool,
    pub(crate) output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BrollOutput {
    pub(crate) reorganized: PathBuf,
    pub(crate) with_voiceover: Option<PathBuf>,
}

/// Intro clips in their given order, followed by the B-roll in random order.
pub(crate) fn plan<R: Rng + ?Sized>(intro: &[PathBuf], broll: &[PathBuf], rng: &mut R) -> Vec<PathBuf> {
    let mut shuffled = broll.to_vec();
    shuffled.shuffle(rng);
    intro.iter().cloned().chain(shuffled).collect()
}

pub(crate) async fn run(processor: &VideoProcessor, request: &BrollRequest) -> anyhow::Result<BrollOutput> {
    if request.broll_paths.is_empty() {
        anyhow::bail!("No B-roll clips selected");
    }
    info!("Starting B-roll reorganization");

    let target_duration = match (&request.voiceover_path, request.sync_duration) {
        (Some(voiceover), true) => {
            info!("Analyzing voiceover duration");
            Some(audio::duration(Some(processor.ffmpeg()), voiceover).await?)
        }
        _ => None,
    };

    info!(
        intro = request.intro_paths.len(),
        broll = request.broll_paths.len(),
        "Shuffling B-roll clips"
    );
    let clips = plan(&request.intro_paths, &request.broll_paths, &mut rand::rng());

    let reorganized = processor
        .concatenate_clips(&clips, &request.output_dir.join(REORGANIZED_FILE), target_duration)
        .await?;

    let with_voiceover = match (&request.voiceover_path, request.overlay_audio) {
        (Some(voiceover), true) => {
            info!("Overlaying voiceover");
            Some(
                processor
                    .add_audio_to_video(
                        &reorganized,
                        voiceover,
                        &request.output_dir.join(WITH_VOICEOVER_FILE),
                    )
                    .await?,
            )
        }
        _ => None,
    };

    info!("B-roll reorganization completed");
    Ok(BrollOutput {
        reorganized,
        with_voiceover,
    })
}

pub(crate) fn describe(output: &BrollOutput) -> String {
    let mut lines = vec![format!("Reorganized: {}", output.reorganized.display())];
    if let Some(path) = &output.with_voiceover {
        lines.push(format!("With voiceover: {}", path.display()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffmpeg::Ffmpeg;
    use crate::youtube::Resolution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn intro_stays_first_and_broll_is_a_permutation() {
        let intro = paths(&["intro1.mp4", "intro2.mp4"]);
        let broll = paths(&["a.mp4", "b.mp4", "c.mp4", "d.mp4", "e.mp4"]);
        let mut rng = StdRng::seed_from_u64(7);

        let planned = plan(&intro, &broll, &mut rng);
        assert_eq!(planned.len(), 7);
        assert_eq!(&planned[..2], intro.as_slice());

        let mut tail = planned[2..].to_vec();
        tail.sort();
        assert_eq!(tail, broll);
    }

    #[test]
    fn same_seed_same_order() {
        let broll = paths(&["a.mp4", "b.mp4", "c.mp4", "d.mp4", "e.mp4", "f.mp4"]);
        let first = plan(&[], &broll, &mut StdRng::seed_from_u64(42));
        let second = plan(&[], &broll, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn input_is_left_untouched() {
        let broll = paths(&["a.mp4", "b.mp4", "c.mp4"]);
        let before = broll.clone();
        let _ = plan(&[], &broll, &mut StdRng::seed_from_u64(1));
        assert_eq!(broll, before);
    }

    #[tokio::test]
    async fn empty_request_is_rejected() {
        let processor = VideoProcessor::new(Ffmpeg::with_paths("ffmpeg", "ffprobe"), Resolution::P1080, 30);
        let err = run(&processor, &BrollRequest::default()).await.unwrap_err();
        assert!(err.to_string().contains("No B-roll clips"));
    }

    #[test]
    fn describe_lists_outputs() {
        let output = BrollOutput {
            reorganized: PathBuf::from("out/broll_reorganized.mp4"),
            with_voiceover: Some(PathBuf::from("out/broll_with_voiceover.mp4")),
        };
        assert_eq!(
            describe(&output),
            "Reorganized: out/broll_reorganized.mp4\nWith voiceover: out/broll_with_voiceover.mp4"
        );
    }
}
