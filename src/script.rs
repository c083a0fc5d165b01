use tracing::info;

/// Splits a script into `num_segments` runs of whitespace-separated words.
///
/// Each segment gets `words / num_segments` words and the last one takes the
/// remainder, so short scripts leave the leading segments empty.
pub(crate) fn split_script(script: &str, num_segments: usize) -> anyhow::Result<Vec<String>> {
    if num_segments == 0 {
        anyhow::bail!("Number of segments must be positive");
    }
    let words: Vec<&str> = script.split_whitespace().collect();
    let per_segment = words.len() / num_segments;

    Ok((0..num_segments)
        .map(|i| {
            let start = i * per_segment;
            let end = if i == num_segments - 1 {
                words.len()
            } else {
                start + per_segment
            };
            words[start..end].join(" ")
        })
        .collect())
}

/// Evenly spaced scene start times over `total_duration` seconds.
pub(crate) fn generate_timestamps(total_duration: f64, num_segments: usize) -> anyhow::Result<Vec<f64>> {
    if num_segments == 0 {
        anyhow::bail!("Number of segments must be positive");
    }
    let segment_duration = total_duration / num_segments as f64;
    let timestamps = (0..num_segments)
        .map(|i| i as f64 * segment_duration)
        .collect();
    info!(
        num_segments,
        total_duration,
        "Generated scene timestamps"
    );
    Ok(timestamps)
}

pub(crate) fn scene_durations(timestamps: &[f64], total_duration: f64) -> Vec<f64> {
    timestamps
        .iter()
        .enumerate()
        .map(|(i, start)| match timestamps.get(i + 1) {
            Some(next) => next - start,
            None => total_duration - start,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_segment_takes_remainder() {
        let segments = split_script("one two three four five six seven", 3).unwrap();
        assert_eq!(segments, vec!["one two", "three four", "five six seven"]);
    }

    #[test]
    fn collapses_whitespace() {
        let segments = split_script("a\n\nb   c\td", 2).unwrap();
        assert_eq!(segments, vec!["a b", "c d"]);
    }

    #[test]
    fn fewer_words_than_segments() {
        let segments = split_script("only two", 4).unwrap();
        assert_eq!(segments, vec!["", "", "", "only two"]);
    }

    #[test]
    fn zero_segments_is_an_error() {
        assert!(split_script("text", 0).is_err());
        assert!(generate_timestamps(10.0, 0).is_err());
    }

    #[test]
    fn timestamps_are_even() {
        assert_eq!(generate_timestamps(60.0, 4).unwrap(), vec![0.0, 15.0, 30.0, 45.0]);
    }

    #[test]
    fn durations_cover_total() {
        let timestamps = generate_timestamps(10.0, 4).unwrap();
        let durations = scene_durations(&timestamps, 10.0);
        assert_eq!(durations, vec![2.5, 2.5, 2.5, 2.5]);
        assert!((durations.iter().sum::<f64>() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn durations_of_empty_list() {
        assert!(scene_durations(&[], 5.0).is_empty());
    }
}
