// Low-confidence clustering
//
// Groups uncertain words into clip-sized windows for re-transcription. The
// correction window is deliberately wide relative to the proximity gap so
// neighboring uncertainties collapse into one second-pass call, which is the
// expensive leg of the pipeline.

use crate::asr::WordTiming;

/// Parameters controlling cluster formation
#[derive(Debug, Clone, Copy)]
pub struct ClusteringParams {
    /// Words below this probability are correction candidates
    pub confidence_threshold: f64,
    /// Max gap in seconds between words of one cluster
    pub proximity_seconds: f64,
    /// Width in seconds of the clip window around a cluster's center
    pub correction_window_seconds: f64,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.60,
            proximity_seconds: 5.0,
            correction_window_seconds: 20.0,
        }
    }
}

/// A group of low-confidence words plus the wider audio window to re-transcribe
#[derive(Debug, Clone)]
pub struct Cluster {
    pub words: Vec<WordTiming>,
    pub start_time: f64,
    pub end_time: f64,
    pub center_time: f64,
    pub average_confidence: f64,
    pub clip_start: f64,
    pub clip_end: f64,
}

/// Build non-overlapping correction windows from the full word sequence.
///
/// `clip_end` is not capped at the file duration here; the slicer clamps
/// when it knows the source length.
pub fn cluster_low_confidence(words: &[WordTiming], params: &ClusteringParams) -> Vec<Cluster> {
    // Step 1: keep only the uncertain words, in order
    let low_confidence: Vec<&WordTiming> = words
        .iter()
        .filter(|w| w.probability < params.confidence_threshold)
        .collect();

    if low_confidence.is_empty() {
        return Vec::new();
    }

    // Step 2: group by proximity. A zero gap (shared boundary or identical
    // timestamps) stays in the same cluster.
    let mut groups: Vec<Vec<&WordTiming>> = Vec::new();
    let mut current: Vec<&WordTiming> = vec![low_confidence[0]];

    for &word in &low_confidence[1..] {
        let last_end = current.last().map(|w| w.end).unwrap_or(0.0);
        if word.start - last_end <= params.proximity_seconds {
            current.push(word);
        } else {
            groups.push(std::mem::take(&mut current));
            current.push(word);
        }
    }
    groups.push(current);

    // Step 3: annotate each group with its timing and clip window
    let half_window = params.correction_window_seconds / 2.0;
    let clusters: Vec<Cluster> = groups
        .into_iter()
        .map(|group| annotate(group, half_window))
        .collect();

    // Step 4: merge clusters whose clip windows touch or overlap
    merge_overlapping(clusters)
}

fn annotate(group: Vec<&WordTiming>, half_window: f64) -> Cluster {
    let start_time = group.first().map(|w| w.start).unwrap_or(0.0);
    let end_time = group.last().map(|w| w.end).unwrap_or(0.0);
    let center_time = (start_time + end_time) / 2.0;
    let average_confidence =
        group.iter().map(|w| w.probability).sum::<f64>() / group.len() as f64;

    Cluster {
        words: group.into_iter().cloned().collect(),
        start_time,
        end_time,
        center_time,
        average_confidence,
        clip_start: (center_time - half_window).max(0.0),
        clip_end: center_time + half_window,
    }
}

/// Single left-to-right pass. The merged center is the midpoint of the two
/// centers (not recomputed from the words) and the merged confidence is the
/// word-count-weighted mean; both are part of the contract downstream code
/// relies on.
fn merge_overlapping(clusters: Vec<Cluster>) -> Vec<Cluster> {
    let mut merged: Vec<Cluster> = Vec::new();
    let mut iter = clusters.into_iter();

    let Some(mut current) = iter.next() else {
        return merged;
    };

    for next in iter {
        if current.clip_end >= next.clip_start {
            let current_count = current.words.len() as f64;
            let next_count = next.words.len() as f64;

            current.average_confidence = (current.average_confidence * current_count
                + next.average_confidence * next_count)
                / (current_count + next_count);
            current.center_time = (current.center_time + next.center_time) / 2.0;
            current.start_time = current.start_time.min(next.start_time);
            current.end_time = current.end_time.max(next.end_time);
            current.clip_start = current.clip_start.min(next.clip_start);
            current.clip_end = current.clip_end.max(next.clip_end);
            current.words.extend(next.words);
        } else {
            merged.push(std::mem::replace(&mut current, next));
        }
    }

    merged.push(current);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, start: f64, end: f64, probability: f64) -> WordTiming {
        WordTiming {
            word: text.to_string(),
            start,
            end,
            probability,
        }
    }

    fn default_params() -> ClusteringParams {
        ClusteringParams::default()
    }

    #[test]
    fn test_empty_input_yields_no_clusters() {
        assert!(cluster_low_confidence(&[], &default_params()).is_empty());
    }

    #[test]
    fn test_all_confident_words_yield_no_clusters() {
        let words = vec![
            word("clear", 0.0, 0.5, 0.99),
            word("speech", 0.5, 1.0, 0.85),
            word("here", 1.0, 1.5, 0.61),
        ];
        assert!(cluster_low_confidence(&words, &default_params()).is_empty());
    }

    #[test]
    fn test_single_low_confidence_word() {
        let words = vec![
            word("Hello", 0.0, 0.5, 0.95),
            word("world", 0.5, 1.0, 0.45),
            word("test", 1.0, 1.5, 0.90),
        ];

        let clusters = cluster_low_confidence(&words, &default_params());
        assert_eq!(clusters.len(), 1);

        let cluster = &clusters[0];
        assert_eq!(cluster.words.len(), 1);
        assert_eq!(cluster.words[0].word, "world");
        assert_eq!(cluster.start_time, 0.5);
        assert_eq!(cluster.end_time, 1.0);
        assert_eq!(cluster.center_time, 0.75);
        assert_eq!(cluster.average_confidence, 0.45);
        // Window floored at zero on the left, full half-window on the right
        assert_eq!(cluster.clip_start, 0.0);
        assert_eq!(cluster.clip_end, 10.75);
    }

    #[test]
    fn test_window_width_when_not_floored() {
        let words = vec![word("mumble", 100.0, 100.4, 0.2)];
        let clusters = cluster_low_confidence(&words, &default_params());

        assert_eq!(clusters.len(), 1);
        let width = clusters[0].clip_end - clusters[0].clip_start;
        assert!((width - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_nearby_words_share_a_cluster() {
        let words = vec![
            word("a", 0.0, 0.5, 0.3),
            word("b", 2.0, 2.5, 0.4),
            word("c", 6.0, 6.5, 0.5),
        ];

        // Gaps of 1.5s and 3.5s, both within the 5s proximity
        let clusters = cluster_low_confidence(&words, &default_params());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].words.len(), 3);
        assert!((clusters[0].average_confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_distant_words_form_separate_clusters() {
        // Far enough apart that even the clip windows cannot touch
        let words = vec![
            word("a", 0.0, 0.5, 0.3),
            word("b", 60.0, 60.5, 0.4),
            word("c", 120.0, 120.5, 0.5),
        ];

        let clusters = cluster_low_confidence(&words, &default_params());
        assert_eq!(clusters.len(), 3);
        for (cluster, original) in clusters.iter().zip(&words) {
            assert_eq!(cluster.words.len(), 1);
            assert_eq!(cluster.words[0].word, original.word);
        }
    }

    #[test]
    fn test_proximity_split_then_window_merge() {
        // 9.5s apart: beyond the 5s proximity, so two clusters form, but
        // their 20s windows overlap and the merge pass collapses them.
        let words = vec![
            word("first", 0.0, 0.5, 0.3),
            word("second", 10.0, 10.5, 0.5),
        ];

        let clusters = cluster_low_confidence(&words, &default_params());
        assert_eq!(clusters.len(), 1);

        let cluster = &clusters[0];
        assert_eq!(cluster.words.len(), 2);
        assert_eq!(cluster.clip_start, 0.0);
        assert_eq!(cluster.clip_end, 20.25);
        // Midpoint of the two centers, not recomputed from the words
        assert_eq!(cluster.center_time, 5.25);
        // Word-count-weighted mean of the two cluster averages
        assert!((cluster.average_confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_zero_gap_words_do_not_split() {
        // Identical timestamps and shared boundaries are zero-distance
        let words = vec![
            word("um", 1.0, 1.0, 0.2),
            word("uh", 1.0, 1.0, 0.3),
            word("er", 1.0, 1.5, 0.1),
        ];

        let clusters = cluster_low_confidence(&words, &default_params());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].words.len(), 3);
    }

    #[test]
    fn test_output_windows_are_non_overlapping() {
        let words = vec![
            word("a", 5.0, 5.5, 0.1),
            word("b", 30.0, 30.5, 0.2),
            word("c", 31.0, 31.5, 0.3),
            word("d", 90.0, 90.5, 0.4),
        ];

        let clusters = cluster_low_confidence(&words, &default_params());
        for pair in clusters.windows(2) {
            assert!(pair[0].clip_end < pair[1].clip_start);
        }
        for cluster in &clusters {
            assert!(cluster.clip_start < cluster.clip_end);
        }
    }

    #[test]
    fn test_custom_threshold() {
        let words = vec![
            word("a", 0.0, 0.5, 0.75),
            word("b", 0.5, 1.0, 0.85),
        ];

        let strict = ClusteringParams {
            confidence_threshold: 0.8,
            ..Default::default()
        };

        let clusters = cluster_low_confidence(&words, &strict);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].words[0].word, "a");
    }
}
