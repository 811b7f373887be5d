// Correction reconciliation
//
// Two jobs: judge whether a second-pass transcription is safe to accept, and
// stitch the accepted corrections back into the original word sequence. The
// edit-distance ratio guard is what keeps a hallucinating model from
// corrupting the transcript.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::asr::WordTiming;
use crate::corrector::UNINTELLIGIBLE_SENTINEL;

/// Corrections whose cleaned edit ratio exceeds this are assumed to be
/// hallucinations: a real re-transcription of a short clip should not differ
/// from the first pass by more than ~70% of its length.
const MAX_EDIT_RATIO: f64 = 0.70;

/// Cleaned corrections shorter than this carry no usable signal
const MIN_CORRECTION_CHARS: usize = 3;

static NON_WORD_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static PURE_PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^[.,!?;:'"()\-]+$"#).unwrap());

/// Verdict on one candidate correction
#[derive(Debug, Clone)]
pub struct CorrectionOutcome {
    /// Space-joined first-pass words inside the clip window
    pub original_text: String,
    /// The candidate text as received (whitespace-trimmed only)
    pub corrected_text: String,
    pub levenshtein_distance: usize,
    pub should_apply: bool,
    pub reason: Option<String>,
}

/// A correction as the merge stage consumes it
#[derive(Debug, Clone)]
pub struct PlannedCorrection {
    pub clip_start: f64,
    pub clip_end: f64,
    pub corrected_text: String,
    pub should_apply: bool,
}

/// Result of merging corrections into the original word sequence
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub text: String,
    pub applied_corrections: usize,
    pub skipped_corrections: usize,
}

/// Aggressive normalization so surface differences (case, punctuation) do not
/// count toward the edit distance.
pub fn clean(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD_CHARS.replace_all(&lowered, "");
    let collapsed = WHITESPACE_RUNS.replace_all(&stripped, " ");
    collapsed.trim().to_string()
}

/// Classical Wagner-Fischer over characters, insert/delete/substitute at
/// cost 1 each.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;

        for (j, b_char) in b_chars.iter().enumerate() {
            let substitution_cost = if a_char == b_char { 0 } else { 1 };
            current[j + 1] = (previous[j] + substitution_cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }

        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

/// Judge one candidate correction against the words inside its clip window.
/// Always produces an outcome; rejections carry the reason for the audit row.
pub fn evaluate_correction(
    words: &[WordTiming],
    corrected_text: &str,
    clip_start: f64,
    clip_end: f64,
) -> CorrectionOutcome {
    let words_in_window: Vec<&WordTiming> = words
        .iter()
        .filter(|w| w.start >= clip_start && w.end <= clip_end)
        .collect();

    let original_text = words_in_window
        .iter()
        .map(|w| w.word.trim())
        .collect::<Vec<_>>()
        .join(" ");

    let corrected_trimmed = corrected_text.trim().to_string();

    let cleaned_original = clean(&original_text);
    let cleaned_correction = clean(&corrected_trimmed);

    let distance = levenshtein(&cleaned_original, &cleaned_correction);

    let longest = cleaned_original
        .chars()
        .count()
        .max(cleaned_correction.chars().count());
    let ratio = if longest == 0 {
        0.0
    } else {
        distance as f64 / longest as f64
    };

    let reject = |reason: &str| CorrectionOutcome {
        original_text: original_text.clone(),
        corrected_text: corrected_trimmed.clone(),
        levenshtein_distance: distance,
        should_apply: false,
        reason: Some(reason.to_string()),
    };

    let is_sentinel = corrected_trimmed.eq_ignore_ascii_case(UNINTELLIGIBLE_SENTINEL)
        || cleaned_correction == clean(UNINTELLIGIBLE_SENTINEL);

    if cleaned_correction.is_empty()
        || is_sentinel
        || cleaned_correction.chars().count() < MIN_CORRECTION_CHARS
    {
        return reject("empty or unintelligible");
    }

    if ratio > MAX_EDIT_RATIO {
        return reject("Levenshtein ratio too high");
    }

    if cleaned_original == cleaned_correction {
        return reject("No changes");
    }

    CorrectionOutcome {
        original_text,
        corrected_text: corrected_trimmed,
        levenshtein_distance: distance,
        should_apply: true,
        reason: None,
    }
}

/// Stitch accepted corrections into the original word sequence, preserving
/// time order. Corrections arrive non-overlapping from clustering; a sort by
/// clip start is all the ordering this needs.
///
/// A word is replaced by a correction when it ends inside the correction's
/// window; a word straddling the window's end is kept, since its tail was
/// never re-transcribed.
pub fn merge_corrections(words: &[WordTiming], corrections: &[PlannedCorrection]) -> MergeResult {
    let mut ordered: Vec<&PlannedCorrection> = corrections.iter().collect();
    ordered.sort_by(|a, b| {
        a.clip_start
            .partial_cmp(&b.clip_start)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut tokens: Vec<&str> = Vec::new();
    let mut applied = 0usize;
    let mut skipped = 0usize;
    let mut cursor = 0usize;

    for correction in ordered {
        if !correction.should_apply {
            skipped += 1;
            continue;
        }

        // Words fully before the window pass through untouched
        while cursor < words.len() && words[cursor].end <= correction.clip_start {
            tokens.push(words[cursor].word.trim());
            cursor += 1;
        }

        tokens.push(correction.corrected_text.trim());
        applied += 1;

        // Skip the words the correction replaces
        while cursor < words.len() && words[cursor].end <= correction.clip_end {
            cursor += 1;
        }
    }

    while cursor < words.len() {
        tokens.push(words[cursor].word.trim());
        cursor += 1;
    }

    MergeResult {
        text: join_tokens(&tokens),
        applied_corrections: applied,
        skipped_corrections: skipped,
    }
}

/// Space-join, except across pure punctuation tokens
fn join_tokens(tokens: &[&str]) -> String {
    let mut out = String::new();

    for (index, token) in tokens.iter().enumerate() {
        if index > 0
            && !PURE_PUNCTUATION.is_match(token)
            && !PURE_PUNCTUATION.is_match(tokens[index - 1])
        {
            out.push(' ');
        }
        out.push_str(token);
    }

    out
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

    #[test]
    fn test_clean_normalizes_surface_forms() {
        assert_eq!(clean("Hello, World!"), "hello world");
        assert_eq!(clean("  lots\t of   space "), "lots of space");
        assert_eq!(clean("'(punct-only)'"), "punctonly");
        assert_eq!(clean(""), "");
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn test_evaluate_accepts_plausible_fix() {
        let words = vec![
            word("the", 0.0, 0.4, 0.5),
            word("red", 0.4, 0.8, 0.4),
            word("fox", 0.8, 1.2, 0.9),
        ];

        let outcome = evaluate_correction(&words, "the red box", 0.0, 2.0);
        assert!(outcome.should_apply);
        assert_eq!(outcome.original_text, "the red fox");
        assert_eq!(outcome.levenshtein_distance, 1);
        assert!(outcome.reason.is_none());
    }

    #[test]
    fn test_evaluate_rejects_hallucination() {
        let words = vec![
            word("the", 0.0, 0.4, 0.5),
            word("red", 0.4, 0.8, 0.4),
            word("fox", 0.8, 1.2, 0.9),
        ];

        let outcome = evaluate_correction(
            &words,
            "Completely different sentence with no relation",
            0.0,
            2.0,
        );
        assert!(!outcome.should_apply);
        assert!(outcome.reason.unwrap().contains("Levenshtein"));
    }

    #[test]
    fn test_evaluate_rejects_sentinel() {
        let words = vec![word("mumble", 0.0, 0.5, 0.3)];

        let outcome = evaluate_correction(&words, "[unintelligible]", 0.0, 1.0);
        assert!(!outcome.should_apply);
        assert!(outcome.reason.unwrap().contains("empty or unintelligible"));
    }

    #[test]
    fn test_evaluate_rejects_empty_and_tiny() {
        let words = vec![word("mumble", 0.0, 0.5, 0.3)];

        let empty = evaluate_correction(&words, "   ", 0.0, 1.0);
        assert!(!empty.should_apply);
        assert_eq!(empty.reason.as_deref(), Some("empty or unintelligible"));

        let tiny = evaluate_correction(&words, "a.", 0.0, 1.0);
        assert!(!tiny.should_apply);
        assert_eq!(tiny.reason.as_deref(), Some("empty or unintelligible"));
    }

    #[test]
    fn test_evaluate_rejects_no_changes() {
        let words = vec![
            word("hello", 0.0, 0.5, 0.4),
            word("world", 0.5, 1.0, 0.5),
        ];

        // Same text modulo case and punctuation
        let outcome = evaluate_correction(&words, "Hello, world!", 0.0, 1.5);
        assert!(!outcome.should_apply);
        assert_eq!(outcome.reason.as_deref(), Some("No changes"));
        assert_eq!(outcome.levenshtein_distance, 0);
    }

    #[test]
    fn test_evaluate_window_is_containment_based() {
        let words = vec![
            word("outside", 0.0, 1.0, 0.9),
            word("inside", 1.0, 2.0, 0.4),
            word("straddles", 1.8, 3.5, 0.9),
        ];

        let outcome = evaluate_correction(&words, "completely inside", 1.0, 3.0);
        assert_eq!(outcome.original_text, "inside");
    }

    #[test]
    fn test_merge_with_no_corrections_roundtrips() {
        let words = vec![
            word("all", 0.0, 0.5, 0.9),
            word("clear", 0.5, 1.0, 0.9),
            word("here", 1.0, 1.5, 0.9),
        ];

        let result = merge_corrections(&words, &[]);
        assert_eq!(result.text, "all clear here");
        assert_eq!(result.applied_corrections, 0);
        assert_eq!(result.skipped_corrections, 0);
    }

    #[test]
    fn test_merge_all_skipped_roundtrips() {
        let words = vec![
            word("all", 0.0, 0.5, 0.9),
            word("clear", 0.5, 1.0, 0.9),
        ];
        let corrections = vec![PlannedCorrection {
            clip_start: 0.0,
            clip_end: 1.0,
            corrected_text: "ignored".to_string(),
            should_apply: false,
        }];

        let result = merge_corrections(&words, &corrections);
        assert_eq!(result.text, "all clear");
        assert_eq!(result.applied_corrections, 0);
        assert_eq!(result.skipped_corrections, 1);
    }

    #[test]
    fn test_merge_single_acceptance() {
        let words = vec![
            word("Hello", 0.0, 0.5, 0.95),
            word("mumbly", 0.5, 1.0, 0.45),
            word("world", 1.0, 1.5, 0.95),
        ];
        let corrections = vec![PlannedCorrection {
            clip_start: 0.3,
            clip_end: 1.2,
            corrected_text: "beautiful".to_string(),
            should_apply: true,
        }];

        let result = merge_corrections(&words, &corrections);
        assert_eq!(result.text, "beautiful world");
        assert_eq!(result.applied_corrections, 1);
        assert_eq!(result.skipped_corrections, 0);
    }

    #[test]
    fn test_merge_counts_add_up() {
        let words = vec![
            word("a", 0.0, 0.5, 0.9),
            word("b", 5.0, 5.5, 0.4),
            word("c", 10.0, 10.5, 0.4),
            word("d", 15.0, 15.5, 0.9),
        ];
        let corrections = vec![
            PlannedCorrection {
                clip_start: 4.5,
                clip_end: 6.0,
                corrected_text: "bee".to_string(),
                should_apply: true,
            },
            PlannedCorrection {
                clip_start: 9.5,
                clip_end: 11.0,
                corrected_text: "sea".to_string(),
                should_apply: false,
            },
        ];

        let result = merge_corrections(&words, &corrections);
        assert_eq!(
            result.applied_corrections + result.skipped_corrections,
            corrections.len()
        );
        assert_eq!(result.text, "a bee c d");
    }

    #[test]
    fn test_merge_emits_corrections_in_time_order() {
        let words = vec![
            word("one", 0.0, 0.5, 0.4),
            word("two", 10.0, 10.5, 0.4),
            word("three", 20.0, 20.5, 0.9),
        ];
        // Deliberately out of order; merge sorts by clip start
        let corrections = vec![
            PlannedCorrection {
                clip_start: 9.5,
                clip_end: 11.0,
                corrected_text: "TWO".to_string(),
                should_apply: true,
            },
            PlannedCorrection {
                clip_start: 0.0,
                clip_end: 1.0,
                corrected_text: "ONE".to_string(),
                should_apply: true,
            },
        ];

        let result = merge_corrections(&words, &corrections);
        assert_eq!(result.text, "ONE TWO three");
        assert_eq!(result.applied_corrections, 2);
    }

    #[test]
    fn test_merge_token_count_lower_bound() {
        let words = vec![
            word("a", 0.0, 0.5, 0.4),
            word("b", 0.5, 1.0, 0.4),
            word("c", 5.0, 5.5, 0.9),
        ];
        let corrections = vec![PlannedCorrection {
            clip_start: 0.0,
            clip_end: 1.5,
            corrected_text: "ab".to_string(),
            should_apply: true,
        }];

        let result = merge_corrections(&words, &corrections);
        let token_count = result.text.split_whitespace().count();
        // 3 originals - 2 replaced + 1 correction token
        assert!(token_count >= words.len() - 2 + 1);
        assert_eq!(result.text, "ab c");
    }

    #[test]
    fn test_join_skips_space_around_punctuation() {
        assert_eq!(join_tokens(&["hello", ",", "world"]), "hello,world");
        assert_eq!(join_tokens(&["hello", "world", "!"]), "hello world!");
        assert_eq!(join_tokens(&["hello", "world"]), "hello world");
        assert_eq!(join_tokens(&[]), "");
    }
}
