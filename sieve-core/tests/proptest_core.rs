//! Property-based tests for core components using proptest.

use proptest::prelude::*;

use chrono::{TimeZone, Utc};
use sieve_core::config::ModelsConfig;
use sieve_core::filter::partition;
use sieve_core::scorer::parse_score;
use sieve_core::sink::derive_filename;
use sieve_core::tokens::{ProfileTokenizers, segment_words};
use sieve_core::types::ModelProfile;

// --- Slice partitioning ---

proptest! {
    #[test]
    fn partition_covers_all_items_contiguously(len in 0usize..5_000, workers in 1usize..64) {
        let slices = partition(len, workers);
        prop_assert_eq!(slices.len(), workers);
        prop_assert_eq!(slices.iter().map(|r| r.len()).sum::<usize>(), len);

        let mut next = 0;
        for slice in &slices {
            prop_assert_eq!(slice.start, next);
            next = slice.end;
        }
        prop_assert_eq!(next, len);
    }

    #[test]
    fn partition_remainder_lands_in_last_slice(len in 0usize..5_000, workers in 1usize..64) {
        let slices = partition(len, workers);
        let base = len / workers;
        for slice in &slices[..workers - 1] {
            prop_assert_eq!(slice.len(), base);
        }
        prop_assert_eq!(slices[workers - 1].len(), base + len % workers);
    }
}

// --- Judge output parsing ---

proptest! {
    #[test]
    fn score_in_range_parses(score in 0u8..=4, prefix in "[a-zA-Z :]{0,12}") {
        let parsed = parse_score(&format!("{prefix}{score}")).unwrap();
        prop_assert_eq!(parsed.value(), score);
    }

    #[test]
    fn score_out_of_range_is_rejected(score in 5u64..1_000_000) {
        prop_assert!(parse_score(&score.to_string()).is_err());
    }

    #[test]
    fn negative_score_is_rejected(score in 1i64..1_000_000, prefix in "[a-zA-Z :]{0,12}") {
        let input = format!("{prefix}-{score}");
        prop_assert!(parse_score(&input).is_err());
    }

    #[test]
    fn fractional_score_is_rejected(whole in 0u8..=4, frac in 1u32..1_000) {
        let input = format!("{whole}.{frac}");
        prop_assert!(parse_score(&input).is_err());
    }

    #[test]
    fn echoed_range_is_skipped(score in 0u8..=4) {
        let parsed = parse_score(&format!("Rating (0-4): {score}")).unwrap();
        prop_assert_eq!(parsed.value(), score);
    }

    #[test]
    fn response_without_digits_is_rejected(response in "[a-zA-Z .,!?]{0,40}") {
        prop_assert!(parse_score(&response).is_err());
    }
}

// --- Word segmentation ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn segments_preserve_words_and_respect_limit(
        words in proptest::collection::vec("[a-z]{1,8}", 0..200),
        limit in 8usize..64,
    ) {
        let tokenizers = ProfileTokenizers::new(&ModelsConfig::default()).unwrap();
        let text = words.join(" ");
        let segments = segment_words(&text, limit, &tokenizers, ModelProfile::Smart);

        let rejoined: Vec<String> = segments
            .iter()
            .flat_map(|s| s.split_whitespace().map(str::to_string))
            .collect();
        prop_assert_eq!(rejoined, words);
        for segment in &segments {
            prop_assert!(tokenizers.count(segment, ModelProfile::Smart) <= limit);
        }
    }
}

// --- Result filenames ---

proptest! {
    #[test]
    fn derived_filename_is_safe(question in "\\PC{0,80}") {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let name = derive_filename(&question, at);
        prop_assert!(name.ends_with("_20240102_030405.txt"));
        prop_assert!(!name.contains('/'));
        prop_assert!(!name.contains(' '));
    }
}
