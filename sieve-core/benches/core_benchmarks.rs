use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sieve_core::config::ModelsConfig;
use sieve_core::filter::partition;
use sieve_core::scorer::parse_score;
use sieve_core::tokens::{ProfileTokenizers, segment_words};
use sieve_core::types::{Document, ModelProfile};

fn sample_page() -> String {
    "Denver was named the capital of the Colorado Territory in 1867 and kept the \
     title when Colorado became a state in 1876. A statewide vote confirmed it in 1881. "
        .repeat(200)
}

fn bench_token_counting(c: &mut Criterion) {
    let tokenizers = ProfileTokenizers::new(&ModelsConfig::default()).unwrap();
    let page = sample_page();
    let entry = Document::new("Denver", "https://example.com/denver", page.clone()).as_entry();

    c.bench_function("count_tokens_fast_profile", |b| {
        b.iter(|| tokenizers.count(black_box(&page), ModelProfile::Fast))
    });

    c.bench_function("count_tokens_listing_entry", |b| {
        b.iter(|| tokenizers.count(black_box(&entry), ModelProfile::Smart))
    });
}

fn bench_segmentation(c: &mut Criterion) {
    let tokenizers = ProfileTokenizers::new(&ModelsConfig::default()).unwrap();
    let page = sample_page();
    let limit = tokenizers.half_smart_budget();

    c.bench_function("segment_words_half_budget", |b| {
        b.iter(|| segment_words(black_box(&page), limit, &tokenizers, ModelProfile::Smart))
    });

    c.bench_function("segment_words_small_limit", |b| {
        b.iter(|| segment_words(black_box(&page), 64, &tokenizers, ModelProfile::Smart))
    });
}

fn bench_filter_helpers(c: &mut Criterion) {
    c.bench_function("partition_candidates", |b| {
        b.iter(|| partition(black_box(1_003), black_box(4)))
    });

    c.bench_function("parse_score_verbose", |b| {
        b.iter(|| parse_score(black_box("Relevance: 3 (mentions the capital)")))
    });
}

criterion_group!(
    benches,
    bench_token_counting,
    bench_segmentation,
    bench_filter_helpers,
);
criterion_main!(benches);
