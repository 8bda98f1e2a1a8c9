//! Parallel relevance filter.
//!
//! Splits a candidate set into contiguous slices, one per worker task. Each
//! worker scores its documents in order, deep-extracts the top-scoring ones,
//! and appends survivors to a shared, mutex-guarded set. Model calls run
//! outside the lock; only the append is serialized.

use crate::error::{Result, ScoreError, SieveError};
use crate::extractor::DeepExtractor;
use crate::scorer::RelevanceScorer;
use crate::tokens::ProfileTokenizers;
use crate::types::{Document, ModelProfile};
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Split `len` items into `workers` contiguous ranges of `len / workers`
/// items each; the remainder goes to the last range.
///
/// Always returns exactly `max(workers, 1)` ranges covering `0..len` without
/// gaps or overlap. Leading ranges are empty when `len < workers`.
pub fn partition(len: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let size = len / workers;
    (0..workers)
        .map(|i| {
            let start = i * size;
            let end = if i + 1 == workers { len } else { start + size };
            start..end
        })
        .collect()
}

/// A candidate excluded because its evaluation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub url: String,
    pub reason: String,
    /// Completion failures are fatal for the pass; malformed judge output is not.
    pub fatal: bool,
}

/// Survivors and excluded failures of one filtering pass.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Order across workers is unspecified.
    pub survivors: Vec<Document>,
    pub failures: Vec<DocumentFailure>,
    /// Survivors whose body was replaced by extracted notes.
    pub enriched: usize,
}

#[derive(Default)]
struct SharedState {
    outcome: FilterOutcome,
    fatal: Option<SieveError>,
}

#[derive(Clone)]
pub struct ParallelFilter {
    scorer: RelevanceScorer,
    extractor: DeepExtractor,
    tokenizers: ProfileTokenizers,
    workers: usize,
}

impl ParallelFilter {
    pub fn new(
        scorer: RelevanceScorer,
        extractor: DeepExtractor,
        tokenizers: ProfileTokenizers,
        workers: usize,
    ) -> Self {
        Self {
            scorer,
            extractor,
            tokenizers,
            workers: workers.max(1),
        }
    }

    /// Score every candidate concurrently and collect the survivors.
    ///
    /// A malformed judge answer excludes only that document. A completion
    /// failure (retries exhausted) stops the worker that hit it; sibling
    /// workers still run to completion, then the error is returned.
    ///
    /// Slices come from [`partition`], so the remainder lands on the last
    /// worker. With fewer candidates than workers every other slice is empty
    /// and all candidates are scored serially by that one worker.
    pub async fn filter(&self, question: &str, candidates: Vec<Document>) -> Result<FilterOutcome> {
        let total = candidates.len();
        let shared = Arc::new(Mutex::new(SharedState::default()));
        let mut remaining = candidates.into_iter();
        let mut handles = Vec::new();

        for (worker, range) in partition(total, self.workers).into_iter().enumerate() {
            let slice: Vec<Document> = remaining.by_ref().take(range.len()).collect();
            if slice.is_empty() {
                continue;
            }
            let this = self.clone();
            let question = question.to_string();
            let shared = Arc::clone(&shared);
            handles.push(tokio::spawn(async move {
                this.run_worker(worker, &question, slice, &shared).await;
            }));
        }
        info!(candidates = total, workers = handles.len(), "Filtering candidates");

        let mut panicked = None;
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Filter worker panicked");
                panicked.get_or_insert(e.to_string());
            }
        }

        let mut state = std::mem::take(&mut *shared.lock().await);
        if let Some(fatal) = state.fatal.take() {
            return Err(fatal);
        }
        if let Some(message) = panicked {
            return Err(SieveError::Worker { message });
        }
        info!(
            survivors = state.outcome.survivors.len(),
            failures = state.outcome.failures.len(),
            enriched = state.outcome.enriched,
            "Filtering complete"
        );
        Ok(state.outcome)
    }

    async fn run_worker(
        &self,
        worker: usize,
        question: &str,
        slice: Vec<Document>,
        shared: &Mutex<SharedState>,
    ) {
        debug!(worker, documents = slice.len(), "Worker started");
        for document in slice {
            let url = document.url.clone();
            match self.evaluate(question, document).await {
                Ok(Some((survivor, enriched))) => {
                    let mut state = shared.lock().await;
                    state.outcome.survivors.push(survivor);
                    if enriched {
                        state.outcome.enriched += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let fatal = is_fatal(&e);
                    warn!(worker, url = url.as_str(), error = %e, fatal, "Candidate evaluation failed");
                    let mut state = shared.lock().await;
                    state.outcome.failures.push(DocumentFailure {
                        url,
                        reason: e.to_string(),
                        fatal,
                    });
                    if fatal {
                        state.fatal.get_or_insert(e);
                        return;
                    }
                }
            }
        }
        debug!(worker, "Worker finished");
    }

    /// Score one document; returns the survivor and whether its body was replaced.
    async fn evaluate(&self, question: &str, mut document: Document) -> Result<Option<(Document, bool)>> {
        let score = self.scorer.score(question, &document).await?;
        let mut enriched = false;
        if score.warrants_extraction() {
            let notes = self.extractor.extract(question, &document.url).await?;
            enriched = self.apply_notes(&mut document, notes);
        }
        Ok(score.admits().then_some((document, enriched)))
    }

    /// Replace the body with `notes` only when the notes are token-longer.
    pub fn apply_notes(&self, document: &mut Document, notes: String) -> bool {
        let before = self.tokenizers.count(&document.body, ModelProfile::Smart);
        let after = self.tokenizers.count(&notes, ModelProfile::Smart);
        if after > before {
            debug!(url = document.url.as_str(), before, after, "Replacing body with extracted notes");
            document.body = notes;
            true
        } else {
            false
        }
    }
}

fn is_fatal(error: &SieveError) -> bool {
    matches!(
        error,
        SieveError::Llm(_) | SieveError::Score(ScoreError::Completion(_))
    )
}
