//! Deep extraction of high-value sources.
//!
//! Fetches a page in full, splits it into half-budget segments, and folds each
//! segment into running notes through the quality-gated merge.

use crate::error::LlmError;
use crate::merge::MergeGate;
use crate::sources::{FetchStatus, PageRenderer};
use crate::tokens::segment_words;
use crate::types::ModelProfile;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct DeepExtractor {
    renderer: Arc<dyn PageRenderer>,
    gate: MergeGate,
    max_attempts: usize,
}

impl DeepExtractor {
    pub fn new(renderer: Arc<dyn PageRenderer>, gate: MergeGate, max_attempts: usize) -> Self {
        Self {
            renderer,
            gate,
            max_attempts,
        }
    }

    /// Distill the page at `url` into notes relevant to `question`.
    ///
    /// A failed fetch yields empty notes rather than an error.
    pub async fn extract(&self, question: &str, url: &str) -> Result<String, LlmError> {
        let page = self.renderer.render(url).await;
        if let FetchStatus::Failed { reason } = &page.status {
            warn!(url, reason = reason.as_str(), "Page fetch failed, skipping extraction");
            return Ok(String::new());
        }

        let tokenizers = self.gate.tokenizers();
        let segments = segment_words(
            &page.text,
            tokenizers.half_smart_budget(),
            tokenizers,
            ModelProfile::Smart,
        );
        info!(url, segments = segments.len(), "Extracting page");

        let mut notes = String::new();
        for (index, segment) in segments.iter().enumerate() {
            let outcome = self
                .gate
                .merge(question, &notes, segment, self.max_attempts)
                .await?;
            if !outcome.accepted {
                warn!(url, segment = index, "Segment merge rejected, keeping previous notes");
            }
            notes = outcome.text;
            debug!(url, segment = index, attempts = outcome.attempts, "Segment merged");
        }
        Ok(notes)
    }
}
