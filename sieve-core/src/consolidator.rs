//! Consolidation of surviving documents into one narrative.
//!
//! Documents are rendered as listing entries and packed into batches that stay
//! under half the smart-profile budget. Each batch is folded into the running
//! summary through the quality-gated merge.

use crate::error::LlmError;
use crate::merge::MergeGate;
use crate::tokens::segment_words;
use crate::types::{Document, ModelProfile};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Consolidator {
    gate: MergeGate,
    max_attempts: usize,
}

impl Consolidator {
    pub fn new(gate: MergeGate, max_attempts: usize) -> Self {
        Self { gate, max_attempts }
    }

    /// Largest batch, in smart-profile tokens, submitted in one merge.
    pub fn threshold(&self) -> usize {
        self.gate.tokenizers().half_smart_budget()
    }

    /// Pack document entries into batches no larger than [`Self::threshold`].
    ///
    /// Entries keep their order. An entry too large for any batch is split on
    /// word boundaries, and a single word longer than the threshold is cut
    /// between characters. Each piece becomes its own batch.
    pub fn batches(&self, documents: &[Document]) -> Vec<String> {
        let tokenizers = self.gate.tokenizers();
        let threshold = self.threshold();
        let mut batches = Vec::new();
        let mut pending = String::new();

        for document in documents {
            let entry = document.as_entry();
            if tokenizers.count(&entry, ModelProfile::Smart) > threshold {
                if !pending.is_empty() {
                    batches.push(std::mem::take(&mut pending));
                }
                debug!(url = document.url.as_str(), "Splitting oversized entry");
                batches.extend(segment_words(&entry, threshold, tokenizers, ModelProfile::Smart));
                continue;
            }

            let candidate = format!("{pending}{entry}");
            if !pending.is_empty() && tokenizers.count(&candidate, ModelProfile::Smart) > threshold {
                batches.push(std::mem::replace(&mut pending, entry));
            } else {
                pending = candidate;
            }
        }
        if !pending.is_empty() {
            batches.push(pending);
        }
        batches
    }

    /// Merge `documents` into a single summary for `question`.
    pub async fn consolidate(&self, question: &str, documents: &[Document]) -> Result<String, LlmError> {
        let batches = self.batches(documents);
        info!(
            documents = documents.len(),
            batches = batches.len(),
            threshold = self.threshold(),
            "Consolidating survivors"
        );

        let mut summary = String::new();
        for (index, batch) in batches.iter().enumerate() {
            let outcome = self
                .gate
                .merge(question, &summary, batch, self.max_attempts)
                .await?;
            if !outcome.accepted {
                warn!(batch = index, "Batch merge rejected, summary unchanged");
            }
            summary = outcome.text;
        }
        Ok(summary)
    }
}
