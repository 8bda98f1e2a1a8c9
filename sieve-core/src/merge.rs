//! Quality-gated merge.
//!
//! Every summarization step in the pipeline folds new material into a running
//! text through [`MergeGate::merge`]. A merged result that comes back shorter
//! than `min_retention` of the pre-merge text (in smart-profile tokens) is
//! treated as information loss and the merge is retried with the same inputs,
//! escalating from the fast to the smart profile. When the attempt ceiling is
//! reached the pre-merge text is kept unchanged.

use crate::completion::CompletionClient;
use crate::config::MergeConfig;
use crate::error::LlmError;
use crate::tokens::ProfileTokenizers;
use crate::types::ModelProfile;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of one gated merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged text, or the pre-merge text if every attempt was rejected.
    pub text: String,
    pub accepted: bool,
    /// Completion calls made.
    pub attempts: usize,
}

/// Retry state of a single merge: attempts made and the profile for the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeState {
    pub attempt: usize,
    pub profile: ModelProfile,
}

impl MergeState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            profile: ModelProfile::Fast,
        }
    }

    /// Record a rejected attempt; switch to the smart profile once
    /// `escalate_after` attempts have been rejected.
    pub fn reject(&mut self, escalate_after: usize) {
        self.attempt += 1;
        if self.attempt >= escalate_after {
            self.profile = ModelProfile::Smart;
        }
    }
}

impl Default for MergeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the consolidation instructions for one merge.
pub fn merge_prompt(question: &str, current: &str, addition: &str) -> String {
    format!(
        "Your task is to consolidate and summarize research results for the question: '{question}'.\n\
         \n\
         Instructions:\n\
         1. Combine the information from the 'Current Result' and the 'New Result'.\n\
         2. Do not omit any details from either result.\n\
         3. If the 'New Result' does not offer any new information, return the 'Current Result' as is.\n\
         \n\
         Current Result:\n\
         {current}\n\
         \n\
         New Result:\n\
         {addition}\n\
         \n\
         Please proceed with the task."
    )
}

/// Runs merges against the completion client and enforces the length floor.
#[derive(Clone)]
pub struct MergeGate {
    client: Arc<CompletionClient>,
    tokenizers: ProfileTokenizers,
    min_retention: f64,
    escalate_after: usize,
}

impl MergeGate {
    pub fn new(client: Arc<CompletionClient>, tokenizers: ProfileTokenizers, config: &MergeConfig) -> Self {
        Self {
            client,
            tokenizers,
            min_retention: config.min_retention,
            escalate_after: config.escalate_after,
        }
    }

    pub fn tokenizers(&self) -> &ProfileTokenizers {
        &self.tokenizers
    }

    /// Whether `merged` keeps enough of `previous` to count as lossless.
    pub fn retains(&self, previous: &str, merged: &str) -> bool {
        let before = self.tokenizers.count(previous, ModelProfile::Smart);
        let after = self.tokenizers.count(merged, ModelProfile::Smart);
        after as f64 >= self.min_retention * before as f64
    }

    /// Merge `addition` into `current`, making at most `max_attempts` calls.
    ///
    /// Completion errors propagate; a rejected merge never does.
    pub async fn merge(
        &self,
        question: &str,
        current: &str,
        addition: &str,
        max_attempts: usize,
    ) -> Result<MergeOutcome, LlmError> {
        if addition.trim().is_empty() {
            return Ok(MergeOutcome {
                text: current.to_string(),
                accepted: true,
                attempts: 0,
            });
        }

        let prompt = merge_prompt(question, current, addition);
        let mut state = MergeState::new();

        while state.attempt < max_attempts.max(1) {
            let merged = self.client.instruct(prompt.clone(), state.profile).await?;
            if self.retains(current, &merged) {
                debug!(
                    attempts = state.attempt + 1,
                    profile = %state.profile,
                    "Merge accepted"
                );
                return Ok(MergeOutcome {
                    text: merged,
                    accepted: true,
                    attempts: state.attempt + 1,
                });
            }
            warn!(
                attempt = state.attempt + 1,
                max_attempts,
                profile = %state.profile,
                "Merged result lost information, retrying"
            );
            state.reject(self.escalate_after);
        }

        warn!(
            attempts = state.attempt,
            "Merge retries exhausted, keeping pre-merge text"
        );
        Ok(MergeOutcome {
            text: current.to_string(),
            accepted: false,
            attempts: state.attempt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelsConfig, RetryConfig};
    use crate::testing::{ScriptedCompletionService, merge_sections};
    use std::sync::Mutex;

    fn gate(service: Arc<ScriptedCompletionService>) -> MergeGate {
        let models = ModelsConfig::default();
        let client = Arc::new(CompletionClient::new(service, models.clone(), RetryConfig::default()));
        MergeGate::new(
            client,
            ProfileTokenizers::new(&models).unwrap(),
            &MergeConfig::default(),
        )
    }

    const CURRENT: &str = "Denver is the capital of Colorado. It sits at an elevation of one mile \
                           and is the most populous city in the state.";

    #[test]
    fn test_state_escalates_after_threshold() {
        let mut state = MergeState::new();
        assert_eq!(state.profile, ModelProfile::Fast);
        state.reject(2);
        assert_eq!(state.profile, ModelProfile::Fast);
        state.reject(2);
        assert_eq!(state.profile, ModelProfile::Smart);
        assert_eq!(state.attempt, 2);
    }

    #[test]
    fn test_prompt_contains_both_sections() {
        let prompt = merge_prompt("q", "old", "new");
        let (current, addition) = merge_sections(&prompt).unwrap();
        assert_eq!(current, "old");
        assert_eq!(addition, "new");
    }

    #[tokio::test]
    async fn test_longer_result_accepted_first_try() {
        let service = Arc::new(ScriptedCompletionService::new(|request| {
            let (current, addition) =
                merge_sections(request.system_prompt().unwrap_or_default()).unwrap();
            Ok(format!("{current} {addition}"))
        }));
        let outcome = gate(service.clone())
            .merge("denver capital", CURRENT, "Founded in 1858.", 5)
            .await
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 1);
        assert!(outcome.text.ends_with("Founded in 1858."));
        assert_eq!(service.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_shrinking_result_returns_pre_merge_text() {
        let service = Arc::new(ScriptedCompletionService::new(|_| Ok("Denver.".to_string())));
        let outcome = gate(service.clone())
            .merge("denver capital", CURRENT, "Founded in 1858.", 4)
            .await
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.text, CURRENT);

        let profiles: Vec<ModelProfile> = service.requests().iter().map(|r| r.profile).collect();
        assert_eq!(
            profiles,
            vec![
                ModelProfile::Fast,
                ModelProfile::Smart,
                ModelProfile::Smart,
                ModelProfile::Smart
            ]
        );
    }

    #[tokio::test]
    async fn test_recovers_after_rejected_attempt() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let service = Arc::new(ScriptedCompletionService::new(move |request| {
            let mut n = counter.lock().unwrap();
            *n += 1;
            if *n == 1 {
                Ok("short".to_string())
            } else {
                let (current, addition) =
                    merge_sections(request.system_prompt().unwrap_or_default()).unwrap();
                Ok(format!("{current}\n{addition}"))
            }
        }));
        let outcome = gate(service)
            .merge("q", CURRENT, "More detail.", 3)
            .await
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_addition_skips_call() {
        let service = Arc::new(ScriptedCompletionService::new(|_| Ok(String::new())));
        let outcome = gate(service.clone())
            .merge("q", CURRENT, "  \n", 3)
            .await
            .unwrap();
        assert_eq!(outcome.text, CURRENT);
        assert_eq!(outcome.attempts, 0);
        assert!(service.requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_current_accepts_any_result() {
        let service = Arc::new(ScriptedCompletionService::new(|_| Ok("Denver".to_string())));
        let outcome = gate(service).merge("q", "", "Denver facts", 3).await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.text, "Denver");
    }

    #[tokio::test]
    async fn test_completion_error_propagates() {
        let service = Arc::new(ScriptedCompletionService::new(|_| {
            Err(LlmError::ApiRequest {
                message: "boom".into(),
            })
        }));
        let models = ModelsConfig::default();
        let retry = RetryConfig {
            max_attempts: 1,
            initial_backoff_ms: 0,
        };
        let client = Arc::new(CompletionClient::new(service, models.clone(), retry));
        let gate = MergeGate::new(
            client,
            ProfileTokenizers::new(&models).unwrap(),
            &MergeConfig::default(),
        );
        let err = gate.merge("q", CURRENT, "x", 3).await.unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { .. }));
    }
}
