//! Token counting for model profiles.
//!
//! Sizes are estimated with tiktoken-rs BPE tokenizers, one per profile. Counts
//! only ever drive chunking and the merge quality gate, never semantics.

use crate::config::ModelsConfig;
use crate::error::LlmError;
use crate::types::{Message, ModelProfile};
use std::sync::Arc;

/// Token counter using tiktoken-rs for accurate BPE tokenization.
pub struct TokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl TokenCounter {
    /// Create a token counter for the given model.
    /// Falls back to cl100k_base if the model isn't recognized.
    pub fn for_model(model: &str) -> Result<Self, LlmError> {
        let bpe = match tiktoken_rs::get_bpe_from_model(model) {
            Ok(bpe) => bpe,
            Err(_) => tiktoken_rs::cl100k_base().map_err(|e| LlmError::Tokenizer {
                model: model.to_string(),
                message: e.to_string(),
            })?,
        };
        Ok(Self { bpe })
    }

    /// Count the number of tokens in a string.
    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Estimate the token count for a set of messages.
    /// Adds overhead for message structure (role, separators).
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        let mut total = 0;
        for msg in messages {
            // role token + separators
            total += 4;
            total += self.count(&msg.content);
            if let Some(name) = &msg.name {
                total += self.count(name);
            }
        }
        total + 3 // reply priming
    }
}

/// Per-profile tokenizers and context budgets.
///
/// Cheap to clone; the BPE tables are shared.
#[derive(Clone)]
pub struct ProfileTokenizers {
    fast: Arc<TokenCounter>,
    smart: Arc<TokenCounter>,
    fast_budget: usize,
    smart_budget: usize,
}

impl ProfileTokenizers {
    pub fn new(models: &ModelsConfig) -> Result<Self, LlmError> {
        Ok(Self {
            fast: Arc::new(TokenCounter::for_model(&models.fast.model)?),
            smart: Arc::new(TokenCounter::for_model(&models.smart.model)?),
            fast_budget: models.fast.context_window,
            smart_budget: models.smart.context_window,
        })
    }

    /// Count `text` with the tokenizer of `profile`.
    pub fn count(&self, text: &str, profile: ModelProfile) -> usize {
        self.counter(profile).count(text)
    }

    /// Count `text` for a profile given by name ("fast" or "smart").
    pub fn count_named(&self, text: &str, profile: &str) -> Result<usize, LlmError> {
        let profile: ModelProfile = profile.parse()?;
        Ok(self.count(text, profile))
    }

    pub fn counter(&self, profile: ModelProfile) -> &TokenCounter {
        match profile {
            ModelProfile::Fast => &self.fast,
            ModelProfile::Smart => &self.smart,
        }
    }

    /// Context budget of `profile` in tokens.
    pub fn budget(&self, profile: ModelProfile) -> usize {
        match profile {
            ModelProfile::Fast => self.fast_budget,
            ModelProfile::Smart => self.smart_budget,
        }
    }

    /// Chunking threshold: half of the smart profile's budget.
    pub fn half_smart_budget(&self) -> usize {
        (self.smart_budget / 2).max(1)
    }
}

/// Split `text` on whitespace into segments of at most `limit` tokens each.
///
/// Words are re-joined with single spaces. A word that alone exceeds `limit`
/// is cut at character boundaries into pieces that each fit, and every piece
/// becomes its own segment, so no input is ever dropped. The only segment that
/// can still exceed `limit` is a single character whose encoding alone is
/// larger than `limit`.
pub fn segment_words(
    text: &str,
    limit: usize,
    tokenizers: &ProfileTokenizers,
    profile: ModelProfile,
) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;

    for word in text.split_whitespace() {
        let word_tokens = tokenizers.count(word, profile);
        if word_tokens > limit {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            segments.extend(split_oversized(word, limit, tokenizers, profile));
            continue;
        }

        // Leading space matches how BPE merges a word after a separator.
        let joined_tokens = tokenizers.count(&format!(" {word}"), profile);
        if !current.is_empty() && current_tokens + joined_tokens > limit {
            segments.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current_tokens = word_tokens;
        } else {
            current.push(' ');
            current_tokens += joined_tokens;
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Cut one word into the longest character-boundary pieces of at most
/// `limit` tokens. Each piece holds at least one character.
fn split_oversized(
    word: &str,
    limit: usize,
    tokenizers: &ProfileTokenizers,
    profile: ModelProfile,
) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = word;

    while !rest.is_empty() {
        let boundaries: Vec<usize> = rest
            .char_indices()
            .map(|(i, _)| i)
            .skip(1)
            .chain(std::iter::once(rest.len()))
            .collect();

        // Largest prefix that fits; falls back to one character.
        let (mut lo, mut hi) = (0usize, boundaries.len() - 1);
        while lo < hi {
            let mid = (lo + hi).div_ceil(2);
            if tokenizers.count(&rest[..boundaries[mid]], profile) <= limit {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }

        let (piece, tail) = rest.split_at(boundaries[lo]);
        pieces.push(piece.to_string());
        rest = tail;
    }
    pieces
}
