//! Relevance judge for candidate documents.

use crate::completion::CompletionClient;
use crate::error::ScoreError;
use crate::types::{Document, ModelProfile};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// A judge score in `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelevanceScore(u8);

impl RelevanceScore {
    pub const MAX: u8 = 4;
    /// Lowest score admitted to the survivor set.
    pub const ADMIT: u8 = 3;

    pub fn new(value: u8) -> Result<Self, ScoreError> {
        if value > Self::MAX {
            return Err(ScoreError::OutOfRange {
                score: i64::from(value),
            });
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Whether the document survives filtering.
    pub fn admits(self) -> bool {
        self.0 >= Self::ADMIT
    }

    /// Whether the document is worth fetching in full.
    pub fn warrants_extraction(self) -> bool {
        self.0 == Self::MAX
    }
}

impl std::fmt::Display for RelevanceScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Score ranges the judge may echo back, e.g. "(0-4)" or "0 to 4".
static RANGE_ECHO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*(?:-|\bto\b)\s*\d+").unwrap());

/// A number not glued to a preceding digit or decimal point, with its sign
/// and any fractional part.
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d.])(-?\d+(?:\.\d+)?)").unwrap());

/// Parse the first number in a judge response as a score.
///
/// Echoed ranges such as "(0-4)" are skipped. A response without a number,
/// a fractional number, or a value outside 0-4 (negatives included) is a
/// protocol violation and fails instead of being coerced.
pub fn parse_score(response: &str) -> Result<RelevanceScore, ScoreError> {
    let cleaned = RANGE_ECHO.replace_all(response, " ");
    let Some(token) = NUMBER.captures(&cleaned).and_then(|c| c.get(1)) else {
        return Err(ScoreError::NoInteger {
            response: response.to_string(),
        });
    };
    let token = token.as_str();
    if token.contains('.') {
        return Err(ScoreError::NotInteger {
            score: token.to_string(),
            response: response.to_string(),
        });
    }
    // Only overflow fails here, and that is out of range on either side.
    let value: i64 = token
        .parse()
        .unwrap_or(if token.starts_with('-') { i64::MIN } else { i64::MAX });
    if !(0..=i64::from(RelevanceScore::MAX)).contains(&value) {
        return Err(ScoreError::OutOfRange { score: value });
    }
    RelevanceScore::new(value as u8)
}

/// Build the judge instructions for one document.
pub fn scoring_prompt(question: &str, document: &Document) -> String {
    format!(
        "Please evaluate the following search result based on its relevance to the question: '{question}'.\n\
         \n\
         Title: {title}\n\
         URL: {url}\n\
         Content: {body}\n\
         \n\
         Rate the relevance on a scale from 0 to 4:\n\
         0 - unrelated\n\
         1 - mentions the topic but does not help answer the question\n\
         2 - somewhat useful background\n\
         3 - relevant, contains part of the answer\n\
         4 - highly relevant, likely contains a detailed answer\n\
         \n\
         Answer with a single integer between 0 and 4 and nothing else.",
        title = document.title,
        url = document.url,
        body = document.body,
    )
}

/// Scores candidate documents with one fast-profile completion each.
#[derive(Clone)]
pub struct RelevanceScorer {
    client: Arc<CompletionClient>,
}

impl RelevanceScorer {
    pub fn new(client: Arc<CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn score(&self, question: &str, document: &Document) -> Result<RelevanceScore, ScoreError> {
        let response = self
            .client
            .instruct(scoring_prompt(question, document), ModelProfile::Fast)
            .await?;
        let score = parse_score(&response)?;
        debug!(url = document.url.as_str(), %score, "Scored candidate");
        Ok(score)
    }
}
