//! Document sources and page rendering capabilities.
//!
//! Search providers and HTML-to-text conversion live outside the core; the
//! pipeline only sees these traits.

use crate::error::SourceError;
use crate::types::Document;
use async_trait::async_trait;

/// A searchable corpus (web search, encyclopedia, ...).
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Name used to match this source against its `SourceConfig`.
    fn name(&self) -> &str;

    /// Search for up to `max_results` documents. Returning fewer, or none,
    /// is not an error.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Document>, SourceError>;
}

/// Outcome of fetching a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    /// Non-2xx status, network error, timeout, ...
    Failed { reason: String },
}

impl FetchStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FetchStatus::Ok)
    }
}

/// Plain-prose rendering of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub text: String,
    pub status: FetchStatus,
}

impl RenderedPage {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: FetchStatus::Ok,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            status: FetchStatus::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// Fetches a URL and converts it to plain text.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Never fails; fetch problems are reported through `RenderedPage::status`.
    async fn render(&self, url: &str) -> RenderedPage;
}
