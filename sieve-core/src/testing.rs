//! Scripted capabilities for exercising the pipeline without external services.
//!
//! Each type implements one of the capability traits with canned behaviour and
//! records what it was asked, so tests can assert on the traffic.

use crate::completion::CompletionService;
use crate::error::{LlmError, Result, SourceError};
use crate::sink::ResultSink;
use crate::sources::{DocumentSource, PageRenderer, RenderedPage};
use crate::types::{CompletionRequest, CompletionResponse, Document, StreamEvent, TokenUsage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;

type Responder = dyn Fn(&CompletionRequest) -> std::result::Result<String, LlmError> + Send + Sync;

/// Which pipeline step produced a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Score,
    Merge,
    Query,
    Other,
}

impl PromptKind {
    pub fn of(request: &CompletionRequest) -> Self {
        let Some(prompt) = request.system_prompt() else {
            return PromptKind::Other;
        };
        if prompt.contains("between 0 and 4") {
            PromptKind::Score
        } else if prompt.starts_with("Your task is to consolidate") {
            PromptKind::Merge
        } else if prompt.contains("Reply with the search query only") {
            PromptKind::Query
        } else {
            PromptKind::Other
        }
    }
}

/// Split a merge prompt into its current-result and new-result sections.
pub fn merge_sections(prompt: &str) -> Option<(String, String)> {
    let (_, rest) = prompt.split_once("\nCurrent Result:\n")?;
    let (current, rest) = rest.split_once("\n\nNew Result:\n")?;
    let (addition, _) = rest.rsplit_once("\n\nPlease proceed with the task.")?;
    Some((current.to_string(), addition.to_string()))
}

/// Completion service answering through a closure over the request.
pub struct ScriptedCompletionService {
    responder: Box<Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletionService {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> std::result::Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn answer(&self, request: &CompletionRequest) -> std::result::Result<String, LlmError> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        (self.responder)(request)
    }

    fn usage(request: &CompletionRequest, answer: &str) -> TokenUsage {
        TokenUsage {
            input_tokens: request
                .messages
                .iter()
                .map(|m| m.content.split_whitespace().count())
                .sum(),
            output_tokens: answer.split_whitespace().count(),
        }
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletionService {
    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, LlmError> {
        let answer = self.answer(&request)?;
        let mut response = CompletionResponse::text(request.model.clone(), answer.clone());
        response.usage = Self::usage(&request, &answer);
        Ok(response)
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> std::result::Result<(), LlmError> {
        let answer = self.answer(&request)?;
        for delta in answer.split_inclusive(' ') {
            if tx.send(StreamEvent::Token(delta.to_string())).await.is_err() {
                return Ok(());
            }
        }
        let _ = tx
            .send(StreamEvent::Done {
                usage: Self::usage(&request, &answer),
                finish_reason: Some("stop".to_string()),
            })
            .await;
        Ok(())
    }
}

/// Document source replaying queued responses, one per call, then a fallback.
pub struct ScriptedSource {
    name: String,
    queued: Mutex<VecDeque<std::result::Result<Vec<Document>, SourceError>>>,
    fallback: Vec<Document>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queued: Mutex::new(VecDeque::new()),
            fallback: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Returned on every call once the queue is drained.
    pub fn with_fallback(mut self, documents: Vec<Document>) -> Self {
        self.fallback = documents;
        self
    }

    pub fn then_results(self, documents: Vec<Document>) -> Self {
        self.push(Ok(documents))
    }

    pub fn then_error(self, message: impl Into<String>) -> Self {
        let error = SourceError::SearchFailed {
            source_name: self.name.clone(),
            message: message.into(),
        };
        self.push(Err(error))
    }

    fn push(self, response: std::result::Result<Vec<Document>, SourceError>) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(response);
        }
        self
    }

    /// Queries received so far.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DocumentSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, max_results: usize) -> std::result::Result<Vec<Document>, SourceError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        let next = self.queued.lock().ok().and_then(|mut q| q.pop_front());
        let documents = match next {
            Some(response) => response?,
            None => self.fallback.clone(),
        };
        Ok(documents.into_iter().take(max_results).collect())
    }
}

/// Page renderer backed by a URL → text map. Unknown URLs fail.
#[derive(Default)]
pub struct StaticRenderer {
    pages: HashMap<String, String>,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.pages.insert(url.into(), text.into());
        self
    }
}

#[async_trait]
impl PageRenderer for StaticRenderer {
    async fn render(&self, url: &str) -> RenderedPage {
        match self.pages.get(url) {
            Some(text) => RenderedPage::ok(text.clone()),
            None => RenderedPage::failed(format!("404 Not Found: {url}")),
        }
    }
}

/// Result sink keeping saved content in memory.
#[derive(Default)]
pub struct MemorySink {
    saved: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(filename, content)` pairs in save order.
    pub fn saved(&self) -> Vec<(String, String)> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn save(&self, filename: &str, content: &str) -> Result<PathBuf> {
        if let Ok(mut saved) = self.saved.lock() {
            saved.push((filename.to_string(), content.to_string()));
        }
        Ok(PathBuf::from(filename))
    }
}
