//! Completion client: text completion abstraction with retry and recovery.
//!
//! Defines the `CompletionService` trait for model-agnostic completions and the
//! `CompletionClient` that every pipeline component calls through. The client
//! resolves model profiles, retries transient failures with exponential
//! backoff, and recovers from context overflow by trimming the oldest turn.

use crate::config::{ModelsConfig, RetryConfig};
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, ModelProfile, StreamEvent, TokenUsage};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Trait for completion services, supporting both full and streaming completions.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Perform a streaming completion, sending events to the channel.
    ///
    /// Implementations emit `StreamEvent::Token` deltas followed by exactly one
    /// `StreamEvent::Done`.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;
}

/// Wraps a `CompletionService` with profile resolution, retry/backoff and
/// usage tracking. Shared between workers behind an `Arc`.
pub struct CompletionClient {
    service: Arc<dyn CompletionService>,
    models: ModelsConfig,
    retry: RetryConfig,
    temperature: f32,
    input_tokens: AtomicUsize,
    output_tokens: AtomicUsize,
    delta_observer: Option<mpsc::Sender<StreamEvent>>,
}

impl CompletionClient {
    pub fn new(service: Arc<dyn CompletionService>, models: ModelsConfig, retry: RetryConfig) -> Self {
        Self {
            service,
            models,
            retry,
            temperature: 0.0,
            input_tokens: AtomicUsize::new(0),
            output_tokens: AtomicUsize::new(0),
            delta_observer: None,
        }
    }

    /// Forward streamed deltas and finish signals to `tx` as they arrive.
    pub fn with_delta_observer(mut self, tx: mpsc::Sender<StreamEvent>) -> Self {
        self.delta_observer = Some(tx);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Model identifier used for `profile`.
    pub fn model_for(&self, profile: ModelProfile) -> &str {
        &self.models.profile(profile).model
    }

    /// Total token usage reported by the service across all calls.
    pub fn total_usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }

    fn build_request(&self, messages: &[Message], profile: ModelProfile) -> CompletionRequest {
        CompletionRequest {
            messages: messages.to_vec(),
            model: self.model_for(profile).to_string(),
            profile,
            temperature: self.temperature,
            max_tokens: None,
        }
    }

    fn track_usage(&self, usage: &TokenUsage) {
        self.input_tokens.fetch_add(usage.input_tokens, Ordering::Relaxed);
        self.output_tokens.fetch_add(usage.output_tokens, Ordering::Relaxed);
    }

    /// Send a completion and return the response text.
    ///
    /// Transient failures are retried up to `retry.max_attempts` attempts in
    /// total, sleeping `initial_backoff`, then twice that, and so on. A
    /// context-overflow error drops the oldest message and retries at once
    /// without using an attempt; it is surfaced only when a single message is
    /// left and nothing more can be trimmed.
    pub async fn complete(
        &self,
        messages: Vec<Message>,
        profile: ModelProfile,
        streaming: bool,
    ) -> Result<String, LlmError> {
        let mut messages = messages;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut failures = 0usize;
        let mut backoff = Duration::from_millis(self.retry.initial_backoff_ms);

        loop {
            let request = self.build_request(&messages, profile);
            debug!(
                model = request.model.as_str(),
                %profile,
                messages = messages.len(),
                streaming,
                "Sending completion request"
            );

            let result = if streaming {
                self.stream_once(request).await
            } else {
                self.service.complete(request).await.map(|response| {
                    (response.message.content, response.usage)
                })
            };

            match result {
                Ok((text, usage)) => {
                    self.track_usage(&usage);
                    return Ok(text);
                }
                Err(e) if e.is_context_overflow() => {
                    if messages.len() <= 1 {
                        return Err(e);
                    }
                    messages.remove(0);
                    warn!(
                        remaining = messages.len(),
                        error = %e,
                        "Context length exceeded, trimming oldest message"
                    );
                }
                Err(e) => {
                    failures += 1;
                    if failures >= max_attempts {
                        warn!(attempts = failures, error = %e, "Completion retries exhausted");
                        return Err(LlmError::RetriesExhausted {
                            attempts: failures,
                            last: Box::new(e),
                        });
                    }
                    let wait = match &e {
                        LlmError::RateLimited { retry_after_secs } => {
                            std::cmp::max(Duration::from_secs(*retry_after_secs), backoff)
                        }
                        _ => backoff,
                    };
                    info!(
                        attempt = failures,
                        max_attempts,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "Retrying after completion error"
                    );
                    tokio::time::sleep(wait).await;
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    /// Single-turn convenience: one system instruction, no history.
    pub async fn instruct(&self, instructions: impl Into<String>, profile: ModelProfile) -> Result<String, LlmError> {
        self.complete(vec![Message::system(instructions)], profile, false)
            .await
    }

    /// Run one streaming completion, collecting deltas until the finish signal.
    async fn stream_once(&self, request: CompletionRequest) -> Result<(String, TokenUsage), LlmError> {
        let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
        let producer = self.service.complete_streaming(request, tx);
        let observer = self.delta_observer.as_ref();
        // Owning `rx` closes the channel on early return, so a producer still
        // sending fails instead of blocking on a full buffer.
        let consumer = async move {
            let mut text = String::new();
            while let Some(event) = rx.recv().await {
                if let Some(observer) = observer {
                    let _ = observer.send(event.clone()).await;
                }
                match event {
                    StreamEvent::Token(delta) => text.push_str(&delta),
                    StreamEvent::Done { usage, .. } => return Ok((text, usage)),
                    StreamEvent::Error(message) => return Err(LlmError::Streaming { message }),
                }
            }
            Err(LlmError::Streaming {
                message: "stream closed before finish signal".to_string(),
            })
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        produced?;
        consumed
    }
}
