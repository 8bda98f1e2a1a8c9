//! Pipeline orchestrator.
//!
//! For each configured source, in order: derive a search query, retrieve
//! candidates, filter them in parallel and consolidate the survivors. Non-empty
//! per-source summaries are merged into one answer, which is persisted through
//! the result sink.

use crate::completion::{CompletionClient, CompletionService};
use crate::config::{SieveConfig, SourceConfig};
use crate::consolidator::Consolidator;
use crate::error::{ConfigError, Result, SourceError};
use crate::extractor::DeepExtractor;
use crate::filter::ParallelFilter;
use crate::merge::MergeGate;
use crate::scorer::RelevanceScorer;
use crate::sink::{FileResultSink, ResultSink, derive_filename};
use crate::sources::{DocumentSource, PageRenderer};
use crate::tokens::ProfileTokenizers;
use crate::types::{Document, ModelProfile, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-source summary of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: String,
    pub query: String,
    pub candidates: usize,
    pub survivors: usize,
    pub failures: usize,
    /// Candidates whose body was replaced by deep-extraction notes.
    pub enriched: usize,
    pub summary: String,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SourceReport>,
    /// Where the answer was written, if it was saved.
    pub saved_to: Option<PathBuf>,
    pub usage: TokenUsage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Progress notifications for a pipeline run.
pub trait PipelineCallback: Send + Sync {
    fn on_source_start(&self, _source: &str) {}
    fn on_candidates(&self, _source: &str, _query: &str, _count: usize) {}
    fn on_source_complete(&self, _report: &SourceReport) {}
    fn on_answer(&self, _answer: &str) {}
}

/// Callback that ignores every notification.
pub struct NoOpCallback;

impl PipelineCallback for NoOpCallback {}

/// Instructions for turning the question into a search query for one source.
pub fn query_prompt(question: &str, source: &str) -> String {
    format!(
        "You are preparing a search on the '{source}' source to answer the question: '{question}'.\n\
         \n\
         Write one concise search query likely to surface documents that answer it.\n\
         Reply with the search query only."
    )
}

/// Strip quoting and whitespace a model tends to wrap queries in.
fn clean_query(raw: &str) -> String {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    line.trim_matches(|c| c == '"' || c == '\'' || c == '`').trim().to_string()
}

/// A configured source paired with its implementation.
struct SourceBinding {
    config: SourceConfig,
    source: Arc<dyn DocumentSource>,
}

pub struct ResearchPipeline {
    config: SieveConfig,
    client: Arc<CompletionClient>,
    gate: MergeGate,
    filter: ParallelFilter,
    consolidator: Consolidator,
    sources: Vec<SourceBinding>,
    sink: Option<Arc<dyn ResultSink>>,
    callback: Arc<dyn PipelineCallback>,
}

impl ResearchPipeline {
    /// Wire a pipeline around an existing completion client.
    ///
    /// Every source named in `config.sources` must be present in `sources`;
    /// extra sources are ignored. When `output.save_results` is set, answers go
    /// to a [`FileResultSink`] in `output.directory`. A sink passed to
    /// [`Self::with_sink`] replaces it and is used even when saving is off.
    pub fn new(
        config: SieveConfig,
        client: Arc<CompletionClient>,
        renderer: Arc<dyn PageRenderer>,
        sources: Vec<Arc<dyn DocumentSource>>,
    ) -> Result<Self> {
        config.validate()?;
        let tokenizers = ProfileTokenizers::new(&config.models)?;
        let gate = MergeGate::new(client.clone(), tokenizers.clone(), &config.merge);
        let filter = ParallelFilter::new(
            RelevanceScorer::new(client.clone()),
            DeepExtractor::new(renderer, gate.clone(), config.merge.extract_attempts),
            tokenizers,
            config.filter.workers,
        );
        let consolidator = Consolidator::new(gate.clone(), config.merge.consolidate_attempts);

        let mut bindings = Vec::with_capacity(config.sources.len());
        for source_config in &config.sources {
            let Some(source) = sources.iter().find(|s| s.name() == source_config.name) else {
                return Err(ConfigError::Invalid {
                    message: format!("no document source registered for '{}'", source_config.name),
                }
                .into());
            };
            bindings.push(SourceBinding {
                config: source_config.clone(),
                source: Arc::clone(source),
            });
        }
        for source in &sources {
            if !config.sources.iter().any(|c| c.name == source.name()) {
                warn!(source = source.name(), "Source registered but not configured, ignoring");
            }
        }

        let sink: Option<Arc<dyn ResultSink>> = if config.output.save_results {
            Some(Arc::new(FileResultSink::new(config.output.directory.clone())))
        } else {
            None
        };

        Ok(Self {
            config,
            client,
            gate,
            filter,
            consolidator,
            sources: bindings,
            sink,
            callback: Arc::new(NoOpCallback),
        })
    }

    /// Build the completion client from a bare service using `config.retry`.
    pub fn from_service(
        config: SieveConfig,
        service: Arc<dyn CompletionService>,
        renderer: Arc<dyn PageRenderer>,
        sources: Vec<Arc<dyn DocumentSource>>,
    ) -> Result<Self> {
        let client = Arc::new(CompletionClient::new(
            service,
            config.models.clone(),
            config.retry.clone(),
        ));
        Self::new(config, client, renderer, sources)
    }

    /// Persist answers through `sink`, overriding `output.save_results`.
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        if !self.config.output.save_results {
            debug!("Explicit result sink overrides output.save_results = false");
        }
        self.sink = Some(sink);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn PipelineCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn config(&self) -> &SieveConfig {
        &self.config
    }

    /// Run the pipeline and return the final answer.
    pub async fn run(&self, question: &str) -> Result<String> {
        Ok(self.run_detailed(question).await?.answer)
    }

    /// Run the pipeline and return the answer with per-source details.
    pub async fn run_detailed(&self, question: &str) -> Result<ResearchReport> {
        let started_at = Utc::now();
        info!(question, sources = self.sources.len(), "Research started");

        let mut reports = Vec::with_capacity(self.sources.len());
        let mut answer = String::new();
        for binding in &self.sources {
            let report = self.research_source(question, binding).await?;
            if !report.summary.trim().is_empty() {
                answer = if answer.is_empty() {
                    report.summary.clone()
                } else {
                    self.gate
                        .merge(question, &answer, &report.summary, self.config.merge.consolidate_attempts)
                        .await?
                        .text
                };
            }
            self.callback.on_source_complete(&report);
            reports.push(report);
        }
        self.callback.on_answer(&answer);

        let saved_to = self.save(question, &answer).await?;
        let usage = self.client.total_usage();
        info!(
            answer_chars = answer.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Research complete"
        );

        Ok(ResearchReport {
            question: question.to_string(),
            answer,
            sources: reports,
            saved_to,
            usage,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn research_source(&self, question: &str, binding: &SourceBinding) -> Result<SourceReport> {
        let name = binding.config.name.as_str();
        self.callback.on_source_start(name);

        let query = self.derive_query(question, name).await?;
        let candidates = self.retrieve(binding, &query).await?;
        self.callback.on_candidates(name, &query, candidates.len());
        info!(source = name, query = query.as_str(), candidates = candidates.len(), "Candidates retrieved");

        let mut report = SourceReport {
            source: name.to_string(),
            query,
            candidates: candidates.len(),
            survivors: 0,
            failures: 0,
            enriched: 0,
            summary: String::new(),
        };
        if candidates.is_empty() {
            return Ok(report);
        }

        let outcome = self.filter.filter(question, candidates).await?;
        report.survivors = outcome.survivors.len();
        report.failures = outcome.failures.len();
        report.enriched = outcome.enriched;
        report.summary = self.consolidator.consolidate(question, &outcome.survivors).await?;
        Ok(report)
    }

    /// Ask the fast profile for a source-specific query; falls back to the
    /// question itself when the answer is blank.
    async fn derive_query(&self, question: &str, source: &str) -> Result<String> {
        let raw = self
            .client
            .instruct(query_prompt(question, source), ModelProfile::Fast)
            .await?;
        let query = clean_query(&raw);
        if query.is_empty() {
            warn!(source, "Blank search query derived, using the question");
            return Ok(question.to_string());
        }
        Ok(query)
    }

    /// Search until the source returns something or attempts run out.
    ///
    /// Empty results after every attempt yield an empty set; an error on
    /// every attempt is [`SourceError::Exhausted`].
    async fn retrieve(&self, binding: &SourceBinding, query: &str) -> Result<Vec<Document>> {
        let config = &binding.config;
        let attempts = config.search_attempts.max(1);
        let delay = Duration::from_millis(config.retry_delay_ms);
        let mut errors = 0usize;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match binding.source.search(query, config.max_results).await {
                Ok(mut documents) if !documents.is_empty() => {
                    documents.truncate(config.max_results);
                    return Ok(documents);
                }
                Ok(_) => {
                    warn!(source = config.name.as_str(), attempt, attempts, "Search returned no results");
                }
                Err(e) => {
                    warn!(source = config.name.as_str(), attempt, attempts, error = %e, "Search failed");
                    errors += 1;
                    last_error = e.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(delay).await;
            }
        }

        if errors == attempts {
            return Err(SourceError::Exhausted {
                source_name: config.name.clone(),
                attempts,
                last: last_error,
            }
            .into());
        }
        warn!(source = config.name.as_str(), "No candidates found, source contributes nothing");
        Ok(Vec::new())
    }

    async fn save(&self, question: &str, answer: &str) -> Result<Option<PathBuf>> {
        let Some(sink) = &self.sink else {
            return Ok(None);
        };
        if answer.trim().is_empty() {
            warn!("Empty answer, nothing saved");
            return Ok(None);
        }
        let filename = derive_filename(question, Utc::now());
        Ok(Some(sink.save(&filename, answer).await?))
    }
}
