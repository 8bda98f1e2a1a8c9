//! # Sieve Core
//!
//! Core library for the Sieve research pipeline.
//! Queries document sources, judges every candidate against the question in
//! parallel, deep-reads the most relevant pages, and consolidates the survivors
//! into one answer through length-gated merges.

pub mod completion;
pub mod config;
pub mod consolidator;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod scorer;
pub mod sink;
pub mod sources;
pub mod testing;
pub mod tokens;
pub mod types;

// Re-export commonly used types at the crate root.
pub use completion::{CompletionClient, CompletionService};
pub use config::{SieveConfig, load_config, load_config_file, save_config};
pub use consolidator::Consolidator;
pub use error::{ConfigError, LlmError, Result, ScoreError, SieveError, SourceError};
pub use extractor::DeepExtractor;
pub use filter::{FilterOutcome, ParallelFilter, partition};
pub use merge::{MergeGate, MergeOutcome};
pub use pipeline::{NoOpCallback, PipelineCallback, ResearchPipeline, ResearchReport, SourceReport};
pub use scorer::{RelevanceScore, RelevanceScorer};
pub use sink::{FileResultSink, ResultSink};
pub use sources::{DocumentSource, FetchStatus, PageRenderer, RenderedPage};
pub use tokens::{ProfileTokenizers, TokenCounter};
pub use types::{
    CompletionRequest, CompletionResponse, Document, Message, ModelProfile, Role, StreamEvent, TokenUsage,
};
