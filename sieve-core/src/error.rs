//! Error types for the Sieve research pipeline.
//!
//! Uses `thiserror` for public API error types with structured error variants
//! covering completion calls, relevance scoring, document sources, and
//! configuration.

use std::path::PathBuf;

/// Top-level error type for the Sieve core library.
#[derive(Debug, thiserror::Error)]
pub enum SieveError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Scoring error: {0}")]
    Score(#[from] ScoreError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Worker task failed: {message}")]
    Worker { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from text completion calls.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("Context length exceeded: {message}")]
    ContextOverflow { message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Unknown model profile: {name}")]
    UnknownProfile { name: String },

    #[error("Tokenizer unavailable for model {model}: {message}")]
    Tokenizer { model: String, message: String },

    #[error("Completion failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: Box<LlmError> },
}

impl LlmError {
    /// Whether this error reports that the conversation no longer fits the
    /// model's context window.
    pub fn is_context_overflow(&self) -> bool {
        match self {
            LlmError::ContextOverflow { .. } => true,
            LlmError::ApiRequest { message } => {
                let lower = message.to_lowercase();
                lower.contains("maximum context length") || lower.contains("context_length_exceeded")
            }
            _ => false,
        }
    }
}

/// Errors from the relevance judge.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("Judge response contained no integer score: {response:?}")]
    NoInteger { response: String },

    #[error("Judge score {score} is not a whole number: {response:?}")]
    NotInteger { score: String, response: String },

    #[error("Judge score {score} is outside the 0-4 range")]
    OutOfRange { score: i64 },

    #[error("Judge completion failed: {0}")]
    Completion(#[from] LlmError),
}

/// Errors from document sources.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Search on '{source_name}' failed: {message}")]
    SearchFailed { source_name: String, message: String },

    #[error("Source '{source_name}' failed on all {attempts} attempts: {last}")]
    Exhausted {
        source_name: String,
        attempts: usize,
        last: String,
    },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `SieveError`.
pub type Result<T> = std::result::Result<T, SieveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_llm() {
        let err = SieveError::Llm(LlmError::ApiRequest {
            message: "connection refused".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM error: API request failed: connection refused"
        );
    }

    #[test]
    fn test_error_display_score() {
        let err = SieveError::Score(ScoreError::OutOfRange { score: 7 });
        assert_eq!(
            err.to_string(),
            "Scoring error: Judge score 7 is outside the 0-4 range"
        );
    }

    #[test]
    fn test_error_display_source() {
        let err = SieveError::Source(SourceError::Exhausted {
            source_name: "web".into(),
            attempts: 5,
            last: "timeout".into(),
        });
        assert_eq!(
            err.to_string(),
            "Source error: Source 'web' failed on all 5 attempts: timeout"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SieveError = io_err.into();
        assert!(matches!(err, SieveError::Io(_)));
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = LlmError::RetriesExhausted {
            attempts: 7,
            last: Box::new(LlmError::Timeout { timeout_secs: 30 }),
        };
        assert_eq!(
            err.to_string(),
            "Completion failed after 7 attempts: Request timed out after 30s"
        );
    }

    #[test]
    fn test_context_overflow_detection() {
        assert!(
            LlmError::ContextOverflow {
                message: "too long".into()
            }
            .is_context_overflow()
        );
        assert!(
            LlmError::ApiRequest {
                message: "This model's maximum context length is 16385 tokens".into()
            }
            .is_context_overflow()
        );
        assert!(
            !LlmError::Connection {
                message: "reset".into()
            }
            .is_context_overflow()
        );
    }
}
