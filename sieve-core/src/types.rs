//! Core type definitions for the Sieve pipeline.
//!
//! Defines the data structures shared across components: documents,
//! conversation messages, completion requests and responses, and model
//! profiles.

use crate::error::LlmError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A document returned by a source query. Identity is the `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub url: String,
    pub body: String,
}

impl Document {
    pub fn new(title: impl Into<String>, url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            body: body.into(),
        }
    }

    /// Render the document as a listing entry for prompts and batches.
    pub fn as_entry(&self) -> String {
        format!("TITLE: {}\nURL: {}\n{}\n", self.title, self.url, self.body)
    }
}

/// Which completion profile a call runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProfile {
    /// Cheap, low-latency model used for judging and first merge attempts.
    Fast,
    /// Larger model used after escalation; its budget sizes all chunking.
    Smart,
}

impl std::fmt::Display for ModelProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelProfile::Fast => write!(f, "fast"),
            ModelProfile::Smart => write!(f, "smart"),
        }
    }
}

impl FromStr for ModelProfile {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(ModelProfile::Fast),
            "smart" => Ok(ModelProfile::Smart),
            _ => Err(LlmError::UnknownProfile {
                name: s.to_string(),
            }),
        }
    }
}

/// Represents a participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Function => write!(f, "function"),
        }
    }
}

/// A single turn in a completion conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Function name for function-result turns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    /// Create a system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Create a function-result message.
    pub fn function_result(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: output.into(),
            name: Some(name.into()),
        }
    }
}

/// Token usage statistics from a completion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A stream event received during response streaming.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental content delta.
    Token(String),
    /// Terminal signal; no further events follow.
    Done {
        usage: TokenUsage,
        finish_reason: Option<String>,
    },
    Error(String),
}

/// A request to the completion service.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    /// Concrete model identifier resolved from the profile.
    pub model: String,
    pub profile: ModelProfile,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            model: String::new(),
            profile: ModelProfile::Fast,
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

impl CompletionRequest {
    /// Text of the first system turn, if any.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }
}

/// The result of a completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: TokenUsage,
    pub model: String,
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    /// Build a plain assistant text response.
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(text),
            usage: TokenUsage::default(),
            model: model.into(),
            finish_reason: Some("stop".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello, world!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, world!");
        assert!(msg.name.is_none());
    }

    #[test]
    fn test_function_result_message() {
        let msg = Message::function_result("web_search", "results here");
        assert_eq!(msg.role, Role::Function);
        assert_eq!(msg.name.as_deref(), Some("web_search"));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::Function.to_string(), "function");
    }

    #[test]
    fn test_profile_from_str() {
        assert_eq!("fast".parse::<ModelProfile>().unwrap(), ModelProfile::Fast);
        assert_eq!(" Smart ".parse::<ModelProfile>().unwrap(), ModelProfile::Smart);
        let err = "turbo".parse::<ModelProfile>().unwrap_err();
        assert!(matches!(err, LlmError::UnknownProfile { name } if name == "turbo"));
    }

    #[test]
    fn test_document_entry_format() {
        let doc = Document::new("Denver", "https://example.com/denver", "Capital of Colorado.");
        assert_eq!(
            doc.as_entry(),
            "TITLE: Denver\nURL: https://example.com/denver\nCapital of Colorado.\n"
        );
    }

    #[test]
    fn test_message_serialization_skips_empty_name() {
        let json = serde_json::to_value(Message::system("rules")).unwrap();
        assert_eq!(json["role"], "system");
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_usage_accumulate() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        });
        total.accumulate(&TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
        });
        assert_eq!(total.total(), 18);
    }

    #[test]
    fn test_system_prompt_lookup() {
        let request = CompletionRequest {
            messages: vec![Message::system("judge"), Message::user("doc")],
            ..Default::default()
        };
        assert_eq!(request.system_prompt(), Some("judge"));
    }
}
