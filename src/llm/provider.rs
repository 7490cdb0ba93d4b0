//! Provider-facing types: chat messages, function declarations, completion
//! requests and the streaming event contract.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Function,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Function => "function",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "function" => Ok(Self::Function),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A single message as sent to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    /// Function identifier, only set on `Role::Function` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: content.into(),
            name: Some(name.into()),
        }
    }
}

/// A callable function declared to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

/// A streaming completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub functions: Vec<FunctionDefinition>,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            functions: Vec::new(),
            temperature: 1.0,
        }
    }

    pub fn with_functions(mut self, functions: Vec<FunctionDefinition>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// One event from a streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    /// Text received so far. `content` is cumulative, not a delta.
    Text { content: String, is_final: bool },
    /// A complete function invocation with raw (unvalidated) arguments.
    FunctionCall {
        name: String,
        arguments: serde_json::Value,
    },
}

/// Lazy sequence of completion events.
pub type CompletionStream =
    Pin<Box<dyn Stream<Item = Result<CompletionEvent, LlmError>> + Send>>;

/// A hosted completion provider with function calling.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier used when a request does not override it.
    fn model_name(&self) -> &str;

    /// Issue a streaming request.
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, LlmError>;
}
