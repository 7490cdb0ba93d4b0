//! Error types for the quiz bot.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("UI error: {0}")]
    Ui(#[from] UiError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Turn error: {0}")]
    Turn(#[from] TurnError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate key: {entity} with id {id} already exists")]
    Duplicate { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Errors raised while turning provider events into dispatchable calls.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Arguments for {function} failed schema validation: {reason}")]
    SchemaValidation { function: String, reason: String },

    #[error("Model called undeclared function {name}")]
    UnknownFunction { name: String },

    #[error("Function {name} is not available while {phase}")]
    NotPermitted { name: String, phase: String },

    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),
}

/// Streamable UI misuse.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UiError {
    #[error("UI stream is already done")]
    AlreadyDone,
}

/// Conversation state misuse.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Turn has already been committed")]
    AlreadyCommitted,

    #[error("No turn is open")]
    NoOpenTurn,

    #[error("Committed history is append-only")]
    NotAppendOnly,
}

/// Errors that abort a turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Render fault: {0}")]
    Render(#[from] UiError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Completion stream ended without a terminal event")]
    NoTerminalEvent,

    #[error("Unknown or already answered question {0}")]
    UnknownQuestion(String),

    #[error("Question {question_id} has no option {option_id}")]
    UnknownOption {
        question_id: String,
        option_id: String,
    },

    #[error("Invalid purchase: {0}")]
    InvalidPurchase(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
