//! LLM integration for the quiz bot.
//!
//! - `provider`: the `LlmProvider` trait and wire-neutral message types
//! - `openai`: streaming OpenAI-compatible client (the only backend)
//! - `functions`: function declarations the model may call, per phase
//! - `dispatcher`: turns a provider stream into `DispatchEvent`s

pub mod dispatcher;
pub mod functions;
pub mod openai;
pub mod provider;

pub use dispatcher::{CompletionDispatcher, Dispatch, DispatchEvent, DispatchRequest};
pub use functions::FunctionCall;
pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub base_url: String,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.model.trim().is_empty() {
        return Err(LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: "model name must not be empty".to_string(),
        });
    }
    tracing::info!("Using OpenAI-compatible API at {} (model: {})", config.base_url, config.model);
    Ok(Arc::new(OpenAiProvider::new(
        config.api_key.clone(),
        config.base_url.clone(),
        config.model.clone(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_missing_key_still_constructs() {
        // The API key is only checked by the server on the first request.
        let config = LlmConfig {
            api_key: secrecy::SecretString::from(""),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo-preview".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4-turbo-preview");
    }

    #[test]
    fn test_create_provider_rejects_empty_model() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("sk-test"),
            base_url: "http://localhost:11434/v1".to_string(),
            model: "  ".to_string(),
        };
        assert!(create_provider(&config).is_err());
    }
}
