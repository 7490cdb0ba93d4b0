//! Completion dispatcher — turns a provider stream into typed events.
//!
//! The provider contract is "a terminated text stream OR one function call
//! per turn". `Dispatch` enforces it: once a terminal event has been handed
//! out, the underlying stream is dropped and no further events are yielded.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::llm::functions::{FunctionCall, definitions_for};
use crate::llm::provider::{
    ChatMessage, CompletionEvent, CompletionRequest, CompletionStream, LlmProvider,
};
use crate::session::Phase;

/// Event delivered to the turn orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEvent {
    /// Cumulative text; `is_final` marks the terminal fragment.
    Text { content: String, is_final: bool },
    /// Validated function invocation (always terminal).
    Function(FunctionCall),
}

impl DispatchEvent {
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Text { is_final, .. } => *is_final,
            Self::Function(_) => true,
        }
    }
}

/// Everything needed for one completion.
pub struct DispatchRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub phase: Phase,
    pub temperature: f32,
    pub model: String,
}

/// Wraps a constructor-injected provider.
pub struct CompletionDispatcher {
    llm: Arc<dyn LlmProvider>,
}

impl CompletionDispatcher {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Issue the streaming request. The system prompt is always placed
    /// first, followed by the conversation in order.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<Dispatch, DispatchError> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage::system(request.system_prompt));
        messages.extend(request.messages);

        let model = if request.model.is_empty() {
            self.llm.model_name().to_string()
        } else {
            request.model
        };

        let completion = CompletionRequest::new(model, messages)
            .with_functions(definitions_for(&request.phase))
            .with_temperature(request.temperature);

        let stream = self.llm.stream_completion(completion).await?;
        Ok(Dispatch {
            stream: Some(stream),
            phase: request.phase,
        })
    }
}

/// An in-flight completion.
pub struct Dispatch {
    stream: Option<CompletionStream>,
    phase: Phase,
}

impl Dispatch {
    /// Next event, or `None` once the stream has terminated. Errors are
    /// terminal as well.
    pub async fn next_event(&mut self) -> Option<Result<DispatchEvent, DispatchError>> {
        let stream = self.stream.as_mut()?;
        let item = match stream.next().await {
            Some(item) => item,
            None => {
                self.stream = None;
                return None;
            }
        };

        let event = match item {
            Ok(CompletionEvent::Text { content, is_final }) => {
                Ok(DispatchEvent::Text { content, is_final })
            }
            Ok(CompletionEvent::FunctionCall { name, arguments }) => {
                debug!(function = %name, "Model called function");
                FunctionCall::parse(&name, arguments, &self.phase).map(DispatchEvent::Function)
            }
            Err(e) => Err(DispatchError::Provider(e)),
        };

        match &event {
            Ok(ev) if !ev.is_terminal() => {}
            Ok(_) => self.stream = None,
            Err(e) => {
                warn!(error = %e, "Completion aborted");
                self.stream = None;
            }
        }
        Some(event)
    }

    pub fn is_terminated(&self) -> bool {
        self.stream.is_none()
    }
}
