//! Streaming OpenAI-compatible chat completions client.
//!
//! Speaks the server-sent-events protocol of `/chat/completions` with
//! `stream: true` and legacy `functions` declarations. Text deltas are
//! accumulated and surfaced as cumulative `CompletionEvent::Text` events;
//! a streamed `function_call` is buffered until the stream finishes and then
//! surfaced as a single `CompletionEvent::FunctionCall`.
//!
//! Committed history replays `function` role messages that carry a name but
//! no tool-call id, so requests stay on the legacy `functions` wire format.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::provider::{CompletionEvent, CompletionRequest, CompletionStream, LlmProvider};

const PROVIDER: &str = "openai";

/// OpenAI chat completions provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: SecretString, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let model = if request.model.is_empty() {
            self.model.as_str()
        } else {
            request.model.as_str()
        };
        let mut body = serde_json::json!({
            "model": model,
            "messages": request.messages,
            "temperature": request.temperature,
            "stream": true,
        });
        if !request.functions.is_empty() {
            body["functions"] = serde_json::json!(request.functions);
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, LlmError> {
        let body = self.request_body(&request);
        debug!(
            model = %body["model"],
            messages = request.messages.len(),
            functions = request.functions.len(),
            "Sending streaming completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LlmError::AuthFailed {
                    provider: PROVIDER.to_string(),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(std::time::Duration::from_secs);
                return Err(LlmError::RateLimited {
                    provider: PROVIDER.to_string(),
                    retry_after,
                });
            }
            status => {
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::RequestFailed {
                    provider: PROVIDER.to_string(),
                    reason: format!("HTTP {status}: {text}"),
                });
            }
        }

        let bytes = Box::pin(response.bytes_stream());
        let stream = futures::stream::unfold(
            (bytes, SseState::default()),
            |(mut bytes, mut state)| async move {
                loop {
                    if let Some(event) = state.pending.pop_front() {
                        return Some((event, (bytes, state)));
                    }
                    if state.finished {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => state.feed(&chunk),
                        Some(Err(e)) => {
                            state.finished = true;
                            return Some((
                                Err(LlmError::RequestFailed {
                                    provider: PROVIDER.to_string(),
                                    reason: format!("stream error: {e}"),
                                }),
                                (bytes, state),
                            ));
                        }
                        None => state.finish(),
                    }
                }
            },
        );

        Ok(Box::pin(stream))
    }
}

/// Incremental SSE decoder and delta accumulator.
#[derive(Default)]
struct SseState {
    /// Bytes of an incomplete trailing line.
    buffer: Vec<u8>,
    text: String,
    function_name: Option<String>,
    function_args: String,
    finished: bool,
    pending: std::collections::VecDeque<Result<CompletionEvent, LlmError>>,
}

impl SseState {
    fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim());
            if self.finished {
                return;
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.finish();
            return;
        }

        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                self.fail(format!("malformed chunk: {e}"));
                return;
            }
        };

        let Some(choice) = json["choices"].get(0) else {
            return;
        };
        let delta = &choice["delta"];

        if let Some(content) = delta["content"].as_str()
            && !content.is_empty()
        {
            self.text.push_str(content);
            self.pending.push_back(Ok(CompletionEvent::Text {
                content: self.text.clone(),
                is_final: false,
            }));
        }

        if let Some(call) = delta.get("function_call") {
            if let Some(name) = call["name"].as_str() {
                self.function_name = Some(name.to_string());
            }
            if let Some(args) = call["arguments"].as_str() {
                self.function_args.push_str(args);
            }
        }

        if choice["finish_reason"].is_string() {
            self.finish();
        }
    }

    /// Emit the terminal event exactly once.
    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(name) = self.function_name.take() {
            let raw = std::mem::take(&mut self.function_args);
            let arguments = if raw.trim().is_empty() {
                Ok(serde_json::json!({}))
            } else {
                serde_json::from_str(&raw)
            };
            match arguments {
                Ok(arguments) => self
                    .pending
                    .push_back(Ok(CompletionEvent::FunctionCall { name, arguments })),
                Err(e) => {
                    warn!(function = %name, "Function call arguments are not valid JSON");
                    self.pending.push_back(Err(LlmError::InvalidResponse {
                        provider: PROVIDER.to_string(),
                        reason: format!("function {name} arguments: {e}"),
                    }));
                }
            }
            return;
        }

        self.pending.push_back(Ok(CompletionEvent::Text {
            content: std::mem::take(&mut self.text),
            is_final: true,
        }));
    }

    fn fail(&mut self, reason: String) {
        self.finished = true;
        self.pending.push_back(Err(LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason,
        }));
    }
}
