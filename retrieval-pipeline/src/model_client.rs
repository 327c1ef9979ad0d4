//! Model runtime client (C7): request/response against a locally hosted
//! generative language model over its native chat API (Ollama-compatible).
//!
//! Specified as a trait rather than a concrete struct, per the design note
//! replacing the original's dynamic dispatch over an ad-hoc-kwargs provider
//! object with a small, enumerated option set — `rag`/`summarizer` depend on
//! [`ModelRuntime`], never on the HTTP transport directly.

use std::time::Duration;

use async_trait::async_trait;
use common::error::{AppError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Enumerated option set for a chat call (the design note's alternative to
/// passing arbitrary provider-specific kwargs through).
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub timeout: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            top_p: 0.9,
            repeat_penalty: 1.1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// The model-runtime seam. `chat` is never retried by the implementation or
/// its callers — retry/backoff policy belongs entirely to the circuit
/// breaker (§4.14).
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn chat(&self, model: &str, messages: &[ChatMessage], options: ChatOptions) -> Result<String>;

    /// Lightweight reachability probe used by the circuit breaker's
    /// prober. Returns `false` for both "connection refused" and
    /// "reachable but returned an error status" — the distinction is only
    /// logged, not surfaced, matching the original health monitor's
    /// two-field (status, consecutive_failures) model.
    async fn health(&self) -> bool;
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    repeat_penalty: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: WireOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Talks to a local Ollama-compatible runtime over its native `/api/chat`
/// and `/api/tags` endpoints.
pub struct OllamaModelRuntime {
    http: reqwest::Client,
    host: String,
}

impl OllamaModelRuntime {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            host: host.into(),
        }
    }
}

#[async_trait]
impl ModelRuntime for OllamaModelRuntime {
    async fn chat(&self, model: &str, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        let request = ChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
            options: WireOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
                top_p: options.top_p,
                repeat_penalty: options.repeat_penalty,
            },
        };

        let url = format!("{}/api/chat", self.host.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&request)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() || err.is_timeout() {
                    AppError::ModelUnavailable(format!("model runtime unreachable: {err}"))
                } else {
                    AppError::ModelRuntimeError(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ModelRuntimeError(format!("runtime returned {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| AppError::ModelRuntimeError(format!("decoding runtime response: {err}")))?;
        Ok(parsed.message.content)
    }

    async fn health(&self) -> bool {
        let url = format!("{}/api/tags", self.host.trim_end_matches('/'));
        match self.http.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!(target: "engine::model_client", status = %response.status(), "runtime reachable but returned an error status");
                false
            }
            Err(err) => {
                tracing::debug!(target: "engine::model_client", error = %err, "runtime unreachable");
                false
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support {
    use super::{ChatMessage, ChatOptions, ModelRuntime};
    use async_trait::async_trait;
    use common::error::{AppError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A scriptable stand-in for the runtime: replays `responses` in order,
    /// failing with `ModelUnavailable` once exhausted unless `healthy` is set.
    pub struct StubModelRuntime {
        responses: Mutex<Vec<Result<String>>>,
        calls: AtomicUsize,
        healthy: std::sync::atomic::AtomicBool,
    }

    impl StubModelRuntime {
        pub fn new(responses: Vec<Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
                healthy: std::sync::atomic::AtomicBool::new(true),
            }
        }

        pub fn ok(replies: Vec<&str>) -> Self {
            Self::new(replies.into_iter().map(|r| Ok(r.to_string())).collect())
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ModelRuntime for StubModelRuntime {
        async fn chat(&self, _model: &str, _messages: &[ChatMessage], _options: ChatOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut guard = self.responses.lock().unwrap_or_else(|p| p.into_inner());
            if guard.is_empty() {
                return Err(AppError::ModelUnavailable("stub exhausted".to_string()));
            }
            guard.remove(0)
        }

        async fn health(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }
}
