//! One-sentence file summarizer for the background worker's summary queue.
//!
//! Implements `common::traits::SummaryGenerator` against the model runtime
//! client, which keeps `ingestion-pipeline` decoupled from this crate.

use std::sync::Arc;

use async_trait::async_trait;
use common::error::{AppError, Result};
use common::traits::SummaryGenerator;

use crate::circuit_breaker::CircuitBreaker;
use crate::model_client::{ChatMessage, ChatOptions, ModelRuntime};

/// Characters of file text fed into the summarization prompt; long files are
/// truncated rather than sent in full.
const MAX_SUMMARY_INPUT_CHARS: usize = 4000;

pub struct ModelSummaryGenerator {
    client: Arc<dyn ModelRuntime>,
    circuit_breaker: Arc<CircuitBreaker>,
    model: String,
}

impl ModelSummaryGenerator {
    pub fn new(client: Arc<dyn ModelRuntime>, circuit_breaker: Arc<CircuitBreaker>, model: impl Into<String>) -> Self {
        Self {
            client,
            circuit_breaker,
            model: model.into(),
        }
    }
}

#[async_trait]
impl SummaryGenerator for ModelSummaryGenerator {
    async fn summarize(&self, path: &str, text: &str) -> Result<String> {
        if !self.circuit_breaker.allow() {
            return Err(AppError::ModelUnavailable("model runtime circuit open".to_string()));
        }

        let truncated: String = text.chars().take(MAX_SUMMARY_INPUT_CHARS).collect();
        let prompt = format!(
            "File: {path}\n\nWrite exactly one concise sentence summarizing this file's content:\n\n{truncated}"
        );
        let messages = [ChatMessage::user(prompt)];
        let options = ChatOptions {
            max_tokens: 80,
            temperature: 0.1,
            ..ChatOptions::default()
        };

        match self.client.chat(&self.model, &messages, options).await {
            Ok(summary) => {
                self.circuit_breaker.record_success();
                let summary = summary.trim().to_string();
                if summary.is_empty() {
                    Err(AppError::ModelRuntimeError("runtime returned an empty summary".to_string()))
                } else {
                    Ok(summary)
                }
            }
            Err(err) => {
                self.circuit_breaker.record_failure();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::test_support::StubModelRuntime;
    use std::time::Duration;

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(5, Duration::from_secs(300)))
    }

    #[tokio::test]
    async fn summarize_trims_and_returns_model_reply() {
        let client = Arc::new(StubModelRuntime::ok(vec!["  a tidy summary  "]));
        let generator = ModelSummaryGenerator::new(client, breaker(), "test-model");
        let summary = generator.summarize("/a.txt", "some file content").await.expect("summarize");
        assert_eq!(summary, "a tidy summary");
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_without_calling_the_model() {
        let client = Arc::new(StubModelRuntime::ok(vec!["unused"]));
        let cb = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        let generator = ModelSummaryGenerator::new(client.clone(), cb, "test-model");
        let err = generator.summarize("/a.txt", "content").await.expect_err("circuit open");
        assert!(matches!(err, AppError::ModelUnavailable(_)));
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn failed_call_records_a_circuit_breaker_failure() {
        let client = Arc::new(StubModelRuntime::new(vec![Err(AppError::ModelRuntimeError("boom".to_string()))]));
        let cb = breaker();
        let generator = ModelSummaryGenerator::new(client, cb.clone(), "test-model");
        assert!(generator.summarize("/a.txt", "content").await.is_err());
        assert_eq!(cb.consecutive_failures(), 1);
    }
}
