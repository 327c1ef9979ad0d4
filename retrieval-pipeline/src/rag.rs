//! Self-correcting RAG (C12): a fixed six-state workflow — Retrieve, Grade,
//! Decide, Transform, Generate, Done — built around the hybrid retriever and
//! the model runtime client, bounded to `max_attempts` query rewrites.

use std::sync::Arc;

use common::error::Result;
use serde_json::Value;

use crate::circuit_breaker::CircuitBreaker;
use crate::hybrid_retriever::{HybridRetriever, RetrievedChunk};
use crate::model_client::{ChatMessage, ChatOptions, ModelRuntime};

const MAX_ATTEMPTS: u32 = 3;
const GRADE_BATCH_SIZE: usize = 5;
const MAX_REWRITE_WORDS: usize = 15;

const GRADING_SYSTEM_PROMPT: &str =
    "You grade whether a document is relevant to a user's question. For each numbered document, \
     reply with exactly one line \"DOC <n>: RELEVANT\" or \"DOC <n>: NOT_RELEVANT\", nothing else.";

const GENERATION_SYSTEM_PROMPT: &str =
    "Answer the user's question using only the supplied documents. If the documents do not contain \
     the answer, say so plainly rather than guessing.";

#[derive(Debug, Clone, Copy)]
struct GradingStats {
    attempts: u32,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RagOutcome {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RagState {
    Retrieve,
    Grade,
    Decide,
    Transform,
    Generate,
}

pub struct SelfCorrectingRag {
    retriever: Arc<HybridRetriever>,
    model_client: Arc<dyn ModelRuntime>,
    circuit_breaker: Arc<CircuitBreaker>,
    grading_model: String,
    transform_model: String,
    generation_model: String,
}

impl SelfCorrectingRag {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        model_client: Arc<dyn ModelRuntime>,
        circuit_breaker: Arc<CircuitBreaker>,
        grading_model: impl Into<String>,
        transform_model: impl Into<String>,
        generation_model: impl Into<String>,
    ) -> Self {
        Self {
            retriever,
            model_client,
            circuit_breaker,
            grading_model: grading_model.into(),
            transform_model: transform_model.into(),
            generation_model: generation_model.into(),
        }
    }

    /// Runs the full Retrieve → Grade → Decide → Transform → Generate
    /// workflow for `original_query`, visiting Retrieve at most
    /// `MAX_ATTEMPTS + 1` times.
    pub async fn run(&self, original_query: &str, k: usize) -> Result<RagOutcome> {
        let mut current_query = original_query.to_string();
        let mut candidates: Vec<RetrievedChunk> = Vec::new();
        let mut graded: Vec<RetrievedChunk> = Vec::new();
        let mut stats = GradingStats { attempts: 0 };
        let mut state = RagState::Retrieve;

        loop {
            state = match state {
                RagState::Retrieve => {
                    candidates = self.retriever.retrieve(&current_query, k).await?;
                    RagState::Grade
                }
                RagState::Grade => {
                    if !self.circuit_breaker.allow() {
                        tracing::warn!(target: "engine::rag", "model runtime circuit open, skipping grading");
                        graded = candidates.clone();
                        RagState::Generate
                    } else {
                        graded = self.grade(original_query, &candidates).await;
                        RagState::Decide
                    }
                }
                RagState::Decide => {
                    if graded.is_empty() {
                        RagState::Transform
                    } else {
                        RagState::Generate
                    }
                }
                RagState::Transform => {
                    stats.attempts += 1;
                    let rewritten = self.transform(original_query, &current_query).await;
                    match rewritten {
                        Some(rewrite) if stats.attempts < MAX_ATTEMPTS && rewrite.trim() != current_query.trim() => {
                            current_query = rewrite;
                            RagState::Retrieve
                        }
                        _ => {
                            graded = candidates.clone();
                            RagState::Generate
                        }
                    }
                }
                RagState::Generate => break,
            };
        }

        let answer = match self.generate(original_query, &graded).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(target: "engine::rag", error = %err, "generation failed, returning candidate sources with an empty answer");
                String::new()
            }
        };

        Ok(RagOutcome {
            answer,
            sources: graded,
            attempts: stats.attempts,
        })
    }

    async fn call_model(&self, model: &str, messages: &[ChatMessage], options: ChatOptions) -> Result<String> {
        if !self.circuit_breaker.allow() {
            return Err(common::error::AppError::ModelUnavailable("model runtime circuit open".to_string()));
        }
        match self.model_client.chat(model, messages, options).await {
            Ok(text) => {
                self.circuit_breaker.record_success();
                Ok(text)
            }
            Err(err) => {
                self.circuit_breaker.record_failure();
                Err(err)
            }
        }
    }

    /// Grades candidates in batches of [`GRADE_BATCH_SIZE`]; a batch whose
    /// reply fails to parse, or whose verdict count doesn't match the
    /// batch, is kept in full rather than dropped.
    async fn grade(&self, original_query: &str, candidates: &[RetrievedChunk]) -> Vec<RetrievedChunk> {
        let mut kept = Vec::new();
        for batch in candidates.chunks(GRADE_BATCH_SIZE) {
            let prompt = build_grading_prompt(original_query, batch);
            let reply = self
                .call_model(
                    &self.grading_model,
                    &[ChatMessage::system(GRADING_SYSTEM_PROMPT), ChatMessage::user(prompt)],
                    ChatOptions {
                        temperature: 0.0,
                        max_tokens: 200,
                        ..ChatOptions::default()
                    },
                )
                .await;

            match reply {
                Ok(text) => match parse_grading_reply(&text, batch.len()) {
                    Some(verdicts) => {
                        for (chunk, relevant) in batch.iter().zip(verdicts) {
                            if relevant {
                                kept.push(chunk.clone());
                            }
                        }
                    }
                    None => kept.extend_from_slice(batch),
                },
                Err(err) => {
                    tracing::warn!(target: "engine::rag", error = %err, "grading call failed, keeping batch unfiltered");
                    kept.extend_from_slice(batch);
                }
            }
        }
        kept
    }

    /// Asks the model to rewrite the query; returns `None` on any failure
    /// or an empty reply, so the caller treats it the same as "no useful
    /// rewrite available" rather than aborting the workflow.
    async fn transform(&self, original_query: &str, current_query: &str) -> Option<String> {
        let prompt = format!(
            "Rewrite the search query below into a more specific query of at most {MAX_REWRITE_WORDS} words. \
             Reply with only the rewritten query, no commentary.\n\nOriginal question: {original_query}\nCurrent query: {current_query}"
        );
        let reply = self
            .call_model(
                &self.transform_model,
                &[ChatMessage::user(prompt)],
                ChatOptions {
                    temperature: 0.3,
                    max_tokens: 40,
                    ..ChatOptions::default()
                },
            )
            .await
            .ok()?;

        let cleaned = reply.trim().trim_matches('"').to_string();
        if cleaned.is_empty() {
            None
        } else {
            Some(clamp_words(&cleaned, MAX_REWRITE_WORDS))
        }
    }

    async fn generate(&self, original_query: &str, sources: &[RetrievedChunk]) -> Result<String> {
        let prompt = build_generation_prompt(original_query, sources);
        self.call_model(
            &self.generation_model,
            &[ChatMessage::system(GENERATION_SYSTEM_PROMPT), ChatMessage::user(prompt)],
            ChatOptions::default(),
        )
        .await
    }
}

fn clamp_words(text: &str, max: usize) -> String {
    text.split_whitespace().take(max).collect::<Vec<_>>().join(" ")
}

fn build_grading_prompt(original_query: &str, batch: &[RetrievedChunk]) -> String {
    let mut prompt = format!("Question: {original_query}\n\n");
    for (i, chunk) in batch.iter().enumerate() {
        prompt.push_str(&format!("DOC {}: {}\n\n", i + 1, truncate_chars(&chunk.content, 800)));
    }
    prompt
}

fn build_generation_prompt(original_query: &str, sources: &[RetrievedChunk]) -> String {
    let mut prompt = format!("Question: {original_query}\n\nDocuments:\n");
    if sources.is_empty() {
        prompt.push_str("(no relevant documents were found)\n");
    }
    for source in sources {
        prompt.push_str(&format!("- {}: {}\n", source.source_path, truncate_chars(&source.content, 1200)));
    }
    prompt
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Tolerantly parses a grading reply into per-document relevance. Tries, in
/// order: a JSON array, `"DOC n: RELEVANT"` lines, then a bare
/// comma/newline-separated token list. Returns `None` if nothing yields
/// exactly `expected` verdicts.
fn parse_grading_reply(text: &str, expected: usize) -> Option<Vec<bool>> {
    let trimmed = text.trim();
    if expected == 0 {
        return Some(Vec::new());
    }

    if let Ok(values) = serde_json::from_str::<Vec<Value>>(trimmed) {
        if values.len() == expected {
            return Some(values.iter().map(value_is_relevant).collect());
        }
    }

    let doc_lines: Vec<bool> = trimmed
        .lines()
        .filter(|line| line.to_lowercase().contains("doc"))
        .map(|line| token_is_relevant(line))
        .collect();
    if doc_lines.len() == expected {
        return Some(doc_lines);
    }

    let tokens: Vec<&str> = trimmed
        .split(|c| c == '\n' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if tokens.len() == expected {
        return Some(tokens.iter().map(|t| token_is_relevant(t)).collect());
    }

    None
}

fn value_is_relevant(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => token_is_relevant(s),
        _ => true,
    }
}

fn token_is_relevant(token: &str) -> bool {
    let lower = token.to_lowercase();
    !(lower.contains("not_relevant") || lower.contains("not relevant") || lower.trim() == "false" || lower.trim() == "0" || lower.trim() == "no")
}
