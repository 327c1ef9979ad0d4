//! Query-time pipeline: the model runtime client (C7), the circuit breaker
//! guarding it (C14), per-client rate limiting (C15), the hybrid retriever
//! (C11), intent classification, and the self-correcting RAG workflow
//! (C12) built on top of them.

pub mod circuit_breaker;
pub mod hybrid_retriever;
pub mod intent;
pub mod model_client;
pub mod rag;
pub mod rate_limiter;
pub mod summarizer;

pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use hybrid_retriever::{HybridRetriever, RetrievedChunk};
pub use intent::{classify as classify_intent, Intent};
pub use model_client::{ChatMessage, ChatOptions, ModelRuntime, OllamaModelRuntime};
pub use rag::{RagOutcome, SelfCorrectingRag};
pub use rate_limiter::RateLimiter;
pub use summarizer::ModelSummaryGenerator;
