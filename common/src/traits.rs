//! Seam traits shared across crate boundaries, so a lower-level crate (e.g.
//! `ingestion-pipeline`) can depend on a capability without depending on the
//! crate that implements it (e.g. `retrieval-pipeline`'s model client).

use async_trait::async_trait;

use crate::error::Result;

/// Produces a one-sentence summary of a file's text. Implemented by the
/// model runtime client; injected into the background worker so
/// `ingestion-pipeline` never needs to depend on `retrieval-pipeline`.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn summarize(&self, path: &str, text: &str) -> Result<String>;
}
