//! The synchronous per-file ingestion pipeline, its pluggable text parser,
//! and the background worker that drains embedding and summarization queues.

pub mod parser;
pub mod pipeline;
pub mod worker;

pub use pipeline::{ingest_file, remove_path, IngestOutcome, IngestionContext};
pub use worker::Worker;
