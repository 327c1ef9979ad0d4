use std::collections::HashMap;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{AppError, Result};

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_http_bind() -> String {
    "0.0.0.0:8420".to_string()
}

fn default_model_runtime_host() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_query_model() -> String {
    "llama3.1".to_string()
}

fn default_embedding_dimension() -> usize {
    384
}

fn default_session_storage_mode() -> SessionStorageMode {
    SessionStorageMode::Persistent
}

fn default_session_db_path() -> String {
    "sessions.db".to_string()
}

fn default_worker_batch_size() -> usize {
    20
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_cooldown_secs() -> u64 {
    300
}

fn default_rate_limits() -> HashMap<String, String> {
    let mut limits = HashMap::new();
    limits.insert("/ask_rag".to_string(), "1/second".to_string());
    limits.insert("/ask".to_string(), "5/second".to_string());
    limits
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStorageMode {
    Memory,
    Persistent,
}

/// Top-level, layered configuration for the engine. Deserialized from an
/// optional `config.toml` (or `config.{ext}` per the `config` crate's
/// supported formats) plus environment variable overrides (`ENGINE__*`),
/// with field-level defaults so a bare environment still boots.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_http_bind")]
    pub http_bind: String,

    #[serde(default = "default_model_runtime_host")]
    pub model_runtime_host: String,

    #[serde(default = "default_query_model")]
    pub query_model: String,

    #[serde(default = "default_query_model")]
    pub grading_model: String,

    #[serde(default = "default_query_model")]
    pub summarization_model: String,

    #[serde(default)]
    pub embedding_backend: EmbeddingBackendKind,

    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,

    #[serde(default = "default_session_storage_mode")]
    pub session_storage_mode: SessionStorageMode,

    #[serde(default = "default_session_db_path")]
    pub session_db_path: String,

    #[serde(default)]
    pub watched_folders: Vec<String>,

    #[serde(default = "default_rate_limits")]
    pub rate_limits: HashMap<String, String>,

    #[serde(default = "default_worker_batch_size")]
    pub worker_batch_size: usize,

    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,

    #[serde(default = "default_circuit_breaker_cooldown_secs")]
    pub circuit_breaker_cooldown_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    #[default]
    FastEmbed,
    Hashed,
}

impl EngineConfig {
    pub fn catalog_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("catalog.db")
    }

    pub fn vectors_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("vectors")
    }

    pub fn bm25_snapshot_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("bm25.snapshot")
    }

    pub fn sessions_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join(&self.session_db_path)
    }

    pub fn logs_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("logs")
    }
}

/// Loads configuration from `config.toml` in the working directory (if
/// present) layered with environment variables prefixed `ENGINE__`, e.g.
/// `ENGINE__DATA_DIR=/srv/engine/data`.
pub fn get_config() -> Result<EngineConfig> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::with_prefix("ENGINE").separator("__"));

    let config = builder
        .build()
        .map_err(|err| AppError::StorageError(format!("loading config: {err}")))?;

    config
        .try_deserialize()
        .map_err(|err| AppError::StorageError(format!("parsing config: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::builder()
            .build()
            .expect("empty config builds");
        let engine: EngineConfig = config.try_deserialize().expect("defaults cover all fields");
        assert_eq!(engine.data_dir, "./data");
        assert_eq!(engine.embedding_dimension, 384);
        assert_eq!(engine.session_storage_mode, SessionStorageMode::Persistent);
        assert!(engine.watched_folders.is_empty());
    }
}
