//! Dense embedding generation (C6): a local FastEmbed ONNX model by default,
//! with a deterministic hashed fallback for environments where downloading a
//! model is undesirable.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use tokio::sync::Mutex;

use crate::config::EmbeddingBackendKind;
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct EmbeddingProvider {
    inner: EmbeddingInner,
}

#[derive(Clone)]
enum EmbeddingInner {
    Hashed {
        dimension: usize,
    },
    FastEmbed {
        model: Arc<Mutex<TextEmbedding>>,
        model_name: EmbeddingModel,
        dimension: usize,
    },
}

impl EmbeddingProvider {
    pub fn backend_label(&self) -> &'static str {
        match self.inner {
            EmbeddingInner::Hashed { .. } => "hashed",
            EmbeddingInner::FastEmbed { .. } => "fastembed",
        }
    }

    pub fn dimension(&self) -> usize {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => *dimension,
            EmbeddingInner::FastEmbed { dimension, .. } => *dimension,
        }
    }

    pub fn model_code(&self) -> Option<String> {
        match &self.inner {
            EmbeddingInner::FastEmbed { model_name, .. } => Some(model_name.to_string()),
            EmbeddingInner::Hashed { .. } => None,
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(hashed_embedding(text, *dimension)),
            EmbeddingInner::FastEmbed { model, .. } => {
                let mut guard = model.lock().await;
                let embeddings = guard
                    .embed(vec![text.to_owned()], None)
                    .map_err(|err| AppError::EmbeddingError(format!("fastembed: {err}")))?;
                embeddings.into_iter().next().ok_or_else(|| {
                    AppError::EmbeddingError("fastembed returned no embedding for input".to_string())
                })
            }
        }
    }

    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        match &self.inner {
            EmbeddingInner::Hashed { dimension } => Ok(texts
                .into_iter()
                .map(|text| hashed_embedding(&text, *dimension))
                .collect()),
            EmbeddingInner::FastEmbed { model, .. } => {
                if texts.is_empty() {
                    return Ok(Vec::new());
                }
                let mut guard = model.lock().await;
                guard
                    .embed(texts, None)
                    .map_err(|err| AppError::EmbeddingError(format!("fastembed batch: {err}")))
            }
        }
    }
}

/// Builds the configured embedding backend. FastEmbed initialisation loads
/// an ONNX model from disk (or downloads it on first run) and is run on a
/// blocking thread pool so it never stalls the async runtime.
pub async fn build_provider(
    backend: EmbeddingBackendKind,
    model_code: Option<&str>,
    default_dimension: usize,
) -> Result<EmbeddingProvider> {
    match backend {
        EmbeddingBackendKind::Hashed => Ok(EmbeddingProvider {
            inner: EmbeddingInner::Hashed {
                dimension: default_dimension.max(1),
            },
        }),
        EmbeddingBackendKind::FastEmbed => {
            let model_name = if let Some(code) = model_code {
                EmbeddingModel::from_str(code)
                    .map_err(|err| AppError::EmbeddingError(err.to_string()))?
            } else {
                EmbeddingModel::default()
            };

            let options = TextInitOptions::new(model_name.clone()).with_show_download_progress(false);
            let model_name_for_task = model_name.clone();
            let model_name_code = model_name.to_string();

            let (model, dimension) = tokio::task::spawn_blocking(move || -> Result<_> {
                let model = TextEmbedding::try_new(options)
                    .map_err(|err| AppError::EmbeddingError(format!("initialising fastembed model: {err}")))?;
                let info = EmbeddingModel::get_model_info(&model_name_for_task).ok_or_else(|| {
                    AppError::EmbeddingError(format!("fastembed model metadata missing for {model_name_code}"))
                })?;
                Ok((model, info.dim))
            })
            .await
            .map_err(|err| AppError::EmbeddingError(format!("joining fastembed init task: {err}")))??;

            Ok(EmbeddingProvider {
                inner: EmbeddingInner::FastEmbed {
                    model: Arc::new(Mutex::new(model)),
                    model_name,
                    dimension,
                },
            })
        }
    }
}

/// A fallback embedding that needs no model: a normalized bag-of-tokens hash
/// vector. Deterministic, so identical text always maps to the same vector,
/// but it carries none of a real model's semantic structure.
fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let dim = dimension.max(1);
    let mut vector = vec![0.0f32; dim];
    if text.is_empty() {
        return vector;
    }

    let mut token_count = 0f32;
    for token in tokens(text) {
        token_count += 1.0;
        let idx = bucket(&token, dim);
        vector[idx] += 1.0;
    }

    if token_count == 0.0 {
        return vector;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }

    vector
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_ascii_lowercase())
}

fn bucket(token: &str, dimension: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    (hasher.finish() as usize) % dimension
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn hashed(dimension: usize) -> EmbeddingProvider {
        build_provider(EmbeddingBackendKind::Hashed, None, dimension)
            .await
            .expect("hashed provider never fails to build")
    }

    #[tokio::test]
    async fn hashed_backend_is_deterministic() {
        let provider = hashed(64).await;
        let a = provider.embed("the quick brown fox").await.expect("embed");
        let b = provider.embed("the quick brown fox").await.expect("embed");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn hashed_backend_distinguishes_different_text() {
        let provider = hashed(64).await;
        let a = provider.embed("apples").await.expect("embed");
        let b = provider.embed("oranges").await.expect("embed");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn hashed_backend_is_unit_norm_for_nonempty_text() {
        let provider = hashed(32).await;
        let v = provider.embed("some words here").await.expect("embed");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_text_yields_zero_vector() {
        let provider = hashed(16).await;
        let v = provider.embed("").await.expect("embed");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn embed_batch_matches_per_item_embed() {
        let provider = hashed(32).await;
        let batch = provider
            .embed_batch(vec!["one".to_string(), "two".to_string()])
            .await
            .expect("batch");
        let one = provider.embed("one").await.expect("embed");
        let two = provider.embed("two").await.expect("embed");
        assert_eq!(batch, vec![one, two]);
    }

    #[tokio::test]
    async fn backend_label_reflects_configured_backend() {
        let provider = hashed(8).await;
        assert_eq!(provider.backend_label(), "hashed");
        assert_eq!(provider.model_code(), None);
    }
}
