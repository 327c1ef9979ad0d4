//! Persistent dense-vector store (C5), keyed by chunk id, metric = cosine.

use std::path::Path;

use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{self, Any};
use surrealdb::Surreal;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub path: String,
    pub summary: Option<String>,
    pub ordinal: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: VectorMetadata,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: String,
    pub document: String,
    pub metadata: VectorMetadata,
    pub distance: f32,
}

pub struct VectorIndex {
    client: Surreal<Any>,
    dimension: usize,
}

impl VectorIndex {
    pub async fn connect(dir: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let address = format!("surrealkv://{}", dir.join("store").display());
        let client = any::connect(address).await?;
        client.use_ns("engine").use_db("vectors").await?;
        let index = Self { client, dimension };
        index.ensure_initialized().await?;
        Ok(index)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub async fn memory(dimension: usize) -> Result<Self> {
        let client = any::connect("mem://").await?;
        client.use_ns("engine").use_db("vectors").await?;
        let index = Self { client, dimension };
        index.ensure_initialized().await?;
        Ok(index)
    }

    async fn ensure_initialized(&self) -> Result<()> {
        let dimension = self.dimension;
        self.client
            .query(format!(
                "
                DEFINE TABLE IF NOT EXISTS chunk_vector SCHEMAFULL;
                DEFINE FIELD IF NOT EXISTS chunk_id ON chunk_vector TYPE string;
                DEFINE FIELD IF NOT EXISTS embedding ON chunk_vector TYPE array<float>;
                DEFINE FIELD IF NOT EXISTS document ON chunk_vector TYPE string;
                DEFINE FIELD IF NOT EXISTS path ON chunk_vector TYPE string;
                DEFINE FIELD IF NOT EXISTS summary ON chunk_vector TYPE option<string>;
                DEFINE FIELD IF NOT EXISTS ordinal ON chunk_vector TYPE int;
                DEFINE INDEX IF NOT EXISTS idx_chunk_vector_chunk_id ON chunk_vector FIELDS chunk_id UNIQUE;
                DEFINE INDEX IF NOT EXISTS idx_chunk_vector_path ON chunk_vector FIELDS path;
                DEFINE INDEX IF NOT EXISTS idx_chunk_vector_embedding ON chunk_vector
                    FIELDS embedding HNSW DIMENSION {dimension} DIST COSINE TYPE F32 EFC 150 M 12;
                "
            ))
            .await?
            .check()?;
        Ok(())
    }

    /// Upserts `records`, keyed by `chunk_id`.
    pub async fn add(&self, records: &[VectorRecord]) -> Result<()> {
        for record in records {
            self.client
                .query(
                    "UPDATE chunk_vector SET embedding = $embedding, document = $document,
                     path = $path, summary = $summary, ordinal = $ordinal
                     WHERE chunk_id = $chunk_id RETURN AFTER",
                )
                .bind(("embedding", record.embedding.clone()))
                .bind(("document", record.document.clone()))
                .bind(("path", record.metadata.path.clone()))
                .bind(("summary", record.metadata.summary.clone()))
                .bind(("ordinal", record.metadata.ordinal as i64))
                .bind(("chunk_id", record.chunk_id.clone()))
                .await?
                .check()?;

            self.client
                .query(
                    "IF !(SELECT * FROM chunk_vector WHERE chunk_id = $chunk_id) THEN
                        (CREATE chunk_vector SET chunk_id = $chunk_id, embedding = $embedding,
                         document = $document, path = $path, summary = $summary, ordinal = $ordinal)
                     END",
                )
                .bind(("chunk_id", record.chunk_id.clone()))
                .bind(("embedding", record.embedding.clone()))
                .bind(("document", record.document.clone()))
                .bind(("path", record.metadata.path.clone()))
                .bind(("summary", record.metadata.summary.clone()))
                .bind(("ordinal", record.metadata.ordinal as i64))
                .await?
                .check()?;
        }
        Ok(())
    }

    /// Deletes every record whose `path` equals `path`.
    pub async fn delete_where_path(&self, path: &str) -> Result<()> {
        self.client
            .query("DELETE chunk_vector WHERE path = $path")
            .bind(("path", path.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn count_for_path(&self, path: &str) -> Result<usize> {
        #[derive(Deserialize)]
        struct Row {
            chunk_id: String,
        }
        let mut response = self
            .client
            .query("SELECT chunk_id FROM chunk_vector WHERE path = $path")
            .bind(("path", path.to_string()))
            .await?
            .check()?;
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows.len())
    }

    /// Top-`k` nearest neighbours to `embedding` by cosine distance.
    pub async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        #[derive(Deserialize)]
        struct Row {
            chunk_id: String,
            document: String,
            path: String,
            summary: Option<String>,
            ordinal: i64,
            distance: f32,
        }

        let mut response = self
            .client
            .query(format!(
                "SELECT chunk_id, document, path, summary, ordinal,
                        vector::distance::knn() AS distance
                 FROM chunk_vector WHERE embedding <|{k},150|> $embedding
                 ORDER BY distance"
            ))
            .bind(("embedding", embedding.to_vec()))
            .await?
            .check()?;

        let rows: Vec<Row> = response.take(0)?;
        Ok(rows
            .into_iter()
            .map(|r| VectorHit {
                chunk_id: r.chunk_id,
                document: r.document,
                metadata: VectorMetadata {
                    path: r.path,
                    summary: r.summary,
                    ordinal: r.ordinal as usize,
                },
                distance: r.distance,
            })
            .collect())
    }
}

/// Converts a cosine distance into a `[0, 1]`-clipped similarity score for
/// fusion, per the spec's `score = 1 - distance` rule.
pub fn distance_to_score(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(seed: f32) -> Vec<f32> {
        let mut v = vec![0.0_f32; 8];
        v[0] = seed;
        v[1] = 1.0 - seed;
        v
    }

    #[tokio::test]
    async fn add_then_query_finds_nearest() {
        let index = VectorIndex::memory(8).await.expect("memory index");
        index
            .add(&[
                VectorRecord {
                    chunk_id: "/a.txt:chunk:0".to_string(),
                    embedding: embedding(1.0),
                    document: "alpha content".to_string(),
                    metadata: VectorMetadata {
                        path: "/a.txt".to_string(),
                        summary: None,
                        ordinal: 0,
                    },
                },
                VectorRecord {
                    chunk_id: "/b.txt:chunk:0".to_string(),
                    embedding: embedding(0.0),
                    document: "beta content".to_string(),
                    metadata: VectorMetadata {
                        path: "/b.txt".to_string(),
                        summary: None,
                        ordinal: 0,
                    },
                },
            ])
            .await
            .expect("add");

        let hits = index.query(&embedding(1.0), 1).await.expect("query");
        assert_eq!(hits.first().map(|h| h.chunk_id.as_str()), Some("/a.txt:chunk:0"));
    }

    #[tokio::test]
    async fn delete_where_path_removes_only_that_path() {
        let index = VectorIndex::memory(8).await.expect("memory index");
        index
            .add(&[VectorRecord {
                chunk_id: "/a.txt:chunk:0".to_string(),
                embedding: embedding(1.0),
                document: "alpha".to_string(),
                metadata: VectorMetadata {
                    path: "/a.txt".to_string(),
                    summary: None,
                    ordinal: 0,
                },
            }])
            .await
            .expect("add");

        index.delete_where_path("/a.txt").await.expect("delete");
        assert_eq!(index.count_for_path("/a.txt").await.expect("count"), 0);
    }

    #[test]
    fn distance_to_score_clips_to_unit_interval() {
        assert_eq!(distance_to_score(-1.0), 1.0);
        assert_eq!(distance_to_score(2.0), 0.0);
        assert!((distance_to_score(0.25) - 0.75).abs() < 1e-6);
    }
}
