//! In-memory BM25 keyword index (C4), periodically snapshotted to disk.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const K1: f64 = 1.2;
const B: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub path: String,
    pub ordinal: usize,
}

/// Ranked keyword retrieval over a corpus of chunk strings. Tokenisation is
/// lowercase + whitespace-split; scoring is classic BM25 with `k1 = 1.2`,
/// `b = 0.75`. The corpus and its metadata are what gets persisted; term
/// statistics are rebuilt from them on load.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Bm25Index {
    documents: Vec<String>,
    metadata: Vec<ChunkMetadata>,

    #[serde(skip)]
    doc_term_freqs: Vec<HashMap<String, usize>>,
    #[serde(skip)]
    doc_freq: HashMap<String, usize>,
    #[serde(skip)]
    doc_lengths: Vec<usize>,
    #[serde(skip)]
    avg_doc_length: f64,
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .filter(|t| !t.is_empty())
        .collect()
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Replaces any existing entries for `path`, then appends `chunks` under
    /// new indices, and rebuilds term statistics.
    pub fn add_chunks(&mut self, path: &str, chunks: &[(usize, String)]) {
        self.delete(path);
        for (ordinal, text) in chunks {
            self.documents.push(text.clone());
            self.metadata.push(ChunkMetadata {
                path: path.to_string(),
                ordinal: *ordinal,
            });
        }
        self.rebuild_stats();
    }

    /// Removes all entries belonging to `path`.
    pub fn delete(&mut self, path: &str) {
        let keep: Vec<usize> = self
            .metadata
            .iter()
            .enumerate()
            .filter(|(_, m)| m.path != path)
            .map(|(i, _)| i)
            .collect();
        if keep.len() == self.documents.len() {
            return;
        }
        self.documents = keep.iter().map(|&i| self.documents[i].clone()).collect();
        self.metadata = keep.iter().map(|&i| self.metadata[i].clone()).collect();
        self.rebuild_stats();
    }

    /// The multiset of `(path, ordinal)` pairs currently indexed, for
    /// invariant checks against the catalog.
    pub fn indexed_pairs(&self) -> Vec<(String, usize)> {
        self.metadata
            .iter()
            .map(|m| (m.path.clone(), m.ordinal))
            .collect()
    }

    fn rebuild_stats(&mut self) {
        self.doc_term_freqs.clear();
        self.doc_freq.clear();
        self.doc_lengths.clear();

        for doc in &self.documents {
            let tokens = tokenize(doc);
            self.doc_lengths.push(tokens.len());

            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            self.doc_term_freqs.push(freqs);
        }

        let total: usize = self.doc_lengths.iter().sum();
        self.avg_doc_length = if self.doc_lengths.is_empty() {
            0.0
        } else {
            total as f64 / self.doc_lengths.len() as f64
        };
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.documents.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score(&self, doc_idx: usize, query_terms: &[String]) -> f64 {
        let Some(freqs) = self.doc_term_freqs.get(doc_idx) else {
            return 0.0;
        };
        let doc_len = self.doc_lengths.get(doc_idx).copied().unwrap_or(0) as f64;
        let mut score = 0.0;
        for term in query_terms {
            let Some(&tf) = freqs.get(term) else {
                continue;
            };
            let tf = tf as f64;
            let idf = self.idf(term);
            let denom = tf + K1 * (1.0 - B + B * doc_len / self.avg_doc_length.max(1.0));
            score += idf * (tf * (K1 + 1.0)) / denom.max(f64::EPSILON);
        }
        score
    }

    /// Returns the top-`k` `(score, doc_index)` pairs with strictly positive
    /// scores, scores normalised into `[0, 1]` by dividing by the maximum
    /// score in the result set.
    pub fn query(&self, text: &str, k: usize) -> Vec<(f64, usize)> {
        if self.documents.is_empty() {
            return Vec::new();
        }
        let query_terms = tokenize(text);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f64, usize)> = (0..self.documents.len())
            .map(|i| (self.score(i, &query_terms), i))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        let max_score = scored.first().map(|(s, _)| *s).unwrap_or(0.0);
        if max_score > 0.0 {
            for (score, _) in &mut scored {
                *score /= max_score;
            }
        }
        scored
    }

    pub fn document(&self, idx: usize) -> Option<&str> {
        self.documents.get(idx).map(String::as_str)
    }

    pub fn metadata(&self, idx: usize) -> Option<&ChunkMetadata> {
        self.metadata.get(idx)
    }

    /// Atomically rewrites the on-disk snapshot: serialize to a temp file in
    /// the same directory, then rename over the target so readers never see
    /// a partially-written file.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let tmp = dir.join(format!(
            ".{}.tmp",
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("bm25.snapshot")
        ));
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads the snapshot at `path`. A missing file yields an empty index; a
    /// corrupt file also yields an empty index (logged) rather than failing
    /// startup, per the snapshot's rebuild-on-corruption contract.
    pub fn load(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => match bincode::deserialize::<Self>(&bytes) {
                Ok(mut index) => {
                    index.rebuild_stats();
                    index
                }
                Err(err) => {
                    tracing::warn!(error = %err, path = %path.display(), "bm25 snapshot corrupt, rebuilding empty");
                    Self::new()
                }
            },
            Err(_) => Self::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bm25Index {
        let mut idx = Bm25Index::new();
        idx.add_chunks(
            "/a/mergesort.py",
            &[
                (0, "def merge sort algorithm implementation".to_string()),
                (1, "recursive divide and conquer sort".to_string()),
            ],
        );
        idx.add_chunks(
            "/a/notes.txt",
            &[(0, "shopping list milk eggs bread".to_string())],
        );
        idx
    }

    #[test]
    fn query_returns_positive_scores_only() {
        let idx = sample();
        let results = idx.query("merge sort", 5);
        assert!(!results.is_empty());
        assert!(results.iter().all(|(score, _)| *score > 0.0));
    }

    #[test]
    fn scores_are_normalised_to_unit_max() {
        let idx = sample();
        let results = idx.query("sort", 5);
        let max = results.iter().map(|(s, _)| *s).fold(0.0_f64, f64::max);
        assert!((max - 1.0).abs() < 1e-9 || results.is_empty());
    }

    #[test]
    fn add_chunks_evicts_prior_entries_for_path() {
        let mut idx = sample();
        idx.add_chunks("/a/mergesort.py", &[(0, "totally different content".to_string())]);
        let pairs = idx.indexed_pairs();
        let count_for_path = pairs.iter().filter(|(p, _)| p == "/a/mergesort.py").count();
        assert_eq!(count_for_path, 1);
    }

    #[test]
    fn delete_removes_all_entries_for_path() {
        let mut idx = sample();
        idx.delete("/a/mergesort.py");
        assert!(idx.indexed_pairs().iter().all(|(p, _)| p != "/a/mergesort.py"));
    }

    #[test]
    fn unrelated_query_returns_nothing() {
        let idx = sample();
        assert!(idx.query("zzzznonexistentterm", 5).is_empty());
    }

    #[test]
    fn persist_and_load_round_trips() {
        let idx = sample();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bm25.snapshot");
        idx.persist(&path).expect("persist");

        let loaded = Bm25Index::load(&path);
        assert_eq!(loaded.len(), idx.len());
        assert_eq!(loaded.query("merge sort", 5).len(), idx.query("merge sort", 5).len());
    }

    #[test]
    fn corrupt_snapshot_rebuilds_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bm25.snapshot");
        std::fs::write(&path, b"not a valid snapshot").expect("write garbage");

        let loaded = Bm25Index::load(&path);
        assert!(loaded.is_empty());
    }
}
