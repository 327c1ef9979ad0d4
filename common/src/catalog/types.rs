use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Marker string standing in for an unavailable summary — never a value a
/// real summarization call would produce.
pub const PENDING_SUMMARY_SENTINEL: &str = "[Summary pending]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    PendingEmbedding,
    PendingSummary,
    Completed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingEmbedding => "pending_embedding",
            Self::PendingSummary => "pending_summary",
            Self::Completed => "completed",
        }
    }
}

/// One catalog row, keyed by absolute `path`. `content_blob` holds the
/// zstd-compressed file text; `hash` is the SHA-256 hex digest of the
/// *decompressed* text (invariant A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub hash: String,
    pub content_blob: Vec<u8>,
    pub summary: Option<String>,
    pub processing_status: ProcessingStatus,
    pub last_indexed: DateTime<Utc>,
    /// Source file mtime (unix seconds) observed at last index, used only as
    /// a scan-skip hint — never trusted in place of a hash comparison.
    pub last_mtime: Option<i64>,
}

impl FileEntry {
    /// `processing_status = completed` implies a non-empty, non-sentinel
    /// summary (invariant B).
    pub fn has_real_summary(&self) -> bool {
        matches!(&self.summary, Some(s) if !s.is_empty() && s != PENDING_SUMMARY_SENTINEL)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_files: usize,
    pub pending_embedding: usize,
    pub pending_summary: usize,
    pub completed: usize,
}

/// SHA-256 hex digest (64 lowercase hex chars) of `text`. All comparisons
/// against stored hashes are case-insensitive equality on this string.
pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compresses `text` losslessly; the result is byte-for-byte recoverable via
/// [`decompress`].
pub fn compress(text: &str) -> Vec<u8> {
    zstd::encode_all(text.as_bytes(), 0).unwrap_or_else(|_| text.as_bytes().to_vec())
}

/// Decompresses a blob produced by [`compress`]. Falls back to interpreting
/// the bytes as raw UTF-8 if they are not a valid zstd frame, so a blob
/// written before compression was enabled (or corrupted at the frame level)
/// still decodes rather than failing the whole read.
pub fn decompress(blob: &[u8]) -> String {
    match zstd::decode_all(blob) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::from_utf8_lossy(blob).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_round_trips_byte_for_byte() {
        let text = "hello\nworld\n".repeat(200);
        let blob = compress(&text);
        assert_eq!(decompress(&blob), text);
    }

    #[test]
    fn hash_is_64_lowercase_hex_chars() {
        let h = hash_text("anything");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_text("same input"), hash_text("same input"));
    }
}
