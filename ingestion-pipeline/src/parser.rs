//! Parser capability (C2): a single plain-text/source-code parser driven by
//! an extension allow-list. Strict UTF-8 decoding — invalid bytes are a
//! parse error, never best-effort repaired.

use std::path::Path;

use common::error::{AppError, Result};

/// Plain-text/code size ceiling (10 MiB).
pub const MAX_TEXT_BYTES: u64 = 10 * 1024 * 1024;
/// Document size ceiling (50 MiB) — reserved for a future document parser;
/// the shipped parser only ever produces the text-sized outcome, but the
/// ceiling is named here so a caller can classify an oversized non-text file
/// correctly once such a parser exists.
pub const MAX_DOCUMENT_BYTES: u64 = 50 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "log", "csv", "tsv", "json", "yaml", "yml", "toml", "ini",
    "cfg", "conf", "xml", "html", "htm", "css", "js", "mjs", "cjs", "ts", "tsx", "jsx", "py",
    "rs", "go", "java", "kt", "c", "h", "cc", "cpp", "hpp", "cs", "rb", "php", "sh", "bash",
    "zsh", "sql", "proto", "graphql", "gradle", "makefile", "dockerfile", "env",
];

/// The outcome of attempting to parse one file.
#[derive(Debug)]
pub enum ParseOutcome {
    Text(String),
    Unsupported,
    TooLarge,
}

/// Reads `path` and classifies it, applying the extension allow-list and
/// size ceiling before ever reading file bytes.
pub fn parse(path: &Path) -> Result<ParseOutcome> {
    if !accepts(path) {
        return Ok(ParseOutcome::Unsupported);
    }

    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Ok(ParseOutcome::Unsupported);
    }
    if metadata.len() == 0 {
        return Ok(ParseOutcome::Unsupported);
    }
    if metadata.len() > MAX_TEXT_BYTES {
        return Ok(ParseOutcome::TooLarge);
    }

    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(ParseOutcome::Text(text)),
        Err(err) => Err(AppError::Unsupported(format!(
            "{}: not valid UTF-8 ({err})",
            path.display()
        ))),
    }
}

/// Whether `path`'s extension (or, for extensionless well-known names like
/// `Makefile`/`Dockerfile`, its file name) is in the allow-list.
pub fn accepts(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        return ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str());
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => {
            let lower = name.to_ascii_lowercase();
            lower == "makefile" || lower == "dockerfile"
        }
        None => false,
    }
}
