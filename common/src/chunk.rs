//! Recursive-separator text chunker (C3).
//!
//! Splits a file's text into overlapping windows, trying separators in
//! priority order so breaks land on paragraph, then line, then sentence,
//! then word boundaries before falling back to a hard character split.

pub const TARGET_WINDOW: usize = 600;
pub const OVERLAP: usize = 100;

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub ordinal: usize,
    pub text: String,
}

/// Splits `text` into a finite, ordered, non-empty sequence of chunks with a
/// target window of [`TARGET_WINDOW`] characters and [`OVERLAP`] characters
/// of overlap between neighbours. Deterministic for a given input.
pub fn chunk_text(text: &str) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let pieces = split_into_pieces(text, 0);
    let merged = merge_pieces(&pieces, TARGET_WINDOW, OVERLAP);

    merged
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| Chunk { ordinal, text })
        .collect()
}

/// Recursively splits `text` into pieces no larger than [`TARGET_WINDOW`],
/// trying [`SEPARATORS`] starting at `level`. Each returned piece retains its
/// trailing separator (so re-joining pieces reproduces the input exactly).
fn split_into_pieces(text: &str, level: usize) -> Vec<String> {
    if text.chars().count() <= TARGET_WINDOW {
        return vec![text.to_string()];
    }

    let Some(sep) = SEPARATORS.get(level) else {
        return hard_split(text, TARGET_WINDOW);
    };

    if sep.is_empty() {
        return hard_split(text, TARGET_WINDOW);
    }

    let fragments = split_keep_separator(text, sep);
    if fragments.len() <= 1 {
        // This separator does not occur in the text; try the next one.
        return split_into_pieces(text, level + 1);
    }

    let mut pieces = Vec::new();
    for fragment in fragments {
        if fragment.is_empty() {
            continue;
        }
        if fragment.chars().count() > TARGET_WINDOW {
            pieces.extend(split_into_pieces(&fragment, level + 1));
        } else {
            pieces.push(fragment);
        }
    }
    pieces
}

/// Splits `text` on `sep`, keeping `sep` attached to the end of each
/// fragment except the trailing fragment (so the fragments concatenate back
/// to `text` exactly).
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find(sep) {
        let end = idx + sep.len();
        fragments.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        fragments.push(rest.to_string());
    }
    fragments
}

/// Last-resort split on character boundaries when no separator applies.
fn hard_split(text: &str, window: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(window.max(1))
        .map(|c| c.iter().collect())
        .collect()
}

/// Greedily merges atomic pieces into windows of roughly [`TARGET_WINDOW`]
/// characters, carrying the trailing pieces of each window (up to `overlap`
/// characters' worth) into the start of the next window so neighbouring
/// chunks overlap on whole-piece boundaries.
fn merge_pieces(pieces: &[String], target: usize, overlap: usize) -> Vec<String> {
    if pieces.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&String> = Vec::new();
    let mut current_len = 0usize;
    let mut idx = 0usize;

    while idx < pieces.len() {
        let piece = &pieces[idx];
        let piece_len = piece.chars().count();

        if !current.is_empty() && current_len + piece_len > target {
            chunks.push(current.iter().map(|s| s.as_str()).collect::<String>());

            // Carry trailing pieces worth up to `overlap` characters into the
            // next window.
            let mut carry: Vec<&String> = Vec::new();
            let mut carry_len = 0usize;
            for carried in current.iter().rev() {
                let len = carried.chars().count();
                if carry_len + len > overlap && !carry.is_empty() {
                    break;
                }
                carry.push(carried);
                carry_len += len;
            }
            carry.reverse();
            current = carry;
            current_len = carry_len;
            continue;
        }

        current.push(piece);
        current_len += piece_len;
        idx += 1;
    }

    if !current.is_empty() {
        chunks.push(current.iter().map(|s| s.as_str()).collect::<String>());
    }

    // A single oversized piece with no separator boundary can still end up
    // alone in a window; that is acceptable, chunks are never empty and the
    // sequence stays finite.
    chunks.retain(|c| !c.is_empty());
    if chunks.is_empty() {
        chunks.push(pieces.iter().map(|s| s.as_str()).collect::<String>());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].ordinal, 0);
    }

    #[test]
    fn chunks_are_never_empty() {
        let text = "para one.\n\npara two.\n\npara three.".repeat(100);
        let chunks = chunk_text(&text);
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
    }

    #[test]
    fn ordinals_are_contiguous() {
        let text = "word ".repeat(500);
        let chunks = chunk_text(&text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
        }
    }

    #[test]
    fn deterministic_for_same_input() {
        let text = "Some longer text.\nWith several lines.\n\nAnd paragraphs too.".repeat(50);
        let a = chunk_text(&text);
        let b = chunk_text(&text);
        assert_eq!(a, b);
    }

    #[test]
    fn large_paragraph_text_splits_into_multiple_windows() {
        let paragraph = "lorem ipsum dolor sit amet ".repeat(40);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");
        let chunks = chunk_text(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= TARGET_WINDOW * 2));
    }
}
