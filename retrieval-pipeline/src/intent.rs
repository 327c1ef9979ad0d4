//! Intent classification for the `/ask` endpoint.
//!
//! Design note: replaces the original's exception-driven command router
//! with a tagged-variant `Intent` produced by a pure classifier and matched
//! by the caller's dispatcher, instead of a handler deciding control flow
//! through caught exceptions.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Search,
    Read,
    List,
    Move,
    Chat,
}

const MOVE_MARKERS: &[&str] = &["move ", "rename ", "delete ", "organize", "organise", "categorize", "categorise"];
const LIST_MARKERS: &[&str] = &["list files", "list folders", "show files", "what files", "which files"];
const READ_MARKERS: &[&str] = &["read ", "open ", "show me the content", "what does", "contents of"];
const SEARCH_MARKERS: &[&str] = &["find", "search", "where is", "look for", "locate"];

/// Heuristic single-primary-intent classifier. A request naming more than
/// one intent ("find X and summarise it") resolves to whichever marker set
/// is checked first below — true multi-intent handling is out of scope.
pub fn classify(query: &str) -> Intent {
    let lower = query.to_lowercase();
    if MOVE_MARKERS.iter().any(|m| lower.contains(m)) {
        Intent::Move
    } else if LIST_MARKERS.iter().any(|m| lower.contains(m)) {
        Intent::List
    } else if READ_MARKERS.iter().any(|m| lower.contains(m)) {
        Intent::Read
    } else if SEARCH_MARKERS.iter().any(|m| lower.contains(m)) {
        Intent::Search
    } else {
        Intent::Chat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_search_queries() {
        assert_eq!(classify("find my tax documents"), Intent::Search);
        assert_eq!(classify("where is the mergesort implementation"), Intent::Search);
    }

    #[test]
    fn classifies_read_queries() {
        assert_eq!(classify("read notes.txt"), Intent::Read);
        assert_eq!(classify("what does config.toml contain"), Intent::Read);
    }

    #[test]
    fn classifies_list_queries() {
        assert_eq!(classify("list files in the project folder"), Intent::List);
    }

    #[test]
    fn classifies_move_queries_as_out_of_scope_file_management() {
        assert_eq!(classify("move report.pdf to archive"), Intent::Move);
        assert_eq!(classify("delete the old draft"), Intent::Move);
    }

    #[test]
    fn falls_back_to_chat() {
        assert_eq!(classify("how are you today"), Intent::Chat);
    }
}
