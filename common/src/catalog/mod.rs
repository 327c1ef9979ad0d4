mod store;
pub mod types;

pub use store::CatalogStore;
pub use types::{hash_text, CatalogStats, FileEntry, ProcessingStatus, PENDING_SUMMARY_SENTINEL};
