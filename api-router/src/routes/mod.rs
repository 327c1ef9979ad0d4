pub mod add_folder;
pub mod ask;
pub mod ask_rag;
pub mod health;
pub mod liveness;
pub mod search;
pub mod stats;
pub mod watched_folders;
