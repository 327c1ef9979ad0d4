//! Recursive initial scan plus real-time filesystem watching (C10).

pub mod scan;
pub mod watch;

pub use scan::{scan_directory, ScanStats};
pub use watch::{start_watching, WatcherHandle};
