//! Real-time file watching (C10, watcher half). Emits create/modify/delete
//! per path, debounced to coalesce partial writes, serialised per path by a
//! paths-in-flight set so two overlapping notifications collapse into one
//! run against the latest content.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::error::{AppError, Result};
use common::vector_index::VectorIndex;
use ingestion_pipeline::{ingest_file, remove_path, IngestionContext};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Holds the underlying OS watcher alive; dropping it stops notifications.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
}

/// Starts watching `roots` recursively. Spawns a dedicated debounce thread
/// that dispatches settled events into the ingestion pipeline on
/// `runtime_handle`.
pub fn start_watching(
    ctx: Arc<IngestionContext>,
    vector_index: Arc<VectorIndex>,
    roots: Vec<PathBuf>,
    runtime_handle: tokio::runtime::Handle,
) -> Result<WatcherHandle> {
    let (tx, rx) = mpsc::channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )
    .map_err(|err| AppError::StorageError(format!("creating file watcher: {err}")))?;

    for root in &roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| AppError::StorageError(format!("watching {}: {err}", root.display())))?;
        tracing::info!(target: "engine::watcher", root = %root.display(), "watching");
    }

    std::thread::spawn(move || debounce_loop(rx, ctx, vector_index, runtime_handle));

    Ok(WatcherHandle { _watcher: watcher })
}

fn debounce_loop(
    rx: mpsc::Receiver<Event>,
    ctx: Arc<IngestionContext>,
    vector_index: Arc<VectorIndex>,
    runtime_handle: tokio::runtime::Handle,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let in_flight: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));

    loop {
        match rx.recv_timeout(DEBOUNCE) {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    let now = Instant::now();
                    for path in event.paths {
                        pending.insert(path, now);
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if pending.is_empty() {
                    continue;
                }
                let cutoff = Instant::now() - DEBOUNCE;
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, t)| **t <= cutoff)
                    .map(|(p, _)| p.clone())
                    .collect();
                if ready.is_empty() {
                    continue;
                }
                for path in &ready {
                    pending.remove(path);
                }

                for path in ready {
                    if crate::scan::is_ignored_path(&path) {
                        continue;
                    }

                    let mut guard = in_flight.lock().unwrap_or_else(|p| p.into_inner());
                    if guard.contains(&path) {
                        // Currently being processed; retry after this run finishes
                        // rather than dropping the event.
                        pending.insert(path, Instant::now());
                        continue;
                    }
                    guard.insert(path.clone());
                    drop(guard);

                    let ctx = Arc::clone(&ctx);
                    let vector_index = Arc::clone(&vector_index);
                    let in_flight = Arc::clone(&in_flight);
                    runtime_handle.spawn(async move {
                        process_one(&ctx, &vector_index, &path).await;
                        in_flight
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .remove(&path);
                    });
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

async fn process_one(ctx: &IngestionContext, vector_index: &VectorIndex, path: &PathBuf) {
    let path_str = path.to_string_lossy().to_string();

    if !path.exists() {
        if let Err(err) = remove_path(ctx, vector_index, &path_str).await {
            tracing::warn!(target: "engine::watcher", path = %path_str, error = %err, "removing deleted path failed");
        }
        return;
    }

    if let Err(err) = ingest_file(ctx, path).await {
        tracing::warn!(target: "engine::watcher", path = %path_str, error = %err, "ingesting changed path failed");
    }
}
