//! Control loop: drains the queue through a publisher, one item at a time.
//!
//! The runner is the single owner of the queue — candidate paths from the
//! watcher arrive over a channel and become `add` calls here, so all queue
//! mutations happen on one task without interleaving.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tracing::{debug, info};

use crate::error::Result;
use crate::queue::UploadQueue;

/// The remote side of an upload attempt. Implementations perform the
/// two-phase publish and report a plain outcome; all retry and backoff
/// decisions stay in the queue.
pub trait Publisher {
    /// Cheap reachability probe, run before each drain so an offline
    /// window skips the cycle instead of consuming a retry slot.
    fn check_connection(&self) -> impl Future<Output = Result<()>> + Send;

    /// Attempt the full publish of one item.
    fn publish(&self, subject: &Path, annotation: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Configuration for the control loop.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Fallback drain cadence when no new file arrives.
    pub poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// The poll loop. At most one upload is in flight at a time.
pub struct Runner {
    config: RunnerConfig,
    shutdown: Arc<Notify>,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle for signalling graceful shutdown from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Run until shutdown: enqueue candidates from the watcher channel and
    /// drain the queue on every poll tick. An in-flight attempt always
    /// finishes before shutdown is honored.
    pub async fn run<P: Publisher>(
        &self,
        mut queue: UploadQueue,
        publisher: &P,
        mut candidates: mpsc::Receiver<PathBuf>,
    ) {
        info!("control loop started");

        let stats = queue.stats();
        if stats.total > 0 {
            info!(
                "queue has {} pending items ({} new, {} retrying)",
                stats.total, stats.never_attempted, stats.retrying
            );
        }

        let mut watcher_alive = true;
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    break;
                }
                candidate = candidates.recv(), if watcher_alive => {
                    match candidate {
                        Some(path) => {
                            queue.add(path.to_string_lossy(), "");
                        }
                        // Watcher gone; keep draining on the poll tick.
                        None => watcher_alive = false,
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.process_next(&mut queue, publisher).await;
                }
            }
        }

        let stats = queue.stats();
        if stats.total > 0 {
            info!("stopped with {} items still in queue", stats.total);
        } else {
            info!("stopped with an empty queue");
        }
    }

    /// One drain cycle: connectivity pre-check, then attempt the next
    /// eligible item and record the outcome.
    pub async fn process_next<P: Publisher>(&self, queue: &mut UploadQueue, publisher: &P) {
        if queue.is_empty() {
            return;
        }

        if let Err(e) = publisher.check_connection().await {
            debug!("no connection, skipping queue processing: {e}");
            return;
        }

        let Some(item) = queue.get_next() else {
            // Everything is inside its backoff window.
            return;
        };

        info!(
            "processing upload from queue: {} (attempt {})",
            item.subject,
            item.retry_count + 1
        );

        match publisher
            .publish(Path::new(&item.subject), &item.annotation)
            .await
        {
            Ok(()) => {
                queue.mark_success(item.id);
                info!("successfully uploaded from queue: {}", item.subject);
            }
            Err(e) => {
                queue.mark_failure(item.id, &e.to_string());
                let stats = queue.stats();
                info!(
                    "queue status: {} items ({} pending, {} retrying)",
                    stats.total, stats.never_attempted, stats.retrying
                );
            }
        }
    }
}
