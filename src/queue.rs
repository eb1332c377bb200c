//! Durable retry queue.
//!
//! Single source of truth for what work remains. The queue is an ordered
//! list of pending uploads mirrored to a JSON document on disk: every
//! mutation rewrites the full document (write-through, no batching), so a
//! crash never loses acknowledged work. Selection is backoff-gated — a
//! failed item becomes eligible again only after a fixed, bounded delay.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Process-local handle for a queue item.
///
/// Assigned from a sequence counter on `add` (and re-assigned in insertion
/// order on load), never persisted. Removal and failure marking go through
/// this handle, so two items with identical fields are never ambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ItemId(pub u64);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One unit of pending work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// In-memory handle, not part of the persisted document.
    #[serde(skip)]
    pub id: ItemId,

    /// Identifier of the resource to upload (a file path). Opaque here.
    pub subject: String,

    /// Caller-supplied caption, passed through to the publisher unchanged.
    #[serde(default)]
    pub annotation: String,

    /// Set once at creation, never mutated.
    pub enqueued_at: DateTime<Utc>,

    /// Number of failed attempts so far.
    pub retry_count: u32,

    /// None means never attempted.
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Most recent failure description.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl QueueItem {
    /// Is this item eligible for an attempt at `now`?
    fn eligible_at(&self, now: DateTime<Utc>) -> bool {
        match self.last_attempt_at {
            // Never attempted — always eligible.
            None => true,
            Some(last) => now.signed_duration_since(last) >= backoff_delay(self.retry_count),
        }
    }
}

/// Minimum elapsed time after a failed attempt before an item becomes
/// eligible again.
///
/// A fixed step table rather than a computed exponential, so the worst-case
/// wait is bounded at five minutes no matter how often an item has failed.
pub fn backoff_delay(retry_count: u32) -> TimeDelta {
    let secs = match retry_count {
        0 => 0,
        1 => 10,
        2 => 30,
        3 => 60,
        4 => 120,
        _ => 300,
    };
    TimeDelta::seconds(secs)
}

/// Read-only aggregate over the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub total: usize,
    pub never_attempted: usize,
    pub retrying: usize,
    pub max_retry_count: u32,
}

/// Persistent queue of files to upload. Owns the durable store exclusively;
/// all mutations go through [`add`](Self::add),
/// [`mark_success`](Self::mark_success) and
/// [`mark_failure`](Self::mark_failure).
pub struct UploadQueue {
    path: PathBuf,
    items: Vec<QueueItem>,
    next_id: u64,
}

impl UploadQueue {
    /// Hydrate the queue from the document at `path`.
    ///
    /// A missing store yields an empty queue. A present but unparsable store
    /// is treated as data loss: logged, dropped, and the service starts with
    /// an empty queue rather than refusing to come up.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut items = match fs::read_to_string(&path) {
            Ok(doc) => match serde_json::from_str::<Vec<QueueItem>>(&doc) {
                Ok(items) => {
                    info!("loaded {} items from queue {}", items.len(), path.display());
                    items
                }
                Err(e) => {
                    warn!("queue store {} is unparsable, starting empty: {e}", path.display());
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("failed to read queue store {}: {e}", path.display());
                Vec::new()
            }
        };

        // Handles are process-local; re-assign in insertion order.
        let mut next_id = 0;
        for item in &mut items {
            next_id += 1;
            item.id = ItemId(next_id);
        }

        Self {
            path,
            items,
            next_id,
        }
    }

    /// Append a new item and persist immediately. No uniqueness check —
    /// duplicate subjects are tracked as independent items.
    pub fn add(&mut self, subject: impl Into<String>, annotation: impl Into<String>) -> ItemId {
        self.next_id += 1;
        let id = ItemId(self.next_id);
        let subject = subject.into();

        self.items.push(QueueItem {
            id,
            subject: subject.clone(),
            annotation: annotation.into(),
            enqueued_at: Utc::now(),
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
        });
        self.save();
        info!("added to queue: {subject}");
        id
    }

    /// Next eligible item, scanning in insertion order — the earliest
    /// enqueued eligible item wins. Read-only: repeated calls without an
    /// outcome return the same item.
    pub fn get_next(&self) -> Option<QueueItem> {
        self.get_next_at(Utc::now())
    }

    /// [`get_next`](Self::get_next) against an injected clock.
    pub fn get_next_at(&self, now: DateTime<Utc>) -> Option<QueueItem> {
        self.items.iter().find(|item| item.eligible_at(now)).cloned()
    }

    /// Remove a successfully uploaded item and persist the removal.
    /// Unknown ids are a logged no-op, never an error.
    pub fn mark_success(&mut self, id: ItemId) {
        match self.items.iter().position(|item| item.id == id) {
            Some(idx) => {
                let item = self.items.remove(idx);
                self.save();
                info!("removed from queue (success): {}", item.subject);
            }
            None => warn!("item {id} not found in queue"),
        }
    }

    /// Record a failed attempt: bump the retry count, stamp the attempt
    /// time, keep the error text, persist. Unknown ids are a logged no-op.
    pub fn mark_failure(&mut self, id: ItemId, error: &str) {
        self.mark_failure_at(id, error, Utc::now());
    }

    /// [`mark_failure`](Self::mark_failure) against an injected clock.
    pub fn mark_failure_at(&mut self, id: ItemId, error: &str, now: DateTime<Utc>) {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.retry_count += 1;
                item.last_attempt_at = Some(now);
                item.last_error = Some(error.to_string());
                warn!(
                    "upload failed (attempt {}): {} - {error}",
                    item.retry_count, item.subject
                );
                self.save();
            }
            None => warn!("item {id} not found in queue"),
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total: self.items.len(),
            never_attempted: self
                .items
                .iter()
                .filter(|i| i.last_attempt_at.is_none())
                .count(),
            retrying: self
                .items
                .iter()
                .filter(|i| i.last_attempt_at.is_some())
                .count(),
            max_retry_count: self.items.iter().map(|i| i.retry_count).max().unwrap_or(0),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Read-only view of the queue contents, insertion order.
    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn store_path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the full document. An unwritable store degrades durability
    /// but never the in-memory state; the next successful save reconciles.
    fn save(&self) {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warn!("failed to create queue store directory: {e}");
        }

        match serde_json::to_string_pretty(&self.items) {
            Ok(doc) => {
                if let Err(e) = fs::write(&self.path, doc) {
                    warn!("failed to save queue to {}: {e}", self.path.display());
                }
            }
            Err(e) => warn!("failed to serialize queue: {e}"),
        }
    }
}
