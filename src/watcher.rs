//! Source feed adapter: watches the folder and feeds new image paths to
//! the control loop.
//!
//! Files already present at startup are treated as handled and never
//! queued; the "known" set is passed in explicitly rather than kept as
//! module state. Each surviving candidate is sent exactly once, after a
//! settle delay so a partially written file is not read mid-copy.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::Result;

/// Extensions accepted for upload, matched case-insensitively.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Does this path carry an allowed image extension?
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Scan the watch folder for image files already present at startup.
pub fn scan_existing(dir: &Path) -> Result<HashSet<PathBuf>> {
    let mut existing = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_image(&path) {
            existing.insert(path);
        }
    }
    info!("found {} existing image files (will be skipped)", existing.len());
    Ok(existing)
}

/// Running folder watcher. Dropping it stops the underlying notify watcher.
pub struct FolderWatcher {
    _watcher: RecommendedWatcher,
}

impl FolderWatcher {
    /// Watch `dir` (non-recursive) and send each newly created image path
    /// to `out` once, after `settle_delay`. `known` seeds the seen set so
    /// startup files are never queued.
    pub fn spawn(
        dir: &Path,
        known: HashSet<PathBuf>,
        settle_delay: Duration,
        out: mpsc::Sender<PathBuf>,
    ) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>(64);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!("watching folder: {}", dir.display());

        tokio::spawn(relay_events(event_rx, known, settle_delay, out));

        Ok(Self { _watcher: watcher })
    }
}

/// Filter raw notify events down to first-seen image creations.
async fn relay_events(
    mut events: mpsc::Receiver<notify::Result<Event>>,
    mut seen: HashSet<PathBuf>,
    settle_delay: Duration,
    out: mpsc::Sender<PathBuf>,
) {
    while let Some(res) = events.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!("watch error: {e}");
                continue;
            }
        };

        if !matches!(event.kind, EventKind::Create(_)) {
            continue;
        }

        for path in event.paths {
            if !is_image(&path) || !seen.insert(path.clone()) {
                continue;
            }

            // Let the writer finish before the file is picked up.
            tokio::time::sleep(settle_delay).await;

            info!("new image detected: {}", path.display());
            if out.send(path).await.is_err() {
                return; // control loop gone
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        assert!(is_image(Path::new("/w/a.jpg")));
        assert!(is_image(Path::new("/w/a.JPEG")));
        assert!(is_image(Path::new("/w/a.WebP")));
        assert!(!is_image(Path::new("/w/a.txt")));
        assert!(!is_image(Path::new("/w/noext")));
        assert!(!is_image(Path::new("/w/a.jpg.part")));
    }

    #[test]
    fn scan_existing_picks_up_only_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("one.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("two.PNG"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let existing = scan_existing(dir.path()).unwrap();
        assert_eq!(existing.len(), 2);
        assert!(existing.contains(&dir.path().join("one.jpg")));
        assert!(existing.contains(&dir.path().join("two.PNG")));
    }
}
