//! Component D: walking the data root and publishing fresh snapshots.
//!
//! Every cycle builds a brand new [`Snapshot`] from scratch and swaps it in
//! atomically; there is no incremental update path; readers always see
//! either the previous complete snapshot or the next one, never a partial
//! one. The walk (I/O bound) runs on a blocking thread; trigram
//! construction (CPU bound) fans out across rayon's global pool.

use super::snapshot::{PathId, Snapshot};
use super::trigram::TrigramBuilder;
use arc_swap::ArcSwapOption;
use ignore::WalkBuilder;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Shared handle readers use to fetch the latest published snapshot.
/// Cloning is cheap; every clone observes the same published pointer.
#[derive(Clone)]
pub struct IndexHandle {
    published: Arc<ArcSwapOption<Snapshot>>,
}

impl IndexHandle {
    /// Returns the most recently published snapshot, or `None` before the
    /// first build completes.
    #[must_use]
    pub fn load(&self) -> Option<Arc<Snapshot>> {
        self.published.load_full()
    }
}

/// Drives the periodic walk-and-publish cycle.
pub struct Builder {
    data_root: PathBuf,
    published: Arc<ArcSwapOption<Snapshot>>,
}

impl Builder {
    /// Creates a builder rooted at `data_root`, returning it alongside the
    /// reader-facing handle that shares its published pointer.
    #[must_use]
    pub fn new(data_root: PathBuf) -> (Self, IndexHandle) {
        let published = Arc::new(ArcSwapOption::empty());
        let handle = IndexHandle {
            published: Arc::clone(&published),
        };
        (Self { data_root, published }, handle)
    }

    /// Walks `data_root` once and returns the resulting snapshot without
    /// publishing it. Exposed for tests and for the one-shot `index`
    /// subcommand.
    #[must_use]
    pub fn build_once(&self) -> Snapshot {
        build_snapshot(&self.data_root)
    }

    /// Runs the build-and-publish loop: an immediate first build, then one
    /// every `scan_frequency`, until `shutdown` reports `true`. Builds never
    /// overlap — a slow build simply delays the next tick rather than
    /// stacking up.
    pub async fn run(self, scan_frequency: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(scan_frequency);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let root = self.data_root.clone();
            let started = std::time::Instant::now();
            let snapshot = match tokio::task::spawn_blocking(move || build_snapshot(&root)).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(error = %e, "index build task panicked; keeping previous snapshot");
                    continue_or_shutdown(&mut ticker, &mut shutdown).await;
                    if *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            };
            info!(
                paths = snapshot.len(),
                metrics = snapshot.known_metric_count,
                elapsed_ms = started.elapsed().as_millis(),
                "index snapshot built"
            );
            self.published.store(Some(Arc::new(snapshot)));

            continue_or_shutdown(&mut ticker, &mut shutdown).await;
            if *shutdown.borrow() {
                return;
            }
        }
    }
}

async fn continue_or_shutdown(ticker: &mut tokio::time::Interval, shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = ticker.tick() => {}
        _ = shutdown.changed() => {}
    }
}

/// Walks `root` and builds a complete snapshot: every directory and every
/// `.wsp` leaf becomes a path, with a trigram posting list built in
/// parallel and pruned of overly common entries.
fn build_snapshot(root: &Path) -> Snapshot {
    let paths = walk_paths(root);
    let total = paths.len() as u64;
    let known_metric_count = paths.iter().filter(|p| p.ends_with(".wsp")).count() as u64;
    let trigrams = build_trigrams(&paths, total);

    debug!(paths = paths.len(), trigrams = trigrams.len(), "built index snapshot");

    Snapshot {
        paths,
        trigrams,
        known_metric_count,
    }
}

/// Collects every directory and `.wsp` file under `root`, gitignore-aware,
/// as leading-slash paths relative to `root`.
fn walk_paths(root: &Path) -> Vec<String> {
    let mut paths = Vec::new();
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build();

    for entry in walker.filter_map(Result::ok) {
        let path = entry.path();
        if path == root {
            continue;
        }
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
        let is_wsp = path.extension().and_then(|e| e.to_str()) == Some("wsp");
        if !is_dir && !is_wsp {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let mut relative = String::from("/");
        relative.push_str(&rel.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"));
        paths.push(relative);
    }

    paths
}

/// Builds and prunes the trigram posting lists for `paths`, assigning each
/// its index position as its [`PathId`]. Work is sharded across rayon's
/// global pool; shards are merged with `TrigramBuilder::merge`.
fn build_trigrams(paths: &[String], total: u64) -> ahash::AHashMap<crate::trigram::Trigram, roaring::RoaringBitmap> {
    let builder = paths
        .par_iter()
        .enumerate()
        .fold(TrigramBuilder::new, |mut acc, (id, path)| {
            acc.add_path(id as PathId, path);
            acc
        })
        .reduce(TrigramBuilder::new, |mut a, b| {
            a.merge(b);
            a
        });
    builder.prune(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("servers/web1")).unwrap();
        fs::write(dir.path().join("servers/web1/cpu.wsp"), b"").unwrap();
        fs::write(dir.path().join("servers/web1/mem.wsp"), b"").unwrap();
        dir
    }

    #[test]
    fn walk_collects_dirs_and_leaves() {
        let dir = layout();
        let paths = walk_paths(dir.path());
        assert!(paths.contains(&"/servers".to_string()));
        assert!(paths.contains(&"/servers/web1".to_string()));
        assert!(paths.contains(&"/servers/web1/cpu.wsp".to_string()));
    }

    #[test]
    fn build_once_counts_metrics() {
        let dir = layout();
        let (builder, _handle) = Builder::new(dir.path().to_path_buf());
        let snapshot = builder.build_once();
        assert_eq!(snapshot.known_metric_count, 2);
    }

    #[test]
    fn handle_observes_published_snapshot() {
        let dir = layout();
        let (builder, handle) = Builder::new(dir.path().to_path_buf());
        assert!(handle.load().is_none());
        let snapshot = builder.build_once();
        builder.published.store(Some(Arc::new(snapshot)));
        assert!(handle.load().is_some());
    }

    #[tokio::test]
    async fn run_publishes_immediately_and_exits_promptly_on_shutdown() {
        let dir = layout();
        let (builder, handle) = Builder::new(dir.path().to_path_buf());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(builder.run(Duration::from_secs(3600), shutdown_rx));

        // The one-shot startup build publishes without waiting for the tick.
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.load().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("builder did not publish its first snapshot in time");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("builder did not exit promptly after shutdown")
            .unwrap();
    }
}
