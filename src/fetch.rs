//! Component E: the fetch engine. For one metric name, resolves to a
//! file, picks an archive tier, reads the window, overlays the hot
//! cache, and returns a canonical [`PointVector`] (§4.E).

use crate::archive::ArchiveFile;
use crate::error::{ArchiveError, FetchError};
use crate::glob::GlobExpander;
use crate::hotcache::HotCache;
use crate::index::Snapshot;
use crate::metrics::{Counter, Metrics};
use crate::security::{self, SecurityError};
use crate::types::{metric_to_wsp_path, PointVector};
use std::path::Path;
use std::time::Instant;

/// Opens an [`ArchiveFile`] for a resolved filesystem path. Kept as a
/// trait, not a direct call to [`crate::archive::WhisperFile::open`], so
/// the fetch engine can be driven in tests against a stub archive
/// without touching disk.
pub trait ArchiveOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveFile>, ArchiveError>;
}

/// The opener this binary actually ships: a real whisper file on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhisperOpener;

impl ArchiveOpener for WhisperOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveFile>, ArchiveError> {
        crate::archive::WhisperFile::open(path).map(|f| Box::new(f) as Box<dyn ArchiveFile>)
    }
}

impl From<SecurityError> for FetchError {
    fn from(e: SecurityError) -> Self {
        FetchError::BadRequest(e.to_string())
    }
}

/// Ties together an archive opener and a hot cache to serve fetches
/// rooted at one data directory (§4.E, §4.H, §4.I).
pub struct FetchEngine<'a> {
    data_root: &'a Path,
    opener: &'a dyn ArchiveOpener,
    hot_cache: &'a dyn HotCache,
    metrics: &'a Metrics,
}

impl<'a> FetchEngine<'a> {
    #[must_use]
    pub fn new(
        data_root: &'a Path,
        opener: &'a dyn ArchiveOpener,
        hot_cache: &'a dyn HotCache,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            data_root,
            opener,
            hot_cache,
            metrics,
        }
    }

    /// Fetches one metric's window, merging disk and hot-cache samples
    /// (§4.E steps 1-7).
    pub fn fetch(&self, metric_name: &str, from_ts: i64, until_ts: i64, now: i64) -> Result<PointVector, FetchError> {
        let relative = metric_to_wsp_path(metric_name);
        let path = security::validate_metric_path(self.data_root, &relative)?;

        self.metrics.incr(Counter::disk_requests);
        let disk_start = Instant::now();
        let mut archive = self.opener.open(&path).map_err(|e| {
            self.metrics.incr(Counter::notfound);
            FetchError::from(e)
        })?;

        let retentions = archive.retentions();
        if retentions.is_empty() {
            self.metrics.incr(Counter::render_errors);
            return Err(FetchError::CorruptMetadata {
                metric: metric_name.to_string(),
                reason: "archive has no retentions".into(),
            });
        }
        let best_step = retentions[0].seconds_per_point;

        let diff = now - from_ts;
        let selected = retentions
            .iter()
            .enumerate()
            .find(|(_, r)| i64::from(r.max_retention) >= diff);

        let selected_index = match selected {
            Some((idx, _)) => idx,
            None => {
                let coarsest = retentions.last().expect("checked non-empty above");
                if now - i64::from(coarsest.max_retention) > until_ts {
                    self.metrics.incr(Counter::render_errors);
                    return Err(FetchError::NoArchiveCoversWindow {
                        metric: metric_name.to_string(),
                    });
                }
                retentions.len() - 1
            }
        };
        let selected_step = retentions[selected_index].seconds_per_point;

        let consult_hot_cache = selected_step == best_step;

        let series = archive.fetch(selected_index, from_ts, until_ts).map_err(|e| {
            self.metrics.incr(Counter::render_errors);
            FetchError::from(e)
        })?;
        self.metrics.add(Counter::disk_wait_time_ns, disk_start.elapsed().as_nanos() as u64);

        let mut point_vector = PointVector::from_series(metric_name.to_string(), &series);

        if consult_hot_cache {
            self.metrics.incr(Counter::cache_requests);
            let cache_start = Instant::now();
            let samples = self.hot_cache.get(metric_name);
            self.metrics
                .add(Counter::cache_wait_time_fetch_ns, cache_start.elapsed().as_nanos() as u64);
            point_vector.overlay_hot_cache(&samples);
        }

        self.metrics.add(Counter::points_returned, point_vector.values.len() as u64);
        Ok(point_vector)
    }

    /// Expands `target` as a glob (§4.B), drops non-leaf matches, fetches
    /// every remaining leaf, and collects only the successes -- per-metric
    /// errors do not fail the batch (§4.E "multi-metric fetch").
    pub fn fetch_many(
        &self,
        target: &str,
        from_ts: i64,
        until_ts: i64,
        now: i64,
        snapshot: Option<&Snapshot>,
        max_globs: usize,
    ) -> Vec<PointVector> {
        let expander = GlobExpander::new(self.data_root, max_globs);
        let matches = expander.expand(target, snapshot);

        matches
            .into_iter()
            .filter(|m| m.is_leaf)
            .filter_map(|m| self.fetch(&m.path, from_ts, until_ts, now).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;
    use crate::hotcache::{EmptyHotCache, InMemoryHotCache};
    use crate::metrics::CounterMode;
    use crate::types::{ArchiveMetadata, PointSeries, Retention};
    use std::sync::Mutex;

    /// A stub archive that returns a fixed series regardless of the
    /// requested window, so tests can exercise the fetch engine's
    /// archive-selection and overlay logic without real files.
    struct StubArchive {
        metadata: ArchiveMetadata,
        series_by_index: Vec<PointSeries>,
    }

    impl ArchiveFile for StubArchive {
        fn metadata(&self) -> &ArchiveMetadata {
            &self.metadata
        }

        fn fetch(&mut self, archive_index: usize, _from: i64, _until: i64) -> Result<PointSeries, ArchiveError> {
            self.series_by_index
                .get(archive_index)
                .cloned()
                .ok_or_else(|| ArchiveError::CorruptMetadata("no such archive".into()))
        }
    }

    struct StubOpener {
        result: Mutex<Option<Result<StubArchive, ArchiveError>>>,
    }

    impl ArchiveOpener for StubOpener {
        fn open(&self, _path: &Path) -> Result<Box<dyn ArchiveFile>, ArchiveError> {
            let taken = self.result.lock().unwrap().take().expect("stub opener called more than once");
            taken.map(|a| Box::new(a) as Box<dyn ArchiveFile>)
        }
    }

    fn two_tier_archive() -> StubArchive {
        StubArchive {
            metadata: ArchiveMetadata {
                retentions: vec![
                    Retention::new(10, 3600, 360),
                    Retention::new(60, 86400, 1440),
                ],
                aggregation_method: 1,
                max_retention: 86400,
                x_files_factor: 0.5,
            },
            series_by_index: vec![
                PointSeries {
                    from_time: 999_000,
                    until_time: 999_900,
                    step: 10,
                    values: vec![1.0; 90],
                },
                PointSeries {
                    from_time: 960,
                    until_time: 1140,
                    step: 60,
                    values: vec![1.0, 2.0, f64::NAN],
                },
            ],
        }
    }

    #[test]
    fn selects_finest_archive_within_window() {
        let opener = StubOpener {
            result: Mutex::new(Some(Ok(two_tier_archive()))),
        };
        let hot_cache = EmptyHotCache;
        let metrics = Metrics::new(5, CounterMode::Cumulative);
        let engine = FetchEngine::new(Path::new("/data"), &opener, &hot_cache, &metrics);

        let result = engine.fetch("servers.web1.cpu", 999_000, 999_900, 1_000_000).unwrap();
        assert_eq!(result.step_time, 10);
        assert_eq!(result.values.len(), 90);
    }

    #[test]
    fn falls_back_to_coarser_archive_for_older_window() {
        let opener = StubOpener {
            result: Mutex::new(Some(Ok(two_tier_archive()))),
        };
        let hot_cache = InMemoryHotCache::new();
        hot_cache.put("servers.web1.cpu", vec![(1021, 9.0)]);
        let metrics = Metrics::new(5, CounterMode::Cumulative);
        let engine = FetchEngine::new(Path::new("/data"), &opener, &hot_cache, &metrics);

        // diff = 90_000 - 5_000 = 85_000s: exceeds the 10s tier's 3600s
        // retention but fits the 60s tier's 86400s retention.
        let result = engine.fetch("servers.web1.cpu", 5_000, 60_000, 90_000).unwrap();
        assert_eq!(result.step_time, 60);
    }

    #[test]
    fn hot_cache_is_only_consulted_at_the_best_step() {
        // Coarser archive selected (60s tier is not the best step, 10s is).
        let opener = StubOpener {
            result: Mutex::new(Some(Ok(two_tier_archive()))),
        };
        let hot_cache = InMemoryHotCache::new();
        hot_cache.put("servers.web1.cpu", vec![(1021, 9.0)]);
        let metrics = Metrics::new(5, CounterMode::Cumulative);
        let engine = FetchEngine::new(Path::new("/data"), &opener, &hot_cache, &metrics);

        let result = engine.fetch("servers.web1.cpu", 5_000, 60_000, 90_000).unwrap();
        // The 60s tier's own NaN gap survives untouched since hot cache
        // was not consulted (coarser than best_step).
        assert_eq!(result.values, vec![1.0, 2.0, 0.0]);
        assert_eq!(result.is_absent, vec![false, false, true]);
    }

    #[test]
    fn missing_file_increments_notfound_and_maps_to_not_found_error() {
        let opener = StubOpener {
            result: Mutex::new(Some(Err(ArchiveError::NotFound("servers/web1/cpu.wsp".into())))),
        };
        let hot_cache = EmptyHotCache;
        let metrics = Metrics::new(5, CounterMode::Cumulative);
        let engine = FetchEngine::new(Path::new("/data"), &opener, &hot_cache, &metrics);

        let err = engine.fetch("servers.web1.cpu", 0, 100, 1000).unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
        let snap = metrics.snapshot();
        let notfound = snap.iter().find(|(n, _)| *n == "notfound").unwrap().1;
        assert_eq!(notfound, 1);
    }

    #[test]
    fn path_traversal_is_rejected_before_any_open() {
        let opener = StubOpener { result: Mutex::new(None) };
        let hot_cache = EmptyHotCache;
        let metrics = Metrics::new(5, CounterMode::Cumulative);
        let engine = FetchEngine::new(Path::new("/data"), &opener, &hot_cache, &metrics);

        let err = engine.fetch("../../etc.passwd", 0, 100, 1000).unwrap_err();
        assert!(matches!(err, FetchError::BadRequest(_)));
    }

    #[test]
    fn empty_retentions_is_corrupt_metadata() {
        let archive = StubArchive {
            metadata: ArchiveMetadata {
                retentions: vec![],
                aggregation_method: 1,
                max_retention: 0,
                x_files_factor: 0.5,
            },
            series_by_index: vec![],
        };
        let opener = StubOpener {
            result: Mutex::new(Some(Ok(archive))),
        };
        let hot_cache = EmptyHotCache;
        let metrics = Metrics::new(5, CounterMode::Cumulative);
        let engine = FetchEngine::new(Path::new("/data"), &opener, &hot_cache, &metrics);

        let err = engine.fetch("servers.web1.cpu", 0, 100, 1000).unwrap_err();
        assert!(matches!(err, FetchError::CorruptMetadata { .. }));
    }
}
