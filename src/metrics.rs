//! Component G: the lock-free counter bank and bucketed latency
//! histogram (§4.G).
//!
//! Every counter is a plain `AtomicU64` mutated with relaxed fetch-add;
//! order among counters is never observed, only their individual
//! monotonic growth (§8's counter-monotonicity invariant, in cumulative
//! mode).

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Every counter name exposed verbatim at the metrics surface (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Counter {
    render_requests,
    render_errors,
    notfound,
    find_requests,
    find_errors,
    find_zero,
    list_requests,
    list_errors,
    cache_hit,
    cache_miss,
    cache_work_time_ns,
    cache_wait_time_fetch_ns,
    cache_requests,
    disk_wait_time_ns,
    disk_requests,
    points_returned,
    metrics_returned,
    metrics_found,
    fetch_size_bytes,
    metrics_known,
    index_build_time_ns,
    file_scan_time_ns,
}

impl Counter {
    const ALL: [Counter; 22] = [
        Counter::render_requests,
        Counter::render_errors,
        Counter::notfound,
        Counter::find_requests,
        Counter::find_errors,
        Counter::find_zero,
        Counter::list_requests,
        Counter::list_errors,
        Counter::cache_hit,
        Counter::cache_miss,
        Counter::cache_work_time_ns,
        Counter::cache_wait_time_fetch_ns,
        Counter::cache_requests,
        Counter::disk_wait_time_ns,
        Counter::disk_requests,
        Counter::points_returned,
        Counter::metrics_returned,
        Counter::metrics_found,
        Counter::fetch_size_bytes,
        Counter::metrics_known,
        Counter::index_build_time_ns,
        Counter::file_scan_time_ns,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::render_requests => "render_requests",
            Self::render_errors => "render_errors",
            Self::notfound => "notfound",
            Self::find_requests => "find_requests",
            Self::find_errors => "find_errors",
            Self::find_zero => "find_zero",
            Self::list_requests => "list_requests",
            Self::list_errors => "list_errors",
            Self::cache_hit => "cache_hit",
            Self::cache_miss => "cache_miss",
            Self::cache_work_time_ns => "cache_work_time_ns",
            Self::cache_wait_time_fetch_ns => "cache_wait_time_fetch_ns",
            Self::cache_requests => "cache_requests",
            Self::disk_wait_time_ns => "disk_wait_time_ns",
            Self::disk_requests => "disk_requests",
            Self::points_returned => "points_returned",
            Self::metrics_returned => "metrics_returned",
            Self::metrics_found => "metrics_found",
            Self::fetch_size_bytes => "fetch_size_bytes",
            Self::metrics_known => "metrics_known",
            Self::index_build_time_ns => "index_build_time_ns",
            Self::file_scan_time_ns => "file_scan_time_ns",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Selects how the counter surface is emitted (§4.G, configured by
/// `metrics_as_counters`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CounterMode {
    /// Emit the current value, unchanged.
    Cumulative,
    /// Emit the difference since the last emit, then reset the baseline.
    Delta,
}

/// A bucketed latency histogram: `buckets + 1` slots indexed by
/// `floor(log10(ms))` clamped into `[0, buckets]`. The last slot is an
/// overflow bucket that also logs a "slow request" warning.
pub struct Histogram {
    buckets: usize,
    slots: Vec<AtomicU64>,
}

impl Histogram {
    #[must_use]
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets,
            slots: (0..=buckets).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Records one request's latency in milliseconds, bumping the
    /// appropriate bucket. Logs at `warn` when the overflow bucket is hit.
    pub fn record(&self, elapsed_ms: f64) {
        let idx = bucket_index(elapsed_ms, self.buckets);
        self.slots[idx].fetch_add(1, Ordering::Relaxed);
        if idx == self.buckets {
            warn!(elapsed_ms, "slow request");
        }
    }

    /// Yields `(low_ms, high_ms, count)` for each bucket, where the last
    /// bucket's `high_ms` is `None` (unbounded overflow).
    pub fn snapshot(&self) -> Vec<(u64, Option<u64>, u64)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let low = if i == 0 { 0 } else { 10u64.pow(i as u32 - 1) };
                let high = if i == self.buckets { None } else { Some(10u64.pow(i as u32)) };
                (low, high, slot.load(Ordering::Relaxed))
            })
            .collect()
    }
}

/// Bucket 0 holds everything under 1ms; bucket `i` (`i >= 1`) is the decade
/// `[10^(i-1), 10^i)` ms, matching `Histogram::snapshot`'s `low`/`high`
/// labels. The `+ 1` shifts `floor(log10(ms))` up by one decade so that
/// `log10(ms) == 0` (i.e. `elapsed_ms` in `[1, 10)`) lands in bucket 1, not
/// bucket 0, leaving bucket 0 exclusively for the sub-1ms case handled above.
fn bucket_index(elapsed_ms: f64, buckets: usize) -> usize {
    if elapsed_ms < 1.0 {
        return 0;
    }
    let log = elapsed_ms.log10().floor();
    if log < 0.0 {
        0
    } else {
        (log as usize + 1).min(buckets)
    }
}

/// The counter bank plus histogram, owned once by the server and shared
/// across all request handlers.
pub struct Metrics {
    counters: Vec<AtomicU64>,
    previous: Vec<AtomicU64>,
    mode: CounterMode,
    histogram: Histogram,
}

impl Metrics {
    #[must_use]
    pub fn new(buckets: usize, mode: CounterMode) -> Self {
        Self {
            counters: Counter::ALL.iter().map(|_| AtomicU64::new(0)).collect(),
            previous: Counter::ALL.iter().map(|_| AtomicU64::new(0)).collect(),
            mode,
            histogram: Histogram::new(buckets),
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, delta: u64) {
        self.counters[counter.index()].fetch_add(delta, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed_ms: f64) {
        self.histogram.record(elapsed_ms);
    }

    /// Returns `(name, value)` pairs for every named counter, applying
    /// the configured cumulative/delta emission mode (§4.G).
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        Counter::ALL
            .iter()
            .map(|&c| {
                let current = self.counters[c.index()].load(Ordering::Relaxed);
                let value = match self.mode {
                    CounterMode::Cumulative => current,
                    CounterMode::Delta => {
                        let previous = self.previous[c.index()].swap(current, Ordering::Relaxed);
                        current.saturating_sub(previous)
                    }
                };
                (c.name(), value)
            })
            .collect()
    }

    #[must_use]
    pub fn histogram_snapshot(&self) -> Vec<(u64, Option<u64>, u64)> {
        self.histogram.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_monotonic_in_cumulative_mode() {
        let metrics = Metrics::new(5, CounterMode::Cumulative);
        metrics.incr(Counter::render_requests);
        metrics.incr(Counter::render_requests);
        let first = metrics.snapshot();
        metrics.incr(Counter::render_requests);
        let second = metrics.snapshot();
        let find = |snap: &[(&str, u64)], name: &str| snap.iter().find(|(n, _)| *n == name).unwrap().1;
        assert!(find(&second, "render_requests") >= find(&first, "render_requests"));
    }

    #[test]
    fn delta_mode_reports_difference_since_last_emit() {
        let metrics = Metrics::new(5, CounterMode::Delta);
        metrics.add(Counter::points_returned, 10);
        let first = metrics.snapshot();
        assert_eq!(first.iter().find(|(n, _)| *n == "points_returned").unwrap().1, 10);
        metrics.add(Counter::points_returned, 4);
        let second = metrics.snapshot();
        assert_eq!(second.iter().find(|(n, _)| *n == "points_returned").unwrap().1, 4);
    }

    #[test]
    fn histogram_overflow_bucket_catches_large_latencies() {
        let hist = Histogram::new(3);
        hist.record(0.5); // bucket 0
        hist.record(50.0); // log10(50)=1.69 -> bucket 2
        hist.record(1_000_000.0); // overflow -> bucket 3
        let snap = hist.snapshot();
        assert_eq!(snap[0].2, 1);
        assert_eq!(snap[3].2, 1);
        assert!(snap[3].1.is_none());
    }

    #[test]
    fn all_counter_names_are_unique_and_match_spec() {
        let names: Vec<&str> = Counter::ALL.iter().map(|c| c.name()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), names.len());
    }
}
