//! Core domain types shared across the glob, index, and fetch pipelines.
//!
//! Metric identity has two representations (§3 "Path"): the dotted form
//! clients send (`a.b.c`) and the slash-joined on-disk form
//! (`a/b/c.wsp`). Conversion between them is total and inverse on names
//! that don't themselves contain `.` or `/`.

use serde::{Deserialize, Serialize};

/// Converts a dotted metric name to its relative on-disk `.wsp` path.
#[must_use]
pub fn metric_to_wsp_path(metric: &str) -> String {
    format!("{}.wsp", metric.replace('.', "/"))
}

/// Converts a slash-joined relative path (optionally `.wsp`-suffixed) back
/// to dotted form.
#[must_use]
pub fn path_to_metric(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    trimmed.strip_suffix(".wsp").unwrap_or(trimmed).replace('/', ".")
}

/// One resolution tier inside an archive file: `(seconds_per_point,
/// max_retention_seconds)`. Ordered finest-first; `max_retention` is
/// non-decreasing across a file's full retention list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retention {
    pub seconds_per_point: u32,
    pub max_retention: u32,
    pub points: u32,
}

impl Retention {
    #[must_use]
    pub const fn new(seconds_per_point: u32, max_retention: u32, points: u32) -> Self {
        Self {
            seconds_per_point,
            max_retention,
            points,
        }
    }
}

/// Parsed retention schema for one metric, as read from its archive file
/// header (never persisted in a [`crate::index::Snapshot`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    pub retentions: Vec<Retention>,
    pub aggregation_method: u32,
    pub max_retention: u32,
    pub x_files_factor: f32,
}

impl ArchiveMetadata {
    /// The finest-resolution step, i.e. `retentions[0].seconds_per_point`.
    #[must_use]
    pub fn best_step(&self) -> Option<u32> {
        self.retentions.first().map(|r| r.seconds_per_point)
    }
}

/// A dense, uniform-step point sequence read from one archive tier,
/// before NaN conversion and hot-cache overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSeries {
    pub from_time: i64,
    pub until_time: i64,
    pub step: u32,
    /// One value per step; `NaN` means "no point written for this slot."
    pub values: Vec<f64>,
}

/// Fetch result for one metric (§3 "Point vector"). Invariant:
/// `values.len() == is_absent.len()`, and `is_absent[i]` implies
/// `values[i] == 0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointVector {
    pub name: String,
    pub start_time: i64,
    pub stop_time: i64,
    pub step_time: u32,
    pub values: Vec<f64>,
    pub is_absent: Vec<bool>,
}

impl PointVector {
    /// Builds a point vector from a dense disk series, converting `NaN`
    /// to `(0.0, absent=true)`.
    #[must_use]
    pub fn from_series(name: String, series: &PointSeries) -> Self {
        let mut values = Vec::with_capacity(series.values.len());
        let mut is_absent = Vec::with_capacity(series.values.len());
        for &v in &series.values {
            if v.is_nan() {
                values.push(0.0);
                is_absent.push(true);
            } else {
                values.push(v);
                is_absent.push(false);
            }
        }
        Self {
            name,
            start_time: series.from_time,
            stop_time: series.until_time,
            step_time: series.step,
            values,
            is_absent,
        }
    }

    /// Overlays hot-cache samples onto this vector (§4.E step 7). Each
    /// sample's timestamp is rounded down to `step_time`; samples landing
    /// outside `[start_time, stop_time)` are silently dropped. Idempotent:
    /// applying the same samples twice leaves the vector unchanged.
    pub fn overlay_hot_cache(&mut self, samples: &[(i64, f64)]) {
        if self.step_time == 0 {
            return;
        }
        let step = i64::from(self.step_time);
        for &(ts, value) in samples {
            let rounded = ts - ts.rem_euclid(step);
            if rounded < self.start_time || rounded >= self.stop_time {
                continue;
            }
            let idx = ((rounded - self.start_time) / step) as usize;
            if let Some(slot) = self.values.get_mut(idx) {
                *slot = value;
                self.is_absent[idx] = false;
            }
        }
    }
}
