//! Component H: the `ArchiveFile` contract (§6) and its one concrete,
//! read-only implementor over the fixed-schema file format specified in
//! §3.H.

mod whisper;

pub use whisper::WhisperFile;

use crate::error::ArchiveError;
use crate::types::{ArchiveMetadata, PointSeries};

/// A read-only handle onto one metric's on-disk archive file.
///
/// Mirrors the external `ArchiveFile` contract from §6: open once per
/// fetch, read metadata and data, release on every exit path. `fetch`
/// takes the archive index the caller already selected (§4.E steps 2-3)
/// rather than re-deriving it, matching §4.H's "the backend trusts the
/// caller's archive selection" rule.
pub trait ArchiveFile: Send {
    fn metadata(&self) -> &ArchiveMetadata;

    fn retentions(&self) -> &[crate::types::Retention] {
        &self.metadata().retentions
    }

    fn aggregation_method(&self) -> u32 {
        self.metadata().aggregation_method
    }

    fn max_retention(&self) -> u32 {
        self.metadata().max_retention
    }

    fn x_files_factor(&self) -> f32 {
        self.metadata().x_files_factor
    }

    /// Reads the dense point series for archive tier `archive_index`
    /// covering `[from, until)`, aligned to that tier's step.
    fn fetch(&mut self, archive_index: usize, from: i64, until: i64) -> Result<PointSeries, ArchiveError>;
}
