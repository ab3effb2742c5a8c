//! The immutable published snapshot (§3 "Snapshot", §4.C "Path index").

use crate::trigram::Trigram;
use ahash::AHashMap;
use roaring::RoaringBitmap;

/// A dense index into [`Snapshot::paths`], stable only within one snapshot.
pub type PathId = u32;

/// An immutable, fully-built view of every known path plus its trigram
/// postings. Cheap to share: readers hold an `Arc<Snapshot>` obtained from
/// the published pointer and never see it mutated.
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Every known path, directories and `.wsp` leaves alike, each a
    /// leading-slash string relative to the data root, in filesystem-walk
    /// order (not sorted).
    pub paths: Vec<String>,
    /// trigram -> ascending PathIds whose path contains it, after pruning
    /// overly common trigrams (see `build::prune`).
    pub trigrams: AHashMap<Trigram, RoaringBitmap>,
    /// Count of `paths` entries that are `.wsp` leaves.
    pub known_metric_count: u64,
}

impl Snapshot {
    #[must_use]
    pub fn path(&self, id: PathId) -> Option<&str> {
        self.paths.get(id as usize).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
