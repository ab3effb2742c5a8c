//! Component C: building and pruning the trigram posting lists for one walk.

use super::snapshot::PathId;
use crate::trigram::Trigram;
use ahash::AHashMap;
use roaring::RoaringBitmap;

/// A posting-list fraction above which a trigram is considered too common
/// to usefully narrow a candidate set; its list is dropped rather than
/// kept. Queries that needed it fall back to a full post-filter scan of
/// everything (see `crate::glob::expand`), which is correct, just slower.
pub const PRUNE_THRESHOLD: f64 = 0.95;

/// Accumulates trigram -> posting-list mappings while a walk is in
/// progress, then prunes overly common trigrams once the walk completes.
#[derive(Default)]
pub struct TrigramBuilder {
    index: AHashMap<Trigram, RoaringBitmap>,
}

impl TrigramBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes one path's trigrams under `id`.
    pub fn add_path(&mut self, id: PathId, path: &str) {
        for trigram in Trigram::windows(path.as_bytes()) {
            self.index.entry(trigram).or_default().insert(id);
        }
    }

    /// Merges another builder's postings into this one (used to combine
    /// per-shard results from a parallel walk).
    pub fn merge(&mut self, other: Self) {
        for (trigram, bitmap) in other.index {
            self.index.entry(trigram).or_default().bitor_assign(bitmap);
        }
    }

    /// Drops trigrams whose posting list covers more than [`PRUNE_THRESHOLD`]
    /// of `total_paths`. Their absence is compensated for at query time: a
    /// missing trigram is treated as unconstraining rather than as "no
    /// matches", so the post-filter step still recovers correct results.
    #[must_use]
    pub fn prune(mut self, total_paths: u64) -> AHashMap<Trigram, RoaringBitmap> {
        if total_paths == 0 {
            return self.index;
        }
        let cutoff = (total_paths as f64) * PRUNE_THRESHOLD;
        self.index.retain(|_, bitmap| (bitmap.len() as f64) <= cutoff);
        self.index
    }
}

trait BitOrAssignBitmap {
    fn bitor_assign(&mut self, other: RoaringBitmap);
}

impl BitOrAssignBitmap for RoaringBitmap {
    fn bitor_assign(&mut self, other: RoaringBitmap) {
        *self |= other;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_lookup() {
        let mut b = TrigramBuilder::new();
        b.add_path(0, "/servers/web1/cpu.wsp");
        b.add_path(1, "/servers/web2/cpu.wsp");
        let map = b.prune(2);
        let t = Trigram::new(*b"cpu");
        let posting = map.get(&t).expect("cpu trigram present");
        assert!(posting.contains(0));
        assert!(posting.contains(1));
    }

    #[test]
    fn prunes_overly_common_trigram() {
        let mut b = TrigramBuilder::new();
        // 100 paths all sharing "xyz", well above the 95% cutoff.
        for id in 0..100 {
            b.add_path(id, "/xyz/unique_tail_value");
        }
        let map = b.prune(100);
        assert!(!map.contains_key(&Trigram::new(*b"xyz")));
        // "uni" through the unique tail is rare enough to survive.
        assert!(map.contains_key(&Trigram::new(*b"uni")));
    }

    #[test]
    fn merge_combines_postings() {
        let mut a = TrigramBuilder::new();
        a.add_path(0, "/foo/bar.wsp");
        let mut b = TrigramBuilder::new();
        b.add_path(1, "/foo/baz.wsp");
        a.merge(b);
        let map = a.prune(2);
        let posting = map.get(&Trigram::new(*b"foo")).unwrap();
        assert!(posting.contains(0));
        assert!(posting.contains(1));
    }
}
