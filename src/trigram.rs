//! Three-byte trigram primitive shared by the path index and the glob tokenizer.
//!
//! Trigrams enable fast substring-style filtering by decomposing strings
//! into overlapping 3-byte sequences. Finding paths that could match a
//! pattern means finding paths that contain all of the pattern's required
//! trigrams.

use std::fmt;

/// Three consecutive bytes of a path or pattern.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Trigram(pub [u8; 3]);

impl Trigram {
    #[must_use]
    pub const fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }

    /// Every 3-byte sliding window of `bytes`. Strings shorter than 3 bytes
    /// yield no trigrams.
    pub fn windows(bytes: &[u8]) -> impl Iterator<Item = Trigram> + '_ {
        bytes.windows(3).map(|w| Trigram([w[0], w[1], w[2]]))
    }
}

impl fmt::Debug for Trigram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(s) = std::str::from_utf8(&self.0) {
            write!(f, "Trigram({s:?})")
        } else {
            let [a, b, c] = self.0;
            write!(f, "Trigram({a:02x}{b:02x}{c:02x})")
        }
    }
}

impl fmt::Display for Trigram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Ok(s) = std::str::from_utf8(&self.0) {
            write!(f, "{s}")
        } else {
            let [a, b, c] = self.0;
            write!(f, "{a:02x}{b:02x}{c:02x}")
        }
    }
}
