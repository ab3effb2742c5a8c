//! The path index: snapshot type, trigram construction, and the
//! build-and-publish scheduler (components C and D).

mod builder;
mod snapshot;
mod trigram;

pub use builder::{Builder, IndexHandle};
pub use snapshot::{PathId, Snapshot};
pub use trigram::PRUNE_THRESHOLD;
