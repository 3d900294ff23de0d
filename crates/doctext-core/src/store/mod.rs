//! Content identity and artifact management.

pub mod artifacts;
pub mod identity;
mod scratch;

pub use artifacts::{ArtifactStore, PageUnit, write_atomic};
pub use identity::{fingerprint_file, identify};
pub use scratch::ScratchSpace;

pub(crate) use scratch::lock;
