//! Binary artifact formats shared by the build and serve phases.

pub mod crc;
pub mod snapshot;

pub use snapshot::{Snapshot, SnapshotError, SnapshotFile};
