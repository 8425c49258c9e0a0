//! Transit catalogue build and query engine.
//!
//! The build phase ingests a JSON request tree into a [`catalogue::Catalogue`]
//! and writes a checksummed binary snapshot; the serve phase restores the
//! snapshot and answers Stop, Bus and Route stat requests.

pub mod catalogue;
pub mod cli;
pub mod formats;
pub mod geo;
pub mod graph;
pub mod render;
pub mod request;
pub mod router;

pub use catalogue::Catalogue;
pub use formats::{Snapshot, SnapshotFile};
pub use router::TransportRouter;
