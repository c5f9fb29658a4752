//! insightdb-vector
//!
//! LanceDB-backed snapshot storage for embedded segments:
//! - `writer`: `SnapshotWriter` embeds segments and publishes a snapshot directory
//! - `search`: `Retriever` loads a snapshot and answers top-k queries
//! - `table`/`schema`: connection helpers, Arrow schemas, the `meta` k/v table
//! - `index_build`: IVF_PQ training for large snapshots
pub mod index_build;
pub mod manifest;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use manifest::SnapshotManifest;
pub use search::Retriever;
pub use writer::{BuildInfo, SnapshotWriter};
