//! insightdb-core
//!
//! Corpus parsing, chunking, configuration and the shared domain types used by
//! the embedding, index and retrieval crates.

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod error;
pub mod query;
pub mod traits;
pub mod types;

pub use chunker::{Chunker, ChunkingConfig};
pub use corpus::{CorpusParser, ParseReport, ParserConfig};
pub use error::{Error, Result};
