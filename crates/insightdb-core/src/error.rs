use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot read corpus {path}: {source}")]
    CorpusUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corpus {0} contains no entries")]
    EmptyCorpus(String),

    #[error("Empty query: {0}")]
    EmptyQuery(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// The snapshot was built by a different embedder (or dimensionality)
    /// than the one used to query it.
    #[error("Embedder mismatch: snapshot built with '{expected}', current embedder is '{found}'")]
    EmbedderMismatch { expected: String, found: String },

    #[error("Invalid snapshot {path}: {reason}")]
    InvalidSnapshot { path: String, reason: String },

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
