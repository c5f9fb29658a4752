use serde::{Deserialize, Serialize};

use insightdb_core::error::Error;
use insightdb_core::traits::Embedder;

pub const FORMAT_VERSION: u32 = 1;

/// Written last during a build; a snapshot without one is treated as invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub embedder_id: String,
    pub dim: usize,
    pub distance: String,
    pub table: String,
    pub segment_count: usize,
    pub entry_count: usize,
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub ann_index: bool,
    pub built_at: String,
}

impl SnapshotManifest {
    /// Queries must be embedded by the same model, at the same width, that
    /// produced the stored vectors.
    pub fn check_embedder(&self, embedder: &dyn Embedder) -> Result<(), Error> {
        if self.embedder_id != embedder.embedder_id() || self.dim != embedder.dim() {
            return Err(Error::EmbedderMismatch {
                expected: format!("{} ({} dims)", self.embedder_id, self.dim),
                found: format!("{} ({} dims)", embedder.embedder_id(), embedder.dim()),
            });
        }
        Ok(())
    }

    pub fn check_format(&self, path: &str) -> Result<(), Error> {
        if self.format_version != FORMAT_VERSION {
            return Err(Error::InvalidSnapshot {
                path: path.to_string(),
                reason: format!("format version {} is not supported (expected {})", self.format_version, FORMAT_VERSION),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, usize);

    impl Embedder for Fixed {
        fn embedder_id(&self) -> &str { self.0 }
        fn dim(&self) -> usize { self.1 }
        fn max_len(&self) -> usize { 256 }
        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; self.1]).collect())
        }
    }

    fn manifest() -> SnapshotManifest {
        SnapshotManifest {
            format_version: FORMAT_VERSION,
            embedder_id: "hash-xxh64:d8".into(),
            dim: 8,
            distance: "l2".into(),
            table: "segments".into(),
            segment_count: 3,
            entry_count: 2,
            max_chars: 512,
            overlap_chars: 50,
            ann_index: false,
            built_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn matching_embedder_passes() {
        assert!(manifest().check_embedder(&Fixed("hash-xxh64:d8", 8)).is_ok());
    }

    #[test]
    fn different_id_or_width_is_a_mismatch() {
        assert!(matches!(manifest().check_embedder(&Fixed("minilm:x:d8", 8)), Err(Error::EmbedderMismatch { .. })));
        assert!(matches!(manifest().check_embedder(&Fixed("hash-xxh64:d8", 16)), Err(Error::EmbedderMismatch { .. })));
    }

    #[test]
    fn unknown_format_version_is_rejected() {
        let m = SnapshotManifest { format_version: 99, ..manifest() };
        assert!(matches!(m.check_format("snap"), Err(Error::InvalidSnapshot { .. })));
    }
}
