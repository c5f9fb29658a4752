//! insightdb-pipeline
//!
//! Wires parser, chunker, embedder and snapshot writer into a single ingest
//! call, and opens retrievers over the snapshots it publishes.
use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use insightdb_core::chunker::Chunker;
use insightdb_core::config::Settings;
use insightdb_core::corpus::CorpusParser;
use insightdb_core::error::Error;
use insightdb_core::traits::Embedder;
use insightdb_core::types::{Entry, RetrievedSegment, Segment};
use insightdb_embed::load_embedder;
use insightdb_vector::{BuildInfo, Retriever, SnapshotManifest, SnapshotWriter};

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub corpus: PathBuf,
    pub snapshot: PathBuf,
    pub entries: usize,
    pub malformed: usize,
    pub skipped_malformed: usize,
    pub skipped_empty: usize,
    pub segments: usize,
    pub embedder_id: String,
    pub ann_index: bool,
}

/// Entries and segments of one corpus, before embedding.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub entries: Vec<Entry>,
    pub segments: Vec<Segment>,
    pub malformed: usize,
    pub skipped_malformed: usize,
    pub skipped_empty: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    pub query: String,
    pub segments: Vec<RetrievedSegment>,
}

pub struct Pipeline {
    settings: Settings,
    parser: CorpusParser,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
}

impl Pipeline {
    pub fn new(settings: Settings, embedder: Arc<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        let parser = CorpusParser::new(settings.corpus.parser_config());
        let chunker = Chunker::new(settings.chunking.clone())?;
        Ok(Self { settings, parser, chunker, embedder })
    }

    /// Builds the configured embedder; it is shared by every call on this pipeline.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let embedder = load_embedder(&settings.embedding)?;
        Self::new(settings, embedder)
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn embedder(&self) -> Arc<dyn Embedder> { Arc::clone(&self.embedder) }

    /// Parse and chunk a corpus file.
    pub fn prepare(&self, corpus: &Path) -> Result<Prepared> {
        let report = self.parser.parse_file(corpus)?;
        let total = report.entries.len();
        let entries: Vec<Entry> = if self.settings.corpus.skip_malformed {
            report.entries.into_iter().filter(|e| !e.is_malformed()).collect()
        } else {
            report.entries
        };
        let skipped_malformed = total - entries.len();
        if entries.is_empty() {
            return Err(Error::EmptyCorpus(format!("{} (every heading was malformed)", corpus.display())).into());
        }
        let segments = self.chunker.chunk_entries(&entries);
        Ok(Prepared {
            malformed: report.malformed,
            skipped_malformed,
            skipped_empty: report.skipped_empty,
            entries,
            segments,
        })
    }

    /// Full rebuild: parse, chunk, embed and publish a snapshot at `snapshot`.
    pub async fn ingest(&self, corpus: &Path, snapshot: &Path) -> Result<IngestReport> {
        let prepared = self.prepare(corpus)?;
        info!(entries = prepared.entries.len(), segments = prepared.segments.len(), "corpus prepared");
        let info = BuildInfo {
            entry_count: prepared.entries.len(),
            max_chars: self.settings.chunking.max_chars,
            overlap_chars: self.settings.chunking.overlap_chars,
        };
        let manifest: SnapshotManifest = SnapshotWriter::from_settings(snapshot, &self.settings.index, self.settings.embedding.batch_size)
            .build(&prepared.segments, self.embedder.as_ref(), info)
            .await
            .with_context(|| format!("building snapshot at {}", snapshot.display()))?;
        Ok(IngestReport {
            corpus: corpus.to_path_buf(),
            snapshot: snapshot.to_path_buf(),
            entries: manifest.entry_count,
            malformed: prepared.malformed,
            skipped_malformed: prepared.skipped_malformed,
            skipped_empty: prepared.skipped_empty,
            segments: manifest.segment_count,
            embedder_id: manifest.embedder_id,
            ann_index: manifest.ann_index,
        })
    }

    /// Ingest from the configured corpus path into the configured snapshot dir.
    pub async fn ingest_configured(&self) -> Result<IngestReport> {
        self.ingest(&self.settings.corpus_path(), &self.settings.snapshot_dir()).await
    }

    pub async fn open_retriever(&self, snapshot: &Path) -> Result<Retriever, Error> {
        let timeout = Duration::from_millis(self.settings.retrieval.timeout_ms);
        Retriever::open(snapshot, self.embedder(), timeout).await
    }

    /// Runs every query concurrently against one retriever; fails on the first error.
    pub async fn answer_all(&self, retriever: &Retriever, queries: &[String], k: usize, destination: Option<&str>) -> Result<Vec<QueryAnswer>, Error> {
        try_join_all(queries.iter().map(|q| async move {
            let segments = match destination {
                Some(d) => retriever.retrieve_for_destination(q, k, d).await?,
                None => retriever.retrieve(q, k).await?,
            };
            Ok::<_, Error>(QueryAnswer { query: q.clone(), segments })
        }))
        .await
    }
}
