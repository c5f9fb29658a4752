//! Nearest-neighbour retrieval over a published snapshot.
use anyhow::Result as AnyResult;
use arrow_array::{BooleanArray, Float32Array, Int64Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use insightdb_core::error::Error;
use insightdb_core::traits::Embedder;
use insightdb_core::types::{RetrievedSegment, SegmentMetadata};

use crate::manifest::SnapshotManifest;
use crate::table::{column, has_table, open_db, read_manifest};

const ANN_NPROBES: usize = 32;
const ANN_REFINE_FACTOR: u32 = 10;

/// Loads a snapshot once and answers top-k queries against it. Safe to share
/// across tasks; all state is read-only after `open`.
pub struct Retriever {
	path: PathBuf,
	table: Table,
	embedder: Arc<dyn Embedder>,
	manifest: SnapshotManifest,
	timeout: Duration,
}

struct Hit {
	ordinal: i64,
	segment: RetrievedSegment,
}

impl Retriever {
	pub async fn open(path: &Path, embedder: Arc<dyn Embedder>, timeout: Duration) -> Result<Self, Error> {
		let shown = path.display().to_string();
		if !path.is_dir() {
			return Err(Error::NotFound(format!("snapshot {}", shown)));
		}
		let invalid = |reason: String| Error::InvalidSnapshot { path: shown.clone(), reason };
		let uri = path.to_str().ok_or_else(|| invalid("path is not valid UTF-8".into()))?;
		let db = open_db(uri).await.map_err(|e| invalid(format!("{e:#}")))?;
		let manifest = read_manifest(&db)
			.await
			.map_err(|e| invalid(format!("unreadable manifest: {e:#}")))?
			.ok_or_else(|| invalid("no manifest (incomplete build?)".into()))?;
		manifest.check_format(&shown)?;
		manifest.check_embedder(embedder.as_ref())?;

		if !has_table(&db, &manifest.table).await.map_err(|e| invalid(format!("{e:#}")))? {
			return Err(invalid(format!("table '{}' missing", manifest.table)));
		}
		let table = db.open_table(&manifest.table).execute().await.map_err(|e| invalid(e.to_string()))?;
		let rows = table.count_rows(None).await.map_err(|e| invalid(e.to_string()))?;
		if rows != manifest.segment_count {
			return Err(invalid(format!("table holds {} rows, manifest records {}", rows, manifest.segment_count)));
		}
		info!(path = %shown, segments = rows, embedder = %manifest.embedder_id, "snapshot loaded");
		Ok(Self { path: path.to_path_buf(), table, embedder, manifest, timeout })
	}

	pub fn path(&self) -> &Path { &self.path }

	pub fn manifest(&self) -> &SnapshotManifest { &self.manifest }

	pub fn len(&self) -> usize { self.manifest.segment_count }

	pub fn is_empty(&self) -> bool { self.manifest.segment_count == 0 }

	/// Top-`k` segments by ascending distance; ties keep insertion order.
	/// Returns everything when `k` exceeds the stored count and nothing for `k == 0`.
	pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedSegment>, Error> {
		self.search(query, k, None).await
	}

	/// Like `retrieve`, restricted to segments whose entry names `destination`.
	pub async fn retrieve_for_destination(&self, query: &str, k: usize, destination: &str) -> Result<Vec<RetrievedSegment>, Error> {
		let filter = format!("destination = '{}'", destination.replace('\'', "''"));
		self.search(query, k, Some(filter)).await
	}

	async fn search(&self, query: &str, k: usize, filter: Option<String>) -> Result<Vec<RetrievedSegment>, Error> {
		if query.trim().is_empty() {
			return Err(Error::EmptyQuery("query text is empty".into()));
		}
		if k == 0 {
			return Ok(Vec::new());
		}
		let timeout_ms = self.timeout.as_millis() as u64;
		let vector = self.embed_query(query).await?;
		if vector.len() != self.manifest.dim {
			return Err(Error::EmbedderMismatch {
				expected: format!("{} dims", self.manifest.dim),
				found: format!("{} dims", vector.len()),
			});
		}
		let hits = tokio::time::timeout(self.timeout, self.nearest(vector, k, filter))
			.await
			.map_err(|_| Error::Timeout(timeout_ms))?
			.map_err(|e| Error::Retrieval(format!("{e:#}")))?;
		debug!(k, returned = hits.len(), "retrieval done");
		Ok(hits)
	}

	async fn embed_query(&self, query: &str) -> Result<Vec<f32>, Error> {
		let embedder = Arc::clone(&self.embedder);
		let text = query.to_string();
		let task = tokio::task::spawn_blocking(move || embedder.embed_one(&text));
		match tokio::time::timeout(self.timeout, task).await {
			Err(_) => Err(Error::Timeout(self.timeout.as_millis() as u64)),
			Ok(Err(join)) => Err(Error::Embedding(join.to_string())),
			Ok(Ok(Err(e))) => Err(Error::Embedding(format!("{e:#}"))),
			Ok(Ok(Ok(v))) => Ok(v),
		}
	}

	/// Exact scan unless an ANN index exists and a plain top-k is asked for. An
	/// ANN answer shorter than `k` is redone exactly, since unprobed partitions
	/// can hide rows.
	async fn nearest(&self, vector: Vec<f32>, k: usize, filter: Option<String>) -> AnyResult<Vec<RetrievedSegment>> {
		let exact = !self.manifest.ann_index || filter.is_some() || k >= self.manifest.segment_count;
		let mut hits = self.scan(vector.clone(), k, filter.clone(), exact).await?;
		if !exact && hits.len() < k {
			debug!(k, returned = hits.len(), "ANN under-filled, rescanning exactly");
			hits = self.scan(vector, k, filter, true).await?;
		}
		Ok(hits)
	}

	async fn scan(&self, vector: Vec<f32>, k: usize, filter: Option<String>, exact: bool) -> AnyResult<Vec<RetrievedSegment>> {
		let mut query = self.table.vector_search(vector)?.distance_type(DistanceType::L2).limit(k);
		if exact {
			query = query.bypass_vector_index();
		} else {
			query = query.nprobes(ANN_NPROBES).refine_factor(ANN_REFINE_FACTOR);
		}
		if let Some(f) = filter {
			query = query.only_if(f);
		}
		let mut stream = query.execute().await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			hits.extend(decode_hits(&batch)?);
		}
		hits.sort_by(|a, b| a.segment.distance.total_cmp(&b.segment.distance).then(a.ordinal.cmp(&b.ordinal)));
		hits.truncate(k);
		Ok(hits.into_iter().map(|h| h.segment).collect())
	}
}

fn decode_hits(batch: &RecordBatch) -> AnyResult<Vec<Hit>> {
	let ids: &StringArray = column(batch, "id")?;
	let entry_ids: &StringArray = column(batch, "entry_id")?;
	let names: &StringArray = column(batch, "name")?;
	let destinations: &StringArray = column(batch, "destination")?;
	let malformed: &BooleanArray = column(batch, "malformed")?;
	let content: &StringArray = column(batch, "content")?;
	let ordinals: &Int64Array = column(batch, "ordinal")?;
	let distances: &Float32Array = column(batch, "_distance")?;
	Ok((0..batch.num_rows())
		.map(|i| Hit {
			ordinal: ordinals.value(i),
			segment: RetrievedSegment {
				segment_id: ids.value(i).to_string(),
				text: content.value(i).to_string(),
				metadata: SegmentMetadata {
					entry_id: entry_ids.value(i).to_string(),
					name: names.value(i).to_string(),
					destination: destinations.value(i).to_string(),
					malformed: malformed.value(i),
				},
				distance: distances.value(i),
			},
		})
		.collect())
}
