//! Snapshot builder: embeds segments and writes them, plus a manifest, into a
//! LanceDB directory.
//!
//! The new snapshot is assembled in `<dir>.partial` and only moved into place
//! once every row and the manifest are written, so an interrupted build never
//! replaces (or masquerades as) a usable snapshot.
use anyhow::{anyhow, bail, ensure, Context, Result};
use arrow_array::{BooleanArray, FixedSizeListArray, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::{Connection, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use insightdb_core::config::IndexSettings;
use insightdb_core::traits::Embedder;
use insightdb_core::types::Segment;

use crate::index_build::{build_ivfpq_index, compute_ivfpq_params, validate_index};
use crate::manifest::{SnapshotManifest, FORMAT_VERSION};
use crate::schema::build_segments_schema;
use crate::table::{open_db, read_manifest, write_manifest};

/// Chunking parameters recorded in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
	pub entry_count: usize,
	pub max_chars: usize,
	pub overlap_chars: usize,
}

pub struct SnapshotWriter {
	target: PathBuf,
	table_name: String,
	ann_min_rows: usize,
	batch_size: usize,
}

impl SnapshotWriter {
	pub fn new(target: &Path, table_name: &str) -> Self {
		Self { target: target.to_path_buf(), table_name: table_name.to_string(), ann_min_rows: 5000, batch_size: 32 }
	}

	pub fn from_settings(target: &Path, settings: &IndexSettings, batch_size: usize) -> Self {
		Self::new(target, &settings.table).with_ann_min_rows(settings.ann_min_rows).with_batch_size(batch_size)
	}

	pub fn with_ann_min_rows(mut self, rows: usize) -> Self { self.ann_min_rows = rows; self }

	pub fn with_batch_size(mut self, size: usize) -> Self { self.batch_size = size.max(1); self }

	pub fn target(&self) -> &Path { &self.target }

	pub fn staging_dir(&self) -> PathBuf { staging_path(&self.target) }

	/// Build a fresh snapshot from `segments`, replacing a previous snapshot at
	/// the target. Any other existing path at the target is left alone and the
	/// build fails.
	pub async fn build(&self, segments: &[Segment], embedder: &dyn Embedder, info: BuildInfo) -> Result<SnapshotManifest> {
		if segments.is_empty() {
			bail!("no segments to index; refusing to write an empty snapshot");
		}
		self.check_target_replaceable().await?;
		let staging = self.staging_dir();
		if staging.exists() {
			warn!(path = %staging.display(), "removing leftover staging directory");
			std::fs::remove_dir_all(&staging).with_context(|| format!("removing {}", staging.display()))?;
		}
		if let Some(parent) = staging.parent() {
			std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
		}

		let manifest = match self.write_staging(&staging, segments, embedder, info).await {
			Ok(m) => m,
			Err(e) => {
				if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
					warn!(path = %staging.display(), error = %cleanup, "could not remove staging directory");
				}
				return Err(e);
			}
		};

		if self.target.exists() {
			std::fs::remove_dir_all(&self.target).with_context(|| format!("removing previous snapshot {}", self.target.display()))?;
		}
		std::fs::rename(&staging, &self.target)
			.with_context(|| format!("moving {} to {}", staging.display(), self.target.display()))?;
		info!(path = %self.target.display(), segments = manifest.segment_count, "snapshot published");
		Ok(manifest)
	}

	/// The target may be absent, an empty directory, or a snapshot (has a manifest).
	async fn check_target_replaceable(&self) -> Result<()> {
		let target = &self.target;
		if !target.exists() {
			return Ok(());
		}
		if !target.is_dir() {
			bail!("{} exists and is not a snapshot directory; refusing to overwrite it", target.display());
		}
		let empty = std::fs::read_dir(target)
			.with_context(|| format!("reading {}", target.display()))?
			.next()
			.is_none();
		if empty {
			return Ok(());
		}
		let uri = target.to_str().ok_or_else(|| anyhow!("snapshot path {} is not valid UTF-8", target.display()))?;
		let has_manifest = match open_db(uri).await {
			Ok(db) => read_manifest(&db).await.map(|m| m.is_some()).unwrap_or(false),
			Err(_) => false,
		};
		if !has_manifest {
			bail!("{} is not empty and holds no snapshot manifest; refusing to overwrite it", target.display());
		}
		Ok(())
	}

	async fn write_staging(&self, staging: &Path, segments: &[Segment], embedder: &dyn Embedder, info: BuildInfo) -> Result<SnapshotManifest> {
		let uri = staging.to_str().ok_or_else(|| anyhow!("snapshot path {} is not valid UTF-8", staging.display()))?;
		let db = open_db(uri).await?;
		let dim = embedder.dim();
		info!(segments = segments.len(), table = %self.table_name, embedder = embedder.embedder_id(), "indexing segments");

		let pb = ProgressBar::new(segments.len() as u64);
		if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} segments ({percent}%) {msg}") {
			pb.set_style(style.progress_chars("#>-"));
		}
		let mut table: Option<Table> = None;
		for (batch_no, batch) in segments.chunks(self.batch_size).enumerate() {
			let texts: Vec<String> = batch.iter().map(|s| s.text.clone()).collect();
			let vectors = embedder.embed_batch(&texts).with_context(|| format!("embedding batch {}", batch_no))?;
			ensure!(vectors.len() == batch.len(), "embedder returned {} vectors for {} segments", vectors.len(), batch.len());
			if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
				bail!("embedder returned a {}-dim vector, expected {}", bad.len(), dim);
			}
			let first_ordinal = batch_no * self.batch_size;
			let rb = segments_to_record_batch(batch, &vectors, first_ordinal, dim)?;
			table = Some(self.insert_batch(&db, table, rb).await?);
			pb.inc(batch.len() as u64);
		}
		pb.finish_with_message("done");
		let table = table.ok_or_else(|| anyhow!("no rows written"))?;

		let rows = table.count_rows(None).await?;
		ensure!(rows == segments.len(), "table holds {} rows, expected {}", rows, segments.len());

		let ann_index = rows >= self.ann_min_rows;
		if ann_index {
			build_ivfpq_index(&table, &compute_ivfpq_params(rows, dim)).await?;
			ensure!(validate_index(&table, 1, 8).await?, "IVF_PQ index failed its sample check");
		}

		let manifest = SnapshotManifest {
			format_version: FORMAT_VERSION,
			embedder_id: embedder.embedder_id().to_string(),
			dim,
			distance: "l2".to_string(),
			table: self.table_name.clone(),
			segment_count: rows,
			entry_count: info.entry_count,
			max_chars: info.max_chars,
			overlap_chars: info.overlap_chars,
			ann_index,
			built_at: Utc::now().to_rfc3339(),
		};
		write_manifest(&db, &manifest).await?;
		Ok(manifest)
	}

	async fn insert_batch(&self, db: &Connection, table: Option<Table>, rb: RecordBatch) -> Result<Table> {
		let schema = rb.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), schema));
		match table {
			Some(t) => {
				t.add(reader).execute().await?;
				Ok(t)
			}
			None => Ok(db.create_table(&self.table_name, reader).execute().await?),
		}
	}
}

pub fn staging_path(target: &Path) -> PathBuf {
	let name = target.file_name().map_or_else(|| "snapshot".into(), |n| n.to_string_lossy().to_string());
	target.with_file_name(format!("{}.partial", name))
}

fn segments_to_record_batch(segments: &[Segment], vectors: &[Vec<f32>], first_ordinal: usize, dim: usize) -> Result<RecordBatch> {
	let schema = build_segments_schema(dim as i32);
	let vectors: Vec<Option<Vec<Option<f32>>>> = vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect())).collect();
	let rb = RecordBatch::try_new(schema, vec![
		Arc::new(StringArray::from_iter_values(segments.iter().map(|s| s.id.as_str()))),
		Arc::new(StringArray::from_iter_values(segments.iter().map(|s| s.metadata.entry_id.as_str()))),
		Arc::new(StringArray::from_iter_values(segments.iter().map(|s| s.metadata.name.as_str()))),
		Arc::new(StringArray::from_iter_values(segments.iter().map(|s| s.metadata.destination.as_str()))),
		Arc::new(BooleanArray::from(segments.iter().map(|s| s.metadata.malformed).collect::<Vec<_>>())),
		Arc::new(StringArray::from_iter_values(segments.iter().map(|s| s.text.as_str()))),
		Arc::new(Int32Array::from_iter_values(segments.iter().map(|s| s.chunk_index as i32))),
		Arc::new(Int32Array::from_iter_values(segments.iter().map(|s| s.total_chunks as i32))),
		Arc::new(Int64Array::from_iter_values(segments.iter().map(|s| s.span.start as i64))),
		Arc::new(Int64Array::from_iter_values(segments.iter().map(|s| s.span.end as i64))),
		Arc::new(Int64Array::from_iter_values((0..segments.len()).map(|i| (first_ordinal + i) as i64))),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim as i32)),
	])?;
	Ok(rb)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn staging_dir_sits_next_to_target() {
		assert_eq!(staging_path(Path::new("indexes/insights")), PathBuf::from("indexes/insights.partial"));
	}
}
