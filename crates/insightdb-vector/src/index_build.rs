//! IVF_PQ training for large snapshots.
//!
//! Small corpora are served by exact (flat) search; once a snapshot holds at
//! least `index.ann_min_rows` segments the builder trains an IVF_PQ index on
//! the `vector` column and checks that it answers a sample query.
use anyhow::Result;
use arrow_array::cast::AsArray;
use arrow_array::{Array, FixedSizeListArray};
use futures::TryStreamExt;
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};
use tracing::info;

use crate::table::column;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
}

pub fn compute_ivfpq_params(total_rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (total_rows as f64).sqrt() as usize;
    let mut nlist = sqrt_n.clamp(1, 4096);
    // Clamp nlist to be less than total_rows for tiny datasets
    if total_rows > 1 {
        nlist = nlist.min(total_rows - 1);
    } else {
        nlist = 1;
    }
    // sub-vectors must divide the dimension
    let m = if dim % 16 == 0 {
        dim / 16
    } else if dim % 8 == 0 {
        dim / 8
    } else {
        1
    };
    IvfPqParams { nlist, m }
}

pub async fn build_ivfpq_index(table: &Table, params: &IvfPqParams) -> Result<()> {
    info!(nlist = params.nlist, m = params.m, "training IVF_PQ index");
    table
        .create_index(
            &["vector"],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::L2)
                    .num_partitions(params.nlist as u32)
                    .num_sub_vectors(params.m as u32),
            ),
        )
        .execute()
        .await?;
    Ok(())
}

/// Sample up to `sample` stored vectors and ensure each finds at least one neighbour.
pub async fn validate_index(table: &Table, k: usize, sample: usize) -> Result<bool> {
    let mut stream = table.query().select(Select::columns(&["vector"])).limit(sample).execute().await?;
    let mut ok = 0usize;
    let mut seen = 0usize;
    while let Some(batch) = stream.try_next().await? {
        let fsl: &FixedSizeListArray = column(&batch, "vector")?;
        for i in 0..batch.num_rows() {
            if !fsl.is_valid(i) {
                continue;
            }
            seen += 1;
            let inner = fsl.value(i);
            let q = inner.as_primitive::<arrow_array::types::Float32Type>().values().to_vec();
            let mut s = table.vector_search(q)?.distance_type(DistanceType::L2).limit(k).execute().await?;
            if let Some(rb) = s.try_next().await? {
                if rb.num_rows() > 0 {
                    ok += 1;
                }
            }
        }
    }
    Ok(seen > 0 && ok == seen)
}
