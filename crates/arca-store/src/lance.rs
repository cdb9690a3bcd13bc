//! LanceDB storage for embedded internal-policy chunks.
//!
//! One table, `policy_chunks`, with columns `text`, `source`, `page` and
//! `embedding` (`FixedSizeList<Float32, dim>`). Search uses cosine distance and
//! reports relevance as `1 - distance`, keeping LanceDB's ordering.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListBuilder, Float32Array, Float32Builder, LargeStringArray,
    RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::info;

use crate::{IndexMatch, StoreError, VectorIndex};

pub const POLICY_TABLE: &str = "policy_chunks";

/// A policy chunk ready to be written to the index.
#[derive(Debug, Clone)]
pub struct PolicyChunk {
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    pub embedding: Vec<f32>,
}

/// LanceDB-backed policy index.
pub struct PolicyIndex {
    path: PathBuf,
    table: lancedb::Table,
}

impl PolicyIndex {
    /// Open an existing index. Fails with [`StoreError::IndexUnavailable`] when
    /// the database or its `policy_chunks` table does not exist.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::unavailable(path, "no such directory"));
        }
        let db = connect(path).await?;

        let names = db
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::unavailable(path, e))?;
        if !names.iter().any(|n| n == POLICY_TABLE) {
            return Err(StoreError::unavailable(
                path,
                format!("table '{POLICY_TABLE}' not found, run `arca index` first"),
            ));
        }

        let table = db
            .open_table(POLICY_TABLE)
            .execute()
            .await
            .map_err(|e| StoreError::unavailable(path, e))?;
        let rows = table.count_rows(None).await?;
        info!(path = %path.display(), rows, "opened policy index");

        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    /// Create (or replace) the policy table from embedded chunks.
    pub async fn create(path: &Path, chunks: Vec<PolicyChunk>) -> Result<Self, StoreError> {
        let Some(first) = chunks.first() else {
            return Err(StoreError::Other("no policy chunks provided".into()));
        };
        let dim = first.embedding.len();
        if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dim) {
            return Err(StoreError::DimensionMismatch {
                expected: dim,
                actual: bad.embedding.len(),
            });
        }

        let total_rows = chunks.len();
        let batch = chunks_to_batch(&chunks, dim)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let db = connect(path).await?;
        let existing = db.table_names().execute().await?;
        if existing.iter().any(|n| n == POLICY_TABLE) {
            db.drop_table(POLICY_TABLE, &[]).await?;
        }
        let table = db.create_table(POLICY_TABLE, Box::new(reader)).execute().await?;

        info!(
            table = POLICY_TABLE,
            rows = total_rows,
            dim,
            "created policy index"
        );
        Ok(Self {
            path: path.to_path_buf(),
            table,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl VectorIndex for PolicyIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>, StoreError> {
        let batches: Vec<RecordBatch> = self
            .table
            .vector_search(vector)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?
            .try_collect()
            .await?;

        let mut matches = Vec::with_capacity(k);
        for batch in &batches {
            matches.extend(batch_to_matches(batch)?);
        }
        Ok(matches)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.table.count_rows(None).await?)
    }
}

async fn connect(path: &Path) -> Result<lancedb::Connection, StoreError> {
    let uri = path
        .to_str()
        .ok_or_else(|| StoreError::Other("non-UTF8 database path".into()))?;
    Ok(lancedb::connect(uri).execute().await?)
}

fn policy_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, true),
        Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            true,
        ),
    ]))
}

fn chunks_to_batch(chunks: &[PolicyChunk], dim: usize) -> Result<RecordBatch, StoreError> {
    let texts = StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()));
    let sources = StringArray::from_iter_values(chunks.iter().map(|c| c.source.as_str()));
    let pages = UInt32Array::from(chunks.iter().map(|c| c.page).collect::<Vec<_>>());

    let mut emb_builder = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);
    for chunk in chunks {
        emb_builder.values().append_slice(&chunk.embedding);
        emb_builder.append(true);
    }

    Ok(RecordBatch::try_new(
        policy_schema(dim),
        vec![
            Arc::new(texts),
            Arc::new(sources),
            Arc::new(pages),
            Arc::new(emb_builder.finish()),
        ],
    )?)
}

/// Convert one search result batch, keeping row order.
fn batch_to_matches(batch: &RecordBatch) -> Result<Vec<IndexMatch>, StoreError> {
    let text = column(batch, "text")?;
    let source = column(batch, "source")?;
    let page = column(batch, "page")?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| StoreError::Other("page column is not UInt32".into()))?;
    let distance = column(batch, "_distance")?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| StoreError::Other("_distance column is not Float32".into()))?;

    (0..batch.num_rows())
        .map(|row| {
            Ok(IndexMatch {
                text: get_string(text.as_ref(), row)
                    .ok_or_else(|| StoreError::Other(format!("null text in row {row}")))?,
                source: get_string(source.as_ref(), row).unwrap_or_else(|| "unknown".into()),
                page: (!page.is_null(row)).then(|| page.value(row)),
                score: 1.0 - distance.value(row),
            })
        })
        .collect()
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Arc<dyn Array>, StoreError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::Other(format!("missing '{name}' column")))
}

fn get_string(col: &dyn Array, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    col.as_any()
        .downcast_ref::<StringArray>()
        .map(|arr| arr.value(row).to_string())
        .or_else(|| {
            col.as_any()
                .downcast_ref::<LargeStringArray>()
                .map(|arr| arr.value(row).to_string())
        })
}
