use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase};

use crate::embedding::EMBEDDING_DIMENSION;
use crate::error::{MemoryError, Result};
use crate::memory::types::SemanticDocument;

const EMBEDDING_DIMENSIONS: i32 = EMBEDDING_DIMENSION as i32;
const DOCUMENTS_TABLE: &str = "documents";

/// LanceDB-backed table of semantic documents
pub struct DocumentStore {
    table: Table,
}

impl DocumentStore {
    /// Connect to the store at `path`, opening the documents table or
    /// creating it on first use.
    pub async fn open(path: &Path) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| MemoryError::Index("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| MemoryError::Index(format!("Failed to connect to LanceDB: {e}")))?;

        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| MemoryError::Index(format!("Failed to list tables: {e}")))?;

        let table = if names.contains(&DOCUMENTS_TABLE.to_string()) {
            connection
                .open_table(DOCUMENTS_TABLE)
                .execute()
                .await
                .map_err(|e| MemoryError::Index(format!("Failed to open documents table: {e}")))?
        } else {
            let schema = Self::documents_schema();
            let batch = Self::create_empty_batch(schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            connection
                .create_table(DOCUMENTS_TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| MemoryError::Index(format!("Failed to create documents table: {e}")))?
        };

        Ok(Self { table })
    }

    fn documents_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("user_id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSIONS,
                ),
                false,
            ),
            Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new("chunk_index", DataType::Int32, false),
        ]))
    }

    fn create_empty_batch(schema: Arc<Schema>) -> RecordBatch {
        let empty_strings: Vec<Option<&str>> = vec![];
        let empty_timestamps: Vec<i64> = vec![];
        let empty_ints: Vec<i32> = vec![];
        let empty_embeddings: Vec<Option<Vec<Option<f32>>>> = vec![];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(empty_embeddings, EMBEDDING_DIMENSIONS)),
                Arc::new(TimestampMicrosecondArray::from(empty_timestamps).with_timezone("UTC")),
                Arc::new(Int32Array::from(empty_ints)),
            ],
        )
        .expect("Schema matches columns")
    }

    /// Convert documents to an Arrow RecordBatch
    fn documents_to_batch(docs: &[SemanticDocument], schema: Arc<Schema>) -> Result<RecordBatch> {
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        let user_ids: Vec<&str> = docs.iter().map(|d| d.user_id.as_str()).collect();
        let contents: Vec<&str> = docs.iter().map(|d| d.content.as_str()).collect();

        let embeddings: Vec<Option<Vec<Option<f32>>>> = docs
            .iter()
            .map(|d| Some(d.embedding.iter().map(|&v| Some(v)).collect()))
            .collect();

        let timestamps: Vec<i64> = docs.iter().map(|d| d.timestamp.timestamp_micros()).collect();
        let chunk_indices: Vec<i32> = docs.iter().map(|d| d.chunk_index).collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(user_ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embeddings, EMBEDDING_DIMENSIONS)),
                Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC")),
                Arc::new(Int32Array::from(chunk_indices)),
            ],
        )
        .map_err(|e| MemoryError::Index(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert an Arrow RecordBatch row back to a document
    fn batch_to_document(batch: &RecordBatch, row: usize) -> Result<SemanticDocument> {
        let id_array = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoryError::Index("Failed to get id column".to_string()))?;

        let user_id_array = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoryError::Index("Failed to get user_id column".to_string()))?;

        let content_array = batch
            .column(2)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| MemoryError::Index("Failed to get content column".to_string()))?;

        let embedding_array = batch
            .column(3)
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .ok_or_else(|| MemoryError::Index("Failed to get embedding column".to_string()))?;

        let timestamp_array = batch
            .column(4)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .ok_or_else(|| MemoryError::Index("Failed to get timestamp column".to_string()))?;

        let chunk_index_array = batch
            .column(5)
            .as_any()
            .downcast_ref::<Int32Array>()
            .ok_or_else(|| MemoryError::Index("Failed to get chunk_index column".to_string()))?;

        let embedding_list = embedding_array.value(row);
        let embedding_values = embedding_list
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| MemoryError::Index("Failed to get embedding values".to_string()))?;
        let embedding: Vec<f32> = (0..embedding_values.len())
            .map(|i| embedding_values.value(i))
            .collect();

        let timestamp = Utc
            .timestamp_micros(timestamp_array.value(row))
            .single()
            .ok_or_else(|| MemoryError::Index("Failed to parse timestamp".to_string()))?;

        Ok(SemanticDocument {
            id: id_array.value(row).to_string(),
            user_id: user_id_array.value(row).to_string(),
            content: content_array.value(row).to_string(),
            embedding,
            timestamp,
            chunk_index: chunk_index_array.value(row),
        })
    }

    /// Insert documents in one batch
    pub async fn insert(&self, docs: &[SemanticDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let schema = Self::documents_schema();
        let batch = Self::documents_to_batch(docs, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        self.table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| MemoryError::Index(format!("Failed to insert documents: {e}")))?;

        Ok(())
    }

    /// Nearest-neighbor search scoped to one user, backend ranking order
    pub async fn search(
        &self,
        embedding: &[f32],
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<SemanticDocument>> {
        let stream = self
            .table
            .query()
            .nearest_to(embedding)
            .map_err(|e| MemoryError::Index(format!("Failed to create vector query: {e}")))?
            .only_if(user_filter(user_id))
            .limit(limit)
            .execute()
            .await
            .map_err(|e| MemoryError::Index(format!("Failed to execute search: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| MemoryError::Index(format!("Failed to collect search results: {e}")))?;

        let mut docs = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                docs.push(Self::batch_to_document(batch, row)?);
            }
        }

        Ok(docs)
    }

    /// Delete every document owned by `user_id`, returning how many were removed
    pub async fn delete_user(&self, user_id: &str) -> Result<usize> {
        let filter = user_filter(user_id);

        let count = self
            .table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(|e| MemoryError::Index(format!("Failed to count documents: {e}")))?;

        if count > 0 {
            self.table
                .delete(&filter)
                .await
                .map_err(|e| MemoryError::Index(format!("Failed to delete documents: {e}")))?;
        }

        Ok(count)
    }

    /// Total documents, optionally filtered to one user
    pub async fn count(&self, user_id: Option<&str>) -> Result<usize> {
        self.table
            .count_rows(user_id.map(user_filter))
            .await
            .map_err(|e| MemoryError::Index(format!("Failed to count documents: {e}")))
    }
}

fn user_filter(user_id: &str) -> String {
    format!("user_id = '{}'", user_id.replace('\'', "''"))
}
