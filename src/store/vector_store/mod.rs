
use super::{ChunkMetadata, IndexRecord};
use crate::{Result, SearchError};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Persistent vector store over LanceDB.
///
/// A store is identified by a directory (`location`) and a table name
/// (`collection`). Entries are append-only; there is no update or delete
/// path.
pub struct VectorStore {
    connection: Connection,
    collection: String,
    dimension: Option<usize>,
}

/// One ranked result from a similarity search
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub metadata: ChunkMetadata,
    /// Similarity, higher is better (`1 - cosine distance`)
    pub score: f32,
    pub distance: f32,
}

impl VectorStore {
    /// Create a store at `location`, or attach to an existing one for
    /// appending. The table itself is created lazily on the first batch so
    /// the vector dimension can be taken from the data.
    #[inline]
    pub async fn create(location: &Path, collection: &str) -> Result<Self> {
        std::fs::create_dir_all(location).map_err(|e| {
            SearchError::Store(format!("Failed to create store directory: {}", e))
        })?;

        let connection = connect(location).await?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("Failed to list tables: {}", e)))?;

        let mut store = Self {
            connection,
            collection: collection.to_string(),
            dimension: None,
        };

        if table_names.iter().any(|name| name == collection) {
            store.dimension = Some(store.detect_dimension().await?);
            debug!(
                "Attached to existing collection '{}' ({} dimensions)",
                collection,
                store.dimension.unwrap_or_default()
            );
        } else {
            debug!("Collection '{}' will be created on first write", collection);
        }

        Ok(store)
    }

    /// Open an existing store for reading. Fails with
    /// [`SearchError::StoreNotFound`] when the location or collection does
    /// not exist.
    #[inline]
    pub async fn open(location: &Path, collection: &str) -> Result<Self> {
        let not_found = || SearchError::StoreNotFound {
            location: location.display().to_string(),
            collection: collection.to_string(),
        };

        if !location.is_dir() {
            return Err(not_found());
        }

        let connection = connect(location).await?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("Failed to list tables: {}", e)))?;

        if !table_names.iter().any(|name| name == collection) {
            return Err(not_found());
        }

        let mut store = Self {
            connection,
            collection: collection.to_string(),
            dimension: None,
        };
        store.dimension = Some(store.detect_dimension().await?);

        info!(
            "Opened vector store at {} (collection '{}', {} dimensions)",
            location.display(),
            collection,
            store.dimension.unwrap_or_default()
        );
        Ok(store)
    }

    /// Append a batch of entries. The first batch fixes the vector
    /// dimension; later batches with a different dimension are rejected.
    #[inline]
    pub async fn add_batch(&mut self, records: Vec<IndexRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No entries to store");
            return Ok(());
        }

        let batch_dimension = records[0].vector.len();
        if let Some(record) = records.iter().find(|r| r.vector.len() != batch_dimension) {
            return Err(SearchError::Store(format!(
                "Inconsistent vector dimensions in batch: {} vs {}",
                batch_dimension,
                record.vector.len()
            )));
        }

        match self.dimension {
            None => {
                let schema = self.schema(batch_dimension);
                self.connection
                    .create_empty_table(&self.collection, schema)
                    .execute()
                    .await
                    .map_err(|e| SearchError::Store(format!("Failed to create table: {}", e)))?;
                self.dimension = Some(batch_dimension);
                info!(
                    "Created collection '{}' with {} dimensions",
                    self.collection, batch_dimension
                );
            }
            Some(dimension) if dimension != batch_dimension => {
                return Err(SearchError::Store(format!(
                    "Vector dimension mismatch: collection holds {} dimensions, batch has {}",
                    dimension, batch_dimension
                )));
            }
            Some(_) => {}
        }

        let record_batch = self.build_record_batch(&records)?;

        let table = self.open_table().await?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("Failed to insert entries: {}", e)))?;

        debug!("Stored batch of {} entries", records.len());
        Ok(())
    }

    /// Return the `k` entries nearest to `query` under cosine distance,
    /// most similar first. Fewer than `k` entries are returned when the
    /// collection is smaller than `k`.
    #[inline]
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        debug!("Searching for {} nearest entries", k);

        let table = self.open_table().await?;

        let results = table
            .vector_search(query)
            .map_err(|e| SearchError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("Failed to execute search: {}", e)))?;

        self.collect_hits(results).await
    }

    /// Total number of entries in the collection.
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        let table = self.open_table().await?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| SearchError::Store(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(&self.collection)
            .execute()
            .await
            .map_err(|e| SearchError::Store(format!("Failed to open table: {}", e)))
    }

    /// Read the vector dimension back from an existing table's schema.
    async fn detect_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;

        let schema = table
            .schema()
            .await
            .map_err(|e| SearchError::Store(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(SearchError::Store(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn schema(&self, dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    dimension as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("start_offset", DataType::UInt64, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    fn build_record_batch(&self, records: &[IndexRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let dimension = self
            .dimension
            .ok_or_else(|| SearchError::Store("Vector dimension not set".to_string()))?;

        let mut ids = Vec::with_capacity(len);
        let mut contents = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut start_offsets = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        let mut flat_values = Vec::with_capacity(len * dimension);
        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            contents.push(record.metadata.content.as_str());
            sources.push(record.metadata.source.as_str());
            chunk_indices.push(record.metadata.chunk_index);
            start_offsets.push(record.metadata.start_offset);
            created_ats.push(record.metadata.created_at.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array =
            FixedSizeListArray::try_new(field, dimension as i32, Arc::new(values_array), None)
                .map_err(|e| SearchError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(sources)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(UInt64Array::from(start_offsets)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(self.schema(dimension), arrays)
            .map_err(|e| SearchError::Store(format!("Failed to create record batch: {}", e)))
    }

    async fn collect_hits(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| SearchError::Store(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(self.parse_hit_batch(&batch)?);
        }

        debug!("Collected {} search hits", hits.len());
        Ok(hits)
    }

    fn parse_hit_batch(&self, batch: &RecordBatch) -> Result<Vec<SearchHit>> {
        let num_rows = batch.num_rows();
        let mut hits = Vec::with_capacity(num_rows);

        let contents = string_column(batch, "content")?;
        let sources = string_column(batch, "source")?;
        let created_ats = string_column(batch, "created_at")?;

        let chunk_indices = batch
            .column_by_name("chunk_index")
            .ok_or_else(|| SearchError::Store("Missing chunk_index column".to_string()))?
            .as_any()
            .downcast_ref::<UInt32Array>()
            .ok_or_else(|| SearchError::Store("Invalid chunk_index column type".to_string()))?;

        let start_offsets = batch
            .column_by_name("start_offset")
            .ok_or_else(|| SearchError::Store("Missing start_offset column".to_string()))?
            .as_any()
            .downcast_ref::<UInt64Array>()
            .ok_or_else(|| SearchError::Store("Invalid start_offset column type".to_string()))?;

        let distances = batch
            .column_by_name("_distance")
            .map(|col| col.as_any().downcast_ref::<Float32Array>());

        for row in 0..num_rows {
            let metadata = ChunkMetadata {
                content: contents.value(row).to_string(),
                source: sources.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                start_offset: start_offsets.value(row),
                created_at: created_ats.value(row).to_string(),
            };

            let distance = distances
                .flatten()
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            hits.push(SearchHit {
                metadata,
                score: 1.0 - distance,
                distance,
            });
        }

        Ok(hits)
    }
}

async fn connect(location: &Path) -> Result<Connection> {
    // LanceDB expects an absolute path in the file URI
    let location = location
        .canonicalize()
        .map_err(|e| SearchError::Store(format!("Failed to resolve store path: {}", e)))?;
    let uri = format!("file://{}", location.display());

    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| SearchError::Store(format!("Failed to connect to vector store: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SearchError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| SearchError::Store(format!("Invalid {} column type", name)))
}
