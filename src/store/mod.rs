// Vector store module
// LanceDB-backed persistence for chunk embeddings and similarity search

pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::{SearchHit, VectorStore};

/// Entry persisted in the vector store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Unique identifier assigned at ingestion time
    pub id: String,
    /// The embedding vector, unit L2 norm
    pub vector: Vec<f32>,
    /// Metadata about the chunk this vector represents
    pub metadata: ChunkMetadata,
}

/// Metadata stored alongside each embedding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// The chunk text
    pub content: String,
    /// Path of the source document
    pub source: String,
    /// Position of the chunk in document order
    pub chunk_index: u32,
    /// Byte offset of the chunk start in the source document
    pub start_offset: u64,
    /// Timestamp when this entry was created
    pub created_at: String,
}
