// Ingestion module
// One-shot offline pipeline: document -> chunks -> vectors -> persisted index

#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::splitter::TextSplitter;
use crate::store::{ChunkMetadata, IndexRecord, VectorStore};
use crate::{Result, SearchError};

/// Summary of a completed ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionReport {
    pub chunks: usize,
    pub entries_written: usize,
    pub dimension: usize,
}

/// Build the vector index from the source document.
///
/// The document is validated before the store is touched, so a missing or
/// empty document never modifies a pre-existing index. Re-running against
/// the same collection appends duplicate entries; the store is append-only
/// and operators clear the location to rebuild from scratch.
#[inline]
pub async fn run_ingestion(config: &Config, document: Option<&Path>) -> Result<IngestionReport> {
    let document_path = document.unwrap_or(&config.document.path);

    if !document_path.is_file() {
        return Err(SearchError::InvalidInput(format!(
            "document not found: {}",
            document_path.display()
        )));
    }

    let text = fs::read_to_string(document_path)?;
    if text.trim().is_empty() {
        return Err(SearchError::InvalidInput(format!(
            "document is empty: {}",
            document_path.display()
        )));
    }

    let splitter = TextSplitter::new(&config.chunking)?;
    let chunks = splitter.split(&text);
    info!(
        "Split {} into {} chunks",
        document_path.display(),
        chunks.len()
    );

    let mut embedder = Embedder::new(&config.embedding)?;
    embedder.ensure_ready()?;

    let mut store = VectorStore::create(&config.store.location, &config.store.collection).await?;

    let source = document_path.display().to_string();
    let created_at = Utc::now().to_rfc3339();
    let batch_size = config.embedding.batch_size.max(1) as usize;

    let progress = ProgressBar::new(chunks.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.set_message("Embedding chunks");

    let mut entries_written = 0;
    let mut dimension = 0;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed_batch(&texts)?;

        let records: Vec<IndexRecord> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord {
                id: Uuid::new_v4().to_string(),
                vector,
                metadata: ChunkMetadata {
                    content: chunk.content.clone(),
                    source: source.clone(),
                    chunk_index: chunk.index as u32,
                    start_offset: chunk.start as u64,
                    created_at: created_at.clone(),
                },
            })
            .collect();

        if let Some(record) = records.first() {
            dimension = record.vector.len();
        }

        store.add_batch(records).await?;
        entries_written += batch.len();
        progress.inc(batch.len() as u64);
        debug!("Ingested {}/{} chunks", entries_written, chunks.len());
    }

    progress.finish_with_message("Ingestion complete");

    info!(
        "Ingested {} entries into '{}' at {}",
        entries_written,
        config.store.collection,
        config.store.location.display()
    );

    Ok(IngestionReport {
        chunks: chunks.len(),
        entries_written,
        dimension,
    })
}
