use std::path::PathBuf;

use tracing::info;

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::ingest::run_ingestion;
use crate::server;
use crate::store::VectorStore;
use crate::{Result, SearchError};

/// Build the vector index from the source document
#[inline]
pub async fn run_ingest(config: &Config, document: Option<PathBuf>) -> Result<()> {
    let report = run_ingestion(config, document.as_deref()).await?;

    println!("Ingestion complete:");
    println!("  Chunks: {}", report.chunks);
    println!("  Entries written: {}", report.entries_written);
    println!("  Vector dimension: {}", report.dimension);
    println!(
        "  Store: {} (collection '{}')",
        config.store.location.display(),
        config.store.collection
    );

    Ok(())
}

/// Start the HTTP front-end
#[inline]
pub async fn run_serve(config: &Config) -> Result<()> {
    server::serve(config).await
}

/// Run a one-off similarity search from the terminal
#[inline]
pub async fn run_search(config: &Config, query: &str, k: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(SearchError::InvalidInput(
            "query must not be empty".to_string(),
        ));
    }
    if k == 0 {
        return Err(SearchError::InvalidInput(
            "k must be at least 1".to_string(),
        ));
    }

    let mut embedder = Embedder::new(&config.embedding)?;
    embedder.ensure_ready()?;

    let store = VectorStore::open(&config.store.location, &config.store.collection).await?;

    info!("Searching '{}' for: {}", config.store.collection, query);
    let vector = embedder.embed(query)?;
    let hits = store.search(&vector, k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. [score {:.4}] chunk {} @ offset {} ({})",
            rank + 1,
            hit.score,
            hit.metadata.chunk_index,
            hit.metadata.start_offset,
            hit.metadata.source
        );
        println!("{}", hit.metadata.content);
        println!();
    }

    Ok(())
}

/// Show connectivity and index status
#[inline]
pub async fn run_status(config: &Config) -> Result<()> {
    println!("doc-search status");
    println!("{}", "=".repeat(40));

    println!("Embedding backend:");
    match Embedder::new(&config.embedding) {
        Ok(embedder) => {
            match embedder.ping() {
                Ok(()) => println!(
                    "  ✅ Reachable at {}://{}:{}",
                    config.embedding.protocol, config.embedding.host, config.embedding.port
                ),
                Err(e) => println!("  ❌ Unreachable - {}", e),
            }
            match embedder.validate_model() {
                Ok(()) => println!("  ✅ Model: {}", config.embedding.model),
                Err(_) => println!("  ❌ Model '{}' is not installed", config.embedding.model),
            }
            println!("  Device preference: {}", config.embedding.device);
        }
        Err(e) => println!("  ❌ Client error - {}", e),
    }

    println!("Vector store:");
    match VectorStore::open(&config.store.location, &config.store.collection).await {
        Ok(store) => {
            println!(
                "  ✅ Open at {} (collection '{}')",
                config.store.location.display(),
                config.store.collection
            );
            match store.count().await {
                Ok(count) => println!("  Entries: {}", count),
                Err(e) => println!("  ❌ Count failed - {}", e),
            }
        }
        Err(SearchError::StoreNotFound { .. }) => {
            println!("  ⚠️  No index yet - run 'doc-search ingest' first");
        }
        Err(e) => println!("  ❌ Open failed - {}", e),
    }

    println!("Chunking:");
    println!(
        "  Size: {} chars, overlap: {} chars",
        config.chunking.chunk_size, config.chunking.chunk_overlap
    );
    println!("Document: {}", config.document.path.display());

    Ok(())
}
