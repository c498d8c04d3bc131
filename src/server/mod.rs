// HTTP server module
// Single POST /search endpoint over the query service, plus a liveness probe


use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::embeddings::Embedder;
use crate::store::VectorStore;
use crate::{Result, SearchError};

const DEFAULT_RESULT_COUNT: i64 = 5;

/// Shared state for the query service. The store handle and embedder are
/// long-lived and safe for concurrent reads; sharing them does not change
/// observable results versus reopening per request.
#[derive(Clone)]
pub struct AppState {
    embedder: Arc<Embedder>,
    store: Arc<VectorStore>,
}

impl AppState {
    #[inline]
    pub fn new(embedder: Embedder, store: VectorStore) -> Self {
        Self {
            embedder: Arc::new(embedder),
            store: Arc::new(store),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    query: String,
    // Deserialized as i64 so zero and negative values reach validation and
    // produce a uniform error body instead of a deserialization failure
    #[serde(default = "default_result_count")]
    k: i64,
}

fn default_result_count() -> i64 {
    DEFAULT_RESULT_COUNT
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub metadata: ResultMetadata,
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub source: String,
    pub chunk_index: u32,
    pub start_offset: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Build the router. Split out from [`serve`] so tests can drive the
/// service without binding a socket.
#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/search", post(search_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP front-end. The store is opened once at startup; serving
/// before ingestion fails fast with a not-found error instead of failing
/// every request.
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let mut embedder = Embedder::new(&config.embedding)?;
    embedder.ensure_ready()?;

    let store = VectorStore::open(&config.store.location, &config.store.collection).await?;
    let entries = store.count().await?;

    let app = router(AppState::new(embedder, store));

    let addr = config
        .server
        .bind_addr()
        .map_err(|e| SearchError::Config(e.to_string()))?;
    let listener = TcpListener::bind(addr).await?;

    info!("Serving search over {} entries on http://{}", entries, addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// The single place broad failures are converted into HTTP responses:
/// invalid input becomes a 400, everything else a 500 with the error
/// message, and the serving process never dies for one bad request.
async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> std::result::Result<Json<SearchResponse>, (StatusCode, Json<ErrorBody>)> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if request.k < 1 {
        return Err(bad_request(format!(
            "k must be at least 1, got {}",
            request.k
        )));
    }
    let k = request.k as usize;

    debug!("Searching: query length {}, k {}", request.query.len(), k);

    // The embedding client blocks on HTTP, so it runs off the async runtime
    let embedder = Arc::clone(&state.embedder);
    let query = request.query.clone();
    let vector = tokio::task::spawn_blocking(move || embedder.embed(&query))
        .await
        .map_err(|e| internal_error(format!("embedding task failed: {}", e)))?
        .map_err(internal_error)?;

    let hits = state
        .store
        .search(&vector, k)
        .await
        .map_err(internal_error)?;

    let results = hits
        .into_iter()
        .map(|hit| SearchResult {
            content: hit.metadata.content,
            metadata: ResultMetadata {
                source: hit.metadata.source,
                chunk_index: hit.metadata.chunk_index,
                start_offset: hit.metadata.start_offset,
            },
            score: hit.score,
        })
        .collect();

    Ok(Json(SearchResponse { results }))
}

fn bad_request(detail: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            detail: detail.into(),
        }),
    )
}

fn internal_error(error: impl ToString) -> (StatusCode, Json<ErrorBody>) {
    let detail = error.to_string();
    error!("Search request failed: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody { detail }),
    )
}
