// Embeddings module
// Ollama-backed embedding client with batching, retry, and normalization


use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::{EmbeddingConfig, ExecutionDevice};
use crate::{Result, SearchError};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Vectors shorter than this norm are left unnormalized to avoid dividing
/// by (effectively) zero.
const NORM_EPSILON: f32 = 1e-12;

/// Client for the embedding backend.
///
/// The model and execution device are resolved once at startup via
/// [`Embedder::ensure_ready`]; every vector returned is L2-normalized so
/// cosine and inner-product ranking agree downstream.
#[derive(Debug, Clone)]
pub struct Embedder {
    base_url: Url,
    model: String,
    batch_size: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
    device: ExecutionDevice,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions>,
}

/// Backend model options. `num_gpu: 0` pins CPU execution.
#[derive(Debug, Clone, Copy, Serialize)]
struct ModelOptions {
    num_gpu: i32,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl Embedder {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config
            .endpoint()
            .map_err(|e| SearchError::Config(e.to_string()))?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size as usize,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            device: config.device,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// The execution device requests will run on, once resolved.
    #[inline]
    pub fn device(&self) -> ExecutionDevice {
        self.device
    }

    /// Startup health check: verifies the backend is reachable, that the
    /// configured model is installed (fatal otherwise, since no embeddings
    /// can be produced without it), and resolves the execution device.
    #[inline]
    pub fn ensure_ready(&mut self) -> Result<()> {
        self.ping()?;
        self.validate_model()?;
        self.resolve_device()?;

        info!(
            "embedding backend ready at {} (model {}, device {})",
            self.base_url, self.model, self.device
        );
        Ok(())
    }

    /// Check that the backend answers at all.
    #[inline]
    pub fn ping(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .map_err(|e| SearchError::Embedding(format!("Failed to build ping URL: {}", e)))?;

        debug!("Pinging embedding backend at {}", url);

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        debug!("Backend ping successful");
        Ok(())
    }

    /// Verify that the configured model is installed on the backend.
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let models = self.list_models()?;

        if models.iter().any(|m| m.name == self.model) {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            error!(
                "Model {} not found. Available models: {:?}",
                self.model, available
            );
            Err(SearchError::Embedding(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, available
            )))
        }
    }

    /// List all models installed on the backend.
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .map_err(|e| SearchError::Embedding(format!("Failed to build models URL: {}", e)))?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .map_err(|e| SearchError::Embedding(format!("Failed to parse models response: {}", e)))?;

        Ok(models_response.models)
    }

    /// Embed a single text. Used by the query path.
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_batch(&texts)?;
        vectors
            .pop()
            .ok_or_else(|| SearchError::Embedding("Backend returned no embedding".to_string()))
    }

    /// Embed many texts, order-preserving, one vector per input. Requests
    /// are issued in batches of `batch_size` and every vector is normalized
    /// to unit length.
    #[inline]
    pub fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            let mut batch_vectors = self.request_embeddings(batch, self.request_options())?;
            for vector in &mut batch_vectors {
                l2_normalize(vector);
            }
            vectors.extend(batch_vectors);
        }

        debug!("Generated {} embeddings total", vectors.len());
        Ok(vectors)
    }

    /// Resolve the execution device. A CPU pin and auto selection need no
    /// probing; an accelerated request is probed once, degrading to CPU
    /// execution with a warning when the accelerated path fails.
    fn resolve_device(&mut self) -> Result<()> {
        match self.device {
            ExecutionDevice::Auto => Ok(()),
            ExecutionDevice::Cpu => {
                debug!("Embedding requests pinned to CPU execution");
                Ok(())
            }
            ExecutionDevice::Gpu => {
                let probe = [String::from("ping")];
                match self.request_embeddings(&probe, self.request_options()) {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        warn!(
                            "Accelerated execution unavailable ({}), falling back to CPU",
                            e
                        );
                        self.device = ExecutionDevice::Cpu;
                        self.request_embeddings(&probe, self.request_options())
                            .map(|_| ())
                            .map_err(|e| {
                                SearchError::Embedding(format!(
                                    "Embedding probe failed after CPU fallback: {}",
                                    e
                                ))
                            })
                    }
                }
            }
        }
    }

    fn request_options(&self) -> Option<ModelOptions> {
        match self.device {
            ExecutionDevice::Cpu => Some(ModelOptions { num_gpu: 0 }),
            ExecutionDevice::Auto | ExecutionDevice::Gpu => None,
        }
    }

    /// Issue one embedding request for up to `batch_size` inputs.
    fn request_embeddings(
        &self,
        texts: &[String],
        options: Option<ModelOptions>,
    ) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
            options,
        };

        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| SearchError::Embedding(format!("Failed to build embedding URL: {}", e)))?;

        let request_json = serde_json::to_string(&request).map_err(|e| {
            SearchError::Embedding(format!("Failed to serialize embedding request: {}", e))
        })?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            SearchError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        if response.embeddings.len() != texts.len() {
            return Err(SearchError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                return Err(SearchError::Embedding(format!(
                                    "Client error: HTTP {}",
                                    status
                                )));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(SearchError::Embedding(format!(
                            "Non-retryable error: {}",
                            error
                        )));
                    }

                    last_error = Some(SearchError::Embedding(format!("Request error: {}", error)));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error
            .unwrap_or_else(|| SearchError::Embedding("Request failed after retries".to_string())))
    }
}

/// Normalize a vector to unit L2 length in place. Zero vectors are left
/// untouched.
#[inline]
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > NORM_EPSILON {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
