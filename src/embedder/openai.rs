/// OpenAI-compatible embeddings client.
///
/// Blocking on purpose: the [`Embedder`] trait is synchronous, and async
/// callers hop onto `spawn_blocking` before calling in.
use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Embedder, EmbedderError};

/// Output size of `text-embedding-3-small` when no override is configured.
const DEFAULT_DIMENSIONS: usize = 1536;

/// Settings for [`OpenAiEmbedder::new`].
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderOptions {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimensions: Option<usize>,
    pub timeout: Duration,
    pub max_retries: usize,
    pub batch_size: usize,
}

pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(options: OpenAiEmbedderOptions) -> Result<Self, EmbedderError> {
        if options.api_key.trim().is_empty() {
            return Err(EmbedderError::Misconfigured(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        if options.model.trim().is_empty() {
            return Err(EmbedderError::Misconfigured(
                "missing embedding model name".to_string(),
            ));
        }
        if options.batch_size == 0 {
            return Err(EmbedderError::Misconfigured(
                "batch_size must be positive".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", options.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| EmbedderError::Misconfigured("invalid API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(options.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbedderError::Misconfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: embeddings_endpoint(&options.base_url),
            model: options.model,
            dimensions: options.dimensions,
            max_retries: options.max_retries,
            batch_size: options.batch_size,
        })
    }

    /// Send one transport batch, retrying throttling and transient failures.
    fn request_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
                dimensions: self.dimensions,
            };
            match self.client.post(&self.endpoint).json(&request).send() {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp
                            .json()
                            .map_err(|e| EmbedderError::InvalidResponse(e.to_string()))?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != inputs.len() {
                            return Err(EmbedderError::InvalidResponse(format!(
                                "{} embeddings returned for {} inputs",
                                parsed.data.len(),
                                inputs.len()
                            )));
                        }
                        return Ok(parsed.data.into_iter().map(|d| d.embedding).collect());
                    }

                    let body = resp
                        .text()
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && can_retry(attempt, self.max_retries) {
                        attempt += 1;
                        warn!(%status, attempt, "embedding request throttled or failed, retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(EmbedderError::RequestFailed(format!("{status}: {body}")));
                }
                Err(err) => {
                    if (err.is_timeout() || err.is_connect()) && can_retry(attempt, self.max_retries) {
                        attempt += 1;
                        warn!(error = %err, attempt, "embedding transport error, retrying");
                        thread::sleep(retry_backoff(attempt));
                        continue;
                    }
                    return Err(EmbedderError::RequestFailed(err.to_string()));
                }
            }
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(inputs = batch.len(), model = %self.model, "requesting embeddings");
            vectors.extend(self.request_batch(batch)?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions.unwrap_or(DEFAULT_DIMENSIONS)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn embeddings_endpoint(base_url: &str) -> String {
    let normalized = base_url.trim_end_matches('/');
    if normalized.ends_with("/embeddings") {
        normalized.to_string()
    } else {
        format!("{normalized}/embeddings")
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// `max_retries` counts retries after the first attempt.
fn can_retry(retries_so_far: usize, max_retries: usize) -> bool {
    retries_so_far < max_retries
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
