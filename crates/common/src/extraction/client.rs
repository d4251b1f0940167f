//! Citation extraction provider abstraction
//!
//! Providers turn a stored document (by media id) into raw citation spans:
//! the literal citing text plus a textual hint naming the cited document.
//! Resolution of hints against the case roster happens in the orchestrator,
//! not here.

use crate::config::ExtractorConfig;
use crate::db::Rectangle;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A raw citation occurrence reported by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationSpan {
    /// Textual hint naming the cited document ("Exhibit 3", "Exh. B")
    pub destination_hint: String,

    /// The literal citing text as it appears in the source
    pub source_text: String,

    pub source_page_number: Option<i32>,
    pub source_rectangle: Option<Rectangle>,
    pub destination_page_number: Option<i32>,
}

/// Trait for citation extraction providers
#[async_trait]
pub trait CitationExtractor: Send + Sync {
    /// Extract all citation spans from the document behind `media_id`
    async fn extract(&self, media_id: &str) -> Result<Vec<CitationSpan>>;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}

/// Trait for supplying credentials to the HTTP provider
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String>;
}

/// Fixed token taken from configuration
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn bearer_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// HTTP extraction client
pub struct HttpExtractor {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Serialize)]
struct ExtractRequest<'a> {
    media_id: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponse {
    spans: Vec<CitationSpan>,
}

impl HttpExtractor {
    /// Create a new HTTP extraction client
    pub fn new(
        base_url: String,
        credentials: Arc<dyn CredentialProvider>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Self {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            credentials,
            base_url,
            timeout,
            max_retries,
        }
    }

    /// Make request with retry
    async fn request_with_retry(&self, media_id: &str) -> Result<Vec<CitationSpan>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(media_id).await {
                Ok(spans) => return Ok(spans),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Extraction request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Extractor {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, media_id: &str) -> Result<Vec<CitationSpan>> {
        let url = format!("{}/v1/extract-citations", self.base_url);
        let token = self.credentials.bearer_token().await?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&ExtractRequest { media_id })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::ExtractorTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::Extractor {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Extractor {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ExtractResponse =
            response.json().await.map_err(|e| AppError::Extractor {
                message: format!("Failed to parse response: {}", e),
            })?;

        Ok(result.spans)
    }
}

#[async_trait]
impl CitationExtractor for HttpExtractor {
    async fn extract(&self, media_id: &str) -> Result<Vec<CitationSpan>> {
        self.request_with_retry(media_id).await
    }

    fn provider_name(&self) -> &str {
        "http"
    }
}

/// Mock extractor for testing
///
/// Replies are popped from a queue; when the queue is empty the default
/// span set is returned. Call counts are tracked for assertions.
#[derive(Default)]
pub struct MockExtractor {
    default_spans: Vec<CitationSpan>,
    queue: Mutex<VecDeque<Result<Vec<CitationSpan>>>>,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that always replies with the given spans
    pub fn with_spans(spans: Vec<CitationSpan>) -> Self {
        Self {
            default_spans: spans,
            ..Self::default()
        }
    }

    /// Queue a one-shot reply, consumed ahead of the default spans
    pub fn enqueue(&self, reply: Result<Vec<CitationSpan>>) {
        self.queue.lock().unwrap().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CitationExtractor for MockExtractor {
    async fn extract(&self, _media_id: &str) -> Result<Vec<CitationSpan>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reply) = self.queue.lock().unwrap().pop_front() {
            return reply;
        }
        Ok(self.default_spans.clone())
    }

    fn provider_name(&self) -> &str {
        "mock"
    }
}

/// Create an extractor based on configuration
pub fn create_extractor(config: &ExtractorConfig) -> Arc<dyn CitationExtractor> {
    match config.provider.as_str() {
        "http" => {
            let base_url = config
                .base_url
                .clone()
                .expect("Extractor base URL required for the http provider");
            let token = config
                .api_token
                .clone()
                .expect("Extractor API token required for the http provider");
            Arc::new(HttpExtractor::new(
                base_url,
                Arc::new(StaticCredential::new(token)),
                config.timeout_secs,
                config.max_retries,
            ))
        }
        "mock" => Arc::new(MockExtractor::new()),
        other => {
            tracing::warn!(provider = other, "Unknown extraction provider, using mock");
            Arc::new(MockExtractor::new())
        }
    }
}
