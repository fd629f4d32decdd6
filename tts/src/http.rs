//! HTTP synthesis client.
//!
//! Wire contract:
//! - `POST {base}/v1/tts` with a JSON [`SynthesisRequest`]; a 2xx response
//!   carries the encoded audio as body and its MIME type as `Content-Type`.
//!   An empty body or `204 No Content` means the service had nothing to say.
//! - `GET {base}/v1/voices` returns the voice catalog as a JSON array (or an
//!   object with a `voices` array).
//! - Errors are non-2xx responses with `{"error": {"message": ...}}`,
//!   `{"error": "..."}` or a plain text body.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    Client as ReqwestClient, Response, StatusCode,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fetcher::{Audio, AudioFetcher, SynthesisRequest, DEFAULT_MIME_TYPE};
use crate::voice::{sort_voices, Voice};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of retries.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Delay before the first retry; doubled on each further attempt.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

const USER_AGENT_VALUE: &str = concat!("lingua-tts-rust/", env!("CARGO_PKG_VERSION"));

/// [`AudioFetcher`] backed by a remote synthesis service.
pub struct HttpFetcher {
    client: ReqwestClient,
    base_url: String,
    api_key: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        HttpFetcherBuilder::new(base_url).build()
    }

    /// Creates a builder for more configuration options.
    pub fn builder(base_url: impl Into<String>) -> HttpFetcherBuilder {
        HttpFetcherBuilder::new(base_url)
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Synthesizes one request, retrying transient failures.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<Audio> {
        self.with_retry(|| self.do_synthesize(request)).await
    }

    /// Fetches the voice catalog offered by the service.
    pub async fn list_voices(&self) -> Result<Vec<Voice>> {
        let mut voices = self.with_retry(|| self.do_list_voices()).await?;
        sort_voices(&mut voices);
        Ok(voices)
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1x, 2x, 4x, ...
                let backoff = self.retry_backoff * (1u32 << (attempt - 1).min(16));
                debug!(attempt, ?backoff, "tts: retrying request");
                tokio::time::sleep(backoff).await;
            }

            match op().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() => {
                    warn!(attempt, error = %e, "tts: transient service error");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Other("max retries exceeded".to_string())))
    }

    async fn do_synthesize(&self, request: &SynthesisRequest) -> Result<Audio> {
        let url = format!("{}/v1/tts", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.default_headers("audio/*")?)
            .json(request)
            .send()
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Err(Error::NoAudioData);
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_MIME_TYPE)
            .to_string();
        let data = Self::success_body(response).await?;
        if data.is_empty() {
            return Err(Error::NoAudioData);
        }

        debug!(bytes = data.len(), mime = %mime_type, "tts: audio received");
        Ok(Audio::new(data, mime_type))
    }

    async fn do_list_voices(&self) -> Result<Vec<Voice>> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum VoicesResponse {
            List(Vec<Voice>),
            Wrapped { voices: Vec<Voice> },
        }

        let url = format!("{}/v1/voices", self.base_url);
        let response = self
            .client
            .get(&url)
            .headers(self.default_headers("application/json")?)
            .send()
            .await?;
        let body = Self::success_body(response).await?;

        match serde_json::from_slice::<VoicesResponse>(&body)? {
            VoicesResponse::List(voices) | VoicesResponse::Wrapped { voices } => Ok(voices),
        }
    }

    /// Returns default headers for API requests.
    fn default_headers(&self, accept: &'static str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| Error::Config(format!("invalid api key: {e}")))?,
            );
        }
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        Ok(headers)
    }

    /// Returns the body of a 2xx response, or the parsed error.
    async fn success_body(response: Response) -> Result<bytes::Bytes> {
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(parse_error(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl AudioFetcher for HttpFetcher {
    async fn fetch_audio(&self, request: &SynthesisRequest) -> Result<Audio> {
        self.synthesize(request).await
    }
}

/// Parses an error response body.
fn parse_error(status: StatusCode, body: &[u8]) -> Error {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorDetail {
        Message(String),
        Object { message: String },
    }

    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        let message = match parsed.error {
            ErrorDetail::Message(m) | ErrorDetail::Object { message: m } => m,
        };
        return Error::api(status.as_u16(), message);
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        text.to_string()
    };
    Error::api(status.as_u16(), message)
}

/// Builder for [`HttpFetcher`].
pub struct HttpFetcherBuilder {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl HttpFetcherBuilder {
    /// Creates a new builder.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    /// Sets the bearer token sent with every request. Empty keys are ignored.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    /// Sets the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum number of retries for transient errors.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the delay before the first retry.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Builds the fetcher.
    pub fn build(self) -> Result<HttpFetcher> {
        let base_url = self.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }

        let client = ReqwestClient::builder().timeout(self.timeout).build()?;

        Ok(HttpFetcher {
            client,
            base_url,
            api_key: self.api_key,
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
        })
    }
}
