//! Retrying request engine shared by the dispatch API clients

use crate::classify::{self, Classification};
use crate::error::{Error, RetryConfig};
use crate::redact::redact;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use std::collections::HashMap;
use std::time::Duration;

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Credentials
// ============================================================================

/// Authentication strategy for a client
///
/// The engine derives the Authorization header from this at dispatch time;
/// secret material never travels in a request's path or query.
#[derive(Clone)]
pub enum Credentials {
    /// Single API key sent as `Authorization: Bearer {key}`
    Bearer(String),

    /// Username + application password sent as HTTP Basic auth
    Basic { username: String, password: String },
}

impl Credentials {
    pub(crate) fn authorization_value(&self) -> Result<HeaderValue, Error> {
        let raw = match self {
            Credentials::Bearer(key) => format!("Bearer {key}"),
            Credentials::Basic { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                format!("Basic {encoded}")
            }
        };
        let mut value = HeaderValue::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid credential material: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// One logical API call: method, relative path, and optional payloads
///
/// Immutable once handed to [`Engine::execute`]. The path and query must not
/// carry secret material; the engine adds the Authorization header itself.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    multipart: Option<MultipartSpec>,
}

impl RequestSpec {
    /// Create a request with an explicit method
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            multipart: None,
        }
    }

    /// GET request for `path`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// POST request for `path`
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// DELETE request for `path`
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a JSON body
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set a multipart file payload
    ///
    /// When present, no default Content-Type is set; the transport picks its
    /// own boundary.
    pub fn multipart(mut self, part: MultipartSpec) -> Self {
        self.multipart = Some(part);
        self
    }

    /// The request path, relative to the engine's base URL
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// A multipart file upload: one `file` part plus optional form fields
///
/// Holds owned bytes rather than a transport form so the form can be rebuilt
/// for every retry attempt.
#[derive(Debug, Clone)]
pub struct MultipartSpec {
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
    fields: Vec<(String, String)>,
}

impl MultipartSpec {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
            fields: Vec::new(),
        }
    }

    /// Add a text form field alongside the file part
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    fn to_form(&self) -> Result<reqwest::multipart::Form, Error> {
        let part = reqwest::multipart::Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime_type)
            .map_err(|e| Error::Config(format!("invalid MIME type {:?}: {e}", self.mime_type)))?;

        let mut form = reqwest::multipart::Form::new().part("file", part);
        for (key, value) in &self.fields {
            form = form.text(key.clone(), value.clone());
        }
        Ok(form)
    }
}

/// A completed, non-fatal HTTP response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code (always < 400)
    pub status: u16,

    /// Response headers, keyed by lowercase name
    pub headers: HashMap<String, String>,

    /// Raw response body
    pub body: String,
}

impl ApiResponse {
    /// Get a header value by (case-insensitive) name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// Parse the body as JSON through the response classifier
    ///
    /// Empty bodies and HTML diagnostic pages surface as
    /// [`Error::Malformed`] with a root-cause hint, not as parse panics.
    pub fn json(&self) -> Result<serde_json::Value, Error> {
        classify::parse_json(self)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Retrying HTTP request engine
///
/// Owns one transport client and the credential material for a single API.
/// Calls are sequential; clone the engine (cheap, shared connection pool) to
/// use it from more than one task.
#[derive(Clone)]
pub struct Engine {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    retry: RetryConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Engine {
    /// Create a builder for engine configuration
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request, retrying transient failures with backoff
    ///
    /// Deterministic in attempt count: at most `max_retries + 1` dispatches.
    /// Retryable statuses (408, 425, 429, 500, 502, 503, 504) and transport
    /// failures are retried while budget remains; any other status ≥ 400 is
    /// fatal immediately, regardless of remaining budget.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<ApiResponse, Error> {
        let url = format!("{}{}", self.base_url, spec.path);
        let auth = self.credentials.authorization_value()?;
        let mut last_failure: Option<Error> = None;

        for attempt in 0..=self.retry.max_retries {
            let mut headers = HeaderMap::new();
            headers.insert(AUTHORIZATION, auth.clone());
            if spec.multipart.is_none() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }

            debug!(
                "{} {} (attempt {}/{}), authorization: {}",
                spec.method,
                url,
                attempt + 1,
                self.retry.max_retries + 1,
                redact(auth.to_str().unwrap_or("<non-ascii>")),
            );

            let mut request = self
                .client
                .request(spec.method.clone(), url.as_str())
                .headers(headers);
            if !spec.query.is_empty() {
                request = request.query(&spec.query);
            }
            if let Some(body) = &spec.body {
                request = request.json(body);
            }
            if let Some(part) = &spec.multipart {
                request = request.multipart(part.to_form()?);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    let failure = Error::Transport(redact(&err.to_string()));
                    if attempt < self.retry.max_retries {
                        let delay = self.retry.backoff_delay(attempt);
                        warn!("request to {url} failed ({failure}), retrying in {delay:?}");
                        last_failure = Some(failure);
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(failure);
                }
            };

            let status = response.status().as_u16();
            match classify::classify_status(status) {
                Classification::Retryable { .. } if attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt, status, response.headers());
                    warn!("{} {url} returned {status}, retrying in {delay:?}", spec.method);
                    last_failure = Some(Error::Api {
                        status,
                        message: format!("HTTP {status}"),
                        body: String::new(),
                    });
                    tokio::time::sleep(delay).await;
                }
                Classification::Success => {
                    let headers = collect_headers(&response);
                    let body = response
                        .text()
                        .await
                        .map_err(|e| Error::Transport(redact(&e.to_string())))?;
                    return Ok(ApiResponse {
                        status,
                        headers,
                        body,
                    });
                }
                // Fatal status, or a retryable one with the budget exhausted.
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    let message = classify::extract_error_message(status, &body);
                    let preview = classify::body_preview(&body);
                    error!("{} {url} failed with {status}: {message}", spec.method);
                    return Err(Error::Api {
                        status,
                        message,
                        body: preview,
                    });
                }
            }
        }

        Err(last_failure
            .unwrap_or_else(|| Error::Transport("request failed after exhausting retries".to_string())))
    }
}

fn collect_headers(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|v| (k.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Builder for [`Engine`] configuration
///
/// `base_url` and `credentials` are required; call [`Self::build`] to create
/// the engine.
pub struct EngineBuilder {
    base_url: Option<String>,
    credentials: Option<Credentials>,
    timeout: Option<Duration>,
    retry: Option<RetryConfig>,
}

impl EngineBuilder {
    fn new() -> Self {
        Self {
            base_url: None,
            credentials: None,
            timeout: None,
            retry: None,
        }
    }

    /// Set the base URL requests are resolved against
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the credential material
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the per-attempt request timeout (default: 30s)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the maximum number of retries (default: 2)
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        let mut retry = self.retry.take().unwrap_or_default();
        retry.max_retries = max_retries;
        self.retry = Some(retry);
        self
    }

    /// Set the full retry configuration
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<Engine, Error> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base URL is required".to_string()))?;
        let credentials = self
            .credentials
            .ok_or_else(|| Error::Config("credentials are required".to_string()))?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Engine {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            retry: self.retry.unwrap_or_default(),
        })
    }
}
