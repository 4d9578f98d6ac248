//! SendGrid v3 API client

use crate::mail::MailMessage;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dispatch_core::{
    Credentials, Engine, Error, FileReference, FileResolver, RequestSpec, ResolvedFile, RetryConfig,
};
use log::{debug, info};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default API base URL
const DEFAULT_API_BASE: &str = "https://api.sendgrid.com/v3";

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// SendGrid transactional mail client
///
/// Authenticates with a single API key sent as a Bearer token. The only
/// endpoint exercised is `POST /mail/send`, which acknowledges with 202 and
/// an empty body; the message identifier travels in the `X-Message-Id`
/// response header.
#[derive(Debug, Clone)]
pub struct SendGrid {
    engine: Engine,
    resolver: FileResolver,
}

impl SendGrid {
    /// Create a client with an explicit API key and default configuration
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::builder().api_key(api_key).build()
    }

    /// Create a builder for client configuration
    pub fn builder() -> SendGridBuilder {
        SendGridBuilder::new()
    }

    /// The API base URL this client talks to
    pub fn base_url(&self) -> &str {
        self.engine.base_url()
    }

    /// Send a transactional email, optionally with attachments
    ///
    /// Attachment references are materialized through the bounded file
    /// resolver and released again whether or not the send succeeds. Returns
    /// the message identifier reported by the gateway, or a synthetic
    /// `msg_{timestamp}` identifier when the header is missing.
    pub async fn send(
        &self,
        message: &MailMessage,
        attachments: &[FileReference],
    ) -> Result<String, Error> {
        let resolved = self.resolver.resolve_all(attachments).await?;
        let result = self.send_resolved(message, &resolved).await;
        for file in resolved {
            file.cleanup();
        }
        result
    }

    async fn send_resolved(
        &self,
        message: &MailMessage,
        files: &[ResolvedFile],
    ) -> Result<String, Error> {
        let mut attachments = Vec::with_capacity(files.len());
        for file in files {
            attachments.push(encode_attachment(file).await?);
        }

        let payload = message.to_payload(&attachments)?;
        debug!("sending mail with {} attachment(s)", attachments.len());

        let response = self
            .engine
            .execute(&RequestSpec::post("/mail/send").json(payload))
            .await?;

        let message_id = match response.header("x-message-id") {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => {
                let seconds = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_secs())
                    .unwrap_or(0);
                format!("msg_{seconds}")
            }
        };
        info!("mail accepted with message id {message_id}");
        Ok(message_id)
    }
}

/// Read a resolved file and encode it as a SendGrid attachment object.
async fn encode_attachment(file: &ResolvedFile) -> Result<Value, Error> {
    let path = file.path();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Error::File(format!("failed to read attachment {}: {e}", path.display())))?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("attachment")
        .to_string();
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    Ok(json!({
        "content": STANDARD.encode(&bytes),
        "filename": filename,
        "type": mime_type,
        "disposition": "attachment",
    }))
}

/// Builder for [`SendGrid`] client configuration
pub struct SendGridBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    temp_dir: Option<PathBuf>,
}

impl SendGridBuilder {
    fn new() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout: None,
            retry: None,
            temp_dir: None,
        }
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the API base URL (default: `https://api.sendgrid.com/v3`)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout (default: 15s)
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

    /// Directory for temporary files created while resolving attachments
    /// (default: the system temp directory)
    pub fn temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    /// Build the client
    pub fn build(self) -> Result<SendGrid, Error> {
        let api_key = self
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("API key is required".to_string()))?;

        let mut builder = Engine::builder()
            .base_url(self.base_url.unwrap_or_else(|| DEFAULT_API_BASE.to_string()))
            .credentials(Credentials::Bearer(api_key.trim().to_string()))
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT));
        if let Some(retry) = self.retry {
            builder = builder.retry_config(retry);
        }

        let temp_dir = self.temp_dir.unwrap_or_else(std::env::temp_dir);
        Ok(SendGrid {
            engine: builder.build()?,
            resolver: FileResolver::new(temp_dir)?,
        })
    }
}


#[cfg(test)]
mod wiremock_tests {
    use super::*;
    use crate::mail::Recipient;
    use dispatch_core::FileSpec;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_retries(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(10),
        }
    }

    fn client_for(server: &MockServer, retry: RetryConfig) -> SendGrid {
        SendGrid::builder()
            .api_key("SG.test-key")
            .base_url(server.uri())
            .retry_config(retry)
            .build()
            .unwrap()
    }

    fn message() -> MailMessage {
        MailMessage::new(Recipient::named("sender@example.com", "Sender"))
            .to("rcpt@example.com")
            .subject("Hello")
            .text("Hi there")
    }

    #[tokio::test]
    async fn test_send_returns_message_id_from_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail/send"))
            .and(header("authorization", "Bearer SG.test-key"))
            .and(body_partial_json(serde_json::json!({
                "subject": "Hello",
                "from": {"email": "sender@example.com"},
            })))
            .respond_with(ResponseTemplate::new(202).insert_header("x-message-id", "abc123"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retries(0));
        let id = client.send(&message(), &[]).await.unwrap();
        assert_eq!(id, "abc123");
    }

    #[tokio::test]
    async fn test_send_synthesizes_message_id_when_header_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail/send"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retries(0));
        let id = client.send(&message(), &[]).await.unwrap();
        assert!(id.starts_with("msg_"), "got {id}");
    }

    #[tokio::test]
    async fn test_send_retries_through_503() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/mail/send"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mail/send"))
            .respond_with(ResponseTemplate::new(202).insert_header("x-message-id", "retry-ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retries(1));
        let id = client.send(&message(), &[]).await.unwrap();
        assert_eq!(id, "retry-ok");
    }

    #[tokio::test]
    async fn test_send_surfaces_field_errors_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail/send"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "errors": [
                    {"message": "does not contain a valid address", "field": "from.email"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, fast_retries(3));
        let err = client.send(&message(), &[]).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("from.email"));
        assert!(text.contains("valid address"));
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_invalid_recipients_fail_before_the_network() {
        let server = MockServer::start().await;
        // No mock mounted: any request would 404 and fail differently.
        let client = client_for(&server, fast_retries(0));

        let message = MailMessage::new("sender@example.com").to("not-an-email");
        let err = client.send(&message, &[]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attachments_are_encoded_and_cleaned_up() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail/send"))
            .respond_with(ResponseTemplate::new(202).insert_header("x-message-id", "with-files"))
            .expect(1)
            .mount(&server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let client = SendGrid::builder()
            .api_key("SG.test-key")
            .base_url(server.uri())
            .temp_dir(temp_dir.path())
            .retry_config(fast_retries(0))
            .build()
            .unwrap();

        let reference = FileReference::Spec(FileSpec {
            content: Some("aGVsbG8gd29ybGQ=".to_string()),
            filename: Some("note.txt".to_string()),
            ..FileSpec::default()
        });
        let id = client.send(&message(), &[reference]).await.unwrap();
        assert_eq!(id, "with-files");

        // Resolver-created temp files are released after the send.
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let attachment = &body["attachments"][0];
        assert_eq!(attachment["content"], "aGVsbG8gd29ybGQ=");
        assert_eq!(attachment["type"], "text/plain");
        assert_eq!(attachment["disposition"], "attachment");
        assert_eq!(
            body["personalizations"][0]["to"][0]["email"],
            "rcpt@example.com"
        );
    }

    #[tokio::test]
    async fn test_resolution_failure_aborts_before_send() {
        let server = MockServer::start().await;
        let client = client_for(&server, fast_retries(0));

        let reference = FileReference::Spec(FileSpec::default());
        let err = client.send(&message(), &[reference]).await.unwrap_err();
        assert!(matches!(err, Error::File(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
