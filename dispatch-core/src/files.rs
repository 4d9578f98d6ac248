//! Bounded resolution of heterogeneous file references
//!
//! Callers hand over whatever describes a file — a local path, inline
//! content, a remote URL, or an indirect upload id — and get back a local
//! file with a known lifetime. Downloads are size-capped both by the declared
//! `Content-Length` and by the bytes actually streamed, so a server that
//! omits or lies about the header cannot fill the disk.

use crate::error::Error;
use crate::redact::redact;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::StreamExt;
use log::debug;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum size of a resolved download (10 MiB)
pub const MAX_DOWNLOAD_SIZE: u64 = 10 * 1024 * 1024;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// A file reference as accepted by [`FileResolver::resolve`]
///
/// Either a bare string (filesystem path or `http(s)` URL) or a mapping with
/// the conventional keys.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FileReference {
    /// A path or URL string
    Location(String),
    /// A structured reference
    Spec(FileSpec),
}

impl From<&str> for FileReference {
    fn from(value: &str) -> Self {
        FileReference::Location(value.to_string())
    }
}

impl From<String> for FileReference {
    fn from(value: String) -> Self {
        FileReference::Location(value)
    }
}

impl From<FileSpec> for FileReference {
    fn from(value: FileSpec) -> Self {
        FileReference::Spec(value)
    }
}

/// Structured file reference
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileSpec {
    /// Existing local file path
    #[serde(default)]
    pub path: Option<String>,

    /// Remote URL to download
    #[serde(default)]
    pub url: Option<String>,

    /// Inline content: strict base64, or raw text taken as UTF-8 bytes
    #[serde(default, alias = "data")]
    pub content: Option<String>,

    /// File name used for temp-file suffix inference
    #[serde(default, alias = "name")]
    pub filename: Option<String>,

    /// Declared MIME type, used for suffix inference when no filename is given
    #[serde(default)]
    pub mime_type: Option<String>,

    /// Platform upload id, expanded against the resolver's upload base URL
    #[serde(default)]
    pub upload_file_id: Option<String>,

    /// Extra headers attached to the download request only
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,

    /// Authorization header value attached to the download request only
    #[serde(default, alias = "auth")]
    pub authorization: Option<String>,
}

/// A file reference materialized on the local filesystem
///
/// `owned` marks files the resolver created (and [`Self::cleanup`] will
/// delete); pre-existing local paths are left untouched.
#[derive(Debug)]
pub struct ResolvedFile {
    path: PathBuf,
    owned: bool,
}

impl ResolvedFile {
    /// Local path, valid until [`Self::cleanup`] is called
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the resolver created this file and cleanup will delete it
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Release the file. Never fails: deletion errors are swallowed and a
    /// file already gone is not an error.
    pub fn cleanup(self) {
        if self.owned {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Turns [`FileReference`]s into local, size-capped files
///
/// The temporary directory is an explicit dependency: concurrent resolvers
/// may share one since every temp file gets a uniquely generated name.
#[derive(Debug, Clone)]
pub struct FileResolver {
    client: reqwest::Client,
    temp_dir: PathBuf,
    upload_base: Option<String>,
    max_size: u64,
}

impl FileResolver {
    /// Create a resolver writing temporary files into `temp_dir`
    pub fn new(temp_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            temp_dir: temp_dir.into(),
            upload_base: None,
            max_size: MAX_DOWNLOAD_SIZE,
        })
    }

    /// Use a custom transport client for downloads
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Configure the base URL that `upload_file_id` references expand against
    pub fn upload_base(mut self, base: impl Into<String>) -> Self {
        self.upload_base = Some(base.into());
        self
    }

    /// Override the download size cap (default [`MAX_DOWNLOAD_SIZE`])
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    /// Resolve one reference into a local file
    pub async fn resolve(&self, reference: &FileReference) -> Result<ResolvedFile, Error> {
        match reference {
            FileReference::Location(value) => self.resolve_location(value).await,
            FileReference::Spec(spec) => self.resolve_spec(spec).await,
        }
    }

    /// Resolve a batch of references, releasing already-resolved files if a
    /// later one fails
    pub async fn resolve_all(&self, references: &[FileReference]) -> Result<Vec<ResolvedFile>, Error> {
        let mut resolved = Vec::with_capacity(references.len());
        for reference in references {
            match self.resolve(reference).await {
                Ok(file) => resolved.push(file),
                Err(err) => {
                    for file in resolved {
                        file.cleanup();
                    }
                    return Err(err);
                }
            }
        }
        Ok(resolved)
    }

    async fn resolve_location(&self, value: &str) -> Result<ResolvedFile, Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::File("file path is empty".to_string()));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return self.download(trimmed, None, None).await;
        }

        let expanded = shellexpand::tilde(trimmed);
        let path = PathBuf::from(expanded.as_ref());
        if !path.is_file() {
            return Err(Error::File(format!("{trimmed} is not a file")));
        }
        Ok(ResolvedFile { path, owned: false })
    }

    async fn resolve_spec(&self, spec: &FileSpec) -> Result<ResolvedFile, Error> {
        if let Some(path) = nonempty(&spec.path) {
            return self.resolve_location(path).await;
        }

        if let Some(content) = nonempty(&spec.content) {
            let payload = coerce_bytes(content);
            return self.write_temp(&payload, infer_suffix(spec).as_deref());
        }

        if let Some(url) = nonempty(&spec.url) {
            return self.download(url, Some(spec), infer_suffix(spec).as_deref()).await;
        }

        if let Some(id) = nonempty(&spec.upload_file_id) {
            let base = self.upload_base.as_deref().ok_or_else(|| {
                Error::File(
                    "reference uses upload_file_id but no upload base URL is configured".to_string(),
                )
            })?;
            let url = format!("{}/{}", base.trim_end_matches('/'), id);
            return self.download(&url, Some(spec), infer_suffix(spec).as_deref()).await;
        }

        Err(Error::File(
            "file reference has none of path, url, content, or upload_file_id".to_string(),
        ))
    }

    fn write_temp(&self, payload: &[u8], suffix: Option<&str>) -> Result<ResolvedFile, Error> {
        let mut file = tempfile::Builder::new()
            .suffix(suffix.unwrap_or(""))
            .tempfile_in(&self.temp_dir)
            .map_err(|e| Error::File(format!("failed to create temporary file: {e}")))?;

        file.write_all(payload)
            .map_err(|e| Error::File(format!("failed to write temporary file: {e}")))?;

        let (handle, path) = file
            .keep()
            .map_err(|e| Error::File(format!("failed to keep temporary file: {e}")))?;
        drop(handle);
        Ok(ResolvedFile { path, owned: true })
    }

    async fn download(
        &self,
        url: &str,
        spec: Option<&FileSpec>,
        suffix: Option<&str>,
    ) -> Result<ResolvedFile, Error> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(Error::File("file URL is empty".to_string()));
        }

        let mut request = self.client.get(trimmed);
        if let Some(spec) = spec {
            if let Some(headers) = &spec.headers {
                for (key, value) in headers {
                    if !key.trim().is_empty() {
                        request = request.header(key.trim(), value.as_str());
                    }
                }
            }
            if let Some(auth) = nonempty(&spec.authorization) {
                request = request.header(reqwest::header::AUTHORIZATION, auth);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::File(redact(&format!("download from {trimmed} failed: {e}"))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::File(format!(
                "download from {trimmed} failed with HTTP {}",
                status.as_u16()
            )));
        }

        // Fail fast on a declared oversize before opening any file.
        if let Some(length) = response.content_length() {
            if length > self.max_size {
                return Err(Error::File(format!(
                    "file is too large ({length} bytes); the limit is {} bytes",
                    self.max_size
                )));
            }
        }

        // The temp file deletes itself on drop, which covers every early
        // return below; only the success path keeps it.
        let mut file = tempfile::Builder::new()
            .suffix(suffix.unwrap_or(""))
            .tempfile_in(&self.temp_dir)
            .map_err(|e| Error::File(format!("failed to create temporary file: {e}")))?;

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                Error::File(redact(&format!("download from {trimmed} was interrupted: {e}")))
            })?;

            downloaded += chunk.len() as u64;
            if downloaded > self.max_size {
                return Err(Error::File(format!(
                    "download exceeded the size limit of {} bytes",
                    self.max_size
                )));
            }

            file.write_all(&chunk)
                .map_err(|e| Error::File(format!("failed to write downloaded chunk: {e}")))?;
        }

        let (handle, path) = file
            .keep()
            .map_err(|e| Error::File(format!("failed to keep temporary file: {e}")))?;
        drop(handle);

        debug!("downloaded {downloaded} bytes to {}", path.display());
        Ok(ResolvedFile { path, owned: true })
    }
}

/// Inline content is strict base64 when it decodes, raw UTF-8 bytes otherwise.
fn coerce_bytes(value: &str) -> Vec<u8> {
    let stripped = value.trim();
    match STANDARD.decode(stripped) {
        Ok(bytes) => bytes,
        Err(_) => stripped.as_bytes().to_vec(),
    }
}

/// Temp-file suffix from the supplied filename, falling back to the declared
/// MIME type, falling back to none.
fn infer_suffix(spec: &FileSpec) -> Option<String> {
    if let Some(filename) = nonempty(&spec.filename) {
        if let Some(ext) = Path::new(filename).extension().and_then(|e| e.to_str()) {
            return Some(format!(".{ext}"));
        }
    }
    if let Some(mime) = nonempty(&spec.mime_type) {
        if let Some(ext) = mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first()) {
            return Some(format!(".{ext}"));
        }
    }
    None
}

fn nonempty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
