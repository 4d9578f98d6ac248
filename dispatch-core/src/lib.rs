//! Shared HTTP core for the dispatch API clients
//!
//! This crate owns the failure-handling and resource-management pieces that
//! the `dispatch-wordpress` and `dispatch-sendgrid` clients have in common:
//!
//! - a retrying request [`Engine`] with deterministic exponential backoff and
//!   `Retry-After`-aware rate-limit handling, parameterized by an
//!   authentication strategy ([`Credentials`]);
//! - response classification and structured error extraction that never
//!   panics on hostile bodies ([`classify`]);
//! - a secret [`redact`](redact()) pass applied to every piece of text that
//!   can reach a log line or error message;
//! - a bounded, streaming [`FileResolver`] that turns heterogeneous file
//!   references into local, size-capped files with guaranteed cleanup.
//!
//! # Quick Start
//!
//! ```no_run
//! use dispatch_core::{Credentials, Engine, RequestSpec};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::builder()
//!     .base_url("https://example.com/wp-json/wp/v2")
//!     .credentials(Credentials::Basic {
//!         username: "editor".to_string(),
//!         password: "app-password".to_string(),
//!     })
//!     .build()?;
//!
//! let response = engine.execute(&RequestSpec::get("/posts")).await?;
//! let posts = response.json()?;
//! println!("{posts}");
//! # Ok(())
//! # }
//! ```

pub mod classify;
mod engine;
mod error;
mod files;
mod redact;

pub use classify::{classify_status, extract_error_message, Classification};
pub use engine::{ApiResponse, Credentials, Engine, EngineBuilder, MultipartSpec, RequestSpec};
pub use error::{Error, RetryConfig, RETRYABLE_STATUSES};
pub use files::{FileReference, FileResolver, FileSpec, ResolvedFile, MAX_DOWNLOAD_SIZE};
pub use redact::redact;
