//! WordPress REST API client
//!
//! Thin typed handles over `{site}/wp-json/wp/v2`, built on the shared
//! [`dispatch-core`](dispatch_core) request engine: Basic auth from a
//! username + application password, retries with backoff, `Retry-After`
//! handling on rate limits, and HTML/empty-body diagnosis for sites where
//! the REST interface is misconfigured.
//!
//! Updates deliberately go out as `POST` to the resource id and deletes
//! accept `force=true`, matching the upstream wire conventions exactly.
//!
//! # Quick Start
//!
//! ```no_run
//! use dispatch_wordpress::{ListParams, WordPress};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WordPress::builder()
//!     .site_url("https://example.com")
//!     .username("editor")
//!     .application_password("abcd efgh ijkl mnop")
//!     .build()?;
//!
//! let posts = client
//!     .posts()
//!     .list(ListParams::new().per_page(10).search("release"))
//!     .await?;
//! println!("{posts}");
//!
//! let created = client
//!     .posts()
//!     .create(serde_json::json!({"title": "Hello", "status": "draft"}))
//!     .await?;
//! println!("created post {}", created["id"]);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod validate;

pub use client::{
    ListParams, Media, MediaFields, Plugins, Resource, Settings, Users, WordPress,
    WordPressBuilder,
};

// Re-export the core types callers need to build references and handle errors.
pub use dispatch_core::{Error, FileReference, FileSpec, RetryConfig};
