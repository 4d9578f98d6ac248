//! Transactional email client for the SendGrid v3 API
//!
//! Thin client over `POST /mail/send`, built on the shared
//! [`dispatch-core`](dispatch_core) request engine: retries with backoff,
//! honors `Retry-After` on rate limits, redacts credentials from every log
//! line and error, and resolves attachment references (paths, inline
//! content, URLs) through the bounded file resolver.
//!
//! # Quick Start
//!
//! ```no_run
//! use dispatch_sendgrid::{MailMessage, SendGrid};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SendGrid::new("SG.your-api-key")?;
//!
//! let message = MailMessage::new("sender@example.com")
//!     .to("rcpt@example.com")
//!     .subject("Hello")
//!     .text("Plain-text body")
//!     .html("<p>Rich body</p>");
//!
//! let message_id = client.send(&message, &[]).await?;
//! println!("accepted as {message_id}");
//! # Ok(())
//! # }
//! ```

mod client;
mod mail;

pub use client::{SendGrid, SendGridBuilder};
pub use mail::{MailMessage, Recipient};

// Re-export the core types callers need to build references and handle errors.
pub use dispatch_core::{Error, FileReference, FileSpec, RetryConfig};
