//! s3file
//!
//! Direct-to-S3 file upload widget orchestration.
//!
//! A widget asks the application server for a signed upload grant, posts
//! the selected file straight to storage with it, and stores the resulting
//! object URL where the enclosing form submits it. While any widget is
//! uploading, form submission stays disabled.
//!
//! The crate also ships the server side: a policy signer and the HTTP
//! endpoint that hands grants to widgets.
//!
//! # Example
//!
//! ```no_run
//! use s3file::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod gate;
pub mod metrics;
pub mod server;
pub mod signer;
pub mod transport;
pub mod upload;
pub mod widget;

// Re-export commonly used types
pub use config::Config;
pub use gate::SubmissionGate;
pub use server::Server;
pub use upload::{SelectedFile, UploadError, UploadOutcome};
pub use widget::{UploadContext, Widget, WidgetRegistry, WidgetState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
