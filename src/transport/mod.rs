//! Transport module
//!
//! One asynchronous HTTP request at a time, with caller-supplied headers,
//! optional upload-progress reporting and exactly one terminal result.
//!
//! # Example
//!
//! ```no_run
//! use s3file::config::TransportConfig;
//! use s3file::transport::{HttpTransport, Payload, Transport, TransportRequest, TransportResult};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(&TransportConfig::default())?;
//!
//! let request = TransportRequest::post("https://example.com/s3file/sign/")
//!     .with_payload(Payload::Fields(vec![
//!         ("name".into(), "cat.png".into()),
//!         ("type".into(), "image/png".into()),
//!     ]));
//!
//! match transport.send(request, None).await {
//!     TransportResult::Completed { status, body } => println!("{}: {}", status, body),
//!     TransportResult::Failure(reason) => println!("failed: {}", reason),
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod http;

pub use self::http::HttpTransport;
pub use reqwest::Method;

/// Transport construction errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// A file carried by a multipart payload
#[derive(Clone)]
pub struct FilePart {
    /// Form field the bytes are sent under
    pub field_name: String,
    pub file_name: String,
    /// May be empty when the host could not determine a type
    pub mime_type: String,
    pub content: Bytes,
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field_name", &self.field_name)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Request payload
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` fields
    Fields(Vec<(String, String)>),
    /// `multipart/form-data`: text fields in order, then the file if any
    Multipart {
        fields: Vec<(String, String)>,
        file: Option<FilePart>,
    },
}

/// A single outgoing request
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub payload: Payload,
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            payload: Payload::Empty,
            headers: Vec::new(),
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Upload progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Fraction { loaded: u64, total: u64 },
    /// The channel cannot measure how much has been sent
    Indeterminate,
}

impl Progress {
    /// Whole percentage sent, rounded to nearest. `None` when not computable.
    pub fn percent(&self) -> Option<u8> {
        match *self {
            Progress::Fraction { total: 0, .. } | Progress::Indeterminate => None,
            Progress::Fraction { loaded, total } => {
                let loaded = loaded.min(total) as f64;
                Some((loaded * 100.0 / total as f64).round() as u8)
            }
        }
    }
}

/// Receives progress events; invoked zero or more times before the
/// terminal result.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Terminal result of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportResult {
    Completed { status: u16, body: String },
    /// Network error, abort or timeout
    Failure(String),
}

/// Issues HTTP-like requests.
///
/// Implementations must not retry and must emit every progress event
/// before returning.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: TransportRequest,
        progress: Option<ProgressCallback>,
    ) -> TransportResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_rounds() {
        let p = Progress::Fraction {
            loaded: 1,
            total: 3,
        };
        assert_eq!(p.percent(), Some(33));

        let p = Progress::Fraction {
            loaded: 2,
            total: 3,
        };
        assert_eq!(p.percent(), Some(67));
    }

    #[test]
    fn test_progress_percent_not_computable() {
        assert_eq!(Progress::Indeterminate.percent(), None);
        assert_eq!(
            Progress::Fraction {
                loaded: 0,
                total: 0
            }
            .percent(),
            None
        );
    }

    #[test]
    fn test_progress_percent_clamped() {
        let p = Progress::Fraction {
            loaded: 20,
            total: 10,
        };
        assert_eq!(p.percent(), Some(100));
    }

    #[test]
    fn test_request_builder() {
        let request = TransportRequest::post("http://localhost/sign")
            .with_header("X-CSRFToken", "abc")
            .with_payload(Payload::Fields(vec![("name".into(), "a.txt".into())]));

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers, vec![("X-CSRFToken".into(), "abc".into())]);
        assert!(matches!(request.payload, Payload::Fields(ref f) if f.len() == 1));
    }
}
