//! Upload module
//!
//! The two network legs of a direct-to-storage upload: fetching an
//! authorization grant from the application server, then posting the file
//! straight to the storage provider.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

pub mod authorization;
pub mod storage;

pub use authorization::{AuthorizationFetcher, AuthorizationGrant, AuthorizationRequest};
pub use storage::StorageUploader;

/// Shown when the authorization endpoint gives no usable answer
pub const AUTHORIZATION_UNAVAILABLE_MESSAGE: &str = "Sorry, could not get upload URL.";

/// Shown when the storage leg fails
pub const UPLOAD_FAILED_MESSAGE: &str = "Sorry, failed to upload file.";

/// Upload errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// 400/403 from the authorization endpoint with a server message
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("Authorization unavailable: {0}")]
    AuthorizationUnavailable(String),

    /// Storage returned something other than 201, or a malformed body
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// Network error, abort or timeout on either leg
    #[error("Transport failure during {0}: {1}")]
    TransportFailure(Leg, String),
}

/// Which network leg of an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Authorization,
    Storage,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Authorization => f.write_str("authorization"),
            Leg::Storage => f.write_str("storage upload"),
        }
    }
}

impl UploadError {
    /// Message to surface to the user
    pub fn user_message(&self) -> String {
        match self {
            UploadError::AuthorizationDenied(message) => message.clone(),
            UploadError::AuthorizationUnavailable(_)
            | UploadError::TransportFailure(Leg::Authorization, _) => {
                AUTHORIZATION_UNAVAILABLE_MESSAGE.to_string()
            }
            UploadError::UploadRejected(_) | UploadError::TransportFailure(Leg::Storage, _) => {
                UPLOAD_FAILED_MESSAGE.to_string()
            }
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::AuthorizationDenied(_) => "authorization_denied",
            UploadError::AuthorizationUnavailable(_) => "authorization_unavailable",
            UploadError::UploadRejected(_) => "upload_rejected",
            UploadError::TransportFailure(..) => "transport_failure",
        }
    }
}

/// A file chosen in the widget's file picker
#[derive(Clone)]
pub struct SelectedFile {
    pub name: String,
    /// May be empty when the host could not determine a type
    pub mime_type: String,
    pub content: Bytes,
}

impl SelectedFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.content.len())
            .finish()
    }
}

/// Terminal result of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Success { object_url: String },
    Failure { message: String },
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Success { .. })
    }
}
