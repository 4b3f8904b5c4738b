//! Signing credentials
//!
//! # Example
//!
//! ```
//! use s3file::signer::Credentials;
//!
//! let creds = Credentials::new("access-key", "secret-key");
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.secret_access_key(), "secret-key");
//! ```

use super::SignerError;
use crate::config::SignerConfig;
use std::fmt;

/// Access key pair used to sign upload policies
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Load credentials from signer configuration.
    ///
    /// Values still holding an unexpanded `${VAR}` placeholder are rejected,
    /// so a missing environment variable fails at startup instead of at the
    /// first upload.
    pub fn from_config(config: &SignerConfig) -> Result<Self, SignerError> {
        for (name, value) in [
            ("access_key", &config.access_key),
            ("secret_key", &config.secret_key),
        ] {
            if value.is_empty() {
                return Err(SignerError::MissingCredentials(format!("{} is empty", name)));
            }
            if value.contains("${") {
                return Err(SignerError::MissingCredentials(format!(
                    "{} references an unset environment variable",
                    name
                )));
            }
        }

        Ok(Self::new(&config.access_key, &config.secret_key))
    }

    /// Get the access key ID
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}
