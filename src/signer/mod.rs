//! Upload policy signer
//!
//! Issues the browser-based POST grant the widget hands to storage: a
//! base64 policy document restricting the upload to one fresh folder,
//! signed with AWS Signature Version 4.
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use s3file::config::SignerConfig;
//! use s3file::signer::PolicySigner;
//!
//! let signer = PolicySigner::new(&SignerConfig {
//!     bucket: "media".into(),
//!     region: "eu-west-1".into(),
//!     access_key: "AKID".into(),
//!     secret_key: "SECRET".into(),
//!     endpoint: None,
//!     upload_path: "tmp/s3file".into(),
//!     expires_seconds: 3600,
//!     acl: "public-read".into(),
//! })
//! .unwrap();
//!
//! let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let grant = signer.sign_at("photo.png", "image/png", now).unwrap();
//! assert_eq!(grant.form_action(), "https://media.s3.eu-west-1.amazonaws.com/");
//! assert!(grant.field("key").unwrap().starts_with("tmp/s3file/"));
//! ```

mod credentials;
pub mod sigv4;

pub use credentials::Credentials;

use crate::config::SignerConfig;
use crate::metrics;
use crate::upload::AuthorizationGrant;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Status storage answers a successful POST with
pub const SUCCESS_ACTION_STATUS: &str = "201";

/// Signer errors
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Policy serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Issues signed POST grants for one bucket
#[derive(Debug, Clone)]
pub struct PolicySigner {
    credentials: Credentials,
    bucket: String,
    region: String,
    form_action: String,
    upload_path: String,
    expires: TimeDelta,
    acl: String,
}

impl PolicySigner {
    pub fn new(config: &SignerConfig) -> Result<Self, SignerError> {
        let credentials = Credentials::from_config(config)?;
        let form_action = match &config.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/",
                config.bucket, config.region
            ),
        };
        let expires = i64::try_from(config.expires_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                SignerError::Signing(format!(
                    "expiry of {} seconds is out of range",
                    config.expires_seconds
                ))
            })?;

        Ok(Self {
            credentials,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            form_action,
            upload_path: config.upload_path.trim_end_matches('/').to_string(),
            expires,
            acl: config.acl.clone(),
        })
    }

    pub fn form_action(&self) -> &str {
        &self.form_action
    }

    /// Sign a grant for `file_name` valid from now
    pub fn sign(&self, file_name: &str, mime_type: &str) -> Result<AuthorizationGrant, SignerError> {
        self.sign_at(file_name, mime_type, Utc::now())
    }

    /// Sign a grant for `file_name` as of `now`, under a fresh random folder
    pub fn sign_at(
        &self,
        file_name: &str,
        mime_type: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationGrant, SignerError> {
        let folder = format!("{}/{}", self.upload_path, Uuid::new_v4().simple());
        self.sign_in_folder(&folder, file_name, mime_type, now)
    }

    #[tracing::instrument(
        name = "signer.sign",
        skip(self, now),
        fields(bucket = %self.bucket, key = tracing::field::Empty),
        err
    )]
    fn sign_in_folder(
        &self,
        folder: &str,
        file_name: &str,
        mime_type: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationGrant, SignerError> {
        let base_name = base_name(file_name)?;
        let key = format!("{}/{}", folder, base_name);
        tracing::Span::current().record("key", key.as_str());

        let date = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let credential = sigv4::credential_scope(
            self.credentials.access_key_id(),
            &date,
            &self.region,
            "s3",
        );
        let expiration = now
            .checked_add_signed(self.expires)
            .ok_or_else(|| SignerError::Signing("policy expiration is out of range".to_string()))?
            .format("%Y-%m-%dT%H:%M:%S.000Z")
            .to_string();

        let policy = json!({
            "expiration": expiration,
            "conditions": [
                {"bucket": self.bucket},
                {"acl": self.acl},
                {"Content-Type": mime_type},
                ["starts-with", "$key", format!("{}/", folder)],
                {"success_action_status": SUCCESS_ACTION_STATUS},
                {"x-amz-credential": credential},
                {"x-amz-algorithm": sigv4::ALGORITHM},
                {"x-amz-date": amz_date},
            ],
        });
        let encoded_policy = STANDARD.encode(serde_json::to_vec(&policy)?);

        let signing_key = sigv4::signing_key(
            self.credentials.secret_access_key(),
            &date,
            &self.region,
            "s3",
        )?;
        let signature = sigv4::sign(&signing_key, &encoded_policy)?;

        metrics::record_grant_signed();
        tracing::debug!(expiration = %expiration, "Upload grant signed");

        let fields = vec![
            ("key".to_string(), key),
            ("acl".to_string(), self.acl.clone()),
            ("Content-Type".to_string(), mime_type.to_string()),
            (
                "success_action_status".to_string(),
                SUCCESS_ACTION_STATUS.to_string(),
            ),
            ("policy".to_string(), encoded_policy),
            ("x-amz-algorithm".to_string(), sigv4::ALGORITHM.to_string()),
            ("x-amz-credential".to_string(), credential),
            ("x-amz-date".to_string(), amz_date),
            ("x-amz-signature".to_string(), signature),
        ];

        Ok(AuthorizationGrant::new(self.form_action.clone(), fields))
    }
}

/// Last path segment of a browser-supplied file name
fn base_name(file_name: &str) -> Result<&str, SignerError> {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(SignerError::InvalidFileName(file_name.to_string()));
    }
    Ok(name)
}
