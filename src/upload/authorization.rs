//! Authorization fetcher
//!
//! Asks the application server for an upload grant: the storage
//! destination plus the signed form fields the provider requires. Only the
//! file's name and MIME type are sent, never its bytes.

use super::{Leg, SelectedFile, UploadError};
use crate::config::WidgetConfig;
use crate::metrics;
use crate::transport::{Payload, Transport, TransportRequest, TransportResult};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// What is sent to the authorization endpoint for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub name: String,
    pub mime_type: String,
    pub credential_token: Option<String>,
}

impl AuthorizationRequest {
    pub fn for_file(file: &SelectedFile, credential_token: Option<&str>) -> Self {
        Self {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            credential_token: credential_token.map(str::to_string),
        }
    }

    fn into_transport_request(self, endpoint: &str, csrf_header: &str) -> TransportRequest {
        let mut request = TransportRequest::post(endpoint).with_payload(Payload::Fields(vec![
            ("type".to_string(), self.mime_type),
            ("name".to_string(), self.name),
        ]));

        if let Some(token) = self.credential_token {
            request = request.with_header(csrf_header, token);
        }

        request
    }
}

/// Upload grant issued by the application server
///
/// `form_action` is the storage destination; `fields` are forwarded to
/// storage verbatim and never contain the destination itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationGrant {
    form_action: String,
    fields: Vec<(String, String)>,
}

impl AuthorizationGrant {
    pub fn new(form_action: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            form_action: form_action.into(),
            fields,
        }
    }

    /// Parse a grant from a JSON object, splitting out `form_action_field`.
    ///
    /// String values are kept as-is, other scalars use their JSON text and
    /// `null` values are dropped.
    pub fn from_json(body: &str, form_action_field: &str) -> Result<Self, String> {
        let mut object: Map<String, Value> =
            serde_json::from_str(body).map_err(|e| format!("invalid grant body: {}", e))?;

        let form_action = match object.remove(form_action_field) {
            Some(Value::String(url)) if !url.is_empty() => url,
            Some(_) => return Err(format!("'{}' is not a URL string", form_action_field)),
            None => return Err(format!("grant is missing '{}'", form_action_field)),
        };

        let fields = object
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((name, s)),
                other => Some((name, other.to_string())),
            })
            .collect();

        Ok(Self {
            form_action,
            fields,
        })
    }

    /// Render back to the JSON object served by the authorization endpoint
    pub fn to_json(&self, form_action_field: &str) -> Value {
        let mut object = Map::new();
        for (name, value) in &self.fields {
            object.insert(name.clone(), Value::String(value.clone()));
        }
        object.insert(
            form_action_field.to_string(),
            Value::String(self.form_action.clone()),
        );
        Value::Object(object)
    }

    pub fn form_action(&self) -> &str {
        &self.form_action
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn into_parts(self) -> (String, Vec<(String, String)>) {
        (self.form_action, self.fields)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

/// Fetches upload grants over a [`Transport`]
pub struct AuthorizationFetcher {
    transport: Arc<dyn Transport>,
    csrf_header: String,
    form_action_field: String,
}

impl AuthorizationFetcher {
    pub fn new(transport: Arc<dyn Transport>, config: &WidgetConfig) -> Self {
        Self {
            transport,
            csrf_header: config.csrf_header.clone(),
            form_action_field: config.form_action_field.clone(),
        }
    }

    /// Request a grant for `file` from `endpoint`.
    ///
    /// The credential header is only attached when a token is available.
    /// No progress is reported for this leg.
    #[tracing::instrument(
        name = "upload.authorize",
        skip(self, file, credential_token),
        fields(
            endpoint = %endpoint,
            file.name = %file.name,
            file.mime_type = %file.mime_type,
            auth.has_token = credential_token.is_some()
        ),
        err
    )]
    pub async fn fetch(
        &self,
        endpoint: &str,
        file: &SelectedFile,
        credential_token: Option<&str>,
    ) -> Result<AuthorizationGrant, UploadError> {
        let request = AuthorizationRequest::for_file(file, credential_token)
            .into_transport_request(endpoint, &self.csrf_header);

        let result = match self.transport.send(request, None).await {
            TransportResult::Completed { status, body } => self.interpret(status, &body),
            TransportResult::Failure(reason) => {
                Err(UploadError::TransportFailure(Leg::Authorization, reason))
            }
        };

        match &result {
            Ok(grant) => {
                metrics::record_authorization("granted");
                tracing::info!(
                    form_action = %grant.form_action(),
                    fields = grant.fields().len(),
                    "Upload authorization granted"
                );
            }
            Err(e) => {
                metrics::record_authorization(e.kind());
            }
        }

        result
    }

    fn interpret(&self, status: u16, body: &str) -> Result<AuthorizationGrant, UploadError> {
        match status {
            200 => AuthorizationGrant::from_json(body, &self.form_action_field)
                .map_err(UploadError::AuthorizationUnavailable),
            400 | 403 => match serde_json::from_str::<ErrorBody>(body) {
                Ok(ErrorBody {
                    error: Some(message),
                }) if !message.is_empty() => Err(UploadError::AuthorizationDenied(message)),
                _ => Err(UploadError::AuthorizationUnavailable(format!(
                    "status {} without an error message",
                    status
                ))),
            },
            other => Err(UploadError::AuthorizationUnavailable(format!(
                "unexpected status {}",
                other
            ))),
        }
    }
}
