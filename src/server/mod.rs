//! HTTP server module
//!
//! Serves the authorization endpoint the widget talks to, plus health and
//! metrics.
//!
//! # Endpoints
//!
//! * `POST <sign_path>` - sign an upload grant for the url-encoded `name` and `type`
//! * `GET /health` - returns "ok"
//! * `GET /metrics` - Prometheus text exposition (when enabled)
//!
//! Everything else is 404.

use crate::config::Config;
use crate::metrics;
use crate::signer::{PolicySigner, SignerError};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),
}

struct AppState {
    config: Config,
    signer: PolicySigner,
}

/// Signing server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind to the configured address. Port 0 lets the OS pick one.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let signer = PolicySigner::new(&config.signer)?;

        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(AppState { config, signer }),
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            sign_path = %self.state.config.server.sign_path,
            form_action = %self.state.signer.form_action(),
            "Starting signing server on {}",
            self.local_addr
        );

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<String>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let body = req.into_body().collect().await?.to_bytes();

    info!("Handling {} {}", method, path);
    Ok(route(&state, &method, &path, body))
}

fn route(state: &AppState, method: &Method, path: &str, body: Bytes) -> Response<String> {
    match (method, path) {
        (&Method::GET, "/health") => text(StatusCode::OK, "ok".to_string()),
        (&Method::GET, "/metrics") if state.config.metrics.enabled => {
            text(StatusCode::OK, metrics::gather_text())
        }
        (&Method::POST, p) if p == state.config.server.sign_path => sign(state, &body),
        _ => text(StatusCode::NOT_FOUND, "Not Found".to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct SignForm {
    name: Option<String>,
    #[serde(rename = "type")]
    mime_type: Option<String>,
}

fn sign(state: &AppState, body: &[u8]) -> Response<String> {
    let form: SignForm = match serde_urlencoded::from_bytes(body) {
        Ok(form) => form,
        Err(e) => {
            warn!("Malformed sign request: {}", e);
            return error_json(StatusCode::BAD_REQUEST, "Malformed request body.");
        }
    };

    let (name, mime_type) = match (form.name, form.mime_type) {
        (Some(name), Some(mime_type)) => (name, mime_type),
        (None, _) => return error_json(StatusCode::BAD_REQUEST, "Missing file name."),
        (_, None) => return error_json(StatusCode::BAD_REQUEST, "Missing file type."),
    };

    match state.signer.sign(&name, &mime_type) {
        Ok(grant) => json_response(
            StatusCode::OK,
            grant
                .to_json(&state.config.widget.form_action_field)
                .to_string(),
        ),
        Err(SignerError::InvalidFileName(_)) => {
            error_json(StatusCode::BAD_REQUEST, "Invalid file name.")
        }
        Err(e) => {
            error!("Failed to sign upload grant: {}", e);
            metrics::record_error("signing");
            text(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            )
        }
    }
}

fn text(status: StatusCode, body: String) -> Response<String> {
    respond(status, "text/plain", body)
}

fn json_response(status: StatusCode, body: String) -> Response<String> {
    respond(status, "application/json", body)
}

fn error_json(status: StatusCode, message: &str) -> Response<String> {
    json_response(status, json!({ "error": message }).to_string())
}

fn respond(status: StatusCode, content_type: &str, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    if let Ok(value) = content_type.parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}
