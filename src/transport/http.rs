//! reqwest-backed transport
//!
//! File bytes are streamed to the connection in fixed-size chunks; every
//! chunk pulled by the connection emits a progress event.

use super::{
    FilePart, Payload, Progress, ProgressCallback, Transport, TransportError, TransportRequest,
    TransportResult,
};
use crate::config::TransportConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// HTTP transport
pub struct HttpTransport {
    client: reqwest::Client,
    chunk_size: usize,
}

impl HttpTransport {
    /// Create a new transport from configuration
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
        })
    }

    fn file_part(
        &self,
        file: FilePart,
        progress: Option<ProgressCallback>,
    ) -> Result<Part, reqwest::Error> {
        let len = file.content.len() as u64;
        let body = reqwest::Body::wrap_stream(chunked(file.content, self.chunk_size, progress));
        let part = Part::stream_with_length(body, len).file_name(file.file_name);

        if file.mime_type.is_empty() {
            Ok(part)
        } else {
            part.mime_str(&file.mime_type)
        }
    }
}

/// Split `content` into a stream of chunks, reporting cumulative progress
/// as each one is taken.
fn chunked(
    content: Bytes,
    chunk_size: usize,
    progress: Option<ProgressCallback>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = content.len() as u64;
    let chunks: Vec<Bytes> = (0..content.len())
        .step_by(chunk_size)
        .map(|start| content.slice(start..(start + chunk_size).min(content.len())))
        .collect();

    let mut loaded = 0u64;
    futures::stream::iter(chunks.into_iter().map(move |chunk| {
        loaded += chunk.len() as u64;
        if let Some(ref cb) = progress {
            cb(Progress::Fraction { loaded, total });
        }
        Ok(chunk)
    }))
}

#[async_trait]
impl Transport for HttpTransport {
    #[tracing::instrument(
        name = "transport.send",
        skip(self, request, progress),
        fields(
            http.method = %request.method,
            http.url = %request.url,
            http.status_code = tracing::field::Empty
        )
    )]
    async fn send(
        &self,
        request: TransportRequest,
        progress: Option<ProgressCallback>,
    ) -> TransportResult {
        let mut builder = self.client.request(request.method, &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.payload {
            Payload::Empty => builder,
            Payload::Fields(fields) => {
                if let Some(ref cb) = progress {
                    cb(Progress::Indeterminate);
                }
                builder.form(&fields)
            }
            Payload::Multipart { fields, file } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                if let Some(file) = file {
                    let field_name = file.field_name.clone();
                    match self.file_part(file, progress) {
                        Ok(part) => form = form.part(field_name, part),
                        Err(e) => {
                            tracing::warn!(error = %e, "Rejected file part");
                            return TransportResult::Failure(e.to_string());
                        }
                    }
                }
                builder.multipart(form)
            }
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Request failed");
                return TransportResult::Failure(e.to_string());
            }
        };

        let status = response.status().as_u16();
        tracing::Span::current().record("http.status_code", status);

        match response.text().await {
            Ok(body) => {
                tracing::debug!(status = status, bytes = body.len(), "Request completed");
                TransportResult::Completed { status, body }
            }
            Err(e) => {
                tracing::warn!(status = status, error = %e, "Failed to read response body");
                TransportResult::Failure(e.to_string())
            }
        }
    }
}
