//! Widget state controller
//!
//! Ties the authorization fetcher, the storage uploader and the submission
//! gate together for one widget. Every failure is handled here: the widget
//! goes back to [`WidgetState::Empty`], the gate is released and the user
//! is notified. Nothing propagates past [`Widget::select_file`].

use super::{link_label, CredentialSource, Notifier, WidgetHandle, WidgetState};
use crate::config::WidgetConfig;
use crate::gate::SubmissionGate;
use crate::transport::{ProgressCallback, Transport};
use crate::upload::{
    AuthorizationFetcher, SelectedFile, StorageUploader, UploadError, UploadOutcome,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Collaborators shared by every widget on a page
pub struct UploadContext {
    fetcher: AuthorizationFetcher,
    uploader: StorageUploader,
    gate: Arc<SubmissionGate>,
    credentials: Arc<dyn CredentialSource>,
    notifier: Arc<dyn Notifier>,
}

impl UploadContext {
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Arc<SubmissionGate>,
        credentials: Arc<dyn CredentialSource>,
        notifier: Arc<dyn Notifier>,
        config: &WidgetConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            fetcher: AuthorizationFetcher::new(Arc::clone(&transport), config),
            uploader: StorageUploader::new(transport, config),
            gate,
            credentials,
            notifier,
        })
    }

    pub fn gate(&self) -> &Arc<SubmissionGate> {
        &self.gate
    }
}

struct Inner {
    state: WidgetState,
    selected_file: Option<SelectedFile>,
    result_url: Option<String>,
    progress_percent: u8,
    /// Bumped by every selection and removal; an attempt whose number is
    /// no longer current must not touch state or UI.
    attempt: u64,
}

/// One form attachment point
pub struct Widget {
    endpoint_url: String,
    handle: Arc<dyn WidgetHandle>,
    context: Arc<UploadContext>,
    inner: Arc<Mutex<Inner>>,
}

impl Widget {
    /// Attach to a widget's elements. Starts `Linked` when an existing
    /// result URL is present, `Empty` otherwise.
    pub fn attach(
        handle: Arc<dyn WidgetHandle>,
        endpoint_url: impl Into<String>,
        existing_url: Option<String>,
        context: Arc<UploadContext>,
    ) -> Self {
        let result_url = existing_url.filter(|url| !url.is_empty());
        let state = if result_url.is_some() {
            WidgetState::Linked
        } else {
            WidgetState::Empty
        };

        handle.show_state(state);

        Self {
            endpoint_url: endpoint_url.into(),
            handle,
            context,
            inner: Arc::new(Mutex::new(Inner {
                state,
                selected_file: None,
                result_url,
                progress_percent: 0,
                attempt: 0,
            })),
        }
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub fn state(&self) -> WidgetState {
        self.inner.lock().state
    }

    pub fn result_url(&self) -> Option<String> {
        self.inner.lock().result_url.clone()
    }

    pub fn selected_file(&self) -> Option<SelectedFile> {
        self.inner.lock().selected_file.clone()
    }

    pub fn progress_percent(&self) -> u8 {
        self.inner.lock().progress_percent
    }

    /// The user picked `file`: authorize, upload and link it.
    ///
    /// Any previous result is dropped as soon as the new attempt starts.
    /// Returns this attempt's outcome; if a later selection or removal
    /// superseded it, the outcome is returned but leaves state and UI alone.
    #[tracing::instrument(
        name = "widget.select_file",
        skip(self, file),
        fields(endpoint = %self.endpoint_url, file.name = %file.name, upload.bytes = file.len())
    )]
    pub async fn select_file(&self, file: SelectedFile) -> UploadOutcome {
        let attempt = {
            let mut inner = self.inner.lock();
            inner.attempt += 1;
            inner.state = WidgetState::Uploading;
            inner.selected_file = Some(file.clone());
            inner.result_url = None;
            inner.progress_percent = 0;
            inner.attempt
        };

        self.handle.set_result_url("");
        self.handle.set_progress(0);
        self.handle.show_state(WidgetState::Uploading);

        let token = self.context.credentials.token();
        let result = self.run(attempt, &file, token.as_deref()).await;

        self.finish(attempt, result)
    }

    /// Authorization leg, then the gated storage leg. The gate guard lives
    /// for the storage leg only and drops on every return path.
    async fn run(
        &self,
        attempt: u64,
        file: &SelectedFile,
        token: Option<&str>,
    ) -> Result<String, UploadError> {
        let grant = self
            .context
            .fetcher
            .fetch(&self.endpoint_url, file, token)
            .await?;

        let _guard = self.context.gate.acquire();
        self.context
            .uploader
            .upload(grant, file, Some(self.progress_callback(attempt)))
            .await
    }

    fn progress_callback(&self, attempt: u64) -> ProgressCallback {
        let inner = Arc::clone(&self.inner);
        let handle = Arc::clone(&self.handle);

        Arc::new(move |progress| {
            let Some(percent) = progress.percent() else {
                return;
            };
            {
                let mut inner = inner.lock();
                if inner.attempt != attempt || inner.state != WidgetState::Uploading {
                    return;
                }
                inner.progress_percent = percent;
            }
            handle.set_progress(percent);
        })
    }

    fn finish(&self, attempt: u64, result: Result<String, UploadError>) -> UploadOutcome {
        let mut inner = self.inner.lock();

        if inner.attempt != attempt {
            tracing::info!(
                attempt = attempt,
                current = inner.attempt,
                "Discarding outcome of superseded upload attempt"
            );
            return match result {
                Ok(object_url) => UploadOutcome::Success { object_url },
                Err(e) => UploadOutcome::Failure {
                    message: e.user_message(),
                },
            };
        }

        inner.progress_percent = 0;

        match result {
            Ok(object_url) => {
                inner.state = WidgetState::Linked;
                inner.result_url = Some(object_url.clone());
                drop(inner);

                self.handle.set_result_url(&object_url);
                self.handle.set_link(&object_url, link_label(&object_url));
                self.handle.show_state(WidgetState::Linked);
                self.handle.set_progress(0);

                UploadOutcome::Success { object_url }
            }
            Err(e) => {
                inner.state = WidgetState::Empty;
                inner.selected_file = None;
                inner.result_url = None;
                drop(inner);

                let message = e.user_message();
                tracing::warn!(error = %e, kind = e.kind(), "Upload attempt failed");
                crate::metrics::record_error(e.kind());

                self.handle.clear_file_picker();
                self.handle.show_state(WidgetState::Empty);
                self.handle.set_progress(0);
                self.context.notifier.notify(&message);

                UploadOutcome::Failure { message }
            }
        }
    }

    /// The user removed the upload: clear the result and the selection.
    ///
    /// No network activity and no gating. A no-op when already `Empty`.
    /// During an upload, the in-flight attempt is left to finish and its
    /// outcome discarded.
    pub fn remove(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.state == WidgetState::Empty {
                return;
            }
            inner.attempt += 1;
            inner.state = WidgetState::Empty;
            inner.selected_file = None;
            inner.result_url = None;
            inner.progress_percent = 0;
        }

        tracing::debug!(endpoint = %self.endpoint_url, "Upload removed");

        self.handle.set_result_url("");
        self.handle.set_link("", "");
        self.handle.clear_file_picker();
        self.handle.set_progress(0);
        self.handle.show_state(WidgetState::Empty);
    }
}
