//! Widget registry
//!
//! The wiring layer registers each widget explicitly when its elements
//! become available and detaches it when they go away.

use super::{UploadContext, Widget, WidgetHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a registered widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(u64);

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "widget-{}", self.0)
    }
}

/// Every widget on a page, sharing one [`UploadContext`]
pub struct WidgetRegistry {
    context: Arc<UploadContext>,
    next_id: AtomicU64,
    widgets: Mutex<HashMap<WidgetId, Arc<Widget>>>,
}

impl WidgetRegistry {
    pub fn new(context: Arc<UploadContext>) -> Self {
        Self {
            context,
            next_id: AtomicU64::new(1),
            widgets: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<UploadContext> {
        &self.context
    }

    /// Attach a widget and start tracking it
    pub fn register(
        &self,
        handle: Arc<dyn WidgetHandle>,
        endpoint_url: impl Into<String>,
        existing_url: Option<String>,
    ) -> (WidgetId, Arc<Widget>) {
        let id = WidgetId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let widget = Arc::new(Widget::attach(
            handle,
            endpoint_url,
            existing_url,
            Arc::clone(&self.context),
        ));

        tracing::debug!(
            widget = %id,
            endpoint = %widget.endpoint_url(),
            state = ?widget.state(),
            "Widget registered"
        );

        self.widgets.lock().insert(id, Arc::clone(&widget));
        (id, widget)
    }

    pub fn get(&self, id: WidgetId) -> Option<Arc<Widget>> {
        self.widgets.lock().get(&id).cloned()
    }

    /// Stop tracking a widget. An upload already in flight runs to
    /// completion against the returned handle.
    pub fn detach(&self, id: WidgetId) -> Option<Arc<Widget>> {
        let widget = self.widgets.lock().remove(&id);
        if widget.is_some() {
            tracing::debug!(widget = %id, "Widget detached");
        }
        widget
    }

    pub fn len(&self) -> usize {
        self.widgets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WidgetConfig;
    use crate::gate::SubmissionGate;
    use crate::transport::{ProgressCallback, Transport, TransportRequest, TransportResult};
    use crate::upload::SelectedFile;
    use crate::widget::{LogNotifier, MockWidgetHandle, NoCredentials, WidgetState};
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl Transport for Offline {
        async fn send(
            &self,
            _request: TransportRequest,
            _progress: Option<ProgressCallback>,
        ) -> TransportResult {
            TransportResult::Failure("offline".into())
        }
    }

    fn registry() -> WidgetRegistry {
        WidgetRegistry::new(UploadContext::new(
            Arc::new(Offline),
            SubmissionGate::new(),
            Arc::new(NoCredentials),
            Arc::new(LogNotifier),
            &WidgetConfig::default(),
        ))
    }

    fn handle(expected: WidgetState) -> Arc<MockWidgetHandle> {
        let mut handle = MockWidgetHandle::new();
        handle
            .expect_show_state()
            .withf(move |state| *state == expected)
            .times(1)
            .return_const(());
        Arc::new(handle)
    }

    #[test]
    fn test_register_and_detach() {
        let registry = registry();
        assert!(registry.is_empty());

        let (a, widget_a) = registry.register(handle(WidgetState::Empty), "/sign", None);
        let (b, widget_b) = registry.register(
            handle(WidgetState::Linked),
            "/sign",
            Some("https://b/x.png".into()),
        );

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(widget_a.state(), WidgetState::Empty);
        assert_eq!(widget_b.state(), WidgetState::Linked);
        assert!(Arc::ptr_eq(&registry.get(a).unwrap(), &widget_a));

        assert!(registry.detach(a).is_some());
        assert!(registry.detach(a).is_none());
        assert!(registry.get(a).is_none());
        assert_eq!(registry.len(), 1);
    }

    fn permissive() -> Arc<MockWidgetHandle> {
        let mut handle = MockWidgetHandle::new();
        handle.expect_show_state().return_const(());
        handle.expect_clear_file_picker().return_const(());
        handle.expect_set_result_url().return_const(());
        handle.expect_set_link().return_const(());
        handle.expect_set_progress().return_const(());
        Arc::new(handle)
    }

    #[tokio::test]
    async fn test_registered_widgets_fail_independently() {
        let registry = registry();
        let (_, first) = registry.register(permissive(), "/sign", None);
        let (_, second) = registry.register(permissive(), "/sign", None);
        let file = SelectedFile::new("a.txt", "text/plain", "a");

        let (a, b) = tokio::join!(
            first.select_file(file.clone()),
            second.select_file(file)
        );

        assert!(!a.is_success());
        assert!(!b.is_success());
        assert_eq!(first.state(), WidgetState::Empty);
        assert_eq!(second.state(), WidgetState::Empty);
        assert_eq!(registry.context().gate().outstanding(), 0);
    }
}
