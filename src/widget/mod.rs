//! Widget module
//!
//! The per-widget upload state machine and the host-facing seams it drives.
//!
//! A widget is one form attachment point made of four host elements: a file
//! picker, a hidden field holding the result URL, a link to the result and a
//! progress bar. The host implements [`WidgetHandle`] over those elements,
//! [`Notifier`] over its error channel, and registers each widget with a
//! [`WidgetRegistry`] when it appears.
//!
//! ```text
//!            select_file                 storage ok
//!   Empty ───────────────► Uploading ───────────────► Linked
//!     ▲                        │                        │
//!     │        any failure     │                        │
//!     └────────────────────────┘                        │
//!     ▲                    remove                       │
//!     └─────────────────────────────────────────────────┘
//! ```

pub mod controller;
pub mod credentials;
pub mod registry;

pub use controller::{UploadContext, Widget};
pub use credentials::{CookieCredentials, CredentialSource, NoCredentials, StaticCredentials};
pub use registry::{WidgetId, WidgetRegistry};

/// Widget state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    /// No file chosen, no result
    Empty,
    /// Authorization or transfer in flight
    Uploading,
    /// A result URL is displayed
    Linked,
}

impl WidgetState {
    /// Class the widget element carries in this state
    pub fn css_class(&self) -> &'static str {
        match self {
            WidgetState::Empty => "s3file form-active",
            WidgetState::Uploading => "s3file progress-active",
            WidgetState::Linked => "s3file link-active",
        }
    }
}

/// The host's view of one widget's elements
#[cfg_attr(test, mockall::automock)]
pub trait WidgetHandle: Send + Sync {
    /// Switch the widget's visible mode
    fn show_state(&self, state: WidgetState);

    /// Reset the file picker to "no file chosen"
    fn clear_file_picker(&self);

    /// Write the hidden form field; empty clears it
    fn set_result_url(&self, url: &str);

    /// Point the result link at `href` showing `label`
    fn set_link(&self, href: &str, label: &str);

    /// Set the progress bar width, 0-100
    fn set_progress(&self, percent: u8);
}

/// The host's user-visible error channel
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that only logs; for hosts without an error surface
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::warn!(message = %message, "Upload failed");
    }
}

/// Text shown for a result link: the last path segment of the URL
pub fn link_label(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_label() {
        assert_eq!(link_label("https://b/tmp/abc/o.png"), "o.png");
        assert_eq!(link_label("o.png"), "o.png");
        assert_eq!(link_label("https://b/"), "");
    }

    #[test]
    fn test_css_classes() {
        assert_eq!(WidgetState::Empty.css_class(), "s3file form-active");
        assert_eq!(WidgetState::Uploading.css_class(), "s3file progress-active");
        assert_eq!(WidgetState::Linked.css_class(), "s3file link-active");
    }
}
