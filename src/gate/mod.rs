//! Submission gate
//!
//! Counts in-flight uploads across every widget on a page and keeps the
//! page's submit controls disabled while the count is non-zero.
//!
//! Acquisition is scoped: [`SubmissionGate::acquire`] hands back a
//! [`GateGuard`] and the count is released when the guard drops, so every
//! increment has exactly one matching decrement on success, failure and
//! early-return paths alike.
//!
//! # Example
//!
//! ```
//! use s3file::gate::SubmissionGate;
//!
//! let gate = SubmissionGate::new();
//! {
//!     let _guard = gate.acquire();
//!     assert_eq!(gate.outstanding(), 1);
//! }
//! assert_eq!(gate.outstanding(), 0);
//! ```

use crate::metrics;
use parking_lot::Mutex;
use std::sync::Arc;

/// The page's form submit controls
#[cfg_attr(test, mockall::automock)]
pub trait SubmitControls: Send + Sync {
    /// Enable or disable every submit control
    fn set_enabled(&self, enabled: bool);
}

/// Shared counter of outstanding uploads
///
/// Controls are driven after the count lock is dropped, so a
/// [`SubmitControls`] implementation may read the gate from `set_enabled`.
/// Toggles are serialized so the controls see transitions in count order.
pub struct SubmissionGate {
    outstanding: Mutex<usize>,
    toggle: Mutex<()>,
    controls: Option<Arc<dyn SubmitControls>>,
}

impl SubmissionGate {
    /// Create a gate for a page without submit controls
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Create a gate that drives `controls`
    pub fn with_controls(controls: Arc<dyn SubmitControls>) -> Arc<Self> {
        Arc::new(Self::build(Some(controls)))
    }

    fn build(controls: Option<Arc<dyn SubmitControls>>) -> Self {
        Self {
            outstanding: Mutex::new(0),
            toggle: Mutex::new(()),
            controls,
        }
    }

    /// Number of uploads currently holding the gate
    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock()
    }

    /// Whether submission is currently allowed
    pub fn is_open(&self) -> bool {
        self.outstanding() == 0
    }

    /// Register one more in-flight upload and disable submission
    pub fn acquire(self: &Arc<Self>) -> GateGuard {
        let _toggle = self.toggle.lock();
        let outstanding = {
            let mut count = self.outstanding.lock();
            *count += 1;
            *count
        };
        metrics::set_gate_outstanding(outstanding);
        tracing::debug!(outstanding, "Submission gate acquired");

        if let Some(ref controls) = self.controls {
            controls.set_enabled(false);
        }

        GateGuard {
            gate: Arc::clone(self),
        }
    }

    fn release(&self) {
        let _toggle = self.toggle.lock();
        let outstanding = {
            let mut count = self.outstanding.lock();
            // A guard exists for every count, so this cannot underflow.
            *count = count.saturating_sub(1);
            *count
        };
        metrics::set_gate_outstanding(outstanding);
        tracing::debug!(outstanding, "Submission gate released");

        if outstanding == 0 {
            if let Some(ref controls) = self.controls {
                controls.set_enabled(true);
            }
        }
    }
}

/// Holds one count on a [`SubmissionGate`] until dropped
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard {
    gate: Arc<SubmissionGate>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::Weak;

    #[test]
    fn test_acquire_release_counts() {
        let gate = SubmissionGate::new();
        assert!(gate.is_open());

        let first = gate.acquire();
        let second = gate.acquire();
        assert_eq!(gate.outstanding(), 2);
        assert!(!gate.is_open());

        drop(first);
        assert_eq!(gate.outstanding(), 1);
        drop(second);
        assert_eq!(gate.outstanding(), 0);
        assert!(gate.is_open());
    }

    #[test]
    fn test_controls_reenabled_only_at_zero() {
        let mut controls = MockSubmitControls::new();
        let mut seq = Sequence::new();
        controls
            .expect_set_enabled()
            .with(eq(false))
            .times(2)
            .in_sequence(&mut seq)
            .return_const(());
        controls
            .expect_set_enabled()
            .with(eq(true))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let gate = SubmissionGate::with_controls(Arc::new(controls));
        let a = gate.acquire();
        let b = gate.acquire();
        drop(a);
        drop(b);
    }

    /// Controls that read the gate back while being toggled
    #[derive(Default)]
    struct ReadBackControls {
        gate: Mutex<Weak<SubmissionGate>>,
        seen: Mutex<Vec<(bool, usize, bool)>>,
    }

    impl SubmitControls for ReadBackControls {
        fn set_enabled(&self, enabled: bool) {
            if let Some(gate) = self.gate.lock().upgrade() {
                self.seen
                    .lock()
                    .push((enabled, gate.outstanding(), gate.is_open()));
            }
        }
    }

    #[test]
    fn test_controls_may_read_gate_while_toggled() {
        let controls = Arc::new(ReadBackControls::default());
        let gate = SubmissionGate::with_controls(controls.clone());
        *controls.gate.lock() = Arc::downgrade(&gate);

        let guard = gate.acquire();
        drop(guard);

        assert_eq!(
            *controls.seen.lock(),
            vec![(false, 1, false), (true, 0, true)]
        );
    }

    #[test]
    fn test_guard_released_on_early_return() {
        fn step(gate: &Arc<SubmissionGate>, fail: bool) -> Result<(), &'static str> {
            let _guard = gate.acquire();
            if fail {
                return Err("boom");
            }
            Ok(())
        }

        let gate = SubmissionGate::new();
        assert!(step(&gate, true).is_err());
        assert_eq!(gate.outstanding(), 0);
        assert!(step(&gate, false).is_ok());
        assert_eq!(gate.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_guard_moves_across_tasks() {
        let gate = SubmissionGate::new();
        let guard = gate.acquire();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            tokio::task::yield_now().await;
        });
        handle.await.unwrap();

        assert_eq!(gate.outstanding(), 0);
    }
}
