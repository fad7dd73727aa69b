// # Notifier Trait
//
// Defines the interface for announcing a detected change.
//
// ## Implementations
//
// - SMTP e-mail and log-only: `postwatch-notify-smtp` crate

use async_trait::async_trait;

use crate::snapshot::{LogEntry, Snapshot};

/// Trait for notifiers
///
/// Called by the pipeline once per detected change, before the new snapshot
/// is persisted. A failed notification leaves the store untouched, so the
/// same change is detected and notified again on the next cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification for `snapshot`
    ///
    /// # Parameters
    ///
    /// - `snapshot`: The current snapshot
    /// - `delta`: The entries that changed. On a first observation the
    ///   pipeline passes the full log; an empty delta means "render the
    ///   full `snapshot.event_log`"
    async fn notify(&self, snapshot: &Snapshot, delta: &[LogEntry]) -> Result<(), crate::Error>;

    /// Notifier name (for logging)
    fn notifier_name(&self) -> &'static str;
}

/// The movements a notification should show
pub fn movements<'a>(snapshot: &'a Snapshot, delta: &'a [LogEntry]) -> &'a [LogEntry] {
    if delta.is_empty() {
        &snapshot.event_log
    } else {
        delta
    }
}

/// Helper trait for constructing notifiers from configuration
pub trait NotifierFactory: Send + Sync {
    /// Create a Notifier instance from configuration
    fn create(
        &self,
        config: &crate::config::NotifierConfig,
    ) -> Result<Box<dyn Notifier>, crate::Error>;
}
