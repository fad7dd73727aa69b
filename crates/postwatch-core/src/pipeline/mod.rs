//! Change pipeline
//!
//! The ChangePipeline is responsible for:
//! - Loading the stored baseline of each tracked package
//! - Discovering the carrier category of packages seen for the first time
//! - Fetching the current snapshot and diffing it against the baseline
//! - Notifying a detected change, then persisting the new baseline
//!
//! ## Architecture
//!
//! ```text
//!                     ┌────────────────┐
//!    poll interval ──▶│ ChangePipeline │──── PipelineEvent ──▶ monitoring
//!                     └────────────────┘
//!                              │
//!      ┌───────────────┬───────┴───────┬────────────────┐
//!      ▼               ▼               ▼                ▼
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────────┐
//! │ Snapshot │   │  Fetcher  │   │  diff()  │   │   Notifier   │
//! │  Store   │   │ (probe /  │   │          │   │              │
//! │(get/put) │   │  refetch) │   │          │   │              │
//! └──────────┘   └───────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! ## Per-package flow
//!
//! 1. `get` the stored baseline
//! 2. No baseline: probe categories in order until one reports `found`.
//!    Baseline present: refetch under the stored category
//! 3. No baseline: the change is the full current log.
//!    Baseline present: diff the two logs; no delta means no work
//! 4. Notify, then `put` the current snapshot
//!
//! A failed notification skips the `put`, so the next cycle sees the same
//! baseline and notifies the same change again.

use crate::config::TrackerConfig;
use crate::diff::diff;
use crate::error::{Error, Result};
use crate::snapshot::{LogEntry, Snapshot};
use crate::traits::{Fetcher, Notifier, SnapshotStore};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Events emitted by the ChangePipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Poll cycle started
    CycleStarted { packages: usize },

    /// A category was probed for an unknown package
    CategoryProbed {
        identifier: String,
        category: String,
        found: bool,
    },

    /// The carrier has no match for the package this cycle
    PackageNotFound { identifier: String },

    /// A change was detected and is about to be notified
    ChangeDetected {
        identifier: String,
        category: String,
        delta_len: usize,
        first_observation: bool,
    },

    /// Notification delivered
    NotificationSent { identifier: String },

    /// New baseline written
    SnapshotPersisted { identifier: String },

    /// Current snapshot matches the baseline
    NoChange { identifier: String },

    /// Processing the package failed this cycle
    PackageFailed { identifier: String, error: String },

    /// Poll cycle finished
    CycleCompleted {
        changed: usize,
        unchanged: usize,
        not_found: usize,
        failed: usize,
    },

    /// Pipeline stopped
    Stopped { reason: String },
}

/// Result of processing one package for one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// No category matched (unknown package) or the stored category no
    /// longer matches (known package); nothing was written
    NotFound,

    /// The current log equals the baseline; nothing was written
    Unchanged,

    /// The change was notified and the new baseline persisted
    Changed {
        category: String,
        delta: Vec<LogEntry>,
        first_observation: bool,
    },
}

/// Summary of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub changed: usize,
    pub unchanged: usize,
    pub not_found: usize,
    /// Identifiers whose processing failed, in processing order
    pub failed: Vec<String>,
}

/// Core change-detection pipeline
///
/// The pipeline owns its collaborators; there is no process-wide store
/// handle. Each test can build an isolated pipeline around its own doubles.
///
/// ## Lifecycle
///
/// 1. Create with [`ChangePipeline::new()`]
/// 2. Drive with [`ChangePipeline::run_until()`] (or single steps with
///    [`run_cycle()`](ChangePipeline::run_cycle) /
///    [`process_package()`](ChangePipeline::process_package))
/// 3. The store is closed when the run loop exits
///
/// ## Threading
///
/// Packages are processed one after another on the calling task, so store
/// writes are serialized.
pub struct ChangePipeline {
    /// Carrier fetcher, also the category prober
    fetcher: Box<dyn Fetcher>,

    /// Change notifier
    notifier: Box<dyn Notifier>,

    /// Baseline store
    store: Box<dyn SnapshotStore>,

    /// Enabled package identifiers, in processing order
    packages: Vec<String>,

    /// Categories probed for unknown packages, in order
    categories: Vec<String>,

    /// Sleep between cycles
    poll_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<PipelineEvent>,
}

impl ChangePipeline {
    /// Create a new pipeline
    ///
    /// # Parameters
    ///
    /// - `fetcher`: Carrier fetcher implementation
    /// - `notifier`: Notifier implementation
    /// - `store`: Opened snapshot store
    /// - `config`: Tracker configuration
    ///
    /// # Returns
    ///
    /// A tuple of (pipeline, event_receiver) where event_receiver yields
    /// pipeline events
    pub fn new(
        fetcher: Box<dyn Fetcher>,
        notifier: Box<dyn Notifier>,
        store: Box<dyn SnapshotStore>,
        config: TrackerConfig,
    ) -> Result<(Self, mpsc::Receiver<PipelineEvent>)> {
        config.validate()?;

        let categories = if config.pipeline.categories.is_empty() {
            fetcher.default_categories()
        } else {
            config.pipeline.categories.clone()
        };
        if categories.is_empty() {
            return Err(Error::config(format!(
                "No categories configured and carrier {} has no defaults",
                fetcher.carrier_name()
            )));
        }

        let (tx, rx) = mpsc::channel(config.pipeline.event_channel_capacity);

        let pipeline = Self {
            packages: config.enabled_packages(),
            categories,
            poll_interval: Duration::from_secs(config.pipeline.poll_interval_secs),
            fetcher,
            notifier,
            store,
            event_tx: tx,
        };

        Ok((pipeline, rx))
    }

    /// Categories probed for unknown packages, in order
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Run poll cycles until `shutdown` completes
    ///
    /// The shutdown future races both the in-flight cycle and the sleep
    /// between cycles. An interrupted cycle is dropped mid-package; the
    /// store's atomic `put` keeps the baseline whole. The store is closed
    /// before this returns.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        info!(
            "Start polling {} package(s) every {:?}",
            self.packages.len(),
            self.poll_interval
        );

        loop {
            tokio::select! {
                report = self.run_cycle() => {
                    debug!(
                        "Cycle finished: {} changed, {} unchanged, {} not found, {} failed",
                        report.changed,
                        report.unchanged,
                        report.not_found,
                        report.failed.len()
                    );
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received during poll cycle");
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.emit_event(PipelineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });

        self.store.close().await?;
        info!("Snapshot store closed, pipeline stopped");

        Ok(())
    }

    /// Test-only helper to run the pipeline with a controlled shutdown signal
    ///
    /// Production code should use [`run_until()`](Self::run_until) with an
    /// OS signal future.
    pub async fn run_with_shutdown(&self, shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        self.run_until(async {
            let _ = shutdown_rx.await;
        })
        .await
    }

    /// Process every enabled package once
    ///
    /// A failure is logged and recorded against its identifier only; the
    /// remaining packages are still processed.
    pub async fn run_cycle(&self) -> CycleReport {
        self.emit_event(PipelineEvent::CycleStarted {
            packages: self.packages.len(),
        });

        let mut report = CycleReport::default();

        for identifier in &self.packages {
            match self.process_package(identifier).await {
                Ok(PackageOutcome::Changed { .. }) => report.changed += 1,
                Ok(PackageOutcome::Unchanged) => report.unchanged += 1,
                Ok(PackageOutcome::NotFound) => report.not_found += 1,
                Err(e) => {
                    error!(package = %identifier, "Failed to process package: {}", e);
                    self.emit_event(PipelineEvent::PackageFailed {
                        identifier: identifier.clone(),
                        error: e.to_string(),
                    });
                    report.failed.push(identifier.clone());
                }
            }
        }

        self.emit_event(PipelineEvent::CycleCompleted {
            changed: report.changed,
            unchanged: report.unchanged,
            not_found: report.not_found,
            failed: report.failed.len(),
        });

        report
    }

    /// Run one cycle for a single package
    ///
    /// # Errors
    ///
    /// Store, fetch and notify errors are returned unchanged. None of them
    /// leave a partial write behind.
    pub async fn process_package(&self, identifier: &str) -> Result<PackageOutcome> {
        let prior = self.store.get(identifier).await?;

        let current = match &prior {
            None => match self.discover(identifier).await? {
                Some(snapshot) => snapshot,
                None => {
                    info!(package = %identifier, "Not found in any category");
                    return Ok(self.not_found(identifier));
                }
            },
            Some(state) => {
                let category = &state.snapshot.category;
                debug!(package = %identifier, "Fetching in known category '{}'", category);
                let snapshot = self.fetch(category, identifier).await?;
                if !snapshot.found {
                    warn!(
                        package = %identifier,
                        "Not found in stored category '{}', keeping baseline",
                        category
                    );
                    return Ok(self.not_found(identifier));
                }
                snapshot
            }
        };

        let (delta, first_observation) = match &prior {
            None => {
                info!(
                    package = %identifier,
                    "Package not in store, notifying full log of {} entries",
                    current.event_log.len()
                );
                (current.event_log.clone(), true)
            }
            Some(state) => {
                let result = diff(&state.snapshot.event_log, &current.event_log);
                if !result.changed {
                    info!(package = %identifier, "No change");
                    self.emit_event(PipelineEvent::NoChange {
                        identifier: identifier.to_string(),
                    });
                    return Ok(PackageOutcome::Unchanged);
                }
                (result.delta, false)
            }
        };

        info!(
            package = %identifier,
            "Change detected ({} entries, category '{}')",
            delta.len(),
            current.category
        );
        self.emit_event(PipelineEvent::ChangeDetected {
            identifier: identifier.to_string(),
            category: current.category.clone(),
            delta_len: delta.len(),
            first_observation,
        });

        self.notifier.notify(&current, &delta).await?;
        debug!(
            package = %identifier,
            "Notification sent via {}",
            self.notifier.notifier_name()
        );
        self.emit_event(PipelineEvent::NotificationSent {
            identifier: identifier.to_string(),
        });

        self.store.put(identifier, &current).await?;
        self.emit_event(PipelineEvent::SnapshotPersisted {
            identifier: identifier.to_string(),
        });

        Ok(PackageOutcome::Changed {
            category: current.category,
            delta,
            first_observation,
        })
    }

    /// Probe categories in order; the first match wins
    async fn discover(&self, identifier: &str) -> Result<Option<Snapshot>> {
        for category in &self.categories {
            debug!(package = %identifier, "Checking in category '{}'", category);
            let snapshot = self.fetch(category, identifier).await?;

            self.emit_event(PipelineEvent::CategoryProbed {
                identifier: identifier.to_string(),
                category: category.clone(),
                found: snapshot.found,
            });

            if snapshot.found {
                info!(package = %identifier, "Found in category '{}'", category);
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    /// Fetch and pin the snapshot to the store key and queried category
    async fn fetch(&self, category: &str, identifier: &str) -> Result<Snapshot> {
        let mut snapshot = self.fetcher.fetch(category, identifier).await?;
        snapshot.identifier = identifier.to_string();
        snapshot.category = category.to_string();
        Ok(snapshot)
    }

    fn not_found(&self, identifier: &str) -> PackageOutcome {
        self.emit_event(PipelineEvent::PackageNotFound {
            identifier: identifier.to_string(),
        });
        PackageOutcome::NotFound
    }

    /// Emit a pipeline event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: PipelineEvent) {
        // A full channel drops the event rather than blocking the cycle
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(
                    "Event channel full, dropping event. Consider increasing event_channel_capacity."
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("No event receiver, dropping event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{PackageConfig, StoreConfig};
    use crate::store::MemorySnapshotStore;

    struct NothingFetcher;

    #[async_trait::async_trait]
    impl Fetcher for NothingFetcher {
        async fn fetch(&self, category: &str, identifier: &str) -> Result<Snapshot> {
            Ok(Snapshot::not_found(identifier, category))
        }

        fn default_categories(&self) -> Vec<String> {
            vec!["c1".to_string(), "c2".to_string()]
        }

        fn carrier_name(&self) -> &'static str {
            "nothing"
        }
    }

    struct SilentNotifier;

    #[async_trait::async_trait]
    impl Notifier for SilentNotifier {
        async fn notify(&self, _snapshot: &Snapshot, _delta: &[LogEntry]) -> Result<()> {
            Ok(())
        }

        fn notifier_name(&self) -> &'static str {
            "silent"
        }
    }

    fn pipeline_with_capacity(capacity: usize) -> (ChangePipeline, mpsc::Receiver<PipelineEvent>) {
        let mut config = TrackerConfig::new();
        config.store = StoreConfig::Memory;
        config.packages = vec![PackageConfig::new("P1")];
        config.pipeline.event_channel_capacity = capacity;

        ChangePipeline::new(
            Box::new(NothingFetcher),
            Box::new(SilentNotifier),
            Box::new(MemorySnapshotStore::new()),
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_event_channel_drops_later_events() {
        let (pipeline, mut rx) = pipeline_with_capacity(1);

        let report = pipeline.run_cycle().await;

        assert_eq!(report.not_found, 1);
        assert_eq!(rx.try_recv().unwrap(), PipelineEvent::CycleStarted { packages: 1 });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cycle_runs_without_event_receiver() {
        let (pipeline, rx) = pipeline_with_capacity(4);
        drop(rx);

        let report = pipeline.run_cycle().await;

        assert_eq!(report.not_found, 1);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_cycle_report_default_is_empty() {
        let report = CycleReport::default();
        assert_eq!(report.changed + report.unchanged + report.not_found, 0);
        assert!(report.failed.is_empty());
    }
}
