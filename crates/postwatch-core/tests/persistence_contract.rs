//! Contract Test: Persistence Across Restarts
//!
//! The file store keeps baselines across process restarts.
//!
//! Constraints verified:
//! - A restarted pipeline does not re-notify unchanged packages
//! - A restarted pipeline reports only what changed while it was down
//! - The store file cannot be opened twice at once

mod common;

use common::*;
use postwatch_core::error::Error;
use postwatch_core::store::FileSnapshotStore;
use postwatch_core::traits::SnapshotStore;
use postwatch_core::{ChangePipeline, PackageOutcome};
use tempfile::tempdir;

async fn file_pipeline(
    path: &std::path::Path,
    fetcher: &ScriptedFetcher,
    notifier: &RecordingNotifier,
) -> ChangePipeline {
    let store = FileSnapshotStore::open_at(path).await.unwrap();
    let (pipeline, _rx) = ChangePipeline::new(
        Box::new(fetcher.clone()),
        Box::new(notifier.clone()),
        Box::new(store),
        minimal_config(&["P1"]),
    )
    .unwrap();
    pipeline
}

#[tokio::test]
async fn restart_does_not_renotify() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("postwatch.json");

    let fetcher = ScriptedFetcher::new();
    let notifier = RecordingNotifier::new();
    fetcher.found("c2", "P1", vec![entry("d1", "a")]);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    shutdown_tx.send(()).unwrap();
    let first = file_pipeline(&path, &fetcher, &notifier).await;
    assert!(matches!(
        first.process_package("P1").await.unwrap(),
        PackageOutcome::Changed { .. }
    ));
    // Already-signalled shutdown: stops right away and releases the file
    first.run_with_shutdown(shutdown_rx).await.unwrap();

    let second = file_pipeline(&path, &fetcher, &notifier).await;
    let outcome = second.process_package("P1").await.unwrap();

    assert_eq!(outcome, PackageOutcome::Unchanged);
    assert_eq!(notifier.sent_count(), 1);
    assert_eq!(
        fetcher.calls().last(),
        Some(&("c2".to_string(), "P1".to_string())),
        "category remembered across restart"
    );
}

#[tokio::test]
async fn restart_reports_changes_made_while_down() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("postwatch.json");

    let fetcher = ScriptedFetcher::new();
    let notifier = RecordingNotifier::new();
    fetcher.found("c1", "P1", vec![entry("d1", "a")]);

    {
        let store = FileSnapshotStore::open_at(&path).await.unwrap();
        let (pipeline, _rx) = ChangePipeline::new(
            Box::new(fetcher.clone()),
            Box::new(notifier.clone()),
            Box::new(store),
            minimal_config(&["P1"]),
        )
        .unwrap();
        pipeline.run_cycle().await;
    }
    // Dropping the store releases the lock, like a killed process

    fetcher.found("c1", "P1", vec![entry("d1", "a"), entry("d2", "b")]);

    let pipeline = file_pipeline(&path, &fetcher, &notifier).await;
    let outcome = pipeline.process_package("P1").await.unwrap();

    assert_eq!(
        outcome,
        PackageOutcome::Changed {
            category: "c1".to_string(),
            delta: vec![entry("d2", "b")],
            first_observation: false,
        }
    );
}

#[tokio::test]
async fn second_process_cannot_open_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("postwatch.json");

    let held = FileSnapshotStore::open_at(&path).await.unwrap();

    let result = FileSnapshotStore::open_at(&path).await;
    assert!(matches!(result, Err(Error::StoreUnavailable(_))));

    held.close().await.unwrap();
    let reopened = FileSnapshotStore::open_at(&path).await.unwrap();
    reopened.close().await.unwrap();
}
