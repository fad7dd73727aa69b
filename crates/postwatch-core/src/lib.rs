// # postwatch-core
//
// Core library for the postwatch package tracker.
//
// ## Architecture Overview
//
// This library provides the change-detection core:
// - **Fetcher**: Trait for reading a package's current state from a carrier
// - **Notifier**: Trait for announcing a detected change
// - **SnapshotStore**: Trait for the persistent per-package baseline
// - **diff**: Symmetric difference of two event logs
// - **ChangePipeline**: Orchestrates load → fetch → diff → notify → persist
// - **ComponentRegistry**: Plugin-based registry for fetchers, notifiers and stores
//
// ## Design Principles
//
// 1. **Notify before persist**: a change is only committed once it was announced
// 2. **Owned collaborators**: no process-wide store handle
// 3. **Plugin-Based**: Carriers and notifiers are registered dynamically
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    FetcherConfig, NotifierConfig, PackageConfig, PipelineConfig, StoreConfig, TrackerConfig,
};
pub use diff::{LogDiff, diff};
pub use error::{Error, Result};
pub use pipeline::{ChangePipeline, CycleReport, PackageOutcome, PipelineEvent};
pub use registry::ComponentRegistry;
pub use snapshot::{LogEntry, Origin, Snapshot, StoredState};
pub use store::{FileSnapshotStore, MemorySnapshotStore};
pub use traits::{Fetcher, Notifier, SnapshotStore};
