//! Core traits for the postwatch system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Fetcher`]: Read a package's current state from a carrier
//! - [`Notifier`]: Announce a detected change
//! - [`SnapshotStore`]: Persistent per-package baseline

pub mod fetcher;
pub mod notifier;
pub mod snapshot_store;

pub use fetcher::{Fetcher, FetcherFactory};
pub use notifier::{Notifier, NotifierFactory};
pub use snapshot_store::{SnapshotStore, StoreFactory, StoredEntries};
