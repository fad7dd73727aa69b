// # Memory Snapshot Store
//
// In-memory implementation of SnapshotStore.
//
// ## Purpose
//
// A fast store that does not persist across restarts. Useful for tests and
// for one-off runs where re-notifying every package after a restart is
// acceptable.
//
// ## Crash Behavior
//
// - All state is lost on restart/crash
// - First cycle after a restart treats every package as a first observation

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::StoreConfig;
use crate::snapshot::{Snapshot, StoredState};
use crate::traits::snapshot_store::{SnapshotStore, StoreFactory, StoredEntries};

/// In-memory snapshot store implementation
///
/// Cloning yields another handle to the same records, which lets tests keep
/// an observer handle while the pipeline owns the boxed store.
///
/// # Example
///
/// ```rust,no_run
/// use postwatch_core::snapshot::Snapshot;
/// use postwatch_core::store::MemorySnapshotStore;
/// use postwatch_core::traits::SnapshotStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySnapshotStore::new();
///     store.put("P1", &Snapshot::found("P1", "cartas", Vec::new())).await?;
///
///     let stored = store.get("P1").await?;
///     assert_eq!(stored.map(|s| s.snapshot.category), Some("cartas".to_string()));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemorySnapshotStore {
    inner: Arc<RwLock<Option<BTreeMap<String, StoredState>>>>,
}

impl MemorySnapshotStore {
    /// Create a new, open, empty memory store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(BTreeMap::new()))),
        }
    }

    /// Get the number of records in the store (0 once closed)
    pub async fn len(&self) -> usize {
        self.inner.read().await.as_ref().map_or(0, |r| r.len())
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether `close` has been called
    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.is_none()
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn get(&self, identifier: &str) -> Result<Option<StoredState>, Error> {
        let guard = self.inner.read().await;
        let records = guard.as_ref().ok_or(Error::StoreNotOpen)?;
        Ok(records.get(identifier).cloned())
    }

    async fn put(&self, identifier: &str, snapshot: &Snapshot) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let records = guard.as_mut().ok_or(Error::StoreNotOpen)?;
        records.insert(identifier.to_string(), StoredState::new(snapshot.clone()));
        Ok(())
    }

    async fn entries(&self) -> Result<StoredEntries, Error> {
        let guard = self.inner.read().await;
        let records = guard.as_ref().ok_or(Error::StoreNotOpen)?;
        let entries: Vec<(String, StoredState)> = records
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect();
        Ok(Box::pin(tokio_stream::iter(entries)))
    }

    async fn close(&self) -> Result<(), Error> {
        self.inner.write().await.take();
        Ok(())
    }
}

/// Factory for memory snapshot stores
pub struct MemorySnapshotStoreFactory;

#[async_trait]
impl StoreFactory for MemorySnapshotStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn SnapshotStore>, Error> {
        match config {
            StoreConfig::Memory => Ok(Box::new(MemorySnapshotStore::new())),
            _ => Err(Error::config("Invalid config for memory snapshot store")),
        }
    }
}
