// # Snapshot Store Trait
//
// Defines the interface for persistent per-package state.
//
// ## Purpose
//
// The snapshot store keeps, for each tracked identifier, the last snapshot
// that produced a notification. It is the baseline the next poll cycle is
// compared against, so a change is notified at most once.
//
// ## Implementations
//
// - File-based: a single JSON document with atomic replace
// - Memory: for tests and throwaway runs
//
// ## Usage
//
// ```rust,ignore
// use postwatch_core::SnapshotStore;
//
// let store = /* SnapshotStore implementation */;
//
// // Absent key means "never observed"
// let prior = store.get("3867500000001234567").await?;
//
// // Replace the baseline after a successful notification
// store.put("3867500000001234567", &snapshot).await?;
//
// // Release the handle; safe to call more than once
// store.close().await?;
// ```

use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;

use crate::snapshot::{Snapshot, StoredState};

/// Stream of `(identifier, state)` pairs in key order
pub type StoredEntries = Pin<Box<dyn Stream<Item = (String, StoredState)> + Send + 'static>>;

/// Trait for snapshot store implementations
///
/// A store has a single writer: the pipeline that owns it. Implementations
/// must still be `Send + Sync` so the pipeline can be moved across tasks and
/// a shutdown path can close the store while a cycle is in flight.
///
/// # Lifecycle
///
/// A store is acquired by its constructor (see
/// [`FileSnapshotStore::open`](crate::store::FileSnapshotStore::open)).
/// Every operation after [`close`](SnapshotStore::close) fails with
/// [`Error::StoreNotOpen`](crate::Error::StoreNotOpen).
///
/// # Atomicity
///
/// `put` either fully replaces the prior value for the key or fails and
/// leaves the prior value readable, both on disk and through `get`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Get the stored state for an identifier
    ///
    /// # Returns
    ///
    /// - `Ok(Some(StoredState))`: The last persisted snapshot
    /// - `Ok(None)`: The identifier was never observed
    /// - `Err(Error::StoreNotOpen)`: The store is not open
    /// - `Err(Error::StoreUnavailable)`: The store could not be read
    async fn get(&self, identifier: &str) -> Result<Option<StoredState>, crate::Error>;

    /// Replace the stored snapshot for an identifier
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The snapshot is durably written
    /// - `Err(Error::Encode)`: The snapshot could not be serialized
    /// - `Err(Error::StoreUnavailable)`: The write could not be committed
    /// - `Err(Error::StoreNotOpen)`: The store is not open
    async fn put(&self, identifier: &str, snapshot: &Snapshot) -> Result<(), crate::Error>;

    /// Enumerate every stored entry in key order
    ///
    /// The stream is finite and reflects the store at the time of the call.
    /// Each call starts again from the first key.
    async fn entries(&self) -> Result<StoredEntries, crate::Error>;

    /// Release the underlying handle
    ///
    /// Idempotent: closing a closed store is `Ok(())`.
    async fn close(&self) -> Result<(), crate::Error>;
}

/// A shared handle, so a caller can still close a store it handed over
#[async_trait]
impl<S: SnapshotStore + ?Sized> SnapshotStore for Arc<S> {
    async fn get(&self, identifier: &str) -> Result<Option<StoredState>, crate::Error> {
        (**self).get(identifier).await
    }

    async fn put(&self, identifier: &str, snapshot: &Snapshot) -> Result<(), crate::Error> {
        (**self).put(identifier, snapshot).await
    }

    async fn entries(&self) -> Result<StoredEntries, crate::Error> {
        (**self).entries().await
    }

    async fn close(&self) -> Result<(), crate::Error> {
        (**self).close().await
    }
}

/// Helper trait for constructing snapshot stores from configuration
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Create and open a SnapshotStore from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: The store configuration
    ///
    /// # Returns
    ///
    /// A boxed SnapshotStore trait object, already open
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn SnapshotStore>, crate::Error>;
}
