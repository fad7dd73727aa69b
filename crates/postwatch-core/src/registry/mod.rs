//! Plugin-based component registry
//!
//! The registry allows fetchers, notifiers and snapshot stores to be
//! registered dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use postwatch_core::registry::ComponentRegistry;
//!
//! // Create a registry with the built-in file and memory stores
//! let registry = ComponentRegistry::with_builtin_stores();
//!
//! // Let carrier and notifier crates register themselves
//! postwatch_carrier_oca::register(&registry);
//! postwatch_notify_smtp::register(&registry);
//!
//! // Create components from config
//! let fetcher = registry.create_fetcher(&config.fetcher)?;
//! let notifier = registry.create_notifier(&config.notifier)?;
//! let store = registry.create_store(&config.store).await?;
//! ```
//!
//! ## Registration
//!
//! Implementations should register themselves during initialization:
//!
//! ```rust,ignore
//! # use postwatch_core::registry::ComponentRegistry;
//! // In postwatch-carrier-oca crate
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_fetcher("oca", Box::new(OcaFactory));
//! }
//! ```

use crate::config::{FetcherConfig, NotifierConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::store::{FileSnapshotStoreFactory, MemorySnapshotStoreFactory};
use crate::traits::{Fetcher, Notifier, SnapshotStore};
use crate::traits::{FetcherFactory, NotifierFactory, StoreFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Component registry for plugin-based construction
///
/// The registry maintains maps of type names to factory objects, allowing
/// dynamic instantiation of components based on configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. Factories never run while a lock is held
/// across an await point.
#[derive(Default)]
pub struct ComponentRegistry {
    /// Registered fetcher factories
    fetchers: RwLock<HashMap<String, Box<dyn FetcherFactory>>>,

    /// Registered notifier factories
    notifiers: RwLock<HashMap<String, Box<dyn NotifierFactory>>>,

    /// Registered snapshot store factories
    stores: RwLock<HashMap<String, Arc<dyn StoreFactory>>>,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `file` and `memory` stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_store("file", Box::new(FileSnapshotStoreFactory));
        registry.register_store("memory", Box::new(MemorySnapshotStoreFactory));
        registry
    }

    /// Register a fetcher factory
    ///
    /// # Parameters
    ///
    /// - `name`: Fetcher type name (e.g., "oca")
    /// - `factory`: Factory object for creating fetcher instances
    pub fn register_fetcher(&self, name: impl Into<String>, factory: Box<dyn FetcherFactory>) {
        let mut fetchers = self.fetchers.write().unwrap_or_else(PoisonError::into_inner);
        fetchers.insert(name.into(), factory);
    }

    /// Register a notifier factory
    ///
    /// # Parameters
    ///
    /// - `name`: Notifier type name (e.g., "smtp", "log")
    /// - `factory`: Factory object for creating notifier instances
    pub fn register_notifier(&self, name: impl Into<String>, factory: Box<dyn NotifierFactory>) {
        let mut notifiers = self
            .notifiers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        notifiers.insert(name.into(), factory);
    }

    /// Register a snapshot store factory
    ///
    /// # Parameters
    ///
    /// - `name`: Store type name (e.g., "file", "memory")
    /// - `factory`: Factory object for creating store instances
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn StoreFactory>) {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create a fetcher from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Fetcher>)`: Created fetcher instance
    /// - `Err(Error)`: If the fetcher type is not registered or creation fails
    pub fn create_fetcher(&self, config: &FetcherConfig) -> Result<Box<dyn Fetcher>> {
        let fetcher_type = config.type_name();
        let fetchers = self.fetchers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = fetchers
            .get(fetcher_type)
            .ok_or_else(|| Error::config(format!("Unknown fetcher type: {}", fetcher_type)))?;

        factory.create(config)
    }

    /// Create a notifier from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Notifier>)`: Created notifier instance
    /// - `Err(Error)`: If the notifier type is not registered or creation fails
    pub fn create_notifier(&self, config: &NotifierConfig) -> Result<Box<dyn Notifier>> {
        let notifier_type = config.type_name();
        let notifiers = self
            .notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = notifiers
            .get(notifier_type)
            .ok_or_else(|| Error::config(format!("Unknown notifier type: {}", notifier_type)))?;

        factory.create(config)
    }

    /// Create and open a snapshot store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn SnapshotStore>)`: Opened store instance
    /// - `Err(Error)`: If the store type is not registered or opening fails
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn SnapshotStore>> {
        let store_type = config.type_name();

        let factory = {
            let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
            stores
                .get(store_type)
                .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?
                .clone()
        };

        factory.create(config).await
    }

    /// List all registered fetcher types
    pub fn list_fetchers(&self) -> Vec<String> {
        let fetchers = self.fetchers.read().unwrap_or_else(PoisonError::into_inner);
        fetchers.keys().cloned().collect()
    }

    /// List all registered notifier types
    pub fn list_notifiers(&self) -> Vec<String> {
        let notifiers = self
            .notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        notifiers.keys().cloned().collect()
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a fetcher type is registered
    pub fn has_fetcher(&self, name: &str) -> bool {
        let fetchers = self.fetchers.read().unwrap_or_else(PoisonError::into_inner);
        fetchers.contains_key(name)
    }

    /// Check if a notifier type is registered
    pub fn has_notifier(&self, name: &str) -> bool {
        let notifiers = self
            .notifiers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        notifiers.contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}
