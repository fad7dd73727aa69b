// # File Snapshot Store
//
// File-based implementation of SnapshotStore with crash recovery.
//
// ## Purpose
//
// Keeps the per-package baseline across daemon restarts, so a change that
// was already notified is not notified again after a restart.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename, so the file is always a complete document
// - Memory follows disk: the in-memory map changes only after the rename
// - Automatic backup: keeps .backup of the previous document
// - Recovery: falls back to backup if the main file does not decode
//
// ## Single Writer
//
// `open` takes an exclusive advisory lock on `<path>.lock`. A second
// process opening the same store fails with `StoreUnavailable`.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "3867500000001234567": {
//       "snapshot": {
//         "identifier": "3867500000001234567",
//         "category": "paquetes",
//         "origin": { "street": "...", "number": "...", ... },
//         "event_log": [{ "date": "12/05/2015 10:31", "description": "..." }],
//         "found": true
//       },
//       "stored_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::StoreConfig;
use crate::snapshot::{Snapshot, StoredState};
use crate::traits::snapshot_store::{SnapshotStore, StoreFactory, StoredEntries};

/// Store file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

/// File-based snapshot store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use postwatch_core::snapshot::{LogEntry, Snapshot};
/// use postwatch_core::store::FileSnapshotStore;
/// use postwatch_core::traits::SnapshotStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileSnapshotStore::open_at("/var/lib/postwatch/cache.json").await?;
///
///     let snapshot = Snapshot::found("P1", "paquetes", vec![LogEntry::new("d1", "En viaje")]);
///     store.put("P1", &snapshot).await?;
///
///     let stored = store.get("P1").await?;
///     assert_eq!(stored.map(|s| s.snapshot), Some(snapshot));
///
///     store.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileSnapshotStore {
    path: PathBuf,
    state: RwLock<Option<OpenStore>>,
}

/// Resources held while the store is open
#[derive(Debug)]
struct OpenStore {
    records: BTreeMap<String, StoredState>,
    lock_file: std::fs::File,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    records: BTreeMap<String, StoredState>,
}

impl FileSnapshotStore {
    /// Create an unopened handle for the store at `path`
    ///
    /// Every operation fails with `StoreNotOpen` until [`open`](Self::open)
    /// succeeds.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(None),
        }
    }

    /// Create a handle and open it
    pub async fn open_at<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let store = Self::new(path);
        store.open().await?;
        Ok(store)
    }

    /// Acquire the store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Take the exclusive process lock
    /// 3. Load the store file, recovering from backup if it is corrupted
    ///
    /// Fails with `StoreUnavailable` if the store is already open, locked by
    /// another process or not writable, and with `Decode` if neither the
    /// file nor its backup can be read back.
    pub async fn open(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;
        if guard.is_some() {
            return Err(Error::store_unavailable(format!(
                "Store {} is already open",
                self.path.display()
            )));
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let lock_file = Self::acquire_lock(&Self::lock_path(&self.path))?;
        let records = Self::load_with_recovery(&self.path).await?;

        tracing::info!(
            "Opened snapshot store {} ({} records)",
            self.path.display(),
            records.len()
        );

        *guard = Some(OpenStore { records, lock_file });
        Ok(())
    }

    /// Take the exclusive lock, failing fast if another process holds it
    fn acquire_lock(lock_path: &Path) -> Result<std::fs::File, Error> {
        let lock_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to open lock file {}: {}",
                    lock_path.display(),
                    e
                ))
            })?;

        FileExt::try_lock_exclusive(&lock_file).map_err(|e| {
            Error::store_unavailable(format!(
                "Store is locked by another process ({}): {}",
                lock_path.display(),
                e
            ))
        })?;

        Ok(lock_file)
    }

    /// Load the store file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load the main file
    /// 2. If it does not decode, try the backup and restore it
    /// 3. If the backup is missing or also corrupted, fail
    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<String, StoredState>, Error> {
        let err = match Self::load(path).await {
            Ok(records) => return Ok(records),
            Err(err @ Error::Decode(_)) => err,
            Err(other) => return Err(other),
        };

        tracing::warn!(
            "Store file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::error!("No backup file found for {}", path.display());
            return Err(err);
        }

        let records = Self::load(&backup_path).await.map_err(|backup_err| {
            tracing::error!("Backup also corrupted: {}", backup_err);
            err
        })?;

        tracing::info!("Recovered store from backup: {} records", records.len());

        if let Err(restore_err) = fs::copy(&backup_path, path).await {
            tracing::error!("Failed to restore store file from backup: {}", restore_err);
        }

        Ok(records)
    }

    /// Load the store file; a missing file is an empty store
    async fn load(path: &Path) -> Result<BTreeMap<String, StoredState>, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store_unavailable(format!("Failed to read store file {}: {}", path.display(), e))
        })?;

        let store_file: StoreFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::decode(format!("Failed to parse store file {}: {}", path.display(), e))
        })?;

        if store_file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STORE_FILE_VERSION,
                store_file.version
            );
        }

        Ok(store_file.records)
    }

    /// Write `records` to the store file atomically
    async fn write_records(&self, records: &BTreeMap<String, StoredState>) -> Result<(), Error> {
        let store_file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            records: records.clone(),
        };

        let json = serde_json::to_string_pretty(&store_file)
            .map_err(|e| Error::encode(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store_unavailable(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        Self::sidecar_path(&self.path, "tmp")
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        Self::sidecar_path(path, "backup")
    }

    /// Get path to the process lock file
    fn lock_path(path: &Path) -> PathBuf {
        Self::sidecar_path(path, "lock")
    }

    /// `<path>.<suffix>`, keeping any existing extension
    fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn get(&self, identifier: &str) -> Result<Option<StoredState>, Error> {
        let guard = self.state.read().await;
        let open = guard.as_ref().ok_or(Error::StoreNotOpen)?;
        Ok(open.records.get(identifier).cloned())
    }

    async fn put(&self, identifier: &str, snapshot: &Snapshot) -> Result<(), Error> {
        // The write lock serializes writers and blocks close() mid-write
        let mut guard = self.state.write().await;
        let open = guard.as_mut().ok_or(Error::StoreNotOpen)?;

        let mut records = open.records.clone();
        records.insert(identifier.to_string(), StoredState::new(snapshot.clone()));

        self.write_records(&records).await?;
        open.records = records;
        Ok(())
    }

    async fn entries(&self) -> Result<StoredEntries, Error> {
        let guard = self.state.read().await;
        let open = guard.as_ref().ok_or(Error::StoreNotOpen)?;
        let entries: Vec<(String, StoredState)> = open
            .records
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect();
        Ok(Box::pin(tokio_stream::iter(entries)))
    }

    async fn close(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;
        if let Some(open) = guard.take() {
            if let Err(e) = FileExt::unlock(&open.lock_file) {
                tracing::warn!("Failed to release store lock: {}", e);
            }
            tracing::info!("Closed snapshot store {}", self.path.display());
        }
        Ok(())
    }
}

/// Factory for file snapshot stores
pub struct FileSnapshotStoreFactory;

#[async_trait]
impl StoreFactory for FileSnapshotStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn SnapshotStore>, Error> {
        match config {
            StoreConfig::File { path } => Ok(Box::new(FileSnapshotStore::open_at(path).await?)),
            _ => Err(Error::config("Invalid config for file snapshot store")),
        }
    }
}
