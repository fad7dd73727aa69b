//! Test doubles and common utilities for pipeline contract tests
//!
//! The doubles are cheap to clone; every clone shares the same script,
//! counters and journal so a test can keep a handle after the boxed copy
//! moves into the pipeline.

#![allow(dead_code)]

use postwatch_core::config::{NotifierConfig, PackageConfig, PipelineConfig, StoreConfig};
use postwatch_core::error::{Error, Result};
use postwatch_core::snapshot::{LogEntry, Snapshot, StoredState};
use postwatch_core::store::MemorySnapshotStore;
use postwatch_core::traits::{Fetcher, Notifier, SnapshotStore, StoredEntries};
use postwatch_core::{ChangePipeline, PipelineEvent, TrackerConfig};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Ordered record of notify/put calls shared between doubles
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// What the scripted fetcher answers for one (category, identifier)
#[derive(Clone)]
pub enum Reply {
    Found(Vec<LogEntry>),
    Fail(String),
}

/// A Fetcher answering from a script; anything unscripted is not found
#[derive(Clone)]
pub struct ScriptedFetcher {
    script: Arc<Mutex<HashMap<(String, String), Reply>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
    defaults: Vec<String>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    /// Fetcher with default categories c1, c2, c3
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            defaults: vec!["c1".to_string(), "c2".to_string(), "c3".to_string()],
            delay: None,
        }
    }

    /// Fetcher that offers no default categories
    pub fn without_defaults() -> Self {
        Self {
            defaults: Vec::new(),
            ..Self::new()
        }
    }

    /// Sleep this long in every fetch
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Answer `found` with `log` for (category, identifier)
    pub fn found(&self, category: &str, identifier: &str, log: Vec<LogEntry>) {
        self.set(category, identifier, Reply::Found(log));
    }

    /// Answer with a fetch error for (category, identifier)
    pub fn fail(&self, category: &str, identifier: &str, message: &str) {
        self.set(category, identifier, Reply::Fail(message.to_string()));
    }

    /// Forget the answer for (category, identifier); it becomes not found
    pub fn clear(&self, category: &str, identifier: &str) {
        self.script
            .lock()
            .unwrap()
            .remove(&(category.to_string(), identifier.to_string()));
    }

    /// Every (category, identifier) fetched so far, in order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn set(&self, category: &str, identifier: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .insert((category.to_string(), identifier.to_string()), reply);
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, category: &str, identifier: &str) -> Result<Snapshot> {
        self.calls
            .lock()
            .unwrap()
            .push((category.to_string(), identifier.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .script
            .lock()
            .unwrap()
            .get(&(category.to_string(), identifier.to_string()))
            .cloned();

        match reply {
            Some(Reply::Found(log)) => Ok(Snapshot::found(identifier, category, log)),
            Some(Reply::Fail(message)) => Err(Error::fetch(message)),
            None => Ok(Snapshot::not_found(identifier, category)),
        }
    }

    fn default_categories(&self) -> Vec<String> {
        self.defaults.clone()
    }

    fn carrier_name(&self) -> &'static str {
        "scripted"
    }
}

/// A Notifier that records every call and can be told to fail
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(Snapshot, Vec<LogEntry>)>>>,
    attempts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    journal: Journal,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record successful notifications into `journal` as `notify:<id>`
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Self::default()
        }
    }

    /// Make every following notify fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delivered notifications as (snapshot, delta)
    pub fn sent(&self) -> Vec<(Snapshot, Vec<LogEntry>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Calls to notify, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, snapshot: &Snapshot, delta: &[LogEntry]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::notify("relay refused the message"));
        }

        self.journal.push(format!("notify:{}", snapshot.identifier));
        self.sent
            .lock()
            .unwrap()
            .push((snapshot.clone(), delta.to_vec()));
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "recording"
    }
}

/// A SnapshotStore over MemorySnapshotStore that counts calls
#[derive(Clone)]
pub struct CountingStore {
    inner: MemorySnapshotStore,
    gets: Arc<AtomicUsize>,
    puts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    failing_puts: Arc<AtomicBool>,
    failing_gets: Arc<Mutex<HashSet<String>>>,
    journal: Journal,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::with_journal(Journal::new())
    }

    /// Record successful puts into `journal` as `put:<id>`
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            inner: MemorySnapshotStore::new(),
            gets: Arc::new(AtomicUsize::new(0)),
            puts: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            failing_puts: Arc::new(AtomicBool::new(false)),
            failing_gets: Arc::new(Mutex::new(HashSet::new())),
            journal,
        }
    }

    /// Make every following put fail (or succeed again)
    pub fn set_failing_puts(&self, failing: bool) {
        self.failing_puts.store(failing, Ordering::SeqCst);
    }

    /// Make every following get for `identifier` fail
    pub fn fail_gets_for(&self, identifier: &str) {
        self.failing_gets
            .lock()
            .unwrap()
            .insert(identifier.to_string());
    }

    /// Seed a baseline without touching the counters
    pub async fn seed(&self, snapshot: Snapshot) {
        self.inner
            .put(&snapshot.identifier.clone(), &snapshot)
            .await
            .unwrap();
    }

    /// Current baseline, bypassing the counters
    pub async fn stored(&self, identifier: &str) -> Option<StoredState> {
        self.inner.get(identifier).await.unwrap()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Successful puts
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.is_closed().await
    }
}

#[async_trait::async_trait]
impl SnapshotStore for CountingStore {
    async fn get(&self, identifier: &str) -> Result<Option<StoredState>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing_gets.lock().unwrap().contains(identifier) {
            return Err(Error::store_unavailable("read failed"));
        }
        self.inner.get(identifier).await
    }

    async fn put(&self, identifier: &str, snapshot: &Snapshot) -> Result<()> {
        if self.failing_puts.load(Ordering::SeqCst) {
            return Err(Error::store_unavailable("disk full"));
        }
        self.inner.put(identifier, snapshot).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("put:{}", identifier));
        Ok(())
    }

    async fn entries(&self) -> Result<StoredEntries> {
        self.inner.entries().await
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

/// Minimal TrackerConfig for testing: memory store, log notifier,
/// one-second polling, fetcher default categories
pub fn minimal_config(identifiers: &[&str]) -> TrackerConfig {
    TrackerConfig {
        store: StoreConfig::Memory,
        notifier: NotifierConfig::Log,
        packages: identifiers.iter().map(|id| PackageConfig::new(*id)).collect(),
        pipeline: PipelineConfig {
            poll_interval_secs: 1,
            categories: Vec::new(),
            event_channel_capacity: 100,
        },
        ..TrackerConfig::new()
    }
}

/// Build a pipeline around the given doubles
pub fn pipeline(
    fetcher: &ScriptedFetcher,
    notifier: &RecordingNotifier,
    store: &CountingStore,
    config: TrackerConfig,
) -> (ChangePipeline, mpsc::Receiver<PipelineEvent>) {
    ChangePipeline::new(
        Box::new(fetcher.clone()),
        Box::new(notifier.clone()),
        Box::new(store.clone()),
        config,
    )
    .expect("pipeline construction succeeds")
}

/// Drain whatever events are queued
pub fn drain(rx: &mut mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Shorthand for a log entry
pub fn entry(date: &str, description: &str) -> LogEntry {
    LogEntry::new(date, description)
}
