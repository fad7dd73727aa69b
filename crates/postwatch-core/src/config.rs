//! Configuration types for the postwatch system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Main tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Carrier fetcher configuration
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Notifier configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Snapshot store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Packages to track
    #[serde(default)]
    pub packages: Vec<PackageConfig>,

    /// Optional pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl TrackerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            notifier: NotifierConfig::default(),
            store: StoreConfig::default(),
            packages: Vec::new(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.packages.iter().any(|p| p.enabled) {
            return Err(crate::Error::config("No packages configured"));
        }

        let mut seen = HashSet::new();
        for package in &self.packages {
            if package.identifier.trim().is_empty() {
                return Err(crate::Error::config("Package identifier cannot be empty"));
            }
            if !seen.insert(package.identifier.as_str()) {
                return Err(crate::Error::config(format!(
                    "Package {} is configured more than once",
                    package.identifier
                )));
            }
        }

        self.fetcher.validate()?;
        self.notifier.validate()?;
        self.store.validate()?;
        self.pipeline.validate()?;

        Ok(())
    }

    /// Identifiers of enabled packages, in configuration order
    pub fn enabled_packages(&self) -> Vec<String> {
        self.packages
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.identifier.clone())
            .collect()
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Carrier fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetcherConfig {
    /// OCA package locator
    Oca {
        /// Override of the service URL
        #[serde(default)]
        base_url: Option<String>,
        /// Request timeout in seconds
        #[serde(default = "default_fetch_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom fetcher
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl FetcherConfig {
    /// Validate the fetcher configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            FetcherConfig::Oca {
                base_url,
                timeout_secs,
            } => {
                if base_url.as_ref().is_some_and(|u| u.is_empty()) {
                    return Err(crate::Error::config("OCA base URL cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Fetch timeout must be > 0"));
                }
                Ok(())
            }
            FetcherConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom fetcher factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Get the fetcher type name
    pub fn type_name(&self) -> &str {
        match self {
            FetcherConfig::Oca { .. } => "oca",
            FetcherConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        FetcherConfig::Oca {
            base_url: None,
            timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

/// Notifier configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// E-mail over SMTP (STARTTLS)
    Smtp {
        /// SMTP relay host
        server: String,
        /// SMTP port
        #[serde(default = "default_smtp_port")]
        port: u16,
        /// SMTP username, supplied at runtime
        #[serde(default)]
        username: String,
        /// SMTP password, supplied at runtime
        #[serde(default)]
        password: String,
        /// Sender address
        from: String,
        /// Recipient address
        to: String,
        /// Subject template; `{identifier}` is replaced
        #[serde(default = "default_subject")]
        subject: String,
    },

    /// Log the notification instead of sending it
    #[default]
    Log,

    /// Custom notifier
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl NotifierConfig {
    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            NotifierConfig::Smtp {
                server, from, to, ..
            } => {
                if server.is_empty() {
                    return Err(crate::Error::config("SMTP server cannot be empty"));
                }
                if from.is_empty() || to.is_empty() {
                    return Err(crate::Error::config(
                        "E-mail sender and recipient are required",
                    ));
                }
                Ok(())
            }
            NotifierConfig::Log => Ok(()),
            NotifierConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom notifier factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the notifier type name
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Smtp { .. } => "smtp",
            NotifierConfig::Log => "log",
            NotifierConfig::Custom { factory, .. } => factory,
        }
    }
}

// Custom Debug implementation that hides SMTP credentials
impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifierConfig::Smtp {
                server,
                port,
                from,
                to,
                subject,
                ..
            } => f
                .debug_struct("Smtp")
                .field("server", server)
                .field("port", port)
                .field("username", &"<REDACTED>")
                .field("password", &"<REDACTED>")
                .field("from", from)
                .field("to", to)
                .field("subject", subject)
                .finish(),
            NotifierConfig::Log => f.write_str("Log"),
            NotifierConfig::Custom { factory, config } => f
                .debug_struct("Custom")
                .field("factory", factory)
                .field("config", config)
                .finish(),
        }
    }
}

/// Snapshot store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-based store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    Memory,

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Store path cannot be empty"))
            }
            StoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: default_store_path(),
        }
    }
}

/// Tracked package configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Carrier tracking number
    pub identifier: String,

    /// Whether this package is polled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl PackageConfig {
    /// Create a new package configuration
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            enabled: true,
        }
    }

    /// Enable or disable the package
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Sleep between poll cycles (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Carrier categories to probe for unknown packages, in order
    ///
    /// Empty means the fetcher's own default order.
    #[serde(default)]
    pub categories: Vec<String>,

    /// Capacity of the pipeline event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl PipelineConfig {
    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            return Err(crate::Error::config("Category names cannot be empty"));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            categories: Vec::new(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_smtp_port() -> u16 {
    587
}

fn default_subject() -> String {
    "Package {identifier} has new movements".to_string()
}

fn default_store_path() -> String {
    "postwatch.json".to_string()
}

fn default_poll_interval_secs() -> u64 {
    3600
}

fn default_event_channel_capacity() -> usize {
    1000
}
