// # postwatchd - package tracking daemon
//
// The postwatchd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from a YAML file, flags and environment variables
// 2. Initializing logging and the runtime
// 3. Registering the carrier, notifier and store implementations
// 4. Running the change pipeline until SIGTERM/SIGINT
//
// All change-detection logic lives in postwatch-core.
//
// ## Configuration
//
// The YAML file (`--config`, `POSTWATCH_CONFIG`, default `postwatch.yml`)
// holds a `TrackerConfig`:
//
// ```yaml
// fetcher:
//   type: oca
// notifier:
//   type: smtp
//   server: smtp.example.com
//   port: 587
//   from: postwatch@example.com
//   to: me@example.com
//   subject: "Package {identifier} has new movements"
// store:
//   type: file
//   path: /var/lib/postwatch/postwatch.json
// packages:
//   - identifier: "3867500000001234567"
// pipeline:
//   poll_interval_secs: 3600
// ```
//
// Flags and environment variables override the file:
// - `--cache-path` / `POSTWATCH_CACHE_PATH`: File store path
// - `--poll-interval-secs` / `POSTWATCH_POLL_INTERVAL_SECS`: Sleep between cycles
// - `--smtp-user` / `POSTWATCH_SMTP_USER`: SMTP username
// - `--smtp-pass` / `POSTWATCH_SMTP_PASSWORD`: SMTP password
// - `--dry-run` / `POSTWATCH_DRY_RUN`: Log notifications instead of sending
// - `--log-level` / `POSTWATCH_LOG_LEVEL`: trace, debug, info, warn, error
// - `--debug`: Shorthand for `--log-level debug`
//
// SMTP credentials are never read from the file.
//
// ## Commands
//
// - `postwatchd run` (default): poll until a shutdown signal
// - `postwatchd list`: print every stored package and exit

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use postwatch_core::config::{NotifierConfig, StoreConfig, TrackerConfig};
use postwatch_core::{ChangePipeline, ComponentRegistry, SnapshotStore};
use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Config file used when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "postwatch.yml";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure (including store open)
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PostwatchExitCode> for ExitCode {
    fn from(code: PostwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Postal package tracker: polls carriers and e-mails new movements
#[derive(Debug, Parser)]
#[command(name = "postwatchd", version, about)]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "POSTWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Snapshot store file (selects the file store)
    #[arg(long, env = "POSTWATCH_CACHE_PATH", global = true)]
    cache_path: Option<String>,

    /// Seconds to sleep between poll cycles
    #[arg(long, env = "POSTWATCH_POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    /// SMTP username
    #[arg(long, env = "POSTWATCH_SMTP_USER")]
    smtp_user: Option<String>,

    /// SMTP password
    #[arg(long, env = "POSTWATCH_SMTP_PASSWORD", hide_env_values = true)]
    smtp_pass: Option<String>,

    /// Log notifications instead of sending them
    #[arg(long, env = "POSTWATCH_DRY_RUN")]
    dry_run: bool,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, env = "POSTWATCH_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum Command {
    /// Poll tracked packages until SIGTERM/SIGINT (default)
    Run,
    /// Print every stored package and exit
    List,
}

impl Cli {
    /// Resolve the tracing level
    fn log_level(&self) -> Result<Level> {
        if self.debug {
            return Ok(Level::DEBUG);
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "Log level '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Load the YAML file and apply flag/environment overrides
    ///
    /// A missing file is only an error when it was named explicitly.
    fn load_config(&self) -> Result<TrackerConfig> {
        let explicit = self.config.is_some();
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() || explicit {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            TrackerConfig::new()
        };

        self.apply_overrides(&mut config);
        Ok(config)
    }

    /// Overlay flags and environment variables on a loaded configuration
    fn apply_overrides(&self, config: &mut TrackerConfig) {
        if let Some(path) = &self.cache_path {
            config.store = StoreConfig::File { path: path.clone() };
        }

        if let Some(secs) = self.poll_interval_secs {
            config.pipeline.poll_interval_secs = secs;
        }

        if let NotifierConfig::Smtp {
            username, password, ..
        } = &mut config.notifier
        {
            if let Some(user) = &self.smtp_user {
                *username = user.clone();
            }
            if let Some(pass) = &self.smtp_pass {
                *password = pass.clone();
            }
        }

        if self.dry_run {
            config.notifier = NotifierConfig::Log;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return PostwatchExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PostwatchExitCode::ConfigError.into();
    }

    let config = match cli.load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return PostwatchExitCode::ConfigError.into();
        }
    };

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PostwatchExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        match cli.command.unwrap_or(Command::Run) {
            Command::Run => run_daemon(config).await,
            Command::List => list_packages(config).await,
        }
    });

    code.into()
}

/// Create a registry with every compiled-in implementation
fn build_registry() -> ComponentRegistry {
    let registry = ComponentRegistry::with_builtin_stores();

    #[cfg(feature = "oca")]
    {
        debug!("Registering OCA fetcher");
        postwatch_carrier_oca::register(&registry);
    }

    #[cfg(feature = "smtp")]
    {
        debug!("Registering SMTP and log notifiers");
        postwatch_notify_smtp::register(&registry);
    }

    registry
}

/// Run the daemon until a shutdown signal
async fn run_daemon(config: TrackerConfig) -> PostwatchExitCode {
    run_daemon_with(config, build_registry()).await
}

/// Run the daemon with components from `registry`
async fn run_daemon_with(config: TrackerConfig, registry: ComponentRegistry) -> PostwatchExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration validation error: {}", e);
        return PostwatchExitCode::ConfigError;
    }

    info!("Starting postwatchd");
    info!(
        "Configuration loaded: {} package(s), fetcher {}, notifier {}, store {}",
        config.enabled_packages().len(),
        config.fetcher.type_name(),
        config.notifier.type_name(),
        config.store.type_name()
    );

    let fetcher = match registry.create_fetcher(&config.fetcher) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            error!("Failed to create fetcher: {}", e);
            return PostwatchExitCode::ConfigError;
        }
    };

    let notifier = match registry.create_notifier(&config.notifier) {
        Ok(notifier) => notifier,
        Err(e) => {
            error!("Failed to create notifier: {}", e);
            return PostwatchExitCode::ConfigError;
        }
    };

    let shutdown = match shutdown_signal() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            error!("{:#}", e);
            return PostwatchExitCode::RuntimeError;
        }
    };

    // Without the store no package can be evaluated safely
    let store: Arc<dyn SnapshotStore> = match registry.create_store(&config.store).await {
        Ok(store) => Arc::from(store),
        Err(e) => {
            error!("Failed to open snapshot store: {}", e);
            return PostwatchExitCode::ConfigError;
        }
    };

    let created = ChangePipeline::new(fetcher, notifier, Box::new(Arc::clone(&store)), config);
    let (pipeline, mut events) = match created {
        Ok(created) => created,
        Err(e) => {
            error!("Failed to create change pipeline: {}", e);
            close_store(store.as_ref()).await;
            return PostwatchExitCode::ConfigError;
        }
    };

    // Drain pipeline events into the debug log; ends when the pipeline drops
    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "Pipeline event");
        }
    });

    let result = pipeline.run_until(shutdown).await;
    drop(pipeline);
    let _ = event_log.await;

    match result {
        Ok(()) => {
            info!("Shutting down postwatchd");
            PostwatchExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            PostwatchExitCode::RuntimeError
        }
    }
}

/// Close a store the pipeline never took over
async fn close_store(store: &dyn SnapshotStore) {
    if let Err(e) = store.close().await {
        warn!("Failed to close snapshot store: {}", e);
    }
}

/// Print every stored package in key order
async fn list_packages(config: TrackerConfig) -> PostwatchExitCode {
    if let Err(e) = config.store.validate() {
        error!("Configuration validation error: {}", e);
        return PostwatchExitCode::ConfigError;
    }

    let registry = build_registry();

    let store = match registry.create_store(&config.store).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open snapshot store: {}", e);
            return PostwatchExitCode::ConfigError;
        }
    };

    let mut code = PostwatchExitCode::CleanShutdown;

    match store.entries().await {
        Ok(mut entries) => {
            let mut count = 0usize;
            while let Some((identifier, state)) = entries.next().await {
                count += 1;
                println!(
                    "{}\t{}\t{} movement(s)\tstored {}",
                    identifier,
                    state.snapshot.category,
                    state.snapshot.event_log.len(),
                    state.stored_at.to_rfc3339()
                );
                for entry in &state.snapshot.event_log {
                    println!("    {} - {}", entry.date, entry.description);
                }
            }
            info!("{} package(s) in store", count);
        }
        Err(e) => {
            error!("Failed to list snapshot store: {}", e);
            code = PostwatchExitCode::RuntimeError;
        }
    }

    if let Err(e) = store.close().await {
        error!("Failed to close snapshot store: {}", e);
        code = PostwatchExitCode::RuntimeError;
    }

    code
}

/// Future that completes on SIGTERM or SIGINT
///
/// Handlers are installed before this returns, so a signal arriving while
/// the first cycle runs is not lost.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received shutdown signal: {}", name);
    })
}

/// Future that completes on Ctrl-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal: SIGINT"),
            Err(e) => error!("Failed to wait for Ctrl-C: {}", e),
        }
    })
}
