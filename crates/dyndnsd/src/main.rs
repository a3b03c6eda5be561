// # dyndnsd - DynDNS Daemon
//
// Thin integration layer: no DNS logic lives here.
//
// The dyndnsd daemon is responsible for:
// 1. Loading the configuration file and environment overrides
// 2. Initializing logging and the runtime
// 3. Registering providers and address sources
// 4. Running the poll loop until SIGTERM/SIGINT
//
// ## Configuration
//
// - `DYNDNS_CONFIG`: path to the JSON configuration (default `config.json`);
//   a path given as the first argument takes precedence
// - `DYNDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
// - `DYNDNS_MODE=dry-run`: look up records but never change them
// - `DYNDNS_API_TOKEN`, `DYNDNS_API_KEY`, `DYNDNS_EMAIL`,
//   `DYNDNS_POLL_INTERVAL_SECS`, `DYNDNS_ADDRESS_URL`: override the file
//
// ## Signals
//
// - SIGTERM, SIGINT: stop after the current tick
// - SIGHUP: reconcile on the next tick even if the address is unchanged
//
// ## Example
//
// ```bash
// export DYNDNS_API_TOKEN=your_token
// dyndnsd /etc/dyndns/config.json
// ```

use anyhow::{Context, Result};
use dyndns_core::config::{ENV_CONFIG, ENV_LOG_LEVEL, ENV_MODE, is_dry_run_mode};
use dyndns_core::{DyndnsConfig, LoopEvent, LoopHandle, PollLoop, ProviderRegistry};
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default configuration file, relative to the working directory
const DEFAULT_CONFIG_PATH: &str = "config.json";

/// How long background logging tasks get to drain after the loop stops
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DyndnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DyndnsExitCode> for ExitCode {
    fn from(code: DyndnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Parse a `DYNDNS_LOG_LEVEL` value
fn parse_log_level(value: Option<&str>) -> Result<Level> {
    let value = value.unwrap_or("info");
    match value.trim().to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "{} '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            ENV_LOG_LEVEL,
            value
        ),
    }
}

/// Configuration path from the first argument, then `DYNDNS_CONFIG`
fn config_path(arg: Option<String>, env_value: Option<String>) -> String {
    arg.or(env_value)
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

/// Everything needed to start the loop
struct Daemon {
    poll_loop: PollLoop,
    events: mpsc::Receiver<LoopEvent>,
}

/// Build the poll loop from configuration
///
/// Needs no runtime: provider and address source constructors do no I/O.
fn build_daemon(config: &DyndnsConfig) -> Result<Daemon> {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    dyndns_provider_cloudflare::register(&registry);

    #[cfg(feature = "http")]
    dyndns_ip_http::register(&registry);

    debug!(
        "Registered providers: {:?}, address sources: {:?}",
        registry.list_providers(),
        registry.list_address_sources()
    );

    let provider = registry
        .create_provider(&config.provider)
        .context("Cannot create DNS provider")?;
    let source = registry
        .create_address_source(&config.address_source)
        .context("Cannot create address source")?;

    info!(
        "Provider: {}, address source: {}",
        provider.provider_name(),
        source.source_name()
    );

    let (poll_loop, events) = PollLoop::new(
        source,
        provider,
        &config.desired_state(),
        &config.engine,
    )?;

    for target in poll_loop.targets() {
        info!(
            "Managing record: {} (proxied: {})",
            target.record_name(),
            target.proxied
        );
    }

    Ok(Daemon { poll_loop, events })
}

fn main() -> ExitCode {
    let log_level = match parse_log_level(env::var(ENV_LOG_LEVEL).ok().as_deref()) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DyndnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DyndnsExitCode::ConfigError.into();
    }

    let path = config_path(env::args().nth(1), env::var(ENV_CONFIG).ok());
    info!("Starting dyndnsd with configuration {}", path);

    let config = match DyndnsConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return DyndnsExitCode::ConfigError.into();
        }
    };

    if is_dry_run_mode(env::var(ENV_MODE).ok().as_deref()) {
        warn!("DRY-RUN mode: records are looked up but never changed");
    }

    let daemon = match build_daemon(&config) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!("Startup error: {:#}", e);
            return DyndnsExitCode::ConfigError.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DyndnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(daemon).await {
            error!("Daemon error: {:#}", e);
            DyndnsExitCode::RuntimeError
        } else {
            DyndnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the poll loop until a shutdown signal arrives
async fn run_daemon(daemon: Daemon) -> Result<()> {
    let Daemon {
        mut poll_loop,
        events,
    } = daemon;

    let handle = poll_loop.handle();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let signals = spawn_signal_handler(handle, shutdown_tx)?;

    let event_logger = tokio::spawn(log_events(events));

    let mut status = poll_loop.status_stream();
    let status_logger = tokio::spawn(async move {
        while let Some(snapshot) = status.next().await {
            debug!("Status:\n{}", snapshot.summary());
        }
    });

    info!("Daemon initialized, watching for address changes");
    poll_loop.run_with_shutdown(Some(shutdown_rx)).await;

    // Dropping the loop closes the event and status channels
    drop(poll_loop);
    signals.abort();

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        let _ = event_logger.await;
        let _ = status_logger.await;
    })
    .await;
    if drained.is_err() {
        warn!("Logging tasks did not finish within {:?}", DRAIN_TIMEOUT);
    }

    info!("Shutting down daemon");
    Ok(())
}

/// Consume loop events
///
/// The loop already logs every step; this keeps a per-run tally.
async fn log_events(mut events: mpsc::Receiver<LoopEvent>) {
    let mut passes = 0usize;
    let mut failures = 0usize;

    while let Some(event) = events.recv().await {
        debug!(?event, "Loop event");
        match event {
            LoopEvent::PassCompleted { failed, .. } => {
                passes += 1;
                failures += failed;
                if failed > 0 {
                    warn!(
                        "{} record(s) failed; they are retried on the next address change or SIGHUP",
                        failed
                    );
                }
            }
            LoopEvent::Stopped { reason } => {
                info!(
                    "Loop stopped ({}): {} pass(es), {} record failure(s)",
                    reason, passes, failures
                );
            }
            _ => {}
        }
    }
}

/// Translate process signals into loop commands
///
/// SIGTERM/SIGINT fire the one-shot shutdown; SIGHUP requests a resync.
#[cfg(unix)]
fn spawn_signal_handler(
    handle: LoopHandle,
    shutdown_tx: oneshot::Sender<()>,
) -> Result<tokio::task::JoinHandle<()>> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?;

    Ok(tokio::spawn(async move {
        let name = loop {
            tokio::select! {
                _ = sigterm.recv() => break "SIGTERM",
                _ = sigint.recv() => break "SIGINT",
                _ = sighup.recv() => {
                    info!("Received SIGHUP, forcing a resync");
                    handle.resync();
                }
            }
        };
        info!("Received {}, stopping after the current tick", name);
        let _ = shutdown_tx.send(());
    }))
}

/// Fallback for non-Unix platforms: Ctrl-C only
#[cfg(not(unix))]
fn spawn_signal_handler(
    _handle: LoopHandle,
    shutdown_tx: oneshot::Sender<()>,
) -> Result<tokio::task::JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, stopping after the current tick"),
            Err(e) => error!("Failed to wait for Ctrl-C: {}", e),
        }
        let _ = shutdown_tx.send(());
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level(None).unwrap(), Level::INFO);
        assert_eq!(parse_log_level(Some("DEBUG")).unwrap(), Level::DEBUG);
        assert!(parse_log_level(Some("verbose")).is_err());
    }

    #[test]
    fn test_config_path_precedence() {
        assert_eq!(config_path(None, None), "config.json");
        assert_eq!(
            config_path(None, Some("/etc/dyndns.json".to_string())),
            "/etc/dyndns.json"
        );
        assert_eq!(
            config_path(Some("local.json".to_string()), Some("/etc/dyndns.json".to_string())),
            "local.json"
        );
    }

    #[cfg(all(feature = "cloudflare", feature = "http"))]
    #[test]
    fn test_build_daemon_from_config() {
        let config = DyndnsConfig::from_json(
            r#"{
                "provider": { "type": "cloudflare", "api_token": "cf-token-0123456789abcdef" },
                "defaultzones": [ { "zone": "@", "proxy": true } ],
                "websites": [ { "domain": ["example.com"], "zones": [ { "zone": "home" } ] } ]
            }"#,
        )
        .unwrap();

        let daemon = build_daemon(&config).unwrap();
        let names: Vec<String> = daemon
            .poll_loop
            .targets()
            .iter()
            .map(|t| t.record_name())
            .collect();
        assert_eq!(names, vec!["home.example.com", "example.com"]);
    }
}
