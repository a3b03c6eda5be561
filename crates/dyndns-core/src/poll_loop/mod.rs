//! Poll loop
//!
//! The PollLoop drives the reconciler on a fixed interval:
//! - Fetches the current address from an [`AddressSource`]
//! - Compares it with the last observed address
//! - Runs a [`Reconciler`] pass when it changed
//! - Publishes a [`ReconciliationStatus`] snapshot after every tick
//!
//! ## State machine
//!
//! ```text
//!          ┌────────────── timer ───────────────┐
//!          ▼                                    │
//!  ┌──────────────┐  fetch failed  ┌──────────────┐
//!  │   Checking   │───────────────▶│     Idle     │
//!  └──────────────┘                └──────────────┘
//!          │                         ▲        ▲
//!          ├── same address ─▶ Unchanged      │
//!          │                                  │
//!          └── new address ──▶ Changed ─ apply ┘
//! ```
//!
//! The cached address starts unknown, so the first successful observation
//! always reconciles.
//!
//! ## Shutdown
//!
//! Shutdown is only observed while idle. A pass that has started always
//! finishes; a partially applied pass converges on the next one anyway.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{DesiredState, RecordTarget};
use crate::reconciler::{ReconcileReport, Reconciler, RecordOutcome};
use crate::traits::{AddressSource, DnsProvider};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// Read-only status snapshot for the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationStatus {
    /// When the address was last checked, successfully or not
    pub last_check: Option<DateTime<Utc>>,
    /// When the last address change was reconciled
    pub last_change: Option<DateTime<Utc>>,
    /// Last observed address; `None` until the first successful check
    pub last_address: Option<String>,
}

impl ReconciliationStatus {
    /// Two-line summary in local time, suitable for a tooltip
    ///
    /// ```text
    /// Changed: 03/14/2025 9:26 AM
    /// Checked: 03/14/2025 9:41 AM
    /// ```
    pub fn summary(&self) -> String {
        format!(
            "Changed: {}\nChecked: {}",
            format_local(self.last_change),
            format_local(self.last_check)
        )
    }
}

fn format_local(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.with_timezone(&Local).format("%m/%d/%Y %-I:%M %p").to_string(),
        None => "never".to_string(),
    }
}

/// Events emitted by the PollLoop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Loop started
    Started {
        targets: usize,
    },

    /// The address could not be determined this tick
    AddressUnavailable {
        error: String,
    },

    /// The address matched the cached one
    AddressUnchanged {
        address: String,
    },

    /// A new address was observed
    AddressChanged {
        previous: Option<String>,
        current: String,
    },

    /// A target converged
    RecordReconciled {
        record_name: String,
        outcome: RecordOutcome,
    },

    /// A target failed this pass
    RecordFailed {
        record_name: String,
        error: String,
        retryable: bool,
    },

    /// A reconciliation pass finished
    PassCompleted {
        address: String,
        succeeded: usize,
        failed: usize,
    },

    /// Loop stopped
    Stopped {
        reason: String,
    },
}

/// Result of a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No observation this tick; cached address retained
    AddressUnavailable {
        error: String,
    },
    /// Same address as before; nothing reconciled
    Unchanged {
        address: String,
    },
    /// New address; a pass ran
    Changed {
        previous: Option<String>,
        report: ReconcileReport,
    },
    /// Same address, but a forced resync pass ran
    Resynced {
        report: ReconcileReport,
    },
}

impl TickOutcome {
    /// The pass report, if this tick reconciled
    pub fn report(&self) -> Option<&ReconcileReport> {
        match self {
            TickOutcome::Changed { report, .. } | TickOutcome::Resynced { report } => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum LoopCommand {
    Shutdown,
    Resync,
}

/// Control handle for a running loop
///
/// Commands are picked up between ticks, never in the middle of a pass.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    commands: mpsc::UnboundedSender<LoopCommand>,
}

impl LoopHandle {
    /// Ask the loop to stop after the current tick
    ///
    /// Returns `false` if the loop is already gone.
    pub fn shutdown(&self) -> bool {
        self.commands.send(LoopCommand::Shutdown).is_ok()
    }

    /// Wake the loop and reconcile on the next tick even if the address
    /// did not change
    pub fn resync(&self) -> bool {
        self.commands.send(LoopCommand::Resync).is_ok()
    }
}

enum Wake {
    Timer,
    Command(Option<LoopCommand>),
    Shutdown,
}

/// Timer-driven change detector and reconciliation driver
///
/// ## Lifecycle
///
/// 1. Create with [`PollLoop::new()`]
/// 2. Grab a [`LoopHandle`] and status receiver if needed
/// 3. Start with [`PollLoop::run()`] or drive single ticks with [`PollLoop::tick()`]
///
/// ## Threading
///
/// One tick runs to completion before the next one starts. The status
/// snapshot has exactly one writer: the loop.
pub struct PollLoop {
    /// Where the current address comes from
    source: Box<dyn AddressSource>,

    /// Applies the desired state
    reconciler: Reconciler,

    /// Flattened desired state
    targets: Vec<RecordTarget>,

    poll_interval: Duration,
    address_timeout: Duration,
    resync_interval: Option<Duration>,

    /// Last successfully observed address (`None` = unknown)
    cached_address: Option<String>,

    /// When the last pass finished
    last_pass: Option<Instant>,

    resync_requested: bool,

    status_tx: watch::Sender<ReconciliationStatus>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<LoopEvent>,

    command_tx: mpsc::UnboundedSender<LoopCommand>,
    command_rx: mpsc::UnboundedReceiver<LoopCommand>,
}

impl PollLoop {
    /// Create a new poll loop
    ///
    /// # Parameters
    ///
    /// - `source`: address source implementation
    /// - `provider`: DNS provider implementation
    /// - `desired`: the operator's desired state
    /// - `config`: engine settings
    ///
    /// # Returns
    ///
    /// A tuple of (loop, event_receiver) where event_receiver yields loop events
    pub fn new(
        source: Box<dyn AddressSource>,
        provider: Arc<dyn DnsProvider>,
        desired: &DesiredState,
        config: &EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<LoopEvent>)> {
        config.validate()?;

        let targets = desired.targets();
        if targets.is_empty() {
            return Err(Error::config("No records to reconcile"));
        }

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (status_tx, _) = watch::channel(ReconciliationStatus::default());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let poll_loop = Self {
            source,
            reconciler: Reconciler::from_config(provider, config),
            targets,
            poll_interval: config.poll_interval(),
            address_timeout: config.address_timeout(),
            resync_interval: config.resync_interval(),
            cached_address: None,
            last_pass: None,
            resync_requested: false,
            status_tx,
            event_tx,
            command_tx,
            command_rx,
        };

        Ok((poll_loop, event_rx))
    }

    /// Handle for shutdown and forced resyncs
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            commands: self.command_tx.clone(),
        }
    }

    /// Receiver that always holds the latest status snapshot
    pub fn status(&self) -> watch::Receiver<ReconciliationStatus> {
        self.status_tx.subscribe()
    }

    /// Stream of status snapshots, one per completed tick
    pub fn status_stream(&self) -> WatchStream<ReconciliationStatus> {
        WatchStream::new(self.status_tx.subscribe())
    }

    /// Current status snapshot
    pub fn snapshot(&self) -> ReconciliationStatus {
        self.status_tx.borrow().clone()
    }

    /// Targets reconciled on every pass
    pub fn targets(&self) -> &[RecordTarget] {
        &self.targets
    }

    /// Run the loop until Ctrl-C
    pub async fn run(&mut self) {
        self.run_internal(None).await
    }

    /// Run the loop until `shutdown_rx` fires (or, when `None`, until Ctrl-C)
    ///
    /// [`LoopHandle::shutdown`] stops the loop in both cases.
    pub async fn run_with_shutdown(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&mut self, mut shutdown_rx: Option<oneshot::Receiver<()>>) {
        self.emit_event(LoopEvent::Started {
            targets: self.targets.len(),
        });
        info!(
            "Poll loop started: {} target(s), checking every {:?}",
            self.targets.len(),
            self.poll_interval
        );

        let reason = loop {
            self.tick().await;

            let interval = self.poll_interval;
            let wake = tokio::select! {
                _ = tokio::time::sleep(interval) => Wake::Timer,
                command = self.command_rx.recv() => Wake::Command(command),
                _ = shutdown_signal(&mut shutdown_rx) => Wake::Shutdown,
            };

            match wake {
                Wake::Timer => {}
                Wake::Command(Some(LoopCommand::Resync)) => {
                    info!("Resync requested");
                    self.resync_requested = true;
                }
                Wake::Command(Some(LoopCommand::Shutdown)) => break "Shutdown requested",
                // The loop owns a sender, so the channel cannot close
                Wake::Command(None) => {}
                Wake::Shutdown => break "Shutdown signal",
            }
        };

        info!("Poll loop stopped: {}", reason);
        self.emit_event(LoopEvent::Stopped {
            reason: reason.to_string(),
        });
    }

    /// Run exactly one tick: check the address and reconcile if needed
    pub async fn tick(&mut self) -> TickOutcome {
        debug!("Checking for address changes");

        let address = match self.observe().await {
            Ok(address) => address,
            Err(e) => {
                warn!(
                    "Address unavailable from {}: {}",
                    self.source.source_name(),
                    e
                );
                let checked = Utc::now();
                self.status_tx.send_modify(|s| s.last_check = Some(checked));
                self.emit_event(LoopEvent::AddressUnavailable {
                    error: e.to_string(),
                });
                return TickOutcome::AddressUnavailable {
                    error: e.to_string(),
                };
            }
        };

        let changed = self.cached_address.as_deref() != Some(address.as_str());
        if !changed && !self.resync_due() {
            debug!("Address unchanged: {}", address);
            let checked = Utc::now();
            self.status_tx.send_modify(|s| s.last_check = Some(checked));
            self.emit_event(LoopEvent::AddressUnchanged {
                address: address.clone(),
            });
            return TickOutcome::Unchanged { address };
        }

        let previous = self.cached_address.clone();
        if changed {
            info!(
                "Address changed {} -> {}",
                previous.as_deref().unwrap_or("unknown"),
                address
            );
            self.emit_event(LoopEvent::AddressChanged {
                previous: previous.clone(),
                current: address.clone(),
            });
        } else {
            info!("Forcing resync for {}", address);
        }

        let report = self.reconciler.apply(&self.targets, &address).await;
        self.resync_requested = false;
        self.last_pass = Some(Instant::now());
        self.emit_report(&report);

        let finished = Utc::now();
        if changed {
            self.cached_address = Some(address.clone());
            self.status_tx.send_modify(|s| {
                s.last_check = Some(finished);
                s.last_change = Some(finished);
                s.last_address = Some(address);
            });
            TickOutcome::Changed { previous, report }
        } else {
            self.status_tx.send_modify(|s| s.last_check = Some(finished));
            TickOutcome::Resynced { report }
        }
    }

    /// Fetch the address under the configured timeout
    async fn observe(&self) -> Result<String> {
        let fetched = tokio::time::timeout(self.address_timeout, self.source.current())
            .await
            .map_err(|_| Error::timeout("address fetch", self.address_timeout))??;

        let address = fetched.trim();
        if address.is_empty() {
            return Err(Error::address_unavailable(format!(
                "{} returned an empty address",
                self.source.source_name()
            )));
        }
        Ok(address.to_string())
    }

    fn resync_due(&self) -> bool {
        if self.resync_requested {
            return true;
        }
        match (self.resync_interval, self.last_pass) {
            (Some(interval), Some(last_pass)) => last_pass.elapsed() >= interval,
            _ => false,
        }
    }

    fn emit_report(&self, report: &ReconcileReport) {
        for entry in &report.outcomes {
            let event = match &entry.outcome {
                RecordOutcome::Failed { error, retryable } => LoopEvent::RecordFailed {
                    record_name: entry.record_name.clone(),
                    error: error.clone(),
                    retryable: *retryable,
                },
                outcome => LoopEvent::RecordReconciled {
                    record_name: entry.record_name.clone(),
                    outcome: outcome.clone(),
                },
            };
            self.emit_event(event);
        }

        self.emit_event(LoopEvent::PassCompleted {
            address: report.address.clone(),
            succeeded: report.succeeded(),
            failed: report.failed(),
        });
    }

    /// Emit a loop event
    fn emit_event(&self, event: LoopEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            // Channel is full: event processing is slower than event
            // generation. The event is dropped to bound memory.
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

/// Resolves when the external shutdown signal fires
async fn shutdown_signal(shutdown_rx: &mut Option<oneshot::Receiver<()>>) {
    match shutdown_rx {
        Some(rx) => {
            let _ = rx.await;
        }
        None => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
