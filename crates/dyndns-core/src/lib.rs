// # dyndns-core
//
// Core library for keeping DNS records pointed at a dynamic public address.
//
// ## Architecture Overview
//
// - **AddressSource**: Trait for discovering the current public address
// - **DnsProvider**: Trait for reading and mutating records via a provider API
// - **DesiredState**: Immutable model of which records should exist
// - **Reconciler**: Converges provider records to one observed address
// - **PollLoop**: Timer-driven change detection around the reconciler
// - **ProviderRegistry**: Plugin-based registry for providers and sources
//
// ```text
//  AddressSource ──▶ PollLoop ──(changed)──▶ Reconciler ──▶ DnsProvider
//                       │                        ▲
//                       ▼                        │
//              ReconciliationStatus         DesiredState
// ```
//
// The loop keeps no state beyond the last observed address, which lives in
// memory only. After a restart the first successful observation always
// triggers a full pass.

pub mod config;
pub mod error;
pub mod model;
pub mod poll_loop;
pub mod reconciler;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use config::{AddressSourceConfig, DyndnsConfig, EngineConfig, IpVersion, ProviderConfig};
pub use error::{Error, Result};
pub use model::{DesiredState, DomainEntry, RecordSpec, RecordTarget};
pub use poll_loop::{LoopEvent, LoopHandle, PollLoop, ReconciliationStatus, TickOutcome};
pub use reconciler::{ReconcileReport, Reconciler, RecordOutcome, TargetOutcome};
pub use registry::ProviderRegistry;
pub use traits::{AddressSource, DnsProvider, LiveRecord, RecordDraft, RecordType};
