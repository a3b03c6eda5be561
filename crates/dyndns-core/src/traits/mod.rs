//! Core traits for the DynDNS system
//!
//! This module defines the capability interfaces the reconciler depends on.
//!
//! - [`AddressSource`]: Discover the current public address
//! - [`DnsProvider`]: Read and mutate records via a provider API

pub mod address_source;
pub mod dns_provider;

pub use address_source::{AddressSource, AddressSourceFactory};
pub use dns_provider::{DnsProvider, DnsProviderFactory, LiveRecord, RecordDraft, RecordType};
