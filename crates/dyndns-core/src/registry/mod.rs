//! Plugin-based provider registry
//!
//! DNS providers and address sources register a factory under their type
//! name; the daemon then builds whatever the configuration asks for without
//! an if-else chain over known implementations.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dyndns_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! dyndns_provider_cloudflare::register(&registry);
//! dyndns_ip_http::register(&registry);
//!
//! let provider = registry.create_provider(&config.provider)?;
//! let source = registry.create_address_source(&config.address_source)?;
//! ```

use crate::config::{AddressSourceConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{AddressSource, AddressSourceFactory, DnsProvider, DnsProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

type FactoryMap<F> = RwLock<HashMap<String, Box<F>>>;

/// Registry of provider and address source factories
///
/// ## Thread Safety
///
/// Interior mutability through RwLock: concurrent lookups, exclusive
/// registration. A poisoned lock is recovered, since the maps are only ever
/// replaced entry by entry.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: FactoryMap<dyn DnsProviderFactory>,

    /// Registered address source factories
    address_sources: FactoryMap<dyn AddressSourceFactory>,
}

fn read<T: ?Sized>(map: &FactoryMap<T>) -> RwLockReadGuard<'_, HashMap<String, Box<T>>> {
    map.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T: ?Sized>(map: &FactoryMap<T>) -> RwLockWriteGuard<'_, HashMap<String, Box<T>>> {
    map.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name, as used in the config `type` field
    /// - `factory`: Factory object for creating provider instances
    ///
    /// Registering the same name twice replaces the earlier factory.
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        write(&self.providers).insert(name.into(), factory);
    }

    /// Register an address source factory
    pub fn register_address_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn AddressSourceFactory>,
    ) {
        write(&self.address_sources).insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn DnsProvider>)`: Shared provider instance
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Arc<dyn DnsProvider>> {
        let provider_type = config.type_name();
        let providers = read(&self.providers);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config).map(Arc::from)
    }

    /// Create an address source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn AddressSource>)`: Created address source
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub fn create_address_source(
        &self,
        config: &AddressSourceConfig,
    ) -> Result<Box<dyn AddressSource>> {
        let source_type = config.type_name();
        let sources = read(&self.address_sources);

        let factory = sources.get(source_type).ok_or_else(|| {
            Error::config(format!("Unknown address source type: {}", source_type))
        })?;

        factory.create(config)
    }

    /// Registered provider type names, sorted
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.providers).keys().cloned().collect();
        names.sort();
        names
    }

    /// Registered address source type names, sorted
    pub fn list_address_sources(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.address_sources).keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        read(&self.providers).contains_key(name)
    }

    /// Check if an address source type is registered
    pub fn has_address_source(&self, name: &str) -> bool {
        read(&self.address_sources).contains_key(name)
    }
}
