// # Address Source Trait
//
// Defines the interface for discovering this host's current public address.
//
// ## Implementations
//
// - HTTP plain-text services: `dyndns-ip-http` crate
// - Tests: scripted sources in `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::AddressSource;
//
// match source.current().await {
//     Ok(address) => println!("public address: {address}"),
//     Err(e) => println!("no observation this tick: {e}"),
// }
// ```

use async_trait::async_trait;

/// Trait for address source implementations
///
/// An address source is an observer. It answers "what is my address right
/// now" and nothing else: the poll loop owns scheduling, change detection
/// and timeouts.
///
/// # Returned value
///
/// The address is returned as text and passed through verbatim to the
/// provider. Implementations should trim surrounding whitespace and must
/// report an empty answer as [`crate::Error::AddressUnavailable`].
///
/// # Failure
///
/// Transient network failures are returned as `Err`, never as a panic. The
/// poll loop treats any error as "no observation this tick".
#[async_trait]
pub trait AddressSource: Send + Sync {
    /// Fetch the current external address
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The current address (non-empty)
    /// - `Err(Error)`: If the address could not be determined
    async fn current(&self) -> Result<String, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing address sources from configuration
pub trait AddressSourceFactory: Send + Sync {
    /// Create an AddressSource instance from configuration
    fn create(
        &self,
        config: &crate::config::AddressSourceConfig,
    ) -> Result<Box<dyn AddressSource>, crate::Error>;
}
