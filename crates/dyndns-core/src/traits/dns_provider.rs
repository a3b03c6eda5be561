// # DNS Provider Trait
//
// Capability interface over a remote DNS provider.
//
// ## Implementations
//
// - Cloudflare: `dyndns-provider-cloudflare` crate
// - Tests: in-memory fake in `tests/common`
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::traits::{DnsProvider, RecordDraft, RecordType};
//
// let zone_id = provider.resolve_zone("example.com").await?;
// let existing = provider
//     .list_records(&zone_id, RecordType::A, "home.example.com")
//     .await?;
// if existing.is_empty() {
//     let draft = RecordDraft::new(RecordType::A, "home.example.com", "203.0.113.5", false);
//     provider.create_record(&zone_id, &draft).await?;
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address record type
///
/// Only address records are managed; anything else is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Pick the record type for an observed address
    ///
    /// Addresses are passed through verbatim, so anything that does not
    /// parse as IPv6 is treated as an `A` record.
    pub fn for_address(address: &str) -> Self {
        match address.parse::<std::net::IpAddr>() {
            Ok(std::net::IpAddr::V6(_)) => RecordType::Aaaa,
            _ => RecordType::A,
        }
    }

    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-side record as returned by a listing
///
/// Owned by the provider. The reconciler only reads it within one pass and
/// never caches it across polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRecord {
    /// Opaque provider record ID
    pub id: String,
    /// Record type
    pub record_type: RecordType,
    /// Fully qualified record name
    pub name: String,
    /// Current record content (the address)
    pub content: String,
    /// Whether traffic is routed through the provider's edge
    pub proxied: bool,
}

impl LiveRecord {
    /// Whether this record already matches the desired content and proxy flag
    pub fn matches(&self, draft: &RecordDraft) -> bool {
        self.content == draft.content && self.proxied == draft.proxied
    }
}

/// Desired shape of a record, sent on create and update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDraft {
    /// Record type
    pub record_type: RecordType,
    /// Fully qualified record name
    pub name: String,
    /// Desired content (the address)
    pub content: String,
    /// Desired proxy flag
    pub proxied: bool,
}

impl RecordDraft {
    /// Create a new record draft
    pub fn new(
        record_type: RecordType,
        name: impl Into<String>,
        content: impl Into<String>,
        proxied: bool,
    ) -> Self {
        Self {
            record_type,
            name: name.into(),
            content: content.into(),
            proxied,
        }
    }
}

/// Trait for DNS provider implementations
///
/// Implementations must be thread-safe; the reconciler shares one provider
/// across concurrently reconciled domains.
///
/// # Contract
///
/// - Every method is a single provider interaction: no retries, no backoff,
///   no background tasks. The reconciler owns timeouts and error policy.
/// - No caching of record state beyond a single call.
/// - All methods except [`DnsProvider::create_record`] are safe to repeat.
///   The reconciler only creates when a listing returned zero matches.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Map a domain to the provider's zone identifier
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The zone ID
    /// - `Err(Error)`: If no zone could be found or the lookup failed
    async fn resolve_zone(&self, domain: &str) -> Result<String, crate::Error>;

    /// List all records of `record_type` whose name exactly equals `name`
    ///
    /// The result may be empty, or hold more than one record when the
    /// provider's data is inconsistent.
    async fn list_records(
        &self,
        zone_id: &str,
        record_type: RecordType,
        name: &str,
    ) -> Result<Vec<LiveRecord>, crate::Error>;

    /// Create a record
    ///
    /// # Returns
    ///
    /// The record as stored by the provider
    async fn create_record(
        &self,
        zone_id: &str,
        draft: &RecordDraft,
    ) -> Result<LiveRecord, crate::Error>;

    /// Overwrite an existing record with the draft's content and proxy flag
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        draft: &RecordDraft,
    ) -> Result<(), crate::Error>;

    /// Delete a record
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_type_for_address() {
        assert_eq!(RecordType::for_address("203.0.113.5"), RecordType::A);
        assert_eq!(RecordType::for_address("2001:db8::1"), RecordType::Aaaa);
        // Unparseable input is passed through as an A record
        assert_eq!(RecordType::for_address("not-an-ip"), RecordType::A);
    }

    #[test]
    fn test_live_record_matches() {
        let live = LiveRecord {
            id: "r1".to_string(),
            record_type: RecordType::A,
            name: "example.com".to_string(),
            content: "203.0.113.5".to_string(),
            proxied: true,
        };

        assert!(live.matches(&RecordDraft::new(RecordType::A, "example.com", "203.0.113.5", true)));
        assert!(!live.matches(&RecordDraft::new(RecordType::A, "example.com", "203.0.113.5", false)));
        assert!(!live.matches(&RecordDraft::new(RecordType::A, "example.com", "203.0.113.9", true)));
    }
}
