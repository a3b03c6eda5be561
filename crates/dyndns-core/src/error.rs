//! Error types for the DynDNS reconciler
//!
//! Every fallible operation in the workspace returns [`Result`]. Errors raised
//! while reconciling a single record never escape the reconciler; they are
//! captured per target and reported (see [`crate::reconciler`]).

use std::time::Duration;
use thiserror::Error;

/// Result type alias for DynDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DynDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// The address source failed or returned an empty value
    #[error("Address unavailable: {0}")]
    AddressUnavailable(String),

    /// The provider could not map a domain to a zone
    #[error("Zone resolution failed for {domain}: {message}")]
    ZoneResolution {
        /// Domain that could not be resolved
        domain: String,
        /// Underlying failure
        message: String,
    },

    /// A create/update/delete call failed for a single record
    #[error("{operation} failed for {record}: {message}")]
    ProviderMutation {
        /// Operation name ("create", "update", "delete")
        operation: &'static str,
        /// Record name the operation targeted
        record: String,
        /// Underlying failure
        message: String,
    },

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
        /// Whether repeating the call may succeed
        retryable: bool,
    },

    /// A bounded call did not complete in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Configured bound
        after: Duration,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors (config file access)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Zone or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create an address-unavailable error
    pub fn address_unavailable(msg: impl Into<String>) -> Self {
        Self::AddressUnavailable(msg.into())
    }

    /// Create a zone resolution error
    pub fn zone_resolution(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ZoneResolution {
            domain: domain.into(),
            message: message.into(),
        }
    }

    /// Create a provider mutation error
    pub fn mutation(
        operation: &'static str,
        record: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ProviderMutation {
            operation,
            record: record.into(),
            message: message.into(),
        }
    }

    /// Create a non-retryable provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a retryable provider-specific error (5xx, transport failures)
    pub fn provider_transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the failed operation may succeed if repeated later
    ///
    /// The reconciler never retries within a pass; this flag is surfaced in
    /// logs and events so operators can tell transient failures from
    /// configuration mistakes.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::AddressUnavailable(_)
            | Self::Timeout { .. }
            | Self::Http(_)
            | Self::RateLimited(_)
            | Self::Io(_) => true,
            Self::ZoneResolution { .. } | Self::ProviderMutation { .. } => true,
            Self::Config(_)
            | Self::Json(_)
            | Self::Authentication(_)
            | Self::NotFound(_)
            | Self::InvalidInput(_) => false,
        }
    }
}
