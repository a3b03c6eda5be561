//! Configuration types for the DynDNS system
//!
//! The configuration is a JSON document, optionally overridden by
//! environment variables, validated once at startup. It is the only place a
//! [`DesiredState`] is built from.
//!
//! ```json
//! {
//!   "provider": { "type": "cloudflare", "api_token": "..." },
//!   "address_source": { "type": "http", "urls": ["https://myexternalip.com/raw"] },
//!   "default_records": [ { "label": "@", "proxied": true } ],
//!   "websites": [
//!     { "domains": ["example.com"], "records": [ { "label": "home", "proxied": false } ] }
//!   ],
//!   "engine": { "poll_interval_secs": 60 }
//! }
//! ```
//!
//! Record entries also accept the older `zone`/`proxy` keys, website entries
//! `domain`/`zones`, and the default set `defaultzones`. A document without a
//! `provider` object may carry Cloudflare credentials at the top level
//! instead (`apikey` + `email`, or `api_token`), which is how older flat
//! `config.json` files are laid out.

use crate::model::{APEX_LABEL, DesiredState, DomainEntry, RecordSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the Cloudflare API token
pub const ENV_API_TOKEN: &str = "DYNDNS_API_TOKEN";
/// Environment variable overriding the Cloudflare global API key
pub const ENV_API_KEY: &str = "DYNDNS_API_KEY";
/// Environment variable overriding the Cloudflare account email
pub const ENV_EMAIL: &str = "DYNDNS_EMAIL";
/// Environment variable overriding the poll interval
pub const ENV_POLL_INTERVAL_SECS: &str = "DYNDNS_POLL_INTERVAL_SECS";
/// Environment variable replacing the address source URL list
pub const ENV_ADDRESS_URL: &str = "DYNDNS_ADDRESS_URL";
/// Environment variable naming the configuration file
pub const ENV_CONFIG: &str = "DYNDNS_CONFIG";
/// Environment variable selecting the log level
pub const ENV_LOG_LEVEL: &str = "DYNDNS_LOG_LEVEL";
/// Environment variable selecting the run mode (`dry-run` disables writes)
pub const ENV_MODE: &str = "DYNDNS_MODE";

/// Whether a `DYNDNS_MODE` value asks for dry-run
pub fn is_dry_run_mode(mode: Option<&str>) -> bool {
    mode.is_some_and(|m| m.trim().eq_ignore_ascii_case("dry-run"))
}

/// Main DynDNS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct DyndnsConfig {
    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// Public address source configuration
    #[serde(default)]
    pub address_source: AddressSourceConfig,

    /// Records applied to every domain
    #[serde(default, alias = "defaultzones")]
    pub default_records: Vec<RecordSpec>,

    /// Domain groups and their own records
    #[serde(default)]
    pub websites: Vec<DomainEntry>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Document shape as written on disk
///
/// Either `provider` is present, or the Cloudflare credentials sit at the top
/// level of the document.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    provider: Option<ProviderConfig>,

    #[serde(default, alias = "apikey")]
    api_key: Option<String>,
    #[serde(default)]
    api_token: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    zone_id: Option<String>,

    #[serde(default)]
    address_source: AddressSourceConfig,
    #[serde(default, alias = "defaultzones")]
    default_records: Vec<RecordSpec>,
    #[serde(default)]
    websites: Vec<DomainEntry>,
    #[serde(default)]
    engine: EngineConfig,
}

impl TryFrom<RawConfig> for DyndnsConfig {
    type Error = String;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let has_flat_credentials = raw.api_key.is_some()
            || raw.api_token.is_some()
            || raw.email.is_some()
            || raw.zone_id.is_some();

        let provider = match raw.provider {
            Some(provider) if has_flat_credentials => {
                return Err(format!(
                    "top-level credentials cannot be combined with a '{}' provider section",
                    provider.type_name()
                ));
            }
            Some(provider) => provider,
            None if has_flat_credentials => ProviderConfig::Cloudflare {
                api_token: raw.api_token,
                api_key: raw.api_key,
                email: raw.email,
                zone_id: raw.zone_id,
            },
            None => {
                return Err(
                    "missing field `provider` (or top-level `apikey` and `email`)".to_string(),
                );
            }
        };

        Ok(DyndnsConfig {
            provider,
            address_source: raw.address_source,
            default_records: raw.default_records,
            websites: raw.websites,
            engine: raw.engine,
        })
    }
}

impl DyndnsConfig {
    /// Create a new configuration with defaults
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            address_source: AddressSourceConfig::default(),
            default_records: Vec::new(),
            websites: Vec::new(),
            engine: EngineConfig::default(),
        }
    }

    /// Parse a configuration document
    pub fn from_json(text: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Read a configuration file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DYNDNS_*` overrides from the given variables
    ///
    /// Takes the variables as an iterator so callers decide where they come
    /// from (the process environment in production).
    pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<(), crate::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                ENV_API_TOKEN => {
                    if let ProviderConfig::Cloudflare { api_token, .. } = &mut self.provider {
                        *api_token = Some(value);
                    }
                }
                ENV_API_KEY => {
                    if let ProviderConfig::Cloudflare { api_key, .. } = &mut self.provider {
                        *api_key = Some(value);
                    }
                }
                ENV_EMAIL => {
                    if let ProviderConfig::Cloudflare { email, .. } = &mut self.provider {
                        *email = Some(value);
                    }
                }
                ENV_POLL_INTERVAL_SECS => {
                    self.engine.poll_interval_secs = value.trim().parse().map_err(|_| {
                        crate::Error::config(format!(
                            "{} must be a number of seconds. Got: {}",
                            ENV_POLL_INTERVAL_SECS, value
                        ))
                    })?;
                }
                ENV_ADDRESS_URL => {
                    if let AddressSourceConfig::Http { urls, .. } = &mut self.address_source {
                        *urls = value
                            .split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect();
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.websites.is_empty() {
            return Err(crate::Error::config("No websites configured"));
        }

        for entry in &self.websites {
            if entry.domains.is_empty() {
                return Err(crate::Error::config("Website entry has no domain names"));
            }
            for domain in &entry.domains {
                validate_domain_name(domain)?;
            }
            for spec in &entry.records {
                validate_label(&spec.label)?;
            }
        }

        for spec in &self.default_records {
            validate_label(&spec.label)?;
        }

        self.provider.validate()?;
        self.address_source.validate()?;
        self.engine.validate()?;
        self.address_source
            .validate_budget(self.engine.address_timeout())?;

        Ok(())
    }

    /// Build the immutable desired-state model
    pub fn desired_state(&self) -> DesiredState {
        DesiredState::new(self.websites.clone(), self.default_records.clone())
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks: total length, label length, characters, hyphen
/// placement.
pub fn validate_domain_name(domain: &str) -> Result<(), crate::Error> {
    if domain.is_empty() {
        return Err(crate::Error::config("Domain name cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        return Err(crate::Error::config(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    for label in domain.split('.') {
        validate_dns_label(label, domain)?;
    }

    Ok(())
}

/// Validate a record label: `"@"`, or one or more DNS labels with an
/// optional leading `*` wildcard
pub fn validate_label(label: &str) -> Result<(), crate::Error> {
    if label.is_empty() {
        return Err(crate::Error::config("Record label cannot be empty"));
    }
    if label == APEX_LABEL {
        return Ok(());
    }

    for (i, part) in label.split('.').enumerate() {
        if i == 0 && part == "*" {
            continue;
        }
        validate_dns_label(part, label)?;
    }
    Ok(())
}

fn validate_dns_label(label: &str, whole: &str) -> Result<(), crate::Error> {
    if label.is_empty() {
        return Err(crate::Error::config(format!("Empty label in '{}'", whole)));
    }

    if label.len() > 63 {
        return Err(crate::Error::config(format!(
            "Label too long: {} chars (max 63). Label: '{}'",
            label.len(),
            label
        )));
    }

    // Alphanumeric and hyphen, plus underscore for service-style names
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(crate::Error::config(format!(
            "Label contains invalid characters. Label: '{}'. \
            Valid: alphanumeric, hyphen and underscore.",
            label
        )));
    }

    if label.starts_with('-') || label.ends_with('-') {
        return Err(crate::Error::config(format!(
            "Label cannot start or end with hyphen. Label: '{}'",
            label
        )));
    }

    Ok(())
}

/// IP family filter for address sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 only
    V6,
    /// Both IPv4 and IPv6
    Both,
}

/// Address source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AddressSourceConfig {
    /// Plain-text HTTP services, tried in order
    Http {
        /// Service URLs
        #[serde(default = "default_address_urls")]
        urls: Vec<String>,
        /// Optional family filter; `None` passes the answer through verbatim
        #[serde(default)]
        version: Option<IpVersion>,
        /// Bound on one request to one URL (in seconds)
        ///
        /// Every URL must fit in the engine's `address_timeout_secs`, or the
        /// later ones are never reached when an earlier one hangs.
        #[serde(default = "default_request_timeout_secs")]
        request_timeout_secs: u64,
    },

    /// Custom address source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl AddressSourceConfig {
    /// Validate the address source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            AddressSourceConfig::Http {
                urls,
                request_timeout_secs,
                ..
            } => {
                if *request_timeout_secs == 0 {
                    return Err(crate::Error::config("request_timeout_secs must be > 0"));
                }
                if urls.is_empty() {
                    return Err(crate::Error::config(
                        "HTTP address source needs at least one URL",
                    ));
                }
                for url in urls {
                    if !url.starts_with("https://") && !url.starts_with("http://") {
                        return Err(crate::Error::config(format!(
                            "Address source URL must use HTTP or HTTPS scheme. Got: {}",
                            url
                        )));
                    }
                }
                Ok(())
            }
            AddressSourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom address source factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom address source config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Check that trying every URL fits in one address fetch
    ///
    /// The loop bounds the whole fetch by `address_timeout`; with a hanging
    /// URL each attempt takes the full per-request timeout, so all attempts
    /// together must finish before that bound.
    pub fn validate_budget(&self, address_timeout: Duration) -> Result<(), crate::Error> {
        if let AddressSourceConfig::Http {
            urls,
            request_timeout_secs,
            ..
        } = self
        {
            let needed = (urls.len() as u64).saturating_mul(*request_timeout_secs);
            if needed >= address_timeout.as_secs() {
                return Err(crate::Error::config(format!(
                    "{} address URL(s) x request_timeout_secs {} = {}s must be below \
                    address_timeout_secs {}s. Lower request_timeout_secs or raise \
                    address_timeout_secs",
                    urls.len(),
                    request_timeout_secs,
                    needed,
                    address_timeout.as_secs()
                )));
            }
        }
        Ok(())
    }

    /// Get the address source type name
    pub fn type_name(&self) -> &str {
        match self {
            AddressSourceConfig::Http { .. } => "http",
            AddressSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for AddressSourceConfig {
    fn default() -> Self {
        AddressSourceConfig::Http {
            urls: default_address_urls(),
            version: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_address_urls() -> Vec<String> {
    vec!["https://myexternalip.com/raw".to_string()]
}

fn default_request_timeout_secs() -> u64 {
    3
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    ///
    /// Authenticate with either an API token, or a global API key plus the
    /// account email.
    Cloudflare {
        /// API token (Bearer auth)
        #[serde(default)]
        api_token: Option<String>,
        /// Global API key
        #[serde(default, alias = "apikey")]
        api_key: Option<String>,
        /// Account email paired with the global API key
        #[serde(default)]
        email: Option<String>,
        /// Zone ID (optional, skips zone lookup)
        #[serde(default)]
        zone_id: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Cloudflare provider authenticated with an API token
    pub fn cloudflare_token(api_token: impl Into<String>) -> Self {
        ProviderConfig::Cloudflare {
            api_token: Some(api_token.into()),
            api_key: None,
            email: None,
            zone_id: None,
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                api_key,
                email,
                ..
            } => {
                let has_token = api_token.as_deref().is_some_and(|t| !t.is_empty());
                let has_key = api_key.as_deref().is_some_and(|k| !k.is_empty())
                    && email.as_deref().is_some_and(|e| !e.is_empty());
                if !has_token && !has_key {
                    return Err(crate::Error::config(format!(
                        "Cloudflare needs api_token, or api_key and email. \
                        Set it via: export {}=your_token",
                        ENV_API_TOKEN
                    )));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between address checks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Bound on a single address fetch (in seconds)
    #[serde(default = "default_address_timeout_secs")]
    pub address_timeout_secs: u64,

    /// Bound on a single provider call (in seconds)
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// How many domains are reconciled at the same time
    ///
    /// Targets under one domain are always handled one after another.
    #[serde(default = "default_max_concurrent_domains")]
    pub max_concurrent_domains: usize,

    /// Skip the update call when the single existing record already matches
    #[serde(default = "default_skip_unchanged")]
    pub skip_unchanged: bool,

    /// Reconcile even without an address change once this many seconds
    /// have passed since the last pass. 0 disables forced resyncs.
    #[serde(default)]
    pub resync_interval_secs: u64,

    /// Capacity of the loop event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate engine settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("poll_interval_secs must be > 0"));
        }
        if self.address_timeout_secs == 0 || self.provider_timeout_secs == 0 {
            return Err(crate::Error::config("Timeouts must be > 0"));
        }
        if self.max_concurrent_domains == 0 {
            return Err(crate::Error::config("max_concurrent_domains must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }
        Ok(())
    }

    /// Interval between ticks
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Bound on one address fetch
    pub fn address_timeout(&self) -> Duration {
        Duration::from_secs(self.address_timeout_secs)
    }

    /// Bound on one provider call
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    /// Forced resync interval, if enabled
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            address_timeout_secs: default_address_timeout_secs(),
            provider_timeout_secs: default_provider_timeout_secs(),
            max_concurrent_domains: default_max_concurrent_domains(),
            skip_unchanged: default_skip_unchanged(),
            resync_interval_secs: 0,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_address_timeout_secs() -> u64 {
    10
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_domains() -> usize {
    4
}

fn default_skip_unchanged() -> bool {
    true
}

fn default_event_channel_capacity() -> usize {
    1000
}
