// # HTTP Address Source
//
// Discovers the public address by asking plain-text "what is my IP"
// services, e.g. `https://myexternalip.com/raw`.
//
// ## Behaviour
//
// - URLs are tried in order; the first usable answer wins
// - The body is trimmed and otherwise passed through verbatim
// - An empty body counts as a failure, so the next URL is tried
// - With a version filter, the answer must parse as an IP of that family
// - Each request has its own timeout, so a hanging service still leaves
//   time for the next one
// - No caching: every call is a fresh observation; the poll loop owns
//   change detection and scheduling

use dyndns_core::ProviderRegistry;
use dyndns_core::config::{AddressSourceConfig, IpVersion};
use dyndns_core::traits::{AddressSource, AddressSourceFactory};
use dyndns_core::{Error, Result};

use std::net::IpAddr;
use std::time::Duration;

/// Address source backed by one or more HTTP services
#[derive(Debug)]
pub struct HttpAddressSource {
    /// Service URLs, in failover order
    urls: Vec<String>,

    /// Family filter; `None` accepts any non-empty answer
    version: Option<IpVersion>,

    client: reqwest::Client,
}

impl HttpAddressSource {
    /// Create a new HTTP address source
    ///
    /// # Parameters
    ///
    /// - `urls`: services returning the caller's address as plain text
    /// - `version`: optional family filter
    /// - `request_timeout`: bound on one request to one URL
    pub fn new(
        urls: Vec<String>,
        version: Option<IpVersion>,
        request_timeout: Duration,
    ) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::config("HTTP address source needs at least one URL"));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            urls,
            version,
            client,
        })
    }

    /// Configured service URLs
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Fetch the address from a single service
    async fn fetch_from(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::http(format!(
                "{} answered with HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response from {}: {}", url, e)))?;

        accept(&body, self.version)
    }
}

/// Turn a response body into an address
///
/// Trims whitespace, rejects an empty answer and applies the family filter.
pub fn accept(body: &str, version: Option<IpVersion>) -> Result<String> {
    let text = body.trim();
    if text.is_empty() {
        return Err(Error::address_unavailable("Service returned an empty body"));
    }

    let Some(version) = version else {
        return Ok(text.to_string());
    };

    let ip: IpAddr = text
        .parse()
        .map_err(|_| Error::invalid_input(format!("Invalid IP address: {}", text)))?;

    match version {
        IpVersion::V4 if !ip.is_ipv4() => {
            Err(Error::invalid_input(format!("Expected IPv4, got: {}", ip)))
        }
        IpVersion::V6 if !ip.is_ipv6() => {
            Err(Error::invalid_input(format!("Expected IPv6, got: {}", ip)))
        }
        _ => Ok(text.to_string()),
    }
}

#[async_trait::async_trait]
impl AddressSource for HttpAddressSource {
    async fn current(&self) -> Result<String> {
        let mut last_error = None;

        for url in &self.urls {
            match self.fetch_from(url).await {
                Ok(address) => {
                    tracing::debug!("Address from {}: {}", url, address);
                    return Ok(address);
                }
                Err(e) => {
                    tracing::warn!("Address service failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(Error::address_unavailable(format!(
            "All {} address service(s) failed; last error: {}",
            self.urls.len(),
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP address sources
pub struct HttpFactory;

impl AddressSourceFactory for HttpFactory {
    fn create(&self, config: &AddressSourceConfig) -> Result<Box<dyn AddressSource>> {
        match config {
            AddressSourceConfig::Http {
                urls,
                version,
                request_timeout_secs,
            } => Ok(Box::new(HttpAddressSource::new(
                urls.clone(),
                *version,
                Duration::from_secs(*request_timeout_secs),
            )?)),
            _ => Err(Error::config("Invalid config for HTTP address source")),
        }
    }
}

/// Register the HTTP address source with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_address_source("http", Box::new(HttpFactory));
}
