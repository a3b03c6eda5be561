// # Cloudflare DNS Provider
//
// Cloudflare API v4 implementation of `DnsProvider`.
//
// ## Behaviour
//
// - One HTTP request per trait call (zone discovery may walk a few names)
// - Errors are propagated unchanged in kind; the reconciler decides what a
//   failure means for the pass
// - HTTP timeout of 30 seconds per request
// - Status codes mapped to specific errors (401/403, 404, 409, 429, 5xx)
// - Dry-run mode: reads go out, writes are only logged
// - A and AAAA records
// - Zone discovery by name, or a fixed zone ID from the configuration
//
// No retries, no caching, no background tasks.
//
// ## Security Requirements
//
// - Credentials NEVER appear in logs or Debug output
// - The provider refuses to build with empty credentials
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=...&name=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Overwrite DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

mod api;

use api::{Deleted, DnsRecord, Envelope, RecordBody, Zone};
use async_trait::async_trait;
use dyndns_core::config::{ENV_MODE, ProviderConfig, is_dry_run_mode};
use dyndns_core::traits::{
    DnsProvider, DnsProviderFactory, LiveRecord, RecordDraft, RecordType,
};
use dyndns_core::{Error, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for record listings; one name never has more records than this
const RECORDS_PER_PAGE: &str = "100";

const PROVIDER: &str = "cloudflare";

/// How requests are authenticated
#[derive(Clone)]
pub enum Credentials {
    /// Scoped API token, sent as a Bearer header
    Token(String),
    /// Global API key plus account email, sent as `X-Auth-Key`/`X-Auth-Email`
    GlobalKey { key: String, email: String },
}

impl Credentials {
    /// Pick credentials from configuration fields; a token wins over a key
    pub fn from_parts(
        api_token: Option<&str>,
        api_key: Option<&str>,
        email: Option<&str>,
    ) -> Result<Self> {
        let present = |v: Option<&str>| v.filter(|s| !s.trim().is_empty()).map(str::to_string);

        if let Some(token) = present(api_token) {
            return Ok(Credentials::Token(token));
        }
        match (present(api_key), present(email)) {
            (Some(key), Some(email)) => Ok(Credentials::GlobalKey { key, email }),
            _ => Err(Error::config(
                "Cloudflare needs api_token, or api_key and email",
            )),
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Token(token) => request.bearer_auth(token),
            Credentials::GlobalKey { key, email } => request
                .header("X-Auth-Key", key)
                .header("X-Auth-Email", email),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Credentials::Token(_) => "token",
            Credentials::GlobalKey { .. } => "global-key",
        }
    }
}

// Custom Debug implementation that hides the secrets
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Credentials::Token(_) => "Token(<REDACTED>)",
            Credentials::GlobalKey { .. } => "GlobalKey(<REDACTED>)",
        })
    }
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended POST/PUT/DELETE
/// - **NOT** modify any record
///
/// # Security
///
/// The Debug implementation does NOT expose credentials.
pub struct CloudflareProvider {
    /// ⚠️ NEVER log this value
    credentials: Credentials,

    /// Fixed zone ID; skips discovery for every domain
    zone_id: Option<String>,

    client: reqwest::Client,

    dry_run: bool,
}

impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("credentials", &self.credentials)
            .field("zone_id", &self.zone_id)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// # Parameters
    ///
    /// - `credentials`: token with Zone:DNS:Edit permission, or global key
    /// - `zone_id`: optional fixed zone ID
    /// - `dry_run`: if true, perform reads but skip writes
    pub fn new(credentials: Credentials, zone_id: Option<String>, dry_run: bool) -> Result<Self> {
        let empty = match &credentials {
            Credentials::Token(token) => token.is_empty(),
            Credentials::GlobalKey { key, email } => key.is_empty() || email.is_empty(),
        };
        if empty {
            return Err(Error::config("Cloudflare credentials cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            credentials,
            zone_id: zone_id.filter(|z| !z.is_empty()),
            client,
            dry_run,
        })
    }

    /// Create a live provider authenticated with an API token
    pub fn with_token(api_token: impl Into<String>, zone_id: Option<String>) -> Result<Self> {
        Self::new(Credentials::Token(api_token.into()), zone_id, false)
    }

    /// Whether writes are suppressed
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn url(path: &str) -> String {
        format!("{}{}", CLOUDFLARE_API_BASE, path)
    }

    /// Send a request and unwrap the response envelope
    ///
    /// `context` names the operation in error messages.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, context: &str) -> Result<T> {
        let response = self
            .credentials
            .apply(request)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                Error::provider_transient(PROVIDER, format!("{}: HTTP request failed: {}", context, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(status, context, &body));
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            Error::provider(PROVIDER, format!("{}: Failed to parse response: {}", context, e))
        })?;

        if !envelope.success {
            return Err(Error::provider(
                PROVIDER,
                format!("{}: {}", context, api::describe(&envelope.errors)),
            ));
        }

        envelope.result.ok_or_else(|| {
            Error::provider(PROVIDER, format!("{}: Response has no result", context))
        })
    }

    /// Look up a zone by exact name
    async fn find_zone(&self, name: &str) -> Result<Option<String>> {
        let request = self
            .client
            .get(Self::url("/zones"))
            .query(&[("name", name)]);
        let zones: Vec<Zone> = self.send(request, "zone lookup").await?;

        Ok(zones
            .into_iter()
            .find(|z| z.name.eq_ignore_ascii_case(name))
            .map(|z| z.id))
    }

    fn log_dry_run(&self, method: &str, path: &str, draft: Option<&RecordDraft>) {
        match draft {
            Some(draft) => tracing::info!(
                "[DRY-RUN] Would send {} {} with payload: {}",
                method,
                path,
                serde_json::to_string(&RecordBody::from(draft)).unwrap_or_default()
            ),
            None => tracing::info!("[DRY-RUN] Would send {} {}", method, path),
        }
    }
}

/// Candidate zone names for a domain, most specific first
///
/// `"home.lab.example.com"` yields `home.lab.example.com`, `lab.example.com`
/// and `example.com`. Single-label names are never tried.
pub fn zone_candidates(domain: &str) -> Vec<&str> {
    let domain = domain.trim_end_matches('.');
    let mut candidates = Vec::new();
    let mut rest = domain;
    while rest.contains('.') {
        candidates.push(rest);
        match rest.split_once('.') {
            Some((_, parent)) => rest = parent,
            None => break,
        }
    }
    candidates
}

/// Map a non-success HTTP status to an error
pub fn status_error(status: StatusCode, context: &str, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::auth(format!(
            "{}: Invalid credentials or insufficient permissions. Status: {}",
            context, status
        )),
        404 => Error::not_found(format!("{}: Not found. Status: {}", context, status)),
        409 => Error::provider_transient(
            PROVIDER,
            format!(
                "{}: Conflict: Record is being changed by another process. Status: {}",
                context, status
            ),
        ),
        429 => Error::rate_limited(format!(
            "{}: Rate limit exceeded. Please retry later. Status: {}",
            context, status
        )),
        500..=599 => Error::provider_transient(
            PROVIDER,
            format!("{}: Cloudflare server error (transient): {} - {}", context, status, body),
        ),
        _ => Error::provider(PROVIDER, format!("{}: {} - {}", context, status, body)),
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// Walk up the domain's labels until a zone matches
    ///
    /// ```http
    /// GET /zones?name=home.example.com   -> []
    /// GET /zones?name=example.com        -> [{ "id": "023e..." }]
    /// ```
    async fn resolve_zone(&self, domain: &str) -> Result<String> {
        if let Some(ref zone_id) = self.zone_id {
            tracing::debug!("Using pre-configured zone ID for {}", domain);
            return Ok(zone_id.clone());
        }

        for candidate in zone_candidates(domain) {
            tracing::debug!("Looking up zone: {}", candidate);
            if let Some(zone_id) = self.find_zone(candidate).await? {
                tracing::debug!("Found zone ID for {}: {}", domain, zone_id);
                return Ok(zone_id);
            }
        }

        Err(Error::not_found(format!("Zone not found for {}", domain)))
    }

    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&name=home.example.com&per_page=100
    /// ```
    async fn list_records(
        &self,
        zone_id: &str,
        record_type: RecordType,
        name: &str,
    ) -> Result<Vec<LiveRecord>> {
        tracing::debug!("Listing {} records for {}", record_type, name);

        let request = self
            .client
            .get(Self::url(&format!("/zones/{}/dns_records", zone_id)))
            .query(&[
                ("type", record_type.as_str()),
                ("name", name),
                ("per_page", RECORDS_PER_PAGE),
            ]);
        let records: Vec<DnsRecord> = self.send(request, "record listing").await?;

        // The name filter is exact, but guard against case differences
        Ok(records
            .into_iter()
            .filter(|r| r.name.eq_ignore_ascii_case(name))
            .map(LiveRecord::from)
            .collect())
    }

    /// ```http
    /// POST /zones/:zone_id/dns_records
    /// { "type": "A", "name": "...", "content": "...", "ttl": 1, "proxied": false }
    /// ```
    async fn create_record(&self, zone_id: &str, draft: &RecordDraft) -> Result<LiveRecord> {
        let path = format!("/zones/{}/dns_records", zone_id);

        if self.dry_run {
            self.log_dry_run("POST", &path, Some(draft));
            return Ok(LiveRecord {
                id: "dry-run".to_string(),
                record_type: draft.record_type,
                name: draft.name.clone(),
                content: draft.content.clone(),
                proxied: draft.proxied,
            });
        }

        let request = self.client.post(Self::url(&path)).json(&RecordBody::from(draft));
        let created: DnsRecord = self.send(request, "record create").await?;
        Ok(created.into())
    }

    /// ```http
    /// PUT /zones/:zone_id/dns_records/:record_id
    /// ```
    async fn update_record(&self, zone_id: &str, record_id: &str, draft: &RecordDraft) -> Result<()> {
        let path = format!("/zones/{}/dns_records/{}", zone_id, record_id);

        if self.dry_run {
            self.log_dry_run("PUT", &path, Some(draft));
            return Ok(());
        }

        let request = self.client.put(Self::url(&path)).json(&RecordBody::from(draft));
        let _updated: DnsRecord = self.send(request, "record update").await?;
        Ok(())
    }

    /// ```http
    /// DELETE /zones/:zone_id/dns_records/:record_id
    /// ```
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let path = format!("/zones/{}/dns_records/{}", zone_id, record_id);

        if self.dry_run {
            self.log_dry_run("DELETE", &path, None);
            return Ok(());
        }

        let _deleted: Deleted = self.send(self.client.delete(Self::url(&path)), "record delete").await?;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Cloudflare providers
///
/// Reads `DYNDNS_MODE` once at creation; `dry-run` disables writes.
pub struct CloudflareFactory;

impl DnsProviderFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let dry_run = is_dry_run_mode(std::env::var(ENV_MODE).ok().as_deref());
        build(config, dry_run)
    }
}

fn build(config: &ProviderConfig, dry_run: bool) -> Result<Box<dyn DnsProvider>> {
    match config {
        ProviderConfig::Cloudflare {
            api_token,
            api_key,
            email,
            zone_id,
        } => {
            let credentials =
                Credentials::from_parts(api_token.as_deref(), api_key.as_deref(), email.as_deref())?;

            if dry_run {
                tracing::warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
            }
            tracing::debug!("Cloudflare provider using {} credentials", credentials.kind());

            Ok(Box::new(CloudflareProvider::new(
                credentials,
                zone_id.clone(),
                dry_run,
            )?))
        }
        _ => Err(Error::config("Invalid config for Cloudflare provider")),
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use dyndns_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// dyndns_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &dyndns_core::ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(CloudflareFactory));
}
