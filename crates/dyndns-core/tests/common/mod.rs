//! Test doubles and common utilities for the contract tests
//!
//! [`FakeProvider`] keeps zones and records in memory and can be scripted to
//! fail or stall. [`ScriptedAddressSource`] replays a list of observations.
//! Both are cheap to clone; clones share state, so a test can keep one copy
//! while the code under test owns another.

#![allow(dead_code)]

use dyndns_core::error::{Error, Result};
use dyndns_core::model::{DesiredState, DomainEntry, RecordSpec};
use dyndns_core::traits::{AddressSource, DnsProvider, LiveRecord, RecordDraft, RecordType};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One provider interaction, as observed by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve(String),
    List(String),
    Create(String),
    Update(String),
    Delete(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Create(_) | Call::Update(_) | Call::Delete(_))
    }
}

#[derive(Default)]
struct FakeState {
    /// (zone name, zone id)
    zones: Vec<(String, String)>,
    /// (zone id, record)
    records: Vec<(String, LiveRecord)>,
    failing_domains: HashSet<String>,
    /// (operation, record name)
    failing_ops: HashSet<(&'static str, String)>,
    calls: Vec<Call>,
    delay: Option<Duration>,
}

/// In-memory DNS provider
#[derive(Clone, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
    next_id: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider hosting the given zones
    pub fn with_zones<I, S>(zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for zone in zones {
            provider.add_zone(zone);
        }
        provider
    }

    pub fn add_zone(&self, zone: impl Into<String>) {
        let zone = zone.into();
        let id = format!("zone-{}", zone);
        self.state.lock().unwrap().zones.push((zone, id));
    }

    /// Insert a record directly, bypassing the call log
    pub fn seed(&self, zone: &str, name: &str, content: &str, proxied: bool) -> String {
        let id = self.fresh_id();
        let record = LiveRecord {
            id: id.clone(),
            record_type: RecordType::for_address(content),
            name: name.to_string(),
            content: content.to_string(),
            proxied,
        };
        self.state
            .lock()
            .unwrap()
            .records
            .push((format!("zone-{}", zone), record));
        id
    }

    /// Make every zone lookup for `domain` fail
    pub fn fail_domain(&self, domain: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_domains
            .insert(domain.to_string());
    }

    /// Make `operation` ("list", "create", "update" or "delete") fail for one record name
    pub fn fail_operation(&self, operation: &'static str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_ops
            .insert((operation, name.to_string()));
    }

    /// Stall every call for `delay`
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    /// Every record currently stored under `name`
    pub fn records_named(&self, name: &str) -> Vec<LiveRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|(_, r)| r.name == name)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutation()).count()
    }

    fn fresh_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn enter(&self, call: Call) {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check(&self, operation: &'static str, name: &str) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.failing_ops.contains(&(operation, name.to_string())) {
            return Err(Error::provider_transient(
                "fake",
                format!("{} failed for {}", operation, name),
            ));
        }
        Ok(())
    }

    fn name_of(&self, record_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|(_, r)| r.id == record_id)
            .map(|(_, r)| r.name.clone())
    }
}

#[async_trait::async_trait]
impl DnsProvider for FakeProvider {
    async fn resolve_zone(&self, domain: &str) -> Result<String> {
        self.enter(Call::Resolve(domain.to_string())).await;

        let state = self.state.lock().unwrap();
        if state.failing_domains.contains(domain) {
            return Err(Error::provider_transient("fake", "zone lookup failed"));
        }
        state
            .zones
            .iter()
            .filter(|(zone, _)| domain == zone || domain.ends_with(&format!(".{}", zone)))
            .max_by_key(|(zone, _)| zone.len())
            .map(|(_, id)| id.clone())
            .ok_or_else(|| Error::not_found(format!("No zone for {}", domain)))
    }

    async fn list_records(
        &self,
        zone_id: &str,
        record_type: RecordType,
        name: &str,
    ) -> Result<Vec<LiveRecord>> {
        self.enter(Call::List(name.to_string())).await;
        self.check("list", name)?;

        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|(zone, r)| zone == zone_id && r.record_type == record_type && r.name == name)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn create_record(&self, zone_id: &str, draft: &RecordDraft) -> Result<LiveRecord> {
        self.enter(Call::Create(draft.name.clone())).await;
        self.check("create", &draft.name)?;

        let record = LiveRecord {
            id: self.fresh_id(),
            record_type: draft.record_type,
            name: draft.name.clone(),
            content: draft.content.clone(),
            proxied: draft.proxied,
        };
        self.state
            .lock()
            .unwrap()
            .records
            .push((zone_id.to_string(), record.clone()));
        Ok(record)
    }

    async fn update_record(&self, _zone_id: &str, record_id: &str, draft: &RecordDraft) -> Result<()> {
        self.enter(Call::Update(draft.name.clone())).await;
        self.check("update", &draft.name)?;

        let mut state = self.state.lock().unwrap();
        let (_, record) = state
            .records
            .iter_mut()
            .find(|(_, r)| r.id == record_id)
            .ok_or_else(|| Error::not_found(format!("No record {}", record_id)))?;
        record.content = draft.content.clone();
        record.proxied = draft.proxied;
        Ok(())
    }

    async fn delete_record(&self, _zone_id: &str, record_id: &str) -> Result<()> {
        let name = self.name_of(record_id).unwrap_or_default();
        self.enter(Call::Delete(name.clone())).await;
        self.check("delete", &name)?;

        self.state
            .lock()
            .unwrap()
            .records
            .retain(|(_, r)| r.id != record_id);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Address source replaying scripted observations
///
/// `Some(address)` is returned verbatim, `None` is a failed fetch. The last
/// observation repeats once the script runs out.
#[derive(Clone)]
pub struct ScriptedAddressSource {
    script: Arc<Mutex<VecDeque<Option<String>>>>,
    calls: Arc<AtomicUsize>,
    delay: Arc<Mutex<Duration>>,
}

impl ScriptedAddressSource {
    pub fn new<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = Option<&'static str>>,
    {
        Self {
            script: Arc::new(Mutex::new(
                observations
                    .into_iter()
                    .map(|o| o.map(str::to_string))
                    .collect(),
            )),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Source that always answers `address`
    pub fn fixed(address: &'static str) -> Self {
        Self::new([Some(address)])
    }

    pub fn push(&self, observation: Option<&str>) {
        self.script
            .lock()
            .unwrap()
            .push_back(observation.map(str::to_string));
    }

    /// Stall every fetch for `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AddressSource for ScriptedAddressSource {
    async fn current(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().cloned().flatten()
        };
        next.ok_or_else(|| Error::address_unavailable("scripted failure"))
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Desired state: `example.com` with the apex proxied and `home` direct
pub fn home_and_apex() -> DesiredState {
    DesiredState::new(
        vec![DomainEntry::new(["example.com"]).with_record(RecordSpec::new("home", false))],
        vec![RecordSpec::apex(true)],
    )
}
