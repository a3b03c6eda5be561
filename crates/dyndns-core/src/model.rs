//! Desired-state model
//!
//! The operator's intent: which record names should point at this host, and
//! whether each should be proxied. Built once by the configuration loader and
//! never mutated afterwards.
//!
//! ## Resolution
//!
//! ```text
//! DomainEntry { domains: [a.com, b.com], records: [www] }  +  defaults: [@]
//!        │
//!        ▼  merge by label (own entry wins over default)
//! [www, @]
//!        │
//!        ▼  flatten across domains
//! (a.com, www) (a.com, @) (b.com, www) (b.com, @)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Label denoting the bare domain
pub const APEX_LABEL: &str = "@";

/// Build the fully qualified record name for a label under a domain
///
/// `"@"` maps to the domain itself; any other label is prefixed.
pub fn record_name(label: &str, domain: &str) -> String {
    if label == APEX_LABEL {
        domain.to_string()
    } else {
        format!("{}.{}", label, domain)
    }
}

/// One desired record under a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSpec {
    /// Subdomain label, or `"@"` for the bare domain. Never empty.
    #[serde(alias = "zone")]
    pub label: String,

    /// Whether traffic should be routed through the provider's edge
    #[serde(default, alias = "proxy")]
    pub proxied: bool,
}

impl RecordSpec {
    /// Create a new record spec
    pub fn new(label: impl Into<String>, proxied: bool) -> Self {
        Self {
            label: label.into(),
            proxied,
        }
    }

    /// Spec for the bare domain
    pub fn apex(proxied: bool) -> Self {
        Self::new(APEX_LABEL, proxied)
    }

    /// Whether this spec targets the bare domain
    pub fn is_apex(&self) -> bool {
        self.label == APEX_LABEL
    }
}

/// A group of domains sharing the same record specs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    /// Domain names, in configuration order
    #[serde(alias = "domain")]
    pub domains: Vec<String>,

    /// Records specific to these domains
    #[serde(default, alias = "zones")]
    pub records: Vec<RecordSpec>,
}

impl DomainEntry {
    /// Create an entry with no records of its own
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains.into_iter().map(Into::into).collect(),
            records: Vec::new(),
        }
    }

    /// Add a record spec
    pub fn with_record(mut self, spec: RecordSpec) -> Self {
        self.records.push(spec);
        self
    }
}

/// A single (domain, label, proxied) triple to reconcile
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordTarget {
    /// Domain the zone is resolved from
    pub domain: String,
    /// Subdomain label or `"@"`
    pub label: String,
    /// Desired proxy flag
    pub proxied: bool,
}

impl RecordTarget {
    /// Create a new target
    pub fn new(domain: impl Into<String>, label: impl Into<String>, proxied: bool) -> Self {
        Self {
            domain: domain.into(),
            label: label.into(),
            proxied,
        }
    }

    /// Fully qualified record name for this target
    pub fn record_name(&self) -> String {
        record_name(&self.label, &self.domain)
    }
}

/// The operator's full intent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    entries: Vec<DomainEntry>,
    defaults: Vec<RecordSpec>,
}

impl DesiredState {
    /// Create a desired state from domain entries and the shared default set
    pub fn new(entries: Vec<DomainEntry>, defaults: Vec<RecordSpec>) -> Self {
        Self { entries, defaults }
    }

    /// Domain entries, in configuration order
    pub fn entries(&self) -> &[DomainEntry] {
        &self.entries
    }

    /// Record specs applied to every domain
    pub fn defaults(&self) -> &[RecordSpec] {
        &self.defaults
    }

    /// Effective record set of one entry
    ///
    /// Own specs come first, then defaults whose label the entry does not
    /// define. A label repeated within one set keeps its first position and
    /// takes the last value.
    pub fn effective_records(&self, entry: &DomainEntry) -> Vec<RecordSpec> {
        let mut merged: Vec<RecordSpec> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for spec in &entry.records {
            upsert(&mut merged, &mut positions, spec);
        }

        let own_labels: HashSet<&str> = entry.records.iter().map(|s| s.label.as_str()).collect();
        for spec in &self.defaults {
            if !own_labels.contains(spec.label.as_str()) {
                upsert(&mut merged, &mut positions, spec);
            }
        }

        merged
    }

    /// Every target of one reconciliation pass
    ///
    /// Targets resolving to the same record name (compared
    /// case-insensitively) are collapsed into one: first position, last
    /// value. A pass therefore never touches a record name twice.
    pub fn targets(&self) -> Vec<RecordTarget> {
        let mut targets: Vec<RecordTarget> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for entry in &self.entries {
            let specs = self.effective_records(entry);
            for domain in &entry.domains {
                for spec in &specs {
                    let target = RecordTarget::new(domain.clone(), spec.label.clone(), spec.proxied);
                    let key = target.record_name().to_ascii_lowercase();
                    match positions.get(&key) {
                        Some(&i) => targets[i] = target,
                        None => {
                            positions.insert(key, targets.len());
                            targets.push(target);
                        }
                    }
                }
            }
        }

        targets
    }
}

fn upsert(merged: &mut Vec<RecordSpec>, positions: &mut HashMap<String, usize>, spec: &RecordSpec) {
    match positions.get(&spec.label) {
        Some(&i) => merged[i].proxied = spec.proxied,
        None => {
            positions.insert(spec.label.clone(), merged.len());
            merged.push(spec.clone());
        }
    }
}
