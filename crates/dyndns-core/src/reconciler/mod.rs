//! Record reconciler
//!
//! Converges provider state to the desired state for one observed address.
//!
//! ## Per-target algorithm
//!
//! ```text
//! resolve_zone(domain) ──fail──▶ Failed (every target under the domain)
//!        │
//!        ▼
//! list_records(zone, type, name)
//!        │
//!        ├── 0 matches ──▶ create                          ──▶ Created
//!        ├── 1 match   ──▶ update (or skip when identical) ──▶ Updated / Unchanged
//!        └── N matches ──▶ delete all, then create one     ──▶ Deduplicated
//! ```
//!
//! ## Failure isolation
//!
//! Nothing that goes wrong for one target escapes [`Reconciler::apply`]. Each
//! failure is logged and recorded in the [`ReconcileReport`]; the pass always
//! runs over every target.
//!
//! ## Concurrency
//!
//! Targets are grouped by domain. Groups run concurrently (bounded by
//! `max_concurrent_domains`); inside a group every call is sequential, so the
//! duplicate-detection read and the following write never race.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::RecordTarget;
use crate::traits::{DnsProvider, LiveRecord, RecordDraft, RecordType};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// What happened to one target during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// No record existed; one was created
    Created,
    /// The single existing record was overwritten
    Updated {
        /// Content before the update
        previous: String,
    },
    /// The single existing record already matched; no call was made
    Unchanged,
    /// Several records existed; all were deleted and one was created
    Deduplicated {
        /// Number of records deleted
        removed: usize,
    },
    /// The target could not be reconciled this pass
    Failed {
        /// Rendered error
        error: String,
        /// Whether a later pass may succeed without operator action
        retryable: bool,
    },
}

impl RecordOutcome {
    fn failed(err: &Error) -> Self {
        RecordOutcome::Failed {
            error: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    fn mutation_failed(operation: &'static str, record: &str, err: Error) -> Self {
        let retryable = err.is_retryable();
        RecordOutcome::Failed {
            error: Error::mutation(operation, record, err.to_string()).to_string(),
            retryable,
        }
    }

    /// Whether the target failed
    pub fn is_failure(&self) -> bool {
        matches!(self, RecordOutcome::Failed { .. })
    }

    /// Whether the provider was mutated
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            RecordOutcome::Created | RecordOutcome::Updated { .. } | RecordOutcome::Deduplicated { .. }
        )
    }
}

/// Outcome of one target, with the record name it resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    /// The reconciled target
    pub target: RecordTarget,
    /// Fully qualified record name
    pub record_name: String,
    /// What happened
    pub outcome: RecordOutcome,
}

/// Result of one reconciliation pass, in target order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Address the pass converged towards
    pub address: String,
    /// One entry per target
    pub outcomes: Vec<TargetOutcome>,
}

impl ReconcileReport {
    /// Number of targets that did not fail
    pub fn succeeded(&self) -> usize {
        self.outcomes.len() - self.failed()
    }

    /// Number of failed targets
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_failure()).count()
    }

    /// Number of targets whose provider state was mutated
    pub fn changed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome.is_change()).count()
    }

    /// Failed targets
    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| o.outcome.is_failure())
    }

    /// Whether every target converged
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    /// Outcome for a record name, if it was part of the pass
    pub fn outcome_for(&self, record_name: &str) -> Option<&RecordOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.record_name == record_name)
            .map(|o| &o.outcome)
    }
}

/// Reconciles desired targets against a provider
pub struct Reconciler {
    provider: Arc<dyn DnsProvider>,
    call_timeout: Duration,
    max_concurrent_domains: usize,
    skip_unchanged: bool,
}

impl Reconciler {
    /// Create a reconciler with default engine settings
    pub fn new(provider: Arc<dyn DnsProvider>) -> Self {
        Self::from_config(provider, &EngineConfig::default())
    }

    /// Create a reconciler using the engine section of the configuration
    pub fn from_config(provider: Arc<dyn DnsProvider>, config: &EngineConfig) -> Self {
        Self {
            provider,
            call_timeout: config.provider_timeout(),
            max_concurrent_domains: config.max_concurrent_domains.max(1),
            skip_unchanged: config.skip_unchanged,
        }
    }

    /// Set the bound on each provider call
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Set how many domains are reconciled at once
    pub fn with_max_concurrent_domains(mut self, limit: usize) -> Self {
        self.max_concurrent_domains = limit.max(1);
        self
    }

    /// Choose whether an already-matching record is left alone
    pub fn with_skip_unchanged(mut self, skip: bool) -> Self {
        self.skip_unchanged = skip;
        self
    }

    /// Name of the underlying provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Run one pass over `targets`, converging every record towards `address`
    ///
    /// Never fails: per-target errors are captured in the report.
    pub async fn apply(&self, targets: &[RecordTarget], address: &str) -> ReconcileReport {
        debug!(
            "Reconciling {} target(s) towards {} via {}",
            targets.len(),
            address,
            self.provider.provider_name()
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrent_domains));
        let mut tasks = JoinSet::new();

        for (domain, members) in group_by_domain(targets) {
            let worker = DomainWorker {
                provider: Arc::clone(&self.provider),
                call_timeout: self.call_timeout,
                skip_unchanged: self.skip_unchanged,
            };
            let permits = Arc::clone(&permits);
            let address = address.to_string();

            tasks.spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail
                let _permit = permits.acquire_owned().await.ok();
                worker.reconcile_domain(&domain, members, &address).await
            });
        }

        let mut slots: Vec<Option<TargetOutcome>> = vec![None; targets.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(results) => {
                    for (index, outcome) in results {
                        slots[index] = Some(outcome);
                    }
                }
                Err(e) => error!("Reconciliation task aborted: {}", e),
            }
        }

        let outcomes = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| TargetOutcome {
                    target: target.clone(),
                    record_name: target.record_name(),
                    outcome: RecordOutcome::Failed {
                        error: "reconciliation task aborted".to_string(),
                        retryable: true,
                    },
                })
            })
            .collect();

        let report = ReconcileReport {
            address: address.to_string(),
            outcomes,
        };

        if report.is_clean() {
            info!(
                "Reconciliation complete: {} target(s), {} changed",
                report.outcomes.len(),
                report.changed()
            );
        } else {
            warn!(
                "Reconciliation complete with failures: {} ok, {} failed",
                report.succeeded(),
                report.failed()
            );
        }

        report
    }
}

/// Split targets into per-domain groups, keeping first-appearance order and
/// each target's original index
fn group_by_domain(targets: &[RecordTarget]) -> Vec<(String, Vec<(usize, RecordTarget)>)> {
    let mut groups: Vec<(String, Vec<(usize, RecordTarget)>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (index, target) in targets.iter().enumerate() {
        match positions.get(target.domain.as_str()) {
            Some(&g) => groups[g].1.push((index, target.clone())),
            None => {
                positions.insert(target.domain.as_str(), groups.len());
                groups.push((target.domain.clone(), vec![(index, target.clone())]));
            }
        }
    }

    groups
}

/// Sequential worker for the targets of one domain
#[derive(Clone)]
struct DomainWorker {
    provider: Arc<dyn DnsProvider>,
    call_timeout: Duration,
    skip_unchanged: bool,
}

impl DomainWorker {
    async fn reconcile_domain(
        &self,
        domain: &str,
        members: Vec<(usize, RecordTarget)>,
        address: &str,
    ) -> Vec<(usize, TargetOutcome)> {
        let zone = self
            .bounded("resolve_zone", self.provider.resolve_zone(domain))
            .await
            .map_err(|e| {
                let retryable = e.is_retryable();
                (Error::zone_resolution(domain, e.to_string()), retryable)
            });

        let zone_id = match zone {
            Ok(zone_id) => zone_id,
            Err((e, retryable)) => {
                error!("{}; skipping {} target(s)", e, members.len());
                let outcome = RecordOutcome::Failed {
                    error: e.to_string(),
                    retryable,
                };
                return members
                    .into_iter()
                    .map(|(index, target)| {
                        let record_name = target.record_name();
                        (index, TargetOutcome { target, record_name, outcome: outcome.clone() })
                    })
                    .collect();
            }
        };

        let mut results = Vec::with_capacity(members.len());
        for (index, target) in members {
            let record_name = target.record_name();
            let outcome = self.reconcile_target(&zone_id, &target, &record_name, address).await;
            if let RecordOutcome::Failed { error, .. } = &outcome {
                error!("Failed to reconcile {}: {}", record_name, error);
            }
            results.push((index, TargetOutcome { target, record_name, outcome }));
        }
        results
    }

    async fn reconcile_target(
        &self,
        zone_id: &str,
        target: &RecordTarget,
        record_name: &str,
        address: &str,
    ) -> RecordOutcome {
        let draft = RecordDraft::new(
            RecordType::for_address(address),
            record_name,
            address,
            target.proxied,
        );

        let existing = match self
            .bounded(
                "list_records",
                self.provider.list_records(zone_id, draft.record_type, record_name),
            )
            .await
        {
            Ok(records) => records,
            Err(e) => return RecordOutcome::failed(&e),
        };

        match existing.as_slice() {
            [] => self.create(zone_id, &draft).await.map_or_else(
                |e| RecordOutcome::mutation_failed("create", record_name, e),
                |_| RecordOutcome::Created,
            ),
            [current] => self.update_single(zone_id, current, &draft).await,
            duplicates => self.replace_duplicates(zone_id, duplicates, &draft).await,
        }
    }

    async fn update_single(
        &self,
        zone_id: &str,
        current: &LiveRecord,
        draft: &RecordDraft,
    ) -> RecordOutcome {
        if self.skip_unchanged && current.matches(draft) {
            debug!("{} already points at {}, leaving it", draft.name, draft.content);
            return RecordOutcome::Unchanged;
        }

        match self
            .bounded(
                "update_record",
                self.provider.update_record(zone_id, &current.id, draft),
            )
            .await
        {
            Ok(()) => {
                info!(
                    "Updated {} record: {} {} -> {} (proxied: {})",
                    draft.record_type, draft.name, current.content, draft.content, draft.proxied
                );
                RecordOutcome::Updated {
                    previous: current.content.clone(),
                }
            }
            Err(e) => RecordOutcome::mutation_failed("update", &draft.name, e),
        }
    }

    async fn replace_duplicates(
        &self,
        zone_id: &str,
        duplicates: &[LiveRecord],
        draft: &RecordDraft,
    ) -> RecordOutcome {
        warn!(
            "Found {} {} records for {}, replacing them with one",
            duplicates.len(),
            draft.record_type,
            draft.name
        );

        for record in duplicates {
            if let Err(e) = self
                .bounded("delete_record", self.provider.delete_record(zone_id, &record.id))
                .await
            {
                return RecordOutcome::mutation_failed("delete", &draft.name, e);
            }
            info!(
                "Deleted {} record: {}: {}",
                record.record_type, record.name, record.content
            );
        }

        match self.create(zone_id, draft).await {
            Ok(_) => RecordOutcome::Deduplicated {
                removed: duplicates.len(),
            },
            Err(e) => RecordOutcome::mutation_failed("create", &draft.name, e),
        }
    }

    async fn create(&self, zone_id: &str, draft: &RecordDraft) -> Result<LiveRecord> {
        let created = self
            .bounded("create_record", self.provider.create_record(zone_id, draft))
            .await?;
        info!(
            "Created {} record: {} -> {} (proxied: {})",
            draft.record_type, draft.name, draft.content, draft.proxied
        );
        Ok(created)
    }

    /// Run a provider call under the configured timeout
    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(operation, self.call_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_domain_keeps_order_and_indices() {
        let targets = vec![
            RecordTarget::new("a.com", "@", true),
            RecordTarget::new("b.com", "@", true),
            RecordTarget::new("a.com", "www", false),
        ];

        let groups = group_by_domain(&targets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "a.com");
        assert_eq!(
            groups[0].1.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(groups[1].0, "b.com");
        assert_eq!(groups[1].1[0].0, 1);
    }

    #[test]
    fn test_report_counters() {
        let outcome = |name: &str, result: RecordOutcome| TargetOutcome {
            target: RecordTarget::new(name, "@", false),
            record_name: name.to_string(),
            outcome: result,
        };
        let report = ReconcileReport {
            address: "203.0.113.5".to_string(),
            outcomes: vec![
                outcome("a.com", RecordOutcome::Created),
                outcome("b.com", RecordOutcome::Unchanged),
                outcome(
                    "c.com",
                    RecordOutcome::Failed {
                        error: "boom".to_string(),
                        retryable: true,
                    },
                ),
            ],
        };

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.changed(), 1);
        assert!(!report.is_clean());
        assert_eq!(report.outcome_for("b.com"), Some(&RecordOutcome::Unchanged));
        assert_eq!(report.failures().count(), 1);
    }
}
