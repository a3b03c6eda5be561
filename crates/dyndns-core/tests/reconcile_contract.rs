//! Contract Test: Record Reconciliation
//!
//! Verifies how one pass converges provider records to an address.
//!
//! Constraints verified:
//! - Zero, one and many existing records lead to create, update and
//!   delete-then-create respectively
//! - A second pass with the same address mutates nothing
//! - A failure for one target or domain never stops the others
//! - A failed delete leaves the target alone for the rest of the pass
//! - Every provider call is bounded by the call timeout
//!
//! If this test fails, someone has added:
//! - Early returns out of the pass on the first error
//! - Retries or caching inside the reconciler
//! - Unbounded provider calls

mod common;

use common::*;
use dyndns_core::model::{DesiredState, DomainEntry, RecordSpec, RecordTarget};
use dyndns_core::reconciler::{Reconciler, RecordOutcome};
use dyndns_core::traits::RecordType;
use std::sync::Arc;
use std::time::Duration;

const ADDRESS: &str = "203.0.113.5";

fn reconciler(provider: &FakeProvider) -> Reconciler {
    Reconciler::new(Arc::new(provider.clone()))
}

#[tokio::test]
async fn empty_zone_gets_every_record_created() {
    let provider = FakeProvider::with_zones(["example.com"]);
    let targets = home_and_apex().targets();

    let report = reconciler(&provider).apply(&targets, ADDRESS).await;

    assert!(report.is_clean());
    assert_eq!(report.changed(), 2);
    assert_eq!(report.outcome_for("home.example.com"), Some(&RecordOutcome::Created));
    assert_eq!(report.outcome_for("example.com"), Some(&RecordOutcome::Created));

    let apex = provider.records_named("example.com");
    assert_eq!(apex.len(), 1);
    assert_eq!(apex[0].content, ADDRESS);
    assert!(apex[0].proxied, "apex comes from the proxied default");
    assert!(!provider.records_named("home.example.com")[0].proxied);
}

#[tokio::test]
async fn second_pass_with_same_address_mutates_nothing() {
    let provider = FakeProvider::with_zones(["example.com"]);
    let targets = home_and_apex().targets();
    let reconciler = reconciler(&provider);

    reconciler.apply(&targets, ADDRESS).await;
    let mutations_after_first = provider.mutation_count();

    let report = reconciler.apply(&targets, ADDRESS).await;

    assert!(report.is_clean());
    assert_eq!(report.changed(), 0);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.outcome == RecordOutcome::Unchanged));
    assert_eq!(provider.mutation_count(), mutations_after_first);
    assert_eq!(provider.record_count(), 2);
}

#[tokio::test]
async fn single_stale_record_is_updated_in_place() {
    let provider = FakeProvider::with_zones(["example.com"]);
    let id = provider.seed("example.com", "home.example.com", "198.51.100.1", false);
    let targets = vec![RecordTarget::new("example.com", "home", false)];

    let report = reconciler(&provider).apply(&targets, ADDRESS).await;

    assert_eq!(
        report.outcome_for("home.example.com"),
        Some(&RecordOutcome::Updated {
            previous: "198.51.100.1".to_string()
        })
    );
    let records = provider.records_named("home.example.com");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id, "update must keep the record identity");
    assert_eq!(records[0].content, ADDRESS);
}

#[tokio::test]
async fn proxy_flag_change_alone_triggers_update() {
    let provider = FakeProvider::with_zones(["example.com"]);
    provider.seed("example.com", "example.com", ADDRESS, false);
    let targets = vec![RecordTarget::new("example.com", "@", true)];

    let report = reconciler(&provider).apply(&targets, ADDRESS).await;

    assert!(matches!(
        report.outcome_for("example.com"),
        Some(RecordOutcome::Updated { .. })
    ));
    assert!(provider.records_named("example.com")[0].proxied);
}

#[tokio::test]
async fn matching_record_is_rewritten_when_skipping_is_disabled() {
    let provider = FakeProvider::with_zones(["example.com"]);
    provider.seed("example.com", "home.example.com", ADDRESS, false);
    let targets = vec![RecordTarget::new("example.com", "home", false)];

    let report = reconciler(&provider)
        .with_skip_unchanged(false)
        .apply(&targets, ADDRESS)
        .await;

    assert!(matches!(
        report.outcome_for("home.example.com"),
        Some(RecordOutcome::Updated { .. })
    ));
    assert_eq!(
        provider.calls().last(),
        Some(&Call::Update("home.example.com".to_string()))
    );
}

#[tokio::test]
async fn duplicates_converge_to_exactly_one_record() {
    let provider = FakeProvider::with_zones(["example.com"]);
    for stale in ["198.51.100.1", "198.51.100.2", ADDRESS] {
        provider.seed("example.com", "home.example.com", stale, false);
    }
    let targets = vec![RecordTarget::new("example.com", "home", false)];
    let reconciler = reconciler(&provider);

    let report = reconciler.apply(&targets, ADDRESS).await;

    assert_eq!(
        report.outcome_for("home.example.com"),
        Some(&RecordOutcome::Deduplicated { removed: 3 })
    );
    let records = provider.records_named("home.example.com");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, ADDRESS);

    // Converged: the next pass is a no-op
    let report = reconciler.apply(&targets, ADDRESS).await;
    assert_eq!(
        report.outcome_for("home.example.com"),
        Some(&RecordOutcome::Unchanged)
    );
}

#[tokio::test]
async fn failed_delete_skips_create_for_that_target() {
    let provider = FakeProvider::with_zones(["example.com"]);
    provider.seed("example.com", "home.example.com", "198.51.100.1", false);
    provider.seed("example.com", "home.example.com", "198.51.100.2", false);
    provider.fail_operation("delete", "home.example.com");
    let targets = home_and_apex().targets();

    let report = reconciler(&provider).apply(&targets, ADDRESS).await;

    assert!(report
        .outcome_for("home.example.com")
        .is_some_and(RecordOutcome::is_failure));
    assert!(!provider
        .calls()
        .contains(&Call::Create("home.example.com".to_string())));
    assert_eq!(report.outcome_for("example.com"), Some(&RecordOutcome::Created));
}

#[tokio::test]
async fn zone_failure_is_isolated_to_its_domain() {
    let provider = FakeProvider::with_zones(["a.example", "b.example"]);
    provider.fail_domain("a.example");
    let state = DesiredState::new(
        vec![DomainEntry::new(["a.example", "b.example"]).with_record(RecordSpec::new("www", false))],
        vec![RecordSpec::apex(false)],
    );
    let targets = state.targets();

    let report = reconciler(&provider).apply(&targets, ADDRESS).await;

    assert_eq!(report.failed(), 2);
    assert_eq!(report.succeeded(), 2);
    for name in ["www.a.example", "a.example"] {
        match report.outcome_for(name) {
            Some(RecordOutcome::Failed { retryable, .. }) => assert!(retryable),
            other => panic!("{} should have failed, got {:?}", name, other),
        }
    }
    assert_eq!(report.outcome_for("www.b.example"), Some(&RecordOutcome::Created));

    // The zone is resolved once per domain, not once per target
    let resolves = provider
        .calls()
        .iter()
        .filter(|c| matches!(c, Call::Resolve(d) if d == "b.example"))
        .count();
    assert_eq!(resolves, 1);
}

#[tokio::test]
async fn mutation_failure_does_not_stop_the_pass() {
    let provider = FakeProvider::with_zones(["example.com"]);
    provider.fail_operation("create", "home.example.com");
    let targets = home_and_apex().targets();

    let report = reconciler(&provider).apply(&targets, ADDRESS).await;

    match report.outcome_for("home.example.com") {
        Some(RecordOutcome::Failed { error, .. }) => assert!(error.contains("create")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.outcome_for("example.com"), Some(&RecordOutcome::Created));
    assert_eq!(report.outcomes.len(), targets.len());
}

#[tokio::test]
async fn unknown_zone_fails_without_mutations() {
    let provider = FakeProvider::with_zones(["other.org"]);
    let targets = home_and_apex().targets();

    let report = reconciler(&provider).apply(&targets, ADDRESS).await;

    assert_eq!(report.failed(), targets.len());
    assert_eq!(provider.mutation_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_provider_call_times_out() {
    let provider = FakeProvider::with_zones(["example.com"]);
    provider.set_delay(Duration::from_secs(120));
    let targets = vec![RecordTarget::new("example.com", "@", false)];

    let report = reconciler(&provider)
        .with_call_timeout(Duration::from_secs(5))
        .apply(&targets, ADDRESS)
        .await;

    match report.outcome_for("example.com") {
        Some(RecordOutcome::Failed { error, retryable }) => {
            assert!(error.contains("timed out"), "unexpected error: {}", error);
            assert!(retryable);
        }
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn ipv6_address_reconciles_aaaa_records() {
    let provider = FakeProvider::with_zones(["example.com"]);
    let targets = vec![RecordTarget::new("example.com", "home", false)];

    let report = reconciler(&provider).apply(&targets, "2001:db8::5").await;

    assert!(report.is_clean());
    let records = provider.records_named("home.example.com");
    assert_eq!(records[0].record_type, RecordType::Aaaa);
}

#[tokio::test]
async fn report_preserves_target_order_across_domains() {
    let provider = FakeProvider::with_zones(["a.example", "b.example", "c.example"]);
    let targets = vec![
        RecordTarget::new("c.example", "@", false),
        RecordTarget::new("a.example", "@", false),
        RecordTarget::new("b.example", "www", false),
        RecordTarget::new("a.example", "www", false),
    ];

    let report = reconciler(&provider)
        .with_max_concurrent_domains(2)
        .apply(&targets, ADDRESS)
        .await;

    let names: Vec<&str> = report.outcomes.iter().map(|o| o.record_name.as_str()).collect();
    assert_eq!(
        names,
        vec!["c.example", "a.example", "www.b.example", "www.a.example"]
    );
}
