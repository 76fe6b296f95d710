//! State Machine Integration Tests
//!
//! The retry-exhaustion lifecycle end to end, and rejection of events that
//! fall outside the transition table when applied to stored cases.

mod common;

use common::Harness;
use reclaim::core::RunMode;
use reclaim::domain::{FilingStatus, MatchLink};
use reclaim::error::FilingError;
use reclaim::ledger::AuditEvent;
use reclaim::store::{CaseRepo, MatchLinkRepo};
use reclaim::submit::SubmissionError;

fn seed_and_link(h: &Harness) -> reclaim::domain::Claim {
    let claim = h.seed_matched_claim("S1", "B007", 50.0);
    let docs = reclaim::store::DocumentRepo::list_completed(h.store.as_ref(), "S1").unwrap();
    let link = MatchLink::new(
        claim.id,
        docs[0].id,
        reclaim::domain::LinkType::Asin,
        docs[0].parser_confidence,
    );
    MatchLinkRepo::upsert(h.store.as_ref(), &link).unwrap();
    claim
}

#[tokio::test]
async fn test_transient_failures_exhaust_into_failed() {
    let h = Harness::new();
    let claim = seed_and_link(&h);

    for _ in 0..3 {
        h.client
            .script(Err(SubmissionError::transient("gateway timeout")));
    }

    // Cycle 1: intake + first attempt. Backoff is zero in tests, so the
    // retrying case is due again on the next cycle.
    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    let case = CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .unwrap();
    assert_eq!(case.filing_status, FilingStatus::Retrying);
    assert_eq!(case.retry_count, 1);

    // Cycle 2: second attempt
    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    let case = CaseRepo::get(h.store.as_ref(), case.id).unwrap().unwrap();
    assert_eq!(case.filing_status, FilingStatus::Retrying);
    assert_eq!(case.retry_count, 2);

    // Cycle 3: third attempt spends the budget in the same cycle
    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    let case = CaseRepo::get(h.store.as_ref(), case.id).unwrap().unwrap();
    assert_eq!(case.filing_status, FilingStatus::Failed);
    assert_eq!(case.retry_count, 3);
    assert!(case.last_error.as_deref().unwrap().contains("exhausted"));

    assert_eq!(h.client.call_count(), 3);

    // Every transition is in the ledger: pending->filing, three
    // filing->retrying, two retrying->filing, retrying->failed
    let entries = h.ledger.entries(case.id).unwrap();
    let transitions: Vec<(FilingStatus, FilingStatus)> = entries
        .iter()
        .filter_map(|e| match &e.event {
            AuditEvent::StatusChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect();

    use FilingStatus::*;
    assert_eq!(
        transitions,
        vec![
            (Pending, Filing),
            (Filing, Retrying),
            (Retrying, Filing),
            (Filing, Retrying),
            (Retrying, Filing),
            (Filing, Retrying),
            (Retrying, Failed),
        ]
    );
    assert!(matches!(entries[0].event, AuditEvent::CaseCreated { .. }));
}

#[tokio::test]
async fn test_permanent_rejection_fails_without_retry() {
    let h = Harness::new();
    let claim = seed_and_link(&h);

    h.client
        .script(Err(SubmissionError::permanent("claim window expired")));

    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();

    let case = CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .unwrap();
    assert_eq!(case.filing_status, FilingStatus::Failed);
    assert_eq!(case.retry_count, 0);
    assert_eq!(h.client.call_count(), 1);

    // A failed case stays failed on later cycles
    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    assert_eq!(h.client.call_count(), 1);
}

#[tokio::test]
async fn test_operator_action_on_wrong_status_is_rejected() {
    let h = Harness::new();
    let claim = seed_and_link(&h);

    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    let case = CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .unwrap();
    assert_eq!(case.filing_status, FilingStatus::Filed);

    // Approving a filed case is outside the table and changes nothing
    let ops = reclaim::core::OperatorActions::new(h.store.clone(), h.ledger.clone());
    let err = ops.approve(case.id, "alice").unwrap_err();
    assert!(matches!(err, FilingError::InvalidTransition { .. }));

    let unchanged = CaseRepo::get(h.store.as_ref(), case.id).unwrap().unwrap();
    assert_eq!(unchanged.filing_status, FilingStatus::Filed);
    assert_eq!(
        unchanged.updated_at, case.updated_at,
        "rejected event must not touch the stored case"
    );
}
