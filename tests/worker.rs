//! Filing Worker Integration Tests
//!
//! Full cycles over the in-memory store: happy path, dry runs, the approval
//! hold, and submission timeouts.

mod common;

use common::{claim_with_asin, document, test_settings, Harness};
use reclaim::core::{OperatorActions, RunMode};
use reclaim::domain::{DocumentKind, FilingStatus, LinkType, MatchLink};
use reclaim::ledger::AuditEvent;
use reclaim::store::{CaseRepo, ClaimRepo, DocumentRepo, MatchLinkRepo};

fn link_claim(h: &Harness, claim: &reclaim::domain::Claim) {
    let docs = DocumentRepo::list_completed(h.store.as_ref(), &claim.seller_id).unwrap();
    let doc = docs
        .iter()
        .find(|d| {
            claim
                .identifiers
                .asin
                .as_ref()
                .is_some_and(|a| d.identifiers.asins.contains(a))
        })
        .expect("seeded document");
    let link = MatchLink::new(claim.id, doc.id, LinkType::Asin, doc.parser_confidence);
    MatchLinkRepo::upsert(h.store.as_ref(), &link).unwrap();
}

#[tokio::test]
async fn test_happy_path_files_and_records_receipt() {
    let h = Harness::new();
    let claim = h.seed_matched_claim("S1", "B007", 50.0);
    link_claim(&h, &claim);

    let report = h.worker.run_cycle("S1", RunMode::Live).await.unwrap();

    assert_eq!(report.cases_created, 1);
    assert_eq!(report.filed, 1);
    assert_eq!(h.client.call_count(), 1);

    let case = CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .unwrap();
    assert_eq!(case.filing_status, FilingStatus::Filed);
    assert!(case.submission_id.as_deref().unwrap().starts_with("sub-"));
    assert!(case.external_case_id.as_deref().unwrap().starts_with("ext-"));

    let entries = h.ledger.entries(case.id).unwrap();
    assert!(entries
        .iter()
        .any(|e| matches!(e.event, AuditEvent::SubmissionRecorded { .. })));
    assert!(h.ledger.verify(case.id).unwrap().is_intact());

    // A filed case is settled; the next cycle leaves it alone
    let report = h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    assert_eq!(report.filed, 0);
    assert_eq!(h.client.call_count(), 1);
}

#[tokio::test]
async fn test_dry_run_transitions_nothing_and_submits_nothing() {
    let h = Harness::new();
    let claim = h.seed_matched_claim("S1", "B007", 50.0);
    link_claim(&h, &claim);

    let report = h.worker.run_cycle("S1", RunMode::DryRun).await.unwrap();

    assert_eq!(report.cases_created, 0);
    assert_eq!(report.filed, 0);
    assert_eq!(report.dry_runs, 1);
    assert_eq!(h.client.call_count(), 0);

    // No case was created; only the rehearsal event exists, on the claim
    assert!(CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .is_none());
    let entries = h.ledger.entries(claim.id).unwrap();
    assert_eq!(entries.len(), 1);
    let AuditEvent::DryRun { outcome } = &entries[0].event else {
        panic!("expected a rehearsal entry");
    };
    assert!(outcome.contains("would submit"), "{outcome}");
}

#[tokio::test]
async fn test_dry_run_surfaces_quarantine_for_fresh_claims() {
    let h = Harness::new();
    // Denylisted evidence linked to a claim that has no case yet
    let doc = document("S1", DocumentKind::Invoice, "application/x-msdownload", "invoice.exe")
        .with_asin("B007");
    let claim = claim_with_asin("S1", "B007", 50.0);
    ClaimRepo::insert(h.store.as_ref(), &claim).unwrap();
    DocumentRepo::insert(h.store.as_ref(), &doc.doc).unwrap();
    h.store.put_blob(doc.doc.id, doc.bytes);
    let link = MatchLink::new(claim.id, doc.doc.id, LinkType::Asin, doc.doc.parser_confidence);
    MatchLinkRepo::upsert(h.store.as_ref(), &link).unwrap();

    let report = h.worker.run_cycle("S1", RunMode::DryRun).await.unwrap();

    assert_eq!(report.dry_runs, 1);
    assert_eq!(h.client.call_count(), 0);
    assert!(CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .is_none());

    // The rehearsal reports what a live run would do with the evidence
    let entries = h.ledger.entries(claim.id).unwrap();
    assert_eq!(entries.len(), 1);
    let AuditEvent::DryRun { outcome } = &entries[0].event else {
        panic!("expected a rehearsal entry");
    };
    assert!(outcome.contains("would quarantine"), "{outcome}");
}

#[tokio::test]
async fn test_dry_run_rehearses_existing_pending_case() {
    let h = Harness::new();
    let claim = h.seed_matched_claim("S1", "B007", 50.0);
    link_claim(&h, &claim);

    // Live intake creates the case, then a scripted failure strands it
    h.client
        .script(Err(reclaim::submit::SubmissionError::transient("blip")));
    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    let case = CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .unwrap();
    assert_eq!(case.filing_status, FilingStatus::Retrying);

    let report = h.worker.run_cycle("S1", RunMode::DryRun).await.unwrap();
    assert_eq!(report.dry_runs, 1);

    // Status and retry count untouched by the rehearsal
    let after = CaseRepo::get(h.store.as_ref(), case.id).unwrap().unwrap();
    assert_eq!(after.filing_status, FilingStatus::Retrying);
    assert_eq!(after.retry_count, case.retry_count);
    assert_eq!(h.client.call_count(), 1);
}

#[tokio::test]
async fn test_above_threshold_holds_until_approved() {
    let h = Harness::new();
    let claim = h.seed_matched_claim("S1", "B007", 750.0); // threshold is 500
    link_claim(&h, &claim);

    let report = h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    assert_eq!(report.held_for_approval, 1);
    assert_eq!(h.client.call_count(), 0);

    let case = CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .unwrap();
    assert_eq!(case.filing_status, FilingStatus::PendingApproval);

    let ops = OperatorActions::new(h.store.clone(), h.ledger.clone());
    let approved = ops.approve(case.id, "alice").unwrap();
    assert_eq!(approved.filing_status, FilingStatus::Filing);
    assert!(approved.approval_granted);

    // The next cycle picks the approved case up and submits
    let report = h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    assert_eq!(report.filed, 1);
    assert_eq!(h.client.call_count(), 1);

    let case = CaseRepo::get(h.store.as_ref(), case.id).unwrap().unwrap();
    assert_eq!(case.filing_status, FilingStatus::Filed);

    // The approval itself is attributable in the ledger
    let operator_entries = h
        .ledger
        .entries(case.id)
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e.event, AuditEvent::OperatorAction { .. }))
        .count();
    assert_eq!(operator_entries, 1);
}

#[tokio::test]
async fn test_rejection_is_terminal() {
    let h = Harness::new();
    let claim = h.seed_matched_claim("S1", "B007", 750.0);
    link_claim(&h, &claim);

    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    let case = CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .unwrap();

    let ops = OperatorActions::new(h.store.clone(), h.ledger.clone());
    let rejected = ops
        .reject(case.id, "alice", "insufficient evidence")
        .unwrap();
    assert_eq!(rejected.filing_status, FilingStatus::Failed);

    let report = h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    assert_eq!(report.filed, 0);
    assert_eq!(h.client.call_count(), 0);
}

#[tokio::test]
async fn test_submission_timeout_counts_as_transient() {
    let mut settings = test_settings();
    settings.submission_timeout_seconds = 0;
    let h = Harness::with_settings(settings);

    let claim = h.seed_matched_claim("S1", "B007", 50.0);
    link_claim(&h, &claim);

    h.client.set_delay(std::time::Duration::from_millis(100));
    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();

    let case = CaseRepo::by_claim(h.store.as_ref(), claim.id)
        .unwrap()
        .unwrap();
    assert_eq!(case.filing_status, FilingStatus::Retrying);
    assert_eq!(case.retry_count, 1);
    assert!(case.last_error.as_deref().unwrap().contains("timed out"));

    // Once the marketplace responds, the retry files
    h.client.set_delay(std::time::Duration::ZERO);
    h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    let case = CaseRepo::get(h.store.as_ref(), case.id).unwrap().unwrap();
    assert_eq!(case.filing_status, FilingStatus::Filed);
}

#[tokio::test]
async fn test_unlinked_claims_are_not_filed() {
    let h = Harness::new();
    // Claim and document exist but nothing links them
    h.seed_matched_claim("S1", "B007", 50.0);

    let report = h.worker.run_cycle("S1", RunMode::Live).await.unwrap();
    assert_eq!(report.cases_created, 0);
    assert_eq!(h.client.call_count(), 0);
}
