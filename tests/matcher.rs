//! Matching Integration Tests
//!
//! Tiered matching against the evidence index, link persistence and
//! idempotent re-runs.

mod common;

use common::{claim_with_asin, document, Harness};
use reclaim::core::{ClaimMatcher, EvidenceIndex};
use reclaim::domain::{ClaimIdentifiers, DocumentKind, LinkType, ParserStatus};
use reclaim::store::{ClaimRepo, DocumentRepo, MatchLinkRepo};

fn matcher(h: &Harness) -> ClaimMatcher {
    ClaimMatcher::new(h.store.clone(), h.store.clone(), h.ledger.clone())
}

#[test]
fn test_asin_tier_links_all_hits() {
    let h = Harness::new();
    let claim = claim_with_asin("S1", "B007", 50.0);
    ClaimRepo::insert(h.store.as_ref(), &claim).unwrap();

    for name in ["invoice.pdf", "manifest.pdf"] {
        let doc = document("S1", DocumentKind::Invoice, "application/pdf", name).with_asin("B007");
        DocumentRepo::insert(h.store.as_ref(), &doc.doc).unwrap();
    }
    let docs = DocumentRepo::list_completed(h.store.as_ref(), "S1").unwrap();
    let index = EvidenceIndex::build(&docs);

    let outcome = matcher(&h).match_claim(&claim, &index).unwrap();

    assert_eq!(outcome.tier, Some(LinkType::Asin));
    assert_eq!(outcome.created.len(), 2);
    for link in &outcome.created {
        assert!((link.confidence - 0.95 * 0.9).abs() < 1e-9);
    }
    assert_eq!(
        MatchLinkRepo::for_claim(h.store.as_ref(), claim.id)
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn test_first_tier_with_hits_wins() {
    let h = Harness::new();
    let mut claim = claim_with_asin("S1", "B007", 50.0);
    claim.identifiers = ClaimIdentifiers {
        asin: Some("B007".to_string()),
        sku: Some("SKU-1".to_string()),
        order_id: Some("O-1".to_string()),
    };
    ClaimRepo::insert(h.store.as_ref(), &claim).unwrap();

    // No document carries the ASIN; one carries the SKU, one the order id
    let sku_doc =
        document("S1", DocumentKind::Invoice, "application/pdf", "sku.pdf").with_sku("SKU-1");
    let order_doc =
        document("S1", DocumentKind::Invoice, "application/pdf", "order.pdf").with_order("O-1");
    DocumentRepo::insert(h.store.as_ref(), &sku_doc.doc).unwrap();
    DocumentRepo::insert(h.store.as_ref(), &order_doc.doc).unwrap();

    let docs = DocumentRepo::list_completed(h.store.as_ref(), "S1").unwrap();
    let index = EvidenceIndex::build(&docs);

    let outcome = matcher(&h).match_claim(&claim, &index).unwrap();

    // SKU outranks order id; the order-id tier is never evaluated
    assert_eq!(outcome.tier, Some(LinkType::Sku));
    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].document_id, sku_doc.doc.id);
}

#[test]
fn test_rerun_is_idempotent() {
    let h = Harness::new();
    let claim = claim_with_asin("S1", "B007", 50.0);
    ClaimRepo::insert(h.store.as_ref(), &claim).unwrap();

    let doc = document("S1", DocumentKind::Invoice, "application/pdf", "invoice.pdf")
        .with_asin("B007");
    DocumentRepo::insert(h.store.as_ref(), &doc.doc).unwrap();

    let docs = DocumentRepo::list_completed(h.store.as_ref(), "S1").unwrap();
    let index = EvidenceIndex::build(&docs);
    let m = matcher(&h);

    let first = m.match_claim(&claim, &index).unwrap();
    let second = m.match_claim(&claim, &index).unwrap();

    assert_eq!(first.created.len(), 1);
    assert_eq!(second.created.len(), 0);
    assert_eq!(
        MatchLinkRepo::for_claim(h.store.as_ref(), claim.id)
            .unwrap()
            .len(),
        1
    );
    // Exactly one ledger entry on the document, despite two runs
    assert_eq!(h.ledger.entries(doc.doc.id).unwrap().len(), 1);
}

#[test]
fn test_incomplete_documents_never_match() {
    let h = Harness::new();
    let claim = claim_with_asin("S1", "B007", 50.0);
    ClaimRepo::insert(h.store.as_ref(), &claim).unwrap();

    let mut doc = document("S1", DocumentKind::Invoice, "application/pdf", "draft.pdf")
        .with_asin("B007");
    doc.doc.parser_status = ParserStatus::Processing;
    DocumentRepo::insert(h.store.as_ref(), &doc.doc).unwrap();

    let docs = DocumentRepo::list_completed(h.store.as_ref(), "S1").unwrap();
    let index = EvidenceIndex::build(&docs);

    let outcome = matcher(&h).match_claim(&claim, &index).unwrap();
    assert!(outcome.is_unmatched());
}

#[test]
fn test_batch_counts_unmatched_claims() {
    let h = Harness::new();
    let matched = claim_with_asin("S1", "B007", 50.0);
    let unmatched = claim_with_asin("S1", "B999", 20.0);
    ClaimRepo::insert(h.store.as_ref(), &matched).unwrap();
    ClaimRepo::insert(h.store.as_ref(), &unmatched).unwrap();

    let doc = document("S1", DocumentKind::Invoice, "application/pdf", "invoice.pdf")
        .with_asin("B007");
    DocumentRepo::insert(h.store.as_ref(), &doc.doc).unwrap();

    let docs = DocumentRepo::list_completed(h.store.as_ref(), "S1").unwrap();
    let index = EvidenceIndex::build(&docs);

    let report = matcher(&h).match_batch(&[matched, unmatched], &index);
    assert_eq!(report.matched, 1);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.links_created, 1);
}
