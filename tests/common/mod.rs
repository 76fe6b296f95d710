//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use reclaim::config::WorkerSettings;
use reclaim::core::{
    BackoffPolicy, FilingWorker, FilingWorkerDeps, QuarantineCheck, QuarantinePolicy,
};
use reclaim::domain::{
    AnomalyType, Claim, ClaimIdentifiers, ClaimStatus, DocumentKind, EvidenceDocument,
    ParsedIdentifiers, ParserStatus,
};
use reclaim::ledger::{hash_bytes, AuditLedger};
use reclaim::store::{ClaimRepo, DocumentRepo, MemoryStore};
use reclaim::submit::{FilingPayload, SubmissionClient, SubmissionError, SubmissionReceipt};

/// Scripted submission client counting every call
pub struct MockSubmissionClient {
    outcomes: Mutex<VecDeque<Result<SubmissionReceipt, SubmissionError>>>,
    delay: Mutex<std::time::Duration>,
    pub calls: AtomicUsize,
}

impl MockSubmissionClient {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            delay: Mutex::new(std::time::Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue the outcome of the next submission; unscripted calls succeed.
    pub fn script(&self, outcome: Result<SubmissionReceipt, SubmissionError>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Make every submission take this long, to exercise timeouts.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionClient for MockSubmissionClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, payload: &FilingPayload) -> Result<SubmissionReceipt, SubmissionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(SubmissionReceipt {
                submission_id: format!("sub-{}", payload.case_number),
                external_case_id: format!("ext-{}", payload.case_number),
            }),
        }
    }
}

/// In-memory store, temp-dir ledger and a worker wired with the mock client
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<AuditLedger>,
    pub client: Arc<MockSubmissionClient>,
    pub worker: Arc<FilingWorker>,
    _temp: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: WorkerSettings) -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(AuditLedger::open(temp.path().join("ledger")).unwrap());
        let client = Arc::new(MockSubmissionClient::new());

        let quarantine =
            QuarantineCheck::new(QuarantinePolicy::default(), store.clone(), store.clone());
        let worker = Arc::new(FilingWorker::new(
            FilingWorkerDeps {
                claims: store.clone(),
                documents: store.clone(),
                links: store.clone(),
                cases: store.clone(),
                ledger: ledger.clone(),
                client: client.clone(),
            },
            quarantine,
            settings,
        ));

        Self {
            store,
            ledger,
            client,
            worker,
            _temp: temp,
        }
    }

    /// Insert a claim plus a matching clean document with its blob stored.
    pub fn seed_matched_claim(&self, seller: &str, asin: &str, amount: f64) -> Claim {
        let claim = claim_with_asin(seller, asin, amount);
        ClaimRepo::insert(self.store.as_ref(), &claim).unwrap();

        let doc = document(seller, DocumentKind::Invoice, "application/pdf", "invoice.pdf")
            .with_asin(asin);
        DocumentRepo::insert(self.store.as_ref(), &doc.doc).unwrap();
        self.store.put_blob(doc.doc.id, doc.bytes);

        claim
    }
}

/// Backoff with no real delays so retrying cases are due immediately
pub fn test_settings() -> WorkerSettings {
    WorkerSettings {
        batch_size: 100,
        approval_threshold: 500.0,
        submission_timeout_seconds: 5,
        max_parallel_signatures: 4,
        backoff: BackoffPolicy {
            max_retries: 3,
            base_delay_ms: 0,
            multiplier: 2.0,
            max_delay_ms: 0,
            jitter: 0.0,
        },
    }
}

pub fn claim_with_asin(seller: &str, asin: &str, amount: f64) -> Claim {
    Claim {
        id: Uuid::new_v4(),
        seller_id: seller.to_string(),
        anomaly_type: AnomalyType::MissingUnit,
        estimated_value: amount,
        currency: "USD".to_string(),
        identifiers: ClaimIdentifiers {
            asin: Some(asin.to_string()),
            sku: None,
            order_id: None,
        },
        detector_confidence: 0.9,
        status: ClaimStatus::Detected,
    }
}

pub fn claim_with_order(seller: &str, order_id: &str, amount: f64) -> Claim {
    Claim {
        id: Uuid::new_v4(),
        seller_id: seller.to_string(),
        anomaly_type: AnomalyType::MissingUnit,
        estimated_value: amount,
        currency: "USD".to_string(),
        identifiers: ClaimIdentifiers {
            asin: None,
            sku: None,
            order_id: Some(order_id.to_string()),
        },
        detector_confidence: 0.9,
        status: ClaimStatus::Detected,
    }
}

/// Document plus the raw bytes its content hash was computed from
pub struct DocFixture {
    pub doc: EvidenceDocument,
    pub bytes: Vec<u8>,
}

impl DocFixture {
    pub fn with_asin(mut self, asin: &str) -> Self {
        self.doc.identifiers.asins.push(asin.to_string());
        self
    }

    pub fn with_sku(mut self, sku: &str) -> Self {
        self.doc.identifiers.skus.push(sku.to_string());
        self
    }

    pub fn with_order(mut self, order_id: &str) -> Self {
        self.doc.identifiers.order_ids.push(order_id.to_string());
        self
    }
}

pub fn document(
    seller: &str,
    kind: DocumentKind,
    content_type: &str,
    filename: &str,
) -> DocFixture {
    let bytes = format!("{} body", filename).into_bytes();
    DocFixture {
        doc: EvidenceDocument {
            id: Uuid::new_v4(),
            seller_id: seller.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            kind,
            content_hash: hash_bytes(&bytes),
            parser_status: ParserStatus::Completed,
            parser_confidence: 0.9,
            identifiers: ParsedIdentifiers::default(),
        },
        bytes,
    }
}
