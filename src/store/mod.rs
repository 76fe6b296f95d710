//! Repository traits over persistence.
//!
//! The pipeline components hold only the repository interfaces they need;
//! concrete storage is injected at construction. Two implementations ship:
//! an in-memory store for tests and rehearsal, and a SQLite store that
//! enforces the schema constraints (unique match links, the nine-value
//! filing status, conditional status writes).

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Claim, DisputeCase, EvidenceDocument, FilingStatus, MatchLink};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("store conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Read access to claims produced by the detection pipeline
pub trait ClaimRepo: Send + Sync {
    fn insert(&self, claim: &Claim) -> Result<(), StoreError>;
    fn get(&self, id: Uuid) -> Result<Option<Claim>, StoreError>;
    fn list_by_seller(&self, seller_id: &str) -> Result<Vec<Claim>, StoreError>;
}

/// Read access to evidence documents produced by ingestion/parsing
pub trait DocumentRepo: Send + Sync {
    fn insert(&self, doc: &EvidenceDocument) -> Result<(), StoreError>;
    fn get(&self, id: Uuid) -> Result<Option<EvidenceDocument>, StoreError>;

    /// All documents for a seller whose parser status is completed
    fn list_completed(&self, seller_id: &str) -> Result<Vec<EvidenceDocument>, StoreError>;
}

/// Match links; unique per (claim, document, link_type)
pub trait MatchLinkRepo: Send + Sync {
    /// Insert the link unless the (claim, document, link_type) pair already
    /// exists. Returns true when a new row was written.
    fn upsert(&self, link: &MatchLink) -> Result<bool, StoreError>;

    fn for_claim(&self, claim_id: Uuid) -> Result<Vec<MatchLink>, StoreError>;
}

/// Dispute cases
pub trait CaseRepo: Send + Sync {
    fn insert(&self, case: &DisputeCase) -> Result<(), StoreError>;
    fn get(&self, id: Uuid) -> Result<Option<DisputeCase>, StoreError>;
    fn by_claim(&self, claim_id: Uuid) -> Result<Option<DisputeCase>, StoreError>;
    fn by_signature(&self, signature: &str) -> Result<Vec<DisputeCase>, StoreError>;

    /// Cases a filing cycle should look at: pending, filing (stranded or
    /// freshly approved), and retrying whose backoff has elapsed by `now`.
    fn due_for_filing(
        &self,
        seller_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<DisputeCase>, StoreError>;

    /// Write the case conditionally on its stored status still being
    /// `expected`. Returns false without writing when the status changed
    /// underneath the caller (optimistic concurrency).
    fn update_if_status(
        &self,
        case: &DisputeCase,
        expected: FilingStatus,
    ) -> Result<bool, StoreError>;
}

/// Raw evidence bytes, for checksum verification before submission
pub trait BlobStore: Send + Sync {
    fn read(&self, document_id: Uuid) -> Result<Vec<u8>, StoreError>;
}

pub(crate) fn is_due(case: &DisputeCase, now: DateTime<Utc>) -> bool {
    match case.filing_status {
        FilingStatus::Pending | FilingStatus::Filing => true,
        FilingStatus::Retrying => case
            .next_attempt_at
            .map(|at| at <= now)
            .unwrap_or(true),
        _ => false,
    }
}
