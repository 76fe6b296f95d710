//! Read-only query surface exposed to operators and the CLI.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{DisputeCase, MatchLink};
use crate::error::FilingError;
use crate::ledger::{AuditLedger, AuditLogEntry, ChainVerification};
use crate::store::{CaseRepo, MatchLinkRepo, StoreError};

/// Case status view with the tail of its audit trail
#[derive(Debug, Serialize)]
pub struct CaseStatusView {
    pub case: DisputeCase,
    pub recent_entries: Vec<AuditLogEntry>,
}

pub struct Queries {
    cases: Arc<dyn CaseRepo>,
    links: Arc<dyn MatchLinkRepo>,
    ledger: Arc<AuditLedger>,
}

impl Queries {
    pub fn new(
        cases: Arc<dyn CaseRepo>,
        links: Arc<dyn MatchLinkRepo>,
        ledger: Arc<AuditLedger>,
    ) -> Self {
        Self {
            cases,
            links,
            ledger,
        }
    }

    /// Current case state plus its most recent audit entries
    pub fn case_status(&self, case_id: Uuid) -> Result<CaseStatusView, FilingError> {
        let case = self.cases.get(case_id)?.ok_or(FilingError::Store(
            StoreError::NotFound {
                kind: "case",
                id: case_id,
            },
        ))?;

        let mut entries = self.ledger.entries(case_id)?;
        let skip = entries.len().saturating_sub(10);
        entries.drain(..skip);

        Ok(CaseStatusView {
            case,
            recent_entries: entries,
        })
    }

    /// Paged audit trail for any subject (case or document)
    pub fn audit_trail(
        &self,
        subject_id: Uuid,
        page: usize,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, FilingError> {
        Ok(self.ledger.trail(subject_id, page, limit)?)
    }

    /// Evidence links for a claim
    pub fn matches_for_claim(&self, claim_id: Uuid) -> Result<Vec<MatchLink>, FilingError> {
        Ok(self.links.for_claim(claim_id)?)
    }

    /// Replay a subject's chain and recompute every hash
    pub fn verify(&self, subject_id: Uuid) -> Result<ChainVerification, FilingError> {
        Ok(self.ledger.verify(subject_id)?)
    }
}
