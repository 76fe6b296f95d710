//! Duplicate guard: at most one active case per dedupe signature.
//!
//! The guard runs before a case is created, under the signature's advisory
//! lock, so the invariant holds by construction rather than by cleanup.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::domain::{DedupeSignature, FilingStatus};
use crate::error::FilingError;
use crate::store::CaseRepo;

/// What a new filing attempt for a signature should become
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// No blocking case exists; create a pending case
    Proceed,

    /// An active (or successfully concluded) case already covers the
    /// signature; the attempt becomes a duplicate_blocked marker
    Blocked { existing: Uuid },

    /// A prior case for the signature was already paid out; the attempt
    /// resolves immediately to already_reimbursed
    AlreadyReimbursed { prior: Uuid },
}

/// Checks new filing attempts against existing cases
pub struct DuplicateGuard {
    cases: Arc<dyn CaseRepo>,
}

impl DuplicateGuard {
    pub fn new(cases: Arc<dyn CaseRepo>) -> Self {
        Self { cases }
    }

    /// Evaluate a signature. Must be called while holding the signature's
    /// advisory lock, before any case row is written.
    pub fn evaluate(&self, signature: &DedupeSignature) -> Result<GuardDecision, FilingError> {
        let existing = self.cases.by_signature(&signature.to_string())?;

        // A paid-out signature wins over everything else
        if let Some(paid) = existing
            .iter()
            .find(|c| c.filing_status == FilingStatus::AlreadyReimbursed)
        {
            debug!(signature = %signature, prior = %paid.id, "signature already reimbursed");
            return Ok(GuardDecision::AlreadyReimbursed { prior: paid.id });
        }

        if let Some(blocking) = existing
            .iter()
            .find(|c| c.filing_status.blocks_new_attempt())
        {
            debug!(signature = %signature, existing = %blocking.id,
                   status = %blocking.filing_status, "signature blocked");
            return Ok(GuardDecision::Blocked {
                existing: blocking.id,
            });
        }

        Ok(GuardDecision::Proceed)
    }
}
