//! Error taxonomy for the filing pipeline.
//!
//! Component errors are typed; orchestration code decides routing from the
//! variant: validation issues skip a record, concurrency conflicts force a
//! re-read, invalid transitions abort without writing. Duplicate, quarantine
//! and submission outcomes are not errors here: they flow through
//! `GuardDecision`, quarantine flags and `SubmissionError` into regular case
//! transitions.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::FilingStatus;
use crate::ledger::LedgerError;
use crate::store::StoreError;

/// Errors raised while driving claims and cases through the pipeline
#[derive(Debug, Error)]
pub enum FilingError {
    /// Malformed claim or document; the record is skipped with a log entry,
    /// never fatal to a batch
    #[error("validation failed: {0}")]
    Validation(String),

    /// Stale status read; the transition was aborted without writing
    #[error("stale state for case {case_id}: expected {expected}, found {found}")]
    Concurrency {
        case_id: Uuid,
        expected: FilingStatus,
        found: FilingStatus,
    },

    /// (status, event) pair absent from the transition table
    #[error("invalid transition: {status} cannot accept {event}")]
    InvalidTransition {
        status: FilingStatus,
        event: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
