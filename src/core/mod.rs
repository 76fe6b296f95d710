//! Core filing pipeline.
//!
//! This module contains:
//! - EvidenceIndex: inverted identifier maps over parsed documents
//! - ClaimMatcher: tiered claim-to-evidence matching
//! - DuplicateGuard: one active case per dedupe signature
//! - QuarantineCheck: evidence safety gate before submission
//! - CaseStateMachine: the nine-state dispute case lifecycle
//! - FilingWorker: per-tenant intake and filing cycles
//! - OperatorActions / Queries: the human-facing surface

pub mod backoff;
pub mod dedupe;
pub mod index;
pub mod matcher;
pub mod operator;
pub mod quarantine;
pub mod queries;
pub mod state_machine;
pub mod worker;

// Re-export commonly used types
pub use backoff::BackoffPolicy;
pub use dedupe::{DuplicateGuard, GuardDecision};
pub use index::EvidenceIndex;
pub use matcher::{ClaimMatcher, MatchOutcome, MatchReport};
pub use operator::OperatorActions;
pub use quarantine::{QuarantineCheck, QuarantineFlag, QuarantinePolicy};
pub use queries::{CaseStatusView, Queries};
pub use state_machine::{next_status, CaseEvent, CaseStateMachine};
pub use worker::{CycleReport, FilingWorker, FilingWorkerDeps, RunMode};
