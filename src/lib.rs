//! reclaim - Evidence-backed marketplace reimbursement claim filing engine
//!
//! Takes detected reimbursement claims, links them to parsed evidence
//! documents, and files dispute cases against the marketplace under strict
//! safety rails.
//!
//! # Architecture
//!
//! The filing pipeline is built around an append-only audit ledger:
//! - Every case and document mutation is recorded as a hash-chained entry
//! - A case's `filing_status` moves only through the state machine's
//!   transition table, with a ledger entry per transition
//! - Chains replay from genesis, so edits and removals are detectable
//!
//! # Modules
//!
//! - `domain`: data structures (Claim, EvidenceDocument, MatchLink, DisputeCase)
//! - `core`: matching, dedupe, quarantine, state machine, filing worker
//! - `ledger`: the hash-chained audit ledger
//! - `store`: repository traits with in-memory and SQLite backends
//! - `submit`: the marketplace submission seam
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Rehearse a filing cycle without submitting
//! reclaim scan --seller S1 --dry-run
//!
//! # File for real
//! reclaim scan --seller S1
//!
//! # Inspect and verify
//! reclaim status <case-id>
//! reclaim verify
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod store;
pub mod submit;

// Re-export main types at crate root for convenience
pub use core::{
    CaseStateMachine, ClaimMatcher, DuplicateGuard, EvidenceIndex, FilingWorker, OperatorActions,
    Queries, QuarantineCheck, RunMode,
};
pub use domain::{
    AnomalyType, Claim, DedupeSignature, DisputeCase, DocumentKind, EvidenceDocument,
    FilingStatus, LinkType, MatchLink,
};
pub use error::FilingError;
pub use ledger::{Actor, AuditEvent, AuditLedger, AuditLogEntry};
pub use store::{MemoryStore, SqliteStore};
pub use submit::{FilingPayload, SubmissionClient, SubmissionError, SubmissionReceipt};
