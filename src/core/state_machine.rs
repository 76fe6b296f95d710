//! Dispute case state machine.
//!
//! The transition table is the single authority over `filing_status`. Any
//! (status, event) pair outside the table raises an error and leaves stored
//! state untouched. Applying a transition writes the case conditionally on
//! its status being unchanged and appends exactly one ledger entry before
//! returning.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{Claim, DedupeSignature, DisputeCase, FilingStatus};
use crate::error::FilingError;
use crate::ledger::{hash_state, Actor, AuditEvent, AuditLedger};
use crate::store::CaseRepo;

/// Everything that can happen to a dispute case
#[derive(Debug, Clone, PartialEq)]
pub enum CaseEvent {
    /// The duplicate guard found an active case for the signature
    DuplicateDetected { existing: Uuid },

    /// A prior case for the signature was already paid out
    PriorAlreadyReimbursed { prior: Uuid },

    /// A worker picked the case up for filing
    WorkerPickup,

    /// The quarantine check flagged attached evidence
    QuarantineFlagged { reason: String },

    /// The claim amount exceeds the approval threshold
    ApprovalRequired { threshold: f64 },

    /// The marketplace accepted the submission
    SubmissionSucceeded {
        submission_id: String,
        external_case_id: String,
    },

    /// Retryable submission failure; backoff scheduled
    SubmissionFailedRetryable {
        message: String,
        next_attempt_at: DateTime<Utc>,
    },

    /// Non-retryable business rejection
    SubmissionFailedPermanent { message: String },

    /// Backoff elapsed with retries left
    BackoffElapsed,

    /// Retry budget exhausted
    RetriesExhausted,

    /// Operator approved an above-threshold case
    OperatorApproved,

    /// Operator rejected an above-threshold case
    OperatorRejected { reason: String },

    /// Operator manually released a quarantined case
    QuarantineOverridden { reason: String },
}

impl CaseEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DuplicateDetected { .. } => "duplicate_detected",
            Self::PriorAlreadyReimbursed { .. } => "prior_already_reimbursed",
            Self::WorkerPickup => "worker_pickup",
            Self::QuarantineFlagged { .. } => "quarantine_flagged",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::SubmissionSucceeded { .. } => "submission_succeeded",
            Self::SubmissionFailedRetryable { .. } => "submission_failed_retryable",
            Self::SubmissionFailedPermanent { .. } => "submission_failed_permanent",
            Self::BackoffElapsed => "backoff_elapsed",
            Self::RetriesExhausted => "retries_exhausted",
            Self::OperatorApproved => "operator_approved",
            Self::OperatorRejected { .. } => "operator_rejected",
            Self::QuarantineOverridden { .. } => "quarantine_overridden",
        }
    }
}

/// The transition table. Pure; consults nothing but its arguments.
pub fn next_status(current: FilingStatus, event: &CaseEvent) -> Result<FilingStatus, FilingError> {
    use CaseEvent::*;
    use FilingStatus::*;

    let next = match (current, event) {
        (Pending, DuplicateDetected { .. }) => DuplicateBlocked,
        (Pending, PriorAlreadyReimbursed { .. }) => AlreadyReimbursed,
        (Pending, WorkerPickup) => Filing,

        (Filing, QuarantineFlagged { .. }) => QuarantinedDangerousDoc,
        (Filing, ApprovalRequired { .. }) => PendingApproval,
        (Filing, SubmissionSucceeded { .. }) => Filed,
        (Filing, SubmissionFailedRetryable { .. }) => Retrying,
        (Filing, SubmissionFailedPermanent { .. }) => Failed,

        (Retrying, BackoffElapsed) => Filing,
        (Retrying, RetriesExhausted) => Failed,

        (PendingApproval, OperatorApproved) => Filing,
        (PendingApproval, OperatorRejected { .. }) => Failed,

        (QuarantinedDangerousDoc, QuarantineOverridden { .. }) => Pending,

        (status, event) => {
            return Err(FilingError::InvalidTransition {
                status,
                event: event.name(),
            })
        }
    };

    Ok(next)
}

/// Applies transitions: conditional status write plus one ledger entry
pub struct CaseStateMachine {
    cases: Arc<dyn CaseRepo>,
    ledger: Arc<AuditLedger>,
}

impl CaseStateMachine {
    pub fn new(cases: Arc<dyn CaseRepo>, ledger: Arc<AuditLedger>) -> Self {
        Self { cases, ledger }
    }

    /// Create a fresh pending case for a claim and record its birth.
    ///
    /// Caller must hold the signature's advisory lock and have run the
    /// duplicate guard first.
    pub fn create_case(
        &self,
        claim: &Claim,
        signature: &DedupeSignature,
        actor: Actor,
    ) -> Result<DisputeCase, FilingError> {
        let case = DisputeCase::new(claim, signature);
        self.cases.insert(&case)?;

        self.ledger.append(
            case.id,
            AuditEvent::CaseCreated {
                claim_id: claim.id,
                signature: case.signature.clone(),
            },
            actor,
            hash_state(&case)?,
            None,
        )?;

        info!(case_id = %case.id, claim_id = %claim.id, "case created");
        Ok(case)
    }

    /// Apply one event to a case.
    ///
    /// The in-memory case is mutated to the post-event state and written
    /// conditionally on the stored status matching what the caller read. A
    /// concurrent change aborts with `ConcurrencyError` and restores the
    /// caller's view of the case, with nothing written anywhere.
    #[instrument(skip(self, case, event), fields(case_id = %case.id, event = event.name()))]
    pub fn apply(
        &self,
        case: &mut DisputeCase,
        event: CaseEvent,
        actor: Actor,
    ) -> Result<(), FilingError> {
        let from = case.filing_status;
        let to = next_status(from, &event)?;

        let before = case.clone();
        apply_effects(case, &event);
        case.filing_status = to;
        case.updated_at = Utc::now();

        if !self.cases.update_if_status(case, from)? {
            *case = before;
            let found = self
                .cases
                .get(case.id)?
                .map(|c| c.filing_status)
                .unwrap_or(from);
            return Err(FilingError::Concurrency {
                case_id: case.id,
                expected: from,
                found,
            });
        }

        let details = transition_details(&event);
        self.ledger.append(
            case.id,
            AuditEvent::StatusChanged {
                from,
                to,
                trigger: event.name().to_string(),
            },
            actor,
            hash_state(case)?,
            details,
        )?;

        info!(from = %from, to = %to, "case transitioned");
        Ok(())
    }
}

/// Side effects on the case record beyond the status field itself
fn apply_effects(case: &mut DisputeCase, event: &CaseEvent) {
    match event {
        CaseEvent::SubmissionSucceeded {
            submission_id,
            external_case_id,
        } => {
            case.submission_id = Some(submission_id.clone());
            case.external_case_id = Some(external_case_id.clone());
            case.last_error = None;
            case.next_attempt_at = None;
        }
        CaseEvent::SubmissionFailedRetryable {
            message,
            next_attempt_at,
        } => {
            case.retry_count += 1;
            case.last_error = Some(message.clone());
            case.next_attempt_at = Some(*next_attempt_at);
        }
        CaseEvent::SubmissionFailedPermanent { message } => {
            case.last_error = Some(message.clone());
            case.next_attempt_at = None;
        }
        CaseEvent::QuarantineFlagged { reason } => {
            case.last_error = Some(reason.clone());
        }
        CaseEvent::RetriesExhausted => {
            case.last_error = Some(format!(
                "retry budget exhausted after {} attempts",
                case.retry_count
            ));
            case.next_attempt_at = None;
        }
        CaseEvent::OperatorApproved => {
            case.approval_granted = true;
        }
        CaseEvent::OperatorRejected { reason } => {
            case.last_error = Some(format!("rejected by operator: {}", reason));
        }
        CaseEvent::QuarantineOverridden { .. } => {
            case.last_error = None;
        }
        CaseEvent::BackoffElapsed => {
            case.next_attempt_at = None;
        }
        CaseEvent::DuplicateDetected { .. }
        | CaseEvent::PriorAlreadyReimbursed { .. }
        | CaseEvent::WorkerPickup
        | CaseEvent::ApprovalRequired { .. } => {}
    }
}

fn transition_details(event: &CaseEvent) -> Option<String> {
    match event {
        CaseEvent::DuplicateDetected { existing } => {
            Some(format!("active case {} covers this signature", existing))
        }
        CaseEvent::PriorAlreadyReimbursed { prior } => {
            Some(format!("signature paid out by case {}", prior))
        }
        CaseEvent::QuarantineFlagged { reason } => Some(reason.clone()),
        CaseEvent::SubmissionFailedRetryable { message, .. } => Some(message.clone()),
        CaseEvent::SubmissionFailedPermanent { message } => Some(message.clone()),
        CaseEvent::OperatorRejected { reason } => Some(reason.clone()),
        CaseEvent::QuarantineOverridden { reason } => Some(reason.clone()),
        _ => None,
    }
}
