//! Filing worker: turns matched claims into filed dispute cases.
//!
//! A cycle runs two steps for one tenant. Intake walks matched claims that
//! have no case yet, runs the duplicate guard under the signature's advisory
//! lock and creates the case (or its duplicate/already-reimbursed marker).
//! Filing picks up every due case, runs the quarantine check, holds
//! above-threshold amounts for approval and submits the rest, with
//! exponential backoff between transient failures.
//!
//! Parallelism is bounded by a semaphore and distinct signatures only; work
//! on the same signature is serialized through the lock map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::WorkerSettings;
use crate::domain::{Claim, ClaimStatus, DedupeSignature, DisputeCase, FilingStatus};
use crate::error::FilingError;
use crate::ledger::{hash_state, Actor, AuditEvent, AuditLedger};
use crate::store::{CaseRepo, ClaimRepo, DocumentRepo, MatchLinkRepo};
use crate::submit::{FilingPayload, SubmissionClient};

use super::dedupe::{DuplicateGuard, GuardDecision};
use super::quarantine::QuarantineCheck;
use super::state_machine::{CaseEvent, CaseStateMachine};

/// Whether a cycle actually submits or only rehearses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    DryRun,
}

/// Totals for one worker cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub cases_created: usize,
    pub duplicates_blocked: usize,
    pub already_reimbursed: usize,
    pub filed: usize,
    pub retried: usize,
    pub failed: usize,
    pub quarantined: usize,
    pub held_for_approval: usize,
    pub dry_runs: usize,
    pub errors: usize,
}

/// Outcome of filing one case, folded into the cycle report
enum CaseOutcome {
    Filed,
    Retried,
    Failed,
    Quarantined,
    HeldForApproval,
    DryRun,
    Skipped,
}

/// Advisory locks keyed by dedupe signature
struct SignatureLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SignatureLocks {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, signature: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(signature.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Collaborators the worker is wired with
pub struct FilingWorkerDeps {
    pub claims: Arc<dyn ClaimRepo>,
    pub documents: Arc<dyn DocumentRepo>,
    pub links: Arc<dyn MatchLinkRepo>,
    pub cases: Arc<dyn CaseRepo>,
    pub ledger: Arc<AuditLedger>,
    pub client: Arc<dyn SubmissionClient>,
}

/// Per-tenant filing worker
pub struct FilingWorker {
    claims: Arc<dyn ClaimRepo>,
    documents: Arc<dyn DocumentRepo>,
    links: Arc<dyn MatchLinkRepo>,
    cases: Arc<dyn CaseRepo>,
    ledger: Arc<AuditLedger>,
    client: Arc<dyn SubmissionClient>,
    machine: CaseStateMachine,
    guard: DuplicateGuard,
    quarantine: QuarantineCheck,
    settings: WorkerSettings,
    locks: SignatureLocks,
}

impl FilingWorker {
    pub fn new(deps: FilingWorkerDeps, quarantine: QuarantineCheck, settings: WorkerSettings) -> Self {
        Self {
            machine: CaseStateMachine::new(deps.cases.clone(), deps.ledger.clone()),
            guard: DuplicateGuard::new(deps.cases.clone()),
            claims: deps.claims,
            documents: deps.documents,
            links: deps.links,
            cases: deps.cases,
            ledger: deps.ledger,
            client: deps.client,
            quarantine,
            settings,
            locks: SignatureLocks::new(),
        }
    }

    /// Run one full cycle for a tenant: intake then filing.
    #[instrument(skip(self))]
    pub async fn run_cycle(
        self: &Arc<Self>,
        seller_id: &str,
        mode: RunMode,
    ) -> Result<CycleReport, FilingError> {
        let mut report = CycleReport::default();

        self.intake(seller_id, mode, &mut report).await?;
        self.file_due_cases(seller_id, mode, &mut report).await?;

        info!(
            created = report.cases_created,
            filed = report.filed,
            retried = report.retried,
            failed = report.failed,
            quarantined = report.quarantined,
            "cycle complete"
        );
        Ok(report)
    }

    /// Intake step: matched claims without a case become cases (or markers).
    async fn intake(
        &self,
        seller_id: &str,
        mode: RunMode,
        report: &mut CycleReport,
    ) -> Result<(), FilingError> {
        let claims = self.claims.list_by_seller(seller_id)?;

        for claim in claims
            .iter()
            .filter(|c| c.status == ClaimStatus::Detected)
            .take(self.settings.batch_size)
        {
            if self.cases.by_claim(claim.id)?.is_some() {
                continue;
            }
            let links = self.links.for_claim(claim.id)?;
            if links.is_empty() {
                debug!(claim_id = %claim.id, "claim has no evidence links, skipping intake");
                continue;
            }

            let signature = match DedupeSignature::from_claim(claim) {
                Ok(s) => s,
                Err(e) => {
                    warn!(claim_id = %claim.id, error = %e, "claim not signable, skipping");
                    report.errors += 1;
                    continue;
                }
            };

            let lock = self.locks.lock_for(&signature.to_string());
            let _held = lock.lock().await;

            // Re-check under the lock; a concurrent cycle may have won
            if self.cases.by_claim(claim.id)?.is_some() {
                continue;
            }

            let decision = self.guard.evaluate(&signature)?;

            if mode == RunMode::DryRun {
                let outcome = match &decision {
                    // Rehearse the full filing path against a case that is
                    // never persisted, so quarantine and payload problems
                    // surface before anyone runs live
                    GuardDecision::Proceed => {
                        let rehearsal = DisputeCase::new(claim, &signature);
                        format!(
                            "would create case; {}",
                            self.rehearsal_outcome(&rehearsal, claim, &links)?
                        )
                    }
                    GuardDecision::Blocked { existing } => {
                        format!("would block as duplicate of {}", existing)
                    }
                    GuardDecision::AlreadyReimbursed { prior } => {
                        format!("would resolve as reimbursed by {}", prior)
                    }
                };
                self.ledger.append(
                    claim.id,
                    AuditEvent::DryRun { outcome },
                    Actor::System,
                    hash_state(claim)?,
                    None,
                )?;
                report.dry_runs += 1;
                continue;
            }

            match decision {
                GuardDecision::Proceed => {
                    self.machine.create_case(claim, &signature, Actor::System)?;
                    report.cases_created += 1;
                }
                GuardDecision::Blocked { existing } => {
                    let mut case = self.machine.create_case(claim, &signature, Actor::System)?;
                    self.machine.apply(
                        &mut case,
                        CaseEvent::DuplicateDetected { existing },
                        Actor::System,
                    )?;
                    report.duplicates_blocked += 1;
                }
                GuardDecision::AlreadyReimbursed { prior } => {
                    let mut case = self.machine.create_case(claim, &signature, Actor::System)?;
                    self.machine.apply(
                        &mut case,
                        CaseEvent::PriorAlreadyReimbursed { prior },
                        Actor::System,
                    )?;
                    report.already_reimbursed += 1;
                }
            }
        }

        Ok(())
    }

    /// Filing step: process due cases with bounded parallelism.
    async fn file_due_cases(
        self: &Arc<Self>,
        seller_id: &str,
        mode: RunMode,
        report: &mut CycleReport,
    ) -> Result<(), FilingError> {
        let due = self.cases.due_for_filing(seller_id, Utc::now())?;
        if due.is_empty() {
            return Ok(());
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_parallel_signatures));
        let mut handles = Vec::new();

        for case in due.into_iter().take(self.settings.batch_size) {
            let worker = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                let lock = worker.locks.lock_for(&case.signature);
                let _held = lock.lock().await;
                worker.file_case_with_retry(case.id, mode).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(outcome)) => match outcome {
                    CaseOutcome::Filed => report.filed += 1,
                    CaseOutcome::Retried => report.retried += 1,
                    CaseOutcome::Failed => report.failed += 1,
                    CaseOutcome::Quarantined => report.quarantined += 1,
                    CaseOutcome::HeldForApproval => report.held_for_approval += 1,
                    CaseOutcome::DryRun => report.dry_runs += 1,
                    CaseOutcome::Skipped => {}
                },
                Ok(Err(e)) => {
                    warn!(error = %e, "case filing failed");
                    report.errors += 1;
                }
                Err(e) => {
                    warn!(error = %e, "filing task panicked");
                    report.errors += 1;
                }
            }
        }

        Ok(())
    }

    /// One re-read and retry on a concurrent status change, then give up
    /// for the cycle.
    async fn file_case_with_retry(
        &self,
        case_id: Uuid,
        mode: RunMode,
    ) -> Result<CaseOutcome, FilingError> {
        match self.file_case(case_id, mode).await {
            Err(FilingError::Concurrency { .. }) => {
                debug!(%case_id, "status changed concurrently, retrying once");
                self.file_case(case_id, mode).await
            }
            other => other,
        }
    }

    async fn file_case(&self, case_id: Uuid, mode: RunMode) -> Result<CaseOutcome, FilingError> {
        // Fresh read under the signature lock; the snapshot from the due
        // query may be stale
        let Some(mut case) = self.cases.get(case_id)? else {
            return Ok(CaseOutcome::Skipped);
        };
        if !matches!(
            case.filing_status,
            FilingStatus::Pending | FilingStatus::Filing | FilingStatus::Retrying
        ) {
            return Ok(CaseOutcome::Skipped);
        }

        let claim = self
            .claims
            .get(case.claim_id)?
            .ok_or_else(|| FilingError::Validation(format!("claim {} not found", case.claim_id)))?;
        let links = self.links.for_claim(claim.id)?;

        if mode == RunMode::DryRun {
            return self.rehearse(&case, &claim, &links);
        }

        match case.filing_status {
            FilingStatus::Pending => {
                self.machine
                    .apply(&mut case, CaseEvent::WorkerPickup, Actor::System)?;
            }
            FilingStatus::Retrying => {
                self.machine
                    .apply(&mut case, CaseEvent::BackoffElapsed, Actor::System)?;
            }
            // Stranded mid-filing or freshly approved; resume directly
            FilingStatus::Filing => {}
            _ => return Ok(CaseOutcome::Skipped),
        }

        let flags = self.quarantine.inspect(&claim, &links)?;
        if !flags.is_empty() {
            for flag in &flags {
                self.ledger.append(
                    case.id,
                    AuditEvent::QuarantineFlagged {
                        document_id: Some(flag.document_id()),
                        reason: flag.to_string(),
                    },
                    Actor::System,
                    hash_state(&case)?,
                    None,
                )?;
            }
            let reason = flags
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            self.machine
                .apply(&mut case, CaseEvent::QuarantineFlagged { reason }, Actor::System)?;
            return Ok(CaseOutcome::Quarantined);
        }

        if case.claim_amount > self.settings.approval_threshold && !case.approval_granted {
            self.machine.apply(
                &mut case,
                CaseEvent::ApprovalRequired {
                    threshold: self.settings.approval_threshold,
                },
                Actor::System,
            )?;
            return Ok(CaseOutcome::HeldForApproval);
        }

        let documents = self.load_documents(&links)?;
        let payload = FilingPayload::build(&case, &claim, &documents);
        self.submit(&mut case, &payload).await
    }

    /// Dry run: evaluate everything, transition nothing, submit nothing.
    fn rehearse(
        &self,
        case: &DisputeCase,
        claim: &Claim,
        links: &[crate::domain::MatchLink],
    ) -> Result<CaseOutcome, FilingError> {
        let outcome = self.rehearsal_outcome(case, claim, links)?;

        self.ledger.append(
            case.id,
            AuditEvent::DryRun { outcome },
            Actor::System,
            hash_state(case)?,
            None,
        )?;
        Ok(CaseOutcome::DryRun)
    }

    /// What a live run would do with this case: quarantine, hold for
    /// approval, or submit the built payload.
    fn rehearsal_outcome(
        &self,
        case: &DisputeCase,
        claim: &Claim,
        links: &[crate::domain::MatchLink],
    ) -> Result<String, FilingError> {
        let flags = self.quarantine.inspect(claim, links)?;

        let outcome = if !flags.is_empty() {
            format!("would quarantine: {} flag(s)", flags.len())
        } else if case.claim_amount > self.settings.approval_threshold && !case.approval_granted {
            format!(
                "would hold for approval (amount {} over threshold {})",
                case.claim_amount, self.settings.approval_threshold
            )
        } else {
            let documents = self.load_documents(links)?;
            let payload = FilingPayload::build(case, claim, &documents);
            format!(
                "would submit {} with {} evidence document(s)",
                payload.case_number,
                payload.evidence.len()
            )
        };

        Ok(outcome)
    }

    async fn submit(
        &self,
        case: &mut DisputeCase,
        payload: &FilingPayload,
    ) -> Result<CaseOutcome, FilingError> {
        let timeout = Duration::from_secs(self.settings.submission_timeout_seconds);
        let result = tokio::time::timeout(timeout, self.client.submit(payload)).await;

        match result {
            Ok(Ok(receipt)) => {
                self.ledger.append(
                    case.id,
                    AuditEvent::SubmissionRecorded {
                        submission_id: receipt.submission_id.clone(),
                        external_case_id: receipt.external_case_id.clone(),
                    },
                    Actor::System,
                    hash_state(&*case)?,
                    None,
                )?;
                self.machine.apply(
                    case,
                    CaseEvent::SubmissionSucceeded {
                        submission_id: receipt.submission_id,
                        external_case_id: receipt.external_case_id,
                    },
                    Actor::System,
                )?;
                Ok(CaseOutcome::Filed)
            }
            Ok(Err(e)) if !e.retryable => {
                self.machine.apply(
                    case,
                    CaseEvent::SubmissionFailedPermanent { message: e.message },
                    Actor::System,
                )?;
                Ok(CaseOutcome::Failed)
            }
            Ok(Err(e)) => self.handle_transient(case, e.message).await,
            Err(_) => {
                let message = format!("submission timed out after {:?}", timeout);
                self.handle_transient(case, message).await
            }
        }
    }

    async fn handle_transient(
        &self,
        case: &mut DisputeCase,
        message: String,
    ) -> Result<CaseOutcome, FilingError> {
        let next_attempt_at = self
            .settings
            .backoff
            .next_attempt_at(Utc::now(), case.retry_count + 1);

        self.machine.apply(
            case,
            CaseEvent::SubmissionFailedRetryable {
                message,
                next_attempt_at,
            },
            Actor::System,
        )?;

        if self.settings.backoff.exhausted(case.retry_count) {
            self.machine
                .apply(case, CaseEvent::RetriesExhausted, Actor::System)?;
            return Ok(CaseOutcome::Failed);
        }

        Ok(CaseOutcome::Retried)
    }

    fn load_documents(
        &self,
        links: &[crate::domain::MatchLink],
    ) -> Result<Vec<crate::domain::EvidenceDocument>, FilingError> {
        let mut documents = Vec::with_capacity(links.len());
        for link in links {
            if let Some(doc) = self.documents.get(link.document_id)? {
                documents.push(doc);
            }
        }
        Ok(documents)
    }
}
