//! Operator actions on held cases.
//!
//! Every action re-reads the case immediately before acting and goes through
//! the state machine, so a stale console view surfaces as an error instead of
//! silently overwriting worker progress.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::DisputeCase;
use crate::error::FilingError;
use crate::ledger::{hash_state, Actor, AuditEvent, AuditLedger};
use crate::store::{CaseRepo, StoreError};

use super::state_machine::{CaseEvent, CaseStateMachine};

/// Approve, reject and quarantine-override surface
pub struct OperatorActions {
    cases: Arc<dyn CaseRepo>,
    ledger: Arc<AuditLedger>,
    machine: CaseStateMachine,
}

impl OperatorActions {
    pub fn new(cases: Arc<dyn CaseRepo>, ledger: Arc<AuditLedger>) -> Self {
        Self {
            machine: CaseStateMachine::new(cases.clone(), ledger.clone()),
            cases,
            ledger,
        }
    }

    /// Release an above-threshold case for filing. The next worker cycle
    /// picks it up and submits.
    #[instrument(skip(self))]
    pub fn approve(&self, case_id: Uuid, operator: &str) -> Result<DisputeCase, FilingError> {
        let mut case = self.load(case_id)?;
        let actor = Actor::Operator(operator.to_string());

        self.machine
            .apply(&mut case, CaseEvent::OperatorApproved, actor.clone())?;
        self.record_action(&case, actor, "approve", None)?;

        info!(case_number = %case.case_number, "case approved");
        Ok(case)
    }

    /// Reject an above-threshold case. Terminal.
    #[instrument(skip(self, reason))]
    pub fn reject(
        &self,
        case_id: Uuid,
        operator: &str,
        reason: &str,
    ) -> Result<DisputeCase, FilingError> {
        let mut case = self.load(case_id)?;
        let actor = Actor::Operator(operator.to_string());

        self.machine.apply(
            &mut case,
            CaseEvent::OperatorRejected {
                reason: reason.to_string(),
            },
            actor.clone(),
        )?;
        self.record_action(&case, actor, "reject", Some(reason))?;

        info!(case_number = %case.case_number, "case rejected");
        Ok(case)
    }

    /// Send a quarantined case back to pending after manual verification of
    /// the evidence. The quarantine check runs again on the next attempt.
    #[instrument(skip(self, reason))]
    pub fn override_quarantine(
        &self,
        case_id: Uuid,
        operator: &str,
        reason: &str,
    ) -> Result<DisputeCase, FilingError> {
        let mut case = self.load(case_id)?;
        let actor = Actor::Operator(operator.to_string());

        self.machine.apply(
            &mut case,
            CaseEvent::QuarantineOverridden {
                reason: reason.to_string(),
            },
            actor.clone(),
        )?;
        self.record_action(&case, actor, "override_quarantine", Some(reason))?;

        info!(case_number = %case.case_number, "quarantine overridden");
        Ok(case)
    }

    fn load(&self, case_id: Uuid) -> Result<DisputeCase, FilingError> {
        self.cases
            .get(case_id)?
            .ok_or_else(|| {
                FilingError::Store(StoreError::NotFound {
                    kind: "case",
                    id: case_id,
                })
            })
    }

    fn record_action(
        &self,
        case: &DisputeCase,
        actor: Actor,
        action: &str,
        reason: Option<&str>,
    ) -> Result<(), FilingError> {
        self.ledger.append(
            case.id,
            AuditEvent::OperatorAction {
                action: action.to_string(),
                reason: reason.map(|r| r.to_string()),
            },
            actor,
            hash_state(case)?,
            None,
        )?;
        Ok(())
    }
}
