//! Audit ledger entries and chain hashing.
//!
//! Every mutation to a case or document is recorded as an immutable entry.
//! Entries for a subject form a hash chain: entry *n*'s `prev_hash` equals
//! entry *n-1*'s `new_hash`, and `new_hash` covers the whole entry body, so
//! any edited or removed entry is detectable by replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{FilingStatus, LinkType};

use super::LedgerError;

/// prev_hash of the first entry for a subject
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Who performed the recorded mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Actor {
    /// The filing worker or another automated component
    System,

    /// A human operator, by login name
    Operator(String),
}

/// What happened to the subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuditEvent {
    /// A dispute case was created for a claim
    CaseCreated { claim_id: Uuid, signature: String },

    /// A case moved through the state machine
    StatusChanged {
        from: FilingStatus,
        to: FilingStatus,
        trigger: String,
    },

    /// The matcher linked a claim to this document
    MatchLinked {
        claim_id: Uuid,
        document_id: Uuid,
        link_type: LinkType,
        confidence: f64,
    },

    /// The quarantine check flagged this document
    QuarantineFlagged {
        document_id: Option<Uuid>,
        reason: String,
    },

    /// The marketplace accepted a submission
    SubmissionRecorded {
        submission_id: String,
        external_case_id: String,
    },

    /// A rehearsal pass evaluated this case without submitting
    DryRun { outcome: String },

    /// An operator acted on the case
    OperatorAction {
        action: String,
        reason: Option<String>,
    },
}

impl AuditEvent {
    /// Stable name used for query-by-event-type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CaseCreated { .. } => "case_created",
            Self::StatusChanged { .. } => "status_changed",
            Self::MatchLinked { .. } => "match_linked",
            Self::QuarantineFlagged { .. } => "quarantine_flagged",
            Self::SubmissionRecorded { .. } => "submission_recorded",
            Self::DryRun { .. } => "dry_run",
            Self::OperatorAction { .. } => "operator_action",
        }
    }
}

/// One immutable row of the audit ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique identifier for this entry
    pub id: Uuid,

    /// Case or document the entry is about
    pub subject_id: Uuid,

    /// What happened
    pub event: AuditEvent,

    /// Who did it
    pub actor: Actor,

    /// `new_hash` of the previous entry for this subject, or genesis
    pub prev_hash: String,

    /// Chain hash covering `prev_hash`, the subject state and the entry body
    pub new_hash: String,

    /// Content hash of the subject's state immediately after the event
    pub state_hash: String,

    /// Free-form human-readable note (no secrets)
    pub details: Option<String>,

    /// When the mutation happened
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Recompute the chain hash from the stored fields.
    ///
    /// Equal to `new_hash` for an untampered entry.
    pub fn recompute_hash(&self) -> Result<String, LedgerError> {
        chain_hash(
            &self.prev_hash,
            &self.state_hash,
            &self.body_bytes()?,
        )
    }

    /// Canonical byte serialization of the mutable-content fields
    fn body_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        #[derive(Serialize)]
        struct Body<'a> {
            id: Uuid,
            subject_id: Uuid,
            event: &'a AuditEvent,
            actor: &'a Actor,
            details: &'a Option<String>,
            timestamp: &'a DateTime<Utc>,
        }
        Ok(serde_json::to_vec(&Body {
            id: self.id,
            subject_id: self.subject_id,
            event: &self.event,
            actor: &self.actor,
            details: &self.details,
            timestamp: &self.timestamp,
        })?)
    }
}

/// SHA-256 hex digest of raw bytes
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content hash of a serializable subject state
pub fn hash_state<T: Serialize>(state: &T) -> Result<String, LedgerError> {
    Ok(hash_bytes(&serde_json::to_vec(state)?))
}

/// Chain hash: SHA-256 over prev_hash, state hash and the entry body
pub fn chain_hash(prev_hash: &str, state_hash: &str, body: &[u8]) -> Result<String, LedgerError> {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(state_hash.as_bytes());
    hasher.update(body);
    Ok(hex::encode(hasher.finalize()))
}

/// Build a fully-hashed entry on top of the current chain head
pub fn seal_entry(
    subject_id: Uuid,
    event: AuditEvent,
    actor: Actor,
    state_hash: String,
    details: Option<String>,
    prev_hash: String,
) -> Result<AuditLogEntry, LedgerError> {
    let mut entry = AuditLogEntry {
        id: Uuid::new_v4(),
        subject_id,
        event,
        actor,
        prev_hash,
        new_hash: String::new(),
        state_hash,
        details,
        timestamp: Utc::now(),
    };
    entry.new_hash = entry.recompute_hash()?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> AuditLogEntry {
        seal_entry(
            Uuid::new_v4(),
            AuditEvent::StatusChanged {
                from: FilingStatus::Pending,
                to: FilingStatus::Filing,
                trigger: "worker_pickup".to_string(),
            },
            Actor::System,
            hash_bytes(b"state"),
            None,
            GENESIS_HASH.to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_sealed_entry_verifies() {
        let e = entry();
        assert_eq!(e.recompute_hash().unwrap(), e.new_hash);
    }

    #[test]
    fn test_edited_entry_breaks_hash() {
        let mut e = entry();
        e.details = Some("edited after the fact".to_string());
        assert_ne!(e.recompute_hash().unwrap(), e.new_hash);
    }

    #[test]
    fn test_hash_bytes_is_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
        assert_eq!(hash_bytes(b"abc").len(), 64);
    }

    #[test]
    fn test_event_type_names() {
        let e = entry();
        assert_eq!(e.event.type_name(), "status_changed");
    }

    #[test]
    fn test_entry_round_trips_through_json() {
        let e = entry();
        let json = serde_json::to_string(&e).unwrap();
        let parsed: AuditLogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.new_hash, e.new_hash);
        assert_eq!(parsed.recompute_hash().unwrap(), e.new_hash);
    }
}
