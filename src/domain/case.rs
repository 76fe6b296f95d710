//! Dispute cases and dedupe signatures.
//!
//! A dispute case is the unit of work representing one attempt to file a
//! reimbursement claim. Cases are created by the state machine on the first
//! qualifying match and mutated only through defined transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::claim::{AnomalyType, Claim};

/// Filing lifecycle status of a dispute case.
///
/// Exactly these nine values are persisted; the transition table in
/// `core::state_machine` is the only way from one to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    /// Created, waiting for a worker
    Pending,

    /// A worker is driving the case toward submission
    Filing,

    /// Submission accepted by the marketplace
    Filed,

    /// Transient submission failure, waiting out backoff
    Retrying,

    /// Permanently failed (rejection or retries exhausted)
    Failed,

    /// Attached evidence is unsafe or contradictory; manual override required
    QuarantinedDangerousDoc,

    /// An active case already covers this dedupe signature
    DuplicateBlocked,

    /// A prior case for this signature was already paid out
    AlreadyReimbursed,

    /// Claim amount exceeds the approval threshold; operator decision needed
    PendingApproval,
}

impl FilingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Filing => "filing",
            Self::Filed => "filed",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
            Self::QuarantinedDangerousDoc => "quarantined_dangerous_doc",
            Self::DuplicateBlocked => "duplicate_blocked",
            Self::AlreadyReimbursed => "already_reimbursed",
            Self::PendingApproval => "pending_approval",
        }
    }

    /// Terminal statuses accept no further worker-driven transitions.
    /// Quarantine is terminal too but reachable again via operator override.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filed
                | Self::Failed
                | Self::QuarantinedDangerousDoc
                | Self::DuplicateBlocked
                | Self::AlreadyReimbursed
        )
    }

    /// Whether a case in this status blocks a new attempt for the same
    /// dedupe signature. Failed cases and duplicate markers do not.
    pub fn blocks_new_attempt(&self) -> bool {
        !matches!(self, Self::Failed | Self::DuplicateBlocked)
    }
}

impl std::fmt::Display for FilingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key half of a dedupe signature: the order when one is known, otherwise
/// the product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKey {
    Order(String),
    Product(String),
}

/// The tuple used to detect duplicate filing attempts for the same
/// underlying incident.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupeSignature {
    pub seller_id: String,
    pub key: SignatureKey,
    pub category: AnomalyType,
}

impl DedupeSignature {
    /// Derive the signature from a claim's identifiers.
    ///
    /// Prefers the order identifier; falls back to ASIN, then SKU. A claim
    /// with no identifiers has no signature and cannot be cased.
    pub fn from_claim(claim: &Claim) -> Result<Self, String> {
        let key = if let Some(order_id) = claim.identifiers.order_id.as_deref() {
            SignatureKey::Order(order_id.to_string())
        } else if let Some(product) = claim.identifiers.product_key() {
            SignatureKey::Product(product.to_string())
        } else {
            return Err(format!("claim {} carries no identifiers", claim.id));
        };

        Ok(Self {
            seller_id: claim.seller_id.clone(),
            key,
            category: claim.anomaly_type,
        })
    }
}

impl std::fmt::Display for DedupeSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            SignatureKey::Order(o) => {
                write!(f, "{}:order:{}:{}", self.seller_id, o, self.category)
            }
            SignatureKey::Product(p) => {
                write!(f, "{}:product:{}:{}", self.seller_id, p, self.category)
            }
        }
    }
}

/// One attempt to file a reimbursement claim against the marketplace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeCase {
    /// Unique identifier; also the audit ledger subject
    pub id: Uuid,

    /// Claim the case files for
    pub claim_id: Uuid,

    /// Seller/tenant the case belongs to
    pub seller_id: String,

    /// Dedupe signature in display form
    pub signature: String,

    /// Human-facing case number
    pub case_number: String,

    /// Amount claimed
    pub claim_amount: f64,

    /// ISO 4217 currency code
    pub currency: String,

    /// Filing lifecycle status
    pub filing_status: FilingStatus,

    /// Transient submission failures so far
    pub retry_count: u32,

    /// Human-readable description of the last failure
    pub last_error: Option<String>,

    /// Submission id returned by the marketplace
    pub submission_id: Option<String>,

    /// Case id assigned by the marketplace
    pub external_case_id: Option<String>,

    /// Operator has granted approval for an above-threshold amount
    pub approval_granted: bool,

    /// Earliest time the next attempt may run (retrying only)
    pub next_attempt_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DisputeCase {
    /// Create a fresh pending case for a claim
    pub fn new(claim: &Claim, signature: &DedupeSignature) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            claim_id: claim.id,
            seller_id: claim.seller_id.clone(),
            signature: signature.to_string(),
            case_number: Self::case_number_for(id, now),
            claim_amount: claim.estimated_value,
            currency: claim.currency.clone(),
            filing_status: FilingStatus::Pending,
            retry_count: 0,
            last_error: None,
            submission_id: None,
            external_case_id: None,
            approval_granted: false,
            next_attempt_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case numbers are "RC-{yyyymm}-{first 8 hex of the id}"
    fn case_number_for(id: Uuid, at: DateTime<Utc>) -> String {
        let compact = id.simple().to_string();
        format!("RC-{}-{}", at.format("%Y%m"), &compact[..8])
    }
}
