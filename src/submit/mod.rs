//! Submission collaborator: the marketplace filing API seam.
//!
//! The worker talks to a trait; tests script it, production wires the HTTP
//! client. Errors carry a retryable flag so the worker can route them to
//! backoff or terminal failure without inspecting messages.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{AnomalyType, Claim, ClaimIdentifiers, DisputeCase, EvidenceDocument};

pub use http::HttpSubmissionClient;

/// Reference to one evidence document in a filing payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub document_id: Uuid,
    pub filename: String,
    pub content_hash: String,
}

/// What gets sent to the marketplace for one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingPayload {
    pub case_id: Uuid,
    pub case_number: String,
    pub seller_id: String,
    pub anomaly_type: AnomalyType,
    pub claim_amount: f64,
    pub currency: String,
    pub identifiers: ClaimIdentifiers,
    pub evidence: Vec<EvidenceRef>,
}

impl FilingPayload {
    /// Assemble the payload from the case, its claim and the matched
    /// documents. Pure construction; dry runs exercise exactly this path.
    pub fn build(case: &DisputeCase, claim: &Claim, documents: &[EvidenceDocument]) -> Self {
        Self {
            case_id: case.id,
            case_number: case.case_number.clone(),
            seller_id: case.seller_id.clone(),
            anomaly_type: claim.anomaly_type,
            claim_amount: case.claim_amount,
            currency: case.currency.clone(),
            identifiers: claim.identifiers.clone(),
            evidence: documents
                .iter()
                .map(|d| EvidenceRef {
                    document_id: d.id,
                    filename: d.filename.clone(),
                    content_hash: d.content_hash.clone(),
                })
                .collect(),
        }
    }
}

/// Receipt returned by a successful submission
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionReceipt {
    pub submission_id: String,
    pub external_case_id: String,
}

/// Submission failure with routing information
#[derive(Debug, Clone, Error)]
#[error("submission failed: {message}")]
pub struct SubmissionError {
    /// True for network/5xx-class failures worth retrying with backoff
    pub retryable: bool,
    pub message: String,
}

impl SubmissionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

/// The marketplace filing API
#[async_trait]
pub trait SubmissionClient: Send + Sync {
    /// Human-readable client name
    fn name(&self) -> &str;

    /// File the case. Blocking network I/O behind a timeout owned by the
    /// caller; a timeout is treated as a transient failure upstream.
    async fn submit(&self, payload: &FilingPayload) -> Result<SubmissionReceipt, SubmissionError>;
}
