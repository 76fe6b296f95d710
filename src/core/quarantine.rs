//! Quarantine check: untrusted or contradictory evidence never reaches the
//! marketplace.
//!
//! Runs against a case's attached documents immediately before submission.
//! Any flag routes the case to the terminal quarantined status with zero
//! submission calls made.

use std::sync::Arc;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{AnomalyType, Claim, DocumentKind, EvidenceDocument, MatchLink};
use crate::error::FilingError;
use crate::ledger::hash_bytes;
use crate::store::{BlobStore, DocumentRepo};

/// Reasons a document (or the whole case) gets quarantined
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QuarantineFlag {
    #[error("content type not allowed: {content_type}")]
    DisallowedContentType { document_id: Uuid, content_type: String },

    #[error("filename matches denylist: {filename}")]
    DenylistedFilename { document_id: Uuid, filename: String },

    #[error("checksum mismatch: recorded {recorded}, recomputed {actual}")]
    ChecksumMismatch {
        document_id: Uuid,
        recorded: String,
        actual: String,
    },

    #[error("{kind:?} evidence conflicts with a {category} claim")]
    SemanticConflict {
        document_id: Uuid,
        kind: DocumentKind,
        category: AnomalyType,
    },

    #[error("linked document {document_id} is missing from the store")]
    MissingDocument { document_id: Uuid },
}

impl QuarantineFlag {
    pub fn document_id(&self) -> Uuid {
        match self {
            Self::DisallowedContentType { document_id, .. }
            | Self::DenylistedFilename { document_id, .. }
            | Self::ChecksumMismatch { document_id, .. }
            | Self::SemanticConflict { document_id, .. }
            | Self::MissingDocument { document_id } => *document_id,
        }
    }
}

/// What evidence is acceptable for submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantinePolicy {
    /// MIME types allowed as evidence
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,

    /// Glob patterns for filenames that must never be submitted
    #[serde(default = "default_denylist")]
    pub denylist_patterns: Vec<String>,
}

fn default_allowed_content_types() -> Vec<String> {
    [
        "application/pdf",
        "image/png",
        "image/jpeg",
        "text/plain",
        "text/csv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_denylist() -> Vec<String> {
    ["*.exe", "*.bat", "*.js", "*.html", "*.zip"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for QuarantinePolicy {
    fn default() -> Self {
        Self {
            allowed_content_types: default_allowed_content_types(),
            denylist_patterns: default_denylist(),
        }
    }
}

impl QuarantinePolicy {
    fn is_denylisted(&self, filename: &str) -> bool {
        self.denylist_patterns
            .iter()
            .filter_map(|p| Pattern::new(p).ok())
            .any(|p| p.matches(filename))
    }
}

/// Semantic rule table: document kinds that contradict a claim category.
///
/// A credit note says money already came back, so it contradicts every
/// category that claims money is still owed; a packing slip proves nothing
/// about fees.
fn conflicts(category: AnomalyType, kind: DocumentKind) -> bool {
    use AnomalyType::*;
    use DocumentKind::*;
    match category {
        MissingUnit | LostInbound | DamagedInventory => matches!(kind, CreditNote),
        FeeOvercharge => matches!(kind, CreditNote | PackingSlip),
        RefundNotReturned => matches!(kind, Pod),
    }
}

/// Inspects a case's attached evidence before submission
pub struct QuarantineCheck {
    policy: QuarantinePolicy,
    documents: Arc<dyn DocumentRepo>,
    blobs: Arc<dyn BlobStore>,
}

impl QuarantineCheck {
    pub fn new(
        policy: QuarantinePolicy,
        documents: Arc<dyn DocumentRepo>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            policy,
            documents,
            blobs,
        }
    }

    /// Inspect every document linked to the claim. Returns all flags found;
    /// an empty vec means the evidence is safe to submit.
    #[instrument(skip_all, fields(claim_id = %claim.id, links = links.len()))]
    pub fn inspect(
        &self,
        claim: &Claim,
        links: &[MatchLink],
    ) -> Result<Vec<QuarantineFlag>, FilingError> {
        let mut flags = Vec::new();

        for link in links {
            match self.documents.get(link.document_id)? {
                Some(doc) => self.inspect_document(claim, &doc, &mut flags),
                None => flags.push(QuarantineFlag::MissingDocument {
                    document_id: link.document_id,
                }),
            }
        }

        Ok(flags)
    }

    fn inspect_document(
        &self,
        claim: &Claim,
        doc: &EvidenceDocument,
        flags: &mut Vec<QuarantineFlag>,
    ) {
        if !self
            .policy
            .allowed_content_types
            .iter()
            .any(|t| t == &doc.content_type)
        {
            flags.push(QuarantineFlag::DisallowedContentType {
                document_id: doc.id,
                content_type: doc.content_type.clone(),
            });
        }

        if self.policy.is_denylisted(&doc.filename) {
            flags.push(QuarantineFlag::DenylistedFilename {
                document_id: doc.id,
                filename: doc.filename.clone(),
            });
        }

        // Recompute the hash from the stored bytes; a vanished blob is as
        // untrustworthy as a mismatching one
        match self.blobs.read(doc.id) {
            Ok(bytes) => {
                let actual = hash_bytes(&bytes);
                if actual != doc.content_hash {
                    flags.push(QuarantineFlag::ChecksumMismatch {
                        document_id: doc.id,
                        recorded: doc.content_hash.clone(),
                        actual,
                    });
                }
            }
            Err(_) => flags.push(QuarantineFlag::MissingDocument {
                document_id: doc.id,
            }),
        }

        if conflicts(claim.anomaly_type, doc.kind) {
            flags.push(QuarantineFlag::SemanticConflict {
                document_id: doc.id,
                kind: doc.kind,
                category: claim.anomaly_type,
            });
        }
    }
}
