//! Evidence document types produced by the external ingestion and parsing
//! pipeline.
//!
//! Documents are read-only to this engine once their parser status is
//! `completed`; the filing pipeline only indexes them and verifies their
//! recorded hashes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parser lifecycle status for an ingested document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserStatus {
    /// Uploaded, not yet parsed
    Pending,

    /// Parsing in progress
    Processing,

    /// Parsed successfully, identifiers extracted
    Completed,

    /// Parsing failed
    Failed,
}

/// Semantic kind of an evidence document, as classified by the parser.
///
/// The quarantine rule table keys off this together with the claim category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Invoice,
    CreditNote,
    ShippingManifest,
    PackingSlip,
    /// Proof of delivery
    Pod,
    Other,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::CreditNote => "credit_note",
            Self::ShippingManifest => "shipping_manifest",
            Self::PackingSlip => "packing_slip",
            Self::Pod => "pod",
            Self::Other => "other",
        }
    }
}

/// Identifiers the parser extracted from a document.
///
/// List-valued: a single manifest or invoice routinely covers several
/// products and orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedIdentifiers {
    #[serde(default)]
    pub asins: Vec<String>,

    #[serde(default)]
    pub skus: Vec<String>,

    #[serde(default)]
    pub order_ids: Vec<String>,
}

impl ParsedIdentifiers {
    pub fn is_empty(&self) -> bool {
        self.asins.is_empty() && self.skus.is_empty() && self.order_ids.is_empty()
    }
}

/// A parsed evidence document available for claim matching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceDocument {
    /// Unique identifier for this document
    pub id: Uuid,

    /// Seller/tenant the document belongs to
    pub seller_id: String,

    /// Original filename as uploaded
    pub filename: String,

    /// MIME type as recorded at ingestion
    pub content_type: String,

    /// Semantic kind assigned by the parser
    pub kind: DocumentKind,

    /// SHA-256 of the raw bytes, recorded at ingestion
    pub content_hash: String,

    /// Parser lifecycle status
    pub parser_status: ParserStatus,

    /// Parser confidence in [0, 1]
    pub parser_confidence: f64,

    /// Identifiers extracted by the parser
    pub identifiers: ParsedIdentifiers,
}

impl EvidenceDocument {
    /// True when the document qualifies for the evidence index:
    /// parsing completed and at least one identifier extracted.
    pub fn is_indexable(&self) -> bool {
        self.parser_status == ParserStatus::Completed && !self.identifiers.is_empty()
    }
}
