//! Domain types for the reclaim filing engine.
//!
//! This module contains the core data structures:
//! - Claims: anomaly detections from the upstream pipeline
//! - Evidence documents: parsed documents from the ingestion pipeline
//! - Match links: ranked claim-to-evidence joins
//! - Dispute cases: filing attempts with their lifecycle status

pub mod case;
pub mod claim;
pub mod document;
pub mod matching;

// Re-export commonly used types
pub use case::{DedupeSignature, DisputeCase, FilingStatus, SignatureKey};
pub use claim::{AnomalyType, Claim, ClaimIdentifiers, ClaimStatus};
pub use document::{DocumentKind, EvidenceDocument, ParsedIdentifiers, ParserStatus};
pub use matching::{LinkType, MatchLink};
