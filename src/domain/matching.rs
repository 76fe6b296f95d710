//! Claim-to-evidence match links.
//!
//! Links are append-only and created solely by the matcher; re-running the
//! matcher never duplicates a (claim, document, link_type) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier tier a match was made on.
///
/// Tiers are evaluated in declaration order; the first tier with any hit
/// wins and lower tiers are not also evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Asin,
    Sku,
    OrderId,
}

impl LinkType {
    /// All tiers, highest confidence first
    pub const TIERS: [LinkType; 3] = [LinkType::Asin, LinkType::Sku, LinkType::OrderId];

    /// Base confidence assigned to this tier
    pub fn base_confidence(&self) -> f64 {
        match self {
            Self::Asin => 0.95,
            Self::Sku => 0.85,
            Self::OrderId => 0.70,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asin => "asin",
            Self::Sku => "sku",
            Self::OrderId => "order_id",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked link between a claim and an evidence document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchLink {
    /// Claim side of the link
    pub claim_id: Uuid,

    /// Document side of the link
    pub document_id: Uuid,

    /// Tier the link was made on
    pub link_type: LinkType,

    /// Tier base confidence multiplied by the document's parser confidence
    pub confidence: f64,

    /// When the link was created
    pub created_at: DateTime<Utc>,
}

impl MatchLink {
    /// Create a link with confidence derived from the tier and the matched
    /// document's parser confidence.
    pub fn new(
        claim_id: Uuid,
        document_id: Uuid,
        link_type: LinkType,
        parser_confidence: f64,
    ) -> Self {
        Self {
            claim_id,
            document_id,
            link_type,
            confidence: link_type.base_confidence() * parser_confidence,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_order() {
        assert_eq!(
            LinkType::TIERS,
            [LinkType::Asin, LinkType::Sku, LinkType::OrderId]
        );
    }

    #[test]
    fn test_confidence_combines_multiplicatively() {
        let link = MatchLink::new(Uuid::new_v4(), Uuid::new_v4(), LinkType::Sku, 0.8);
        assert!((link.confidence - 0.68).abs() < 1e-9);
    }

    #[test]
    fn test_full_parser_confidence_keeps_tier_base() {
        let link = MatchLink::new(Uuid::new_v4(), Uuid::new_v4(), LinkType::Asin, 1.0);
        assert!((link.confidence - 0.95).abs() < 1e-9);
    }
}
