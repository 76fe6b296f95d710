//! Claim types produced by the external anomaly-detection pipeline.
//!
//! Claims are read-only to this engine: they are created upstream and the
//! filing pipeline only attaches matches and cases to them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Business identifiers attached to a claim.
///
/// Extracted once at the ingestion boundary and passed by value thereafter;
/// downstream code never re-parses raw identifier blobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimIdentifiers {
    /// Marketplace product identifier
    pub asin: Option<String>,

    /// Seller product identifier
    pub sku: Option<String>,

    /// Marketplace order identifier
    pub order_id: Option<String>,
}

impl ClaimIdentifiers {
    /// True when no identifier is present at all
    pub fn is_empty(&self) -> bool {
        self.asin.is_none() && self.sku.is_none() && self.order_id.is_none()
    }

    /// The product-level identifier (ASIN preferred over SKU), if any
    pub fn product_key(&self) -> Option<&str> {
        self.asin.as_deref().or(self.sku.as_deref())
    }
}

/// Category of fulfillment anomaly detected upstream.
///
/// Drives the dedupe signature and the quarantine rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    /// A unit went missing inside the fulfillment network
    MissingUnit,

    /// Inventory damaged in the warehouse
    DamagedInventory,

    /// Fulfillment fee charged above the published schedule
    FeeOvercharge,

    /// Inbound shipment partially lost in transit
    LostInbound,

    /// Customer refunded but the unit never came back
    RefundNotReturned,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingUnit => "missing_unit",
            Self::DamagedInventory => "damaged_inventory",
            Self::FeeOvercharge => "fee_overcharge",
            Self::LostInbound => "lost_inbound",
            Self::RefundNotReturned => "refund_not_returned",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a claim as tracked by the upstream detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Freshly detected, not yet matched
    Detected,

    /// Routed to a human review queue
    ManualReview,

    /// Closed upstream (resolved or withdrawn)
    Closed,
}

/// An anomaly detection eligible for reimbursement filing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Unique identifier for this claim
    pub id: Uuid,

    /// Seller/tenant the claim belongs to
    pub seller_id: String,

    /// Detected anomaly category
    pub anomaly_type: AnomalyType,

    /// Estimated reimbursement value
    pub estimated_value: f64,

    /// ISO 4217 currency code
    pub currency: String,

    /// Business identifiers used to join against evidence
    pub identifiers: ClaimIdentifiers,

    /// Detector confidence in [0, 1]
    pub detector_confidence: f64,

    /// Upstream lifecycle status
    pub status: ClaimStatus,
}

impl Claim {
    /// Check the claim is well-formed enough to enter the pipeline.
    ///
    /// Malformed claims are skipped with a log entry, never fatal to a batch.
    pub fn validate(&self) -> Result<(), String> {
        if self.seller_id.trim().is_empty() {
            return Err("claim has an empty seller_id".to_string());
        }
        if !self.estimated_value.is_finite() || self.estimated_value <= 0.0 {
            return Err(format!(
                "claim has a non-positive estimated value: {}",
                self.estimated_value
            ));
        }
        if self.identifiers.is_empty() {
            return Err("claim carries no identifiers".to_string());
        }
        if !(0.0..=1.0).contains(&self.detector_confidence) {
            return Err(format!(
                "detector confidence out of range: {}",
                self.detector_confidence
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim() -> Claim {
        Claim {
            id: Uuid::new_v4(),
            seller_id: "S1".to_string(),
            anomaly_type: AnomalyType::MissingUnit,
            estimated_value: 50.0,
            currency: "USD".to_string(),
            identifiers: ClaimIdentifiers {
                asin: Some("B001".to_string()),
                sku: None,
                order_id: None,
            },
            detector_confidence: 0.9,
            status: ClaimStatus::Detected,
        }
    }

    #[test]
    fn test_valid_claim() {
        assert!(claim().validate().is_ok());
    }

    #[test]
    fn test_empty_identifiers_rejected() {
        let mut c = claim();
        c.identifiers = ClaimIdentifiers::default();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_non_positive_value_rejected() {
        let mut c = claim();
        c.estimated_value = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_product_key_prefers_asin() {
        let ids = ClaimIdentifiers {
            asin: Some("B001".to_string()),
            sku: Some("SKU-1".to_string()),
            order_id: None,
        };
        assert_eq!(ids.product_key(), Some("B001"));
    }
}
