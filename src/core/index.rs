//! Evidence index: inverted identifier-to-document lookup tables.
//!
//! A pure function of the completed document set. Rebuilding at any time is
//! side-effect free and yields the same index for the same input.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::domain::{EvidenceDocument, LinkType};

/// Inverted maps from business identifiers to the documents mentioning them.
///
/// List-valued: one identifier may appear in several documents.
#[derive(Debug, Default)]
pub struct EvidenceIndex {
    by_asin: HashMap<String, Vec<Uuid>>,
    by_sku: HashMap<String, Vec<Uuid>>,
    by_order: HashMap<String, Vec<Uuid>>,
}

impl EvidenceIndex {
    /// Build the index from parsed documents.
    ///
    /// Only documents with parser status completed and at least one
    /// identifier contribute; anything else is skipped with a log line.
    pub fn build(documents: &[EvidenceDocument]) -> Self {
        let mut index = Self::default();

        for doc in documents {
            if !doc.is_indexable() {
                debug!(document_id = %doc.id, status = ?doc.parser_status,
                       "skipping non-indexable document");
                continue;
            }

            for asin in &doc.identifiers.asins {
                index.by_asin.entry(asin.clone()).or_default().push(doc.id);
            }
            for sku in &doc.identifiers.skus {
                index.by_sku.entry(sku.clone()).or_default().push(doc.id);
            }
            for order_id in &doc.identifiers.order_ids {
                index
                    .by_order
                    .entry(order_id.clone())
                    .or_default()
                    .push(doc.id);
            }
        }

        index
    }

    /// Documents carrying the given identifier on the given tier
    pub fn lookup(&self, tier: LinkType, key: &str) -> &[Uuid] {
        let map = match tier {
            LinkType::Asin => &self.by_asin,
            LinkType::Sku => &self.by_sku,
            LinkType::OrderId => &self.by_order,
        };
        map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct indexed identifiers across all tiers
    pub fn len(&self) -> usize {
        self.by_asin.len() + self.by_sku.len() + self.by_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DocumentKind, ParsedIdentifiers, ParserStatus};

    fn doc(status: ParserStatus, asins: &[&str], orders: &[&str]) -> EvidenceDocument {
        EvidenceDocument {
            id: Uuid::new_v4(),
            seller_id: "S1".to_string(),
            filename: "doc.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            kind: DocumentKind::Invoice,
            content_hash: "00".repeat(32),
            parser_status: status,
            parser_confidence: 0.9,
            identifiers: ParsedIdentifiers {
                asins: asins.iter().map(|s| s.to_string()).collect(),
                skus: vec![],
                order_ids: orders.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    #[test]
    fn test_identifier_shared_across_documents() {
        let a = doc(ParserStatus::Completed, &["B001"], &[]);
        let b = doc(ParserStatus::Completed, &["B001"], &["O1"]);
        let index = EvidenceIndex::build(&[a.clone(), b.clone()]);

        assert_eq!(index.lookup(LinkType::Asin, "B001"), &[a.id, b.id]);
        assert_eq!(index.lookup(LinkType::OrderId, "O1"), &[b.id]);
    }

    #[test]
    fn test_incomplete_documents_excluded() {
        let pending = doc(ParserStatus::Pending, &["B001"], &[]);
        let failed = doc(ParserStatus::Failed, &["B001"], &[]);
        let index = EvidenceIndex::build(&[pending, failed]);

        assert!(index.is_empty());
        assert!(index.lookup(LinkType::Asin, "B001").is_empty());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let docs = vec![
            doc(ParserStatus::Completed, &["B001", "B002"], &["O1"]),
            doc(ParserStatus::Completed, &["B002"], &[]),
        ];
        let first = EvidenceIndex::build(&docs);
        let second = EvidenceIndex::build(&docs);

        assert_eq!(first.len(), second.len());
        assert_eq!(
            first.lookup(LinkType::Asin, "B002"),
            second.lookup(LinkType::Asin, "B002")
        );
    }
}
