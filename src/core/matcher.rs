//! Tiered claim-to-evidence matching.
//!
//! Tiers are evaluated ASIN, then SKU, then order id; the first tier with
//! any hit wins and lower tiers are not evaluated. This keeps one claim
//! from fanning out into links of mixed provenance and keeps re-runs from
//! exploding combinatorially.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::domain::{Claim, LinkType, MatchLink};
use crate::error::FilingError;
use crate::ledger::{hash_state, Actor, AuditEvent, AuditLedger};
use crate::store::{DocumentRepo, MatchLinkRepo};

use super::index::EvidenceIndex;

/// Result of matching one claim
#[derive(Debug)]
pub struct MatchOutcome {
    /// Links created by this run (already-existing links are not repeated)
    pub created: Vec<MatchLink>,

    /// Tier that produced the hits, if any
    pub tier: Option<LinkType>,
}

impl MatchOutcome {
    /// No tier produced a hit; the claim goes to an external review queue
    pub fn is_unmatched(&self) -> bool {
        self.tier.is_none()
    }
}

/// Totals for a batch run
#[derive(Debug, Default)]
pub struct MatchReport {
    pub matched: usize,
    pub unmatched: usize,
    pub skipped: usize,
    pub links_created: usize,
}

/// Matches claims against the evidence index and persists the links
pub struct ClaimMatcher {
    documents: Arc<dyn DocumentRepo>,
    links: Arc<dyn MatchLinkRepo>,
    ledger: Arc<AuditLedger>,
}

impl ClaimMatcher {
    pub fn new(
        documents: Arc<dyn DocumentRepo>,
        links: Arc<dyn MatchLinkRepo>,
        ledger: Arc<AuditLedger>,
    ) -> Self {
        Self {
            documents,
            links,
            ledger,
        }
    }

    /// Match a single claim against the index.
    ///
    /// Persists zero or more links through upsert; never mutates the claim
    /// or any document. Idempotent: a re-run creates no second link and no
    /// second ledger entry for a pair already linked.
    #[instrument(skip(self, claim, index), fields(claim_id = %claim.id))]
    pub fn match_claim(
        &self,
        claim: &Claim,
        index: &EvidenceIndex,
    ) -> Result<MatchOutcome, FilingError> {
        claim.validate().map_err(FilingError::Validation)?;

        for tier in LinkType::TIERS {
            let key = match tier {
                LinkType::Asin => claim.identifiers.asin.as_deref(),
                LinkType::Sku => claim.identifiers.sku.as_deref(),
                LinkType::OrderId => claim.identifiers.order_id.as_deref(),
            };
            let Some(key) = key else { continue };

            let hits = index.lookup(tier, key);
            if hits.is_empty() {
                continue;
            }

            let mut created = Vec::new();
            for &document_id in hits {
                let Some(doc) = self.documents.get(document_id)? else {
                    warn!(%document_id, "indexed document vanished from the store");
                    continue;
                };

                let link = MatchLink::new(claim.id, document_id, tier, doc.parser_confidence);
                if self.links.upsert(&link)? {
                    self.ledger.append(
                        document_id,
                        AuditEvent::MatchLinked {
                            claim_id: claim.id,
                            document_id,
                            link_type: tier,
                            confidence: link.confidence,
                        },
                        Actor::System,
                        hash_state(&link)?,
                        None,
                    )?;
                    created.push(link);
                }
            }

            debug!(tier = %tier, hits = hits.len(), created = created.len(), "tier matched");
            return Ok(MatchOutcome {
                created,
                tier: Some(tier),
            });
        }

        Ok(MatchOutcome {
            created: Vec::new(),
            tier: None,
        })
    }

    /// Match a batch of claims. Per-record failures are logged and counted,
    /// never fatal to the batch.
    #[instrument(skip_all, fields(claims = claims.len()))]
    pub fn match_batch(&self, claims: &[Claim], index: &EvidenceIndex) -> MatchReport {
        let mut report = MatchReport::default();

        for claim in claims {
            match self.match_claim(claim, index) {
                Ok(outcome) if outcome.is_unmatched() => report.unmatched += 1,
                Ok(outcome) => {
                    report.matched += 1;
                    report.links_created += outcome.created.len();
                }
                Err(e) => {
                    warn!(claim_id = %claim.id, error = %e, "skipping claim");
                    report.skipped += 1;
                }
            }
        }

        report
    }
}
