//! In-memory store for tests and rehearsal runs.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Claim, DisputeCase, EvidenceDocument, FilingStatus, LinkType, MatchLink};

use super::{is_due, BlobStore, CaseRepo, ClaimRepo, DocumentRepo, MatchLinkRepo, StoreError};

/// All repositories backed by locked hash maps
#[derive(Default)]
pub struct MemoryStore {
    claims: RwLock<HashMap<Uuid, Claim>>,
    documents: RwLock<HashMap<Uuid, EvidenceDocument>>,
    links: RwLock<HashMap<(Uuid, Uuid, LinkType), MatchLink>>,
    cases: RwLock<HashMap<Uuid, DisputeCase>>,
    blobs: RwLock<HashMap<Uuid, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes for a document (checksum verification reads them back)
    pub fn put_blob(&self, document_id: Uuid, bytes: Vec<u8>) {
        self.blobs.write().unwrap().insert(document_id, bytes);
    }
}

impl ClaimRepo for MemoryStore {
    fn insert(&self, claim: &Claim) -> Result<(), StoreError> {
        self.claims.write().unwrap().insert(claim.id, claim.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<Claim>, StoreError> {
        Ok(self.claims.read().unwrap().get(&id).cloned())
    }

    fn list_by_seller(&self, seller_id: &str) -> Result<Vec<Claim>, StoreError> {
        let mut claims: Vec<Claim> = self
            .claims
            .read()
            .unwrap()
            .values()
            .filter(|c| c.seller_id == seller_id)
            .cloned()
            .collect();
        claims.sort_by_key(|c| c.id);
        Ok(claims)
    }
}

impl DocumentRepo for MemoryStore {
    fn insert(&self, doc: &EvidenceDocument) -> Result<(), StoreError> {
        self.documents.write().unwrap().insert(doc.id, doc.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<EvidenceDocument>, StoreError> {
        Ok(self.documents.read().unwrap().get(&id).cloned())
    }

    fn list_completed(&self, seller_id: &str) -> Result<Vec<EvidenceDocument>, StoreError> {
        let mut docs: Vec<EvidenceDocument> = self
            .documents
            .read()
            .unwrap()
            .values()
            .filter(|d| {
                d.seller_id == seller_id
                    && d.parser_status == crate::domain::ParserStatus::Completed
            })
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.id);
        Ok(docs)
    }
}

impl MatchLinkRepo for MemoryStore {
    fn upsert(&self, link: &MatchLink) -> Result<bool, StoreError> {
        let key = (link.claim_id, link.document_id, link.link_type);
        let mut links = self.links.write().unwrap();
        if links.contains_key(&key) {
            return Ok(false);
        }
        links.insert(key, link.clone());
        Ok(true)
    }

    fn for_claim(&self, claim_id: Uuid) -> Result<Vec<MatchLink>, StoreError> {
        let mut links: Vec<MatchLink> = self
            .links
            .read()
            .unwrap()
            .values()
            .filter(|l| l.claim_id == claim_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.document_id);
        Ok(links)
    }
}

impl CaseRepo for MemoryStore {
    fn insert(&self, case: &DisputeCase) -> Result<(), StoreError> {
        let mut cases = self.cases.write().unwrap();
        if cases.contains_key(&case.id) {
            return Err(StoreError::Conflict(format!(
                "case {} already exists",
                case.id
            )));
        }
        cases.insert(case.id, case.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<DisputeCase>, StoreError> {
        Ok(self.cases.read().unwrap().get(&id).cloned())
    }

    fn by_claim(&self, claim_id: Uuid) -> Result<Option<DisputeCase>, StoreError> {
        Ok(self
            .cases
            .read()
            .unwrap()
            .values()
            .find(|c| c.claim_id == claim_id)
            .cloned())
    }

    fn by_signature(&self, signature: &str) -> Result<Vec<DisputeCase>, StoreError> {
        let mut cases: Vec<DisputeCase> = self
            .cases
            .read()
            .unwrap()
            .values()
            .filter(|c| c.signature == signature)
            .cloned()
            .collect();
        cases.sort_by_key(|c| c.created_at);
        Ok(cases)
    }

    fn due_for_filing(
        &self,
        seller_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<DisputeCase>, StoreError> {
        let mut cases: Vec<DisputeCase> = self
            .cases
            .read()
            .unwrap()
            .values()
            .filter(|c| c.seller_id == seller_id && is_due(c, now))
            .cloned()
            .collect();
        cases.sort_by_key(|c| c.created_at);
        Ok(cases)
    }

    fn update_if_status(
        &self,
        case: &DisputeCase,
        expected: FilingStatus,
    ) -> Result<bool, StoreError> {
        let mut cases = self.cases.write().unwrap();
        let stored = cases.get_mut(&case.id).ok_or(StoreError::NotFound {
            kind: "case",
            id: case.id,
        })?;
        if stored.filing_status != expected {
            return Ok(false);
        }
        *stored = case.clone();
        Ok(true)
    }
}

impl BlobStore for MemoryStore {
    fn read(&self, document_id: Uuid) -> Result<Vec<u8>, StoreError> {
        self.blobs
            .read()
            .unwrap()
            .get(&document_id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "blob",
                id: document_id,
            })
    }
}
