//! SQLite-backed store.
//!
//! The schema enforces what the code assumes: match links are unique per
//! (claim, document, link_type), and `filing_status` is constrained to the
//! nine enumerated values. Status transitions are conditional UPDATEs so a
//! stale writer changes zero rows instead of clobbering newer state.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    Claim, DisputeCase, EvidenceDocument, FilingStatus, LinkType, MatchLink, ParserStatus,
};

use super::{BlobStore, CaseRepo, ClaimRepo, DocumentRepo, MatchLinkRepo, StoreError};

/// All repositories backed by a single SQLite connection
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (and migrate) a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::from_connection(conn)
    }

    /// In-memory database, for tests and rehearsal
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn).map_err(backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection mutex poisoned")
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS claims (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL,
            body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_claims_seller ON claims(seller_id);

        CREATE TABLE IF NOT EXISTS evidence_documents (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL,
            parser_status TEXT NOT NULL,
            body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_seller
            ON evidence_documents(seller_id, parser_status);

        CREATE TABLE IF NOT EXISTS match_links (
            claim_id TEXT NOT NULL,
            document_id TEXT NOT NULL,
            link_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (claim_id, document_id, link_type)
        );
        CREATE INDEX IF NOT EXISTS idx_links_claim ON match_links(claim_id);

        CREATE TABLE IF NOT EXISTS dispute_cases (
            id TEXT PRIMARY KEY,
            claim_id TEXT NOT NULL,
            seller_id TEXT NOT NULL,
            signature TEXT NOT NULL,
            filing_status TEXT NOT NULL CHECK (filing_status IN (
                'pending', 'filing', 'filed', 'retrying', 'failed',
                'quarantined_dangerous_doc', 'duplicate_blocked',
                'already_reimbursed', 'pending_approval'
            )),
            next_attempt_at TEXT,
            created_at TEXT NOT NULL,
            body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cases_signature ON dispute_cases(signature);
        CREATE INDEX IF NOT EXISTS idx_cases_seller_status
            ON dispute_cases(seller_id, filing_status);

        CREATE TABLE IF NOT EXISTS blobs (
            document_id TEXT PRIMARY KEY,
            bytes BLOB NOT NULL
        );",
    )
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(e.to_string()))
}

fn from_json<T: DeserializeOwned>(json: &str) -> Result<T, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Backend(e.to_string()))
}

/// Enum tag as stored in a TEXT column ("pending", "asin", ...)
fn tag<T: Serialize>(value: &T) -> Result<String, StoreError> {
    let quoted = to_json(value)?;
    Ok(quoted.trim_matches('"').to_string())
}

fn from_tag<T: DeserializeOwned>(s: &str) -> Result<T, StoreError> {
    from_json(&format!("\"{}\"", s))
}

impl ClaimRepo for SqliteStore {
    fn insert(&self, claim: &Claim) -> Result<(), StoreError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO claims (id, seller_id, body) VALUES (?1, ?2, ?3)",
                params![claim.id.to_string(), claim.seller_id, to_json(claim)?],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<Claim>, StoreError> {
        let body: Option<String> = self
            .lock()
            .query_row(
                "SELECT body FROM claims WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        body.map(|b| from_json(&b)).transpose()
    }

    fn list_by_seller(&self, seller_id: &str) -> Result<Vec<Claim>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT body FROM claims WHERE seller_id = ?1 ORDER BY id")
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![seller_id], |row| row.get::<_, String>(0))
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(backend)?
            .iter()
            .map(|b| from_json(b))
            .collect()
    }
}

impl DocumentRepo for SqliteStore {
    fn insert(&self, doc: &EvidenceDocument) -> Result<(), StoreError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO evidence_documents
                 (id, seller_id, parser_status, body) VALUES (?1, ?2, ?3, ?4)",
                params![
                    doc.id.to_string(),
                    doc.seller_id,
                    tag(&doc.parser_status)?,
                    to_json(doc)?
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<EvidenceDocument>, StoreError> {
        let body: Option<String> = self
            .lock()
            .query_row(
                "SELECT body FROM evidence_documents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        body.map(|b| from_json(&b)).transpose()
    }

    fn list_completed(&self, seller_id: &str) -> Result<Vec<EvidenceDocument>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT body FROM evidence_documents
                 WHERE seller_id = ?1 AND parser_status = ?2 ORDER BY id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![seller_id, tag(&ParserStatus::Completed)?], |row| {
                row.get::<_, String>(0)
            })
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(backend)?
            .iter()
            .map(|b| from_json(b))
            .collect()
    }
}

impl MatchLinkRepo for SqliteStore {
    fn upsert(&self, link: &MatchLink) -> Result<bool, StoreError> {
        let changed = self
            .lock()
            .execute(
                "INSERT OR IGNORE INTO match_links
                 (claim_id, document_id, link_type, confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    link.claim_id.to_string(),
                    link.document_id.to_string(),
                    tag(&link.link_type)?,
                    link.confidence,
                    link.created_at.to_rfc3339(),
                ],
            )
            .map_err(backend)?;
        Ok(changed > 0)
    }

    fn for_claim(&self, claim_id: Uuid) -> Result<Vec<MatchLink>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT claim_id, document_id, link_type, confidence, created_at
                 FROM match_links WHERE claim_id = ?1 ORDER BY document_id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![claim_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(backend)?;

        let mut links = Vec::new();
        for row in rows {
            let (claim, document, link_type, confidence, created_at) = row.map_err(backend)?;
            links.push(MatchLink {
                claim_id: parse_uuid(&claim)?,
                document_id: parse_uuid(&document)?,
                link_type: from_tag::<LinkType>(&link_type)?,
                confidence,
                created_at: parse_time(&created_at)?,
            });
        }
        Ok(links)
    }
}

impl CaseRepo for SqliteStore {
    fn insert(&self, case: &DisputeCase) -> Result<(), StoreError> {
        let inserted = self
            .lock()
            .execute(
                "INSERT OR IGNORE INTO dispute_cases
                 (id, claim_id, seller_id, signature, filing_status,
                  next_attempt_at, created_at, body)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    case.id.to_string(),
                    case.claim_id.to_string(),
                    case.seller_id,
                    case.signature,
                    case.filing_status.as_str(),
                    case.next_attempt_at.map(|t| t.to_rfc3339()),
                    case.created_at.to_rfc3339(),
                    to_json(case)?,
                ],
            )
            .map_err(backend)?;
        if inserted == 0 {
            return Err(StoreError::Conflict(format!(
                "case {} already exists",
                case.id
            )));
        }
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<DisputeCase>, StoreError> {
        let body: Option<String> = self
            .lock()
            .query_row(
                "SELECT body FROM dispute_cases WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        body.map(|b| from_json(&b)).transpose()
    }

    fn by_claim(&self, claim_id: Uuid) -> Result<Option<DisputeCase>, StoreError> {
        let body: Option<String> = self
            .lock()
            .query_row(
                "SELECT body FROM dispute_cases WHERE claim_id = ?1 LIMIT 1",
                params![claim_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        body.map(|b| from_json(&b)).transpose()
    }

    fn by_signature(&self, signature: &str) -> Result<Vec<DisputeCase>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT body FROM dispute_cases WHERE signature = ?1 ORDER BY created_at",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![signature], |row| row.get::<_, String>(0))
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(backend)?
            .iter()
            .map(|b| from_json(b))
            .collect()
    }

    fn due_for_filing(
        &self,
        seller_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<DisputeCase>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT body FROM dispute_cases
                 WHERE seller_id = ?1
                   AND (filing_status IN ('pending', 'filing')
                        OR (filing_status = 'retrying'
                            AND (next_attempt_at IS NULL OR next_attempt_at <= ?2)))
                 ORDER BY created_at",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![seller_id, now.to_rfc3339()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(backend)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(backend)?
            .iter()
            .map(|b| from_json(b))
            .collect()
    }

    fn update_if_status(
        &self,
        case: &DisputeCase,
        expected: FilingStatus,
    ) -> Result<bool, StoreError> {
        let changed = self
            .lock()
            .execute(
                "UPDATE dispute_cases
                 SET filing_status = ?2, next_attempt_at = ?3, body = ?4
                 WHERE id = ?1 AND filing_status = ?5",
                params![
                    case.id.to_string(),
                    case.filing_status.as_str(),
                    case.next_attempt_at.map(|t| t.to_rfc3339()),
                    to_json(case)?,
                    expected.as_str(),
                ],
            )
            .map_err(backend)?;
        Ok(changed > 0)
    }
}

impl BlobStore for SqliteStore {
    fn read(&self, document_id: Uuid) -> Result<Vec<u8>, StoreError> {
        let bytes: Option<Vec<u8>> = self
            .lock()
            .query_row(
                "SELECT bytes FROM blobs WHERE document_id = ?1",
                params![document_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?;
        bytes.ok_or(StoreError::NotFound {
            kind: "blob",
            id: document_id,
        })
    }
}

impl SqliteStore {
    /// Store raw bytes for a document
    pub fn put_blob(&self, document_id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        self.lock()
            .execute(
                "INSERT OR REPLACE INTO blobs (document_id, bytes) VALUES (?1, ?2)",
                params![document_id.to_string(), bytes],
            )
            .map_err(backend)?;
        Ok(())
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Backend(format!("bad uuid {}: {}", s, e)))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("bad timestamp {}: {}", s, e)))
}
