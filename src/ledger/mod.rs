//! Append-only, hash-chained audit ledger.
//!
//! Entries are stored as newline-delimited JSON, one file per subject, so a
//! subject's chain can be replayed independently. Appends take an exclusive
//! file lock; the chain head is re-read under the lock so concurrent writers
//! cannot fork a subject's history.
//!
//! Retention pruning is deliberately not implemented: every chain verifies
//! back to genesis. A pruning job would need periodic checkpoint entries
//! before anything may be dropped.

pub mod entry;

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use thiserror::Error;
use uuid::Uuid;

pub use entry::{
    chain_hash, hash_bytes, hash_state, seal_entry, Actor, AuditEvent, AuditLogEntry,
    GENESIS_HASH,
};

/// Ledger failures
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt ledger entry at line {line}: {message}")]
    Corrupt { line: usize, message: String },
}

/// Outcome of replaying and re-hashing a subject's chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainVerification {
    /// Entries replayed
    pub entries: usize,

    /// Index of the first entry whose hashes do not verify, if any
    pub broken_at: Option<usize>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// File-backed audit ledger, one JSONL file per subject
pub struct AuditLedger {
    dir: PathBuf,
}

impl AuditLedger {
    /// Create or open a ledger rooted at the given directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn subject_path(&self, subject_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.jsonl", subject_id))
    }

    /// Append an entry for a subject, chaining it onto the current head.
    ///
    /// `state_hash` is the content hash of the subject's state immediately
    /// after the event (see [`hash_state`]).
    pub fn append(
        &self,
        subject_id: Uuid,
        event: AuditEvent,
        actor: Actor,
        state_hash: String,
        details: Option<String>,
    ) -> Result<AuditLogEntry, LedgerError> {
        let path = self.subject_path(subject_id);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        // Exclusive lock for the read-head-then-append sequence
        file.lock_exclusive()?;
        let result = self.append_locked(&path, &mut file, subject_id, event, actor, state_hash, details);
        let _ = fs2::FileExt::unlock(&file);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn append_locked(
        &self,
        path: &Path,
        file: &mut File,
        subject_id: Uuid,
        event: AuditEvent,
        actor: Actor,
        state_hash: String,
        details: Option<String>,
    ) -> Result<AuditLogEntry, LedgerError> {
        let prev_hash = match read_entries(path)?.last() {
            Some(last) => last.new_hash.clone(),
            None => GENESIS_HASH.to_string(),
        };

        let entry = seal_entry(subject_id, event, actor, state_hash, details, prev_hash)?;

        let json = serde_json::to_string(&entry)?;
        file.write_all(format!("{}\n", json).as_bytes())?;
        file.flush()?;

        Ok(entry)
    }

    /// Replay all entries for a subject, in append order
    pub fn entries(&self, subject_id: Uuid) -> Result<Vec<AuditLogEntry>, LedgerError> {
        read_entries(&self.subject_path(subject_id))
    }

    /// Paged audit trail for a subject (page is zero-based)
    pub fn trail(
        &self,
        subject_id: Uuid,
        page: usize,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        let entries = self.entries(subject_id)?;
        Ok(entries
            .into_iter()
            .skip(page.saturating_mul(limit))
            .take(limit)
            .collect())
    }

    /// All subjects with at least one entry
    pub fn subjects(&self) -> Result<Vec<Uuid>, LedgerError> {
        let mut subjects = Vec::new();
        for dirent in std::fs::read_dir(&self.dir)? {
            let name = dirent?.file_name();
            if let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".jsonl")) {
                if let Ok(id) = Uuid::parse_str(stem) {
                    subjects.push(id);
                }
            }
        }
        subjects.sort();
        Ok(subjects)
    }

    /// Scan every subject for entries matching a predicate
    pub fn find<F>(&self, predicate: F) -> Result<Vec<AuditLogEntry>, LedgerError>
    where
        F: Fn(&AuditLogEntry) -> bool,
    {
        let mut found = Vec::new();
        for subject in self.subjects()? {
            found.extend(self.entries(subject)?.into_iter().filter(&predicate));
        }
        found.sort_by_key(|e| e.timestamp);
        Ok(found)
    }

    /// Entries whose event type matches the given name
    pub fn by_event_type(&self, type_name: &str) -> Result<Vec<AuditLogEntry>, LedgerError> {
        self.find(|e| e.event.type_name() == type_name)
    }

    /// Entries recorded by the given actor
    pub fn by_actor(&self, actor: &Actor) -> Result<Vec<AuditLogEntry>, LedgerError> {
        self.find(|e| &e.actor == actor)
    }

    /// Entries within [from, to)
    pub fn in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditLogEntry>, LedgerError> {
        self.find(|e| e.timestamp >= from && e.timestamp < to)
    }

    /// Replay a subject's chain and recompute every hash.
    ///
    /// An edited, reordered or removed entry shows up as the first index
    /// where either the recomputed hash or the prev-hash linkage diverges.
    pub fn verify(&self, subject_id: Uuid) -> Result<ChainVerification, LedgerError> {
        let entries = self.entries(subject_id)?;
        let mut expected_prev = GENESIS_HASH.to_string();

        for (idx, entry) in entries.iter().enumerate() {
            if entry.prev_hash != expected_prev
                || entry.recompute_hash()? != entry.new_hash
            {
                return Ok(ChainVerification {
                    entries: entries.len(),
                    broken_at: Some(idx),
                });
            }
            expected_prev = entry.new_hash.clone();
        }

        Ok(ChainVerification {
            entries: entries.len(),
            broken_at: None,
        })
    }
}

fn read_entries(path: &Path) -> Result<Vec<AuditLogEntry>, LedgerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: AuditLogEntry =
            serde_json::from_str(&line).map_err(|e| LedgerError::Corrupt {
                line: idx + 1,
                message: e.to_string(),
            })?;
        entries.push(entry);
    }

    Ok(entries)
}
