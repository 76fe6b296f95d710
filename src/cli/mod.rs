//! Command-line interface for reclaim.
//!
//! Provides commands for running filing cycles, inspecting case status and
//! audit trails, verifying ledger chains, and acting on held cases.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Settings;
use crate::core::{
    ClaimMatcher, EvidenceIndex, FilingWorker, FilingWorkerDeps, OperatorActions, Queries,
    QuarantineCheck, RunMode,
};
use crate::domain::{Claim, EvidenceDocument};
use crate::ledger::AuditLedger;
use crate::store::{ClaimRepo, DocumentRepo, SqliteStore};
use crate::submit::HttpSubmissionClient;

/// reclaim - Evidence-backed marketplace reimbursement claim filing engine
#[derive(Parser, Debug)]
#[command(name = "reclaim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Match evidence and run a filing cycle for a tenant
    Scan {
        /// Seller to process
        #[arg(short, long)]
        seller: String,

        /// Evaluate everything, submit nothing, transition nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a case with the tail of its audit trail
    Status {
        /// Case ID (UUID)
        case_id: String,
    },

    /// Show the audit trail for a case or document
    Audit {
        /// Subject ID (UUID)
        subject_id: String,

        /// Page (zero-based)
        #[arg(short, long, default_value = "0")]
        page: usize,

        /// Entries per page
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Replay a subject's hash chain and report tampering
    Verify {
        /// Subject ID (UUID), or all subjects if omitted
        subject_id: Option<String>,
    },

    /// List evidence links for a claim
    Matches {
        /// Claim ID (UUID)
        claim_id: String,
    },

    /// Approve an above-threshold case for filing
    Approve {
        case_id: String,

        /// Operator login recorded in the ledger
        #[arg(short, long, env = "RECLAIM_OPERATOR")]
        operator: String,
    },

    /// Reject an above-threshold case
    Reject {
        case_id: String,

        #[arg(short, long, env = "RECLAIM_OPERATOR")]
        operator: String,

        /// Reason recorded in the ledger
        #[arg(short, long)]
        reason: String,
    },

    /// Release a quarantined case back to pending
    Override {
        case_id: String,

        #[arg(short, long, env = "RECLAIM_OPERATOR")]
        operator: String,

        #[arg(short, long)]
        reason: String,
    },

    /// Load claims and documents from JSON files for rehearsal
    Import {
        /// JSON array of claims
        #[arg(long)]
        claims: Option<PathBuf>,

        /// JSON array of evidence documents
        #[arg(long)]
        documents: Option<PathBuf>,

        /// Directory of raw evidence files, looked up by document filename
        #[arg(long)]
        evidence_dir: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = Settings::load()?;

        match self.command {
            Commands::Scan { seller, dry_run } => scan(&settings, &seller, dry_run).await,
            Commands::Status { case_id } => show_status(&settings, &case_id),
            Commands::Audit {
                subject_id,
                page,
                limit,
            } => show_audit(&settings, &subject_id, page, limit),
            Commands::Verify { subject_id } => verify(&settings, subject_id.as_deref()),
            Commands::Matches { claim_id } => show_matches(&settings, &claim_id),
            Commands::Approve { case_id, operator } => {
                operator_action(&settings, &case_id, |ops, id| ops.approve(id, &operator))
            }
            Commands::Reject {
                case_id,
                operator,
                reason,
            } => operator_action(&settings, &case_id, |ops, id| {
                ops.reject(id, &operator, &reason)
            }),
            Commands::Override {
                case_id,
                operator,
                reason,
            } => operator_action(&settings, &case_id, |ops, id| {
                ops.override_quarantine(id, &operator, &reason)
            }),
            Commands::Import {
                claims,
                documents,
                evidence_dir,
            } => import(&settings, claims, documents, evidence_dir),
            Commands::Config => show_config(&settings),
        }
    }
}

fn open_backends(settings: &Settings) -> Result<(Arc<SqliteStore>, Arc<AuditLedger>)> {
    std::fs::create_dir_all(&settings.home)
        .with_context(|| format!("Failed to create {}", settings.home.display()))?;
    let store = Arc::new(
        SqliteStore::open(settings.db_path())
            .with_context(|| format!("Failed to open {}", settings.db_path().display()))?,
    );
    let ledger = Arc::new(AuditLedger::open(settings.ledger_dir())?);
    Ok((store, ledger))
}

fn parse_id(label: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid {}: {}", label, raw))
}

/// Match evidence for a tenant, then run intake and filing
async fn scan(settings: &Settings, seller: &str, dry_run: bool) -> Result<()> {
    let (store, ledger) = open_backends(settings)?;

    let client = match &settings.submission {
        Some(s) => HttpSubmissionClient::new(s.endpoint.clone(), s.api_token.clone()),
        None if dry_run => {
            // Never contacted in a dry run
            HttpSubmissionClient::new("http://unconfigured.invalid".to_string(), String::new())
        }
        None => anyhow::bail!("No [submission] settings configured; add them or use --dry-run"),
    };

    let documents = DocumentRepo::list_completed(store.as_ref(), seller)?;
    let index = EvidenceIndex::build(&documents);
    let claims = ClaimRepo::list_by_seller(store.as_ref(), seller)?;

    let matcher = ClaimMatcher::new(store.clone(), store.clone(), ledger.clone());
    let match_report = matcher.match_batch(&claims, &index);
    eprintln!(
        "Matching: {} matched, {} unmatched, {} skipped, {} new links",
        match_report.matched,
        match_report.unmatched,
        match_report.skipped,
        match_report.links_created
    );

    let quarantine = QuarantineCheck::new(settings.quarantine.clone(), store.clone(), store.clone());
    let worker = Arc::new(FilingWorker::new(
        FilingWorkerDeps {
            claims: store.clone(),
            documents: store.clone(),
            links: store.clone(),
            cases: store.clone(),
            ledger,
            client: Arc::new(client),
        },
        quarantine,
        settings.worker.clone(),
    ));

    let mode = if dry_run { RunMode::DryRun } else { RunMode::Live };
    let report = worker.run_cycle(seller, mode).await?;

    println!("Cycle for seller {} ({:?}):", seller, mode);
    println!("  cases created:      {}", report.cases_created);
    println!("  duplicates blocked: {}", report.duplicates_blocked);
    println!("  already reimbursed: {}", report.already_reimbursed);
    println!("  filed:              {}", report.filed);
    println!("  retried:            {}", report.retried);
    println!("  failed:             {}", report.failed);
    println!("  quarantined:        {}", report.quarantined);
    println!("  held for approval:  {}", report.held_for_approval);
    println!("  dry runs:           {}", report.dry_runs);
    println!("  errors:             {}", report.errors);

    Ok(())
}

fn queries(settings: &Settings) -> Result<Queries> {
    let (store, ledger) = open_backends(settings)?;
    Ok(Queries::new(store.clone(), store, ledger))
}

fn show_status(settings: &Settings, case_id: &str) -> Result<()> {
    let view = queries(settings)?.case_status(parse_id("case ID", case_id)?)?;
    let case = &view.case;

    println!("Case:     {} ({})", case.case_number, case.id);
    println!("Claim:    {}", case.claim_id);
    println!("Seller:   {}", case.seller_id);
    println!("Status:   {}", case.filing_status);
    println!("Amount:   {} {}", case.claim_amount, case.currency);
    println!("Retries:  {}", case.retry_count);
    if let Some(err) = &case.last_error {
        println!("Error:    {}", err);
    }
    if let Some(at) = case.next_attempt_at {
        println!("Next try: {}", at);
    }
    if let Some(sid) = &case.submission_id {
        println!("Submission: {}", sid);
    }
    if let Some(eid) = &case.external_case_id {
        println!("External:   {}", eid);
    }

    println!("\nRecent audit entries:");
    for entry in &view.recent_entries {
        println!(
            "  {} {:<20} {:?}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.event.type_name(),
            entry.actor
        );
    }

    Ok(())
}

fn show_audit(settings: &Settings, subject_id: &str, page: usize, limit: usize) -> Result<()> {
    let subject = parse_id("subject ID", subject_id)?;
    let entries = queries(settings)?.audit_trail(subject, page, limit)?;

    if entries.is_empty() {
        println!("No entries for subject {} on page {}", subject, page);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{} {:<20} actor={:?}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.event.type_name(),
            entry.actor
        );
        if let Some(details) = &entry.details {
            println!("    {}", details);
        }
    }

    Ok(())
}

fn verify(settings: &Settings, subject_id: Option<&str>) -> Result<()> {
    let (_, ledger) = open_backends(settings)?;

    let subjects = match subject_id {
        Some(raw) => vec![parse_id("subject ID", raw)?],
        None => ledger.subjects()?,
    };

    let mut broken = 0usize;
    for subject in &subjects {
        let check = ledger.verify(*subject)?;
        match check.broken_at {
            None => println!("{}: intact ({} entries)", subject, check.entries),
            Some(idx) => {
                broken += 1;
                println!("{}: BROKEN at entry {} of {}", subject, idx, check.entries);
            }
        }
    }

    if broken > 0 {
        anyhow::bail!("{} of {} chains failed verification", broken, subjects.len());
    }
    Ok(())
}

fn show_matches(settings: &Settings, claim_id: &str) -> Result<()> {
    let links = queries(settings)?.matches_for_claim(parse_id("claim ID", claim_id)?)?;

    if links.is_empty() {
        println!("No evidence links for claim {}", claim_id);
        return Ok(());
    }

    println!("{:<38} {:<10} {:<10}", "DOCUMENT", "TIER", "CONFIDENCE");
    for link in &links {
        println!(
            "{:<38} {:<10} {:<10.3}",
            link.document_id, link.link_type, link.confidence
        );
    }

    Ok(())
}

fn operator_action<F>(settings: &Settings, case_id: &str, action: F) -> Result<()>
where
    F: FnOnce(&OperatorActions, Uuid) -> Result<crate::domain::DisputeCase, crate::error::FilingError>,
{
    let (store, ledger) = open_backends(settings)?;
    let ops = OperatorActions::new(store, ledger);

    let case = action(&ops, parse_id("case ID", case_id)?)?;
    println!("{} is now {}", case.case_number, case.filing_status);
    Ok(())
}

fn import(
    settings: &Settings,
    claims: Option<PathBuf>,
    documents: Option<PathBuf>,
    evidence_dir: Option<PathBuf>,
) -> Result<()> {
    let (store, _) = open_backends(settings)?;

    if let Some(path) = claims {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let claims: Vec<Claim> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        for claim in &claims {
            ClaimRepo::insert(store.as_ref(), claim)?;
        }
        println!("Imported {} claims", claims.len());
    }

    if let Some(path) = documents {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let docs: Vec<EvidenceDocument> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        for doc in &docs {
            DocumentRepo::insert(store.as_ref(), doc)?;
            if let Some(dir) = &evidence_dir {
                let blob_path = dir.join(&doc.filename);
                if blob_path.exists() {
                    let bytes = std::fs::read(&blob_path)
                        .with_context(|| format!("Failed to read {}", blob_path.display()))?;
                    store.put_blob(doc.id, &bytes)?;
                }
            }
        }
        println!("Imported {} documents", docs.len());
    }

    Ok(())
}

fn show_config(settings: &Settings) -> Result<()> {
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", settings.home.display());
    println!("  Ledger:   {}", settings.ledger_dir().display());
    println!("  Database: {}", settings.db_path().display());
    println!();
    println!("Worker:");
    println!("  Batch size:          {}", settings.worker.batch_size);
    println!("  Approval threshold:  {}", settings.worker.approval_threshold);
    println!("  Submission timeout:  {}s", settings.worker.submission_timeout_seconds);
    println!("  Parallel signatures: {}", settings.worker.max_parallel_signatures);
    println!(
        "  Backoff:             base {}ms x{} cap {}ms, {} retries",
        settings.worker.backoff.base_delay_ms,
        settings.worker.backoff.multiplier,
        settings.worker.backoff.max_delay_ms,
        settings.worker.backoff.max_retries
    );
    println!();
    println!(
        "Submission endpoint: {}",
        settings
            .submission
            .as_ref()
            .map(|s| s.endpoint.clone())
            .unwrap_or_else(|| "(not configured)".to_string())
    );

    Ok(())
}
