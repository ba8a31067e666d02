// 🗃️ Run Log - every merge and diff run, with the files it read (SQLite, WAL)
//
// Each input file is stored by SHA-256, so a published listing or diff can
// be traced back to the exact uploads it was computed from, and an upload
// can be traced forward to every run that used it.

use crate::records::DatasetKind;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// RUNS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    Merge,
    Diff,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Merge => "merge_completed",
            RunKind::Diff => "diff_completed",
        }
    }
}

impl FromStr for RunKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" | "merge_completed" => Ok(RunKind::Merge),
            "diff" | "diff_completed" => Ok(RunKind::Diff),
            other => Err(format!("Unknown run kind '{}'. Expected merge or diff", other)),
        }
    }
}

/// One file a run read, identified by content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    /// "property_owners", "current", ...
    pub role: String,
    pub filename: String,
    pub sha256: String,
}

impl InputFile {
    pub fn from_bytes(role: &str, filename: &str, bytes: &[u8]) -> Self {
        InputFile {
            role: role.to_string(),
            filename: filename.to_string(),
            sha256: fingerprint_bytes(bytes),
        }
    }

    pub fn from_path(role: &str, path: &Path) -> Result<Self> {
        Ok(InputFile {
            role: role.to_string(),
            filename: path.display().to_string(),
            sha256: fingerprint_file(path)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub kind: RunKind,
    pub recorded_at: DateTime<Utc>,
    /// "cli" or "web"
    pub actor: String,
    /// Set for diff runs
    pub dataset: Option<DatasetKind>,
    /// Counts reported by the run
    pub summary: serde_json::Value,
    pub inputs: Vec<InputFile>,
}

impl RunRecord {
    pub fn new(kind: RunKind, actor: &str, summary: serde_json::Value) -> Self {
        RunRecord {
            run_id: uuid::Uuid::new_v4().to_string(),
            kind,
            recorded_at: Utc::now(),
            actor: actor.to_string(),
            dataset: None,
            summary,
            inputs: Vec::new(),
        }
    }

    pub fn with_dataset(mut self, dataset: DatasetKind) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn with_input(mut self, input: InputFile) -> Self {
        self.inputs.push(input);
        self
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn open_database<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let conn = Connection::open(path.as_ref())
        .with_context(|| format!("Failed to open run log {:?}", path.as_ref()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL so a crashed run never leaves a half-written log
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS runs (
            run_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            actor TEXT NOT NULL,
            dataset TEXT,
            summary TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS run_inputs (
            run_id TEXT NOT NULL REFERENCES runs(run_id),
            role TEXT NOT NULL,
            filename TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            PRIMARY KEY (run_id, role)
        );
        CREATE INDEX IF NOT EXISTS idx_runs_kind ON runs(kind, recorded_at);
        CREATE INDEX IF NOT EXISTS idx_run_inputs_sha256 ON run_inputs(sha256);",
    )?;

    Ok(())
}

// ============================================================================
// WRITE / READ
// ============================================================================

/// Store a run and its inputs atomically
pub fn record_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO runs (run_id, kind, recorded_at, actor, dataset, summary)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run.run_id,
            run.kind.as_str(),
            run.recorded_at.to_rfc3339(),
            run.actor,
            run.dataset.map(|d| d.code()),
            serde_json::to_string(&run.summary)?,
        ],
    )?;

    for input in &run.inputs {
        tx.execute(
            "INSERT INTO run_inputs (run_id, role, filename, sha256) VALUES (?1, ?2, ?3, ?4)",
            params![run.run_id, input.role, input.filename, input.sha256],
        )?;
    }

    tx.commit().context("Failed to commit run")?;
    Ok(())
}

/// Newest runs first, optionally only one kind
pub fn recent_runs(conn: &Connection, kind: Option<RunKind>, limit: usize) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, kind, recorded_at, actor, dataset, summary
         FROM runs
         WHERE ?1 IS NULL OR kind = ?1
         ORDER BY recorded_at DESC, rowid DESC
         LIMIT ?2",
    )?;

    let runs = stmt
        .query_map(params![kind.map(|k| k.as_str()), limit as i64], row_to_run)?
        .collect::<Result<Vec<_>, _>>()?;

    with_inputs(conn, runs)
}

/// Runs that read a file with this content, newest first
pub fn runs_using_file(conn: &Connection, sha256: &str) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT r.run_id, r.kind, r.recorded_at, r.actor, r.dataset, r.summary
         FROM runs r JOIN run_inputs i ON i.run_id = r.run_id
         WHERE i.sha256 = ?1
         ORDER BY r.recorded_at DESC",
    )?;

    let runs = stmt
        .query_map(params![sha256], row_to_run)?
        .collect::<Result<Vec<_>, _>>()?;

    with_inputs(conn, runs)
}

pub fn get_run(conn: &Connection, run_id: &str) -> Result<Option<RunRecord>> {
    let run = conn
        .query_row(
            "SELECT run_id, kind, recorded_at, actor, dataset, summary FROM runs WHERE run_id = ?1",
            params![run_id],
            row_to_run,
        )
        .optional()?;

    match run {
        Some(run) => Ok(with_inputs(conn, vec![run])?.pop()),
        None => Ok(None),
    }
}

fn with_inputs(conn: &Connection, mut runs: Vec<RunRecord>) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT role, filename, sha256 FROM run_inputs WHERE run_id = ?1 ORDER BY role",
    )?;

    for run in &mut runs {
        run.inputs = stmt
            .query_map(params![run.run_id], |row| {
                Ok(InputFile {
                    role: row.get(0)?,
                    filename: row.get(1)?,
                    sha256: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
    }

    Ok(runs)
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let kind: String = row.get(1)?;
    let recorded_at: String = row.get(2)?;
    let dataset: Option<String> = row.get(4)?;
    let summary: String = row.get(5)?;

    Ok(RunRecord {
        run_id: row.get(0)?,
        kind: RunKind::from_str(&kind).map_err(|e| conversion_error(1, e.into()))?,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| conversion_error(2, Box::new(e)))?
            .with_timezone(&Utc),
        actor: row.get(3)?,
        dataset: dataset
            .map(|code| DatasetKind::from_str(&code))
            .transpose()
            .map_err(|e| conversion_error(4, e.into()))?,
        summary: serde_json::from_str(&summary).map_err(|e| conversion_error(5, Box::new(e)))?,
        inputs: Vec::new(),
    })
}

fn conversion_error(
    column: usize,
    source: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, source)
}

// ============================================================================
// FINGERPRINTS
// ============================================================================

/// SHA-256 of raw bytes, lowercase hex
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file's contents
pub fn fingerprint_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let bytes = fs::read(path.as_ref())
        .with_context(|| format!("Failed to read {:?} for fingerprint", path.as_ref()))?;
    Ok(fingerprint_bytes(&bytes))
}

// ============================================================================
// TESTS
// ============================================================================
