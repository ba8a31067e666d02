// 🔁 Pipeline - complete merge and diff runs over files
//
// Shared by the command line and the upload server:
//   merge: load -> reconcile -> listing + error report + import file
//   diff:  load both snapshots -> compare -> HTML + diff CSV + removed cache

use crate::archive;
use crate::config::NeighbourhoodConfig;
use crate::diff::{DiffEngine, Diffable};
use crate::ledger::ErrorLedger;
use crate::loader;
use crate::output::{self, RemovedRecords};
use crate::reconciliation::ReconciliationEngine;
use crate::records::{DatasetKind, LicenseRecord, PropertyOwnerRecord};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Display;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// MERGE
// ============================================================================

/// Inputs and outputs of one merge run
#[derive(Debug, Clone)]
pub struct MergePaths {
    pub owners: PathBuf,
    pub licenses: PathBuf,
    pub output: PathBuf,
    pub errors: PathBuf,
    pub import: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeSummary {
    pub owners: usize,
    pub licenses: usize,
    pub matched: usize,
    pub matched_by_override: usize,
    pub unmatched: usize,
    pub rejected: usize,
    pub removed_owners: usize,
    pub removed_licenses: usize,
}

/// Removed records cached by the last diff of each dataset.
/// A missing cache reads as no removals.
pub fn load_removed(archive_dir: &Path, config: &NeighbourhoodConfig) -> Result<RemovedRecords> {
    let mut scratch = ErrorLedger::new();

    let owners_cache = archive::removed_cache_path(archive_dir, DatasetKind::PropertyOwners);
    let owners = if owners_cache.exists() {
        loader::load_property_owners(&owners_cache, config, &mut scratch)
            .with_context(|| format!("Failed to load removed cache {:?}", owners_cache))?
    } else {
        Vec::new()
    };

    let licenses_cache = archive::removed_cache_path(archive_dir, DatasetKind::BusinessLicenses);
    let licenses = if licenses_cache.exists() {
        loader::load_business_licenses(&licenses_cache, config, &mut scratch)
            .with_context(|| format!("Failed to load removed cache {:?}", licenses_cache))?
    } else {
        Vec::new()
    };

    if !scratch.is_empty() {
        warn!(count = scratch.len(), "cached removed records rejected on reload");
    }

    Ok(RemovedRecords { owners, licenses })
}

/// Load, reconcile and write the three merge outputs
pub fn run_merge(
    paths: &MergePaths,
    config: &NeighbourhoodConfig,
    removed: &RemovedRecords,
    remove_date: &str,
) -> Result<MergeSummary> {
    let mut ledger = ErrorLedger::new();

    let mut owners = loader::load_property_owners(&paths.owners, config, &mut ledger)
        .with_context(|| format!("Failed to load property owners from {:?}", paths.owners))?;
    let mut licenses = loader::load_business_licenses(&paths.licenses, config, &mut ledger)
        .with_context(|| format!("Failed to load business licenses from {:?}", paths.licenses))?;

    let report = ReconciliationEngine::new(config).reconcile(&mut owners, &mut licenses, &mut ledger);

    write_csv(&paths.output, |file| output::write_merged(&owners, &licenses, file))?;
    write_csv(&paths.errors, |file| output::write_error_report(&ledger, file))?;
    write_csv(&paths.import, |file| {
        output::write_import(&owners, &licenses, removed, remove_date, file)
    })?;

    let summary = MergeSummary {
        owners: owners.len(),
        licenses: licenses.len(),
        matched: report.matches.len(),
        matched_by_override: report.override_count(),
        unmatched: report.unmatched.len(),
        rejected: ledger.len(),
        removed_owners: removed.owners.len(),
        removed_licenses: removed.licenses.len(),
    };
    info!(?summary, "merge complete");

    Ok(summary)
}

fn write_csv<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> Result<(), csv::Error>,
{
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write(file).with_context(|| format!("Failed to write {:?}", path))
}

// ============================================================================
// DIFF
// ============================================================================

/// Where diff side outputs go. `None` skips that output.
#[derive(Debug, Clone)]
pub struct DiffTargets<'a> {
    pub out_dir: Option<&'a Path>,
    pub cache_dir: Option<&'a Path>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffOutcome {
    pub kind: DatasetKind,
    pub html: String,
    pub summary: String,
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
    pub diff_csv: Option<PathBuf>,
}

/// Compare a snapshot against the previous one. Without a previous
/// snapshot every current record is new.
pub fn run_diff(
    kind: DatasetKind,
    current: &Path,
    previous: Option<&Path>,
    config: &NeighbourhoodConfig,
    targets: &DiffTargets<'_>,
) -> Result<DiffOutcome> {
    // Rejected rows are not part of either snapshot
    let mut scratch = ErrorLedger::new();

    match kind {
        DatasetKind::PropertyOwners => {
            let load = |path: &Path, ledger: &mut ErrorLedger| -> Result<Vec<PropertyOwnerRecord>> {
                loader::load_property_owners(path, config, ledger)
                    .with_context(|| format!("Failed to load {:?}", path))
            };
            let current = load(current, &mut scratch)?;
            let previous = match previous {
                Some(path) => load(path, &mut scratch)?,
                None => Vec::new(),
            };
            compare(kind, &current, &previous, targets)
        }
        DatasetKind::BusinessLicenses => {
            let load = |path: &Path, ledger: &mut ErrorLedger| -> Result<Vec<LicenseRecord>> {
                loader::load_business_licenses(path, config, ledger)
                    .with_context(|| format!("Failed to load {:?}", path))
            };
            let current = load(current, &mut scratch)?;
            let previous = match previous {
                Some(path) => load(path, &mut scratch)?,
                None => Vec::new(),
            };
            compare(kind, &current, &previous, targets)
        }
    }
}

fn compare<R: Diffable + Display>(
    kind: DatasetKind,
    current: &[R],
    previous: &[R],
    targets: &DiffTargets<'_>,
) -> Result<DiffOutcome> {
    let result = DiffEngine::for_record::<R>().diff(current, previous);

    let diff_csv = match targets.out_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
            let path = dir.join(archive::diff_filename(kind, targets.date));
            write_csv(&path, |file| output::write_diff_csv(&result, file))?;
            Some(path)
        }
        None => None,
    };

    if let Some(dir) = targets.cache_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
        let path = archive::removed_cache_path(dir, kind);
        write_csv(&path, |file| output::write_removed_cache(kind, &result.removed, file))?;
    }

    info!(dataset = kind.label(), "diff: {}", result.summary());

    Ok(DiffOutcome {
        kind,
        html: output::render_diff_html(&result),
        summary: result.summary(),
        added: result.added.len(),
        changed: result.changed.len(),
        removed: result.removed.len(),
        diff_csv,
    })
}

// ============================================================================
// TESTS
// ============================================================================
