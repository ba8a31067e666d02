// Civic Reconcile - Core Library
// Exposes all modules for use in CLI, upload server, and tests

pub mod address;        // Address normalization and decomposition
pub mod archive;        // Dated snapshots of uploaded files
pub mod config;         // Neighbourhood tables (blocks, overrides, filters)
pub mod db;             // Run log with input fingerprints
pub mod diff;           // Snapshot comparison
pub mod error;
pub mod geo;            // Governed-area membership
pub mod ledger;         // Rejected records with reasons
pub mod loader;
pub mod output;
pub mod pipeline;       // Whole merge / diff runs
pub mod reconciliation; // License -> owner matching
pub mod records;

// Re-export commonly used types
pub use address::{decompose, normalize, previous_neighbour_of, strong_normalize, Address};
pub use config::NeighbourhoodConfig;
pub use db::{
    fingerprint_file, open_database, record_run, recent_runs, runs_using_file, setup_database,
    InputFile, RunKind, RunRecord,
};
pub use diff::{ChangedRecord, DiffEngine, DiffResult, Diffable, FieldChange, FieldValue};
pub use error::{AddressError, MergeError};
pub use geo::GeoMembership;
pub use ledger::{ErrorEntry, ErrorLedger, RejectedRecord};
pub use pipeline::{DiffOutcome, DiffTargets, MergePaths, MergeSummary};
pub use reconciliation::{LicenseMatch, MatchPath, ReconciliationEngine, ReconciliationReport};
pub use records::{DatasetKind, LicenseRecord, PropertyOwnerRecord, RecordIdentity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
