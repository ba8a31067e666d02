// 📒 Error Ledger - every rejected record, with the reason it was rejected
//
// Append-only, one ledger per run. Nothing is dropped silently: a record
// that does not make it into a collection ends up here.

use crate::records::{LicenseRecord, PropertyOwnerRecord, RecordIdentity};
use serde::Serialize;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RejectedRecord {
    Owner(PropertyOwnerRecord),
    License(LicenseRecord),
}

impl RejectedRecord {
    pub fn original_record(&self) -> &[String] {
        match self {
            RejectedRecord::Owner(owner) => owner.original_record(),
            RejectedRecord::License(license) => license.original_record(),
        }
    }

    pub fn key(&self) -> String {
        match self {
            RejectedRecord::Owner(owner) => owner.key(),
            RejectedRecord::License(license) => license.key(),
        }
    }
}

impl fmt::Display for RejectedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectedRecord::Owner(owner) => write!(f, "{}", owner),
            RejectedRecord::License(license) => write!(f, "{}", license),
        }
    }
}

impl From<PropertyOwnerRecord> for RejectedRecord {
    fn from(owner: PropertyOwnerRecord) -> Self {
        RejectedRecord::Owner(owner)
    }
}

impl From<LicenseRecord> for RejectedRecord {
    fn from(license: LicenseRecord) -> Self {
        RejectedRecord::License(license)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub record: RejectedRecord,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ErrorLedger {
    entries: Vec<ErrorEntry>,
}

impl ErrorLedger {
    pub fn new() -> Self {
        ErrorLedger {
            entries: Vec::new(),
        }
    }

    /// Record that `record` was rejected for `reason`
    pub fn add(&mut self, record: impl Into<RejectedRecord>, reason: &str) {
        let record = record.into();
        debug!(record = %record, reason, "record rejected");
        self.entries.push(ErrorEntry {
            record,
            reason: reason.to_string(),
        });
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with a given reason
    pub fn count_reason(&self, reason: &str) -> usize {
        self.entries.iter().filter(|e| e.reason == reason).count()
    }
}
