// ⚠️ Errors - structural failures vs per-record rejections
//
// Structural problems (wrong column count, unreadable file, broken config)
// abort the run. Per-record problems never surface here: they go to the
// ErrorLedger instead.

use std::fmt;

// ============================================================================
// ADDRESS ERROR
// ============================================================================

/// An address string with no street number among its first two tokens.
///
/// Callers treat this as "not governed", never as a hard failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressError {
    pub address: String,
}

impl AddressError {
    pub fn new(address: &str) -> Self {
        AddressError {
            address: address.to_string(),
        }
    }
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot find a street number in address '{}'", self.address)
    }
}

impl std::error::Error for AddressError {}

// ============================================================================
// MERGE ERROR
// ============================================================================

#[derive(Debug)]
pub enum MergeError {
    /// A source file has the wrong shape (e.g. wrong column count).
    InvalidInput(String),
    /// File could not be read or written.
    Io { path: String, source: std::io::Error },
    /// CSV reader/writer failure.
    Csv(csv::Error),
    /// Neighbourhood config could not be parsed.
    Config(String),
}

impl MergeError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            MergeError::Io { path, source } => write!(f, "IO error on {path}: {source}"),
            MergeError::Csv(e) => write!(f, "CSV error: {e}"),
            MergeError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MergeError::Io { source, .. } => Some(source),
            MergeError::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<csv::Error> for MergeError {
    fn from(e: csv::Error) -> Self {
        MergeError::Csv(e)
    }
}
