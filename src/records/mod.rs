// Record Models - property owners and business licenses
//
// Each record has:
// - The original CSV fields, untouched (for error reports and caches)
// - Trimmed named fields plus the decomposed address
// - An identity key derived from its fields, used for display and diffing

pub mod license;
pub mod owner;

pub use license::LicenseRecord;
pub use owner::PropertyOwnerRecord;

/// Stable identity of a record.
pub trait RecordIdentity {
    /// Deterministic, non-empty key derived from the record's fields
    fn key(&self) -> String;

    /// Fields exactly as read from the source file
    fn original_record(&self) -> &[String];
}

/// Field `index` of a source row, trimmed. Short rows read as empty.
pub(crate) fn field(fields: &[String], index: usize) -> String {
    fields
        .get(index)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

/// Which of the two source datasets a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DatasetKind {
    PropertyOwners,
    BusinessLicenses,
}

impl DatasetKind {
    /// Short code used in file names and on the command line
    pub fn code(&self) -> &'static str {
        match self {
            DatasetKind::PropertyOwners => "PO",
            DatasetKind::BusinessLicenses => "BL",
        }
    }

    /// Human-readable name for messages
    pub fn label(&self) -> &'static str {
        match self {
            DatasetKind::PropertyOwners => "Property Owners",
            DatasetKind::BusinessLicenses => "Business License",
        }
    }

    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            DatasetKind::PropertyOwners => &owner::PROPERTY_OWNER_HEADERS,
            DatasetKind::BusinessLicenses => &license::LICENSE_HEADERS,
        }
    }

    pub fn columns(&self) -> usize {
        self.headers().len()
    }
}

impl std::str::FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PO" => Ok(DatasetKind::PropertyOwners),
            "BL" => Ok(DatasetKind::BusinessLicenses),
            other => Err(format!("Invalid dataset kind '{}'. Expected PO or BL", other)),
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}
