// 📂 Loader - CSV files -> validated records
//
// The header row fixes the shape: a wrong column count aborts the load
// before any record is built. After that every row either becomes a record
// or lands in the ErrorLedger with a reason.

use crate::config::NeighbourhoodConfig;
use crate::error::MergeError;
use crate::geo::{GeoMembership, NOT_GOVERNED_REASON};
use crate::ledger::ErrorLedger;
use crate::records::{DatasetKind, LicenseRecord, PropertyOwnerRecord};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

pub const INVALID_LICENSE_TYPE_REASON: &str = "invalid license type";
pub const IGNORED_BUSINESS_NAME_REASON: &str = "business name is on ignore list";

// ============================================================================
// PROPERTY OWNERS
// ============================================================================

/// Read property owners from a CSV file, sorted by folio
pub fn load_property_owners<P: AsRef<Path>>(
    path: P,
    config: &NeighbourhoodConfig,
    ledger: &mut ErrorLedger,
) -> Result<Vec<PropertyOwnerRecord>, MergeError> {
    let file = File::open(path.as_ref()).map_err(|e| MergeError::io(path.as_ref(), e))?;
    property_owners_from_reader(file, config, ledger)
}

pub fn property_owners_from_reader<R: Read>(
    reader: R,
    config: &NeighbourhoodConfig,
    ledger: &mut ErrorLedger,
) -> Result<Vec<PropertyOwnerRecord>, MergeError> {
    let rows = read_rows(reader, DatasetKind::PropertyOwners)?;
    let geo = GeoMembership::new(config);

    let mut owners = Vec::with_capacity(rows.len());
    for row in rows {
        let owner = PropertyOwnerRecord::from_fields(&row, config);
        if geo.is_governed(&owner.civic) {
            owners.push(owner);
        } else {
            ledger.add(owner, NOT_GOVERNED_REASON);
        }
    }

    owners.sort_by(|a, b| a.folio.cmp(&b.folio));
    info!(count = owners.len(), "property owners loaded");

    Ok(owners)
}

// ============================================================================
// BUSINESS LICENSES
// ============================================================================

/// Read business licenses from a CSV file, sorted by license number.
/// Repeated license numbers are skipped silently, first one wins.
pub fn load_business_licenses<P: AsRef<Path>>(
    path: P,
    config: &NeighbourhoodConfig,
    ledger: &mut ErrorLedger,
) -> Result<Vec<LicenseRecord>, MergeError> {
    let file = File::open(path.as_ref()).map_err(|e| MergeError::io(path.as_ref(), e))?;
    business_licenses_from_reader(file, config, ledger)
}

pub fn business_licenses_from_reader<R: Read>(
    reader: R,
    config: &NeighbourhoodConfig,
    ledger: &mut ErrorLedger,
) -> Result<Vec<LicenseRecord>, MergeError> {
    let rows = read_rows(reader, DatasetKind::BusinessLicenses)?;
    let geo = GeoMembership::new(config);

    let mut seen = HashSet::new();
    let mut licenses = Vec::with_capacity(rows.len());

    for row in rows {
        let license = LicenseRecord::from_fields(&row);

        if !seen.insert(license.license_number.clone()) {
            debug!(license = %license, "duplicate license number skipped");
            continue;
        }

        if !config.is_valid_license_type(&license.license_type) {
            ledger.add(license, INVALID_LICENSE_TYPE_REASON);
            continue;
        }
        if !config.is_valid_business_name(&license.business_name) {
            ledger.add(license, IGNORED_BUSINESS_NAME_REASON);
            continue;
        }

        if geo.is_governed(&license.address) {
            licenses.push(license);
        } else {
            ledger.add(license, NOT_GOVERNED_REASON);
        }
    }

    licenses.sort_by(|a, b| a.license_number.cmp(&b.license_number));
    info!(count = licenses.len(), "business licenses loaded");

    Ok(licenses)
}

// ============================================================================
// CSV ROWS
// ============================================================================

/// Column count of the header row, None for an empty input
pub fn header_width<R: Read>(reader: R) -> Result<Option<usize>, MergeError> {
    let mut rdr = csv_reader(reader);
    match rdr.byte_records().next() {
        Some(record) => Ok(Some(record?.len())),
        None => Ok(None),
    }
}

/// Data rows after a header of the right width. Empty input gives no rows.
fn read_rows<R: Read>(reader: R, kind: DatasetKind) -> Result<Vec<Vec<String>>, MergeError> {
    let mut rdr = csv_reader(reader);
    let mut records = rdr.byte_records();

    let headers = match records.next() {
        Some(headers) => headers?,
        None => {
            warn!(dataset = kind.label(), "empty file, nothing loaded");
            return Ok(Vec::new());
        }
    };

    if headers.len() != kind.columns() {
        return Err(MergeError::InvalidInput(format!(
            "{} file should have exactly {} columns. Found {}.",
            kind.label(),
            kind.columns(),
            headers.len()
        )));
    }

    let mut rows = Vec::new();
    for record in records {
        let record = record?;
        // Exports are not always UTF-8
        rows.push(
            record
                .iter()
                .map(|field| String::from_utf8_lossy(field).into_owned())
                .collect(),
        );
    }

    Ok(rows)
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PO_HEADER: &str =
        "Folio,Civic,Name 1,Name 2,Mailing,Total Assess,Included Assess,Ann Chg,Unit,House,Street\n";

    const BL_HEADER: &str = "RECORD,LICENSE NUMBER,ADDRESS,LICENSE TYPE,STATUS,LICENSE YEAR,\
BUSINESS NAME,BUSINESS TRADE NAME,DATA FROM,MAIL ADDRESS1,MAIL ADDRESS2,MAIL ADDRESS3,\
MAIL ADDRESS4,WORK PHONE1,WORK PHONE2\n";

    fn bl_row(number: &str, address: &str, license_type: &str, name: &str) -> String {
        format!("R,{number},{address},{license_type},Issued,2024,{name},,,,,,,,\n")
    }

    #[test]
    fn test_load_property_owners() {
        let data = format!(
            "{PO_HEADER}\
B2,\"305 RAILWAY ST, VANCOUVER\",SMITH,,\"PO BOX 1\nVANCOUVER\",1,1,1,,305,RAILWAY ST\n\
A1,\"1209 HASTINGS ST E, VANCOUVER\",JONES,,,1,1,1,,1209,HASTINGS ST E\n\
C3,\"300 MAIN ST, VANCOUVER\",LEE,,,1,1,1,,300,MAIN ST\n"
        );

        let config = NeighbourhoodConfig::default();
        let mut ledger = ErrorLedger::new();
        let owners = property_owners_from_reader(data.as_bytes(), &config, &mut ledger).unwrap();

        let folios: Vec<&str> = owners.iter().map(|o| o.folio.as_str()).collect();
        assert_eq!(folios, vec!["A1", "B2"]);
        assert_eq!(owners[1].mailing_street_2.as_deref(), Some("VANCOUVER"));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.entries()[0].reason, NOT_GOVERNED_REASON);
        assert_eq!(ledger.entries()[0].record.original_record()[0], "C3");
    }

    #[test]
    fn test_wrong_column_count() {
        let data = "Folio,Civic,Name\nA,305 RAILWAY ST,X\n";
        let config = NeighbourhoodConfig::default();
        let mut ledger = ErrorLedger::new();

        let err = property_owners_from_reader(data.as_bytes(), &config, &mut ledger).unwrap_err();

        match err {
            MergeError::InvalidInput(msg) => {
                assert_eq!(msg, "Property Owners file should have exactly 11 columns. Found 3.")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_empty_file() {
        let config = NeighbourhoodConfig::default();
        let mut ledger = ErrorLedger::new();

        let owners = property_owners_from_reader(&b""[..], &config, &mut ledger).unwrap();
        assert!(owners.is_empty());

        let licenses = business_licenses_from_reader(&b""[..], &config, &mut ledger).unwrap();
        assert!(licenses.is_empty());
    }

    #[test]
    fn test_load_business_licenses() {
        let data = format!(
            "{BL_HEADER}{}{}{}{}{}{}",
            bl_row("30", "310 Powell St", "Retail", "Shop"),
            bl_row("10", "305 Railway St", "Office", "Studio"),
            bl_row("10", "305 Railway St", "Office", "Studio Again"),
            bl_row("20", "305 Railway St", "One-Family Dwelling", "Home"),
            bl_row("40", "305 Railway St", "Rental", "Provincial Rental Housing Corporation"),
            bl_row("50", "300 Main St", "Retail", "Elsewhere"),
        );

        let config = NeighbourhoodConfig::default();
        let mut ledger = ErrorLedger::new();
        let licenses = business_licenses_from_reader(data.as_bytes(), &config, &mut ledger).unwrap();

        let numbers: Vec<&str> = licenses.iter().map(|l| l.license_number.as_str()).collect();
        assert_eq!(numbers, vec!["10", "30"]);
        // First of the duplicate license numbers is kept
        assert_eq!(licenses[0].business_name, "Studio");

        let reasons: Vec<&str> = ledger.entries().iter().map(|e| e.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                INVALID_LICENSE_TYPE_REASON,
                IGNORED_BUSINESS_NAME_REASON,
                NOT_GOVERNED_REASON
            ]
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{BL_HEADER}{}", bl_row("1", "305 Railway St", "Retail", "Shop")).unwrap();

        let config = NeighbourhoodConfig::default();
        let mut ledger = ErrorLedger::new();
        let licenses = load_business_licenses(file.path(), &config, &mut ledger).unwrap();
        assert_eq!(licenses.len(), 1);

        let missing = load_business_licenses("/nonexistent/bl.csv", &config, &mut ledger);
        assert!(matches!(missing, Err(MergeError::Io { .. })));
    }

    #[test]
    fn test_header_width() {
        assert_eq!(header_width(PO_HEADER.as_bytes()).unwrap(), Some(11));
        assert_eq!(header_width(BL_HEADER.as_bytes()).unwrap(), Some(15));
        assert_eq!(header_width(&b""[..]).unwrap(), None);
    }
}
