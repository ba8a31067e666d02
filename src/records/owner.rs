// 🏢 Property Owner - owner of a parcel, identified by civic address

use super::{field, RecordIdentity};
use crate::address::{decompose, Address};
use crate::config::NeighbourhoodConfig;
use crate::diff::{Diffable, FieldValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Columns in a property owners file
pub const PROPERTY_OWNER_COLUMNS: usize = 11;

/// Header names, in file order
pub const PROPERTY_OWNER_HEADERS: [&str; PROPERTY_OWNER_COLUMNS] = [
    "Folio",
    "Civic",
    "Name 1",
    "Name 2",
    "Mailing",
    "Total Assess",
    "Included Assess",
    "Ann Chg",
    "Unit",
    "House",
    "Street",
];

/// City qualifier as written in the civic column
const CIVIC_CITY: &str = ", VANCOUVER";

const DEFAULT_COUNTRY: &str = "CANADA";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyOwnerRecord {
    pub original_record: Vec<String>,

    pub folio: String,
    pub civic: String,
    pub name1: String,
    pub name2: String,
    pub mailing: String,
    pub total_assess: String,
    pub included_assess: String,
    pub annual_charge: String,
    pub house: String,

    /// Decomposed civic address (None when the civic has no street number)
    pub location: Option<Address>,

    // Mailing address split into lines
    pub mailing_street_1: Option<String>,
    pub mailing_street_2: Option<String>,
    pub mailing_street_3: Option<String>,
    pub mailing_country: String,

    /// Indices of the licenses reconciled to this property, in match order.
    /// They index the license collection passed to the reconciliation run.
    #[serde(default)]
    pub licenses: Vec<usize>,
}

impl PropertyOwnerRecord {
    /// Build from one row of a property owners file
    pub fn from_fields(fields: &[String], config: &NeighbourhoodConfig) -> Self {
        let civic = field(fields, 1);
        let mailing = field(fields, 4);
        let location = decompose(&civic).ok();

        let mut mailing_parts: Vec<String> = mailing
            .lines()
            .map(|line| line.trim().to_string())
            .collect();

        let mut mailing_country = DEFAULT_COUNTRY.to_string();
        if let Some(last) = mailing_parts.last() {
            if mailing_parts.len() > 1 && config.is_country(last) {
                mailing_country = last.clone();
                mailing_parts.pop();
            }
        }

        let mailing_street_3 = if mailing_parts.len() > 2 {
            Some(mailing_parts[2..].join(", "))
        } else {
            None
        };

        PropertyOwnerRecord {
            original_record: fields.to_vec(),
            folio: field(fields, 0),
            civic,
            name1: field(fields, 2),
            name2: field(fields, 3),
            mailing,
            total_assess: field(fields, 5),
            included_assess: field(fields, 6),
            annual_charge: field(fields, 7),
            house: field(fields, 9),
            location,
            mailing_street_1: mailing_parts.first().cloned(),
            mailing_street_2: mailing_parts.get(1).cloned(),
            mailing_street_3,
            mailing_country,
            licenses: Vec::new(),
        }
    }

    /// The street address without city part
    pub fn civic_no_city(&self) -> String {
        self.civic.replace(CIVIC_CITY, "")
    }

    /// Name to use on the business-system account
    pub fn account_name(&self) -> String {
        self.civic_no_city()
    }

    pub fn street_number(&self) -> Option<i64> {
        self.location.as_ref().map(|a| a.street_number)
    }

    pub fn street_name(&self) -> &str {
        self.location
            .as_ref()
            .map(|a| a.street_name.as_str())
            .unwrap_or("")
    }

    pub fn unit(&self) -> Option<i64> {
        self.location.as_ref().and_then(|a| a.unit)
    }
}

impl RecordIdentity for PropertyOwnerRecord {
    fn key(&self) -> String {
        self.account_name()
    }

    fn original_record(&self) -> &[String] {
        &self.original_record
    }
}

impl Diffable for PropertyOwnerRecord {
    const DEFAULT_IGNORED: &'static [&'static str] = &[
        "total_assess",
        "included_assess",
        "annual_charge",
        "house",
        "street_num",
        "mailing_street_1",
        "mailing_street_2",
        "mailing_street_3",
    ];

    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("folio", FieldValue::text(&self.folio)),
            ("civic", FieldValue::text(&self.civic)),
            ("name1", FieldValue::text(&self.name1)),
            ("name2", FieldValue::text(&self.name2)),
            ("mailing", FieldValue::text(&self.mailing)),
            ("total_assess", FieldValue::text(&self.total_assess)),
            ("included_assess", FieldValue::text(&self.included_assess)),
            ("annual_charge", FieldValue::text(&self.annual_charge)),
            ("house", FieldValue::text(&self.house)),
            ("unit", FieldValue::from(self.unit())),
            ("street_num", FieldValue::from(self.street_number())),
            ("street", FieldValue::text(self.street_name())),
            ("mailing_street_1", FieldValue::from(self.mailing_street_1.as_deref())),
            ("mailing_street_2", FieldValue::from(self.mailing_street_2.as_deref())),
            ("mailing_street_3", FieldValue::from(self.mailing_street_3.as_deref())),
            ("mailing_country", FieldValue::text(&self.mailing_country)),
        ]
    }
}

impl fmt::Display for PropertyOwnerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.folio, self.civic)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sample_row() -> Vec<String> {
        row(&[
            " 012-345 ",
            "398 HASTINGS ST E, VANCOUVER",
            "SMITH JOHN",
            "",
            "PO BOX 12\nVANCOUVER BC",
            "1000",
            "900",
            "50",
            "",
            "398",
            "HASTINGS ST E",
        ])
    }

    #[test]
    fn test_from_fields() {
        let config = NeighbourhoodConfig::default();
        let owner = PropertyOwnerRecord::from_fields(&sample_row(), &config);

        assert_eq!(owner.folio, "012-345");
        assert_eq!(owner.civic, "398 HASTINGS ST E, VANCOUVER");
        assert_eq!(owner.street_number(), Some(398));
        assert_eq!(owner.street_name(), "hastings st");
        assert_eq!(owner.unit(), None);
        assert_eq!(owner.mailing_street_1.as_deref(), Some("PO BOX 12"));
        assert_eq!(owner.mailing_street_2.as_deref(), Some("VANCOUVER BC"));
        assert_eq!(owner.mailing_street_3, None);
        assert_eq!(owner.mailing_country, "CANADA");
        assert!(owner.licenses.is_empty());
        // Original fields are kept verbatim
        assert_eq!(owner.original_record[0], " 012-345 ");
    }

    #[test]
    fn test_identity_key_strips_city() {
        let config = NeighbourhoodConfig::default();
        let owner = PropertyOwnerRecord::from_fields(&sample_row(), &config);

        assert_eq!(owner.key(), "398 HASTINGS ST E");
        assert_eq!(owner.to_string(), "012-345 - 398 HASTINGS ST E, VANCOUVER");
    }

    #[test]
    fn test_foreign_mailing_address() {
        let config = NeighbourhoodConfig::default();
        let mut fields = sample_row();
        fields[4] = "FLAT 3\n12 QUEENS RD\nCENTRAL\nWAN CHAI\nHong Kong".to_string();

        let owner = PropertyOwnerRecord::from_fields(&fields, &config);

        assert_eq!(owner.mailing_country, "Hong Kong");
        assert_eq!(owner.mailing_street_1.as_deref(), Some("FLAT 3"));
        assert_eq!(owner.mailing_street_2.as_deref(), Some("12 QUEENS RD"));
        assert_eq!(owner.mailing_street_3.as_deref(), Some("CENTRAL, WAN CHAI"));
    }

    #[test]
    fn test_country_needs_a_street_line() {
        let config = NeighbourhoodConfig::default();

        // A lone line is a street line, even when it names a country
        let mut fields = sample_row();
        fields[4] = "USA".to_string();
        let owner = PropertyOwnerRecord::from_fields(&fields, &config);
        assert_eq!(owner.mailing_country, "CANADA");
        assert_eq!(owner.mailing_street_1.as_deref(), Some("USA"));

        // Country line is taken out of the street lines
        fields[4] = "1 MAIN ST\nUSA".to_string();
        let owner = PropertyOwnerRecord::from_fields(&fields, &config);
        assert_eq!(owner.mailing_country, "USA");
        assert_eq!(owner.mailing_street_1.as_deref(), Some("1 MAIN ST"));
        assert_eq!(owner.mailing_street_2, None);
    }

    #[test]
    fn test_short_row_and_bad_address() {
        let config = NeighbourhoodConfig::default();
        let owner = PropertyOwnerRecord::from_fields(&row(&["1", "NO NUMBER RD"]), &config);

        assert_eq!(owner.location, None);
        assert_eq!(owner.street_name(), "");
        assert_eq!(owner.annual_charge, "");
        assert_eq!(owner.mailing_street_1, None);
    }
}
