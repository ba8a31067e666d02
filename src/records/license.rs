// 🧾 Business License - operator of a business, identified by account name
// and located by address

use super::{field, RecordIdentity};
use crate::address::{decompose, Address};
use crate::diff::{Diffable, FieldValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Columns in a business licenses file
pub const LICENSE_COLUMNS: usize = 15;

/// Header names, in file order
pub const LICENSE_HEADERS: [&str; LICENSE_COLUMNS] = [
    "RECORD",
    "LICENSE NUMBER",
    "ADDRESS",
    "LICENSE TYPE",
    "STATUS",
    "LICENSE YEAR",
    "BUSINESS NAME",
    "BUSINESS TRADE NAME",
    "DATA FROM",
    "MAIL ADDRESS1",
    "MAIL ADDRESS2",
    "MAIL ADDRESS3",
    "MAIL ADDRESS4",
    "WORK PHONE1",
    "WORK PHONE2",
];

/// Key prefix for licenses with neither a trade name nor a business name
pub const NAME_MISSING_PREFIX: &str = "NAME MISSING - ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub original_record: Vec<String>,

    pub record: String,
    pub license_number: String,
    pub address: String,
    pub license_type: String,
    pub status: String,
    pub license_year: String,
    pub business_name: String,
    pub business_trade_name: String,
    pub data_from: String,
    pub mail_address_1: String,
    pub mail_address_2: String,
    pub mail_address_3: String,
    pub mail_address_4: String,
    pub work_phone_1: String,
    pub work_phone_2: String,

    /// Decomposed business address
    pub location: Option<Address>,

    /// Index of the owning property in the owner collection of the
    /// reconciliation run. Set at most once.
    #[serde(default)]
    pub owner: Option<usize>,
}

impl LicenseRecord {
    /// Build from one row of a business licenses file
    pub fn from_fields(fields: &[String]) -> Self {
        let address = field(fields, 2);
        let location = decompose(&address).ok();

        LicenseRecord {
            original_record: fields.to_vec(),
            record: field(fields, 0),
            license_number: field(fields, 1),
            address,
            license_type: field(fields, 3),
            status: field(fields, 4),
            license_year: field(fields, 5),
            business_name: field(fields, 6),
            business_trade_name: field(fields, 7),
            data_from: field(fields, 8),
            mail_address_1: field(fields, 9),
            mail_address_2: field(fields, 10),
            mail_address_3: field(fields, 11),
            mail_address_4: field(fields, 12),
            work_phone_1: field(fields, 13),
            work_phone_2: field(fields, 14),
            location,
            owner: None,
        }
    }

    /// Name to use on the business-system account.
    ///
    /// Trade name and business name combined; a placeholder carrying the
    /// license number when both are blank, so the key is never empty.
    pub fn account_name(&self) -> String {
        let trade = &self.business_trade_name;
        let name = &self.business_name;

        match (trade.is_empty(), name.is_empty()) {
            (true, true) => format!("{}{}", NAME_MISSING_PREFIX, self.license_number),
            (false, true) => trade.clone(),
            (true, false) => name.clone(),
            (false, false) => format!("{} ({})", trade, name),
        }
    }

    /// Mailing address fields 2, 3 and 4 concatenated
    pub fn other_mail_address(&self) -> String {
        format!(
            "{} {} {}",
            self.mail_address_2, self.mail_address_3, self.mail_address_4
        )
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

    pub fn is_linked(&self) -> bool {
        self.owner.is_some()
    }
}

impl RecordIdentity for LicenseRecord {
    fn key(&self) -> String {
        self.account_name()
    }

    fn original_record(&self) -> &[String] {
        &self.original_record
    }
}

impl Diffable for LicenseRecord {
    const DEFAULT_IGNORED: &'static [&'static str] =
        &["status", "record", "license_year", "license_number"];

    fn fields(&self) -> Vec<(&'static str, FieldValue)> {
        vec![
            ("record", FieldValue::text(&self.record)),
            ("license_number", FieldValue::text(&self.license_number)),
            ("address", FieldValue::text(&self.address)),
            ("license_type", FieldValue::text(&self.license_type)),
            ("status", FieldValue::text(&self.status)),
            ("license_year", FieldValue::text(&self.license_year)),
            ("business_name", FieldValue::text(&self.business_name)),
            ("business_trade_name", FieldValue::text(&self.business_trade_name)),
            ("data_from", FieldValue::text(&self.data_from)),
            ("mail_address_1", FieldValue::text(&self.mail_address_1)),
            ("mail_address_2", FieldValue::text(&self.mail_address_2)),
            ("mail_address_3", FieldValue::text(&self.mail_address_3)),
            ("mail_address_4", FieldValue::text(&self.mail_address_4)),
            ("work_phone_1", FieldValue::text(&self.work_phone_1)),
            ("work_phone_2", FieldValue::text(&self.work_phone_2)),
            ("unit", FieldValue::from(self.unit())),
            ("street_num", FieldValue::from(self.street_number())),
            ("street", FieldValue::text(self.street_name())),
        ]
    }
}

impl fmt::Display for LicenseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.license_number, self.address)
    }
}

// ============================================================================
// TESTS
// ============================================================================
