// 📤 Output - CSV and HTML renderings of runs
//
// - merged listing: owners, each followed by its licenses
// - business-system import: same records in the CRM's import layout,
//   plus removed records stamped with a removal date
// - error report, diff CSV, removed cache, diff HTML

use crate::diff::{DiffResult, Diffable};
use crate::ledger::ErrorLedger;
use crate::records::{DatasetKind, LicenseRecord, PropertyOwnerRecord, RecordIdentity};
use chrono::{Datelike, NaiveDate};
use csv::{Writer, WriterBuilder};
use std::io::Write;

const MERGED_HEADERS: [&str; 14] = [
    "Property Address",
    "License Type",
    "House",
    "Street",
    "License / Folio number",
    "Civic address",
    "Business name 1",
    "Business name 2",
    "Mail address 1",
    "Mail address 2",
    "Total Assess",
    "Included Assess",
    "Ann Chg",
    "Unit",
];

const IMPORT_HEADERS: [&str; 24] = [
    "Record Owner",
    "Account Name",
    "Parent Account",
    "Phone",
    "Business License Type",
    "License Number",
    "Folio Number",
    "Total Assessment",
    "Included Assessment",
    "Annual Charge",
    "Business Name",
    "Business Name 2",
    "Street Name",
    "Unit",
    "Billing Street 1",
    "Billing City",
    "Billing State",
    "Billing Postal Code",
    "Billing Country",
    "Shipping Street 1",
    "Shipping Street 2",
    "Shipping Street 3",
    "Shipping Country",
    "Removed",
];

const RECORD_OWNER: &str = "System Admin";
const BILLING_CITY: &str = "Vancouver";
const BILLING_STATE: &str = "B.C.";
const BILLING_COUNTRY: &str = "Canada";

/// Records dropped since the previous snapshot, kept so the import can
/// flag them as removed
#[derive(Debug, Clone, Default)]
pub struct RemovedRecords {
    pub owners: Vec<PropertyOwnerRecord>,
    pub licenses: Vec<LicenseRecord>,
}

/// Removal stamp in the import's date format: "d/m/yyyy 12:00 PM"
pub fn removal_stamp(date: NaiveDate) -> String {
    format!("{}/{}/{} 12:00 PM", date.day(), date.month(), date.year())
}

fn writer<W: Write>(out: W) -> Writer<W> {
    WriterBuilder::new().flexible(true).from_writer(out)
}

fn opt_to_string(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ============================================================================
// MERGED LISTING
// ============================================================================

/// Owners in order, each followed by the licenses reconciled to it
pub fn write_merged<W: Write>(
    owners: &[PropertyOwnerRecord],
    licenses: &[LicenseRecord],
    out: W,
) -> Result<(), csv::Error> {
    let mut wtr = writer(out);
    wtr.write_record(MERGED_HEADERS)?;

    for owner in owners {
        wtr.write_record([
            owner.civic_no_city(),
            "PROPERTY OWNER".to_string(),
            opt_to_string(owner.street_number()),
            owner.street_name().to_string(),
            owner.folio.clone(),
            owner.civic.clone(),
            owner.name1.clone(),
            owner.name2.clone(),
            owner.mailing.clone(),
            String::new(),
            owner.total_assess.clone(),
            owner.included_assess.clone(),
            owner.annual_charge.clone(),
            String::new(),
        ])?;

        for license in owner.licenses.iter().filter_map(|&i| licenses.get(i)) {
            wtr.write_record([
                license.address.clone(),
                license.license_type.clone(),
                opt_to_string(license.street_number()),
                license.street_name().to_string(),
                license.license_number.clone(),
                license.address.clone(),
                license.business_trade_name.clone(),
                license.business_name.clone(),
                license.mail_address_1.clone(),
                license.other_mail_address(),
                String::new(),
                String::new(),
                String::new(),
                opt_to_string(license.unit()),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

// ============================================================================
// BUSINESS-SYSTEM IMPORT
// ============================================================================

/// Import file: current owners with their licenses, then removed owners
/// and removed licenses stamped with `remove_date`. Removed owners do not
/// carry their licenses.
pub fn write_import<W: Write>(
    owners: &[PropertyOwnerRecord],
    licenses: &[LicenseRecord],
    removed: &RemovedRecords,
    remove_date: &str,
    out: W,
) -> Result<(), csv::Error> {
    let mut wtr = writer(out);
    wtr.write_record(IMPORT_HEADERS)?;

    for owner in owners {
        wtr.write_record(owner_import_row(owner, ""))?;

        for license in owner.licenses.iter().filter_map(|&i| licenses.get(i)) {
            wtr.write_record(license_import_row(license, &owner.civic_no_city(), ""))?;
        }
    }

    for owner in &removed.owners {
        wtr.write_record(owner_import_row(owner, remove_date))?;
    }

    // Removed licenses were never reconciled in this run: no parent
    for license in &removed.licenses {
        wtr.write_record(license_import_row(license, "", remove_date))?;
    }

    wtr.flush()?;
    Ok(())
}

fn owner_import_row(owner: &PropertyOwnerRecord, remove_date: &str) -> Vec<String> {
    vec![
        RECORD_OWNER.to_string(),
        owner.account_name(),
        String::new(),
        String::new(),
        "Property Owner".to_string(),
        String::new(),
        owner.folio.clone(),
        owner.total_assess.clone(),
        owner.included_assess.clone(),
        owner.annual_charge.clone(),
        owner.name1.clone(),
        owner.name2.clone(),
        owner.street_name().to_string(),
        opt_to_string(owner.unit()),
        owner.civic_no_city(),
        BILLING_CITY.to_string(),
        BILLING_STATE.to_string(),
        String::new(),
        BILLING_COUNTRY.to_string(),
        owner.mailing_street_1.clone().unwrap_or_default(),
        owner.mailing_street_2.clone().unwrap_or_default(),
        owner.mailing_street_3.clone().unwrap_or_default(),
        owner.mailing_country.clone(),
        remove_date.to_string(),
    ]
}

fn license_import_row(license: &LicenseRecord, parent_account: &str, remove_date: &str) -> Vec<String> {
    vec![
        RECORD_OWNER.to_string(),
        license.account_name(),
        parent_account.to_string(),
        license.work_phone_1.clone(),
        license.license_type.clone(),
        license.license_number.clone(),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        license.business_trade_name.clone(),
        license.business_name.clone(),
        license.street_name().to_string(),
        opt_to_string(license.unit()),
        license.address.clone(),
        BILLING_CITY.to_string(),
        BILLING_STATE.to_string(),
        String::new(),
        BILLING_COUNTRY.to_string(),
        license.mail_address_1.clone(),
        license.mail_address_2.clone(),
        format!("{}, {}", license.mail_address_3, license.mail_address_4),
        String::new(),
        remove_date.to_string(),
    ]
}

// ============================================================================
// ERROR REPORT
// ============================================================================

/// One row per rejected record: reason, then the original fields
pub fn write_error_report<W: Write>(ledger: &ErrorLedger, out: W) -> Result<(), csv::Error> {
    let mut wtr = writer(out);

    for entry in ledger.entries() {
        let mut row = vec![entry.reason.clone()];
        row.extend(entry.record.original_record().iter().cloned());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

// ============================================================================
// DIFF OUTPUTS
// ============================================================================

/// Added / Removed / Changed rows with original fields; each changed row is
/// followed by one `"", field, old, new` row per difference
pub fn write_diff_csv<R: Diffable, W: Write>(result: &DiffResult<'_, R>, out: W) -> Result<(), csv::Error> {
    let mut wtr = writer(out);

    for record in &result.added {
        wtr.write_record(tagged_row("Added", record.original_record()))?;
    }

    for record in &result.removed {
        wtr.write_record(tagged_row("Removed", record.original_record()))?;
    }

    for changed in &result.changed {
        wtr.write_record(tagged_row("Changed", changed.current.original_record()))?;
        for change in &changed.changes {
            wtr.write_record([
                String::new(),
                change.field.to_string(),
                change.old.to_string(),
                change.new.to_string(),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

fn tagged_row(tag: &str, fields: &[String]) -> Vec<String> {
    let mut row = Vec::with_capacity(fields.len() + 1);
    row.push(tag.to_string());
    row.extend(fields.iter().cloned());
    row
}

/// Removed records with a header row, so the next merge run can load them
/// with the normal loader
pub fn write_removed_cache<R: RecordIdentity, W: Write>(
    kind: DatasetKind,
    removed: &[&R],
    out: W,
) -> Result<(), csv::Error> {
    let mut wtr = writer(out);
    wtr.write_record(kind.headers())?;

    for record in removed {
        wtr.write_record(record.original_record())?;
    }

    wtr.flush()?;
    Ok(())
}

/// HTML fragment describing a diff: new records, old records, changes
pub fn render_diff_html<R: Diffable + std::fmt::Display>(result: &DiffResult<'_, R>) -> String {
    let mut html = String::new();

    if !result.added.is_empty() {
        html_list(&mut html, "New records", None, &result.added);
    }

    if !result.removed.is_empty() {
        html_list(
            &mut html,
            "Old records",
            Some("These need to be removed manually from the business system"),
            &result.removed,
        );
    }

    if !result.changed.is_empty() {
        html.push_str("<h3>Changes</h3>\n<ul>\n");
        for changed in &result.changed {
            html.push_str(&format!("<li><b>{}</b>\n<table>\n", escape_html(&changed.key)));
            for change in &changed.changes {
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    escape_html(change.field),
                    escape_html(&change.old.to_string()),
                    escape_html(&change.new.to_string())
                ));
            }
            html.push_str("</table></li>\n");
        }
        html.push_str("</ul>\n");
    }

    html
}

fn html_list<R: std::fmt::Display>(html: &mut String, title: &str, extra: Option<&str>, records: &[&R]) {
    html.push_str(&format!("<h3>{}</h3>\n", escape_html(title)));
    if let Some(extra) = extra {
        html.push_str(&format!("<p>{}</p>\n", escape_html(extra)));
    }
    html.push_str("<ul>\n");
    for record in records {
        html.push_str(&format!("<li>{}</li>\n", escape_html(&record.to_string())));
    }
    html.push_str("</ul>\n");
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeighbourhoodConfig;
    use crate::diff::DiffEngine;
    use crate::records::license::LICENSE_COLUMNS;
    use crate::records::owner::PROPERTY_OWNER_COLUMNS;

    fn owner(folio: &str, civic: &str) -> PropertyOwnerRecord {
        let mut fields = vec![String::new(); PROPERTY_OWNER_COLUMNS];
        fields[0] = folio.to_string();
        fields[1] = civic.to_string();
        fields[2] = "SMITH".to_string();
        PropertyOwnerRecord::from_fields(&fields, &NeighbourhoodConfig::default())
    }

    fn license(number: &str, address: &str, trade: &str) -> LicenseRecord {
        let mut fields = vec![String::new(); LICENSE_COLUMNS];
        fields[1] = number.to_string();
        fields[2] = address.to_string();
        fields[7] = trade.to_string();
        LicenseRecord::from_fields(&fields)
    }

    fn to_string(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_removal_stamp() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(removal_stamp(date), "7/3/2024 12:00 PM");
    }

    #[test]
    fn test_write_merged() {
        let mut owners = vec![owner("A1", "305 RAILWAY ST, VANCOUVER")];
        let mut licenses = vec![license("7", "101 305 Railway St", "Bakery")];
        owners[0].licenses.push(0);
        licenses[0].owner = Some(0);

        let mut buf = Vec::new();
        write_merged(&owners, &licenses, &mut buf).unwrap();
        let text = to_string(buf);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Property Address,License Type"));
        assert_eq!(
            lines[1],
            "305 RAILWAY ST,PROPERTY OWNER,305,railway st,A1,\"305 RAILWAY ST, VANCOUVER\",SMITH,,,,,,,"
        );
        assert!(lines[2].starts_with("101 305 Railway St,,305,railway st,7,101 305 Railway St,Bakery,"));
        assert!(lines[2].ends_with(",,,,101"));
    }

    #[test]
    fn test_write_import_with_removed() {
        let mut owners = vec![owner("A1", "305 RAILWAY ST, VANCOUVER")];
        let licenses = vec![license("7", "305 Railway St", "Bakery")];
        owners[0].licenses.push(0);

        let mut gone_owner = owner("Z9", "310 POWELL ST, VANCOUVER");
        gone_owner.licenses.push(0);
        let removed = RemovedRecords {
            owners: vec![gone_owner],
            licenses: vec![license("8", "312 Powell St", "Closed Cafe")],
        };

        let mut buf = Vec::new();
        write_import(&owners, &licenses, &removed, "7/3/2024 12:00 PM", &mut buf).unwrap();
        let text = to_string(buf);
        let lines: Vec<&str> = text.lines().collect();

        // header, owner, its license, removed owner (no children), removed license
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("System Admin,305 RAILWAY ST,,,Property Owner,,A1,"));
        assert!(lines[2].starts_with("System Admin,Bakery,305 RAILWAY ST,"));
        assert!(lines[2].ends_with(",Canada,,,\", \",,"));
        assert!(lines[3].starts_with("System Admin,310 POWELL ST,"));
        assert!(lines[3].ends_with(",CANADA,7/3/2024 12:00 PM"));
        assert!(lines[4].starts_with("System Admin,Closed Cafe,,"));
        assert!(lines[4].ends_with("7/3/2024 12:00 PM"));
    }

    #[test]
    fn test_write_error_report() {
        let mut ledger = ErrorLedger::new();
        ledger.add(license("7", "300 Main St", ""), "not governed or invalid address");

        let mut buf = Vec::new();
        write_error_report(&ledger, &mut buf).unwrap();
        let text = to_string(buf);

        assert!(text.starts_with("not governed or invalid address,,7,300 Main St,"));
    }

    #[test]
    fn test_diff_outputs() {
        let previous = vec![
            license("1", "305 Railway St", "Alpha"),
            license("2", "305 Railway St", "Beta"),
        ];
        let current = vec![
            license("2", "307 Railway St", "Beta"),
            license("3", "305 Railway St", "Gamma <&>"),
        ];

        let engine = DiffEngine::for_record::<LicenseRecord>();
        let result = engine.diff(&current, &previous);

        let mut buf = Vec::new();
        write_diff_csv(&result, &mut buf).unwrap();
        let text = to_string(buf);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("Added,,3,"));
        assert!(lines[1].starts_with("Removed,,1,"));
        assert!(lines[2].starts_with("Changed,,2,307 Railway St"));
        assert_eq!(lines[3], ",address,305 Railway St,307 Railway St");
        assert_eq!(lines[4], ",street_num,305,307");

        let html = render_diff_html(&result);
        assert!(html.contains("<h3>New records</h3>"));
        assert!(html.contains("<li>3 - 305 Railway St</li>"));
        assert!(html.contains("<h3>Old records</h3>"));
        assert!(html.contains("<li><b>Beta</b>"));
        assert!(html.contains("<tr><td>street_num</td><td>305</td><td>307</td></tr>"));

        let mut buf = Vec::new();
        write_removed_cache(DatasetKind::BusinessLicenses, &result.removed, &mut buf).unwrap();
        let text = to_string(buf);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("RECORD,LICENSE NUMBER"));
        assert!(lines[1].starts_with(",1,305 Railway St"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("Gamma <&> \"x\""), "Gamma &lt;&amp;&gt; &quot;x&quot;");
    }
}
