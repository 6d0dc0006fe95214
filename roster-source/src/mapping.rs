//! Row → [`LogicalRecord`] mapping for the two export kinds.
//!
//! Output attribute names are Graph contact fields, so a mapped record is
//! also the request body.

use roster_core::{LogicalRecord, RecordKey, SourceKind};
use serde_json::{json, Value};

use crate::reader::CsvRow;

/// Display name used when a contact row has no name at all.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Graph accepts at most two entries in `phones` for these contacts.
const MAX_PHONES: usize = 2;

const BUSINESS_PHONE_COLUMNS: [&str; 3] = ["Business", "Business2", "BusinessFax"];
const MOBILE_PHONE_COLUMNS: [&str; 2] = ["mobilePhone", "Mobile"];

/// Map one row of an export of `kind`.
///
/// Returns `None` when nothing mappable is left. `key_column`, when set and
/// filled, supplies the record key instead of the derived one.
pub fn map_row(kind: SourceKind, row: &CsvRow, key_column: Option<&str>) -> Option<LogicalRecord> {
    let record = match kind {
        SourceKind::Contacts => map_contact(row),
        SourceKind::Addresses => map_address(row),
    };
    if record.is_empty() {
        return None;
    }
    let key = key_column
        .and_then(|column| row.get(column))
        .map(|value| RecordKey(format!("{}:{}", key_prefix(kind), value)))
        .unwrap_or_else(|| derived_key(kind, &record));
    Some(record.with_key(key))
}

/// Contact persons export.
pub fn map_contact(row: &CsvRow) -> LogicalRecord {
    let name = row
        .get("LastName")
        .or_else(|| row.get("FirstName"))
        .unwrap_or_default();
    let (given, surname) = match name.split_once(' ') {
        Some((given, rest)) => (given, rest),
        None => (name, ""),
    };
    let display = name.replace(';', "");
    let display = display.trim();

    let mut record = LogicalRecord::new();
    record.set(
        "displayName",
        if display.is_empty() { UNKNOWN_NAME } else { display },
    );
    record.set("givenName", given);
    record.set("surname", surname);
    record.set("companyName", row.get("Company").unwrap_or_default());
    if let Some(email) = row.get("Email") {
        record.set("emailAddresses", json!([{ "address": email }]));
    }
    record.set("phones", phones(row));
    record
}

/// Company addresses export.
pub fn map_address(row: &CsvRow) -> LogicalRecord {
    let company = row.get("Company").map(|c| c.replace(';', ""));
    let company = company.as_deref().map(str::trim).unwrap_or_default();

    let mut record = LogicalRecord::new();
    record.set("displayName", company);
    record.set("companyName", company);
    if let Some(street) = row.get("LieferStrasse") {
        record.set(
            "postalAddresses",
            json!([{
                "street": street,
                "city": row.get("LieferOrt"),
                "postalCode": row.get("LieferPLZ"),
                "countryOrRegion": row.get("Lieferland"),
                "type": "business",
            }]),
        );
    }
    if let Some(email) = row.get("Email") {
        record.set(
            "emailAddresses",
            json!([{ "address": email, "type": "work", "name": company }]),
        );
    }
    if let Some(homepage) = row.get("Homepage") {
        record.set("websites", json!([{ "type": "work", "address": homepage }]));
    }
    record.set("phones", phones(row));
    record
}

/// Up to two numbers, business columns first.
fn phones(row: &CsvRow) -> Value {
    let business = BUSINESS_PHONE_COLUMNS
        .iter()
        .filter_map(|c| row.get(c))
        .map(|n| json!({ "type": "business", "number": n }));
    let mobile = MOBILE_PHONE_COLUMNS
        .iter()
        .filter_map(|c| row.get(c))
        .map(|n| json!({ "type": "mobile", "number": n }));
    Value::Array(business.chain(mobile).take(MAX_PHONES).collect())
}

fn key_prefix(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Contacts => "contact",
        SourceKind::Addresses => "address",
    }
}

fn derived_key(kind: SourceKind, record: &LogicalRecord) -> RecordKey {
    let text = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase()
    };
    let email = || {
        record
            .get("emailAddresses")
            .and_then(|v| v.pointer("/0/address"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase()
    };
    let body = match kind {
        SourceKind::Contacts => format!("{}|{}", text("displayName"), text("companyName")),
        SourceKind::Addresses => format!("{}|{}", text("companyName"), email()),
    };
    RecordKey(format!("{}:{}", key_prefix(kind), body))
}
