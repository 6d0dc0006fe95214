//! Content fingerprint of a [`LogicalRecord`].
//!
//! The record is written as canonical JSON (object keys sorted, no
//! whitespace, empty values skipped) and hashed with SHA-256. The digest only
//! depends on attribute names and values, never on insertion order or on the
//! record key, so it is stable across processes and releases.

use serde_json::Value;
use sha2::{Digest, Sha256};

use roster_core::record::normalize_value;
use roster_core::{Fingerprint, LogicalRecord};

/// Deterministic content digest of `record`.
pub fn fingerprint(record: &LogicalRecord) -> Fingerprint {
    let canonical = canonical_string(record);
    let mut h = Sha256::new();
    h.update(canonical.as_bytes());
    Fingerprint(hex::encode(h.finalize()))
}

/// Canonical serialization fed to the hash.
pub fn canonical_string(record: &LogicalRecord) -> String {
    let mut out = String::new();
    out.push('{');
    let mut first = true;
    for (name, value) in record.attributes() {
        let Some(value) = normalize_value(value.clone()) else {
            continue;
        };
        if !first {
            out.push(',');
        }
        first = false;
        write_string(name, &mut out);
        out.push(':');
        write_canonical(&value, &mut out);
    }
    out.push('}');
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

// `Value`'s Display is compact JSON, which gives correct string escaping.
fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::from(s).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> LogicalRecord {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn repeated_calls_agree() {
        let r = record(&[("displayName", json!("Ada")), ("companyName", json!("ACME"))]);
        assert_eq!(fingerprint(&r), fingerprint(&r));
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let a = record(&[("displayName", json!("Ada")), ("companyName", json!("ACME"))]);
        let b = record(&[("companyName", json!("ACME")), ("displayName", json!("Ada"))]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn nested_object_key_order_does_not_matter() {
        let a = record(&[(
            "postalAddresses",
            json!([{ "street": "Main 1", "city": "Bonn" }]),
        )]);
        let b = record(&[(
            "postalAddresses",
            json!([{ "city": "Bonn", "street": "Main 1" }]),
        )]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn changing_a_value_changes_the_fingerprint() {
        let a = record(&[("displayName", json!("Ada"))]);
        let b = record(&[("displayName", json!("Ada L."))]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn empty_attributes_do_not_affect_the_fingerprint() {
        let a = record(&[("displayName", json!("Ada"))]);
        let b = record(&[
            ("displayName", json!("Ada")),
            ("surname", json!("")),
            ("phones", json!([])),
        ]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn key_is_not_part_of_the_content() {
        let a = record(&[("displayName", json!("Ada"))]);
        let b = record(&[("displayName", json!("Ada"))]).with_key("contact:ada|");
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn canonical_form_is_sorted_and_compact() {
        let r = record(&[("b", json!("2")), ("a", json!({ "y": 1, "x": "q\"" }))]);
        assert_eq!(canonical_string(&r), r#"{"a":{"x":"q\"","y":1},"b":"2"}"#);
    }

    #[test]
    fn digest_is_lowercase_sha256_hex() {
        let fp = fingerprint(&LogicalRecord::new());
        assert_eq!(fp.0.len(), 64);
        // sha256("{}")
        assert_eq!(
            fp.0,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }
}
