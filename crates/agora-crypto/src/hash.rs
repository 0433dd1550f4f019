//! Canonical JSON and hashing
//!
//! Acceptance criteria are attested by hash, so both parties must be able to
//! reproduce the exact serialization: keys sorted lexicographically, `","`
//! and `":"` separators with no insignificant whitespace, and non-ASCII
//! characters written as `\uXXXX` escapes.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 of raw bytes as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Serialize a JSON value canonically: sorted keys, compact separators,
/// ASCII-only output.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// The acceptance-criteria hash: SHA-256 of the canonical serialization,
/// lowercase hex. Invariant under key reordering and whitespace.
pub fn criteria_hash(criteria: &Value) -> String {
    sha256_hex(canonical_json(criteria).as_bytes())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json's default map is a BTreeMap, so iteration order is
            // already lexicographic by key.
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c if c.is_ascii() => out.push(c),
            c => {
                // Escape non-ASCII as UTF-16 code units, surrogate pairs for
                // astral-plane characters.
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted() {
        let a: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        assert_eq!(canonical_json(&a), r#"{"a":1,"b":2}"#);
        assert_eq!(criteria_hash(&a), criteria_hash(&b));
    }

    #[test]
    fn different_content_differs() {
        let a = json!({"a": 1, "b": 2});
        let c = json!({"a": 1, "b": 3});
        assert_ne!(criteria_hash(&a), criteria_hash(&c));
    }

    #[test]
    fn whitespace_is_insignificant() {
        let a: Value = serde_json::from_str("{ \"a\" : [ 1 , 2 ] }").unwrap();
        assert_eq!(canonical_json(&a), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn non_ascii_is_escaped() {
        let v = json!({"msg": "héllo"});
        assert_eq!(canonical_json(&v), "{\"msg\":\"h\\u00e9llo\"}");

        // Astral-plane characters become surrogate pairs.
        let v = json!({"emoji": "\u{1F600}"});
        assert_eq!(canonical_json(&v), "{\"emoji\":\"\\ud83d\\ude00\"}");
    }

    #[test]
    fn control_characters_are_escaped() {
        let v = json!({"s": "a\nb\tc"});
        assert_eq!(canonical_json(&v), r#"{"s":"a\nb\tc"}"#);
    }

    #[test]
    fn nested_documents_sort_recursively() {
        let a: Value = serde_json::from_str(r#"{"z":{"b":1,"a":[{"y":2,"x":1}]}}"#).unwrap();
        assert_eq!(canonical_json(&a), r#"{"z":{"a":[{"x":1,"y":2}],"b":1}}"#);
    }

    #[test]
    fn hash_is_lowercase_hex() {
        let h = criteria_hash(&json!({"a": 1}));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
