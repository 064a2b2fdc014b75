//! Deterministic Fingerprinter
//!
//! Canonical byte encoding of a [`Value`] plus its SHA-256 digest.
//!
//! ## Encoding
//!
//! - Object keys sorted lexicographically (byte order)
//! - No whitespace; `,` and `:` separators
//! - UTF-8 output, non-ASCII emitted verbatim; only `"`, `\` and U+0000..U+001F escaped
//! - Integers in decimal; finite floats in shortest round-trip form that
//!   always keeps a fraction or exponent (`1.0`, `0.55`, `1e-7`)
//! - NaN / ±Infinity are not representable and fail the encoding
//!
//! Callers must strip wall-clock fields before fingerprinting.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::value::{Map, Value};

/// Length of a hex-encoded SHA-256 digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Key of the lossy fallback marker
const UNAVAILABLE_KEY: &str = "_";

/// Value of the lossy fallback marker
const UNAVAILABLE_VALUE: &str = "unavailable";

/// Fingerprinting errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    #[error("value at '{path}' is not representable: non-finite float")]
    NonFiniteFloat { path: String },
}

/// Canonical byte encoding of a value
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, FingerprintError> {
    let mut out = String::new();
    emit_value(value, "$", &mut out)?;
    Ok(out.into_bytes())
}

/// SHA-256 hex digest of the canonical encoding
pub fn canonical_sha256(value: &Value) -> Result<String, FingerprintError> {
    let bytes = canonical_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

/// SHA-256 hex digest of raw bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Check that a string looks like a lowercase SHA-256 hex digest
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// The lossy `{"_": "unavailable"}` marker.
///
/// Stands in for a fingerprint that could not be computed. It carries no
/// information about the original value and must never be used as audit
/// evidence on its own.
pub fn unavailable_marker() -> Value {
    let mut map = Map::new();
    map.insert(UNAVAILABLE_KEY.to_string(), Value::from(UNAVAILABLE_VALUE));
    Value::Object(map)
}

/// Is this value the lossy fallback marker?
pub fn is_unavailable_marker(value: &Value) -> bool {
    *value == unavailable_marker()
}

// =============================================================================
// EMITTERS
// =============================================================================

fn emit_value(value: &Value, path: &str, out: &mut String) -> Result<(), FingerprintError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => {
            let _ = write!(out, "{}", i);
        }
        Value::Float(f) => emit_float(*f, path, out)?,
        Value::String(s) => emit_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_value(item, &format!("{}[{}]", path, i), out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // BTreeMap iterates in byte order of the keys
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_string(key, out);
                out.push(':');
                emit_value(item, &format!("{}.{}", path, key), out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn emit_float(f: f64, path: &str, out: &mut String) -> Result<(), FingerprintError> {
    if !f.is_finite() {
        return Err(FingerprintError::NonFiniteFloat {
            path: path.to_string(),
        });
    }
    // Debug formatting is shortest round-trip and keeps ".0" on integral values
    let _ = write!(out, "{:?}", f);
    Ok(())
}

fn emit_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(v: &Value) -> String {
        String::from_utf8(canonical_bytes(v).unwrap()).unwrap()
    }

    #[test]
    fn test_sorted_keys_no_whitespace() {
        let v = Value::from_json_str(r#"{ "z": 1, "a": [true, null], "m": "x" }"#).unwrap();
        assert_eq!(encode(&v), r#"{"a":[true,null],"m":"x","z":1}"#);
    }

    #[test]
    fn test_float_forms() {
        assert_eq!(encode(&Value::Float(1.0)), "1.0");
        assert_eq!(encode(&Value::Float(0.55)), "0.55");
        assert_eq!(encode(&Value::Float(-0.5)), "-0.5");
        assert_eq!(encode(&Value::Float(1e-7)), "1e-7");
        // int and float never collide
        assert_ne!(encode(&Value::Int(1)), encode(&Value::Float(1.0)));
    }

    #[test]
    fn test_string_escaping_and_unicode() {
        let v = Value::from("a\"b\\c\nd\u{0001}é");
        assert_eq!(encode(&v), "\"a\\\"b\\\\c\\nd\\u0001é\"");
    }

    #[test]
    fn test_known_digest() {
        // sha256("{}")
        let digest = canonical_sha256(&Value::Object(Map::new())).unwrap();
        assert_eq!(
            digest,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
        assert!(is_sha256_hex(&digest));
    }

    #[test]
    fn test_non_finite_is_rejected_with_path() {
        let v = Value::from_json_str(r#"{"events": [{"severity": 0.1}]}"#).unwrap();
        let mut map = v.as_object().unwrap().clone();
        map.insert("x".to_string(), Value::Array(vec![Value::Float(f64::NAN)]));

        let err = canonical_sha256(&Value::Object(map)).unwrap_err();
        assert_eq!(
            err,
            FingerprintError::NonFiniteFloat {
                path: "$.x[0]".to_string()
            }
        );
    }

    #[test]
    fn test_unavailable_marker() {
        let marker = unavailable_marker();
        assert_eq!(encode(&marker), r#"{"_":"unavailable"}"#);
        assert!(is_unavailable_marker(&marker));
        assert!(!is_unavailable_marker(&Value::Null));
    }

    #[test]
    fn test_is_sha256_hex_rejects_bad_input() {
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"G".repeat(64)));
        assert!(!is_sha256_hex(&"A".repeat(64)));
    }
}
