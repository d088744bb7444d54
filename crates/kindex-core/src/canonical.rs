//! # Canonical Serialization — JCS-Compatible Byte Production
//!
//! `CanonicalBytes` is the sole construction path for bytes that are hashed
//! anywhere in the engine: catalog fingerprints, synthetic instance keys and
//! configuration snapshot digests.
//!
//! ## Invariant
//!
//! The inner `Vec<u8>` is private. The only constructor applies the number
//! coercion below and then serializes with `serde_jcs` (RFC 8785): sorted
//! keys, compact separators, deterministic byte sequence. Two values that
//! are equal as configuration therefore always hash identically.
//!
//! ## Number coercion
//!
//! Controllers are inconsistent about integral numbers: the same port may
//! arrive as `80` or `80.0`. Floats with a zero fractional part that fit in
//! an `i64` are folded to integers before serialization. Every other number
//! passes through unchanged.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization with integral-float
/// folding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::SerializationFailed` if the value
    /// cannot be represented as JSON.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        let coerced = coerce_json_value(value);
        let bytes = serialize_canonical(&coerced)?;
        Ok(Self(bytes))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn coerce_json_value(value: Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::String(_) => value,
        Value::Number(ref n) => {
            if n.is_f64() {
                if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                        return Value::from(f as i64);
                    }
                }
            }
            value
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, coerce_json_value(v)))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(arr.into_iter().map(coerce_json_value).collect()),
    }
}

fn serialize_canonical(value: &Value) -> Result<Vec<u8>, CanonicalizationError> {
    let s = serde_jcs::to_string(value)?;
    Ok(s.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_bytes_sorted_keys() {
        let data = serde_json::json!({"z": 1, "m": 2, "a": 3});
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"a":3,"m":2,"z":1}"#);
    }

    #[test]
    fn test_canonical_bytes_nested() {
        let data = serde_json::json!({
            "servers": [{"port": 80, "ip": "10.0.0.1"}],
            "name": "pool-a"
        });
        let cb = CanonicalBytes::new(&data).unwrap();
        let s = std::str::from_utf8(cb.as_bytes()).unwrap();
        assert_eq!(s, r#"{"name":"pool-a","servers":[{"ip":"10.0.0.1","port":80}]}"#);
    }

    #[test]
    fn test_integral_float_folded() {
        let a = CanonicalBytes::new(&serde_json::json!({"port": 80.0})).unwrap();
        let b = CanonicalBytes::new(&serde_json::json!({"port": 80})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_bytes(), br#"{"port":80}"#);
    }

    #[test]
    fn test_fractional_float_kept() {
        let cb = CanonicalBytes::new(&serde_json::json!({"weight": 1.5})).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"weight":1.5}"#);
    }

    #[test]
    fn test_null_and_bool_passthrough() {
        let data = serde_json::json!({"flag": true, "key": null});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"flag":true,"key":null}"#);
    }

    #[test]
    fn test_empty_object() {
        let cb = CanonicalBytes::new(&serde_json::json!({})).unwrap();
        assert_eq!(cb.as_bytes(), b"{}");
        assert!(!cb.is_empty());
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let mut a = serde_json::Map::new();
        a.insert("b".into(), Value::from(2));
        a.insert("a".into(), Value::from(1));
        let mut b = serde_json::Map::new();
        b.insert("a".into(), Value::from(1));
        b.insert("b".into(), Value::from(2));
        assert_eq!(
            CanonicalBytes::new(&a).unwrap(),
            CanonicalBytes::new(&b).unwrap()
        );
    }
}
