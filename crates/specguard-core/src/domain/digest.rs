//! Canonical JSON and spec digests.
//!
//! Object keys are ordered by UTF-16 code units, integer-valued floats are
//! written as integers and NaN/Infinity are rejected. The digest is the
//! SHA-256 hex of the canonical form.

use crate::domain::error::{Result, SpecGuardError};
use crate::domain::spec::Spec;
use sha2::{Digest, Sha256};

fn sort_keys_utf16(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    sorted.insert(key.to_string(), sort_keys_utf16(v));
                }
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(sort_keys_utf16).collect())
        }
        other => other.clone(),
    }
}

fn normalize_value(value: &serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => {
            let mut normalized = serde_json::Map::new();
            for (k, v) in map {
                normalized.insert(k.clone(), normalize_value(v)?);
            }
            Ok(serde_json::Value::Object(normalized))
        }
        serde_json::Value::Array(arr) => Ok(serde_json::Value::Array(
            arr.iter().map(normalize_value).collect::<Result<Vec<_>>>()?,
        )),
        serde_json::Value::Number(n) if n.is_f64() => {
            let f = n.as_f64().unwrap_or(f64::NAN);
            if !f.is_finite() {
                return Err(SpecGuardError::Canonicalization(
                    "NaN/Infinity not permitted in canonical JSON".to_string(),
                ));
            }
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Ok(serde_json::Value::Number(serde_json::Number::from(
                    f as i64,
                )))
            } else {
                Ok(serde_json::Value::Number(n.clone()))
            }
        }
        other => Ok(other.clone()),
    }
}

/// Convert a JSON value to canonical form: normalize numbers, sort keys, compact.
pub fn canonical_json(value: &serde_json::Value) -> Result<String> {
    let normalized = normalize_value(value)?;
    let sorted = sort_keys_utf16(&normalized);
    Ok(serde_json::to_string(&sorted)?)
}

/// SHA-256 hex digest of the canonical JSON form.
pub fn compute_digest(value: &serde_json::Value) -> Result<String> {
    let canonical = canonical_json(value)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Digest identifying the exact spec an episode was evaluated against.
pub fn spec_digest(spec: &Spec) -> Result<String> {
    compute_digest(&serde_json::to_value(spec)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_json_integer_float() {
        let input = serde_json::json!({ "value": 1.0 });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, r#"{"value":1}"#);
    }

    #[test]
    fn test_canonical_json_fractional_float() {
        let input = serde_json::json!({ "value": 1.5 });
        let canonical = canonical_json(&input).expect("canonical_json");
        assert_eq!(canonical, r#"{"value":1.5}"#);
    }

    #[test]
    fn test_canonical_json_field_order_invariant() {
        let input1 = serde_json::json!({ "outer": { "z": 1, "y": 2 }, "a": [3, 1] });
        let input2 = serde_json::json!({ "a": [3, 1], "outer": { "y": 2, "z": 1 } });
        assert_eq!(
            canonical_json(&input1).expect("canonical 1"),
            canonical_json(&input2).expect("canonical 2")
        );
    }

    #[test]
    fn test_canonical_json_array_order_preserved() {
        let input1 = serde_json::json!({ "array": [3, 1, 2] });
        let input2 = serde_json::json!({ "array": [1, 2, 3] });
        assert_ne!(
            canonical_json(&input1).expect("canonical 1"),
            canonical_json(&input2).expect("canonical 2")
        );
    }

    #[test]
    fn test_compute_digest_is_hex_sha256() {
        let input = serde_json::json!({ "id": "spec", "version": 1 });
        let digest = compute_digest(&input).expect("compute_digest");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, compute_digest(&input).expect("compute_digest"));
    }

    #[test]
    fn test_compute_digest_single_field_delta() {
        let a = serde_json::json!({ "id": "spec", "version": 1 });
        let b = serde_json::json!({ "id": "spec", "version": 2 });
        assert_ne!(
            compute_digest(&a).expect("digest a"),
            compute_digest(&b).expect("digest b")
        );
    }
}
