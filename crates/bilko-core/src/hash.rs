// SPDX-License-Identifier: MIT OR Apache-2.0
//! Canonical JSON and SHA-256 content addressing.
//!
//! Every hash in bilko-flow is computed over the canonical form: object keys
//! sorted at every level, no insignificant whitespace, serde_json's stable
//! number formatting. Two structurally equal values always hash equal, which
//! is what allows cross-implementation verification of plans, provenance,
//! and attestations.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Algorithm tag carried alongside every digest.
pub const HASH_ALGORITHM: &str = "sha-256";

/// Errors from canonicalization and hashing.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// JSON serialization or deserialization failed.
    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// An algorithm-tagged hex digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContentHash {
    /// Digest algorithm, always [`HASH_ALGORITHM`].
    pub algorithm: String,

    /// Lowercase hex digest.
    pub hex: String,
}

impl ContentHash {
    /// Wrap a precomputed hex digest.
    #[must_use]
    pub fn sha256(hex: impl Into<String>) -> Self {
        Self {
            algorithm: HASH_ALGORITHM.to_string(),
            hex: hex.into(),
        }
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Produce a deterministic JSON string for hashing.
///
/// This is not a full JCS implementation, but it is stable for our types:
/// keys are sorted (serde_json's Map is a BTreeMap by default) and numbers
/// are serialized consistently by serde_json.
///
/// # Errors
///
/// Returns [`ContractError::Json`] if the value cannot be serialized.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, ContractError> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&v)?)
}

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hash a value's canonical JSON form into a tagged [`ContentHash`].
///
/// # Examples
///
/// ```
/// let h = bilko_core::hash::content_hash(&serde_json::json!({"b": 1, "a": 2})).unwrap();
/// assert_eq!(h.algorithm, "sha-256");
/// assert_eq!(h.hex.len(), 64);
/// ```
///
/// # Errors
///
/// Returns [`ContractError::Json`] if the value cannot be serialized.
pub fn content_hash<T: Serialize>(value: &T) -> Result<ContentHash, ContractError> {
    let json = canonical_json(value)?;
    Ok(ContentHash::sha256(sha256_hex(json.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a: serde_json::Value = serde_json::from_str(r#"{"x": 1, "y": {"b": 2, "a": 3}}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"y": {"a": 3, "b": 2}, "x": 1}"#).unwrap();
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn any_field_change_changes_hash() {
        let a = json!({"value": 1});
        let b = json!({"value": 2});
        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn sha256_of_known_input() {
        // sha256("") is a fixed vector.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn display_includes_algorithm_tag() {
        let h = ContentHash::sha256("abc123");
        assert_eq!(h.to_string(), "sha-256:abc123");
    }

    #[test]
    fn canonical_json_strips_whitespace() {
        let v: serde_json::Value = serde_json::from_str("{ \"a\" : 1 }").unwrap();
        assert_eq!(canonical_json(&v).unwrap(), r#"{"a":1}"#);
    }

    mod properties {
        use super::super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        proptest! {
            #[test]
            fn hashing_is_stable_over_arbitrary_maps(
                map in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8)
            ) {
                let first = content_hash(&map).unwrap();
                let second = content_hash(&map.clone()).unwrap();
                prop_assert_eq!(&first, &second);
                prop_assert_eq!(first.hex.len(), 64);
                prop_assert!(first.hex.bytes().all(|b| b.is_ascii_hexdigit()));
            }

            #[test]
            fn inserting_a_key_changes_the_hash(
                map in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8)
            ) {
                let base = content_hash(&map).unwrap();
                let mut grown: BTreeMap<String, i64> = map;
                grown.insert("zz-probe".to_string(), 1);
                prop_assert_ne!(base, content_hash(&grown).unwrap());
            }
        }
    }
}
