// SPDX-License-Identifier: MIT OR Apache-2.0
//! HMAC-signed attestations over provenance records.
//!
//! An attestation is a signed statement a third party can verify: it binds
//! the workflow hash, per-step input hashes, step-image digests, artifact
//! hashes, and the achieved determinism grade under an HMAC-SHA256
//! signature computed over the canonical JSON of the statement.

use crate::Scope;
use crate::hash::{ContentHash, ContractError, canonical_json};
use crate::DeterminismGrade;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Signature algorithm tag carried by every attestation.
pub const SIGNATURE_ALGORITHM: &str = "hmac-sha256";

type HmacSha256 = Hmac<Sha256>;

/// Lifecycle state of an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttestationStatus {
    /// Signed and published.
    Issued,
    /// Withdrawn after issuance.
    Revoked,
}

/// What the attestation is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttestationSubject {
    /// Attested run.
    pub run_id: Uuid,

    /// Source workflow id.
    pub workflow_id: String,

    /// Source workflow version.
    pub workflow_version: u64,

    /// Provenance record the statement was derived from.
    pub provenance_id: Uuid,
}

/// The signed claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttestationStatement {
    /// Hash of the canonical source workflow.
    pub workflow_hash: ContentHash,

    /// Per-step input hashes keyed by step id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub step_input_hashes: BTreeMap<String, String>,

    /// Step-image digests keyed by step id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub step_image_digests: BTreeMap<String, String>,

    /// Hashes of artifacts the run produced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifact_hashes: Vec<String>,

    /// Determinism grade the run achieved.
    pub determinism_grade: DeterminismGrade,
}

/// A signed statement over a run's provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// Unique attestation identifier.
    pub id: Uuid,

    /// Attested run.
    pub run_id: Uuid,

    /// Subject binding.
    pub subject: AttestationSubject,

    /// Lifecycle state.
    pub status: AttestationStatus,

    /// The signed claims.
    pub statement: AttestationStatement,

    /// Signature algorithm, always [`SIGNATURE_ALGORITHM`].
    pub signature_algorithm: String,

    /// Hex HMAC-SHA256 over the canonical statement.
    pub signature: String,

    /// Reference to the verification key (not the key itself).
    pub verification_key_ref: String,

    /// Tenant scope, absent in library mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    /// Issuance timestamp.
    pub issued_at: DateTime<Utc>,
}

/// Sign a statement with the given key.
///
/// The signed bytes are the canonical JSON of the statement: top-level keys
/// sorted, no insignificant whitespace. Any verifier that canonicalizes the
/// same way can check the signature independently.
///
/// # Errors
///
/// Returns [`ContractError::Json`] if the statement cannot be serialized.
pub fn sign_statement(key: &[u8], statement: &AttestationStatement) -> Result<String, ContractError> {
    let canonical = canonical_json(statement)?;
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts arbitrary key lengths");
    mac.update(canonical.as_bytes());
    let bytes = mac.finalize().into_bytes();
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

/// Verify a statement signature in constant time.
///
/// # Errors
///
/// Returns [`ContractError::Json`] if the statement cannot be serialized.
pub fn verify_signature(
    key: &[u8],
    statement: &AttestationStatement,
    signature_hex: &str,
) -> Result<bool, ContractError> {
    let canonical = canonical_json(statement)?;
    let mut mac =
        HmacSha256::new_from_slice(key).expect("HMAC-SHA256 accepts arbitrary key lengths");
    mac.update(canonical.as_bytes());
    let Ok(expected) = decode_hex(signature_hex) else {
        return Ok(false);
    };
    Ok(mac.verify_slice(&expected).is_ok())
}

fn decode_hex(s: &str) -> Result<Vec<u8>, ()> {
    if !s.is_ascii() || s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement() -> AttestationStatement {
        AttestationStatement {
            workflow_hash: ContentHash::sha256("ab".repeat(32)),
            step_input_hashes: BTreeMap::from([("s1".to_string(), "cd".repeat(32))]),
            step_image_digests: BTreeMap::from([("s1".to_string(), "ef".repeat(32))]),
            artifact_hashes: vec![],
            determinism_grade: DeterminismGrade::Replayable,
        }
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let sig = sign_statement(b"test-key", &statement()).unwrap();
        assert_eq!(sig.len(), 64);
        assert!(verify_signature(b"test-key", &statement(), &sig).unwrap());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let sig = sign_statement(b"key-a", &statement()).unwrap();
        assert!(!verify_signature(b"key-b", &statement(), &sig).unwrap());
    }

    #[test]
    fn tampered_statement_fails_verification() {
        let sig = sign_statement(b"key", &statement()).unwrap();
        let mut tampered = statement();
        tampered.determinism_grade = DeterminismGrade::BestEffort;
        assert!(!verify_signature(b"key", &tampered, &sig).unwrap());
    }

    #[test]
    fn malformed_signature_hex_is_rejected_not_an_error() {
        assert!(!verify_signature(b"key", &statement(), "zz").unwrap());
        assert!(!verify_signature(b"key", &statement(), "abc").unwrap());
    }

    #[test]
    fn signing_is_deterministic() {
        let a = sign_statement(b"key", &statement()).unwrap();
        let b = sign_statement(b"key", &statement()).unwrap();
        assert_eq!(a, b);
    }
}
