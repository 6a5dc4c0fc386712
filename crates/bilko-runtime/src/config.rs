// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executor configuration and signing-key resolution.

use bilko_core::Scope;
use bilko_core::hash::sha256_hex;

/// Environment variable the attestation signing key is read from.
pub const ATTESTATION_KEY_ENV: &str = "BILKO_ATTESTATION_KEY";

/// Configuration recognized by the [`Executor`](crate::Executor).
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Emit an attestation when a run succeeds.
    pub generate_attestations: bool,

    /// Explicit signing key, overriding environment resolution.
    ///
    /// Intended for embedders and tests; when `None`, the key is resolved
    /// from [`ATTESTATION_KEY_ENV`] with a development-only fallback.
    pub signing_key: Option<Vec<u8>>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            generate_attestations: true,
            signing_key: None,
        }
    }
}

impl ExecutorConfig {
    /// Resolve the signing key and its reference string.
    ///
    /// Order: explicit key, then [`ATTESTATION_KEY_ENV`], then a
    /// deterministic key derived from the scope. The derived fallback exists
    /// so development environments work out of the box; production
    /// deployments MUST supply a real key.
    #[must_use]
    pub fn resolve_signing_key(&self, scope: Option<&Scope>) -> (Vec<u8>, String) {
        if let Some(key) = &self.signing_key {
            return (key.clone(), "config:signing-key".to_string());
        }
        if let Ok(key) = std::env::var(ATTESTATION_KEY_ENV) {
            if !key.is_empty() {
                return (key.into_bytes(), format!("env:{ATTESTATION_KEY_ENV}"));
            }
        }
        let tenant = scope.map_or("library", |s| s.tenant_id.as_str());
        let derived = sha256_hex(format!("bilko-dev-attestation-key:{tenant}").as_bytes());
        (derived.into_bytes(), format!("dev:{tenant}"))
    }
}
