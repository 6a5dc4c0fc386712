// SPDX-License-Identifier: MIT OR Apache-2.0
//! Provenance records: hashes, step images, and the run transcript.
//!
//! Provenance is the record of what ran: content hashes of the source
//! document and plan, per-step output hashes, the pinned step images, and an
//! ordered transcript of every step lifecycle event observed during the run.

use crate::Scope;
use crate::hash::{ContentHash, sha256_hex};
use crate::{DeterminismGrade, StepPolicy};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Pinned implementation identity for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StepImage {
    /// Step id.
    pub step_id: String,

    /// SHA-256 of the implementation version string.
    pub image_digest: String,

    /// Pinned implementation version (`"<stepType>@1.0.0"`).
    pub implementation_version: String,
}

impl StepImage {
    /// Build the image record for a step's pinned implementation.
    #[must_use]
    pub fn new(step_id: impl Into<String>, implementation_version: impl Into<String>) -> Self {
        let implementation_version = implementation_version.into();
        Self {
            step_id: step_id.into(),
            image_digest: sha256_hex(implementation_version.as_bytes()),
            implementation_version,
        }
    }
}

/// What a transcript entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptAction {
    /// The step was dispatched.
    Started,
    /// The step succeeded.
    Completed,
    /// The step failed terminally.
    Failed,
    /// The step was canceled before or during dispatch.
    Canceled,
    /// A failed attempt is being retried.
    Retried,
}

/// One ordered entry in the run transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    /// Step this entry is about.
    pub step_id: String,

    /// When the event was observed.
    pub timestamp: DateTime<Utc>,

    /// What happened.
    pub action: TranscriptAction,

    /// Attempt duration, on `completed`/`failed` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Hash of the step's canonical outputs, on `completed` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,

    /// Policy in force when the step was dispatched, on `started` entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies_applied: Option<StepPolicy>,
}

/// The record of what ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Unique provenance identifier.
    pub id: Uuid,

    /// Run this record describes.
    pub run_id: Uuid,

    /// Source workflow id.
    pub workflow_id: String,

    /// Source workflow version.
    pub workflow_version: u64,

    /// Tenant scope, absent in library mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,

    /// Record creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Determinism grade the run achieved.
    pub determinism_grade: DeterminismGrade,

    /// Hash of the canonical source workflow.
    pub workflow_hash: ContentHash,

    /// Hash of the compiled plan the run executed.
    pub plan_hash: ContentHash,

    /// Per-step **output** hashes keyed by step id.
    ///
    /// The field name is frozen in the record format and predates the
    /// current semantics; it does not hold input hashes.
    pub input_hashes: BTreeMap<String, String>,

    /// Pinned implementation identity per step.
    pub step_images: Vec<StepImage>,

    /// Ordered transcript of step lifecycle events.
    pub transcript: Vec<TranscriptEntry>,
}

impl Provenance {
    /// Look up the step image for a step id.
    #[must_use]
    pub fn step_image(&self, step_id: &str) -> Option<&StepImage> {
        self.step_images.iter().find(|i| i.step_id == step_id)
    }

    /// Verify internal integrity: every image digest matches its
    /// implementation version, and transcript timestamps are monotone.
    #[must_use]
    pub fn verify_integrity(&self) -> bool {
        let images_ok = self
            .step_images
            .iter()
            .all(|i| i.image_digest == sha256_hex(i.implementation_version.as_bytes()));
        let transcript_ok = self
            .transcript
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp);
        images_ok && transcript_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_image_digest_is_sha256_of_version() {
        let image = StepImage::new("s1", "transform.map@1.0.0");
        assert_eq!(image.image_digest, sha256_hex(b"transform.map@1.0.0"));
        assert_eq!(image.image_digest.len(), 64);
    }

    #[test]
    fn integrity_check_catches_tampered_image() {
        let mut prov = Provenance {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            workflow_id: "wf".into(),
            workflow_version: 1,
            scope: None,
            created_at: Utc::now(),
            determinism_grade: DeterminismGrade::Pure,
            workflow_hash: ContentHash::sha256("aa"),
            plan_hash: ContentHash::sha256("bb"),
            input_hashes: BTreeMap::new(),
            step_images: vec![StepImage::new("s1", "transform.map@1.0.0")],
            transcript: vec![],
        };
        assert!(prov.verify_integrity());
        prov.step_images[0].image_digest = "0".repeat(64);
        assert!(!prov.verify_integrity());
    }

    #[test]
    fn transcript_wire_form_uses_snake_case_actions() {
        let entry = TranscriptEntry {
            step_id: "s1".into(),
            timestamp: Utc::now(),
            action: TranscriptAction::Started,
            duration_ms: None,
            output_hash: None,
            policies_applied: Some(StepPolicy::default()),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], serde_json::json!("started"));
        assert!(json["policiesApplied"].is_object());
    }

    #[test]
    fn input_hashes_field_name_is_frozen() {
        let prov = Provenance {
            id: Uuid::new_v4(),
            run_id: Uuid::new_v4(),
            workflow_id: "wf".into(),
            workflow_version: 1,
            scope: None,
            created_at: Utc::now(),
            determinism_grade: DeterminismGrade::BestEffort,
            workflow_hash: ContentHash::sha256("aa"),
            plan_hash: ContentHash::sha256("bb"),
            input_hashes: BTreeMap::from([("s1".to_string(), "cc".to_string())]),
            step_images: vec![],
            transcript: vec![],
        };
        let json = serde_json::to_value(&prov).unwrap();
        // Output hashes travel under the historical "inputHashes" key.
        assert_eq!(json["inputHashes"]["s1"], serde_json::json!("cc"));
    }
}
