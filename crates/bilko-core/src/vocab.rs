// SPDX-License-Identifier: MIT OR Apache-2.0
//! Step-type vocabulary and category predicates.
//!
//! Determinism analysis needs to know which step types reach out of process
//! and which invoke models, independently of which handlers happen to be
//! registered. Category membership is by namespace prefix plus an explicit
//! registered set, so a plug-in type like `http.graphql` is classified
//! correctly without touching this table.

/// Step types that call external HTTP APIs.
pub const EXTERNAL_API_TYPES: &[&str] = &["http.get", "http.post", "http.search", "http.webhook"];

/// Step types that invoke AI models.
pub const AI_TYPES: &[&str] = &["ai.complete", "ai.classify", "ai.extract", "ai.embed"];

/// Pure data-shaping step types.
pub const TRANSFORM_TYPES: &[&str] = &["transform.map", "transform.filter", "transform.merge"];

/// Returns `true` when the step type calls external APIs.
#[must_use]
pub fn is_external_api_type(step_type: &str) -> bool {
    step_type.starts_with("http.") || EXTERNAL_API_TYPES.contains(&step_type)
}

/// Returns `true` when the step type invokes an AI model.
#[must_use]
pub fn is_ai_type(step_type: &str) -> bool {
    step_type.starts_with("ai.") || AI_TYPES.contains(&step_type)
}

/// Returns `true` when the step type is a pure transform.
#[must_use]
pub fn is_transform_type(step_type: &str) -> bool {
    step_type.starts_with("transform.") || TRANSFORM_TYPES.contains(&step_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_classify_unregistered_types() {
        assert!(is_external_api_type("http.graphql"));
        assert!(is_ai_type("ai.rank"));
        assert!(is_transform_type("transform.flatten"));
    }

    #[test]
    fn categories_are_disjoint_for_known_types() {
        for t in EXTERNAL_API_TYPES {
            assert!(!is_ai_type(t));
            assert!(!is_transform_type(t));
        }
        for t in AI_TYPES {
            assert!(!is_external_api_type(t));
        }
    }
}
