// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! bilko-planner
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The certification suite and a deterministic reference planner.
pub mod certify;
/// Patch application and untrusted-input validation.
pub mod patch;
/// The planner contract and its wire types.
pub mod protocol;

pub use certify::{CertificationReport, CertificationTest, ScriptedPlanner, certify_planner};
pub use patch::{apply_patch, validate_patch, validate_proposal};
pub use protocol::{
    Confidence, PlanExplanation, Planner, PlannerVersionInfo, RepairRequest, StepUpdate,
    WorkflowPatch, WorkflowProposal,
};
