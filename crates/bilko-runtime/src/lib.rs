// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! bilko-runtime
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Retry backoff computation.
pub mod backoff;
/// Executor configuration and signing-key resolution.
pub mod config;
/// The run executor.
pub mod executor;
/// Single-step execution under policy.
pub mod runner;

pub use backoff::{BACKOFF_CAP_MS, compute_backoff};
pub use config::{ATTESTATION_KEY_ENV, ExecutorConfig};
pub use executor::{CreateRunRequest, Executor, ExecutorError, TestWorkflowReport};
pub use runner::{StepRun, run_step};
