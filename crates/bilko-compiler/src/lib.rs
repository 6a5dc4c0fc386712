// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! bilko-compiler
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The compilation pipeline.
pub mod compiler;
/// Determinism rules and achievable-grade derivation.
pub mod determinism;
/// Schema, graph, and determinism validation.
pub mod validator;

pub use compiler::{CompilationResult, compile_workflow, validate_handlers};
pub use validator::{ValidationResult, validate_workflow};
