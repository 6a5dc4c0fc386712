// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! bilko-handlers
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cancellation registry and step execution context.
pub mod context;
/// Input contracts declared by handlers and checked at compile time.
pub mod contract;
/// The step handler trait and failure signals.
pub mod handler;
/// Handler registry, process-wide and embeddable.
pub mod registry;

pub use context::{CancelProbe, CancelRegistry, StepContext};
pub use contract::{ContractField, EnumSource, FieldType, InputContract};
pub use handler::{HandlerFailure, StepHandler, StepOutputs};
pub use registry::{
    HandlerRegistry, get_step_handler, global_registry, register_step_handler,
    registered_handlers,
};
