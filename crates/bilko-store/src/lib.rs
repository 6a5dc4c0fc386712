// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! bilko-store
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Store trait contracts.
pub mod contract;
/// In-memory reference implementations.
pub mod memory;

pub use contract::{
    AttestationStore, EventStore, ProvenanceStore, RunStore, StoreError, StoreResult,
    WorkflowStore,
};
pub use memory::{
    MemoryAttestationStore, MemoryEventStore, MemoryProvenanceStore, MemoryRunStore,
    MemoryWorkflowStore,
};
