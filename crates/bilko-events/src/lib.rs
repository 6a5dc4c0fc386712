// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! bilko-events
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The publisher and its subscription model.
pub mod publisher;

pub use publisher::{EventPublisher, Subscription, SubscriptionGuard};
