// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types for the ovhsnap acquisition engine.
//!
//! Defines the error taxonomy, the persisted/wire domain entities, and the
//! adapter traits that seam the queue scheduler and availability monitor off
//! the OVH protocol crates.

pub mod error;
pub mod traits;
pub mod types;

pub use error::SnapError;
pub use traits::{AvailabilityProbe, Notifier, NullNotifier, OrderPlacer, PriceQuoter};
pub use types::{
    Account, AvailabilityState, ChangeType, DcStatus, EndpointRegion, HistoryStatus, OrderResult,
    Price, PurchaseHistoryEntry, QueueTask, Subscription, SubscriptionEvent, TaskStatus,
};
