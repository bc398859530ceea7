// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter seams between the scheduling components and the OVH protocol
//! crates. The queue scheduler and availability monitor consume these traits
//! so their behavior is testable without a live OVH endpoint.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::SnapError;
use crate::types::{Account, AvailabilityState, OrderResult, Price};

/// Outbound notification sink. Implementations must never block callers on
/// delivery problems: log and drop.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), SnapError>;
}

/// A notifier that discards everything. Used in tests and when no Telegram
/// credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _text: &str) -> Result<(), SnapError> {
        Ok(())
    }
}

/// Per-datacenter availability lookup for a plan/option combination.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    /// Returns the availability state for each requested datacenter. An empty
    /// `datacenters` slice requests every datacenter the plan reports.
    async fn probe(
        &self,
        account: &Account,
        plan_code: &str,
        options: &[String],
        datacenters: &[String],
    ) -> Result<HashMap<String, AvailabilityState>, SnapError>;
}

/// Executes one cart/checkout sequence against OVH.
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    async fn place_order(
        &self,
        account: &Account,
        plan_code: &str,
        datacenter: &str,
        options: &[String],
        auto_pay: bool,
    ) -> Result<OrderResult, SnapError>;
}

/// Best-effort price lookup (cart preview without checkout).
#[async_trait]
pub trait PriceQuoter: Send + Sync {
    async fn quote(
        &self,
        account: &Account,
        plan_code: &str,
        datacenter: &str,
        options: &[String],
    ) -> Result<Price, SnapError>;
}
