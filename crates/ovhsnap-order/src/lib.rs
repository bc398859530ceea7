// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OVH cart/checkout protocol for the ovhsnap engine.
//!
//! Implements [`ovhsnap_core::OrderPlacer`] (full order sequence) and
//! [`ovhsnap_core::PriceQuoter`] (preview-only pricing) over the shared
//! client pool.

pub mod driver;

pub use driver::{OrderDriver, RequiredConfiguration, ORDER_TIMEOUT};
