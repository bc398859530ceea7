// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription-driven availability monitoring for the ovhsnap engine.

pub mod price;
pub mod runner;

pub use price::{format_price, price_key, PriceCache, PRICE_CACHE_TTL, PRICE_QUOTE_TIMEOUT};
pub use runner::{MonitorRunner, MonitorStatus, MIN_MONITOR_INTERVAL};
