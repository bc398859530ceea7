// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OVH API access for the ovhsnap engine: the signed per-account client
//! pool and the availability probe with its short-lived reading cache.

pub mod cache;
pub mod client;
pub mod pool;
pub mod probe;

pub use cache::{AvailabilityCache, CacheKey, CACHE_CAP, CACHE_TTL};
pub use client::{OvhClient, CALL_TIMEOUT};
pub use pool::ClientPool;
pub use probe::{option_fingerprint, ProbeService};
