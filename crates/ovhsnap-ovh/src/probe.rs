// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Availability probe over OVH's datacenter-availabilities endpoint.
//!
//! OVH reports one row per hardware/option combination, identified by an
//! `fqn` of the form `planCode.option.option...`. The probe matches rows by
//! a stable fingerprint of the sorted option-code set: an unmatched
//! fingerprint reads as `unknown` for every requested datacenter. A task
//! with no chosen options targets the default configuration, so the probe
//! aggregates across all of the plan's rows in that case.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use ovhsnap_core::{Account, AvailabilityProbe, AvailabilityState, SnapError};

use crate::cache::{AvailabilityCache, CacheKey};
use crate::pool::ClientPool;

/// One fqn row of the availabilities response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailabilityRow {
    #[serde(default)]
    plan_code: String,
    #[serde(default)]
    fqn: String,
    #[serde(default)]
    datacenters: Vec<DatacenterAvailability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatacenterAvailability {
    datacenter: String,
    availability: String,
}

/// Stable fingerprint of a set of option codes (order-insensitive).
pub fn option_fingerprint(options: &[String]) -> u64 {
    let mut sorted: Vec<&str> = options.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();
    hash_codes(&sorted)
}

/// Fingerprint of an fqn's option segments, or `None` when the fqn does not
/// belong to the plan.
fn fqn_fingerprint(fqn: &str, plan_code: &str) -> Option<u64> {
    let rest = fqn.strip_prefix(plan_code)?;
    if !rest.is_empty() && !rest.starts_with('.') {
        return None;
    }
    let mut segments: Vec<&str> = rest.split('.').filter(|s| !s.is_empty()).collect();
    segments.sort_unstable();
    segments.dedup();
    Some(hash_codes(&segments))
}

fn hash_codes(codes: &[&str]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for code in codes {
        code.hash(&mut hasher);
    }
    hasher.finish()
}

/// Probe service backed by the shared client pool and a 30-second cache.
pub struct ProbeService {
    pool: Arc<ClientPool>,
    cache: AvailabilityCache,
}

impl ProbeService {
    pub fn new(pool: Arc<ClientPool>) -> Self {
        Self {
            pool,
            cache: AvailabilityCache::new(),
        }
    }

    /// Custom cache limits (tests).
    pub fn with_cache(pool: Arc<ClientPool>, cache: AvailabilityCache) -> Self {
        Self { pool, cache }
    }

    async fn fetch_states(
        &self,
        account: &Account,
        plan_code: &str,
        options: &[String],
        fingerprint: u64,
    ) -> Result<HashMap<String, AvailabilityState>, SnapError> {
        let client = self.pool.client_for(account)?;
        let rows: Vec<AvailabilityRow> = client
            .get_json(&format!(
                "/dedicated/server/datacenter/availabilities?planCode={plan_code}"
            ))
            .await?;
        Ok(collate(plan_code, options, fingerprint, &rows))
    }
}

#[async_trait]
impl AvailabilityProbe for ProbeService {
    async fn probe(
        &self,
        account: &Account,
        plan_code: &str,
        options: &[String],
        datacenters: &[String],
    ) -> Result<HashMap<String, AvailabilityState>, SnapError> {
        let fingerprint = option_fingerprint(options);
        let key = CacheKey {
            region: account.endpoint_region,
            plan_code: plan_code.to_string(),
            fingerprint,
        };

        let states = match self.cache.get(&key) {
            Some(hit) => {
                debug!(plan_code, fingerprint, "availability cache hit");
                hit
            }
            None => {
                let states = self
                    .fetch_states(account, plan_code, options, fingerprint)
                    .await?;
                self.cache.insert(key, states.clone());
                states
            }
        };

        if datacenters.is_empty() {
            return Ok(states);
        }
        Ok(datacenters
            .iter()
            .map(|dc| {
                (
                    dc.clone(),
                    states
                        .get(dc)
                        .copied()
                        .unwrap_or(AvailabilityState::Unknown),
                )
            })
            .collect())
    }
}

/// Reduce the plan's fqn rows to one per-datacenter state map.
fn collate(
    plan_code: &str,
    options: &[String],
    fingerprint: u64,
    rows: &[AvailabilityRow],
) -> HashMap<String, AvailabilityState> {
    let relevant: Vec<&AvailabilityRow> =
        rows.iter().filter(|r| r.plan_code == plan_code).collect();

    if options.is_empty() {
        // Default configuration: a datacenter counts as available when any
        // hardware combination of the plan has stock there.
        let mut states: HashMap<String, AvailabilityState> = HashMap::new();
        for row in relevant {
            for dc in &row.datacenters {
                let state = AvailabilityState::from_bucket(&dc.availability);
                let entry = states
                    .entry(dc.datacenter.clone())
                    .or_insert(AvailabilityState::Unavailable);
                if state.is_available() {
                    *entry = AvailabilityState::Available;
                }
            }
        }
        return states;
    }

    match relevant
        .iter()
        .find(|row| fqn_fingerprint(&row.fqn, plan_code) == Some(fingerprint))
    {
        Some(row) => row
            .datacenters
            .iter()
            .map(|dc| {
                (
                    dc.datacenter.clone(),
                    AvailabilityState::from_bucket(&dc.availability),
                )
            })
            .collect(),
        None => HashMap::new(),
    }
}
