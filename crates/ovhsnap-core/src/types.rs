// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain entities shared across the acquisition engine.
//!
//! Persisted and wire-level representations are the same structs: camelCase
//! field names, unknown fields ignored on read, `None` fields omitted on
//! write.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Floor for a queue task's retry interval, in seconds.
pub const MIN_RETRY_INTERVAL: u64 = 15;

/// Ceiling applied to the 429 backoff, in seconds.
pub const MAX_BACKOFF_INTERVAL: u64 = 600;

/// Inclusive bounds for a queue task's unit count.
pub const MIN_QUANTITY: u32 = 1;
/// Upper bound for a queue task's unit count.
pub const MAX_QUANTITY: u32 = 100;

/// Soft cap on persisted purchase-history entries; older entries are trimmed.
pub const HISTORY_CAP: usize = 10_000;

/// Cap on per-subscription change-event history.
pub const SUBSCRIPTION_HISTORY_CAP: usize = 100;

/// Maximum length of a persisted error message.
pub const ERROR_MESSAGE_CAP: usize = 500;

/// OVH API endpoint region, selecting the API root URL for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointRegion {
    #[serde(rename = "ovh-eu")]
    OvhEu,
    #[serde(rename = "ovh-us")]
    OvhUs,
    #[serde(rename = "ovh-ca")]
    OvhCa,
}

impl EndpointRegion {
    /// API root for this region.
    pub fn base_url(&self) -> &'static str {
        match self {
            EndpointRegion::OvhEu => "https://eu.api.ovh.com/1.0",
            EndpointRegion::OvhUs => "https://api.us.ovhcloud.com/1.0",
            EndpointRegion::OvhCa => "https://ca.api.ovh.com/1.0",
        }
    }
}

/// An OVH account with application credentials.
///
/// Keys are immutable after creation; the struct is read-only to everything
/// but account CRUD.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub alias: String,
    /// OVH subsidiary (IE, FR, US, CA, ...); chooses catalog and currency.
    pub zone: String,
    pub endpoint_region: EndpointRegion,
    pub application_key: String,
    pub application_secret: String,
    pub consumer_key: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("alias", &self.alias)
            .field("zone", &self.zone)
            .field("endpoint_region", &self.endpoint_region)
            .field("application_key", &"[redacted]")
            .field("application_secret", &"[redacted]")
            .field("consumer_key", &"[redacted]")
            .finish()
    }
}

/// Queue task lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal states hold no further scheduler activity until restarted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the operator may move a task from `self` to `to`.
    ///
    /// Restart (any state back to running with counters reset) is a separate
    /// operation and is always permitted.
    pub fn can_transition(&self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Running) | (Running, Paused) | (Paused, Running)
        )
    }
}

/// A standing purchase intent: buy `quantity` units of `plan_code` in the
/// first available datacenter, retrying every `retry_interval` seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueTask {
    pub id: String,
    pub account_id: String,
    pub plan_code: String,
    /// Ordered by priority; the earliest available datacenter wins.
    pub datacenters: Vec<String>,
    /// Option codes chosen beyond the plan's defaults.
    #[serde(default)]
    pub options: Vec<String>,
    pub quantity: u32,
    /// Seconds between attempts; never below [`MIN_RETRY_INTERVAL`].
    pub retry_interval: u64,
    #[serde(default)]
    pub auto_pay: bool,
    pub status: TaskStatus,
    #[serde(default)]
    pub retry_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub purchased: u32,
    /// Epoch seconds of the next scheduled attempt.
    pub next_attempt_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueTask {
    /// Build a new task in the running state, due immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account_id: impl Into<String>,
        plan_code: impl Into<String>,
        datacenters: Vec<String>,
        options: Vec<String>,
        quantity: u32,
        retry_interval: u64,
        auto_pay: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            plan_code: plan_code.into(),
            datacenters,
            options,
            quantity,
            retry_interval,
            auto_pay,
            status: TaskStatus::Running,
            retry_count: 0,
            failure_count: 0,
            purchased: 0,
            next_attempt_at: now.timestamp(),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stamp a mutation and reschedule the next attempt one interval out.
    pub fn schedule_next(&mut self, now: i64) {
        self.next_attempt_at = now + self.retry_interval as i64;
        self.updated_at = Utc::now();
    }

    /// Reset runtime counters for a restart.
    pub fn reset_for_restart(&mut self) {
        let now = Utc::now();
        self.status = TaskStatus::Running;
        self.retry_count = 0;
        self.failure_count = 0;
        self.purchased = 0;
        self.last_error = None;
        self.next_attempt_at = now.timestamp();
        self.updated_at = now;
    }
}

/// Price breakdown captured from the cart checkout preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub with_tax: f64,
    pub without_tax: f64,
    pub tax: f64,
    pub currency_code: String,
}

/// Outcome classification of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HistoryStatus {
    Success,
    Failed,
}

/// One recorded purchase attempt outcome. Append-only from the scheduler's
/// perspective; clearable by the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseHistoryEntry {
    pub id: String,
    pub task_id: String,
    pub account_id: String,
    pub plan_code: String,
    pub datacenter: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub status: HistoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// 1-based ordinal of this success for its task; 0 for failures.
    pub sequence: u32,
    pub purchase_time: DateTime<Utc>,
}

/// Truncate an upstream error message to the persisted cap.
pub fn truncate_error_message(message: &str) -> String {
    if message.len() <= ERROR_MESSAGE_CAP {
        message.to_string()
    } else {
        let mut end = ERROR_MESSAGE_CAP;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message[..end].to_string()
    }
}

/// Last observed availability for one datacenter of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DcStatus {
    pub available: bool,
    pub last_seen_at: DateTime<Utc>,
}

/// Direction of an availability change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChangeType {
    Available,
    Unavailable,
}

/// One availability transition recorded in a subscription's bounded history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    pub timestamp: DateTime<Utc>,
    pub datacenter: String,
    pub change_type: ChangeType,
    /// `None` on the first observation of this datacenter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<bool>,
}

/// A standing availability watch for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub plan_code: String,
    pub ovh_subsidiary: String,
    /// Empty means all datacenters reported for the plan.
    #[serde(default)]
    pub datacenters: Vec<String>,
    #[serde(default = "default_true")]
    pub monitor_linux: bool,
    #[serde(default)]
    pub monitor_windows: bool,
    #[serde(default = "default_true")]
    pub notify_available: bool,
    #[serde(default)]
    pub notify_unavailable: bool,
    #[serde(default)]
    pub last_status: BTreeMap<String, DcStatus>,
    #[serde(default)]
    pub history: Vec<SubscriptionEvent>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Subscription {
    /// Append a change event, trimming to the newest
    /// [`SUBSCRIPTION_HISTORY_CAP`] entries.
    pub fn push_event(&mut self, event: SubscriptionEvent) {
        self.history.push(event);
        if self.history.len() > SUBSCRIPTION_HISTORY_CAP {
            let excess = self.history.len() - SUBSCRIPTION_HISTORY_CAP;
            self.history.drain(..excess);
        }
    }
}

/// Per-datacenter availability as reported by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AvailabilityState {
    Available,
    Unavailable,
    Unknown,
}

impl AvailabilityState {
    /// Map OVH's free-text availability bucket onto the tri-state.
    ///
    /// Anything other than `unavailable`, `unknown`, or empty counts as
    /// available (`1H`, `24H`, `72H`, `high`, `low`, ...).
    pub fn from_bucket(bucket: &str) -> Self {
        match bucket {
            "" | "unavailable" | "unknown" => AvailabilityState::Unavailable,
            _ => AvailabilityState::Available,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityState::Available)
    }
}

/// Result of a completed checkout.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order_id: i64,
    pub url: String,
    pub price: Option<Price>,
    /// Set when `autoPay` was requested but payment did not go through; the
    /// order itself still exists.
    pub payment_error: Option<String>,
}
