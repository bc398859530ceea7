// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request and response bodies for the control plane.

use serde::{Deserialize, Serialize};

use ovhsnap_core::types::{MAX_QUANTITY, MIN_QUANTITY, MIN_RETRY_INTERVAL};
use ovhsnap_core::{QueueTask, TaskStatus};

use crate::error::ApiError;

/// Body of `POST /queue` and `PUT /queue/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub plan_code: String,
    pub datacenters: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
    pub quantity: u32,
    pub retry_interval: u64,
    #[serde(default)]
    pub auto_pay: bool,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl TaskRequest {
    /// Boundary validation per the documented limits.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.plan_code.trim().is_empty() {
            return Err(ApiError::bad_request("planCode must not be empty"));
        }
        if self.datacenters.is_empty() {
            return Err(ApiError::bad_request("datacenters must not be empty"));
        }
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&self.quantity) {
            return Err(ApiError::bad_request(format!(
                "quantity must be between {MIN_QUANTITY} and {MAX_QUANTITY}, got {}",
                self.quantity
            )));
        }
        if self.retry_interval < MIN_RETRY_INTERVAL {
            return Err(ApiError::bad_request(format!(
                "retryInterval must be at least {MIN_RETRY_INTERVAL} seconds, got {}",
                self.retry_interval
            )));
        }
        Ok(())
    }
}

/// Body of `PUT /queue/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: TaskStatus,
}

/// `?scope=self|all` query.
#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    #[serde(default)]
    pub scope: Option<String>,
}

impl ScopeQuery {
    pub fn is_all(&self) -> bool {
        self.scope.as_deref() == Some("all")
    }
}

/// Query of `GET /queue/paged`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Response of `GET /queue/paged`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedTasks {
    pub items: Vec<QueueTask>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Response of bulk deletes.
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: usize,
}

/// Response of `GET /stats`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub paused_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub total_purchased: u64,
    pub history_entries: usize,
    pub history_success: usize,
    pub history_failed: usize,
    pub subscriptions: usize,
    pub monitor_running: bool,
}

/// Body of subscription create/update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub account_id: Option<String>,
    pub plan_code: String,
    #[serde(default)]
    pub ovh_subsidiary: Option<String>,
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
}

fn default_true() -> bool {
    true
}

impl SubscriptionRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.plan_code.trim().is_empty() {
            return Err(ApiError::bad_request("planCode must not be empty"));
        }
        Ok(())
    }
}

/// Body of `PUT /vps-monitor/interval`.
#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    pub seconds: u64,
}
