// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the control plane.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;

use ovhsnap_core::{
    HistoryStatus, PurchaseHistoryEntry, QueueTask, Subscription, TaskStatus,
};
use ovhsnap_monitor::MonitorStatus;

use crate::error::ApiError;
use crate::models::{
    DeletedResponse, IntervalRequest, PageQuery, PagedTasks, ScopeQuery, StatsResponse,
    StatusRequest, SubscriptionRequest, TaskRequest,
};
use crate::server::AppState;

/// Fallback account context when `X-OVH-Account` is absent.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Resolve the active account id from the `X-OVH-Account` header.
fn account_scope(headers: &HeaderMap) -> String {
    headers
        .get("x-ovh-account")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_ACCOUNT_ID)
        .to_string()
}

/// Resolve and verify the account a task/subscription body refers to.
async fn resolve_account_id(
    state: &AppState,
    headers: &HeaderMap,
    explicit: Option<&str>,
) -> Result<String, ApiError> {
    let id = explicit
        .map(str::to_string)
        .unwrap_or_else(|| account_scope(headers));
    if state.store.get_account(&id).await.is_none() {
        return Err(ApiError::bad_request(format!("unknown account: {id}")));
    }
    Ok(id)
}

// ---- Queue ----

/// GET /queue?scope=self|all
pub async fn list_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<QueueTask>>, ApiError> {
    let mut tasks = state.store.queue().load().await;
    if !query.is_all() {
        let account = account_scope(&headers);
        tasks.retain(|t| t.account_id == account);
    }
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(Json(tasks))
}

/// GET /queue/paged?status=…&page=…&pageSize=…
pub async fn paged_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedTasks>, ApiError> {
    let mut tasks = state.store.queue().load().await;
    if query.scope.as_deref() != Some("all") {
        let account = account_scope(&headers);
        tasks.retain(|t| t.account_id == account);
    }
    if let Some(status) = query.status {
        tasks.retain(|t| t.status == status);
    }
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).clamp(1, 200);
    let total = tasks.len();
    let items = tasks
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Ok(Json(PagedTasks {
        items,
        total,
        page,
        page_size,
    }))
}

/// POST /queue
pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TaskRequest>,
) -> Result<(StatusCode, Json<QueueTask>), ApiError> {
    body.validate()?;
    let account_id = resolve_account_id(&state, &headers, body.account_id.as_deref()).await?;

    let task = QueueTask::new(
        account_id,
        body.plan_code,
        body.datacenters,
        body.options,
        body.quantity,
        body.retry_interval,
        body.auto_pay,
    );
    let created = task.clone();
    state
        .store
        .queue()
        .mutate(move |tasks| {
            tasks.push(task);
            Ok(())
        })
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /queue/{id} — config update; rejected while an attempt is in flight.
pub async fn update_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<TaskRequest>,
) -> Result<Json<QueueTask>, ApiError> {
    body.validate()?;
    if state.scheduler.attempt_in_flight(&id) {
        return Err(ApiError::conflict("an order attempt is in progress"));
    }
    let account_id = resolve_account_id(&state, &headers, body.account_id.as_deref()).await?;

    let updated = state
        .store
        .update_task(&id, move |t| {
            t.account_id = account_id;
            t.plan_code = body.plan_code;
            t.datacenters = body.datacenters;
            t.options = body.options;
            t.quantity = body.quantity;
            t.retry_interval = body.retry_interval;
            t.auto_pay = body.auto_pay;
            t.updated_at = Utc::now();
            t.clone()
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no such task: {id}")))?;

    Ok(Json(updated))
}

/// PUT /queue/{id}/status — operator transitions (running|paused only).
pub async fn set_task_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<QueueTask>, ApiError> {
    if !matches!(body.status, TaskStatus::Running | TaskStatus::Paused) {
        return Err(ApiError::bad_request(
            "status must be \"running\" or \"paused\"",
        ));
    }

    let current = state
        .store
        .get_task(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("no such task: {id}")))?;
    if !current.status.can_transition(body.status) {
        return Err(ApiError::bad_request(format!(
            "cannot transition from {} to {}",
            current.status, body.status
        )));
    }

    let target = body.status;
    let updated = state
        .store
        .update_task(&id, move |t| {
            t.status = target;
            if target == TaskStatus::Running {
                // Resume schedules an immediate attempt.
                t.next_attempt_at = Utc::now().timestamp();
            }
            t.updated_at = Utc::now();
            t.clone()
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no such task: {id}")))?;

    Ok(Json(updated))
}

/// PUT /queue/{id}/restart — back to running with counters reset.
pub async fn restart_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QueueTask>, ApiError> {
    let updated = state
        .store
        .update_task(&id, |t| {
            t.reset_for_restart();
            t.clone()
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no such task: {id}")))?;
    Ok(Json(updated))
}

/// DELETE /queue/{id} — task removed, history retained.
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .store
        .queue()
        .mutate(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            Ok(before != tasks.len())
        })
        .await?;
    if !removed {
        return Err(ApiError::not_found(format!("no such task: {id}")));
    }
    state.scheduler.forget(&id);
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /queue/clear?scope=self|all
pub async fn clear_queue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let all = query.is_all();
    let account = account_scope(&headers);
    let deleted = state
        .store
        .queue()
        .mutate(move |tasks| {
            let before = tasks.len();
            if all {
                tasks.clear();
            } else {
                tasks.retain(|t| t.account_id != account);
            }
            Ok(before - tasks.len())
        })
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}

// ---- Purchase history ----

/// GET /purchase-history?scope=self|all
pub async fn list_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<PurchaseHistoryEntry>>, ApiError> {
    let mut entries = state.store.history().load().await;
    if !query.is_all() {
        let account = account_scope(&headers);
        entries.retain(|e| e.account_id == account);
    }
    Ok(Json(entries))
}

/// DELETE /purchase-history?scope=self|all
pub async fn clear_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let all = query.is_all();
    let account = account_scope(&headers);
    let deleted = state
        .store
        .history()
        .mutate(move |entries| {
            let before = entries.len();
            if all {
                entries.clear();
            } else {
                entries.retain(|e| e.account_id != account);
            }
            Ok(before - entries.len())
        })
        .await?;
    Ok(Json(DeletedResponse { deleted }))
}

// ---- Stats ----

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let tasks = state.store.queue().load().await;
    let entries = state.store.history().load().await;

    let count_status =
        |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count();

    Ok(Json(StatsResponse {
        total_tasks: tasks.len(),
        pending_tasks: count_status(TaskStatus::Pending),
        running_tasks: count_status(TaskStatus::Running),
        paused_tasks: count_status(TaskStatus::Paused),
        completed_tasks: count_status(TaskStatus::Completed),
        failed_tasks: count_status(TaskStatus::Failed),
        total_purchased: tasks.iter().map(|t| t.purchased as u64).sum(),
        history_entries: entries.len(),
        history_success: entries
            .iter()
            .filter(|e| e.status == HistoryStatus::Success)
            .count(),
        history_failed: entries
            .iter()
            .filter(|e| e.status == HistoryStatus::Failed)
            .count(),
        subscriptions: state.store.subscriptions().len().await,
        monitor_running: state.monitor.is_running().await,
    }))
}

// ---- Subscriptions ----

/// GET /vps-monitor/subscriptions
pub async fn list_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    Ok(Json(state.store.subscriptions().load().await))
}

/// POST /vps-monitor/subscriptions
pub async fn create_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<SubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    body.validate()?;
    let account_id = match body.account_id.as_deref() {
        Some(explicit) => Some(resolve_account_id(&state, &headers, Some(explicit)).await?),
        None => None,
    };
    let subsidiary = body
        .ovh_subsidiary
        .clone()
        .unwrap_or_else(|| "IE".to_string());

    let subscription = Subscription {
        id: uuid::Uuid::new_v4().to_string(),
        account_id,
        plan_code: body.plan_code,
        ovh_subsidiary: subsidiary,
        datacenters: body.datacenters,
        monitor_linux: body.monitor_linux,
        monitor_windows: body.monitor_windows,
        notify_available: body.notify_available,
        notify_unavailable: body.notify_unavailable,
        last_status: Default::default(),
        history: Vec::new(),
        created_at: Utc::now(),
    };
    let created = subscription.clone();
    state
        .store
        .subscriptions()
        .mutate(move |subs| {
            subs.push(subscription);
            Ok(())
        })
        .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /vps-monitor/subscriptions/{id}
///
/// Updates the watch configuration. `lastStatus` and the event history are
/// preserved so an edit does not re-trigger first-check notifications.
pub async fn update_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SubscriptionRequest>,
) -> Result<Json<Subscription>, ApiError> {
    body.validate()?;
    let updated = state
        .store
        .update_subscription(&id, move |s| {
            s.plan_code = body.plan_code;
            if let Some(subsidiary) = body.ovh_subsidiary {
                s.ovh_subsidiary = subsidiary;
            }
            s.account_id = body.account_id;
            s.datacenters = body.datacenters;
            s.monitor_linux = body.monitor_linux;
            s.monitor_windows = body.monitor_windows;
            s.notify_available = body.notify_available;
            s.notify_unavailable = body.notify_unavailable;
            s.clone()
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no such subscription: {id}")))?;
    Ok(Json(updated))
}

/// DELETE /vps-monitor/subscriptions/{id}
pub async fn delete_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .store
        .subscriptions()
        .mutate(|subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            Ok(before != subs.len())
        })
        .await?;
    if !removed {
        return Err(ApiError::not_found(format!("no such subscription: {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---- Monitor control ----

/// GET /vps-monitor/status
pub async fn monitor_status(
    State(state): State<AppState>,
) -> Result<Json<MonitorStatus>, ApiError> {
    Ok(Json(state.monitor.status().await))
}

/// POST /vps-monitor/start
pub async fn monitor_start(
    State(state): State<AppState>,
) -> Result<Json<MonitorStatus>, ApiError> {
    std::sync::Arc::clone(&state.monitor).start().await;
    Ok(Json(state.monitor.status().await))
}

/// POST /vps-monitor/stop
pub async fn monitor_stop(
    State(state): State<AppState>,
) -> Result<Json<MonitorStatus>, ApiError> {
    state.monitor.stop().await;
    Ok(Json(state.monitor.status().await))
}

/// PUT /vps-monitor/interval
pub async fn monitor_interval(
    State(state): State<AppState>,
    Json(body): Json<IntervalRequest>,
) -> Result<Json<MonitorStatus>, ApiError> {
    state.monitor.set_check_interval(body.seconds)?;
    Ok(Json(state.monitor.status().await))
}
