// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The queue scheduler: races availability against each task's retry
//! interval and converts stock into idempotent order attempts.
//!
//! A dispatcher wakes every second, selects running tasks whose
//! `nextAttemptAt` has passed (oldest `createdAt` first), and submits them
//! to a bounded worker pool. Per-task mutual exclusion comes from a
//! try-lock mutex registry: a task whose previous attempt is still in
//! flight is skipped and revisited on a later tick.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ovhsnap_core::types::{truncate_error_message, MAX_BACKOFF_INTERVAL};
use ovhsnap_core::{
    AvailabilityProbe, HistoryStatus, Notifier, OrderPlacer, OrderResult, PurchaseHistoryEntry,
    QueueTask, SnapError, TaskStatus,
};
use ovhsnap_store::Store;

/// Dispatcher wake period.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Effective worker-pool size: `min(cap, 2 x accounts)`, at least one.
pub fn worker_cap(max_workers: usize, account_count: usize) -> usize {
    max_workers.min(2 * account_count.max(1)).max(1)
}

/// Owns queue-task lifecycle: picks due tasks, paces retries, drives the
/// probe and the order driver, and records outcomes.
pub struct QueueScheduler {
    store: Arc<Store>,
    probe: Arc<dyn AvailabilityProbe>,
    orders: Arc<dyn OrderPlacer>,
    notifier: Arc<dyn Notifier>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Current 429 backoff per task, seconds. Cleared on any other outcome.
    backoff: DashMap<String, u64>,
    workers: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl QueueScheduler {
    pub fn new(
        store: Arc<Store>,
        probe: Arc<dyn AvailabilityProbe>,
        orders: Arc<dyn OrderPlacer>,
        notifier: Arc<dyn Notifier>,
        workers: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            probe,
            orders,
            notifier,
            locks: DashMap::new(),
            backoff: DashMap::new(),
            workers: Arc::new(Semaphore::new(workers.max(1))),
            cancel: CancellationToken::new(),
        })
    }

    /// Start the tick dispatcher. Runs until [`QueueScheduler::shutdown`].
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("queue scheduler started");
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = interval.tick() => Self::dispatch_due(&self).await,
                }
            }
            info!("queue scheduler stopped");
        })
    }

    /// Request shutdown. In-flight attempts finish and record their outcome;
    /// only new dispatches stop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// True while an order attempt currently holds the task's lock.
    pub fn attempt_in_flight(&self, task_id: &str) -> bool {
        self.locks
            .get(task_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Drop per-task bookkeeping after a deletion.
    pub fn forget(&self, task_id: &str) {
        self.locks.remove(task_id);
        self.backoff.remove(task_id);
    }

    /// Run every due task to completion, sequentially. Returns the number of
    /// tasks attempted. Drives the scenario tests; the background dispatcher
    /// uses the concurrent path instead.
    pub async fn run_once(&self) -> usize {
        let now = Utc::now().timestamp();
        let due = self.due_tasks(now).await;
        let count = due.len();
        for task_id in due {
            self.attempt(&task_id, now).await;
        }
        count
    }

    async fn dispatch_due(this: &Arc<Self>) {
        let now = Utc::now().timestamp();
        for task_id in this.due_tasks(now).await {
            let this = Arc::clone(this);
            // Permits are granted FIFO, so older tasks keep their head start
            // when the pool is contended.
            tokio::spawn(async move {
                let Ok(_permit) = Arc::clone(&this.workers).acquire_owned().await else {
                    return;
                };
                this.attempt(&task_id, Utc::now().timestamp()).await;
            });
        }
    }

    /// Running tasks whose next attempt has come due, oldest first.
    async fn due_tasks(&self, now: i64) -> Vec<String> {
        let mut due: Vec<QueueTask> = self
            .store
            .queue()
            .load()
            .await
            .into_iter()
            .filter(|t| t.status == TaskStatus::Running && t.next_attempt_at <= now)
            .collect();
        due.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        due.into_iter().map(|t| t.id).collect()
    }

    /// One tick for one task.
    async fn attempt(&self, task_id: &str, now: i64) {
        let lock = self
            .locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let Ok(_guard) = lock.try_lock() else {
            debug!(task_id, "attempt already in flight, skipping tick");
            return;
        };

        // Reload under the lock; the operator may have mutated or deleted
        // the task since dispatch.
        let Some(task) = self.store.get_task(task_id).await else {
            drop(_guard);
            self.forget(task_id);
            return;
        };
        if task.status != TaskStatus::Running {
            return;
        }

        // Quantity lowered below what was already purchased.
        if task.purchased >= task.quantity {
            if let Err(e) = self
                .store
                .update_task(task_id, |t| {
                    t.status = TaskStatus::Completed;
                    t.updated_at = Utc::now();
                })
                .await
            {
                warn!(task_id, error = %e, "failed to persist completion");
            }
            info!(task_id, "task complete (quantity already satisfied)");
            return;
        }

        // Fail closed when the account was deleted out from under the task.
        let Some(account) = self.store.get_account(&task.account_id).await else {
            self.fail_task(&task, "account removed", None).await;
            return;
        };

        let states = match self
            .probe
            .probe(&account, &task.plan_code, &task.options, &task.datacenters)
            .await
        {
            Ok(states) => states,
            Err(e) if e.is_fatal() => {
                self.fail_task(&task, &e.to_string(), None).await;
                return;
            }
            Err(e) => {
                self.retry_after_error(&task, &e, now).await;
                return;
            }
        };

        // First datacenter in priority order with stock wins.
        let available = task
            .datacenters
            .iter()
            .find(|dc| {
                states
                    .get(dc.as_str())
                    .map(|s| s.is_available())
                    .unwrap_or(false)
            })
            .cloned();

        let Some(datacenter) = available else {
            self.reschedule_no_stock(&task, now).await;
            return;
        };

        info!(
            task_id,
            plan_code = %task.plan_code,
            %datacenter,
            attempt = task.retry_count + 1,
            "stock detected, placing order"
        );

        match self
            .orders
            .place_order(
                &account,
                &task.plan_code,
                &datacenter,
                &task.options,
                task.auto_pay,
            )
            .await
        {
            Ok(result) => self.record_success(&task, &datacenter, result, now).await,
            Err(SnapError::NotAvailable { message }) => {
                // Lost the race to another buyer between probe and add-item.
                debug!(task_id, %datacenter, %message, "stock race lost");
                self.retry_stock_race(&task, &message, now).await;
            }
            Err(e) if e.is_fatal() => {
                self.fail_task(&task, &e.to_string(), Some(&datacenter)).await;
            }
            Err(e) => self.retry_after_error(&task, &e, now).await,
        }
    }

    /// Success path: history entry, purchased counter, completion check.
    async fn record_success(
        &self,
        task: &QueueTask,
        datacenter: &str,
        result: OrderResult,
        now: i64,
    ) {
        let sequence = task.purchased + 1;
        let entry = PurchaseHistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            account_id: task.account_id.clone(),
            plan_code: task.plan_code.clone(),
            datacenter: datacenter.to_string(),
            options: task.options.clone(),
            status: HistoryStatus::Success,
            order_id: Some(result.order_id),
            order_url: Some(result.url.clone()),
            price: result.price.clone(),
            error_message: result
                .payment_error
                .as_deref()
                .map(truncate_error_message),
            sequence,
            purchase_time: Utc::now(),
        };

        let payment_error = result.payment_error.clone();
        let outcome = self
            .store
            .update_task(&task.id, move |t| {
                t.purchased = t.purchased.saturating_add(1);
                t.last_error = payment_error.map(|m| truncate_error_message(&m));
                if t.purchased >= t.quantity {
                    t.status = TaskStatus::Completed;
                } else {
                    t.next_attempt_at = now + t.retry_interval as i64;
                }
                t.updated_at = Utc::now();
                (t.purchased, t.status)
            })
            .await;
        match outcome {
            Ok(Some((purchased, status))) => {
                info!(
                    task_id = %task.id,
                    order_id = result.order_id,
                    purchased,
                    quantity = task.quantity,
                    %status,
                    "order placed"
                );
            }
            Ok(None) => {
                // Task deleted mid-attempt; the outcome is still recorded
                // under the orphaned task id.
                warn!(task_id = %task.id, order_id = result.order_id, "task deleted mid-attempt");
            }
            Err(e) => error!(task_id = %task.id, error = %e, "failed to persist purchase"),
        }
        self.backoff.remove(&task.id);

        if let Err(e) = self.store.append_history(entry).await {
            error!(task_id = %task.id, error = %e, "failed to append history entry");
        }

        let message = success_message(task, datacenter, &result, sequence);
        if let Err(e) = self.notifier.send(&message).await {
            warn!(error = %e, "purchase notification dropped");
        }
    }

    /// No datacenter had stock: schedule the next probe one interval out.
    async fn reschedule_no_stock(&self, task: &QueueTask, now: i64) {
        self.backoff.remove(&task.id);
        if let Err(e) = self
            .store
            .update_task(&task.id, |t| {
                t.retry_count += 1;
                t.schedule_next(now);
            })
            .await
        {
            warn!(task_id = %task.id, error = %e, "failed to persist reschedule");
        }
    }

    /// Add-item stock race: same signal as no stock, but it also counts as a
    /// failure for observability.
    async fn retry_stock_race(&self, task: &QueueTask, message: &str, now: i64) {
        self.backoff.remove(&task.id);
        let message = truncate_error_message(message);
        if let Err(e) = self
            .store
            .update_task(&task.id, move |t| {
                t.retry_count += 1;
                t.failure_count += 1;
                t.last_error = Some(message);
                t.schedule_next(now);
            })
            .await
        {
            warn!(task_id = %task.id, error = %e, "failed to persist stock-race outcome");
        }
    }

    /// Transient error policy: retry forever, with doubling backoff for 429.
    async fn retry_after_error(&self, task: &QueueTask, error: &SnapError, now: i64) {
        let rate_limited = matches!(error, SnapError::RateLimit { .. });
        let delay = if rate_limited {
            let previous = self
                .backoff
                .get(&task.id)
                .map(|d| *d)
                .unwrap_or(task.retry_interval);
            let delay = (2 * previous)
                .max(task.retry_interval)
                .min(MAX_BACKOFF_INTERVAL);
            self.backoff.insert(task.id.clone(), delay);
            delay
        } else {
            self.backoff.remove(&task.id);
            task.retry_interval
        };

        warn!(
            task_id = %task.id,
            error = %error,
            delay,
            "attempt failed, retrying"
        );

        let message = truncate_error_message(&error.to_string());
        if let Err(e) = self
            .store
            .update_task(&task.id, move |t| {
                t.retry_count += 1;
                if !rate_limited {
                    t.failure_count += 1;
                }
                t.last_error = Some(message);
                t.next_attempt_at = now + delay as i64;
                t.updated_at = Utc::now();
            })
            .await
        {
            warn!(task_id = %task.id, error = %e, "failed to persist retry state");
        }
    }

    /// Fatal error policy: the task terminates until the operator restarts it.
    async fn fail_task(&self, task: &QueueTask, message: &str, datacenter: Option<&str>) {
        let message = truncate_error_message(message);
        error!(task_id = %task.id, %message, "task failed");

        let persisted = message.clone();
        if let Err(e) = self
            .store
            .update_task(&task.id, move |t| {
                t.status = TaskStatus::Failed;
                t.last_error = Some(persisted);
                t.updated_at = Utc::now();
            })
            .await
        {
            error!(task_id = %task.id, error = %e, "failed to persist task failure");
        }
        self.backoff.remove(&task.id);

        if let Some(dc) = datacenter {
            let entry = PurchaseHistoryEntry {
                id: uuid::Uuid::new_v4().to_string(),
                task_id: task.id.clone(),
                account_id: task.account_id.clone(),
                plan_code: task.plan_code.clone(),
                datacenter: dc.to_string(),
                options: task.options.clone(),
                status: HistoryStatus::Failed,
                order_id: None,
                order_url: None,
                price: None,
                error_message: Some(message.clone()),
                sequence: 0,
                purchase_time: Utc::now(),
            };
            if let Err(e) = self.store.append_history(entry).await {
                error!(task_id = %task.id, error = %e, "failed to append failure entry");
            }
        }

        let text = format!(
            "❌ Task failed: {} ({}): {message}",
            task.plan_code, task.id
        );
        if let Err(e) = self.notifier.send(&text).await {
            warn!(error = %e, "failure notification dropped");
        }
    }
}

fn success_message(
    task: &QueueTask,
    datacenter: &str,
    result: &OrderResult,
    sequence: u32,
) -> String {
    let mut message = format!(
        "🎉 Order placed: {} @ {} ({sequence}/{})\nOrder #{}: {}",
        task.plan_code, datacenter, task.quantity, result.order_id, result.url
    );
    if let Some(price) = &result.price {
        message.push_str(&format!(
            "\nPrice: {:.2} {} with tax",
            price.with_tax, price.currency_code
        ));
    }
    if let Some(err) = &result.payment_error {
        message.push_str(&format!("\n⚠️ {err}"));
    }
    message
}
