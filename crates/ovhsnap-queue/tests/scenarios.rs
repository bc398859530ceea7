// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scheduler scenarios against scripted probe and order seams.
//!
//! Each test builds an isolated harness with a temp-dir store and drives the
//! scheduler tick-by-tick via `run_once`, making tasks due explicitly
//! instead of sleeping through retry intervals.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use ovhsnap_core::{
    Account, AvailabilityProbe, AvailabilityState, EndpointRegion, HistoryStatus, Notifier,
    OrderPlacer, OrderResult, Price, QueueTask, SnapError, TaskStatus,
};
use ovhsnap_queue::QueueScheduler;
use ovhsnap_store::Store;

/// Probe whose successive calls see scripted sets of available datacenters.
/// The final step repeats forever.
struct ScriptedProbe {
    steps: Mutex<VecDeque<Vec<String>>>,
}

impl ScriptedProbe {
    fn new(steps: &[&[&str]]) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(
                steps
                    .iter()
                    .map(|dcs| dcs.iter().map(|s| s.to_string()).collect())
                    .collect(),
            ),
        })
    }
}

#[async_trait]
impl AvailabilityProbe for ScriptedProbe {
    async fn probe(
        &self,
        _account: &Account,
        _plan_code: &str,
        _options: &[String],
        datacenters: &[String],
    ) -> Result<HashMap<String, AvailabilityState>, SnapError> {
        let mut steps = self.steps.lock().await;
        let current = if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap_or_default()
        };
        Ok(datacenters
            .iter()
            .map(|dc| {
                let state = if current.contains(dc) {
                    AvailabilityState::Available
                } else {
                    AvailabilityState::Unavailable
                };
                (dc.clone(), state)
            })
            .collect())
    }
}

/// Order placer with scripted outcomes; once the script runs dry every call
/// succeeds with a fresh order id. Records the datacenter of each call.
struct ScriptedOrders {
    steps: Mutex<VecDeque<Result<OrderResult, SnapError>>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedOrders {
    fn new(steps: Vec<Result<OrderResult, SnapError>>) -> Arc<Self> {
        Self::with_delay(steps, Duration::ZERO)
    }

    fn with_delay(steps: Vec<Result<OrderResult, SnapError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
            delay,
        })
    }

    async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    async fn datacenters(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

fn order_ok(order_id: i64) -> OrderResult {
    OrderResult {
        order_id,
        url: format!("https://www.ovh.com/order/{order_id}"),
        price: Some(Price {
            with_tax: 50.0,
            without_tax: 41.67,
            tax: 8.33,
            currency_code: "EUR".into(),
        }),
        payment_error: None,
    }
}

#[async_trait]
impl OrderPlacer for ScriptedOrders {
    async fn place_order(
        &self,
        _account: &Account,
        _plan_code: &str,
        datacenter: &str,
        _options: &[String],
        _auto_pay: bool,
    ) -> Result<OrderResult, SnapError> {
        let call_index = {
            let mut calls = self.calls.lock().await;
            calls.push(datacenter.to_string());
            calls.len()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut steps = self.steps.lock().await;
        match steps.pop_front() {
            Some(step) => step,
            None => Ok(order_ok(1000 + call_index as i64)),
        }
    }
}

/// Captures every notification text.
#[derive(Default)]
struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), SnapError> {
        self.messages.lock().await.push(text.to_string());
        Ok(())
    }
}

struct Harness {
    store: Arc<Store>,
    scheduler: Arc<QueueScheduler>,
    orders: Arc<ScriptedOrders>,
    notifier: Arc<RecordingNotifier>,
    _dir: tempfile::TempDir,
}

impl Harness {
    async fn new(probe: Arc<ScriptedProbe>, orders: Arc<ScriptedOrders>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).await.unwrap());
        store
            .accounts()
            .mutate(|accounts| {
                accounts.push(Account {
                    id: "acct".into(),
                    alias: "primary".into(),
                    zone: "IE".into(),
                    endpoint_region: EndpointRegion::OvhEu,
                    application_key: "ak".into(),
                    application_secret: "as".into(),
                    consumer_key: "ck".into(),
                });
                Ok(())
            })
            .await
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = QueueScheduler::new(
            Arc::clone(&store),
            probe,
            Arc::clone(&orders) as Arc<dyn OrderPlacer>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            4,
        );
        Self {
            store,
            scheduler,
            orders,
            notifier,
            _dir: dir,
        }
    }

    async fn add_task(&self, task: QueueTask) -> String {
        let id = task.id.clone();
        self.store
            .queue()
            .mutate(|tasks| {
                tasks.push(task);
                Ok(())
            })
            .await
            .unwrap();
        id
    }

    /// Pull the task's next attempt into the past so the next tick fires.
    async fn make_due(&self, id: &str) {
        self.store
            .update_task(id, |t| {
                t.next_attempt_at = Utc::now().timestamp() - 1;
            })
            .await
            .unwrap();
    }

    async fn task(&self, id: &str) -> QueueTask {
        self.store.get_task(id).await.unwrap()
    }
}

fn task(datacenters: &[&str], quantity: u32, retry_interval: u64) -> QueueTask {
    QueueTask::new(
        "acct",
        "24sk202",
        datacenters.iter().map(|s| s.to_string()).collect(),
        vec![],
        quantity,
        retry_interval,
        false,
    )
}

// ---- Scenario A: no stock, then stock, then one purchase ----

#[tokio::test]
async fn simple_success_after_one_empty_tick() {
    let probe = ScriptedProbe::new(&[&[], &["gra"]]);
    let orders = ScriptedOrders::new(vec![Ok(order_ok(7001))]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 1, 30)).await;

    // Tick 1: nothing available, reschedule one interval out.
    assert_eq!(h.scheduler.run_once().await, 1);
    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Running);
    assert_eq!(t.purchased, 0);
    assert_eq!(t.retry_count, 1);
    let now = Utc::now().timestamp();
    assert!(t.next_attempt_at > now && t.next_attempt_at <= now + 31);
    assert!(t.next_attempt_at >= t.updated_at.timestamp());

    // The task is no longer due until its interval elapses.
    assert_eq!(h.scheduler.run_once().await, 0);

    // Tick 2: stock appears.
    h.make_due(&id).await;
    assert_eq!(h.scheduler.run_once().await, 1);

    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.purchased, 1);

    let entries = h.store.history().load().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, HistoryStatus::Success);
    assert_eq!(entries[0].sequence, 1);
    assert_eq!(entries[0].order_id, Some(7001));
    assert_eq!(entries[0].datacenter, "gra");
    let price = entries[0].price.as_ref().unwrap();
    assert_eq!(price.with_tax, 50.0);
    assert_eq!(price.currency_code, "EUR");

    // One success notification went out.
    let messages = h.notifier.messages.lock().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("24sk202"));
}

// ---- Scenario B: datacenter priority ----

#[tokio::test]
async fn earliest_listed_datacenter_wins() {
    let probe = ScriptedProbe::new(&[&["gra", "rbx"]]);
    let orders = ScriptedOrders::new(vec![]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["rbx", "gra"], 1, 30)).await;

    h.scheduler.run_once().await;

    assert_eq!(h.orders.datacenters().await, vec!["rbx".to_string()]);
    let entries = h.store.history().load().await;
    assert_eq!(entries[0].datacenter, "rbx");
    assert_eq!(h.task(&id).await.status, TaskStatus::Completed);
}

// ---- Scenario C: multi-unit task purchases one unit per tick ----

#[tokio::test]
async fn multi_unit_task_advances_to_completion() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::new(vec![]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 3, 30)).await;

    for tick in 1..=3u32 {
        h.scheduler.run_once().await;
        let t = h.task(&id).await;
        assert_eq!(t.purchased, tick);
        if tick < 3 {
            assert_eq!(t.status, TaskStatus::Running);
            h.make_due(&id).await;
        }
    }

    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.purchased, 3);

    // Sequences are gap-free 1..=3 (invariant 2).
    let mut sequences: Vec<u32> = h
        .store
        .history()
        .load()
        .await
        .iter()
        .filter(|e| e.status == HistoryStatus::Success)
        .map(|e| e.sequence)
        .collect();
    sequences.sort_unstable();
    assert_eq!(sequences, vec![1, 2, 3]);

    // No fourth attempt once complete.
    h.make_due(&id).await;
    assert_eq!(h.scheduler.run_once().await, 0);
    assert_eq!(h.orders.call_count().await, 3);
}

// ---- Scenario D: transient 5xx then success ----

#[tokio::test]
async fn transient_server_error_retries_and_succeeds() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::new(vec![Err(SnapError::Server {
        status: 503,
        message: "maintenance".into(),
    })]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 1, 30)).await;

    h.scheduler.run_once().await;
    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Running, "5xx never terminates a task");
    assert_eq!(t.failure_count, 1);
    assert!(t.retry_count >= 1);
    assert_eq!(t.purchased, 0);
    // No history entry for a transient failure.
    assert!(h.store.history().is_empty().await);

    h.make_due(&id).await;
    h.scheduler.run_once().await;

    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.failure_count, 1, "failure count persists after success");
    let entries = h.store.history().load().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, HistoryStatus::Success);
}

// ---- Scenario E: auth failure is terminal ----

#[tokio::test]
async fn auth_failure_fails_task_permanently() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::new(vec![Err(SnapError::Auth {
        status: 401,
        message: "invalid consumer key".into(),
    })]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 1, 30)).await;

    h.scheduler.run_once().await;

    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Failed);
    assert!(t.last_error.as_ref().unwrap().contains("authentication rejected"));

    let entries = h.store.history().load().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, HistoryStatus::Failed);
    assert!(entries[0]
        .error_message
        .as_ref()
        .unwrap()
        .contains("authentication rejected"));

    // No further attempts: the task is terminal.
    h.make_due(&id).await;
    assert_eq!(h.scheduler.run_once().await, 0);
    assert_eq!(h.orders.call_count().await, 1);
}

// ---- Scenario F: pause during an in-flight attempt ----

#[tokio::test]
async fn pause_mid_attempt_lets_outcome_land_then_stops() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::with_delay(vec![], Duration::from_millis(100));
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 2, 30)).await;

    let scheduler = Arc::clone(&h.scheduler);
    let running = tokio::spawn(async move { scheduler.run_once().await });

    // Let the attempt reach the (slow) order call, then pause the task.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(h.scheduler.attempt_in_flight(&id));
    h.store
        .update_task(&id, |t| {
            t.status = TaskStatus::Paused;
            t.updated_at = Utc::now();
        })
        .await
        .unwrap();

    running.await.unwrap();

    // The in-flight attempt completed and recorded its outcome.
    let t = h.task(&id).await;
    assert_eq!(t.purchased, 1);
    assert_eq!(t.status, TaskStatus::Paused);
    assert_eq!(h.store.history().len().await, 1);

    // But no new ticks fire while paused.
    h.make_due(&id).await;
    assert_eq!(h.scheduler.run_once().await, 0);
    assert_eq!(h.orders.call_count().await, 1);
}

// ---- Stock race at add-item time ----

#[tokio::test]
async fn add_item_race_counts_as_failure_and_retries() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::new(vec![Err(SnapError::NotAvailable {
        message: "another buyer got it".into(),
    })]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 1, 30)).await;

    h.scheduler.run_once().await;
    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Running);
    assert_eq!(t.retry_count, 1);
    assert_eq!(t.failure_count, 1, "race increments failureCount");
    assert!(h.store.history().is_empty().await);

    h.make_due(&id).await;
    h.scheduler.run_once().await;
    assert_eq!(h.task(&id).await.status, TaskStatus::Completed);
}

// ---- 429 backoff doubles and caps ----

#[tokio::test]
async fn rate_limit_backoff_doubles_up_to_cap() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let rate_limited = || {
        Err(SnapError::RateLimit {
            message: "too many requests".into(),
        })
    };
    let orders = ScriptedOrders::new(vec![rate_limited(), rate_limited(), rate_limited()]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 1, 200)).await;

    // Backoff sequence for a 200s interval: 400, 600 (capped), 600.
    for expected in [400i64, 600, 600] {
        let before = Utc::now().timestamp();
        h.scheduler.run_once().await;
        let t = h.task(&id).await;
        assert_eq!(t.status, TaskStatus::Running);
        let delay = t.next_attempt_at - before;
        assert!(
            (delay - expected).abs() <= 2,
            "expected ~{expected}s backoff, got {delay}s"
        );
        h.make_due(&id).await;
    }

    // 429s are not counted as failures.
    assert_eq!(h.task(&id).await.failure_count, 0);

    // A successful attempt resets the backoff bookkeeping.
    h.scheduler.run_once().await;
    assert_eq!(h.task(&id).await.status, TaskStatus::Completed);
}

// ---- Deleted account fails closed ----

#[tokio::test]
async fn deleted_account_fails_task_on_next_tick() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::new(vec![]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 1, 30)).await;

    h.store
        .accounts()
        .mutate(|accounts| {
            accounts.clear();
            Ok(())
        })
        .await
        .unwrap();

    h.scheduler.run_once().await;

    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Failed);
    assert_eq!(t.last_error.as_deref(), Some("account removed"));
    assert_eq!(h.orders.call_count().await, 0);
}

// ---- Quantity lowered below purchased completes without ordering ----

#[tokio::test]
async fn quantity_lowered_below_purchased_completes() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::new(vec![]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 3, 30)).await;

    // Simulate two earlier purchases, then the operator lowering quantity.
    h.store
        .update_task(&id, |t| {
            t.purchased = 2;
            t.quantity = 2;
        })
        .await
        .unwrap();

    h.scheduler.run_once().await;

    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.purchased, 2);
    assert_eq!(h.orders.call_count().await, 0, "no order for a satisfied task");
}

// ---- Deleted task mid-attempt still records history ----

#[tokio::test]
async fn task_deleted_mid_attempt_keeps_orphaned_history() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::with_delay(vec![], Duration::from_millis(100));
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 1, 30)).await;

    let scheduler = Arc::clone(&h.scheduler);
    let running = tokio::spawn(async move { scheduler.run_once().await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    h.store
        .queue()
        .mutate(|tasks| {
            tasks.retain(|t| t.id != id);
            Ok(())
        })
        .await
        .unwrap();

    running.await.unwrap();

    assert!(h.store.get_task(&id).await.is_none());
    let entries = h.store.history().load().await;
    assert_eq!(entries.len(), 1, "outcome recorded under the orphaned id");
    assert_eq!(entries[0].task_id, id);
}

// ---- Payment failure still secures the slot ----

#[tokio::test]
async fn payment_failure_still_increments_purchased() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let mut result = order_ok(9001);
    result.payment_error = Some("payment not completed: order status notPaid".into());
    let orders = ScriptedOrders::new(vec![Ok(result)]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 1, 30)).await;

    h.scheduler.run_once().await;

    let t = h.task(&id).await;
    assert_eq!(t.status, TaskStatus::Completed);
    assert_eq!(t.purchased, 1, "slot is secured even when payment fails");

    let entries = h.store.history().load().await;
    assert_eq!(entries[0].status, HistoryStatus::Success);
    assert!(entries[0]
        .error_message
        .as_ref()
        .unwrap()
        .contains("notPaid"));
}

// ---- Invariant 1 holds across a mixed run ----

#[tokio::test]
async fn purchased_never_exceeds_quantity_and_completion_matches() {
    let probe = ScriptedProbe::new(&[&["gra"]]);
    let orders = ScriptedOrders::new(vec![]);
    let h = Harness::new(probe, orders).await;
    let id = h.add_task(task(&["gra"], 2, 30)).await;

    for _ in 0..4 {
        h.scheduler.run_once().await;
        let t = h.task(&id).await;
        assert!(t.purchased <= t.quantity);
        assert_eq!(
            t.status == TaskStatus::Completed,
            t.purchased == t.quantity,
            "completed iff purchased == quantity"
        );
        h.make_due(&id).await;
    }
    assert_eq!(h.orders.call_count().await, 2);
}
