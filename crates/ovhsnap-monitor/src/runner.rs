// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The availability monitor loop.
//!
//! Sweeps every enabled subscription on a configurable interval, diffs the
//! probe result against the last observed per-datacenter status, sends
//! change notifications, and records a bounded event history. Pure
//! observation: the monitor never places orders — auto-buying is expressed
//! by the operator keeping a queue task alongside a subscription.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ovhsnap_core::{
    Account, AvailabilityProbe, ChangeType, DcStatus, Notifier, Price, PriceQuoter, SnapError,
    Subscription, SubscriptionEvent,
};
use ovhsnap_store::Store;

use crate::price::{format_price, price_key, PriceCache, PRICE_QUOTE_TIMEOUT};

/// Floor for the sweep interval, seconds.
pub const MIN_MONITOR_INTERVAL: u64 = 30;

/// Pause between subscriptions within one sweep.
const SWEEP_PACE: Duration = Duration::from_secs(1);

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub subscription_count: usize,
    pub check_interval: u64,
}

struct ActiveLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Subscription poller with idempotent start/stop.
pub struct MonitorRunner {
    store: Arc<Store>,
    probe: Arc<dyn AvailabilityProbe>,
    notifier: Arc<dyn Notifier>,
    quoter: Option<Arc<dyn PriceQuoter>>,
    prices: PriceCache,
    check_interval: AtomicU64,
    locks: DashMap<String, Arc<Mutex<()>>>,
    active: Mutex<Option<ActiveLoop>>,
}

impl MonitorRunner {
    pub fn new(
        store: Arc<Store>,
        probe: Arc<dyn AvailabilityProbe>,
        notifier: Arc<dyn Notifier>,
        quoter: Option<Arc<dyn PriceQuoter>>,
        check_interval: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            probe,
            notifier,
            quoter,
            prices: PriceCache::new(),
            check_interval: AtomicU64::new(check_interval.max(MIN_MONITOR_INTERVAL)),
            locks: DashMap::new(),
            active: Mutex::new(None),
        })
    }

    /// Start the monitor loop. Returns false when already running.
    pub async fn start(self: Arc<Self>) -> bool {
        let mut active = self.active.lock().await;
        if active.is_some() {
            warn!("monitor already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            info!(
                check_interval = this.check_interval(),
                "availability monitor started"
            );
            loop {
                this.sweep(&loop_cancel, SWEEP_PACE).await;
                let wait = Duration::from_secs(this.check_interval());
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            info!("availability monitor stopped");
        });

        *active = Some(ActiveLoop { cancel, handle });
        true
    }

    /// Stop the monitor loop. Returns false when not running.
    pub async fn stop(&self) -> bool {
        let Some(active) = self.active.lock().await.take() else {
            warn!("monitor not running");
            return false;
        };
        active.cancel.cancel();
        let mut handle = active.handle;
        if tokio::time::timeout(Duration::from_secs(5), &mut handle)
            .await
            .is_err()
        {
            handle.abort();
        }
        true
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.is_running().await,
            subscription_count: self.store.subscriptions().len().await,
            check_interval: self.check_interval(),
        }
    }

    pub fn check_interval(&self) -> u64 {
        self.check_interval.load(Ordering::Relaxed)
    }

    /// Adjust the sweep interval; takes effect after the current wait.
    pub fn set_check_interval(&self, seconds: u64) -> Result<(), SnapError> {
        if seconds < MIN_MONITOR_INTERVAL {
            return Err(SnapError::Config(format!(
                "check interval must be at least {MIN_MONITOR_INTERVAL} seconds, got {seconds}"
            )));
        }
        self.check_interval.store(seconds, Ordering::Relaxed);
        info!(seconds, "monitor check interval updated");
        Ok(())
    }

    /// One full pass over all subscriptions (test entry point).
    pub async fn sweep_once(&self) {
        self.sweep(&CancellationToken::new(), Duration::ZERO).await;
    }

    async fn sweep(&self, cancel: &CancellationToken, pace: Duration) {
        let subscriptions = self.store.subscriptions().load().await;
        if subscriptions.is_empty() {
            debug!("no subscriptions, skipping sweep");
            return;
        }
        debug!(count = subscriptions.len(), "sweeping subscriptions");

        for (index, subscription) in subscriptions.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            self.check_subscription(&subscription.id).await;
            if !pace.is_zero() && index + 1 < subscriptions.len() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(pace) => {}
                }
            }
        }
    }

    async fn check_subscription(&self, subscription_id: &str) {
        let lock = self
            .locks
            .entry(subscription_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let Ok(_guard) = lock.try_lock() else {
            return;
        };

        let Some(subscription) = self.store.get_subscription(subscription_id).await else {
            drop(_guard);
            self.locks.remove(subscription_id);
            return;
        };

        let Some(account) = self
            .resolve_account(subscription.account_id.as_deref())
            .await
        else {
            warn!(
                subscription_id,
                plan_code = %subscription.plan_code,
                "no usable account for subscription"
            );
            return;
        };

        let states = match self
            .probe
            .probe(
                &account,
                &subscription.plan_code,
                &[],
                &subscription.datacenters,
            )
            .await
        {
            Ok(states) => states,
            Err(e) => {
                warn!(
                    subscription_id,
                    plan_code = %subscription.plan_code,
                    error = %e,
                    "availability check failed"
                );
                return;
            }
        };

        let now = Utc::now();
        let mut datacenters: Vec<String> = states.keys().cloned().collect();
        datacenters.sort();

        let mut status_updates: Vec<(String, bool)> = Vec::with_capacity(datacenters.len());
        let mut events: Vec<SubscriptionEvent> = Vec::new();
        let mut newly_available: Vec<String> = Vec::new();
        let mut newly_unavailable: Vec<String> = Vec::new();

        for dc in &datacenters {
            let available = states[dc].is_available();
            let old = subscription.last_status.get(dc).map(|s| s.available);
            status_updates.push((dc.clone(), available));

            let change = match old {
                // First observation: announce stock, stay silent about a
                // plan that starts out sold out unless asked.
                None if available && subscription.notify_available => Some(ChangeType::Available),
                None if !available && subscription.notify_unavailable => {
                    Some(ChangeType::Unavailable)
                }
                Some(false) if available && subscription.notify_available => {
                    Some(ChangeType::Available)
                }
                Some(true) if !available && subscription.notify_unavailable => {
                    Some(ChangeType::Unavailable)
                }
                _ => None,
            };

            if let Some(change_type) = change {
                events.push(SubscriptionEvent {
                    timestamp: now,
                    datacenter: dc.clone(),
                    change_type,
                    old_status: old,
                });
                match change_type {
                    ChangeType::Available => newly_available.push(dc.clone()),
                    ChangeType::Unavailable => newly_unavailable.push(dc.clone()),
                }
            }
        }

        let price = if let Some(first_dc) = newly_available.first() {
            self.price_for(&account, &subscription, first_dc).await
        } else {
            None
        };

        let persisted_events = events.clone();
        if let Err(e) = self
            .store
            .update_subscription(subscription_id, move |s| {
                for (dc, available) in status_updates {
                    s.last_status.insert(
                        dc,
                        DcStatus {
                            available,
                            last_seen_at: now,
                        },
                    );
                }
                for event in persisted_events {
                    s.push_event(event);
                }
            })
            .await
        {
            warn!(subscription_id, error = %e, "failed to persist subscription status");
        }

        if !newly_available.is_empty() {
            info!(
                subscription_id,
                plan_code = %subscription.plan_code,
                datacenters = ?newly_available,
                "stock appeared"
            );
            let text = available_message(&subscription, &newly_available, price.as_ref());
            if let Err(e) = self.notifier.send(&text).await {
                warn!(error = %e, "availability notification dropped");
            }
        }
        for dc in &newly_unavailable {
            let text = unavailable_message(&subscription, dc);
            if let Err(e) = self.notifier.send(&text).await {
                warn!(error = %e, "unavailability notification dropped");
            }
        }
    }

    async fn resolve_account(&self, account_id: Option<&str>) -> Option<Account> {
        match account_id {
            Some(id) => self.store.get_account(id).await,
            None => self.store.accounts().load().await.into_iter().next(),
        }
    }

    /// Best-effort price lookup for an alert; cached for days.
    async fn price_for(
        &self,
        account: &Account,
        subscription: &Subscription,
        datacenter: &str,
    ) -> Option<Price> {
        let quoter = self.quoter.as_ref()?;
        let key = price_key(&subscription.plan_code, &[]);
        if let Some(hit) = self.prices.get(&key) {
            debug!(plan_code = %subscription.plan_code, "price cache hit");
            return Some(hit);
        }

        match tokio::time::timeout(
            PRICE_QUOTE_TIMEOUT,
            quoter.quote(account, &subscription.plan_code, datacenter, &[]),
        )
        .await
        {
            Ok(Ok(price)) => {
                self.prices.insert(key, price.clone());
                Some(price)
            }
            Ok(Err(e)) => {
                warn!(plan_code = %subscription.plan_code, error = %e, "price quote failed");
                None
            }
            Err(_) => {
                warn!(
                    plan_code = %subscription.plan_code,
                    "price quote timed out, alerting without price"
                );
                None
            }
        }
    }
}

/// One grouped alert for every datacenter that came into stock this sweep.
fn available_message(
    subscription: &Subscription,
    datacenters: &[String],
    price: Option<&Price>,
) -> String {
    let mut message = String::from("🎉 Server restock!\n");
    message.push_str(&format!("Plan: {}\n", subscription.plan_code));
    if let Some(price) = price {
        message.push_str(&format!("Price: {}\n", format_price(price)));
    }
    message.push_str(&format!(
        "Available datacenters ({}):\n",
        datacenters.len()
    ));
    for dc in datacenters {
        message.push_str(&format!("  • {}\n", dc.to_uppercase()));
    }
    message.trim_end().to_string()
}

fn unavailable_message(subscription: &Subscription, datacenter: &str) -> String {
    format!(
        "📦 Server out of stock\nPlan: {}\nDatacenter: {}",
        subscription.plan_code,
        datacenter.to_uppercase()
    )
}
