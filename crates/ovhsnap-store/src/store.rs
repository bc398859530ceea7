// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine's persistence root: the four state collections.

use std::path::Path;

use tracing::info;

use ovhsnap_core::types::HISTORY_CAP;
use ovhsnap_core::{Account, PurchaseHistoryEntry, QueueTask, SnapError, Subscription};

use crate::collection::Collection;

/// Owns all persisted entities. One reader-writer lock per collection; no
/// cross-collection transactions (a crash between a task write and its
/// history append may lose the history entry, which is acceptable).
pub struct Store {
    accounts: Collection<Account>,
    queue: Collection<QueueTask>,
    history: Collection<PurchaseHistoryEntry>,
    subscriptions: Collection<Subscription>,
}

impl Store {
    /// Open the store under `data_dir`, creating the directory if needed.
    ///
    /// Fails closed with [`SnapError::CorruptState`] when any existing state
    /// file cannot be parsed.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, SnapError> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| SnapError::Store {
                source: Box::new(e),
            })?;

        let store = Self {
            accounts: Collection::open(data_dir.join("accounts.json"), "accounts").await?,
            queue: Collection::open(data_dir.join("queue.json"), "tasks").await?,
            history: Collection::open(data_dir.join("history.json"), "entries").await?,
            subscriptions: Collection::open(data_dir.join("subscriptions.json"), "subscriptions")
                .await?,
        };
        info!(
            data_dir = %data_dir.display(),
            accounts = store.accounts.len().await,
            tasks = store.queue.len().await,
            history = store.history.len().await,
            subscriptions = store.subscriptions.len().await,
            "store opened"
        );
        Ok(store)
    }

    pub fn accounts(&self) -> &Collection<Account> {
        &self.accounts
    }

    pub fn queue(&self) -> &Collection<QueueTask> {
        &self.queue
    }

    pub fn history(&self) -> &Collection<PurchaseHistoryEntry> {
        &self.history
    }

    pub fn subscriptions(&self) -> &Collection<Subscription> {
        &self.subscriptions
    }

    /// Fetch one account by id.
    pub async fn get_account(&self, id: &str) -> Option<Account> {
        self.accounts.load().await.into_iter().find(|a| a.id == id)
    }

    /// Fetch one queue task by id.
    pub async fn get_task(&self, id: &str) -> Option<QueueTask> {
        self.queue.load().await.into_iter().find(|t| t.id == id)
    }

    /// Fetch one subscription by id.
    pub async fn get_subscription(&self, id: &str) -> Option<Subscription> {
        self.subscriptions
            .load()
            .await
            .into_iter()
            .find(|s| s.id == id)
    }

    /// Apply `f` to the task with the given id, persisting the result.
    ///
    /// Returns `Ok(None)` when the task no longer exists (deleted mid-flight;
    /// the caller decides whether that matters).
    pub async fn update_task<R, F>(&self, id: &str, f: F) -> Result<Option<R>, SnapError>
    where
        R: Send,
        F: FnOnce(&mut QueueTask) -> R + Send,
    {
        self.queue
            .mutate(|tasks| {
                Ok(tasks.iter_mut().find(|t| t.id == id).map(f))
            })
            .await
    }

    /// Apply `f` to the subscription with the given id, persisting the result.
    pub async fn update_subscription<R, F>(&self, id: &str, f: F) -> Result<Option<R>, SnapError>
    where
        R: Send,
        F: FnOnce(&mut Subscription) -> R + Send,
    {
        self.subscriptions
            .mutate(|subs| Ok(subs.iter_mut().find(|s| s.id == id).map(f)))
            .await
    }

    /// Append a purchase-history entry, trimming to the newest
    /// [`HISTORY_CAP`] entries.
    pub async fn append_history(&self, entry: PurchaseHistoryEntry) -> Result<(), SnapError> {
        self.history
            .mutate(|entries| {
                entries.push(entry);
                if entries.len() > HISTORY_CAP {
                    let excess = entries.len() - HISTORY_CAP;
                    entries.drain(..excess);
                }
                Ok(())
            })
            .await
    }
}
