// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-account client cache.

use std::sync::Arc;

use dashmap::DashMap;

use ovhsnap_core::{Account, SnapError};

use crate::client::OvhClient;

/// Caches one [`OvhClient`] per account id.
///
/// Account keys are immutable after creation, so a cached client never goes
/// stale; deleting an account should be paired with [`ClientPool::evict`].
#[derive(Default)]
pub struct ClientPool {
    clients: DashMap<String, Arc<OvhClient>>,
    base_url_override: Option<String>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool whose clients all target one base URL (tests point this at a
    /// mock server instead of the account's endpoint region).
    pub fn with_base_url(url: impl Into<String>) -> Self {
        Self {
            clients: DashMap::new(),
            base_url_override: Some(url.into()),
        }
    }

    /// Fetch or build the client for an account.
    pub fn client_for(&self, account: &Account) -> Result<Arc<OvhClient>, SnapError> {
        if let Some(client) = self.clients.get(&account.id) {
            return Ok(Arc::clone(&client));
        }
        let mut client = OvhClient::new(account.clone())?;
        if let Some(ref url) = self.base_url_override {
            client = client.with_base_url(url.clone());
        }
        let client = Arc::new(client);
        self.clients
            .insert(account.id.clone(), Arc::clone(&client));
        Ok(client)
    }

    /// Drop the cached client for a removed account.
    pub fn evict(&self, account_id: &str) {
        self.clients.remove(account_id);
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
