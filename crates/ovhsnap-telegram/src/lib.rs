// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram notification sink for the ovhsnap engine.
//!
//! Implements [`Notifier`] over the Telegram Bot API via teloxide. Delivery
//! is strictly best-effort: identical texts within a ten-second window are
//! coalesced, and send failures are logged and dropped so callers never
//! block on Telegram.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Recipient};
use tracing::{debug, warn};

use ovhsnap_config::TelegramConfig;
use ovhsnap_core::{Notifier, SnapError};

/// Window within which identical texts are coalesced into one message.
pub const DEDUP_WINDOW: Duration = Duration::from_secs(10);

/// Telegram-backed notifier bound to one chat.
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
    dedup_window: Duration,
    recent: Mutex<HashMap<u64, Instant>>,
}

impl TelegramNotifier {
    /// Create a notifier from the Telegram config section.
    ///
    /// Requires both `bot_token` and `chat_id` to be set.
    pub fn new(config: &TelegramConfig) -> Result<Self, SnapError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            SnapError::Config("telegram.bot_token is required for the Telegram notifier".into())
        })?;
        if token.is_empty() {
            return Err(SnapError::Config("telegram.bot_token cannot be empty".into()));
        }
        let chat_id = config.chat_id.ok_or_else(|| {
            SnapError::Config("telegram.chat_id is required for the Telegram notifier".into())
        })?;

        Ok(Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
            dedup_window: DEDUP_WINDOW,
            recent: Mutex::new(HashMap::new()),
        })
    }

    /// Override the dedup window (tests).
    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// True when an identical text was sent within the dedup window.
    /// Records the text as sent otherwise.
    fn is_duplicate(&self, text: &str) -> bool {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let key = hasher.finish();

        let mut recent = self.recent.lock().expect("dedup map poisoned");
        let window = self.dedup_window;
        recent.retain(|_, sent_at| sent_at.elapsed() < window);
        if recent.contains_key(&key) {
            return true;
        }
        recent.insert(key, Instant::now());
        false
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), SnapError> {
        if self.is_duplicate(text) {
            debug!("duplicate notification coalesced");
            return Ok(());
        }

        match self
            .bot
            .send_message(Recipient::Id(self.chat_id), text)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                // Best-effort contract: log and drop, never surface to callers.
                warn!(error = %e, "telegram send failed, dropping notification");
                Ok(())
            }
        }
    }
}
