// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the ovhsnap acquisition engine.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all ovhsnap crates.
///
/// Every upstream failure is mapped into one of these variants so the queue
/// scheduler can decide between retrying on the next tick and terminating a
/// task. See [`SnapError::is_transient`] and [`SnapError::is_fatal`].
#[derive(Debug, Error)]
pub enum SnapError {
    /// Configuration errors (invalid TOML, missing required fields, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence errors (file I/O, serialization) that did not corrupt state.
    #[error("store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A state file exists but cannot be parsed. The engine refuses to start
    /// rather than silently overwriting operator data.
    #[error("corrupt state file {path}: {message}")]
    CorruptState { path: String, message: String },

    /// OVH rejected the credentials (401/403). Terminal for the task.
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Plan, datacenter, or resource does not exist (404). Terminal for the task.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// OVH reported a conflicting concurrent operation (409).
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// OVH rate limiting (429). The scheduler backs off before retrying.
    #[error("rate limited: {message}")]
    RateLimit { message: String },

    /// Upstream 5xx.
    #[error("upstream error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-2xx API response, kept with its status and OVH error code.
    #[error("api error ({status}/{code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Connection-level failure before a status code was received.
    #[error("network error: {message}")]
    Network { message: String },

    /// A step or sequence exceeded its deadline.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Cart creation failed; the order attempt is aborted.
    #[error("cart creation failed: {message}")]
    CartCreateFailed { message: String },

    /// OVH rejected the add-to-cart for lack of stock (lost the race).
    #[error("plan not available: {message}")]
    NotAvailable { message: String },

    /// Notification delivery failed. Callers log and drop.
    #[error("notification error: {0}")]
    Notify(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SnapError {
    /// Classify an HTTP status plus message into the API error taxonomy.
    pub fn from_status(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => SnapError::Auth { status, message },
            404 => SnapError::NotFound { message },
            409 => SnapError::Conflict { message },
            429 => SnapError::RateLimit { message },
            500..=599 => SnapError::Server { status, message },
            _ => SnapError::Api {
                status,
                code: code.into(),
                message,
            },
        }
    }

    /// True for errors the scheduler retries on the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SnapError::Conflict { .. }
                | SnapError::RateLimit { .. }
                | SnapError::Server { .. }
                | SnapError::Network { .. }
                | SnapError::Timeout { .. }
                | SnapError::CartCreateFailed { .. }
                | SnapError::NotAvailable { .. }
        )
    }

    /// True for errors that terminate a queue task (operator must intervene).
    pub fn is_fatal(&self) -> bool {
        matches!(self, SnapError::Auth { .. } | SnapError::NotFound { .. })
    }
}
