// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST control plane for the ovhsnap engine: queue-task CRUD, purchase
//! history, aggregate stats, subscription management, and monitor control,
//! behind constant-time `X-API-Key` authentication.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod models;
pub mod server;

pub use auth::AuthConfig;
pub use error::ApiError;
pub use server::{build_router, start_server, AppState};
