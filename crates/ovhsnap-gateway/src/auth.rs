// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! API-key authentication middleware.
//!
//! Every control-plane request must carry `X-API-Key` matching the
//! configured shared secret, compared in constant time. Auth can be
//! disabled entirely by configuration (`auth.api_key = None`), in which
//! case all requests pass.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

/// Authentication configuration for the control plane.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected API key. `None` disables authentication.
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Constant-time comparison of the presented key against the secret.
pub fn verify_key(presented: &str, expected: &str) -> bool {
    ring::constant_time::verify_slices_are_equal(presented.as_bytes(), expected.as_bytes())
        .is_ok()
}

/// Middleware validating the `X-API-Key` header.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(ref expected) = auth.api_key else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if verify_key(presented, expected) {
        Ok(next.run(request).await)
    } else {
        Err(ApiError::unauthorized())
    }
}
