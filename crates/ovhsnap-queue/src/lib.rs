// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Purchase queue processing for the ovhsnap engine.
//!
//! A multi-tenant scheduler that races availability checks against each
//! task's retry interval, converts stock into order attempts, and advances
//! multi-unit tasks to completion.

pub mod scheduler;

pub use scheduler::{worker_cap, QueueScheduler, TICK_INTERVAL};
