// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-file persistence for the ovhsnap engine.
//!
//! Each collection is one pretty-printed JSON file replaced atomically via
//! write-temp-then-rename, guarded by a per-collection reader-writer lock.
//! Corrupt files fail closed at startup; the operator must intervene.

pub mod collection;
pub mod store;

pub use collection::Collection;
pub use store::Store;
