// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Polystore contributors
//
// This file is part of Polystore.
//
// Polystore is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Polystore is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Polystore. If not, see <https://www.gnu.org/licenses/>.

//! # Polystore
//!
//! ## Purpose
//! A storage-backend-agnostic key-value abstraction: one uniform contract
//! (set/get/delete/exists/pattern listing/batch ops/transactions/TTL) over
//! heterogeneous storage engines. Three structurally different backends — an
//! in-process map, a relational table, a remote key-value server — behave
//! identically from the caller's point of view.
//!
//! ## What makes the backends interchangeable
//!
//! - **Value codec**: every backend stores the same canonical JSON text;
//!   a missing or expired key always reads back as `Value::Null`.
//! - **Namespace gate**: keys are prefix-scoped internally and de-prefixed
//!   before being returned; callers never see the prefix.
//! - **Pattern matcher**: one restricted glob syntax (`*`, `?`) translated
//!   to each engine's native matching; listing results are always sorted
//!   lexicographically by local key.
//! - **TTL policy**: per-call TTL > adapter default > no expiry, with a
//!   genuine three-variant [`TtlState`] answer to "when does this key die?".
//!
//! Where an engine genuinely cannot match the common behavior, the gap is a
//! documented per-adapter limitation, not a silent divergence — see each
//! backend module.
//!
//! ## Backend Support
//!
//! - **Memory** ([`MemoryAdapter`]): two co-indexed maps, always available
//! - **Relational** (`SqlAdapter`): SQLite table via `sqlx`
//!   (feature: `sql-backend`)
//! - **Remote** (`RedisAdapter`): Redis via an async connection manager
//!   (feature: `redis-backend`)
//!
//! ## Examples
//!
//! ### Basic usage
//! ```rust
//! use polystore::{create_adapter, StorageAdapter, StoreOptions};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = create_adapter("app:", "memory", StoreOptions::default())?;
//! kv.initialize().await?;
//!
//! kv.set("greeting", json!({"lang": "en", "text": "hello"}), None).await?;
//! assert_eq!(kv.get("greeting").await?["text"], json!("hello"));
//!
//! kv.delete("greeting").await?;
//! assert!(!kv.exists("greeting").await?);
//!
//! kv.destroy(false).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### With TTL
//! ```rust
//! use polystore::{MemoryAdapter, StorageAdapter, StoreOptions, TtlState};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = MemoryAdapter::new("session:", &StoreOptions::default())?;
//! kv.initialize().await?;
//!
//! kv.set("abc", json!("data"), Some(30)).await?;
//! assert!(matches!(kv.ttl("abc").await?, TtlState::Expires(_)));
//! # Ok(())
//! # }
//! ```
//!
//! ### Transactions
//! ```rust
//! use polystore::{MemoryAdapter, Operation, OpResult, StorageAdapter, StoreOptions};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kv = MemoryAdapter::new("", &StoreOptions::default())?;
//! kv.initialize().await?;
//!
//! let results = kv
//!     .transaction(vec![
//!         Operation::Set { key: "k".into(), value: json!(1), ttl: None },
//!         Operation::Get { key: "k".into() },
//!         Operation::Delete { key: "k".into() },
//!     ])
//!     .await?;
//! assert_eq!(
//!     results,
//!     vec![OpResult::Set(true), OpResult::Get(json!(1)), OpResult::Delete(true)]
//! );
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

pub mod codec;
pub mod config;
pub mod error;
pub mod memory;
pub mod namespace;
pub mod pattern;
pub mod ttl;

#[cfg(feature = "sql-backend")]
pub mod sql;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use config::{create_adapter, BackendKind, StoreOptions};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryAdapter;
pub use namespace::Namespace;
pub use pattern::GlobPattern;
pub use ttl::TtlState;

#[cfg(feature = "sql-backend")]
pub use sql::SqlAdapter;

#[cfg(feature = "redis-backend")]
pub use redis::RedisAdapter;

/// One element of a [`StorageAdapter::transaction`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Upsert a value, with an optional per-operation TTL override.
    Set {
        /// Local key.
        key: String,
        /// Value to store.
        value: Value,
        /// Per-operation TTL in seconds; resolved like the TTL on `set`.
        ttl: Option<u64>,
    },
    /// Read a value.
    Get {
        /// Local key.
        key: String,
    },
    /// Remove a value.
    Delete {
        /// Local key.
        key: String,
    },
}

/// Per-operation result of a [`StorageAdapter::transaction`] batch,
/// one-to-one and in order with the submitted operations. Each variant
/// carries the same shape the corresponding single-operation call returns.
#[derive(Debug, Clone, PartialEq)]
pub enum OpResult {
    /// Result of a `Set` operation.
    Set(bool),
    /// Result of a `Get` operation (decoded value, `Null` if missing).
    Get(Value),
    /// Result of a `Delete` operation.
    Delete(bool),
}

/// Uniform adapter contract implemented by every backend.
///
/// ## Lifecycle
/// Construct with a namespace and options, then call
/// [`initialize`](Self::initialize) before anything else; every other
/// operation fails with [`StoreError::NotInitialized`] until then.
/// [`destroy`](Self::destroy) releases resources and is safe to call at any
/// point, initialized or not.
///
/// ## Concurrency
/// Every operation is async and may suspend while awaiting backend I/O,
/// including on the in-memory backend, to keep the contract uniform. There
/// is no internal queueing or backpressure; callers limit concurrency
/// themselves if the engine needs it.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Prepare the adapter for use: verify the connection, create the
    /// backing structure if needed, and start the expiry sweeper when one is
    /// configured. Calling it again on an initialized adapter is a no-op.
    async fn initialize(&self) -> StoreResult<()>;

    /// Release resources and cancel any pending sweep. With `hard` set, the
    /// entire backing structure is irreversibly dropped — NOT just this
    /// namespace's entries. Intended for test teardown.
    async fn destroy(&self, hard: bool) -> StoreResult<()>;

    // =========================================================================
    // Single-key operations
    // =========================================================================

    /// Upsert a value. A subsequent `set` to the same key replaces both the
    /// value and the expiry, never merges. Returns `true` barring a backend
    /// fault.
    ///
    /// TTL resolution: `ttl` if nonzero, else the adapter default, else no
    /// expiry.
    async fn set(&self, key: &str, value: Value, ttl: Option<u64>) -> StoreResult<bool>;

    /// Read a value; `Value::Null` for a missing or expired key.
    async fn get(&self, key: &str) -> StoreResult<Value>;

    /// Remove a key.
    ///
    /// ## Returns
    /// Whether a live (non-expired) entry existed and was removed. The
    /// remote backend always returns `true` (documented native limitation).
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Whether a live entry is present. The only way, together with
    /// [`ttl`](Self::ttl), to distinguish "absent" from "present with null
    /// value".
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    // =========================================================================
    // Pattern operations
    // =========================================================================

    /// List local keys matching a glob pattern (`*`, `?`), sorted
    /// lexicographically regardless of backend iteration order.
    ///
    /// Fails with [`StoreError::UnsupportedInClusterMode`] on a
    /// cluster-mode remote backend.
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Remove all keys matching a glob pattern; returns the number removed.
    ///
    /// Fails with [`StoreError::UnsupportedInClusterMode`] on a
    /// cluster-mode remote backend.
    async fn clear(&self, pattern: &str) -> StoreResult<usize>;

    // =========================================================================
    // Batch operations
    // =========================================================================

    /// Upsert many pairs; `ttl` applies to every pair, resolved like the
    /// TTL on [`set`](Self::set). Atomicity is per-backend (see the backend
    /// module docs).
    async fn set_multiple(&self, pairs: &[(String, Value)], ttl: Option<u64>)
        -> StoreResult<bool>;

    /// Read many keys. Always returns exactly one entry per requested key,
    /// in request order, with `Value::Null` for any missing or expired key —
    /// never omits a requested key.
    async fn get_multiple(&self, keys: &[&str]) -> StoreResult<Vec<Value>>;

    // =========================================================================
    // TTL operations
    // =========================================================================

    /// Set a new future expiry on a live key.
    ///
    /// ## Returns
    /// `false` when the key is missing, already expired, or `ttl` is `0`
    /// (clearing an expiry this way is not supported).
    async fn expire(&self, key: &str, ttl: u64) -> StoreResult<bool>;

    /// Query a key's expiry as the three-variant [`TtlState`].
    async fn ttl(&self, key: &str) -> StoreResult<TtlState>;

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Execute an ordered batch of operations, returning one [`OpResult`]
    /// per operation, in order.
    ///
    /// Atomicity varies by backend and is documented there: the relational
    /// backend rolls back fully on any fault; the remote backend executes
    /// one native atomic batch; the in-memory backend is sequential
    /// best-effort (a fault leaves earlier effects applied).
    async fn transaction(&self, ops: Vec<Operation>) -> StoreResult<Vec<OpResult>>;

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The backend type tag.
    fn info(&self) -> BackendKind;

    /// Test-only snapshot of this namespace's stored content, keyed by full
    /// (namespaced) key with raw encoded values. Not part of the production
    /// contract.
    #[doc(hidden)]
    async fn snapshot(&self) -> StoreResult<BTreeMap<String, String>>;
}
