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

//! Relational adapter (SQLite via `sqlx`).
//!
//! ## Purpose
//! Persistent, transactional backend over one relational table.
//!
//! ## Schema
//! ```sql
//! CREATE TABLE kv_store (
//!     key        TEXT PRIMARY KEY,
//!     value      TEXT NOT NULL,
//!     expires_at BIGINT,              -- epoch millis, NULL = no expiry
//!     created_at BIGINT NOT NULL,
//!     updated_at BIGINT NOT NULL
//! );
//!
//! -- Partial index so the sweep deletes expired rows without a full scan
//! CREATE INDEX idx_kv_store_ttl_cleanup
//! ON kv_store(expires_at, key)
//! WHERE expires_at IS NOT NULL;
//! ```
//!
//! Expiry filtering is `expires_at IS NULL OR expires_at > now` on every
//! statement that needs a live row; a periodic sweep bulk-deletes past-expiry
//! rows on top.
//!
//! ## Pattern matching
//! Globs translate to SQL `LIKE` (`*` -> `%`, `?` -> `_`). Literal `%`/`_`
//! characters in keys are not escaped before substitution — such keys can
//! over-match. Documented limitation, kept as-is.
//!
//! ## Transactions
//! `transaction` runs inside one database transaction: any fault rolls the
//! whole batch back and propagates, leaving no partial effect.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use sqlx::{Row, Sqlite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::codec;
use crate::config::{BackendKind, StoreOptions};
use crate::error::{StoreError, StoreResult};
use crate::namespace::Namespace;
use crate::pattern::GlobPattern;
use crate::ttl::{now_millis, TtlPolicy, TtlState};
use crate::{OpResult, Operation, StorageAdapter};

/// Table used when `table_name` is not configured.
pub const DEFAULT_TABLE: &str = "kv_store";

const LIVE_FILTER: &str = "(expires_at IS NULL OR expires_at > ?)";

async fn upsert<'e, E>(
    executor: E,
    table: &str,
    full_key: &str,
    raw: &str,
    expires_at: Option<i64>,
) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let now = now_millis();
    let sql = format!(
        "INSERT INTO {} (key, value, expires_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET \
             value = excluded.value, \
             expires_at = excluded.expires_at, \
             updated_at = excluded.updated_at",
        table
    );
    sqlx::query(&sql)
        .bind(full_key)
        .bind(raw)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(())
}

async fn fetch_raw<'e, E>(
    executor: E,
    table: &str,
    full_key: &str,
    now: i64,
) -> StoreResult<Option<String>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT value FROM {} WHERE key = ? AND {}",
        table, LIVE_FILTER
    );
    let row = sqlx::query(&sql)
        .bind(full_key)
        .bind(now)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(|r| r.get::<String, _>("value")))
}

async fn delete_live<'e, E>(
    executor: E,
    table: &str,
    full_key: &str,
    now: i64,
) -> StoreResult<bool>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!("DELETE FROM {} WHERE key = ? AND {}", table, LIVE_FILTER);
    let result = sqlx::query(&sql)
        .bind(full_key)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn sweep(pool: &SqlitePool, table: &str) -> StoreResult<u64> {
    let sql = format!(
        "DELETE FROM {} WHERE expires_at IS NOT NULL AND expires_at <= ?",
        table
    );
    let result = sqlx::query(&sql).bind(now_millis()).execute(pool).await?;
    Ok(result.rows_affected())
}

/// Relational adapter over a caller-supplied SQLite pool.
///
/// ## Example
/// ```rust,no_run
/// use polystore::{SqlAdapter, StorageAdapter, StoreOptions};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = sqlx::sqlite::SqlitePoolOptions::new()
///     .max_connections(1)
///     .connect("sqlite::memory:")
///     .await?;
///
/// let kv = SqlAdapter::new("app:", pool, &StoreOptions::default())?;
/// kv.initialize().await?;
///
/// kv.set("key", json!("value"), None).await?;
/// assert_eq!(kv.get("key").await?, json!("value"));
/// # Ok(())
/// # }
/// ```
pub struct SqlAdapter {
    namespace: Namespace,
    ttl: TtlPolicy,
    table: String,
    cleanup_interval: u64,
    pool: SqlitePool,
    initialized: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SqlAdapter {
    /// Create a relational adapter. The pool is an external collaborator:
    /// the adapter never closes it, only drops its clone on `destroy`.
    ///
    /// `table_name` is interpolated verbatim into SQL statements and must be
    /// a plain identifier under the caller's control.
    pub fn new(namespace: &str, pool: SqlitePool, options: &StoreOptions) -> StoreResult<Self> {
        Ok(Self {
            namespace: Namespace::new(namespace)?,
            ttl: TtlPolicy::new(options.default_ttl),
            table: options
                .table_name
                .clone()
                .unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            cleanup_interval: options.ttl_cleanup_interval,
            pool,
            initialized: AtomicBool::new(false),
            sweeper: Mutex::new(None),
        })
    }

    fn ensure_initialized(&self) -> StoreResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    fn like_pattern(&self, pattern: &GlobPattern) -> String {
        format!("{}{}", self.namespace.prefix(), pattern.to_like())
    }
}

#[async_trait]
impl StorageAdapter for SqlAdapter {
    async fn initialize(&self) -> StoreResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at BIGINT,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )",
            self.table
        );
        sqlx::query(&create).execute(&self.pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_ttl_cleanup \
             ON {}(expires_at, key) \
             WHERE expires_at IS NOT NULL",
            self.table, self.table
        );
        sqlx::query(&index).execute(&self.pool).await?;

        if self.cleanup_interval > 0 {
            let pool = self.pool.clone();
            let table = self.table.clone();
            let period = Duration::from_secs(self.cleanup_interval);
            // Sleep-then-sweep: the next tick is only scheduled after the
            // previous sweep finished, so ticks never overlap.
            let handle = tokio::spawn(async move {
                loop {
                    tokio::time::sleep(period).await;
                    match sweep(&pool, &table).await {
                        Ok(removed) if removed > 0 => {
                            tracing::debug!("swept {} expired rows", removed);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("ttl sweep failed: {}", e),
                    }
                }
            });
            *self.sweeper.lock().await = Some(handle);
        }

        Ok(())
    }

    async fn destroy(&self, hard: bool) -> StoreResult<()> {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        self.initialized.store(false, Ordering::SeqCst);
        if hard {
            // Drops the whole table, every namespace included.
            let drop_table = format!("DROP TABLE IF EXISTS {}", self.table);
            sqlx::query(&drop_table).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<u64>) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let raw = codec::encode(&value)?;
        let full = self.namespace.apply(key);
        upsert(
            &self.pool,
            &self.table,
            &full,
            &raw,
            self.ttl.expires_at(ttl),
        )
        .await?;
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Value> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let raw = fetch_raw(&self.pool, &self.table, &full, now_millis()).await?;
        Ok(codec::decode(raw.as_deref()))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        delete_live(&self.pool, &self.table, &full, now_millis()).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let sql = format!(
            "SELECT 1 FROM {} WHERE key = ? AND {}",
            self.table, LIVE_FILTER
        );
        let row = sqlx::query(&sql)
            .bind(&full)
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.ensure_initialized()?;
        let glob = GlobPattern::new(pattern);
        let sql = format!(
            "SELECT key FROM {} WHERE key LIKE ? AND {}",
            self.table, LIVE_FILTER
        );
        let rows = sqlx::query(&sql)
            .bind(self.like_pattern(&glob))
            .bind(now_millis())
            .fetch_all(&self.pool)
            .await?;

        let mut out: Vec<String> = rows
            .into_iter()
            .filter_map(|row| {
                let full: String = row.get("key");
                self.namespace.strip(&full).map(str::to_string)
            })
            .collect();
        out.sort_unstable();
        Ok(out)
    }

    async fn clear(&self, pattern: &str) -> StoreResult<usize> {
        self.ensure_initialized()?;
        let glob = GlobPattern::new(pattern);
        let sql = format!(
            "DELETE FROM {} WHERE key LIKE ? AND {}",
            self.table, LIVE_FILTER
        );
        let result = sqlx::query(&sql)
            .bind(self.like_pattern(&glob))
            .bind(now_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn set_multiple(
        &self,
        pairs: &[(String, Value)],
        ttl: Option<u64>,
    ) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let mut tx = self.pool.begin().await?;
        for (key, value) in pairs {
            let raw = codec::encode(value)?;
            let full = self.namespace.apply(key);
            upsert(&mut *tx, &self.table, &full, &raw, self.ttl.expires_at(ttl)).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn get_multiple(&self, keys: &[&str]) -> StoreResult<Vec<Value>> {
        self.ensure_initialized()?;
        let now = now_millis();
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let full = self.namespace.apply(key);
            let raw = fetch_raw(&self.pool, &self.table, &full, now).await?;
            results.push(codec::decode(raw.as_deref()));
        }
        Ok(results)
    }

    async fn expire(&self, key: &str, ttl: u64) -> StoreResult<bool> {
        self.ensure_initialized()?;
        if ttl == 0 {
            return Ok(false);
        }
        let now = now_millis();
        let full = self.namespace.apply(key);
        let sql = format!(
            "UPDATE {} SET expires_at = ?, updated_at = ? WHERE key = ? AND {}",
            self.table, LIVE_FILTER
        );
        let result = sqlx::query(&sql)
            .bind(now + (ttl as i64) * 1000)
            .bind(now)
            .bind(&full)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ttl(&self, key: &str) -> StoreResult<TtlState> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let sql = format!(
            "SELECT expires_at FROM {} WHERE key = ? AND {}",
            self.table, LIVE_FILTER
        );
        let row = sqlx::query(&sql)
            .bind(&full)
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            None => TtlState::NotFound,
            Some(row) => match row.get::<Option<i64>, _>("expires_at") {
                Some(at) => TtlState::from_expiry_millis(at),
                None => TtlState::NoExpiry,
            },
        })
    }

    async fn transaction(&self, ops: Vec<Operation>) -> StoreResult<Vec<OpResult>> {
        self.ensure_initialized()?;
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(ops.len());
        for op in &ops {
            let result = match op {
                Operation::Set { key, value, ttl } => {
                    let raw = codec::encode(value)?;
                    let full = self.namespace.apply(key);
                    upsert(&mut *tx, &self.table, &full, &raw, self.ttl.expires_at(*ttl))
                        .await?;
                    OpResult::Set(true)
                }
                Operation::Get { key } => {
                    let full = self.namespace.apply(key);
                    let raw = fetch_raw(&mut *tx, &self.table, &full, now_millis()).await?;
                    OpResult::Get(codec::decode(raw.as_deref()))
                }
                Operation::Delete { key } => {
                    let full = self.namespace.apply(key);
                    let removed =
                        delete_live(&mut *tx, &self.table, &full, now_millis()).await?;
                    OpResult::Delete(removed)
                }
            };
            results.push(result);
        }
        // Dropping the transaction on an early `?` return rolls everything
        // back; only a fully successful batch reaches the commit.
        tx.commit().await?;
        Ok(results)
    }

    fn info(&self) -> BackendKind {
        BackendKind::Relational
    }

    async fn snapshot(&self) -> StoreResult<BTreeMap<String, String>> {
        let sql = format!("SELECT key, value FROM {} WHERE key LIKE ?", self.table);
        let rows = sqlx::query(&sql)
            .bind(format!("{}%", self.namespace.prefix()))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }
}
