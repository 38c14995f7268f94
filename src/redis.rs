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

//! Remote adapter (Redis).
//!
//! ## Purpose
//! Distributed backend over a caller-supplied async connection manager.
//! Every operation maps to one native command (pipelines for the plural
//! forms); TTL uses the server's native relative-seconds expiry.
//!
//! ## Documented limitations
//! - `delete` always returns `true`, whether or not the key existed.
//! - Pattern operations (`keys`, `clear`) fail fast with
//!   [`StoreError::UnsupportedInClusterMode`] when `is_cluster` is set:
//!   a cluster spreads the keyspace across nodes and a single SCAN cannot
//!   cover it.
//! - `clear` is a non-atomic scan-then-delete two-step: a key written
//!   between the steps can be missed. Best-effort, not snapshot-consistent.
//! - A namespace is mandatory here — without one, pattern scans would run
//!   over the entire shared keyspace.
//! - Sequential-caller ordering is only as strong as the connection's
//!   command pipeline ordering.
//!
//! ## Transactions
//! `transaction` queues all operations into one `MULTI`/`EXEC` batch. The
//! raw replies are reinterpreted into the documented per-operation shapes:
//! the `OK` acknowledgment becomes `true`, a bulk reply decodes through the
//! value codec, and the `DEL` count collapses to `count > 0`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use crate::codec;
use crate::config::{BackendKind, StoreOptions};
use crate::error::{StoreError, StoreResult};
use crate::namespace::Namespace;
use crate::pattern::GlobPattern;
use crate::ttl::{TtlPolicy, TtlState};
use crate::{OpResult, Operation, StorageAdapter};

/// Remote adapter over a caller-supplied Redis connection manager.
///
/// ## Example
/// ```rust,no_run
/// use polystore::{RedisAdapter, StorageAdapter, StoreOptions};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = redis::Client::open("redis://localhost:6379")?;
/// let manager = redis::aio::ConnectionManager::new(client).await?;
///
/// let kv = RedisAdapter::new("app:", manager, &StoreOptions::default())?;
/// kv.initialize().await?;
///
/// kv.set("key", json!("value"), None).await?;
/// assert_eq!(kv.get("key").await?, json!("value"));
/// # Ok(())
/// # }
/// ```
pub struct RedisAdapter {
    namespace: Namespace,
    ttl: TtlPolicy,
    is_cluster: bool,
    manager: ConnectionManager,
    initialized: AtomicBool,
}

impl RedisAdapter {
    /// Create a remote adapter. Fails with
    /// [`StoreError::InvalidNamespace`] when the namespace is empty or not
    /// `:`-terminated; an empty namespace is rejected because pattern scans
    /// would otherwise run unscoped over a shared server.
    pub fn new(
        namespace: &str,
        manager: ConnectionManager,
        options: &StoreOptions,
    ) -> StoreResult<Self> {
        Ok(Self {
            namespace: Namespace::non_empty(namespace)?,
            ttl: TtlPolicy::new(options.default_ttl),
            is_cluster: options.is_cluster,
            manager,
            initialized: AtomicBool::new(false),
        })
    }

    fn ensure_initialized(&self) -> StoreResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    fn ensure_scannable(&self, operation: &'static str) -> StoreResult<()> {
        if self.is_cluster {
            Err(StoreError::UnsupportedInClusterMode(operation))
        } else {
            Ok(())
        }
    }

    /// ConnectionManager multiplexes internally; a clone per call is the
    /// intended usage.
    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Cursor-driven SCAN narrowed to the literal prefix of the glob, then
    /// refined client-side with the full anchored regex.
    async fn scan_local_keys(&self, glob: &GlobPattern) -> StoreResult<Vec<String>> {
        let regex = glob.to_regex()?;
        let match_pattern = format!("{}{}*", self.namespace.prefix(), glob.literal_prefix());
        let mut conn = self.conn();
        let mut cursor: u64 = 0;
        let mut out = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&match_pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;
            for full in batch {
                if let Some(local) = self.namespace.strip(&full) {
                    if regex.is_match(local) {
                        out.push(local.to_string());
                    }
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    /// Reinterpret one raw EXEC reply into the documented per-operation
    /// result shape.
    fn coerce_reply(op: &Operation, reply: redis::Value) -> OpResult {
        match op {
            Operation::Set { .. } => OpResult::Set(matches!(reply, redis::Value::Okay)),
            Operation::Get { .. } => {
                let raw = match reply {
                    redis::Value::BulkString(bytes) => {
                        Some(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    redis::Value::SimpleString(text) => Some(text),
                    _ => None,
                };
                OpResult::Get(codec::decode(raw.as_deref()))
            }
            Operation::Delete { .. } => {
                OpResult::Delete(matches!(reply, redis::Value::Int(n) if n > 0))
            }
        }
    }
}

#[async_trait]
impl StorageAdapter for RedisAdapter {
    async fn initialize(&self) -> StoreResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut conn = self.conn();
        // Round-trip once so a dead handle fails here, not on first use.
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn destroy(&self, hard: bool) -> StoreResult<()> {
        self.initialized.store(false, Ordering::SeqCst);
        if hard {
            // Flushes the entire database, every namespace included.
            let mut conn = self.conn();
            redis::cmd("FLUSHDB").query_async::<()>(&mut conn).await?;
        }
        Ok(())
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<u64>) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let raw = codec::encode(&value)?;
        let full = self.namespace.apply(key);
        let mut conn = self.conn();
        match self.ttl.effective(ttl) {
            Some(secs) => conn.set_ex::<_, _, ()>(&full, raw, secs).await?,
            None => conn.set::<_, _, ()>(&full, raw).await?,
        }
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Value> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(&full).await?;
        Ok(codec::decode(raw.as_deref()))
    }

    /// Always returns `true` — the native command's outcome is not
    /// inspected. Documented limitation of this backend.
    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let mut conn = self.conn();
        conn.del::<_, ()>(&full).await?;
        Ok(true)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let mut conn = self.conn();
        Ok(conn.exists(&full).await?)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.ensure_initialized()?;
        self.ensure_scannable("keys()")?;
        self.scan_local_keys(&GlobPattern::new(pattern)).await
    }

    async fn clear(&self, pattern: &str) -> StoreResult<usize> {
        self.ensure_initialized()?;
        self.ensure_scannable("clear()")?;
        // Non-atomic two-step: list matching keys, then delete them. A key
        // written between the steps is missed; the count is DEL's actual
        // removal count, so concurrent deletions are not over-counted.
        let locals = self.scan_local_keys(&GlobPattern::new(pattern)).await?;
        if locals.is_empty() {
            return Ok(0);
        }
        let fulls: Vec<String> = locals
            .iter()
            .map(|local| self.namespace.apply(local))
            .collect();
        let mut conn = self.conn();
        let removed: usize = conn.del(&fulls).await?;
        Ok(removed)
    }

    async fn set_multiple(
        &self,
        pairs: &[(String, Value)],
        ttl: Option<u64>,
    ) -> StoreResult<bool> {
        self.ensure_initialized()?;
        if pairs.is_empty() {
            return Ok(true);
        }
        let mut pipe = redis::pipe();
        for (key, value) in pairs {
            let raw = codec::encode(value)?;
            let full = self.namespace.apply(key);
            match self.ttl.effective(ttl) {
                Some(secs) => {
                    pipe.cmd("SET").arg(&full).arg(raw).arg("EX").arg(secs);
                }
                None => {
                    pipe.cmd("SET").arg(&full).arg(raw);
                }
            }
        }
        let mut conn = self.conn();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(true)
    }

    async fn get_multiple(&self, keys: &[&str]) -> StoreResult<Vec<Value>> {
        self.ensure_initialized()?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("GET").arg(self.namespace.apply(key));
        }
        let mut conn = self.conn();
        let raws: Vec<Option<String>> = pipe.query_async(&mut conn).await?;
        Ok(raws.iter().map(|raw| codec::decode(raw.as_deref())).collect())
    }

    async fn expire(&self, key: &str, ttl: u64) -> StoreResult<bool> {
        self.ensure_initialized()?;
        if ttl == 0 {
            // EXPIRE key 0 would delete the key; a zero ttl is "unsupported"
            // by contract, not a deletion.
            return Ok(false);
        }
        let full = self.namespace.apply(key);
        let mut conn = self.conn();
        Ok(conn.expire(&full, ttl as i64).await?)
    }

    async fn ttl(&self, key: &str) -> StoreResult<TtlState> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let mut conn = self.conn();
        let secs: i64 = conn.ttl(&full).await?;
        Ok(match secs {
            -2 => TtlState::NotFound,
            -1 => TtlState::NoExpiry,
            secs if secs >= 0 => {
                TtlState::Expires(SystemTime::now() + Duration::from_secs(secs as u64))
            }
            _ => TtlState::NotFound,
        })
    }

    async fn transaction(&self, ops: Vec<Operation>) -> StoreResult<Vec<OpResult>> {
        self.ensure_initialized()?;
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                Operation::Set { key, value, ttl } => {
                    let raw = codec::encode(value)?;
                    let full = self.namespace.apply(key);
                    match self.ttl.effective(*ttl) {
                        Some(secs) => {
                            pipe.cmd("SET").arg(&full).arg(raw).arg("EX").arg(secs);
                        }
                        None => {
                            pipe.cmd("SET").arg(&full).arg(raw);
                        }
                    }
                }
                Operation::Get { key } => {
                    pipe.cmd("GET").arg(self.namespace.apply(key));
                }
                Operation::Delete { key } => {
                    pipe.cmd("DEL").arg(self.namespace.apply(key));
                }
            }
        }
        let mut conn = self.conn();
        let replies: Vec<redis::Value> = pipe.query_async(&mut conn).await?;
        Ok(ops
            .iter()
            .zip(replies)
            .map(|(op, reply)| Self::coerce_reply(op, reply))
            .collect())
    }

    fn info(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn snapshot(&self) -> StoreResult<BTreeMap<String, String>> {
        let locals = self.scan_local_keys(&GlobPattern::new("*")).await?;
        let mut out = BTreeMap::new();
        if locals.is_empty() {
            return Ok(out);
        }
        let mut pipe = redis::pipe();
        for local in &locals {
            pipe.cmd("GET").arg(self.namespace.apply(local));
        }
        let mut conn = self.conn();
        let raws: Vec<Option<String>> = pipe.query_async(&mut conn).await?;
        for (local, raw) in locals.iter().zip(raws) {
            if let Some(raw) = raw {
                out.insert(self.namespace.apply(local), raw);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // These tests require a running Redis instance on the default port.
    async fn adapter(namespace: &str, options: &StoreOptions) -> RedisAdapter {
        let client = redis::Client::open("redis://localhost:6379")
            .expect("invalid Redis URL");
        let manager = ConnectionManager::new(client)
            .await
            .expect("failed to connect to Redis (ensure Redis is running)");
        let kv = RedisAdapter::new(namespace, manager, options).unwrap();
        kv.initialize().await.unwrap();
        kv
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn set_get_delete() {
        let kv = adapter("polystore-test:", &StoreOptions::default()).await;
        kv.clear("*").await.unwrap();

        kv.set("key1", json!({"a": 1}), None).await.unwrap();
        assert_eq!(kv.get("key1").await.unwrap(), json!({"a": 1}));
        assert!(kv.exists("key1").await.unwrap());

        // Always true, present or not (documented limitation).
        assert!(kv.delete("key1").await.unwrap());
        assert!(kv.delete("key1").await.unwrap());
        assert_eq!(kv.get("key1").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    #[ignore]
    async fn keys_sorted_and_clear_scoped() {
        let kv = adapter("polystore-test-keys:", &StoreOptions::default()).await;
        kv.clear("*").await.unwrap();

        for key in ["user:2", "user:1", "other:1"] {
            kv.set(key, json!(1), None).await.unwrap();
        }
        assert_eq!(
            kv.keys("*").await.unwrap(),
            vec!["other:1", "user:1", "user:2"]
        );
        assert_eq!(kv.clear("user:*").await.unwrap(), 2);
        assert_eq!(kv.keys("*").await.unwrap(), vec!["other:1"]);

        kv.clear("*").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn ttl_tri_state() {
        let kv = adapter("polystore-test-ttl:", &StoreOptions::default()).await;
        kv.clear("*").await.unwrap();

        kv.set("forever", json!(1), None).await.unwrap();
        kv.set("fleeting", json!(1), Some(60)).await.unwrap();

        assert_eq!(kv.ttl("forever").await.unwrap(), TtlState::NoExpiry);
        assert!(matches!(
            kv.ttl("fleeting").await.unwrap(),
            TtlState::Expires(_)
        ));
        assert_eq!(kv.ttl("absent").await.unwrap(), TtlState::NotFound);

        assert!(kv.expire("forever", 60).await.unwrap());
        assert!(!kv.expire("absent", 60).await.unwrap());
        assert!(!kv.expire("forever", 0).await.unwrap());

        kv.clear("*").await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn transaction_coerces_raw_replies() {
        let kv = adapter("polystore-test-tx:", &StoreOptions::default()).await;
        kv.clear("*").await.unwrap();

        let results = kv
            .transaction(vec![
                Operation::Set {
                    key: "k1".into(),
                    value: json!("v1"),
                    ttl: None,
                },
                Operation::Get { key: "k1".into() },
                Operation::Delete { key: "k1".into() },
                Operation::Delete {
                    key: "missing".into(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(
            results,
            vec![
                OpResult::Set(true),
                OpResult::Get(json!("v1")),
                OpResult::Delete(true),
                OpResult::Delete(false),
            ]
        );
    }

    #[tokio::test]
    #[ignore]
    async fn cluster_mode_gates_pattern_operations() {
        let options = StoreOptions {
            is_cluster: true,
            ..StoreOptions::default()
        };
        let kv = adapter("polystore-test-cluster:", &options).await;

        assert!(matches!(
            kv.keys("*").await,
            Err(StoreError::UnsupportedInClusterMode(_))
        ));
        assert!(matches!(
            kv.clear("*").await,
            Err(StoreError::UnsupportedInClusterMode(_))
        ));

        // Non-pattern operations still work in cluster mode.
        kv.set("k", json!(1), None).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), json!(1));
        kv.delete("k").await.unwrap();
    }
}
