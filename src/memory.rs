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

//! In-memory adapter.
//!
//! ## Purpose
//! HashMap-based backend for testing and single-process scenarios.
//!
//! ## Layout
//! Two co-indexed maps keyed by full key — the value store and the expiry
//! store — guarded as one unit by a single `RwLock` so that the lazy expiry
//! check plus mutation is atomic. Expiry is lazy delete-on-read, with an
//! optional periodic sweep on top.
//!
//! ## Limitations
//! - Not persistent, not distributed.
//! - `transaction` is sequential best-effort: there is no rollback, and a
//!   failing operation leaves earlier effects applied.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::codec;
use crate::config::{BackendKind, StoreOptions};
use crate::error::{StoreError, StoreResult};
use crate::namespace::Namespace;
use crate::pattern::GlobPattern;
use crate::ttl::{is_live, now_millis, TtlPolicy, TtlState};
use crate::{OpResult, Operation, StorageAdapter};

/// Value store and expiry store, mutated only as a unit.
#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, String>,
    expiries: HashMap<String, i64>,
}

impl MemoryState {
    /// Lazy expiry: drop the entry when its expiry is past. Returns whether
    /// the entry was purged.
    fn purge_if_expired(&mut self, full_key: &str, now: i64) -> bool {
        match self.expiries.get(full_key) {
            Some(&at) if at <= now => {
                self.values.remove(full_key);
                self.expiries.remove(full_key);
                true
            }
            _ => false,
        }
    }

    fn is_live(&self, full_key: &str, now: i64) -> bool {
        self.values.contains_key(full_key) && is_live(self.expiries.get(full_key).copied(), now)
    }

    fn insert(&mut self, full_key: String, raw: String, expires_at: Option<i64>) {
        match expires_at {
            Some(at) => {
                self.expiries.insert(full_key.clone(), at);
            }
            None => {
                self.expiries.remove(&full_key);
            }
        }
        self.values.insert(full_key, raw);
    }

    fn sweep(&mut self, now: i64) -> usize {
        let expired: Vec<String> = self
            .expiries
            .iter()
            .filter(|(_, &at)| at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.values.remove(key);
            self.expiries.remove(key);
        }
        expired.len()
    }
}

/// In-memory adapter over two co-indexed maps.
///
/// ## Example
/// ```rust
/// use polystore::{MemoryAdapter, StorageAdapter, StoreOptions};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let kv = MemoryAdapter::new("app:", &StoreOptions::default())?;
/// kv.initialize().await?;
///
/// kv.set("key", json!("value"), None).await?;
/// assert_eq!(kv.get("key").await?, json!("value"));
/// # Ok(())
/// # }
/// ```
pub struct MemoryAdapter {
    namespace: Namespace,
    ttl: TtlPolicy,
    cleanup_interval: u64,
    state: Arc<RwLock<MemoryState>>,
    initialized: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryAdapter {
    /// Create an in-memory adapter. Uses `default_ttl` and
    /// `ttl_cleanup_interval` from the options; the maps are owned by the
    /// adapter, no external handle is involved.
    pub fn new(namespace: &str, options: &StoreOptions) -> StoreResult<Self> {
        Ok(Self {
            namespace: Namespace::new(namespace)?,
            ttl: TtlPolicy::new(options.default_ttl),
            cleanup_interval: options.ttl_cleanup_interval,
            state: Arc::new(RwLock::new(MemoryState::default())),
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
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn initialize(&self) -> StoreResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.cleanup_interval > 0 {
            let state = Arc::clone(&self.state);
            let period = Duration::from_secs(self.cleanup_interval);
            // Sleep-then-sweep: the next tick is only scheduled after the
            // previous sweep finished, so ticks never overlap.
            let handle = tokio::spawn(async move {
                loop {
                    tokio::time::sleep(period).await;
                    let removed = state.write().await.sweep(now_millis());
                    if removed > 0 {
                        tracing::debug!("swept {} expired entries", removed);
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
            let mut state = self.state.write().await;
            state.values.clear();
            state.expiries.clear();
        }
        Ok(())
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<u64>) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let raw = codec::encode(&value)?;
        let full = self.namespace.apply(key);
        let expires_at = self.ttl.expires_at(ttl);
        self.state.write().await.insert(full, raw, expires_at);
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Value> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let mut state = self.state.write().await;
        state.purge_if_expired(&full, now_millis());
        Ok(codec::decode(state.values.get(&full).map(String::as_str)))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let mut state = self.state.write().await;
        state.purge_if_expired(&full, now_millis());
        let removed = state.values.remove(&full).is_some();
        state.expiries.remove(&full);
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let mut state = self.state.write().await;
        state.purge_if_expired(&full, now_millis());
        Ok(state.values.contains_key(&full))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.ensure_initialized()?;
        let regex = GlobPattern::new(pattern).to_regex()?;
        let now = now_millis();
        let state = self.state.read().await;
        let mut out: Vec<String> = state
            .values
            .keys()
            .filter(|full| state.is_live(full, now))
            .filter_map(|full| self.namespace.strip(full))
            .filter(|local| regex.is_match(local))
            .map(str::to_string)
            .collect();
        out.sort_unstable();
        Ok(out)
    }

    async fn clear(&self, pattern: &str) -> StoreResult<usize> {
        self.ensure_initialized()?;
        let regex = GlobPattern::new(pattern).to_regex()?;
        let now = now_millis();
        let mut guard = self.state.write().await;
        let MemoryState { values, expiries } = &mut *guard;
        let doomed: Vec<String> = values
            .keys()
            .filter(|full| is_live(expiries.get(*full).copied(), now))
            .filter(|full| {
                self.namespace
                    .strip(full)
                    .is_some_and(|local| regex.is_match(local))
            })
            .cloned()
            .collect();
        for full in &doomed {
            values.remove(full);
            expiries.remove(full);
        }
        Ok(doomed.len())
    }

    async fn set_multiple(
        &self,
        pairs: &[(String, Value)],
        ttl: Option<u64>,
    ) -> StoreResult<bool> {
        self.ensure_initialized()?;
        let mut encoded = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            encoded.push((self.namespace.apply(key), codec::encode(value)?));
        }
        let mut state = self.state.write().await;
        for (full, raw) in encoded {
            let expires_at = self.ttl.expires_at(ttl);
            state.insert(full, raw, expires_at);
        }
        Ok(true)
    }

    async fn get_multiple(&self, keys: &[&str]) -> StoreResult<Vec<Value>> {
        self.ensure_initialized()?;
        let now = now_millis();
        let mut state = self.state.write().await;
        Ok(keys
            .iter()
            .map(|key| {
                let full = self.namespace.apply(key);
                state.purge_if_expired(&full, now);
                codec::decode(state.values.get(&full).map(String::as_str))
            })
            .collect())
    }

    async fn expire(&self, key: &str, ttl: u64) -> StoreResult<bool> {
        self.ensure_initialized()?;
        if ttl == 0 {
            return Ok(false);
        }
        let full = self.namespace.apply(key);
        let now = now_millis();
        let mut state = self.state.write().await;
        state.purge_if_expired(&full, now);
        if !state.values.contains_key(&full) {
            return Ok(false);
        }
        state.expiries.insert(full, now + (ttl as i64) * 1000);
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> StoreResult<TtlState> {
        self.ensure_initialized()?;
        let full = self.namespace.apply(key);
        let mut state = self.state.write().await;
        state.purge_if_expired(&full, now_millis());
        if !state.values.contains_key(&full) {
            return Ok(TtlState::NotFound);
        }
        Ok(match state.expiries.get(&full) {
            Some(&at) => TtlState::from_expiry_millis(at),
            None => TtlState::NoExpiry,
        })
    }

    async fn transaction(&self, ops: Vec<Operation>) -> StoreResult<Vec<OpResult>> {
        self.ensure_initialized()?;
        // Sequential best-effort: no rollback, a failing operation leaves
        // earlier effects applied.
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            let result = match op {
                Operation::Set { key, value, ttl } => {
                    OpResult::Set(self.set(&key, value, ttl).await?)
                }
                Operation::Get { key } => OpResult::Get(self.get(&key).await?),
                Operation::Delete { key } => OpResult::Delete(self.delete(&key).await?),
            };
            results.push(result);
        }
        Ok(results)
    }

    fn info(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn snapshot(&self) -> StoreResult<BTreeMap<String, String>> {
        let state = self.state.read().await;
        Ok(state
            .values
            .iter()
            .filter(|(full, _)| self.namespace.strip(full).is_some())
            .map(|(full, raw)| (full.clone(), raw.clone()))
            .collect())
    }
}
