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

//! Backend selection and adapter construction.
//!
//! ## Purpose
//! One immutable options struct shared by every backend, a backend-kind tag
//! parsed from a string, and the factory mapping the tag to a concrete
//! adapter.
//!
//! Connection handles are external collaborators: the caller connects them
//! and passes them in through [`StoreOptions`]; the factory fails with
//! [`StoreError::MissingRequiredOption`] when the handle the chosen backend
//! needs is absent.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryAdapter;
use crate::StorageAdapter;

/// Backend type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-process map backend (always available).
    Memory,
    /// Relational-table backend (feature: `sql-backend`).
    Relational,
    /// Remote key-value server backend (feature: `redis-backend`).
    Remote,
}

impl BackendKind {
    /// Canonical tag string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Relational => "relational",
            BackendKind::Remote => "remote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.to_lowercase().as_str() {
            "memory" | "in-memory" => Ok(BackendKind::Memory),
            "relational" | "sql" | "sqlite" => Ok(BackendKind::Relational),
            "remote" | "redis" => Ok(BackendKind::Remote),
            other => Err(StoreError::UnsupportedBackend(other.to_string())),
        }
    }
}

/// Adapter construction options.
///
/// Constructed once, merged field-by-field over [`Default`], never mutated
/// after the adapter is built. Fields irrelevant to the chosen backend are
/// ignored.
///
/// ## Examples
/// ```rust
/// use polystore::StoreOptions;
///
/// let options = StoreOptions {
///     default_ttl: 300,
///     ttl_cleanup_interval: 60,
///     ..StoreOptions::default()
/// };
/// ```
#[derive(Clone, Default)]
pub struct StoreOptions {
    /// Default TTL in seconds applied to writes without a per-call TTL;
    /// `0` disables the default.
    pub default_ttl: u64,

    /// Background expiry sweep interval in seconds (memory and relational
    /// backends); `0` disables the sweeper.
    pub ttl_cleanup_interval: u64,

    /// Relational backend: backing table name
    /// (default [`sql::DEFAULT_TABLE`](crate::sql::DEFAULT_TABLE)).
    pub table_name: Option<String>,

    /// Remote backend: whether the server is a cluster deployment, which
    /// disables pattern operations.
    pub is_cluster: bool,

    /// Relational backend: the connected pool (required for that backend).
    #[cfg(feature = "sql-backend")]
    pub sql_pool: Option<sqlx::sqlite::SqlitePool>,

    /// Remote backend: the connected manager (required for that backend).
    #[cfg(feature = "redis-backend")]
    pub redis_connection: Option<redis::aio::ConnectionManager>,
}

/// Construct the adapter for a backend tag.
///
/// ## Errors
/// - [`StoreError::UnsupportedBackend`] for an unrecognized tag (or a tag
///   whose backend feature is compiled out)
/// - [`StoreError::InvalidNamespace`] for a malformed namespace
/// - [`StoreError::MissingRequiredOption`] when the chosen backend's
///   connection handle is absent from the options
///
/// ## Examples
/// ```rust
/// use polystore::{create_adapter, BackendKind, StorageAdapter, StoreOptions};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let kv = create_adapter("app:", "memory", StoreOptions::default())?;
/// assert_eq!(kv.info(), BackendKind::Memory);
/// # Ok(())
/// # }
/// ```
pub fn create_adapter(
    namespace: &str,
    backend: &str,
    options: StoreOptions,
) -> StoreResult<Arc<dyn StorageAdapter>> {
    match backend.parse::<BackendKind>()? {
        BackendKind::Memory => Ok(Arc::new(MemoryAdapter::new(namespace, &options)?)),

        #[cfg(feature = "sql-backend")]
        BackendKind::Relational => {
            let pool = options
                .sql_pool
                .clone()
                .ok_or(StoreError::MissingRequiredOption("sql_pool"))?;
            Ok(Arc::new(crate::sql::SqlAdapter::new(
                namespace, pool, &options,
            )?))
        }

        #[cfg(not(feature = "sql-backend"))]
        BackendKind::Relational => Err(StoreError::UnsupportedBackend(
            "relational backend requires the `sql-backend` feature".to_string(),
        )),

        #[cfg(feature = "redis-backend")]
        BackendKind::Remote => {
            let manager = options
                .redis_connection
                .clone()
                .ok_or(StoreError::MissingRequiredOption("redis_connection"))?;
            Ok(Arc::new(crate::redis::RedisAdapter::new(
                namespace, manager, &options,
            )?))
        }

        #[cfg(not(feature = "redis-backend"))]
        BackendKind::Remote => Err(StoreError::UnsupportedBackend(
            "remote backend requires the `redis-backend` feature".to_string(),
        )),
    }
}
