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

//! Error types for adapter operations.

use thiserror::Error;

/// Result type for adapter operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during adapter construction or operations.
///
/// `Option`-shaped returns (`Value::Null`, `false`, [`TtlState::NotFound`])
/// are reserved for well-defined domain outcomes (missing key, unset TTL,
/// expired entry) and are never used in place of one of these errors.
///
/// [`TtlState::NotFound`]: crate::TtlState::NotFound
#[derive(Error, Debug)]
pub enum StoreError {
    /// Namespace is neither empty nor terminated by the `:` separator
    /// (construction-time, fatal).
    #[error("invalid namespace {0:?}: must be empty or end with ':'")]
    InvalidNamespace(String),

    /// A required backend option (typically the connection handle) was not
    /// supplied (construction-time, fatal).
    #[error("missing required option: {0}")]
    MissingRequiredOption(&'static str),

    /// Unrecognized backend type tag requested from the factory.
    #[error("unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// An operation was invoked before `initialize()`.
    #[error("adapter not initialized: call initialize() first")]
    NotInitialized,

    /// Pattern-based operation attempted against a cluster-mode remote
    /// backend.
    #[error("{0} is not supported against a cluster-mode backend")]
    UnsupportedInClusterMode(&'static str),

    /// Failure surfaced by the underlying storage engine, propagated
    /// unchanged to the caller (never retried internally).
    #[error("backend error: {0}")]
    Backend(String),

    /// Value could not be serialized to its canonical form.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg(feature = "sql-backend")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(format!("SQL error: {}", err))
    }
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(format!("Redis error: {}", err))
    }
}
