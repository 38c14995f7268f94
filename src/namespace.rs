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

//! Namespace gate: validated key prefixing shared by every backend.
//!
//! All keys are namespace-prefixed before they reach a backend and
//! de-prefixed before they are returned to the caller, so callers never
//! observe the prefix. The namespace is fixed at adapter construction and
//! must be either empty or terminated by the [`SEPARATOR`].

use crate::error::{StoreError, StoreResult};

/// Character that terminates every non-empty namespace.
pub const SEPARATOR: char = ':';

/// Immutable key prefix isolating one logical application's keys within a
/// shared backing store.
///
/// ## Examples
/// ```rust
/// use polystore::Namespace;
///
/// let ns = Namespace::new("app:").unwrap();
/// assert_eq!(ns.apply("user:1"), "app:user:1");
/// assert_eq!(ns.strip("app:user:1"), Some("user:1"));
///
/// assert!(Namespace::new("app").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
}

impl Namespace {
    /// Create a namespace, failing fast unless the prefix is empty or ends
    /// with [`SEPARATOR`].
    pub fn new(prefix: impl Into<String>) -> StoreResult<Self> {
        let prefix = prefix.into();
        if prefix.is_empty() || prefix.ends_with(SEPARATOR) {
            Ok(Self { prefix })
        } else {
            Err(StoreError::InvalidNamespace(prefix))
        }
    }

    /// Like [`Namespace::new`], but additionally rejects the empty
    /// namespace. The remote backend requires this: its pattern scans would
    /// otherwise run over the whole keyspace.
    pub fn non_empty(prefix: impl Into<String>) -> StoreResult<Self> {
        let ns = Self::new(prefix)?;
        if ns.prefix.is_empty() {
            return Err(StoreError::InvalidNamespace(String::new()));
        }
        Ok(ns)
    }

    /// The raw prefix, `""` or `"...:"`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether this is the empty namespace.
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty()
    }

    /// Local key -> full (stored) key.
    pub fn apply(&self, local_key: &str) -> String {
        format!("{}{}", self.prefix, local_key)
    }

    /// Full (stored) key -> local key; `None` if the key does not carry this
    /// namespace's prefix.
    pub fn strip<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        full_key.strip_prefix(self.prefix.as_str())
    }
}
