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

//! TTL policy: relative-seconds TTL resolved into absolute expiry instants.
//!
//! TTLs are whole seconds relative to the call instant. On writes the
//! per-call TTL wins when it is nonzero, else the adapter-level default
//! applies when nonzero, else the entry never expires. A `0` at both levels
//! means "no expiry", not "expire immediately".
//!
//! Expiry instants are tracked in milliseconds since the Unix epoch so that
//! a one-second TTL does not wobble at second boundaries.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Three-way result of a TTL query.
///
/// Callers distinguish "permanent" from "absent" only through this type, so
/// it is a genuine three-variant enum rather than a nullable-boolean
/// collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlState {
    /// Key is live and expires at the given absolute instant.
    Expires(SystemTime),
    /// Key is live and never expires.
    NoExpiry,
    /// Key is missing or has already expired.
    NotFound,
}

impl TtlState {
    /// Build the `Expires` variant from an epoch-milliseconds expiry.
    pub fn from_expiry_millis(expires_at: i64) -> Self {
        TtlState::Expires(UNIX_EPOCH + Duration::from_millis(expires_at.max(0) as u64))
    }
}

/// Write-side TTL resolution shared by all adapters.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    default_ttl: u64,
}

impl TtlPolicy {
    /// Create a policy with the adapter-level default TTL in seconds
    /// (`0` disables the default).
    pub fn new(default_ttl: u64) -> Self {
        Self { default_ttl }
    }

    /// Resolve the effective TTL in seconds for a write: per-call if
    /// nonzero, else the default if nonzero, else `None` (no expiry).
    pub fn effective(&self, per_call: Option<u64>) -> Option<u64> {
        match per_call {
            Some(ttl) if ttl > 0 => Some(ttl),
            _ => (self.default_ttl > 0).then_some(self.default_ttl),
        }
    }

    /// Absolute expiry instant (epoch milliseconds) for a write, or `None`
    /// when the entry should never expire.
    pub fn expires_at(&self, per_call: Option<u64>) -> Option<i64> {
        self.effective(per_call)
            .map(|ttl| now_millis() + (ttl as i64) * 1000)
    }
}

/// Current wall clock as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Whether an entry with the given expiry column is still live at `now`.
pub fn is_live(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.map_or(true, |at| at > now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_call_ttl_wins_over_default() {
        let policy = TtlPolicy::new(300);
        assert_eq!(policy.effective(Some(10)), Some(10));
    }

    #[test]
    fn absent_per_call_falls_back_to_default() {
        let policy = TtlPolicy::new(300);
        assert_eq!(policy.effective(None), Some(300));
    }

    #[test]
    fn zero_per_call_falls_through_to_default() {
        let policy = TtlPolicy::new(300);
        assert_eq!(policy.effective(Some(0)), Some(300));
    }

    #[test]
    fn zero_at_both_levels_means_no_expiry() {
        let policy = TtlPolicy::new(0);
        assert_eq!(policy.effective(Some(0)), None);
        assert_eq!(policy.effective(None), None);
    }

    #[test]
    fn expires_at_is_in_the_future() {
        let policy = TtlPolicy::new(0);
        let before = now_millis();
        let at = policy.expires_at(Some(5)).unwrap();
        assert!(at >= before + 5_000);
        assert!(at <= now_millis() + 5_000);
    }

    #[test]
    fn liveness_check() {
        let now = now_millis();
        assert!(is_live(None, now));
        assert!(is_live(Some(now + 1), now));
        assert!(!is_live(Some(now), now));
        assert!(!is_live(Some(now - 1), now));
    }

    #[test]
    fn ttl_state_from_millis() {
        let state = TtlState::from_expiry_millis(1_000);
        assert_eq!(
            state,
            TtlState::Expires(UNIX_EPOCH + Duration::from_secs(1))
        );
    }
}
