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

//! Pattern matcher: restricted glob syntax over local keys.
//!
//! The glob language is `*` (zero or more arbitrary characters) and `?`
//! (exactly one arbitrary character), with no escaping. Matching is always
//! over the full local (de-namespaced) key. Each backend gets its native
//! translation: an anchored regex for client-side evaluation, a SQL `LIKE`
//! pattern for the relational engine, and a literal prefix to narrow the
//! remote server's scan before regex refinement.

use regex::Regex;

use crate::error::{StoreError, StoreResult};

/// A restricted glob expression (`*`, `?`) over local keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    raw: String,
}

impl GlobPattern {
    /// Wrap a raw glob expression.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            raw: pattern.into(),
        }
    }

    /// The raw glob text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Translate to an anchored regex (`^...$`) for client-side evaluation.
    pub fn to_regex(&self) -> StoreResult<Regex> {
        let mut source = String::with_capacity(self.raw.len() + 4);
        source.push('^');
        for ch in self.raw.chars() {
            match ch {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                ch => source.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4]))),
            }
        }
        source.push('$');
        Regex::new(&source)
            .map_err(|e| StoreError::Backend(format!("glob translation failed: {}", e)))
    }

    /// Translate to a SQL `LIKE` pattern (`*` -> `%`, `?` -> `_`).
    ///
    /// Literal `%`/`_` characters already present in a key are NOT escaped;
    /// such keys can over-match. Known limitation of the LIKE translation,
    /// kept as documented behavior.
    pub fn to_like(&self) -> String {
        self.raw
            .chars()
            .map(|ch| match ch {
                '*' => '%',
                '?' => '_',
                ch => ch,
            })
            .collect()
    }

    /// The literal substring before the first wildcard, used to narrow a
    /// native prefix scan before the regex refinement pass.
    pub fn literal_prefix(&self) -> &str {
        let end = self
            .raw
            .find(|c| c == '*' || c == '?')
            .unwrap_or(self.raw.len());
        &self.raw[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_zero_or_more() {
        let re = GlobPattern::new("user:*").to_regex().unwrap();
        assert!(re.is_match("user:"));
        assert!(re.is_match("user:1"));
        assert!(re.is_match("user:1:profile"));
        assert!(!re.is_match("other:1"));
    }

    #[test]
    fn question_mark_matches_exactly_one() {
        let re = GlobPattern::new("k?y").to_regex().unwrap();
        assert!(re.is_match("key"));
        assert!(re.is_match("kay"));
        assert!(!re.is_match("ky"));
        assert!(!re.is_match("keey"));
    }

    #[test]
    fn regex_is_anchored() {
        let re = GlobPattern::new("abc").to_regex().unwrap();
        assert!(re.is_match("abc"));
        assert!(!re.is_match("xabc"));
        assert!(!re.is_match("abcx"));
    }

    #[test]
    fn regex_metacharacters_in_keys_are_literal() {
        let re = GlobPattern::new("a.b+c*").to_regex().unwrap();
        assert!(re.is_match("a.b+c"));
        assert!(re.is_match("a.b+c:d"));
        assert!(!re.is_match("aXb+c"));
    }

    #[test]
    fn like_translation_substitutes_wildcards_only() {
        assert_eq!(GlobPattern::new("user:*").to_like(), "user:%");
        assert_eq!(GlobPattern::new("k?y").to_like(), "k_y");
        // Literal % and _ pass through unescaped (documented limitation).
        assert_eq!(GlobPattern::new("a%b_c*").to_like(), "a%b_c%");
    }

    #[test]
    fn literal_prefix_stops_at_first_wildcard() {
        assert_eq!(GlobPattern::new("user:*").literal_prefix(), "user:");
        assert_eq!(GlobPattern::new("user:?:x*").literal_prefix(), "user:");
        assert_eq!(GlobPattern::new("*").literal_prefix(), "");
        assert_eq!(GlobPattern::new("exact").literal_prefix(), "exact");
    }
}
