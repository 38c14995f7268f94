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

//! Value codec: canonical JSON-text form shared by every backend.
//!
//! Storing the same serialized form everywhere is what makes three
//! structurally different engines return byte-identical values. The decode
//! side is total: a missing key decodes to `Value::Null`, and malformed
//! stored text (an external writer, a hand-edited row) falls back to the raw
//! text as a string instead of raising. At the `get` level "missing" and
//! "stored null" are therefore indistinguishable; `exists`/`ttl` are the
//! ways to tell them apart.

use serde_json::Value;

use crate::error::StoreResult;

/// Encode a value into its canonical stored form.
pub fn encode(value: &Value) -> StoreResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a stored value; `None` means the key was missing or expired.
///
/// Never fails: undecodable text is returned as `Value::String` verbatim.
pub fn decode(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Null,
        Some(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_structured_values() {
        for value in [
            json!(null),
            json!(true),
            json!(42),
            json!(1.5),
            json!("text"),
            json!([1, "two", null]),
            json!({"nested": {"a": [1, 2]}}),
        ] {
            let raw = encode(&value).unwrap();
            assert_eq!(decode(Some(&raw)), value);
        }
    }

    #[test]
    fn missing_decodes_to_null() {
        assert_eq!(decode(None), Value::Null);
    }

    #[test]
    fn null_and_missing_are_indistinguishable_after_decode() {
        let stored_null = encode(&Value::Null).unwrap();
        assert_eq!(decode(Some(&stored_null)), decode(None));
    }

    #[test]
    fn malformed_text_falls_back_to_raw_string() {
        assert_eq!(decode(Some("{not json")), json!("{not json"));
    }
}
