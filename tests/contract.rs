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

//! Cross-backend contract suite: every property here must hold on every
//! backend (modulo the documented remote-backend limitations), so each
//! property is written once against the trait and run per backend.

use std::time::Duration;

use serde_json::{json, Value};

use polystore::{MemoryAdapter, OpResult, Operation, StorageAdapter, StoreOptions, TtlState};

async fn round_trip(kv: &dyn StorageAdapter) {
    for (i, value) in [
        json!(null),
        json!(true),
        json!(42),
        json!(-1.25),
        json!("text"),
        json!([1, "two", null, {"three": 3}]),
        json!({"nested": {"list": [1, 2, 3]}}),
    ]
    .into_iter()
    .enumerate()
    {
        let key = format!("round-trip:{}", i);
        assert!(kv.set(&key, value.clone(), None).await.unwrap());
        assert_eq!(kv.get(&key).await.unwrap(), value);
    }
}

async fn null_value_is_present_but_reads_as_null(kv: &dyn StorageAdapter) {
    kv.set("null-value", Value::Null, None).await.unwrap();

    // Indistinguishable from a missing key at the get level...
    assert_eq!(kv.get("null-value").await.unwrap(), Value::Null);
    assert_eq!(kv.get("never-set").await.unwrap(), Value::Null);

    // ...but exists/ttl tell them apart.
    assert!(kv.exists("null-value").await.unwrap());
    assert!(!kv.exists("never-set").await.unwrap());
    assert_eq!(kv.ttl("null-value").await.unwrap(), TtlState::NoExpiry);
    assert_eq!(kv.ttl("never-set").await.unwrap(), TtlState::NotFound);
}

async fn idempotent_delete(kv: &dyn StorageAdapter) {
    assert!(!kv.delete("absent").await.unwrap());

    kv.set("once", json!(1), None).await.unwrap();
    assert!(kv.delete("once").await.unwrap());
    assert!(!kv.delete("once").await.unwrap());
}

async fn ttl_expiry(kv: &dyn StorageAdapter) {
    kv.set("short-lived", json!("v"), Some(1)).await.unwrap();
    assert_eq!(kv.get("short-lived").await.unwrap(), json!("v"));

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(kv.get("short-lived").await.unwrap(), Value::Null);
    assert!(!kv
        .keys("*")
        .await
        .unwrap()
        .contains(&"short-lived".to_string()));
}

async fn pattern_ordering(kv: &dyn StorageAdapter) {
    for key in ["b", "a", "c"] {
        kv.set(key, json!(1), None).await.unwrap();
    }
    assert_eq!(kv.keys("*").await.unwrap(), vec!["a", "b", "c"]);
}

async fn clear_scoping(kv: &dyn StorageAdapter) {
    for key in ["user:1", "user:2", "other:1"] {
        kv.set(key, json!(1), None).await.unwrap();
    }
    assert_eq!(kv.clear("user:*").await.unwrap(), 2);
    assert_eq!(kv.keys("*").await.unwrap(), vec!["other:1"]);
}

async fn transaction_result_shape(kv: &dyn StorageAdapter) {
    let results = kv
        .transaction(vec![
            Operation::Set {
                key: "k1".into(),
                value: json!("v1"),
                ttl: None,
            },
            Operation::Get { key: "k1".into() },
            Operation::Set {
                key: "k2".into(),
                value: json!("v2"),
                ttl: None,
            },
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
            OpResult::Set(true),
            OpResult::Delete(true),
            OpResult::Delete(false),
        ]
    );
    assert_eq!(kv.keys("*").await.unwrap(), vec!["k2"]);
}

async fn get_multiple_completeness(kv: &dyn StorageAdapter) {
    kv.set("k1", json!("v1"), None).await.unwrap();
    kv.set("k3", json!("v3"), None).await.unwrap();

    let values = kv.get_multiple(&["k1", "k2", "k3", "k4"]).await.unwrap();
    assert_eq!(
        values,
        vec![json!("v1"), Value::Null, json!("v3"), Value::Null]
    );
}

mod memory_backend {
    use super::*;

    async fn fresh() -> MemoryAdapter {
        let kv = MemoryAdapter::new("contract:", &StoreOptions::default()).unwrap();
        kv.initialize().await.unwrap();
        kv
    }

    #[tokio::test]
    async fn round_trip() {
        super::round_trip(&fresh().await).await;
    }

    #[tokio::test]
    async fn null_value_is_present_but_reads_as_null() {
        super::null_value_is_present_but_reads_as_null(&fresh().await).await;
    }

    #[tokio::test]
    async fn idempotent_delete() {
        super::idempotent_delete(&fresh().await).await;
    }

    #[tokio::test]
    async fn ttl_expiry() {
        super::ttl_expiry(&fresh().await).await;
    }

    #[tokio::test]
    async fn pattern_ordering() {
        super::pattern_ordering(&fresh().await).await;
    }

    #[tokio::test]
    async fn clear_scoping() {
        super::clear_scoping(&fresh().await).await;
    }

    #[tokio::test]
    async fn transaction_result_shape() {
        super::transaction_result_shape(&fresh().await).await;
    }

    #[tokio::test]
    async fn get_multiple_completeness() {
        super::get_multiple_completeness(&fresh().await).await;
    }

    #[tokio::test]
    async fn namespace_transparency() {
        // Same operations against a namespaced adapter and a bare adapter
        // over isolated stores: callers observe identical results and never
        // see the prefix.
        let namespaced = fresh().await;
        let bare = MemoryAdapter::new("", &StoreOptions::default()).unwrap();
        bare.initialize().await.unwrap();

        for kv in [&namespaced as &dyn StorageAdapter, &bare] {
            kv.set("a", json!("v"), None).await.unwrap();
            assert_eq!(kv.get("a").await.unwrap(), json!("v"));
            assert_eq!(kv.keys("*").await.unwrap(), vec!["a"]);
            assert!(kv.delete("a").await.unwrap());
        }
    }
}

#[cfg(feature = "sql-backend")]
mod relational_backend {
    use super::*;
    use polystore::SqlAdapter;

    async fn fresh() -> SqlAdapter {
        // One connection: pooled connections of an in-memory SQLite database
        // would each see a separate database.
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let kv = SqlAdapter::new("contract:", pool, &StoreOptions::default()).unwrap();
        kv.initialize().await.unwrap();
        kv
    }

    #[tokio::test]
    async fn round_trip() {
        super::round_trip(&fresh().await).await;
    }

    #[tokio::test]
    async fn null_value_is_present_but_reads_as_null() {
        super::null_value_is_present_but_reads_as_null(&fresh().await).await;
    }

    #[tokio::test]
    async fn idempotent_delete() {
        super::idempotent_delete(&fresh().await).await;
    }

    #[tokio::test]
    async fn ttl_expiry() {
        super::ttl_expiry(&fresh().await).await;
    }

    #[tokio::test]
    async fn pattern_ordering() {
        super::pattern_ordering(&fresh().await).await;
    }

    #[tokio::test]
    async fn clear_scoping() {
        super::clear_scoping(&fresh().await).await;
    }

    #[tokio::test]
    async fn transaction_result_shape() {
        super::transaction_result_shape(&fresh().await).await;
    }

    #[tokio::test]
    async fn get_multiple_completeness() {
        super::get_multiple_completeness(&fresh().await).await;
    }

    #[tokio::test]
    async fn namespace_transparency() {
        let namespaced = fresh().await;

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let bare = SqlAdapter::new("", pool, &StoreOptions::default()).unwrap();
        bare.initialize().await.unwrap();

        for kv in [&namespaced as &dyn StorageAdapter, &bare] {
            kv.set("a", json!("v"), None).await.unwrap();
            assert_eq!(kv.get("a").await.unwrap(), json!("v"));
            assert_eq!(kv.keys("*").await.unwrap(), vec!["a"]);
            assert!(kv.delete("a").await.unwrap());
        }
    }
}
