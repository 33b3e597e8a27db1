//! In-memory document store
//!
//! DashMap-backed backend for tests and queue-less local runs. Semantics
//! mirror the mongo backend: documents keyed by their `id` field, merge
//! updates with `null` removing a field.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{ReminderError, Result};
use crate::store::document::{Document, DocumentStore, Query};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|coll| coll.get(id).map(|entry| entry.value().clone())))
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Document>> {
        let mut results: Vec<Document> = match self.collections.get(collection) {
            Some(coll) => coll
                .iter()
                .filter(|entry| query.filters.iter().all(|f| f.matches(entry.value())))
                .map(|entry| entry.value().clone())
                .collect(),
            None => Vec::new(),
        };

        if let Some(field) = &query.order_by_desc {
            results.sort_by(|a, b| order_key(b, field).cmp(order_key(a, field)));
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<()> {
        let id = document
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ReminderError::store("document is missing an id field"))?
            .to_string();

        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, changes: Document) -> Result<bool> {
        let coll = match self.collections.get(collection) {
            Some(coll) => coll,
            None => return Ok(false),
        };
        let mut entry = match coll.get_mut(id) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        for (key, value) in changes {
            if value.is_null() {
                entry.remove(&key);
            } else {
                entry.insert(key, value);
            }
        }
        Ok(true)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self
            .collections
            .get(collection)
            .map(|coll| coll.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

fn order_key<'a>(document: &'a Document, field: &str) -> &'a str {
    document.get(field).and_then(|v| v.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::Filter;
    use serde_json::json;

    fn doc(pairs: &[(&str, serde_json::Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        store
            .insert("users", doc(&[("id", json!("u-1")), ("name", json!("Ada"))]))
            .await
            .unwrap();

        let loaded = store.get("users", "u-1").await.unwrap().unwrap();
        assert_eq!(loaded.get("name"), Some(&json!("Ada")));
        assert!(store.get("users", "u-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_requires_id() {
        let store = MemoryStore::new();
        let result = store.insert("users", doc(&[("name", json!("Ada"))])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_update_merges_and_null_removes() {
        let store = MemoryStore::new();
        store
            .insert(
                "users",
                doc(&[
                    ("id", json!("u-1")),
                    ("push_token", json!("tok")),
                    ("badge", json!(1)),
                ]),
            )
            .await
            .unwrap();

        let matched = store
            .update(
                "users",
                "u-1",
                doc(&[("push_token", json!(null)), ("badge", json!(2))]),
            )
            .await
            .unwrap();
        assert!(matched);

        let loaded = store.get("users", "u-1").await.unwrap().unwrap();
        assert!(loaded.get("push_token").is_none());
        assert_eq!(loaded.get("badge"), Some(&json!(2)));

        let missing = store
            .update("users", "nope", doc(&[("badge", json!(3))]))
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        for (id, user, created) in [
            ("n-1", "u-1", "2024-01-01T10:00:00.000Z"),
            ("n-2", "u-1", "2024-01-02T10:00:00.000Z"),
            ("n-3", "u-2", "2024-01-03T10:00:00.000Z"),
        ] {
            store
                .insert(
                    "notifications",
                    doc(&[
                        ("id", json!(id)),
                        ("user_id", json!(user)),
                        ("created_at", json!(created)),
                    ]),
                )
                .await
                .unwrap();
        }

        let results = store
            .query(
                "notifications",
                Query::new()
                    .filter(Filter::eq("user_id", "u-1"))
                    .order_by_desc("created_at")
                    .limit(1),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("id"), Some(&json!("n-2")));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store
            .insert("users", doc(&[("id", json!("u-1"))]))
            .await
            .unwrap();

        assert!(store.delete("users", "u-1").await.unwrap());
        assert!(!store.delete("users", "u-1").await.unwrap());
        assert!(store.get("users", "u-1").await.unwrap().is_none());
    }
}
