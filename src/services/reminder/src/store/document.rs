//! Document store abstraction
//!
//! The reminder service persists schemaless JSON documents. This module
//! defines the operations the service requires from a backend together with
//! the small query language the scanner and the duplicate guard rely on.
//! Concrete backends live in `store::mongo` and `store::memory`.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A schemaless document as stored in a collection
pub type Document = serde_json::Map<String, Value>;

/// A single predicate over one document field
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { field: String, value: Value },
    Gte { field: String, value: Value },
    Lte { field: String, value: Value },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Self::Eq { field, .. } | Self::Gte { field, .. } | Self::Lte { field, .. } => field,
        }
    }

    /// Evaluate the predicate against a document. A missing field never
    /// matches. Range predicates compare strings lexicographically (which is
    /// chronological for canonical timestamps) and numbers numerically;
    /// mixed types never match.
    pub fn matches(&self, document: &Document) -> bool {
        let actual = match document.get(self.field()) {
            Some(value) => value,
            None => return false,
        };

        match self {
            Self::Eq { value, .. } => actual == value,
            Self::Gte { value, .. } => {
                compare(actual, value).map_or(false, |o| o != Ordering::Less)
            }
            Self::Lte { value, .. } => {
                compare(actual, value).map_or(false, |o| o != Ordering::Greater)
            }
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}

/// A filtered lookup against one collection
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
    pub order_by_desc: Option<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by_desc = Some(field.into());
        self
    }
}

/// The storage operations the reminder service requires.
///
/// Documents are identified by their `id` field. There is no schema
/// enforcement at this layer; typed wrappers validate what they read.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Fetch all documents matching a query.
    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Document>>;

    /// Insert a new document.
    async fn insert(&self, collection: &str, document: Document) -> Result<()>;

    /// Merge `changes` into the identified document. A `null` value removes
    /// the field. Returns whether a document matched.
    async fn update(&self, collection: &str, id: &str, changes: Document) -> Result<bool>;

    /// Remove a document by id. Returns whether a document matched.
    /// Notification records are never deleted; they are cancelled instead.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;

    /// Connectivity check for health reporting.
    async fn ping(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_eq_filter() {
        let d = doc(&[("status", json!("scheduled"))]);
        assert!(Filter::eq("status", "scheduled").matches(&d));
        assert!(!Filter::eq("status", "sent").matches(&d));
        assert!(!Filter::eq("missing", "scheduled").matches(&d));
    }

    #[test]
    fn test_string_range_filters() {
        let d = doc(&[("created_at", json!("2024-01-01T14:30:00.000Z"))]);
        assert!(Filter::gte("created_at", "2024-01-01T00:00:00.000Z").matches(&d));
        assert!(Filter::lte("created_at", "2024-01-02T00:00:00.000Z").matches(&d));
        assert!(!Filter::gte("created_at", "2024-01-02T00:00:00.000Z").matches(&d));
    }

    #[test]
    fn test_numeric_range_filters() {
        let d = doc(&[("badge", json!(3))]);
        assert!(Filter::gte("badge", 3).matches(&d));
        assert!(Filter::lte("badge", 3.5).matches(&d));
        assert!(!Filter::lte("badge", 2).matches(&d));
    }

    #[test]
    fn test_mixed_types_never_match() {
        let d = doc(&[("value", json!("10"))]);
        assert!(!Filter::gte("value", 5).matches(&d));
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new()
            .filter(Filter::eq("user_id", "u-1"))
            .filter(Filter::gte("created_at", "2024-01-01T00:00:00.000Z"))
            .limit(50)
            .order_by_desc("created_at");

        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.limit, Some(50));
        assert_eq!(query.order_by_desc.as_deref(), Some("created_at"));
    }
}
