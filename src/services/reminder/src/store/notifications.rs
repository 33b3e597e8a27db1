//! Typed access to notification records
//!
//! Records are append-only apart from status transitions; they form the
//! delivery audit trail. Every status write in the service goes through
//! [`NotificationStore::transition`], which enforces the lifecycle rule and
//! merges the terminal detail fields into the same write as the status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kinesia_shared::time::format_timestamp;
use kinesia_shared::{NotificationRecord, NotificationStatus};
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ReminderError, Result};
use crate::store::document::{Document, DocumentStore, Filter, Query};

/// A requested status change together with its detail fields
#[derive(Debug, Clone)]
pub enum Transition {
    Sent {
        message_id: String,
        sent_at: DateTime<Utc>,
    },
    Failed {
        error: String,
    },
    Cancelled {
        reason: String,
    },
}

impl Transition {
    pub fn target(&self) -> NotificationStatus {
        match self {
            Self::Sent { .. } => NotificationStatus::Sent,
            Self::Failed { .. } => NotificationStatus::Failed,
            Self::Cancelled { .. } => NotificationStatus::Cancelled,
        }
    }
}

pub struct NotificationStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl NotificationStore {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub async fn create(&self, record: &NotificationRecord) -> Result<()> {
        self.store
            .insert(&self.collection, encode_record(record)?)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<NotificationRecord>> {
        match self.store.get(&self.collection, id).await? {
            Some(document) => decode_record(document).map(Some),
            None => Ok(None),
        }
    }

    pub async fn require(&self, id: &str) -> Result<NotificationRecord> {
        self.get(id)
            .await?
            .ok_or_else(|| ReminderError::not_found(format!("notification {}", id)))
    }

    /// Apply a lifecycle transition.
    ///
    /// Returns `false` without writing when the record is already terminal,
    /// so concurrent writers cannot overwrite a finished attempt. The status
    /// and its detail fields land in a single merged write.
    pub async fn transition(&self, id: &str, transition: Transition) -> Result<bool> {
        let record = self.require(id).await?;
        let target = transition.target();
        if !record.status.can_transition_to(target) {
            warn!(
                "Refusing {} -> {} transition for notification {}",
                record.status, target, id
            );
            return Ok(false);
        }

        let mut changes = Document::new();
        changes.insert("status".to_string(), json!(target));
        match transition {
            Transition::Sent {
                message_id,
                sent_at,
            } => {
                changes.insert("message_id".to_string(), json!(message_id));
                changes.insert("sent_at".to_string(), json!(format_timestamp(&sent_at)));
            }
            Transition::Failed { error } => {
                changes.insert("error".to_string(), json!(error));
            }
            Transition::Cancelled { reason } => {
                changes.insert("cancelled_reason".to_string(), json!(reason));
            }
        }

        self.store.update(&self.collection, id, changes).await
    }

    /// All records for a user still in the `scheduled` state.
    pub async fn scheduled_for_user(&self, user_id: &str) -> Result<Vec<NotificationRecord>> {
        self.query_records(
            Query::new()
                .filter(Filter::eq("user_id", user_id))
                .filter(Filter::eq("status", "scheduled")),
        )
        .await
    }

    /// Records created at or after `cutoff`, regardless of status. Feeds the
    /// duplicate guard.
    pub async fn created_since(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<NotificationRecord>> {
        self.query_records(
            Query::new()
                .filter(Filter::eq("user_id", user_id))
                .filter(Filter::gte("created_at", format_timestamp(&cutoff))),
        )
        .await
    }

    /// Audit listing for a user, newest first.
    pub async fn for_user(
        &self,
        user_id: &str,
        status: Option<NotificationStatus>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        let mut query = Query::new()
            .filter(Filter::eq("user_id", user_id))
            .order_by_desc("created_at")
            .limit(limit);
        if let Some(status) = status {
            query = query.filter(Filter::eq("status", status.to_string()));
        }
        self.query_records(query).await
    }

    async fn query_records(&self, query: Query) -> Result<Vec<NotificationRecord>> {
        let documents = self.store.query(&self.collection, query).await?;
        documents.into_iter().map(decode_record).collect()
    }
}

fn encode_record(record: &NotificationRecord) -> Result<Document> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        _ => Err(ReminderError::serialization(
            "notification record did not serialize to an object",
        )),
    }
}

fn decode_record(document: Document) -> Result<NotificationRecord> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| ReminderError::store(format!("malformed notification document: {}", e)))
}
