//! Typed access to the user-side notification fields
//!
//! The reminder service owns only a slice of the user profile document.
//! Reads validate that slice; writes merge single fields so the rest of the
//! profile is never touched.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use kinesia_shared::time::format_timestamp;
use kinesia_shared::{DeviceType, User};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ReminderError, Result};
use crate::store::document::{Document, DocumentStore, Filter, Query};

pub struct UserStore {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl UserStore {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<User>> {
        match self.store.get(&self.collection, user_id).await? {
            Some(document) => decode_user(document).map(Some),
            None => Ok(None),
        }
    }

    pub async fn require(&self, user_id: &str) -> Result<User> {
        self.get(user_id)
            .await?
            .ok_or_else(|| ReminderError::not_found(format!("user {}", user_id)))
    }

    /// Merge arbitrary field changes onto a user document.
    pub async fn merge(&self, user_id: &str, changes: Document) -> Result<bool> {
        self.store.update(&self.collection, user_id, changes).await
    }

    /// Persist the next fire instant, its computation stamp and the
    /// denormalized UTC wall-clock fields.
    ///
    /// The write is skipped (returns `false`) when a newer computation has
    /// already landed, so concurrent writers converge on the freshest value.
    /// The read-then-write is not atomic; the stamp narrows the race window
    /// rather than closing it.
    pub async fn set_next_notification_time(
        &self,
        user_id: &str,
        target: Option<DateTime<Utc>>,
        computed_at: DateTime<Utc>,
        manual_override: bool,
    ) -> Result<bool> {
        match self.get(user_id).await? {
            Some(user) => {
                if let Some(existing) = user.next_notification_time_computed_at {
                    if existing > computed_at {
                        debug!(
                            "Skipping next-time write for user {}; newer computation already landed",
                            user_id
                        );
                        return Ok(false);
                    }
                }
            }
            None => return Ok(false),
        }

        let mut changes = Document::new();
        match target {
            Some(when) => {
                changes.insert(
                    "next_notification_time".to_string(),
                    json!(format_timestamp(&when)),
                );
                changes.insert("utc_hour".to_string(), json!(when.hour()));
                changes.insert("utc_minute".to_string(), json!(when.minute()));
            }
            None => {
                changes.insert("next_notification_time".to_string(), Value::Null);
                changes.insert("utc_hour".to_string(), Value::Null);
                changes.insert("utc_minute".to_string(), Value::Null);
            }
        }
        changes.insert(
            "next_notification_time_computed_at".to_string(),
            json!(format_timestamp(&computed_at)),
        );
        changes.insert(
            "next_notification_time_manual_override".to_string(),
            json!(manual_override),
        );

        self.store.update(&self.collection, user_id, changes).await
    }

    /// Durably remove an invalid push token.
    pub async fn clear_push_token(&self, user_id: &str) -> Result<bool> {
        let mut changes = Document::new();
        changes.insert("push_token".to_string(), Value::Null);
        self.store.update(&self.collection, user_id, changes).await
    }

    pub async fn register_push_token(
        &self,
        user_id: &str,
        push_token: &str,
        device_type: Option<DeviceType>,
        app_bundle_id: Option<&str>,
    ) -> Result<bool> {
        let mut changes = Document::new();
        changes.insert("push_token".to_string(), json!(push_token));
        if let Some(device) = device_type {
            changes.insert("device_type".to_string(), json!(device));
        }
        if let Some(bundle) = app_bundle_id {
            changes.insert("app_bundle_id".to_string(), json!(bundle));
        }
        self.store.update(&self.collection, user_id, changes).await
    }

    /// Users whose next fire instant falls inside `[from, to]`.
    ///
    /// Malformed documents are logged and skipped so one bad profile cannot
    /// take down a whole scan pass.
    pub async fn due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<User>> {
        let documents = self
            .store
            .query(
                &self.collection,
                Query::new()
                    .filter(Filter::gte(
                        "next_notification_time",
                        format_timestamp(&from),
                    ))
                    .filter(Filter::lte("next_notification_time", format_timestamp(&to)))
                    .limit(limit),
            )
            .await?;

        let mut users = Vec::with_capacity(documents.len());
        for document in documents {
            match decode_user(document) {
                Ok(user) => users.push(user),
                Err(e) => warn!("Skipping malformed user document in due window: {}", e),
            }
        }
        Ok(users)
    }
}

fn decode_user(document: Document) -> Result<User> {
    serde_json::from_value(Value::Object(document))
        .map_err(|e| ReminderError::store(format!("malformed user document: {}", e)))
}
