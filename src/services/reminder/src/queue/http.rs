//! HTTP-backed deferred task queue
//!
//! Talks to a task scheduling service over plain JSON: POST to register a
//! trigger, DELETE by task reference to withdraw one.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kinesia_shared::time::format_timestamp;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::config::QueueConfig;
use crate::error::{ReminderError, Result};
use crate::queue::DeferredQueue;

pub struct HttpTaskQueue {
    client: Client,
    endpoint: String,
    callback_url: String,
}

impl HttpTaskQueue {
    pub fn new(config: &QueueConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ReminderError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            callback_url: config.callback_url.clone(),
        })
    }
}

#[async_trait]
impl DeferredQueue for HttpTaskQueue {
    async fn enqueue(
        &self,
        user_id: &str,
        notification_id: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<String> {
        let body = json!({
            "user_id": user_id,
            "notification_id": notification_id,
            "fire_at": format_timestamp(&fire_at),
            "callback_url": self.callback_url,
        });

        let response = self
            .client
            .post(format!("{}/tasks", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| ReminderError::queue(format!("enqueue request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ReminderError::queue(format!(
                "enqueue returned {}",
                response.status()
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| ReminderError::queue(format!("unreadable enqueue response: {}", e)))?;
        parsed
            .get("task_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ReminderError::queue("enqueue response missing task_id"))
    }

    async fn delete(&self, task_ref: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/tasks/{}", self.endpoint, task_ref))
            .send()
            .await
            .map_err(|e| ReminderError::queue(format!("delete request failed: {}", e)))?;

        // A task that already fired or was never recorded is fine to miss.
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(ReminderError::queue(format!(
            "delete returned {}",
            response.status()
        )))
    }
}
