//! Deferred task queue boundary
//!
//! An optional collaborator holding a trigger for a future instant,
//! addressable by an opaque task reference. When no queue is configured the
//! service degrades to polling-only delivery via the scanner; enqueue and
//! delete failures never fail the operation that requested them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

pub mod http;

pub use http::HttpTaskQueue;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeferredQueue: Send + Sync {
    /// Register a trigger for `fire_at`, returning an opaque task reference.
    async fn enqueue(
        &self,
        user_id: &str,
        notification_id: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<String>;

    /// Best-effort removal of a previously registered trigger.
    async fn delete(&self, task_ref: &str) -> Result<()>;
}
