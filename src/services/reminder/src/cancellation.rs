//! Cancellation service
//!
//! Marks every scheduled notification for a user cancelled and withdraws the
//! matching deferred-queue triggers. Invoking it with nothing scheduled is a
//! no-op, so callers can always cancel before scheduling.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::queue::DeferredQueue;
use crate::store::{NotificationStore, Transition};

pub struct CancellationService {
    notifications: Arc<NotificationStore>,
    queue: Option<Arc<dyn DeferredQueue>>,
}

impl CancellationService {
    pub fn new(
        notifications: Arc<NotificationStore>,
        queue: Option<Arc<dyn DeferredQueue>>,
    ) -> Self {
        Self {
            notifications,
            queue,
        }
    }

    /// Cancel all scheduled notifications for a user. Returns how many
    /// records were actually transitioned.
    pub async fn cancel_for_user(&self, user_id: &str, reason: &str) -> Result<usize> {
        let scheduled = self.notifications.scheduled_for_user(user_id).await?;
        if scheduled.is_empty() {
            return Ok(0);
        }

        let mut cancelled = 0;
        for record in scheduled {
            let applied = self
                .notifications
                .transition(
                    &record.id,
                    Transition::Cancelled {
                        reason: reason.to_string(),
                    },
                )
                .await?;
            if !applied {
                // A concurrent writer finished the record first.
                continue;
            }
            cancelled += 1;

            if let (Some(queue), Some(task_ref)) =
                (self.queue.as_ref(), record.queue_task.as_deref())
            {
                if let Err(e) = queue.delete(task_ref).await {
                    warn!(
                        "Failed to delete queue task {} for notification {}: {}",
                        task_ref, record.id, e
                    );
                }
            }
        }

        info!(
            "Cancelled {} scheduled notification(s) for user {}",
            cancelled, user_id
        );
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReminderError;
    use crate::queue::MockDeferredQueue;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use kinesia_shared::{MessageContent, NotificationRecord, NotificationStatus};

    fn content() -> MessageContent {
        MessageContent {
            title: "t".to_string(),
            body: "b".to_string(),
        }
    }

    fn notifications() -> Arc<NotificationStore> {
        Arc::new(NotificationStore::new(
            Arc::new(MemoryStore::new()),
            "notifications",
        ))
    }

    #[tokio::test]
    async fn test_cancels_all_scheduled_records() {
        let store = notifications();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let a = NotificationRecord::scheduled("u-1", now, content(), false, now);
        let b = NotificationRecord::scheduled("u-1", now, content(), true, now);
        for record in [&a, &b] {
            store.create(record).await.unwrap();
        }

        let service = CancellationService::new(store.clone(), None);
        let cancelled = service.cancel_for_user("u-1", "user request").await.unwrap();
        assert_eq!(cancelled, 2);

        for id in [&a.id, &b.id] {
            let record = store.require(id).await.unwrap();
            assert_eq!(record.status, NotificationStatus::Cancelled);
            assert_eq!(record.cancelled_reason.as_deref(), Some("user request"));
        }
    }

    #[tokio::test]
    async fn test_cancel_with_nothing_scheduled_is_a_noop() {
        let service = CancellationService::new(notifications(), None);

        assert_eq!(service.cancel_for_user("u-1", "r").await.unwrap(), 0);
        assert_eq!(service.cancel_for_user("u-1", "r").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_terminal_records_are_left_alone() {
        let store = notifications();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let sent = NotificationRecord::scheduled("u-1", now, content(), false, now);
        let pending = NotificationRecord::scheduled("u-1", now, content(), false, now);
        for record in [&sent, &pending] {
            store.create(record).await.unwrap();
        }
        store
            .transition(
                &sent.id,
                Transition::Sent {
                    message_id: "fcm-1".to_string(),
                    sent_at: now,
                },
            )
            .await
            .unwrap();

        let service = CancellationService::new(store.clone(), None);
        let cancelled = service.cancel_for_user("u-1", "r").await.unwrap();
        assert_eq!(cancelled, 1);

        let untouched = store.require(&sent.id).await.unwrap();
        assert_eq!(untouched.status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_queue_delete_failure_never_blocks_cancellation() {
        let store = notifications();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut record = NotificationRecord::scheduled("u-1", now, content(), false, now);
        record.queue_task = Some("task-1".to_string());
        store.create(&record).await.unwrap();

        let mut queue = MockDeferredQueue::new();
        queue
            .expect_delete()
            .withf(|task| task == "task-1")
            .times(1)
            .returning(|_| Err(ReminderError::queue("scheduler down")));

        let service = CancellationService::new(store.clone(), Some(Arc::new(queue)));
        let cancelled = service.cancel_for_user("u-1", "r").await.unwrap();
        assert_eq!(cancelled, 1);

        let loaded = store.require(&record.id).await.unwrap();
        assert_eq!(loaded.status, NotificationStatus::Cancelled);
    }
}
