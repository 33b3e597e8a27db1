//! Delivery dispatcher
//!
//! Sends one scheduled notification to its user through the push gateway and
//! records the outcome on the notification record. A successful delivery
//! advances the user's schedule (daily users roll to the next occurrence); a
//! permanently invalid token is cleared from the profile. Failed attempts
//! are recorded and left for the next cycle, never retried inline.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use kinesia_shared::{MessageContent, NotificationRecord, User};
use tracing::{info, warn};

use crate::config::DeliveryConfig;
use crate::error::Result;
use crate::gateway::{GatewayError, PushGateway};
use crate::metrics::ReminderMetrics;
use crate::payload::PushPayload;
use crate::queue::DeferredQueue;
use crate::schedule::next_fire_time;
use crate::store::{NotificationStore, Transition, UserStore};

/// Outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    Sent { message_id: String },
    Failed { error: String },
    Skipped { reason: &'static str },
}

pub struct DeliveryDispatcher {
    users: Arc<UserStore>,
    notifications: Arc<NotificationStore>,
    gateway: Arc<dyn PushGateway>,
    queue: Option<Arc<dyn DeferredQueue>>,
    delivery: DeliveryConfig,
    metrics: ReminderMetrics,
}

impl DeliveryDispatcher {
    pub fn new(
        users: Arc<UserStore>,
        notifications: Arc<NotificationStore>,
        gateway: Arc<dyn PushGateway>,
        queue: Option<Arc<dyn DeferredQueue>>,
        delivery: DeliveryConfig,
        metrics: ReminderMetrics,
    ) -> Self {
        Self {
            users,
            notifications,
            gateway,
            queue,
            delivery,
            metrics,
        }
    }

    /// Deliver one scheduled notification to its user.
    pub async fn deliver(
        &self,
        user: &User,
        record: &NotificationRecord,
        now: DateTime<Utc>,
    ) -> Result<DeliveryResult> {
        let token = match user.push_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => {
                self.metrics.record_skip("no_token");
                return Ok(DeliveryResult::Skipped {
                    reason: "missing push token",
                });
            }
        };

        let content = self.resolve_content(user, record);
        let payload = PushPayload::for_user(user, &content, &self.delivery);

        let started = Instant::now();
        match self.gateway.send(token, &payload).await {
            Ok(message_id) => {
                self.metrics.record_sent(started.elapsed().as_secs_f64());
                let applied = self
                    .notifications
                    .transition(
                        &record.id,
                        Transition::Sent {
                            message_id: message_id.clone(),
                            sent_at: now,
                        },
                    )
                    .await?;

                if applied {
                    self.advance_schedule(user, now).await;
                    info!(
                        "Delivered notification {} to user {} ({})",
                        record.id, user.id, message_id
                    );
                } else {
                    warn!(
                        "Notification {} reached the gateway but was already finalized",
                        record.id
                    );
                }

                Ok(DeliveryResult::Sent { message_id })
            }
            Err(GatewayError::TokenInvalid) => {
                self.metrics
                    .record_failure("token_invalid", started.elapsed().as_secs_f64());
                if let Err(e) = self.users.clear_push_token(&user.id).await {
                    warn!(
                        "Failed to clear invalid push token for user {}: {}",
                        user.id, e
                    );
                }
                let error = GatewayError::TokenInvalid.to_string();
                self.fail_record(&record.id, &error).await?;
                Ok(DeliveryResult::Failed { error })
            }
            Err(e) => {
                self.metrics
                    .record_failure(failure_kind(&e), started.elapsed().as_secs_f64());
                let error = e.to_string();
                self.fail_record(&record.id, &error).await?;
                Ok(DeliveryResult::Failed { error })
            }
        }
    }

    fn resolve_content(&self, user: &User, record: &NotificationRecord) -> MessageContent {
        if let Some(message) = &user.next_message {
            return message.clone();
        }
        if !record.content.title.is_empty() {
            return record.content.clone();
        }
        self.delivery.default_content()
    }

    async fn fail_record(&self, id: &str, error: &str) -> Result<()> {
        let applied = self
            .notifications
            .transition(
                id,
                Transition::Failed {
                    error: error.to_string(),
                },
            )
            .await?;
        if !applied {
            warn!(
                "Notification {} was finalized before its failure could be recorded",
                id
            );
        }
        Ok(())
    }

    /// Move the user's schedule past a completed send: daily users roll to
    /// the next occurrence, everyone else has the next-fire field cleared so
    /// a stale past instant cannot retrigger. Failures here are logged; the
    /// next scan recreates a missing record.
    async fn advance_schedule(&self, user: &User, now: DateTime<Utc>) {
        let prefs = match user.notification_preferences.as_ref() {
            Some(prefs) if user.wants_daily_reminder() => prefs,
            _ => {
                if let Err(e) = self
                    .users
                    .set_next_notification_time(&user.id, None, now, false)
                    .await
                {
                    warn!(
                        "Failed to clear next notification time for user {}: {}",
                        user.id, e
                    );
                }
                return;
            }
        };

        let next = next_fire_time(prefs.hour, prefs.minute, prefs.timezone_offset, now);
        let mut record = NotificationRecord::scheduled(
            &user.id,
            next,
            self.delivery.default_content(),
            false,
            now,
        );

        if let Some(queue) = &self.queue {
            match queue.enqueue(&user.id, &record.id, next).await {
                Ok(task_ref) => record.queue_task = Some(task_ref),
                Err(e) => warn!(
                    "Failed to enqueue trigger for notification {}: {}",
                    record.id, e
                ),
            }
        }

        if let Err(e) = self.notifications.create(&record).await {
            warn!(
                "Failed to create follow-up notification for user {}: {}",
                user.id, e
            );
        }

        if let Err(e) = self
            .users
            .set_next_notification_time(&user.id, Some(next), now, false)
            .await
        {
            warn!(
                "Failed to advance next notification time for user {}: {}",
                user.id, e
            );
        }
    }
}

fn failure_kind(error: &GatewayError) -> &'static str {
    match error {
        GatewayError::TokenInvalid => "token_invalid",
        GatewayError::Auth { .. } => "auth",
        GatewayError::Transient { .. } => "transient",
        GatewayError::Timeout => "timeout",
    }
}
