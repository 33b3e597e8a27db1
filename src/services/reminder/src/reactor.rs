//! Preference change reactor
//!
//! Handles `update_information` requests: merges settings changes onto the
//! user profile, supersedes any outstanding schedule and computes the next
//! fire instant. An explicit one-time request pins a new target; otherwise a
//! still-future pinned target wins over recomputation. Sub-step failures
//! after the profile merge are logged and do not roll back earlier writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kinesia_shared::{
    NotificationPreferences, NotificationRecord, ReminderFrequency, UpdateInformationRequest,
    UpdateInformationResponse, User,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cancellation::CancellationService;
use crate::config::DeliveryConfig;
use crate::error::{ReminderError, Result};
use crate::queue::DeferredQueue;
use crate::schedule::{effective_target, one_time_target, parse_wall_clock};
use crate::store::{Document, NotificationStore, UserStore};

/// Reason recorded on notifications superseded by a settings change
const SUPERSEDED_REASON: &str = "superseded by settings update";

pub struct PreferenceReactor {
    users: Arc<UserStore>,
    notifications: Arc<NotificationStore>,
    cancellation: Arc<CancellationService>,
    queue: Option<Arc<dyn DeferredQueue>>,
    delivery: DeliveryConfig,
}

impl PreferenceReactor {
    pub fn new(
        users: Arc<UserStore>,
        notifications: Arc<NotificationStore>,
        cancellation: Arc<CancellationService>,
        queue: Option<Arc<dyn DeferredQueue>>,
        delivery: DeliveryConfig,
    ) -> Self {
        Self {
            users,
            notifications,
            cancellation,
            queue,
            delivery,
        }
    }

    /// Apply a settings update and reschedule the user's reminder.
    ///
    /// Returns `Ok(None)` when the user does not exist.
    pub async fn apply(
        &self,
        request: &UpdateInformationRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<UpdateInformationResponse>> {
        let user = match self.users.get(&request.user_id).await? {
            Some(user) => user,
            None => {
                debug!(
                    "Ignoring settings update for unknown user {}",
                    request.user_id
                );
                return Ok(None);
            }
        };

        let user = self.merge_settings(user, request).await?;
        let (target, manual_override) = self.resolve_target(&user, request, now)?;

        if let Err(e) = self
            .cancellation
            .cancel_for_user(&user.id, SUPERSEDED_REASON)
            .await
        {
            warn!(
                "Failed to cancel outstanding notifications for user {}: {}",
                user.id, e
            );
        }

        if let Some(when) = target {
            self.schedule_record(&user, when, manual_override, now)
                .await;
        }

        if let Err(e) = self
            .users
            .set_next_notification_time(&user.id, target, now, manual_override)
            .await
        {
            warn!(
                "Failed to persist next notification time for user {}: {}",
                user.id, e
            );
        }

        info!(
            "Updated reminder settings for user {}; next fire {:?}",
            user.id, target
        );

        Ok(Some(UpdateInformationResponse {
            user_id: user.id,
            next_notification_time: target,
            manual_override,
        }))
    }

    /// Merge the request's settings fields onto the profile, returning the
    /// updated view of the user.
    async fn merge_settings(
        &self,
        mut user: User,
        request: &UpdateInformationRequest,
    ) -> Result<User> {
        let mut prefs = user
            .notification_preferences
            .clone()
            .unwrap_or(NotificationPreferences {
                // First-time setup: naming a reminder time implies wanting it.
                is_enabled: request.notification_time.is_some(),
                frequency: ReminderFrequency::Daily,
                hour: 9,
                minute: 0,
                timezone_offset: 0.0,
            });
        let mut prefs_changed = false;

        if let Some(raw) = &request.notification_time {
            let (hour, minute) = parse_wall_clock(raw)?;
            prefs.hour = hour;
            prefs.minute = minute;
            prefs_changed = true;
        }
        if let Some(offset) = request.timezone_offset {
            prefs.timezone_offset = offset;
            prefs_changed = true;
        }
        if let Some(enabled) = request.is_enabled {
            prefs.is_enabled = enabled;
            prefs_changed = true;
        }

        let mut changes = Document::new();
        if prefs_changed {
            changes.insert(
                "notification_preferences".to_string(),
                serde_json::to_value(&prefs)?,
            );
            user.notification_preferences = Some(prefs);
        }
        if let Some(force) = request.force_today {
            changes.insert("force_today".to_string(), json!(force));
            user.force_today = force;
        }
        if !changes.is_empty() {
            self.users.merge(&user.id, changes).await?;
        }

        Ok(user)
    }

    /// Resolve the instant the next reminder should fire, together with the
    /// manual-override flag describing it.
    fn resolve_target(
        &self,
        user: &User,
        request: &UpdateInformationRequest,
        now: DateTime<Utc>,
    ) -> Result<(Option<DateTime<Utc>>, bool)> {
        if let Some(raw) = &request.next_notification_time {
            let (hour, minute) = parse_wall_clock(raw).map_err(|e| match e {
                ReminderError::Validation { message, .. } => {
                    ReminderError::validation("next_notification_time", message)
                }
                other => other,
            })?;
            let offset = user
                .notification_preferences
                .as_ref()
                .map(|p| p.timezone_offset)
                .unwrap_or(0.0);
            let target = one_time_target(hour, minute, offset, user.force_today, now);
            return Ok((Some(target), true));
        }

        let manual_override = user.next_notification_time_manual_override
            && user
                .next_notification_time
                .map_or(false, |pinned| pinned > now);
        Ok((effective_target(user, now), manual_override))
    }

    /// Create the next scheduled record, attaching a queue trigger when one
    /// is configured. Failures are logged; a missed record is recreated by
    /// the next scan.
    async fn schedule_record(
        &self,
        user: &User,
        when: DateTime<Utc>,
        one_time: bool,
        now: DateTime<Utc>,
    ) {
        let content = user
            .next_message
            .clone()
            .unwrap_or_else(|| self.delivery.default_content());
        let mut record = NotificationRecord::scheduled(&user.id, when, content, one_time, now);

        if let Some(queue) = &self.queue {
            match queue.enqueue(&user.id, &record.id, when).await {
                Ok(task_ref) => record.queue_task = Some(task_ref),
                Err(e) => warn!(
                    "Failed to enqueue trigger for notification {}: {}",
                    record.id, e
                ),
            }
        }

        if let Err(e) = self.notifications.create(&record).await {
            warn!(
                "Failed to create scheduled notification for user {}: {}",
                user.id, e
            );
        }
    }
}
