//! Type definitions shared between the Kinesia backend services
//!
//! This module provides the user-facing notification domain model and the
//! request/response types of the reminder service API. Documents in the
//! store are schemaless, so every field a service does not strictly need
//! carries a serde default and reads validate only what they rely on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

// =============================================================================
// User-side notification fields
// =============================================================================

/// How often a recurring reminder fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderFrequency {
    #[default]
    Daily,
}

/// A user's reminder preferences as stored on their profile document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub is_enabled: bool,
    #[serde(default)]
    pub frequency: ReminderFrequency,
    /// Local hour of day, 0-23.
    pub hour: u8,
    /// Local minute, 0-59.
    pub minute: u8,
    /// Fixed numeric offset from UTC in hours; fractional values support
    /// half-hour zones.
    #[serde(default)]
    pub timezone_offset: f64,
}

/// Device platform family, used to select the push payload shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Ios,
    Android,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ios => write!(f, "ios"),
            Self::Android => write!(f, "android"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Title/body pair rendered into a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub title: String,
    pub body: String,
}

/// The slice of a user profile document the reminder service reads and
/// writes. The profile itself is owned by the onboarding service; all
/// fields except `id` may be absent on any given document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub notification_preferences: Option<NotificationPreferences>,
    /// The single authoritative "next fire" instant. Last writer wins.
    #[serde(default, with = "crate::time::rfc3339_millis_opt")]
    pub next_notification_time: Option<DateTime<Utc>>,
    /// When `next_notification_time` was computed; writers skip their update
    /// when a newer computation already landed.
    #[serde(default, with = "crate::time::rfc3339_millis_opt")]
    pub next_notification_time_computed_at: Option<DateTime<Utc>>,
    /// True while a one-time target is pinned and must win over recurring
    /// recomputation (only honored while the target is still in the future).
    #[serde(default)]
    pub next_notification_time_manual_override: bool,
    /// When true, a one-time target already in the past is kept on today
    /// instead of rolling to tomorrow, so it fires on the next scan.
    #[serde(default)]
    pub force_today: bool,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub app_bundle_id: Option<String>,
    /// Pre-generated content for the next reminder, preferred over the
    /// stored notification content when present.
    #[serde(default)]
    pub next_message: Option<MessageContent>,
    /// Denormalized UTC hour/minute of `next_notification_time`, persisted
    /// for query convenience.
    #[serde(default)]
    pub utc_hour: Option<u8>,
    #[serde(default)]
    pub utc_minute: Option<u8>,
}

impl User {
    /// Whether this user has an active daily reminder schedule.
    pub fn wants_daily_reminder(&self) -> bool {
        self.notification_preferences
            .as_ref()
            .map(|p| p.is_enabled && p.frequency == ReminderFrequency::Daily)
            .unwrap_or(false)
    }
}

// =============================================================================
// Notification records
// =============================================================================

/// Notification kind carried on every record. Only exercise reminders are
/// produced today; the field stays a string because records are schemaless
/// and older documents carry free-form values.
pub const KIND_EXERCISE_REMINDER: &str = "exercise_reminder";

/// Lifecycle state of a notification. Transitions only move forward;
/// `Scheduled` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Scheduled,
    Sent,
    Cancelled,
    Failed,
}

impl NotificationStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Scheduled)
    }

    /// The single authoritative transition rule: `scheduled` may move to any
    /// terminal state, terminal states are final. Every status write in the
    /// system goes through a check of this function.
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        match self {
            Self::Scheduled => next != Self::Scheduled,
            Self::Sent | Self::Cancelled | Self::Failed => false,
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Sent => write!(f, "sent"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One scheduled/sent/cancelled/failed notification attempt. Records are
/// never deleted; they form the delivery audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    #[serde(with = "crate::time::rfc3339_millis")]
    pub scheduled_for: DateTime<Utc>,
    pub status: NotificationStatus,
    pub content: MessageContent,
    #[serde(with = "crate::time::rfc3339_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "crate::time::rfc3339_millis_opt")]
    pub sent_at: Option<DateTime<Utc>>,
    /// Gateway-assigned message id, present once sent.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Present iff the record is `failed`.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub is_one_time: bool,
    /// Present iff the record is `cancelled`.
    #[serde(default)]
    pub cancelled_reason: Option<String>,
    /// Opaque deferred-queue task reference, deletable on cancellation.
    #[serde(default)]
    pub queue_task: Option<String>,
}

impl NotificationRecord {
    /// A fresh scheduled exercise reminder for a user.
    pub fn scheduled(
        user_id: impl Into<String>,
        scheduled_for: DateTime<Utc>,
        content: MessageContent,
        is_one_time: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            kind: KIND_EXERCISE_REMINDER.to_string(),
            scheduled_for,
            status: NotificationStatus::Scheduled,
            content,
            created_at: now,
            sent_at: None,
            message_id: None,
            error: None,
            is_one_time,
            cancelled_reason: None,
            queue_task: None,
        }
    }
}

// =============================================================================
// Reminder service API types
// =============================================================================

/// Body of `POST /api/v1/update_information`. Times are local "HH:MM"
/// strings interpreted with the user's timezone offset.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateInformationRequest {
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub user_id: String,
    /// New recurring reminder time.
    #[serde(default)]
    pub notification_time: Option<String>,
    /// One-time override target; pins the next fire to this local time.
    #[serde(default)]
    pub next_notification_time: Option<String>,
    #[validate(range(min = -14.0, max = 14.0, message = "outside valid UTC offset range"))]
    #[serde(default)]
    pub timezone_offset: Option<f64>,
    #[serde(default)]
    pub force_today: Option<bool>,
    #[serde(default)]
    pub is_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInformationResponse {
    pub user_id: String,
    #[serde(default, with = "crate::time::rfc3339_millis_opt")]
    pub next_notification_time: Option<DateTime<Utc>>,
    pub manual_override: bool,
}

/// Body of `POST /api/v1/schedule_notification`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScheduleNotificationRequest {
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub user_id: String,
    #[serde(with = "crate::time::rfc3339_millis")]
    pub scheduled_time: DateTime<Utc>,
    #[serde(default)]
    pub is_one_time: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleNotificationResponse {
    pub notification_id: String,
    /// Present iff the requested instant was already due and the push was
    /// delivered inline.
    pub message_id: Option<String>,
    #[serde(with = "crate::time::rfc3339_millis")]
    pub scheduled_for: DateTime<Utc>,
}

/// Body of `POST /api/v1/cancel_notifications`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CancelNotificationsRequest {
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub user_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelNotificationsResponse {
    pub cancelled: usize,
}

/// Body of `POST /api/v1/register_push_token`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterPushTokenRequest {
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub user_id: String,
    #[validate(length(min = 1, message = "cannot be empty"))]
    pub push_token: String,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub app_bundle_id: Option<String>,
}

/// Aggregate result of one due-notification scan pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Users whose next fire fell inside the due window.
    pub processed: usize,
    pub sent: usize,
    /// Candidates dropped by a guard (disabled, tokenless, duplicate).
    pub skipped: usize,
    pub errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_transitions_to_all_terminal_states() {
        let s = NotificationStatus::Scheduled;
        assert!(s.can_transition_to(NotificationStatus::Sent));
        assert!(s.can_transition_to(NotificationStatus::Cancelled));
        assert!(s.can_transition_to(NotificationStatus::Failed));
        assert!(!s.can_transition_to(NotificationStatus::Scheduled));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            NotificationStatus::Sent,
            NotificationStatus::Cancelled,
            NotificationStatus::Failed,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                NotificationStatus::Scheduled,
                NotificationStatus::Sent,
                NotificationStatus::Cancelled,
                NotificationStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&NotificationStatus::Scheduled).unwrap();
        assert_eq!(json, "\"scheduled\"");
        let back: NotificationStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(back, NotificationStatus::Failed);
    }

    #[test]
    fn user_deserializes_from_sparse_document() {
        let user: User = serde_json::from_str(r#"{"id": "u-1"}"#).unwrap();
        assert_eq!(user.id, "u-1");
        assert!(user.notification_preferences.is_none());
        assert!(user.push_token.is_none());
        assert_eq!(user.device_type, DeviceType::Unknown);
        assert!(!user.next_notification_time_manual_override);
        assert!(!user.wants_daily_reminder());
    }

    #[test]
    fn preferences_require_hour_and_minute() {
        let err = serde_json::from_str::<NotificationPreferences>(r#"{"is_enabled": true}"#);
        assert!(err.is_err());

        let prefs: NotificationPreferences =
            serde_json::from_str(r#"{"is_enabled": true, "hour": 9, "minute": 30}"#).unwrap();
        assert_eq!(prefs.frequency, ReminderFrequency::Daily);
        assert_eq!(prefs.timezone_offset, 0.0);
    }

    #[test]
    fn unknown_device_type_falls_back() {
        let device: DeviceType = serde_json::from_str("\"wristwatch\"").unwrap();
        assert_eq!(device, DeviceType::Unknown);
        let ios: DeviceType = serde_json::from_str("\"ios\"").unwrap();
        assert_eq!(ios, DeviceType::Ios);
    }

    #[test]
    fn enabled_daily_preferences_want_reminders() {
        let user: User = serde_json::from_str(
            r#"{
                "id": "u-2",
                "notification_preferences": {
                    "is_enabled": true,
                    "frequency": "daily",
                    "hour": 7,
                    "minute": 15,
                    "timezone_offset": -5.0
                }
            }"#,
        )
        .unwrap();
        assert!(user.wants_daily_reminder());
    }
}
