//! Reminder manager
//!
//! Owns the collaborator handles and component instances and exposes the
//! service's public operations. HTTP handlers hold an `Arc<ReminderManager>`
//! and delegate here; anything transport-specific stays out of this module.

use std::sync::Arc;

use chrono::Utc;
use kinesia_shared::{
    CancelNotificationsRequest, CancelNotificationsResponse, NotificationRecord,
    NotificationStatus, RegisterPushTokenRequest, ScanOutcome, ScheduleNotificationRequest,
    ScheduleNotificationResponse, UpdateInformationRequest, UpdateInformationResponse,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use validator::Validate;

use crate::cancellation::CancellationService;
use crate::config::{ReminderConfig, StoreBackend};
use crate::dispatcher::{DeliveryDispatcher, DeliveryResult};
use crate::error::{ReminderError, Result};
use crate::gateway::FcmGateway;
use crate::metrics::ReminderMetrics;
use crate::queue::{DeferredQueue, HttpTaskQueue};
use crate::reactor::PreferenceReactor;
use crate::scanner::DueScanner;
use crate::store::{DocumentStore, MemoryStore, MongoStore, NotificationStore, UserStore};

/// Reason recorded when a cancel request does not carry one
const DEFAULT_CANCEL_REASON: &str = "user request";

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

pub struct ReminderManager {
    config: ReminderConfig,
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) users: Arc<UserStore>,
    pub(crate) notifications: Arc<NotificationStore>,
    queue: Option<Arc<dyn DeferredQueue>>,
    cancellation: Arc<CancellationService>,
    reactor: PreferenceReactor,
    dispatcher: Arc<DeliveryDispatcher>,
    scanner: Arc<DueScanner>,
    metrics: ReminderMetrics,
}

impl ReminderManager {
    /// Build the full component graph from configuration.
    pub async fn new(config: ReminderConfig) -> Result<Self> {
        let store: Arc<dyn DocumentStore> = match config.store.backend {
            StoreBackend::Mongo => Arc::new(MongoStore::connect(&config.store).await?),
            StoreBackend::Memory => {
                info!("Using the in-memory document store");
                Arc::new(MemoryStore::new())
            }
        };

        let users = Arc::new(UserStore::new(store.clone(), &config.store.users_collection));
        let notifications = Arc::new(NotificationStore::new(
            store.clone(),
            &config.store.notifications_collection,
        ));

        let queue: Option<Arc<dyn DeferredQueue>> = if config.queue.enabled {
            info!("Deferred task queue enabled at {}", config.queue.endpoint);
            Some(Arc::new(HttpTaskQueue::new(&config.queue)?))
        } else {
            None
        };

        let gateway = Arc::new(FcmGateway::new(&config.gateway)?);
        let metrics = ReminderMetrics::new(&config.metrics)?;

        let cancellation = Arc::new(CancellationService::new(
            notifications.clone(),
            queue.clone(),
        ));
        let reactor = PreferenceReactor::new(
            users.clone(),
            notifications.clone(),
            cancellation.clone(),
            queue.clone(),
            config.delivery.clone(),
        );
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            users.clone(),
            notifications.clone(),
            gateway,
            queue.clone(),
            config.delivery.clone(),
            metrics.clone(),
        ));
        let scanner = Arc::new(DueScanner::new(
            users.clone(),
            notifications.clone(),
            dispatcher.clone(),
            config.scanner.clone(),
            config.delivery.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            store,
            users,
            notifications,
            queue,
            cancellation,
            reactor,
            dispatcher,
            scanner,
            metrics,
        })
    }

    /// Apply a notification settings change.
    pub async fn update_information(
        &self,
        request: UpdateInformationRequest,
    ) -> Result<UpdateInformationResponse> {
        request.validate()?;
        match self.reactor.apply(&request, Utc::now()).await? {
            Some(response) => Ok(response),
            None => Err(ReminderError::not_found(format!(
                "user {}",
                request.user_id
            ))),
        }
    }

    /// Schedule a notification for an explicit instant. A target already in
    /// the past is delivered inline instead of waiting out a scan cycle.
    pub async fn schedule_notification(
        &self,
        request: ScheduleNotificationRequest,
    ) -> Result<ScheduleNotificationResponse> {
        request.validate()?;
        let now = Utc::now();
        let user = self.users.require(&request.user_id).await?;

        if let Err(e) = self
            .cancellation
            .cancel_for_user(&user.id, "superseded by manual schedule")
            .await
        {
            warn!(
                "Failed to cancel outstanding notifications for user {}: {}",
                user.id, e
            );
        }

        let content = user
            .next_message
            .clone()
            .unwrap_or_else(|| self.config.delivery.default_content());
        let mut record = NotificationRecord::scheduled(
            &user.id,
            request.scheduled_time,
            content,
            request.is_one_time,
            now,
        );

        let mut message_id = None;
        if request.scheduled_time <= now {
            self.notifications.create(&record).await?;
            match self.dispatcher.deliver(&user, &record, now).await? {
                DeliveryResult::Sent { message_id: id } => message_id = Some(id),
                DeliveryResult::Failed { error } => {
                    warn!("Inline delivery for user {} failed: {}", user.id, error)
                }
                DeliveryResult::Skipped { reason } => {
                    warn!("Inline delivery for user {} skipped: {}", user.id, reason)
                }
            }
        } else {
            if let Some(queue) = &self.queue {
                match queue
                    .enqueue(&user.id, &record.id, request.scheduled_time)
                    .await
                {
                    Ok(task_ref) => record.queue_task = Some(task_ref),
                    Err(e) => warn!(
                        "Failed to enqueue trigger for notification {}: {}",
                        record.id, e
                    ),
                }
            }
            self.notifications.create(&record).await?;

            if let Err(e) = self
                .users
                .set_next_notification_time(&user.id, Some(request.scheduled_time), now, true)
                .await
            {
                warn!(
                    "Failed to persist next notification time for user {}: {}",
                    user.id, e
                );
            }
        }

        Ok(ScheduleNotificationResponse {
            notification_id: record.id,
            message_id,
            scheduled_for: request.scheduled_time,
        })
    }

    /// Run one due-notification scan pass.
    pub async fn check_notifications(&self) -> Result<ScanOutcome> {
        self.scanner.scan_once(Utc::now()).await
    }

    /// Cancel everything scheduled for a user and clear their next fire.
    pub async fn cancel_notifications(
        &self,
        request: CancelNotificationsRequest,
    ) -> Result<CancelNotificationsResponse> {
        request.validate()?;
        let reason = request.reason.as_deref().unwrap_or(DEFAULT_CANCEL_REASON);
        let cancelled = self
            .cancellation
            .cancel_for_user(&request.user_id, reason)
            .await?;

        if let Err(e) = self
            .users
            .set_next_notification_time(&request.user_id, None, Utc::now(), false)
            .await
        {
            warn!(
                "Failed to clear next notification time for user {}: {}",
                request.user_id, e
            );
        }

        Ok(CancelNotificationsResponse { cancelled })
    }

    /// Store a device push token on the user profile.
    pub async fn register_push_token(&self, request: RegisterPushTokenRequest) -> Result<()> {
        request.validate()?;
        let matched = self
            .users
            .register_push_token(
                &request.user_id,
                &request.push_token,
                request.device_type,
                request.app_bundle_id.as_deref(),
            )
            .await?;
        if !matched {
            return Err(ReminderError::not_found(format!(
                "user {}",
                request.user_id
            )));
        }
        info!("Registered push token for user {}", request.user_id);
        Ok(())
    }

    /// Fetch one notification record.
    pub async fn get_notification(&self, id: &str) -> Result<NotificationRecord> {
        self.notifications.require(id).await
    }

    /// List a user's notifications, newest first.
    pub async fn list_notifications(
        &self,
        user_id: &str,
        status: Option<NotificationStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationRecord>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
        self.notifications.for_user(user_id, status, limit).await
    }

    /// Connectivity check against the document store.
    pub async fn ping_store(&self) -> Result<()> {
        self.store.ping().await
    }

    /// Render the Prometheus exposition for the metrics endpoint.
    pub fn export_metrics(&self) -> Result<String> {
        self.metrics.export()
    }

    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    /// Start the background scan loop when enabled.
    pub fn start_scanner(
        &self,
        shutdown: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if !self.config.scanner.enabled {
            info!("Due-notification scanner disabled by configuration");
            return None;
        }
        Some(self.scanner.clone().spawn(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use kinesia_shared::DeviceType;
    use serde_json::Value;

    async fn manager() -> ReminderManager {
        let mut config = ReminderConfig::default();
        config.store.backend = StoreBackend::Memory;
        config.gateway.fcm_server_key = "test-key".to_string();
        ReminderManager::new(config).await.unwrap()
    }

    async fn seed_user(m: &ReminderManager, value: Value) {
        match value {
            Value::Object(document) => m.store.insert("users", document).await.unwrap(),
            _ => panic!("user fixture must be an object"),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn schedule_request(user_id: &str, when: DateTime<Utc>) -> ScheduleNotificationRequest {
        ScheduleNotificationRequest {
            user_id: user_id.to_string(),
            scheduled_time: when,
            is_one_time: true,
        }
    }

    #[tokio::test]
    async fn test_schedule_notification_future_target() {
        let m = manager().await;
        seed_user(&m, serde_json::json!({"id": "u-1"})).await;
        let target = utc(2030, 1, 1, 9, 30, 0);

        let response = m
            .schedule_notification(schedule_request("u-1", target))
            .await
            .unwrap();
        assert!(response.message_id.is_none());
        assert_eq!(response.scheduled_for, target);

        let record = m.get_notification(&response.notification_id).await.unwrap();
        assert_eq!(record.status, NotificationStatus::Scheduled);
        assert_eq!(record.scheduled_for, target);
        assert!(record.is_one_time);

        let user = m.users.require("u-1").await.unwrap();
        assert_eq!(user.next_notification_time, Some(target));
        assert!(user.next_notification_time_manual_override);
    }

    #[tokio::test]
    async fn test_schedule_notification_supersedes_previous() {
        let m = manager().await;
        seed_user(&m, serde_json::json!({"id": "u-1"})).await;

        let first = m
            .schedule_notification(schedule_request("u-1", utc(2030, 1, 1, 9, 30, 0)))
            .await
            .unwrap();
        let second = m
            .schedule_notification(schedule_request("u-1", utc(2030, 1, 2, 9, 30, 0)))
            .await
            .unwrap();

        let old = m.get_notification(&first.notification_id).await.unwrap();
        assert_eq!(old.status, NotificationStatus::Cancelled);
        assert_eq!(
            old.cancelled_reason.as_deref(),
            Some("superseded by manual schedule")
        );

        let fresh = m.get_notification(&second.notification_id).await.unwrap();
        assert_eq!(fresh.status, NotificationStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_schedule_notification_unknown_user() {
        let m = manager().await;
        let err = m
            .schedule_notification(schedule_request("ghost", utc(2030, 1, 1, 9, 30, 0)))
            .await
            .unwrap_err();
        assert!(matches!(err, ReminderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_cancel_notifications_clears_user_schedule() {
        let m = manager().await;
        seed_user(&m, serde_json::json!({"id": "u-1"})).await;
        let scheduled = m
            .schedule_notification(schedule_request("u-1", utc(2030, 1, 1, 9, 30, 0)))
            .await
            .unwrap();

        let response = m
            .cancel_notifications(CancelNotificationsRequest {
                user_id: "u-1".to_string(),
                reason: Some("holiday".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(response.cancelled, 1);

        let record = m.get_notification(&scheduled.notification_id).await.unwrap();
        assert_eq!(record.status, NotificationStatus::Cancelled);
        assert_eq!(record.cancelled_reason.as_deref(), Some("holiday"));

        let user = m.users.require("u-1").await.unwrap();
        assert!(user.next_notification_time.is_none());
        assert!(!user.next_notification_time_manual_override);
    }

    #[tokio::test]
    async fn test_cancel_unknown_user_is_a_noop() {
        let m = manager().await;
        let response = m
            .cancel_notifications(CancelNotificationsRequest {
                user_id: "ghost".to_string(),
                reason: None,
            })
            .await
            .unwrap();
        assert_eq!(response.cancelled, 0);
    }

    #[tokio::test]
    async fn test_register_push_token_roundtrip() {
        let m = manager().await;
        seed_user(&m, serde_json::json!({"id": "u-1"})).await;

        m.register_push_token(RegisterPushTokenRequest {
            user_id: "u-1".to_string(),
            push_token: "tok-1".to_string(),
            device_type: Some(DeviceType::Ios),
            app_bundle_id: Some("app.kinesia.ios".to_string()),
        })
        .await
        .unwrap();

        let user = m.users.require("u-1").await.unwrap();
        assert_eq!(user.push_token.as_deref(), Some("tok-1"));
        assert_eq!(user.device_type, DeviceType::Ios);

        let err = m
            .register_push_token(RegisterPushTokenRequest {
                user_id: "ghost".to_string(),
                push_token: "tok-2".to_string(),
                device_type: None,
                app_bundle_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReminderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_information_validates_input() {
        let m = manager().await;
        let err = m
            .update_information(UpdateInformationRequest {
                user_id: String::new(),
                notification_time: None,
                next_notification_time: None,
                timezone_offset: None,
                force_today: None,
                is_enabled: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReminderError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_update_information_unknown_user() {
        let m = manager().await;
        let err = m
            .update_information(UpdateInformationRequest {
                user_id: "ghost".to_string(),
                notification_time: Some("09:30".to_string()),
                next_notification_time: None,
                timezone_offset: None,
                force_today: None,
                is_enabled: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReminderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_notifications_with_status_filter() {
        let m = manager().await;
        seed_user(&m, serde_json::json!({"id": "u-1"})).await;
        m.schedule_notification(schedule_request("u-1", utc(2030, 1, 1, 9, 30, 0)))
            .await
            .unwrap();
        // Supersedes the first, leaving one cancelled and one scheduled.
        m.schedule_notification(schedule_request("u-1", utc(2030, 1, 2, 9, 30, 0)))
            .await
            .unwrap();

        let listed = m.list_notifications("u-1", None, None).await.unwrap();
        assert_eq!(listed.len(), 2);

        let scheduled_only = m
            .list_notifications("u-1", Some(NotificationStatus::Scheduled), None)
            .await
            .unwrap();
        assert_eq!(scheduled_only.len(), 1);
        assert_eq!(scheduled_only[0].scheduled_for, utc(2030, 1, 2, 9, 30, 0));
    }

    #[tokio::test]
    async fn test_check_notifications_on_empty_store() {
        let m = manager().await;
        let outcome = m.check_notifications().await.unwrap();
        assert_eq!(outcome.processed, 0);
        assert_eq!(outcome.sent, 0);
    }

    #[tokio::test]
    async fn test_ping_store() {
        let m = manager().await;
        m.ping_store().await.unwrap();
    }
}
