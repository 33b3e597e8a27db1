//! Due-notification scanner
//!
//! Polls for users whose next fire instant falls inside the due window and
//! hands the survivors of the guard checks to the dispatcher. Per-user
//! failures are isolated: they are logged, counted on the outcome and the
//! pass continues with the next candidate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kinesia_shared::{NotificationRecord, ScanOutcome, User};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{DeliveryConfig, ScannerConfig};
use crate::dispatcher::{DeliveryDispatcher, DeliveryResult};
use crate::error::Result;
use crate::metrics::ReminderMetrics;
use crate::store::{NotificationStore, UserStore};

pub struct DueScanner {
    users: Arc<UserStore>,
    notifications: Arc<NotificationStore>,
    dispatcher: Arc<DeliveryDispatcher>,
    config: ScannerConfig,
    delivery: DeliveryConfig,
    metrics: ReminderMetrics,
}

impl DueScanner {
    pub fn new(
        users: Arc<UserStore>,
        notifications: Arc<NotificationStore>,
        dispatcher: Arc<DeliveryDispatcher>,
        config: ScannerConfig,
        delivery: DeliveryConfig,
        metrics: ReminderMetrics,
    ) -> Self {
        Self {
            users,
            notifications,
            dispatcher,
            config,
            delivery,
            metrics,
        }
    }

    /// Run one scan pass over the due window.
    pub async fn scan_once(&self, now: DateTime<Utc>) -> Result<ScanOutcome> {
        let from = now - self.config.lookback();
        let to = now + self.config.lookahead();
        let candidates = self
            .users
            .due_between(from, to, self.config.batch_size)
            .await?;
        self.metrics.record_scan(candidates.len());

        let mut outcome = ScanOutcome::default();
        for user in candidates {
            outcome.processed += 1;
            match self.process_candidate(&user, now).await {
                Ok(DeliveryResult::Sent { .. }) => outcome.sent += 1,
                Ok(DeliveryResult::Skipped { reason }) => {
                    outcome.skipped += 1;
                    debug!("Skipping user {}: {}", user.id, reason);
                }
                Ok(DeliveryResult::Failed { error }) => {
                    outcome.errors += 1;
                    error!("Delivery failed for user {}: {}", user.id, error);
                }
                Err(e) => {
                    outcome.errors += 1;
                    error!("Scan failed for user {}: {}", user.id, e);
                }
            }
        }

        info!(
            "Scan complete: processed={} sent={} skipped={} errors={}",
            outcome.processed, outcome.sent, outcome.skipped, outcome.errors
        );
        Ok(outcome)
    }

    /// Run the scan loop until the shutdown token fires.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "Due-notification scanner started (interval {:?})",
                self.config.interval()
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.scan_once(Utc::now()).await {
                            error!("Scan pass failed: {}", e);
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Due-notification scanner stopping");
                        break;
                    }
                }
            }
        })
    }

    async fn process_candidate(&self, user: &User, now: DateTime<Utc>) -> Result<DeliveryResult> {
        if let Some(prefs) = user.notification_preferences.as_ref() {
            if !prefs.is_enabled {
                self.metrics.record_skip("disabled");
                return Ok(DeliveryResult::Skipped {
                    reason: "reminders disabled",
                });
            }
        }

        if user.push_token.as_deref().map_or(true, str::is_empty) {
            self.metrics.record_skip("no_token");
            return Ok(DeliveryResult::Skipped {
                reason: "missing push token",
            });
        }

        let deliverable = self.deliverable_record(user).await?;

        // Another record created inside the guard window means a concurrent
        // path already acted for this user.
        let cutoff = now - self.config.duplicate_guard();
        let recent = self.notifications.created_since(&user.id, cutoff).await?;
        let duplicate = match &deliverable {
            Some(record) => recent.iter().any(|r| r.id != record.id),
            None => !recent.is_empty(),
        };
        if duplicate {
            self.metrics.record_skip("duplicate");
            return Ok(DeliveryResult::Skipped {
                reason: "recent notification exists",
            });
        }

        let record = match deliverable {
            Some(record) => record,
            None => {
                let when = user.next_notification_time.unwrap_or(now);
                let content = user
                    .next_message
                    .clone()
                    .unwrap_or_else(|| self.delivery.default_content());
                let record = NotificationRecord::scheduled(
                    &user.id,
                    when,
                    content,
                    user.next_notification_time_manual_override,
                    now,
                );
                self.notifications.create(&record).await?;
                debug!(
                    "Recreated missing scheduled record {} for user {}",
                    record.id, user.id
                );
                record
            }
        };

        self.dispatcher.deliver(user, &record, now).await
    }

    /// The earliest still-scheduled record for the user. The user's
    /// `next_notification_time` is authoritative for when to fire; the
    /// record supplies content and the audit entry.
    async fn deliverable_record(&self, user: &User) -> Result<Option<NotificationRecord>> {
        let mut scheduled = self.notifications.scheduled_for_user(&user.id).await?;
        scheduled.sort_by(|a, b| a.scheduled_for.cmp(&b.scheduled_for));
        Ok(scheduled.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricsConfig;
    use crate::gateway::{GatewayError, MockPushGateway};
    use crate::store::{DocumentStore, MemoryStore, Transition};
    use chrono::TimeZone;
    use kinesia_shared::{MessageContent, NotificationStatus};
    use serde_json::Value;

    struct Fixture {
        backend: Arc<MemoryStore>,
        users: Arc<UserStore>,
        notifications: Arc<NotificationStore>,
        scanner: DueScanner,
    }

    fn fixture(gateway: MockPushGateway) -> Fixture {
        let backend = Arc::new(MemoryStore::new());
        let users = Arc::new(UserStore::new(backend.clone(), "users"));
        let notifications = Arc::new(NotificationStore::new(backend.clone(), "notifications"));
        let metrics = ReminderMetrics::new(&MetricsConfig {
            enabled: true,
            endpoint: "/metrics".to_string(),
            namespace: "test_scan".to_string(),
        })
        .unwrap();
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            users.clone(),
            notifications.clone(),
            Arc::new(gateway),
            None,
            DeliveryConfig::default(),
            metrics.clone(),
        ));
        let scanner = DueScanner::new(
            users.clone(),
            notifications.clone(),
            dispatcher,
            ScannerConfig::default(),
            DeliveryConfig::default(),
            metrics,
        );
        Fixture {
            backend,
            users,
            notifications,
            scanner,
        }
    }

    async fn seed(f: &Fixture, value: Value) {
        match value {
            Value::Object(document) => f.backend.insert("users", document).await.unwrap(),
            _ => panic!("user fixture must be an object"),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn content() -> MessageContent {
        MessageContent {
            title: "t".to_string(),
            body: "b".to_string(),
        }
    }

    fn due_user(id: &str, token: Option<&str>) -> Value {
        serde_json::json!({
            "id": id,
            "notification_preferences": {
                "is_enabled": true, "hour": 9, "minute": 30, "timezone_offset": 0.0
            },
            "next_notification_time": "2024-01-01T09:30:00.000Z",
            "push_token": token,
            "device_type": "android"
        })
    }

    #[tokio::test]
    async fn test_scan_delivers_due_user() {
        let mut gateway = MockPushGateway::new();
        gateway
            .expect_send()
            .times(1)
            .returning(|_, _| Ok("fcm-1".to_string()));
        let f = fixture(gateway);
        seed(&f, due_user("u-1", Some("tok-1"))).await;
        let record = NotificationRecord::scheduled(
            "u-1",
            utc(2024, 1, 1, 9, 30, 0),
            content(),
            false,
            utc(2024, 1, 1, 0, 0, 0),
        );
        f.notifications.create(&record).await.unwrap();

        let outcome = f.scanner.scan_once(utc(2024, 1, 1, 9, 31, 0)).await.unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.errors, 0);

        let sent = f.notifications.require(&record.id).await.unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);

        // The recurring schedule advanced to tomorrow.
        let user = f.users.require("u-1").await.unwrap();
        assert_eq!(user.next_notification_time, Some(utc(2024, 1, 2, 9, 30, 0)));
    }

    #[tokio::test]
    async fn test_scan_ignores_users_outside_window() {
        let f = fixture(MockPushGateway::new());
        seed(
            &f,
            serde_json::json!({
                "id": "u-1",
                "next_notification_time": "2024-01-01T18:00:00.000Z",
                "push_token": "tok-1"
            }),
        )
        .await;

        let outcome = f.scanner.scan_once(utc(2024, 1, 1, 9, 31, 0)).await.unwrap();
        assert_eq!(outcome.processed, 0);
    }

    #[tokio::test]
    async fn test_scan_skips_disabled_user() {
        let f = fixture(MockPushGateway::new());
        seed(
            &f,
            serde_json::json!({
                "id": "u-1",
                "notification_preferences": {
                    "is_enabled": false, "hour": 9, "minute": 30, "timezone_offset": 0.0
                },
                "next_notification_time": "2024-01-01T09:30:00.000Z",
                "push_token": "tok-1"
            }),
        )
        .await;

        let outcome = f.scanner.scan_once(utc(2024, 1, 1, 9, 31, 0)).await.unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.sent, 0);
    }

    #[tokio::test]
    async fn test_scan_skips_tokenless_user() {
        let f = fixture(MockPushGateway::new());
        seed(&f, due_user("u-1", None)).await;
        let record = NotificationRecord::scheduled(
            "u-1",
            utc(2024, 1, 1, 9, 30, 0),
            content(),
            false,
            utc(2024, 1, 1, 0, 0, 0),
        );
        f.notifications.create(&record).await.unwrap();

        let outcome = f.scanner.scan_once(utc(2024, 1, 1, 9, 31, 0)).await.unwrap();
        assert_eq!(outcome.skipped, 1);

        let untouched = f.notifications.require(&record.id).await.unwrap();
        assert_eq!(untouched.status, NotificationStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_duplicate_guard_suppresses_second_send() {
        let f = fixture(MockPushGateway::new());
        seed(&f, due_user("u-1", Some("tok-1"))).await;
        let now = utc(2024, 1, 1, 9, 31, 0);

        let deliverable = NotificationRecord::scheduled(
            "u-1",
            utc(2024, 1, 1, 9, 30, 0),
            content(),
            false,
            utc(2024, 1, 1, 0, 0, 0),
        );
        f.notifications.create(&deliverable).await.unwrap();

        // A second record created five minutes ago, already sent.
        let recent = NotificationRecord::scheduled(
            "u-1",
            utc(2024, 1, 1, 9, 26, 0),
            content(),
            false,
            utc(2024, 1, 1, 9, 26, 0),
        );
        f.notifications.create(&recent).await.unwrap();
        f.notifications
            .transition(
                &recent.id,
                Transition::Sent {
                    message_id: "fcm-0".to_string(),
                    sent_at: utc(2024, 1, 1, 9, 26, 5),
                },
            )
            .await
            .unwrap();

        let outcome = f.scanner.scan_once(now).await.unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.sent, 0);

        let untouched = f.notifications.require(&deliverable.id).await.unwrap();
        assert_eq!(untouched.status, NotificationStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_scan_recreates_missing_record() {
        let mut gateway = MockPushGateway::new();
        gateway
            .expect_send()
            .times(1)
            .returning(|_, _| Ok("fcm-5".to_string()));
        let f = fixture(gateway);
        seed(&f, due_user("u-1", Some("tok-1"))).await;

        let outcome = f.scanner.scan_once(utc(2024, 1, 1, 9, 31, 0)).await.unwrap();
        assert_eq!(outcome.sent, 1);

        let all = f.notifications.for_user("u-1", None, 10).await.unwrap();
        let sent: Vec<_> = all
            .iter()
            .filter(|r| r.status == NotificationStatus::Sent)
            .collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].scheduled_for, utc(2024, 1, 1, 9, 30, 0));

        // Recurring users get re-armed for tomorrow after the send.
        let scheduled = f.notifications.scheduled_for_user("u-1").await.unwrap();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].scheduled_for, utc(2024, 1, 2, 9, 30, 0));
    }

    #[tokio::test]
    async fn test_scan_isolates_per_user_failures() {
        let mut gateway = MockPushGateway::new();
        gateway
            .expect_send()
            .withf(|token, _| token == "tok-a")
            .times(1)
            .returning(|_, _| {
                Err(GatewayError::Transient {
                    message: "upstream returned 503".to_string(),
                })
            });
        gateway
            .expect_send()
            .withf(|token, _| token == "tok-b")
            .times(1)
            .returning(|_, _| Ok("fcm-b".to_string()));
        let f = fixture(gateway);
        seed(&f, due_user("u-a", Some("tok-a"))).await;
        seed(&f, due_user("u-b", Some("tok-b"))).await;

        let outcome = f.scanner.scan_once(utc(2024, 1, 1, 9, 31, 0)).await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.sent, 1);
        assert_eq!(outcome.errors, 1);
    }

    #[tokio::test]
    async fn test_invalid_token_user_is_skipped_on_next_scan() {
        let mut gateway = MockPushGateway::new();
        gateway
            .expect_send()
            .times(1)
            .returning(|_, _| Err(GatewayError::TokenInvalid));
        let f = fixture(gateway);
        seed(&f, due_user("u-1", Some("tok-dead"))).await;
        let record = NotificationRecord::scheduled(
            "u-1",
            utc(2024, 1, 1, 9, 30, 0),
            content(),
            false,
            utc(2024, 1, 1, 0, 0, 0),
        );
        f.notifications.create(&record).await.unwrap();

        let first = f.scanner.scan_once(utc(2024, 1, 1, 9, 31, 0)).await.unwrap();
        assert_eq!(first.errors, 1);

        let user = f.users.require("u-1").await.unwrap();
        assert!(user.push_token.is_none());
        assert_eq!(
            f.notifications.require(&record.id).await.unwrap().status,
            NotificationStatus::Failed
        );

        // The schedule did not advance, so the user is still in the window
        // and now lacks a token.
        let second = f.scanner.scan_once(utc(2024, 1, 1, 9, 36, 0)).await.unwrap();
        assert_eq!(second.processed, 1);
        assert_eq!(second.skipped, 1);
    }
}
