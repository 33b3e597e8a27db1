//! HTTP surface
//!
//! Route table plus endpoint handlers. Handlers stay thin: deserialize,
//! delegate to the [`ReminderManager`], and let [`ReminderError`]'s
//! `IntoResponse` impl shape failures into the structured error envelope.
//!
//! [`ReminderError`]: crate::error::ReminderError

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use kinesia_shared::time::format_timestamp;
use kinesia_shared::{
    CancelNotificationsRequest, CancelNotificationsResponse, NotificationRecord,
    NotificationStatus, RegisterPushTokenRequest, ScanOutcome, ScheduleNotificationRequest,
    ScheduleNotificationResponse, UpdateInformationRequest, UpdateInformationResponse,
};

use crate::error::Result;
use crate::manager::ReminderManager;

/// Build the service router with the shared middleware stack.
pub fn create_routes(manager: Arc<ReminderManager>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            manager.config().server.timeout_seconds,
        )))
        .into_inner();

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(export_metrics))
        .route("/api/v1/update_information", post(update_information))
        .route("/api/v1/schedule_notification", post(schedule_notification))
        .route("/api/v1/check_notifications", post(check_notifications))
        .route("/api/v1/cancel_notifications", post(cancel_notifications))
        .route("/api/v1/register_push_token", post(register_push_token))
        .route("/api/v1/notifications/:id", get(get_notification))
        .route(
            "/api/v1/users/:user_id/notifications",
            get(list_notifications),
        )
        .layer(middleware)
        .with_state(manager)
}

/// Health check endpoint. Reports 503 when the document store is down so
/// orchestrators stop routing to this instance.
async fn health_check(State(manager): State<Arc<ReminderManager>>) -> Response {
    let (status, store_state) = match manager.ping_store().await {
        Ok(()) => (StatusCode::OK, "reachable"),
        Err(e) => {
            error!("Health check failed to reach the store: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "unreachable")
        }
    };

    let config = manager.config();
    let body = Json(json!({
        "status": if status == StatusCode::OK { "healthy" } else { "unhealthy" },
        "service": "reminder-service",
        "version": env!("CARGO_PKG_VERSION"),
        "store": store_state,
        "gateway": if config.gateway.fcm_server_key.is_empty() { "unconfigured" } else { "configured" },
        "queue": if config.queue.enabled { "enabled" } else { "disabled" },
        "timestamp": format_timestamp(&Utc::now()),
    }));

    (status, body).into_response()
}

/// Prometheus exposition endpoint
async fn export_metrics(State(manager): State<Arc<ReminderManager>>) -> Result<Response> {
    let body = manager.export_metrics()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response())
}

async fn update_information(
    State(manager): State<Arc<ReminderManager>>,
    Json(request): Json<UpdateInformationRequest>,
) -> Result<Json<UpdateInformationResponse>> {
    manager.update_information(request).await.map(Json)
}

async fn schedule_notification(
    State(manager): State<Arc<ReminderManager>>,
    Json(request): Json<ScheduleNotificationRequest>,
) -> Result<Json<ScheduleNotificationResponse>> {
    manager.schedule_notification(request).await.map(Json)
}

async fn check_notifications(
    State(manager): State<Arc<ReminderManager>>,
) -> Result<Json<ScanOutcome>> {
    manager.check_notifications().await.map(Json)
}

async fn cancel_notifications(
    State(manager): State<Arc<ReminderManager>>,
    Json(request): Json<CancelNotificationsRequest>,
) -> Result<Json<CancelNotificationsResponse>> {
    manager.cancel_notifications(request).await.map(Json)
}

async fn register_push_token(
    State(manager): State<Arc<ReminderManager>>,
    Json(request): Json<RegisterPushTokenRequest>,
) -> Result<Json<Value>> {
    let user_id = request.user_id.clone();
    manager.register_push_token(request).await?;
    Ok(Json(json!({ "user_id": user_id, "registered": true })))
}

async fn get_notification(
    State(manager): State<Arc<ReminderManager>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationRecord>> {
    manager.get_notification(&id).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<NotificationStatus>,
    limit: Option<usize>,
}

async fn list_notifications(
    State(manager): State<Arc<ReminderManager>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<NotificationRecord>>> {
    manager
        .list_notifications(&user_id, query.status, query.limit)
        .await
        .map(Json)
}
