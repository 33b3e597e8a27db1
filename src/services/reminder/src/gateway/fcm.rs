//! FCM push gateway
//!
//! Speaks the legacy FCM HTTP API: a JSON POST authorized with a server key,
//! answered by a per-token result list. Token-level errors arrive with HTTP
//! 200 and are mapped from the result entry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::config::GatewayConfig;
use crate::error::ReminderError;
use crate::gateway::{GatewayError, PushGateway};
use crate::payload::PushPayload;

pub struct FcmGateway {
    client: Client,
    endpoint: String,
    server_key: String,
}

impl FcmGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, ReminderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ReminderError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.fcm_endpoint.clone(),
            server_key: config.fcm_server_key.clone(),
        })
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<String, GatewayError> {
        let body = payload.to_fcm_body(token);
        debug!("Sending FCM push \"{}\"", payload.title());

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transient {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(GatewayError::Auth {
                message: format!("FCM rejected credentials with {}", status),
            });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::Transient {
                message: format!("FCM returned {}", status),
            });
        }
        if !status.is_success() {
            return Err(GatewayError::Transient {
                message: format!("unexpected FCM status {}", status),
            });
        }

        let parsed: Value = response.json().await.map_err(|e| GatewayError::Transient {
            message: format!("unreadable FCM response: {}", e),
        })?;
        interpret_response(&parsed)
    }
}

/// Map the first result entry of a legacy FCM response to an outcome.
fn interpret_response(response: &Value) -> Result<String, GatewayError> {
    let result = response.get("results").and_then(|r| r.get(0));

    if let Some(message_id) = result
        .and_then(|r| r.get("message_id"))
        .and_then(|v| v.as_str())
    {
        return Ok(message_id.to_string());
    }

    let error = result
        .and_then(|r| r.get("error"))
        .and_then(|v| v.as_str())
        .unwrap_or("missing result entry");

    match error {
        "NotRegistered" | "InvalidRegistration" | "MissingRegistration" => {
            Err(GatewayError::TokenInvalid)
        }
        "MismatchSenderId" => Err(GatewayError::Auth {
            message: error.to_string(),
        }),
        other => Err(GatewayError::Transient {
            message: format!("FCM error: {}", other),
        }),
    }
}
