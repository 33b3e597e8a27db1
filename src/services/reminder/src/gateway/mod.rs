//! Push gateway boundary
//!
//! The dispatcher only cares about four failure classes: a permanently
//! invalid token (durable state change), rejected credentials, a retryable
//! gateway-side condition, and a timeout. Concrete providers map their wire
//! responses onto these.

use async_trait::async_trait;
use thiserror::Error;

use crate::payload::PushPayload;

pub mod fcm;

pub use fcm::FcmGateway;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The device token is permanently invalid; the stored token must be
    /// cleared rather than retried.
    #[error("push token is no longer valid")]
    TokenInvalid,

    /// The gateway rejected our credentials.
    #[error("gateway authentication failed: {message}")]
    Auth { message: String },

    /// A gateway-side condition that may clear on a later attempt.
    #[error("gateway temporarily unavailable: {message}")]
    Transient { message: String },

    /// The request did not complete within the configured timeout.
    #[error("gateway request timed out")]
    Timeout,
}

/// Boundary to the push delivery provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Deliver a payload to a device token, returning the gateway-assigned
    /// message id.
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<String, GatewayError>;
}
