//! Error handling for the reminder service
//!
//! This module defines all error types that can occur in the reminder
//! service and provides utilities for error handling and conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Result type alias for reminder service operations
pub type Result<T> = std::result::Result<T, ReminderError>;

/// Main error type for the reminder service
#[derive(Error, Debug)]
pub enum ReminderError {
    /// Document store errors
    #[error("Store error: {message}")]
    Store { message: String },

    /// Push gateway errors
    #[error("Gateway error: {message}")]
    Gateway { message: String },

    /// Deferred task queue errors
    #[error("Queue error: {message}")]
    Queue { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Not found errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Internal service errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ReminderError {
    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ReminderError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ReminderError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            ReminderError::Queue { .. } => StatusCode::BAD_GATEWAY,
            ReminderError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ReminderError::Validation { .. } => StatusCode::BAD_REQUEST,
            ReminderError::NotFound { .. } => StatusCode::NOT_FOUND,
            ReminderError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ReminderError::Serialization { .. } => StatusCode::BAD_REQUEST,
            ReminderError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            ReminderError::Store { .. } => "STORE_ERROR",
            ReminderError::Gateway { .. } => "GATEWAY_ERROR",
            ReminderError::Queue { .. } => "QUEUE_ERROR",
            ReminderError::Config { .. } => "CONFIG_ERROR",
            ReminderError::Validation { .. } => "VALIDATION_ERROR",
            ReminderError::NotFound { .. } => "NOT_FOUND",
            ReminderError::Timeout { .. } => "TIMEOUT",
            ReminderError::Serialization { .. } => "SERIALIZATION_ERROR",
            ReminderError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ReminderError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
                "status": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

// Conversion implementations for external error types

impl From<mongodb::error::Error> for ReminderError {
    fn from(err: mongodb::error::Error) -> Self {
        ReminderError::Store {
            message: err.to_string(),
        }
    }
}

impl From<bson::ser::Error> for ReminderError {
    fn from(err: bson::ser::Error) -> Self {
        ReminderError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<bson::de::Error> for ReminderError {
    fn from(err: bson::de::Error) -> Self {
        ReminderError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ReminderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ReminderError::Timeout {
                operation: "HTTP request".to_string(),
            }
        } else {
            ReminderError::Gateway {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ReminderError {
    fn from(err: serde_json::Error) -> Self {
        ReminderError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for ReminderError {
    fn from(err: config::ConfigError) -> Self {
        ReminderError::Config {
            message: err.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for ReminderError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ReminderError::Timeout {
            operation: err.to_string(),
        }
    }
}

impl From<prometheus::Error> for ReminderError {
    fn from(err: prometheus::Error) -> Self {
        ReminderError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for ReminderError {
    fn from(err: validator::ValidationErrors) -> Self {
        let message = err
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let field_errors: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .unwrap_or(&"Invalid value".into())
                            .to_string()
                    })
                    .collect();
                format!("{}: {}", field, field_errors.join(", "))
            })
            .collect::<Vec<String>>()
            .join("; ");

        ReminderError::Validation {
            field: "multiple".to_string(),
            message,
        }
    }
}

impl From<GatewayError> for ReminderError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Timeout => ReminderError::Timeout {
                operation: "push delivery".to_string(),
            },
            other => ReminderError::Gateway {
                message: other.to_string(),
            },
        }
    }
}

// Utility functions for creating specific error types

impl ReminderError {
    /// Create a store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a gateway error
    pub fn gateway<S: Into<String>>(message: S) -> Self {
        Self::Gateway {
            message: message.into(),
        }
    }

    /// Create a queue error
    pub fn queue<S: Into<String>>(message: S) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
