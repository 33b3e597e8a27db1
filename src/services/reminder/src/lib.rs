//! # Kinesia Reminder Service
//!
//! Schedules and delivers the daily exercise reminders for the Kinesia rehab
//! platform:
//! - Timezone-aware recurrence: each patient's "HH:MM at offset" preference
//!   is resolved to a concrete UTC instant on every settings change
//! - Durable notification records with a small scheduled/sent/cancelled/
//!   failed state machine
//! - A periodic due-window scanner with duplicate suppression, plus an
//!   optional deferred task queue for precise triggers
//! - Push delivery through FCM with permanent-failure handling (invalid
//!   tokens are cleared, never retried)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use reminder_service::{create_routes, ReminderConfig, ReminderManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ReminderConfig::from_env()?;
//!     let manager = Arc::new(ReminderManager::new(config).await?);
//!     let app = create_routes(manager);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8090").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod cancellation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod manager;
pub mod metrics;
pub mod payload;
pub mod queue;
pub mod reactor;
pub mod scanner;
pub mod schedule;
pub mod store;

pub use config::ReminderConfig;
pub use error::{ReminderError, Result};
pub use handlers::create_routes;
pub use manager::ReminderManager;
