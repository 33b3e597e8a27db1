//! Shared types for the Kinesia backend services

pub mod time;
pub mod types;

// Export all types from the types module
pub use types::*;
