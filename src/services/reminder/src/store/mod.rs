//! Persistence layer
//!
//! A schemaless [`DocumentStore`] trait with mongo and in-memory backends,
//! plus typed wrappers for the two collections the service owns.

pub mod document;
pub mod memory;
pub mod mongo;
pub mod notifications;
pub mod users;

pub use document::{Document, DocumentStore, Filter, Query};
pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use notifications::{NotificationStore, Transition};
pub use users::UserStore;
