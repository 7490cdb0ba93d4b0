//! Persistence layer — libSQL-backed storage for profiles, conversations
//! and UI history.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ConversationRecord, Database};
