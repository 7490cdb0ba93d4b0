//! `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::llm::ChatMessage;
use crate::quiz::Profile;
use crate::ui::UiEntry;

/// A stored conversation header.
#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub id: Uuid,
    /// Logged-in profile, if any.
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Backend-agnostic database trait covering profiles, conversations and
/// UI history.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Profiles ────────────────────────────────────────────────────

    /// Create a profile with score 0. Fails with `Duplicate` if the
    /// username is taken.
    async fn create_profile(
        &self,
        username: &str,
        instagram_username: &str,
        bio: &str,
    ) -> Result<Profile, DatabaseError>;

    async fn find_profile(&self, username: &str) -> Result<Option<Profile>, DatabaseError>;

    /// Atomically add `delta` to the stored score. Fails with `NotFound`
    /// if the username is absent.
    async fn increment_score(&self, username: &str, delta: i64) -> Result<(), DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    /// Ensure a conversation exists, creating it if needed.
    async fn ensure_conversation(&self, id: Uuid) -> Result<(), DatabaseError>;

    async fn find_conversation(&self, id: Uuid)
    -> Result<Option<ConversationRecord>, DatabaseError>;

    /// Record which profile the conversation is logged in as.
    async fn set_conversation_username(
        &self,
        id: Uuid,
        username: Option<&str>,
    ) -> Result<(), DatabaseError>;

    /// Append a committed message at position `seq`.
    async fn add_conversation_message(
        &self,
        id: Uuid,
        seq: i64,
        message: &ChatMessage,
    ) -> Result<(), DatabaseError>;

    /// All committed messages in conversational order.
    async fn list_conversation_messages(&self, id: Uuid)
    -> Result<Vec<ChatMessage>, DatabaseError>;

    // ── UI history ──────────────────────────────────────────────────

    async fn add_ui_entry(&self, id: Uuid, entry: &UiEntry) -> Result<(), DatabaseError>;

    /// Sealed UI entries in the order they were added.
    async fn list_ui_entries(&self, id: Uuid) -> Result<Vec<UiEntry>, DatabaseError>;
}
