//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::llm::{ChatMessage, Role};
use crate::quiz::Profile;
use crate::store::migrations;
use crate::store::traits::{ConversationRecord, Database};
use crate::ui::UiEntry;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

const PROFILE_COLUMNS: &str = "username, instagram_username, bio, score, created_at, updated_at";

fn row_to_profile(row: &libsql::Row) -> Result<Profile, libsql::Error> {
    let created_str: String = row.get(4)?;
    let updated_str: String = row.get(5)?;
    Ok(Profile {
        username: row.get(0)?,
        instagram_username: row.get(1)?,
        bio: row.get(2)?,
        score: row.get(3)?,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_message(row: &libsql::Row) -> Result<ChatMessage, DatabaseError> {
    let role_str: String = row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?;
    let content: String = row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?;
    let name: Option<String> = row.get(2).ok();
    let role: Role = role_str.parse().map_err(DatabaseError::Serialization)?;
    Ok(ChatMessage {
        role,
        content,
        name,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn create_profile(
        &self,
        username: &str,
        instagram_username: &str,
        bio: &str,
    ) -> Result<Profile, DatabaseError> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        let inserted = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO profiles
                 (username, instagram_username, bio, score, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                params![username, instagram_username, bio, now_str],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_profile: {e}")))?;

        if inserted == 0 {
            return Err(DatabaseError::Duplicate {
                entity: "profile".into(),
                id: username.to_string(),
            });
        }

        debug!(username, "Profile created");
        Ok(Profile {
            username: username.to_string(),
            instagram_username: instagram_username.to_string(),
            bio: bio.to_string(),
            score: 0,
            created_at: now,
            updated_at: now,
        })
    }

    async fn find_profile(&self, username: &str) -> Result<Option<Profile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE username = ?1"),
                params![username],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_profile: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_profile: {e}")))?
        {
            Some(row) => row_to_profile(&row)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("find_profile row: {e}"))),
            None => Ok(None),
        }
    }

    async fn increment_score(&self, username: &str, delta: i64) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE profiles SET score = score + ?2, updated_at = ?3 WHERE username = ?1",
                params![username, delta, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_score: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "profile".into(),
                id: username.to_string(),
            });
        }
        Ok(())
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn ensure_conversation(&self, id: Uuid) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO conversations (id, created_at, last_activity)
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT (id) DO UPDATE SET last_activity = ?2",
                params![id.to_string(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ensure_conversation: {e}")))?;
        Ok(())
    }

    async fn find_conversation(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT username, created_at, last_activity FROM conversations WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_conversation: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("find_conversation: {e}")))?
        else {
            return Ok(None);
        };

        let username: Option<String> = row.get(0).ok();
        let created_str: String = row.get(1).unwrap_or_default();
        let activity_str: String = row.get(2).unwrap_or_default();
        Ok(Some(ConversationRecord {
            id,
            username,
            created_at: parse_datetime(&created_str),
            last_activity: parse_datetime(&activity_str),
        }))
    }

    async fn set_conversation_username(
        &self,
        id: Uuid,
        username: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE conversations SET username = ?2, last_activity = ?3 WHERE id = ?1",
                params![id.to_string(), opt_text(username), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_conversation_username: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "conversation".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn add_conversation_message(
        &self,
        id: Uuid,
        seq: i64,
        message: &ChatMessage,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO conversation_messages
             (id, conversation_id, seq, role, content, name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                id.to_string(),
                seq,
                message.role.to_string(),
                message.content.as_str(),
                opt_text(message.name.as_deref()),
                now.as_str()
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("add_conversation_message: {e}")))?;

        // Touch last_activity
        let _ = conn
            .execute(
                "UPDATE conversations SET last_activity = ?2 WHERE id = ?1",
                params![id.to_string(), now],
            )
            .await;

        Ok(())
    }

    async fn list_conversation_messages(
        &self,
        id: Uuid,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT role, content, name FROM conversation_messages
                 WHERE conversation_id = ?1 ORDER BY seq ASC",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_conversation_messages: {e}")))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_conversation_messages: {e}")))?
        {
            messages.push(row_to_message(&row)?);
        }
        Ok(messages)
    }

    // ── UI history ──────────────────────────────────────────────────

    async fn add_ui_entry(&self, id: Uuid, entry: &UiEntry) -> Result<(), DatabaseError> {
        let display = serde_json::to_string(&entry.display)
            .map_err(|e| DatabaseError::Serialization(format!("ui entry: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO ui_history (conversation_id, entry_id, display, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), entry.id, display, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("add_ui_entry: {e}")))?;
        Ok(())
    }

    async fn list_ui_entries(&self, id: Uuid) -> Result<Vec<UiEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT entry_id, display FROM ui_history
                 WHERE conversation_id = ?1 ORDER BY rowid ASC",
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_ui_entries: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_ui_entries: {e}")))?
        {
            let entry_id: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::Query(format!("list_ui_entries row: {e}")))?;
            let display: String = row
                .get(1)
                .map_err(|e| DatabaseError::Query(format!("list_ui_entries row: {e}")))?;
            let display = serde_json::from_str(&display)
                .map_err(|e| DatabaseError::Serialization(format!("ui entry {entry_id}: {e}")))?;
            entries.push(UiEntry {
                id: entry_id,
                display,
            });
        }
        Ok(entries)
    }
}
