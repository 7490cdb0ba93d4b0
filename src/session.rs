//! Per-conversation session state and the in-memory session registry.
//!
//! A session owns the conversation log, the UI history, the login phase and
//! any unanswered MCQ questions. Sessions are cached in memory and rebuilt
//! from the store on first access after a restart.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::conversation::ConversationState;
use crate::error::DatabaseError;
use crate::quiz::McqQuestion;
use crate::store::Database;
use crate::ui::{UiEntry, Widget};

/// Where the user is in the login flow. Determines which functions the
/// model may call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Anonymous,
    LoggedIn { username: String },
}

impl Phase {
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::LoggedIn { username } => Some(username),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::LoggedIn { username } => write!(f, "logged in as {username}"),
        }
    }
}

#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub phase: Phase,
    pub conversation: ConversationState,
    pub ui_history: Vec<UiEntry>,
    /// Unanswered questions keyed by question id. The answer stays here,
    /// server side.
    pub pending_questions: HashMap<String, McqQuestion>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            phase: Phase::Anonymous,
            conversation: ConversationState::new(),
            ui_history: Vec::new(),
            pending_questions: HashMap::new(),
        }
    }

    /// Rebuild from persisted state. A question widget that is still the
    /// latest UI entry is treated as unanswered.
    pub fn hydrate(
        id: Uuid,
        username: Option<String>,
        conversation: ConversationState,
        ui_history: Vec<UiEntry>,
    ) -> Self {
        let mut pending_questions = HashMap::new();
        if let Some(UiEntry {
            display:
                Widget::Mcq {
                    question_id,
                    topic,
                    question,
                    options,
                    answer,
                },
            ..
        }) = ui_history.last()
        {
            pending_questions.insert(
                question_id.clone(),
                McqQuestion {
                    topic: topic.clone(),
                    question: vec![question.clone()],
                    options: options.clone(),
                    answer: vec![answer.clone()],
                },
            );
        }

        Self {
            id,
            phase: match username {
                Some(username) => Phase::LoggedIn { username },
                None => Phase::Anonymous,
            },
            conversation,
            ui_history,
            pending_questions,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.phase.username()
    }
}

/// Shared handle to a session. A turn holds the lock for its whole run, so
/// turns within one session never interleave.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Registry of live sessions.
pub struct SessionManager {
    db: Arc<dyn Database>,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionManager {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a fresh session.
    pub async fn create(&self) -> Result<SessionHandle, DatabaseError> {
        let id = Uuid::new_v4();
        self.db.ensure_conversation(id).await?;
        let handle = Arc::new(Mutex::new(Session::new(id)));
        self.sessions.write().await.insert(id, handle.clone());
        info!(session_id = %id, "Session created");
        Ok(handle)
    }

    /// Look up a session, loading it from the store if it is not cached.
    pub async fn get(&self, id: Uuid) -> Result<Option<SessionHandle>, DatabaseError> {
        if let Some(handle) = self.sessions.read().await.get(&id) {
            return Ok(Some(handle.clone()));
        }

        let Some(record) = self.db.find_conversation(id).await? else {
            return Ok(None);
        };
        let messages = self.db.list_conversation_messages(id).await?;
        let ui_history = self.db.list_ui_entries(id).await?;
        debug!(
            session_id = %id,
            messages = messages.len(),
            ui_entries = ui_history.len(),
            "Hydrating session from store"
        );
        let session = Session::hydrate(
            id,
            record.username,
            ConversationState::from_committed(messages),
            ui_history,
        );

        // Another task may have hydrated the same id meanwhile; keep theirs.
        let mut sessions = self.sessions.write().await;
        let handle = sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone();
        Ok(Some(handle))
    }

    /// Resume `id` if it exists, otherwise start a new session.
    pub async fn open(&self, id: Option<Uuid>) -> Result<SessionHandle, DatabaseError> {
        if let Some(id) = id
            && let Some(handle) = self.get(id).await?
        {
            return Ok(handle);
        }
        self.create().await
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop a session from memory. Its stored state is kept.
    pub async fn evict(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::conversation::Message;
    use crate::quiz::McqOption;
    use crate::store::LibSqlBackend;

    async fn manager() -> (SessionManager, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (SessionManager::new(db.clone()), db)
    }

    fn mcq_entry(question_id: &str) -> UiEntry {
        UiEntry {
            id: 1,
            display: Widget::Mcq {
                question_id: question_id.into(),
                topic: "Suffrage".into(),
                question: "Which country first granted women the vote?".into(),
                options: vec![
                    McqOption { id: "A".into(), value: "France".into() },
                    McqOption { id: "B".into(), value: "New Zealand".into() },
                ],
                answer: "B".into(),
            },
        }
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Anonymous.to_string(), "anonymous");
        let phase = Phase::LoggedIn {
            username: "alice".into(),
        };
        assert_eq!(phase.to_string(), "logged in as alice");
        assert_eq!(phase.username(), Some("alice"));
    }

    #[test]
    fn hydrate_restores_trailing_question() {
        let session = Session::hydrate(
            Uuid::new_v4(),
            Some("alice".into()),
            ConversationState::new(),
            vec![mcq_entry("q1")],
        );
        assert_eq!(session.username(), Some("alice"));
        let q = &session.pending_questions["q1"];
        assert!(q.is_correct("B"));
        assert!(q.validate().is_ok());
    }

    #[test]
    fn hydrate_ignores_answered_question() {
        let session = Session::hydrate(
            Uuid::new_v4(),
            None,
            ConversationState::new(),
            vec![mcq_entry("q1"), UiEntry { id: 2, display: Widget::bot("Correct!") }],
        );
        assert!(session.pending_questions.is_empty());
        assert_eq!(session.phase, Phase::Anonymous);
    }

    #[tokio::test]
    async fn create_then_get_returns_same_session() {
        let (manager, _db) = manager().await;
        let handle = manager.create().await.unwrap();
        let id = handle.lock().await.id;

        let again = manager.get(id).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&handle, &again));
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let (manager, _db) = manager().await;
        assert!(manager.get(Uuid::new_v4()).await.unwrap().is_none());

        // open() falls back to a new session
        let handle = manager.open(Some(Uuid::new_v4())).await.unwrap();
        assert!(handle.lock().await.conversation.is_empty());
    }

    #[tokio::test]
    async fn evicted_session_is_hydrated_from_store() {
        let (manager, db) = manager().await;
        let handle = manager.create().await.unwrap();
        let id = handle.lock().await.id;

        db.add_conversation_message(id, 0, &Message::user("hello"))
            .await
            .unwrap();
        db.add_conversation_message(id, 1, &Message::assistant("Welcome!"))
            .await
            .unwrap();
        db.add_ui_entry(id, &UiEntry { id: 7, display: Widget::bot("Welcome!") })
            .await
            .unwrap();
        db.set_conversation_username(id, Some("alice")).await.unwrap();

        assert!(manager.evict(id).await);
        let restored = manager.open(Some(id)).await.unwrap();
        let session = restored.lock().await;
        assert_eq!(session.id, id);
        assert_eq!(session.conversation.len(), 2);
        assert_eq!(session.ui_history.len(), 1);
        assert_eq!(
            session.phase,
            Phase::LoggedIn {
                username: "alice".into()
            }
        );
    }
}
