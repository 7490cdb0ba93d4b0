//! Scripted provider and fixtures shared by the orchestrator tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ReplySlot, TurnOrchestrator};
use crate::config::OrchestratorConfig;
use crate::error::{DatabaseError, LlmError, TurnError};
use crate::llm::{ChatMessage, CompletionEvent, CompletionRequest, CompletionStream, LlmProvider};
use crate::quiz::Profile;
use crate::session::{Phase, Session, SessionHandle};
use crate::store::{ConversationRecord, Database, LibSqlBackend};
use crate::ui::{UiEntry, Widget};

pub(crate) type Script = Vec<Result<CompletionEvent, LlmError>>;

/// Replays one canned event sequence per request and records every request.
pub(crate) struct ScriptedLlm {
    scripts: StdMutex<VecDeque<Script>>,
    requests: StdMutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: StdMutex::new(scripts.into()),
            requests: StdMutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted-model"
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, LlmError> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(events) => Ok(Box::pin(futures::stream::iter(events))),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            }),
        }
    }
}

/// Cumulative text chunks, the last one final.
pub(crate) fn text_reply(chunks: &[&str]) -> Script {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            Ok(CompletionEvent::Text {
                content: chunk.to_string(),
                is_final: i + 1 == chunks.len(),
            })
        })
        .collect()
}

pub(crate) fn function_reply(name: &str, arguments: serde_json::Value) -> Script {
    vec![Ok(CompletionEvent::FunctionCall {
        name: name.to_string(),
        arguments,
    })]
}

pub(crate) fn mcq_args() -> serde_json::Value {
    serde_json::json!({
        "topic": "Women in science",
        "question": ["Who was the first woman to win a Nobel Prize?"],
        "options": [
            {"id": "A", "value": "Rosalind Franklin"},
            {"id": "B", "value": "Ada Lovelace"},
            {"id": "C", "value": "Marie Curie"},
            {"id": "D", "value": "Lise Meitner"}
        ],
        "answer": ["C"]
    })
}

/// Conversations work, every profile operation fails.
pub(crate) struct ProfileOutage {
    inner: LibSqlBackend,
}

impl ProfileOutage {
    pub async fn new() -> Self {
        Self {
            inner: LibSqlBackend::new_memory().await.unwrap(),
        }
    }

    fn fault() -> DatabaseError {
        DatabaseError::Query("disk I/O error".into())
    }
}

#[async_trait]
impl Database for ProfileOutage {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.inner.run_migrations().await
    }

    async fn create_profile(
        &self,
        _username: &str,
        _instagram_username: &str,
        _bio: &str,
    ) -> Result<Profile, DatabaseError> {
        Err(Self::fault())
    }

    async fn find_profile(&self, _username: &str) -> Result<Option<Profile>, DatabaseError> {
        Err(Self::fault())
    }

    async fn increment_score(&self, _username: &str, _delta: i64) -> Result<(), DatabaseError> {
        Err(Self::fault())
    }

    async fn ensure_conversation(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.inner.ensure_conversation(id).await
    }

    async fn find_conversation(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationRecord>, DatabaseError> {
        self.inner.find_conversation(id).await
    }

    async fn set_conversation_username(
        &self,
        id: Uuid,
        username: Option<&str>,
    ) -> Result<(), DatabaseError> {
        self.inner.set_conversation_username(id, username).await
    }

    async fn add_conversation_message(
        &self,
        id: Uuid,
        seq: i64,
        message: &ChatMessage,
    ) -> Result<(), DatabaseError> {
        self.inner.add_conversation_message(id, seq, message).await
    }

    async fn list_conversation_messages(
        &self,
        id: Uuid,
    ) -> Result<Vec<ChatMessage>, DatabaseError> {
        self.inner.list_conversation_messages(id).await
    }

    async fn add_ui_entry(&self, id: Uuid, entry: &UiEntry) -> Result<(), DatabaseError> {
        self.inner.add_ui_entry(id, entry).await
    }

    async fn list_ui_entries(&self, id: Uuid) -> Result<Vec<UiEntry>, DatabaseError> {
        self.inner.list_ui_entries(id).await
    }
}

pub(crate) fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        presentation_delay: Duration::ZERO,
        ..OrchestratorConfig::default()
    }
}

pub(crate) struct Harness {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub llm: Arc<ScriptedLlm>,
    pub db: Arc<dyn Database>,
    pub session: SessionHandle,
}

impl Harness {
    pub async fn new(scripts: Vec<Script>) -> Self {
        Self::with_config(scripts, None, test_config()).await
    }

    pub async fn logged_in(scripts: Vec<Script>, username: &str) -> Self {
        Self::with_config(scripts, Some(username), test_config()).await
    }

    pub async fn with_config(
        scripts: Vec<Script>,
        username: Option<&str>,
        config: OrchestratorConfig,
    ) -> Self {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        Self::with_db(scripts, username, config, db).await
    }

    /// Same as `logged_in` / `new`, over a store whose profile table is down.
    pub async fn profile_outage(scripts: Vec<Script>, username: Option<&str>) -> Self {
        let db: Arc<dyn Database> = Arc::new(ProfileOutage::new().await);
        Self::with_db(scripts, username, test_config(), db).await
    }

    pub async fn with_db(
        scripts: Vec<Script>,
        username: Option<&str>,
        config: OrchestratorConfig,
        db: Arc<dyn Database>,
    ) -> Self {
        let llm = Arc::new(ScriptedLlm::new(scripts));

        let id = Uuid::new_v4();
        db.ensure_conversation(id).await.unwrap();
        let mut session = Session::new(id);
        if let Some(username) = username {
            db.set_conversation_username(id, Some(username)).await.unwrap();
            session.phase = Phase::LoggedIn {
                username: username.to_string(),
            };
        }

        let orchestrator = Arc::new(TurnOrchestrator::new(llm.clone(), db.clone(), config));
        Self {
            orchestrator,
            llm,
            db,
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Run one turn and return the sealed reply.
    pub async fn turn(&self, content: &str) -> Result<Widget, TurnError> {
        let (slot, message) = ReplySlot::open(Widget::spinner());
        self.orchestrator.run_turn(&self.session, content, slot).await?;
        Ok(message.display.current().widget().clone())
    }

    pub async fn seed_profile(&self, username: &str, score: i64) {
        self.db
            .create_profile(username, "insta_handle", "a bio of at least twenty chars")
            .await
            .unwrap();
        if score != 0 {
            self.db.increment_score(username, score).await.unwrap();
        }
    }
}
