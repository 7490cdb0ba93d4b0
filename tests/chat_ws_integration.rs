//! Integration tests for the chat WebSocket + REST surface.
//!
//! Each test spins up an Axum server on a random port, connects via
//! tokio-tungstenite, and drives full turns against a stub provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use quizbot::config::OrchestratorConfig;
use quizbot::error::LlmError;
use quizbot::llm::{
    CompletionEvent, CompletionRequest, CompletionStream, LlmProvider, Role,
};
use quizbot::orchestrator::TurnOrchestrator;
use quizbot::session::SessionManager;
use quizbot::store::{Database, LibSqlBackend};
use quizbot::web::{self, AppState};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

type Ws = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Stub provider: asks a question when the user wants MCQs, greets
/// otherwise.
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, LlmError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let events = if last_user == "Ask me MCQs" {
            vec![Ok(CompletionEvent::FunctionCall {
                name: "show_mcq_question".into(),
                arguments: json!({
                    "topic": "Suffrage",
                    "question": ["Which country first granted women the vote nationally?"],
                    "options": [
                        {"id": "A", "value": "France"},
                        {"id": "B", "value": "New Zealand"},
                        {"id": "C", "value": "United States"},
                        {"id": "D", "value": "Japan"}
                    ],
                    "answer": ["B"]
                }),
            })]
        } else {
            vec![
                Ok(CompletionEvent::Text {
                    content: "Hello".into(),
                    is_final: false,
                }),
                Ok(CompletionEvent::Text {
                    content: "Hello! Ready to learn?".into(),
                    is_final: true,
                }),
            ]
        };
        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}

/// Start an Axum server on a random port, return (port, db).
async fn start_server() -> (u16, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let config = OrchestratorConfig {
        presentation_delay: Duration::from_millis(10),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(TurnOrchestrator::new(Arc::new(StubLlm), db.clone(), config));
    let app = web::router(AppState {
        orchestrator,
        sessions: Arc::new(SessionManager::new(db.clone())),
        db: db.clone(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, db)
}

/// Connect and consume the `session` + `ui_sync` handshake.
async fn connect(port: u16, session: Option<&str>) -> (Ws, String, Vec<Value>) {
    let url = match session {
        Some(id) => format!("ws://127.0.0.1:{port}/ws/chat?session={id}"),
        None => format!("ws://127.0.0.1:{port}/ws/chat"),
    };
    let (mut ws, _) = connect_async(url).await.expect("WS connect failed");

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "session");
    let session_id = hello["session_id"].as_str().unwrap().to_string();

    let sync = next_json(&mut ws).await;
    assert_eq!(sync["type"], "ui_sync");
    let entries = sync["entries"].as_array().unwrap().clone();

    (ws, session_id, entries)
}

/// Parse the next WS text frame into a serde_json::Value.
async fn next_json(ws: &mut Ws) -> Value {
    match ws.next().await.unwrap().unwrap() {
        Message::Text(txt) => serde_json::from_str(&txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Skip open states until a message is sealed; return that frame.
async fn next_done(ws: &mut Ws) -> Value {
    loop {
        let json = next_json(ws).await;
        assert_eq!(json["type"], "ui_update", "unexpected frame {json}");
        if json["state"] == "done" {
            return json;
        }
    }
}

#[tokio::test]
async fn new_session_starts_empty() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let (_ws, session_id, entries) = connect(port, None).await;

        assert!(entries.is_empty());
        let id = session_id.parse().unwrap();
        assert!(db.find_conversation(id).await.unwrap().is_some());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn text_turn_streams_to_done() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let (mut ws, session_id, _) = connect(port, None).await;

        send_json(&mut ws, json!({"type": "message", "content": "hi"})).await;
        let done = next_done(&mut ws).await;
        assert_eq!(done["display"]["type"], "bot_message");
        assert_eq!(done["display"]["text"], "Hello! Ready to learn?");

        let messages = db
            .list_conversation_messages(session_id.parse().unwrap())
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Hello! Ready to learn?");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn quiz_flow_scores_correct_answer() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let (mut ws, _, _) = connect(port, None).await;

        send_json(
            &mut ws,
            json!({
                "type": "confirm_profile",
                "username": "alice",
                "instagram_username": "@alice_w",
                "bio": "curious about history and science"
            }),
        )
        .await;
        let created = next_done(&mut ws).await;
        assert_eq!(created["display"]["type"], "group");
        assert_eq!(created["display"]["children"][1]["type"], "quiz_menu");

        send_json(&mut ws, json!({"type": "message", "content": "Ask me MCQs"})).await;
        let question = next_done(&mut ws).await;
        assert_eq!(question["display"]["type"], "mcq");
        assert_eq!(question["display"]["answer"], "B");
        let question_id = question["display"]["question_id"].as_str().unwrap().to_string();

        send_json(
            &mut ws,
            json!({"type": "select_answer", "question_id": question_id, "option_id": "B"}),
        )
        .await;
        let follow_up = next_done(&mut ws).await;
        assert_eq!(follow_up["display"]["type"], "bot_message");

        let profile = db.find_profile("alice").await.unwrap().unwrap();
        assert_eq!(profile.score, 1);

        // Answering again is rejected.
        send_json(
            &mut ws,
            json!({"type": "select_answer", "question_id": question_id, "option_id": "B"}),
        )
        .await;
        let err = next_json(&mut ws).await;
        assert_eq!(err["type"], "error");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn reconnect_replays_ui_history() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let (mut ws, session_id, _) = connect(port, None).await;

        send_json(&mut ws, json!({"type": "message", "content": "hi"})).await;
        next_done(&mut ws).await;
        ws.close(None).await.unwrap();

        let (_ws, resumed_id, entries) = connect(port, Some(&session_id)).await;
        assert_eq!(resumed_id, session_id);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["display"]["type"], "user_message");
        assert_eq!(entries[1]["display"]["text"], "Hello! Ready to learn?");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn login_with_unknown_user() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let (mut ws, _, _) = connect(port, None).await;

        send_json(&mut ws, json!({"type": "login_profile", "username": "ghost"})).await;
        let done = next_done(&mut ws).await;
        assert_eq!(done["display"]["children"][1]["type"], "create_or_login");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn purchase_seals_two_messages() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let (mut ws, _, _) = connect(port, None).await;

        send_json(
            &mut ws,
            json!({"type": "confirm_purchase", "symbol": "DOGE", "price": "0.25", "amount": 4}),
        )
        .await;

        let mut sealed = Vec::new();
        while sealed.len() < 2 {
            let json = next_json(&mut ws).await;
            if json["state"] == "done" {
                sealed.push(json["display"].clone());
            }
        }
        assert!(sealed.iter().any(|d| d["type"] == "purchase" && d["total"] == "1.00"));
        assert!(sealed.iter().any(|d| d["type"] == "system_message"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_json_gets_error_frame() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let (mut ws, _, _) = connect(port, None).await;

        ws.send(Message::Text("not json".into())).await.unwrap();
        let err = next_json(&mut ws).await;
        assert_eq!(err["type"], "error");
    })
    .await
    .expect("test timed out");
}
