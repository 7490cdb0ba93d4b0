//! WebSocket chat: one socket per browser tab, bound to one session.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use super::protocol::{ClientMessage, ServerMessage};
use crate::orchestrator::PurchaseOrder;
use crate::quiz::ProfileForm;
use crate::session::SessionHandle;
use crate::ui::UiMessage;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    session: Option<String>,
}

pub async fn ws_chat_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ChatQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // An unparseable id starts a fresh session.
    let requested = query.session.and_then(|s| Uuid::parse_str(&s).ok());
    info!(session_id = ?requested, "Chat client connecting");
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, requested))
}

async fn handle_chat_socket(mut socket: WebSocket, state: AppState, requested: Option<Uuid>) {
    let session = match state.sessions.open(requested).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Failed to open session");
            let _ = send(&mut socket, &ServerMessage::error("Could not open a session")).await;
            return;
        }
    };

    let (session_id, entries) = {
        let s = session.lock().await;
        (s.id, s.ui_history.clone())
    };
    info!(session_id = %session_id, entries = entries.len(), "Chat client connected");

    if send(&mut socket, &ServerMessage::Session { session_id })
        .await
        .is_err()
        || send(&mut socket, &ServerMessage::UiSync { entries })
            .await
            .is_err()
    {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    // Forwarders and action tasks push here; the loop below owns the socket.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    loop {
        tokio::select! {
            Some(msg) = out_rx.recv() => {
                if send(&mut socket, &msg).await.is_err() {
                    debug!("Chat client disconnected during send");
                    break;
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                tokio::spawn(handle_client_message(
                                    state.clone(),
                                    session.clone(),
                                    msg,
                                    out_tx.clone(),
                                ));
                            }
                            Err(e) => {
                                debug!(error = %e, text = %text, "Invalid JSON from chat client");
                                let _ = out_tx.send(ServerMessage::error(format!("Invalid message: {e}")));
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session_id, "Chat client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Chat WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(session_id = %session_id, "Chat connection closed");
}

async fn handle_client_message(
    state: AppState,
    session: SessionHandle,
    msg: ClientMessage,
    out: mpsc::UnboundedSender<ServerMessage>,
) {
    let orchestrator = &state.orchestrator;
    let result = match msg {
        ClientMessage::Message { content } => {
            let content = content.trim().to_string();
            if content.is_empty() {
                return;
            }
            Ok(vec![orchestrator.submit_user_message(session, content)])
        }
        ClientMessage::ConfirmProfile {
            username,
            instagram_username,
            bio,
        } => {
            let form = ProfileForm {
                username,
                instagram_username,
                bio,
            };
            orchestrator
                .confirm_profile(&session, form)
                .await
                .map(|m| vec![m])
        }
        ClientMessage::LoginProfile { username } => orchestrator
            .login_profile(&session, &username)
            .await
            .map(|m| vec![m]),
        ClientMessage::SelectAnswer {
            question_id,
            option_id,
        } => orchestrator
            .select_answer(session, &question_id, &option_id)
            .await,
        ClientMessage::ConfirmPurchase {
            symbol,
            price,
            amount,
        } => orchestrator
            .confirm_purchase(
                session,
                PurchaseOrder {
                    symbol,
                    price,
                    amount,
                },
            )
            .map(|ui| vec![ui.purchasing, ui.new_message]),
    };

    match result {
        Ok(messages) => {
            for message in messages {
                forward(message, out.clone());
            }
        }
        Err(e) => {
            warn!(error = %e, "Chat action failed");
            let _ = out.send(ServerMessage::error(e.to_string()));
        }
    }
}

/// Relay every state of `message` until it is sealed.
fn forward(message: UiMessage, out: mpsc::UnboundedSender<ServerMessage>) {
    let id = message.id;
    let mut states = message.display.into_stream();
    tokio::spawn(async move {
        while let Some(state) = states.next().await {
            let done = state.is_done();
            if out.send(ServerMessage::ui_update(id, state)).is_err() || done {
                break;
            }
        }
    });
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize server message");
            Ok(())
        }
    }
}
