//! JSON protocol spoken over `/ws/chat`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ui::{UiEntry, UiState, Widget};

/// Message from client → server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Message {
        content: String,
    },
    ConfirmProfile {
        username: String,
        instagram_username: String,
        bio: String,
    },
    LoginProfile {
        username: String,
    },
    SelectAnswer {
        question_id: String,
        option_id: String,
    },
    ConfirmPurchase {
        symbol: String,
        price: Decimal,
        amount: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    Open,
    Done,
}

/// Message from server → client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every connection.
    Session { session_id: Uuid },
    /// Full UI history, sent once after `session`.
    UiSync { entries: Vec<UiEntry> },
    /// A new value on a message channel.
    UiUpdate {
        id: i64,
        state: StreamState,
        display: Widget,
    },
    Error { message: String },
}

impl ServerMessage {
    pub fn ui_update(id: i64, state: UiState) -> Self {
        let (state, display) = match state {
            UiState::Open(w) => (StreamState::Open, w),
            UiState::Done(w) => (StreamState::Done, w),
        };
        Self::UiUpdate { id, state, display }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
