//! Streamable UI: an incrementally updatable "next visible message".
//!
//! `StreamableUi` is the single writer and moves through `Open → Done`.
//! Any number of `UiHandle`s observe it through a `watch` channel.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::error::UiError;
use crate::ui::widget::Widget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "display", rename_all = "snake_case")]
pub enum UiState {
    Open(Widget),
    Done(Widget),
}

impl UiState {
    pub fn widget(&self) -> &Widget {
        match self {
            Self::Open(w) | Self::Done(w) => w,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Writer side. Dropping it without `done` leaves observers on the last
/// value.
#[derive(Debug)]
pub struct StreamableUi {
    tx: watch::Sender<UiState>,
}

impl StreamableUi {
    pub fn new(initial: Widget) -> Self {
        let (tx, _rx) = watch::channel(UiState::Open(initial));
        Self { tx }
    }

    pub fn handle(&self) -> UiHandle {
        UiHandle {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.tx.borrow().is_done()
    }

    pub fn value(&self) -> Widget {
        self.tx.borrow().widget().clone()
    }

    /// Replace the displayed value. Rejected once done.
    pub fn update(&mut self, widget: Widget) -> Result<(), UiError> {
        if self.is_done() {
            return Err(UiError::AlreadyDone);
        }
        self.tx.send_replace(UiState::Open(widget));
        Ok(())
    }

    /// Seal the channel, optionally with a final value. Returns the sealed
    /// value.
    pub fn done(&mut self, widget: Option<Widget>) -> Result<Widget, UiError> {
        if self.is_done() {
            return Err(UiError::AlreadyDone);
        }
        let sealed = widget.unwrap_or_else(|| self.value());
        self.tx.send_replace(UiState::Done(sealed.clone()));
        Ok(sealed)
    }
}

/// Reader side.
#[derive(Debug, Clone)]
pub struct UiHandle {
    rx: watch::Receiver<UiState>,
}

impl UiHandle {
    pub fn current(&self) -> UiState {
        self.rx.borrow().clone()
    }

    /// Wait for the next value. `None` once the writer is gone and every
    /// value has been seen.
    pub async fn changed(&mut self) -> Option<UiState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Every state from the current one on. Ends when the writer is dropped.
    pub fn into_stream(self) -> WatchStream<UiState> {
        WatchStream::new(self.rx)
    }

    /// Wait until sealed. If the writer is dropped first, returns the last
    /// value it published.
    pub async fn wait_done(&mut self) -> Widget {
        if let Ok(state) = self.rx.wait_for(UiState::is_done).await {
            return state.widget().clone();
        }
        self.rx.borrow().widget().clone()
    }
}

/// A message slot returned to the caller of a turn.
#[derive(Debug, Clone)]
pub struct UiMessage {
    /// Wall-clock millisecond id. Collisions are tolerated.
    pub id: i64,
    pub display: UiHandle,
}

impl UiMessage {
    pub fn new(display: UiHandle) -> Self {
        Self {
            id: next_message_id(),
            display,
        }
    }
}

pub fn next_message_id() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A sealed message as kept in the UI history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEntry {
    pub id: i64,
    pub display: Widget,
}
