//! Turn orchestrator — drives one user turn from input to a sealed UI.
//!
//! A turn appends the user message to the working conversation, streams a
//! completion, reacts to the single terminal event and then settles: the
//! conversation is committed and the sealed widgets are added to the UI
//! history. Any fault before settling aborts the turn with nothing
//! committed.
//!
//! - `handlers`: reactions to each function the model can call
//! - `actions`: UI-initiated actions (profile, login, answers, purchases)

mod actions;
mod handlers;
#[cfg(test)]
pub(crate) mod test_support;

pub use actions::{Answer, PurchaseOrder, PurchaseUi};

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::conversation::Message;
use crate::error::{DispatchError, TurnError};
use crate::llm::{CompletionDispatcher, DispatchEvent, DispatchRequest, LlmProvider};
use crate::session::{Phase, Session, SessionHandle};
use crate::store::Database;
use crate::ui::{StreamableUi, UiEntry, UiMessage, Widget, next_message_id};

/// The writer half of a message plus the id the client knows it by.
pub struct ReplySlot {
    pub id: i64,
    pub ui: StreamableUi,
}

impl ReplySlot {
    pub fn open(initial: Widget) -> (Self, UiMessage) {
        let ui = StreamableUi::new(initial);
        let message = UiMessage::new(ui.handle());
        (
            Self {
                id: message.id,
                ui,
            },
            message,
        )
    }
}

/// What a handler leaves behind once its channel is sealed.
pub(crate) struct Outcome {
    pub display: Widget,
    pub messages: Vec<Message>,
}

impl Outcome {
    fn new(display: Widget, message: Message) -> Self {
        Self {
            display,
            messages: vec![message],
        }
    }
}

pub struct TurnOrchestrator {
    dispatcher: CompletionDispatcher,
    db: Arc<dyn Database>,
    config: OrchestratorConfig,
}

impl TurnOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        db: Arc<dyn Database>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            dispatcher: CompletionDispatcher::new(llm),
            db,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a turn in the background and return its reply slot right away.
    pub fn submit_user_message(self: &Arc<Self>, session: SessionHandle, content: String) -> UiMessage {
        let (slot, message) = ReplySlot::open(Widget::spinner());
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_turn(&session, &content, slot).await {
                warn!(error = %e, "Turn aborted");
            }
        });
        message
    }

    /// Run one user turn to completion.
    pub async fn run_turn(
        &self,
        session: &SessionHandle,
        content: &str,
        mut slot: ReplySlot,
    ) -> Result<(), TurnError> {
        let mut s = session.lock().await;
        let user_entry = UiEntry {
            id: next_message_id(),
            display: Widget::user(content),
        };

        s.conversation.begin_turn();
        let mut working = s.conversation.get().to_vec();
        working.push(Message::user(content));
        s.conversation.update(working)?;

        let request = DispatchRequest {
            system_prompt: self.config.system_prompt.clone(),
            messages: s.conversation.provider_view(self.config.replay_answers),
            phase: s.phase.clone(),
            temperature: self.config.temperature,
            model: self.config.model.clone(),
        };
        debug!(session_id = %s.id, phase = %s.phase, "Starting turn");

        match self.drive(&mut s, request, &mut slot.ui).await {
            Ok(outcome) => {
                let entries = vec![
                    user_entry,
                    UiEntry {
                        id: slot.id,
                        display: outcome.display,
                    },
                ];
                self.settle(&mut s, entries, outcome.messages).await
            }
            Err(e) => {
                s.conversation.abort();
                if !slot.ui.is_done() {
                    let _ = slot.ui.done(Some(failure_widget(&e)));
                }
                Err(e)
            }
        }
    }

    /// Consume dispatch events until the terminal one has been handled.
    async fn drive(
        &self,
        s: &mut Session,
        request: DispatchRequest,
        ui: &mut StreamableUi,
    ) -> Result<Outcome, TurnError> {
        let mut dispatch = self.dispatcher.dispatch(request).await?;
        loop {
            let Some(event) = dispatch.next_event().await else {
                return Err(TurnError::NoTerminalEvent);
            };
            match event? {
                DispatchEvent::Text { content, is_final } => {
                    ui.update(Widget::bot(content.as_str()))?;
                    if is_final {
                        let display = ui.done(None)?;
                        return Ok(Outcome::new(display, Message::assistant(content)));
                    }
                }
                DispatchEvent::Function(call) => {
                    info!(session_id = %s.id, function = call.name(), "Handling function call");
                    return self.on_function(s, call, ui).await;
                }
            }
        }
    }

    /// Commit `messages` and record the sealed `entries`.
    async fn settle(
        &self,
        s: &mut Session,
        entries: Vec<UiEntry>,
        messages: Vec<Message>,
    ) -> Result<(), TurnError> {
        let appended = if s.conversation.is_open() {
            let mut next = s.conversation.get().to_vec();
            next.extend(messages);
            s.conversation.done(next)?
        } else {
            s.conversation.commit_append(messages)?
        };

        let start = s.conversation.len() - appended.len();
        for (offset, message) in appended.iter().enumerate() {
            if let Err(e) = self
                .db
                .add_conversation_message(s.id, (start + offset) as i64, message)
                .await
            {
                warn!(session_id = %s.id, error = %e, "Failed to persist message");
            }
        }

        for entry in entries {
            self.record_ui(s, entry).await;
        }
        Ok(())
    }

    async fn record_ui(&self, s: &mut Session, entry: UiEntry) {
        if entry.display == Widget::Empty {
            return;
        }
        if let Err(e) = self.db.add_ui_entry(s.id, &entry).await {
            warn!(session_id = %s.id, error = %e, "Failed to persist UI entry");
        }
        s.ui_history.push(entry);
    }

    async fn set_phase(&self, s: &mut Session, phase: Phase) {
        if let Err(e) = self
            .db
            .set_conversation_username(s.id, phase.username())
            .await
        {
            warn!(session_id = %s.id, error = %e, "Failed to persist login state");
        }
        info!(session_id = %s.id, phase = %phase, "Phase changed");
        s.phase = phase;
    }
}

/// Provider faults get a generic error bubble; invalid function calls
/// render nothing.
fn failure_widget(error: &TurnError) -> Widget {
    match error {
        TurnError::Provider(_)
        | TurnError::Dispatch(DispatchError::Provider(_))
        | TurnError::NoTerminalEvent => Widget::Error {
            message: "Something went wrong. Please try again.".to_string(),
            retry: true,
        },
        _ => Widget::Empty,
    }
}
