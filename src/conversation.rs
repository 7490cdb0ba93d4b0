//! Conversation state: the ordered message log replayed to the provider.
//!
//! Each turn moves through `Idle → Open → Committed`. While open, `update`
//! replaces a working copy; `done` commits it exactly once. `abort` drops the
//! working copy and leaves the committed log untouched.

use tracing::warn;

use crate::error::ConversationError;
use crate::llm::functions::SHOW_MCQ_QUESTION;
use crate::llm::provider::Role;
use crate::quiz::McqQuestion;

pub use crate::llm::provider::ChatMessage as Message;

#[derive(Debug, Clone, Default)]
enum TurnState {
    #[default]
    Idle,
    Open(Vec<Message>),
    Committed,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    committed: Vec<Message>,
    turn: TurnState,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted log.
    pub fn from_committed(messages: Vec<Message>) -> Self {
        Self {
            committed: messages,
            turn: TurnState::Idle,
        }
    }

    /// Start a new turn with a working copy of the committed log.
    pub fn begin_turn(&mut self) {
        if matches!(self.turn, TurnState::Open(_)) {
            warn!("Discarding uncommitted working copy of previous turn");
        }
        self.turn = TurnState::Open(self.committed.clone());
    }

    /// Current sequence: the working copy while a turn is open, otherwise
    /// the committed log.
    pub fn get(&self) -> &[Message] {
        match &self.turn {
            TurnState::Open(working) => working,
            _ => &self.committed,
        }
    }

    /// The latest committed log.
    pub fn committed(&self) -> &[Message] {
        &self.committed
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.turn, TurnState::Open(_))
    }

    /// Replace the working copy.
    pub fn update(&mut self, messages: Vec<Message>) -> Result<(), ConversationError> {
        match &mut self.turn {
            TurnState::Open(working) => {
                *working = messages;
                Ok(())
            }
            TurnState::Committed => Err(ConversationError::AlreadyCommitted),
            TurnState::Idle => Err(ConversationError::NoOpenTurn),
        }
    }

    /// Commit `messages` as the new log. Returns the newly appended messages.
    pub fn done(&mut self, messages: Vec<Message>) -> Result<Vec<Message>, ConversationError> {
        match self.turn {
            TurnState::Open(_) => {}
            TurnState::Committed => return Err(ConversationError::AlreadyCommitted),
            TurnState::Idle => return Err(ConversationError::NoOpenTurn),
        }
        if messages.len() < self.committed.len()
            || messages[..self.committed.len()] != self.committed[..]
        {
            return Err(ConversationError::NotAppendOnly);
        }

        let appended = messages[self.committed.len()..].to_vec();
        self.committed = messages;
        self.turn = TurnState::Committed;
        Ok(appended)
    }

    /// Drop the working copy without committing.
    pub fn abort(&mut self) {
        self.turn = TurnState::Idle;
    }

    /// Open a turn, append `messages` and commit in one step.
    pub fn commit_append(
        &mut self,
        messages: impl IntoIterator<Item = Message>,
    ) -> Result<Vec<Message>, ConversationError> {
        self.begin_turn();
        let mut next = self.get().to_vec();
        next.extend(messages);
        self.done(next)
    }

    /// Messages as sent to the provider. With `replay_answers` off, the
    /// correct option is removed from MCQ function summaries.
    pub fn provider_view(&self, replay_answers: bool) -> Vec<Message> {
        self.get()
            .iter()
            .map(|m| {
                if !replay_answers
                    && m.role == Role::Function
                    && m.name.as_deref() == Some(SHOW_MCQ_QUESTION)
                {
                    Message::function(SHOW_MCQ_QUESTION, McqQuestion::redact_summary(&m.content))
                } else {
                    m.clone()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_is_visible_but_not_committed() {
        let mut conv = ConversationState::new();
        conv.begin_turn();
        conv.update(vec![Message::user("hello")]).unwrap();

        assert_eq!(conv.get().len(), 1);
        assert!(conv.committed().is_empty());

        conv.abort();
        assert!(conv.get().is_empty());
    }

    #[test]
    fn completed_turn_adds_exactly_two_messages() {
        let mut conv = ConversationState::new();
        for i in 0..3 {
            let before = conv.len();
            conv.begin_turn();
            let mut seq = conv.get().to_vec();
            seq.push(Message::user(format!("q{i}")));
            conv.update(seq.clone()).unwrap();
            seq.push(Message::assistant(format!("a{i}")));
            let appended = conv.done(seq).unwrap();

            assert_eq!(appended.len(), 2);
            assert_eq!(conv.len(), before + 2);
        }
        assert_eq!(conv.committed()[4], Message::user("q2"));
    }

    #[test]
    fn second_done_is_rejected() {
        let mut conv = ConversationState::new();
        conv.begin_turn();
        conv.done(vec![Message::user("x")]).unwrap();

        assert_eq!(
            conv.done(vec![Message::user("x"), Message::user("y")]),
            Err(ConversationError::AlreadyCommitted)
        );
        assert_eq!(
            conv.update(vec![]),
            Err(ConversationError::AlreadyCommitted)
        );
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn done_without_turn() {
        let mut conv = ConversationState::new();
        assert_eq!(conv.done(vec![]), Err(ConversationError::NoOpenTurn));
        assert_eq!(conv.update(vec![]), Err(ConversationError::NoOpenTurn));
    }

    #[test]
    fn history_cannot_be_rewritten() {
        let mut conv = ConversationState::from_committed(vec![Message::user("a")]);
        conv.begin_turn();
        assert_eq!(
            conv.done(vec![Message::user("b")]),
            Err(ConversationError::NotAppendOnly)
        );
    }

    #[test]
    fn commit_append_helper() {
        let mut conv = ConversationState::from_committed(vec![Message::user("a")]);
        let appended = conv
            .commit_append([Message::system("[User alice has logged in successfully]")])
            .unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(conv.len(), 2);
        assert!(!conv.is_open());
    }

    #[test]
    fn provider_view_can_hide_answers() {
        let summary = "[UI for topic T for the question Q with MCQ options A: x, B: y and the answer, B]";
        let conv = ConversationState::from_committed(vec![
            Message::user("Ask me MCQs"),
            Message::function(SHOW_MCQ_QUESTION, summary),
        ]);

        assert_eq!(conv.provider_view(true)[1].content, summary);
        let hidden = &conv.provider_view(false)[1];
        assert!(!hidden.content.contains("the answer"));
        assert_eq!(hidden.name.as_deref(), Some(SHOW_MCQ_QUESTION));
    }
}
