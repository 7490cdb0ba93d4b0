//! Reactions to the functions the model can call.
//!
//! Each handler seals the reply channel and returns the function- or
//! system-role messages that record what was shown.

use tracing::{error, info};
use uuid::Uuid;

use super::{Outcome, TurnOrchestrator};
use crate::conversation::Message;
use crate::error::{DatabaseError, TurnError};
use crate::llm::FunctionCall;
use crate::llm::functions::{
    CREATE_OR_LOGIN_UI, SHOW_LOGIN_FORM, SHOW_MCQ_QUESTION, SHOW_PROFILE_FORM, SHOW_QUIZ_MENU,
    SHOW_SCORE_CARD,
};
use crate::quiz::McqQuestion;
use crate::session::{Phase, Session};
use crate::ui::{StreamableUi, Widget};

impl TurnOrchestrator {
    pub(super) async fn on_function(
        &self,
        s: &mut Session,
        call: FunctionCall,
        ui: &mut StreamableUi,
    ) -> Result<Outcome, TurnError> {
        match call {
            FunctionCall::ShowMcqQuestion(question) => self.show_question(s, question, ui).await,
            FunctionCall::ShowScoreCard => self.show_score_card(s, ui).await,
            FunctionCall::CreateOrLoginUi => seal(
                ui,
                Widget::create_or_login(),
                Message::function(
                    CREATE_OR_LOGIN_UI,
                    "[UI asking the user to create a profile or log in]",
                ),
            ),
            FunctionCall::ShowProfileForm => seal(
                ui,
                Widget::ProfileForm { errors: Vec::new() },
                Message::function(SHOW_PROFILE_FORM, "[UI showing the create profile form]"),
            ),
            FunctionCall::ShowLoginForm => seal(
                ui,
                Widget::LoginForm { errors: Vec::new() },
                Message::function(SHOW_LOGIN_FORM, "[UI showing the login form]"),
            ),
            FunctionCall::ShowQuizMenu => seal(
                ui,
                Widget::quiz_menu(),
                Message::function(SHOW_QUIZ_MENU, "[UI showing the quiz menu]"),
            ),
        }
    }

    /// Skeleton, pause, then the question. Only the latest question stays
    /// answerable, and selections are checked against the server's own copy.
    async fn show_question(
        &self,
        s: &mut Session,
        question: McqQuestion,
        ui: &mut StreamableUi,
    ) -> Result<Outcome, TurnError> {
        ui.update(Widget::McqSkeleton)?;
        tokio::time::sleep(self.config.presentation_delay).await;

        let question_id = Uuid::new_v4().to_string();
        let display = ui.done(Some(Widget::mcq(question_id.as_str(), &question)))?;
        let summary = question.summary();
        info!(session_id = %s.id, question_id = %question_id, topic = %question.topic, "Question shown");
        s.pending_questions.clear();
        s.pending_questions.insert(question_id, question);

        Ok(Outcome::new(
            display,
            Message::function(SHOW_MCQ_QUESTION, summary),
        ))
    }

    async fn show_score_card(
        &self,
        s: &mut Session,
        ui: &mut StreamableUi,
    ) -> Result<Outcome, TurnError> {
        let Some(username) = s.username().map(str::to_string) else {
            return seal(
                ui,
                Widget::create_or_login(),
                Message::function(SHOW_SCORE_CARD, "[No user is logged in]"),
            );
        };

        match self.db.find_profile(&username).await {
            Ok(Some(profile)) => seal(
                ui,
                Widget::score_card(&profile),
                Message::function(
                    SHOW_SCORE_CARD,
                    format!("[Score card for {}: score = {}]", profile.username, profile.score),
                ),
            ),
            Ok(None) => {
                self.set_phase(s, Phase::Anonymous).await;
                verification_failed(ui, &username)
            }
            Err(e) => store_failure(ui, "loading the score card", &e),
        }
    }
}

/// Seal `ui` with `widget` and record `message`.
pub(super) fn seal(
    ui: &mut StreamableUi,
    widget: Widget,
    message: Message,
) -> Result<Outcome, TurnError> {
    let display = ui.done(Some(widget))?;
    Ok(Outcome::new(display, message))
}

/// The profile behind `username` does not exist.
pub(super) fn verification_failed(
    ui: &mut StreamableUi,
    username: &str,
) -> Result<Outcome, TurnError> {
    seal(
        ui,
        Widget::group(vec![
            Widget::system(format!("No profile found for {username}.")),
            Widget::create_or_login(),
        ]),
        Message::system(format!(
            "[User verification failed for username = {username}]"
        )),
    )
}

/// Store faults surface as a retryable error and a system note; the turn
/// itself still commits.
pub(super) fn store_failure(
    ui: &mut StreamableUi,
    action: &str,
    err: &DatabaseError,
) -> Result<Outcome, TurnError> {
    error!(error = %err, action, "Store operation failed");
    seal(
        ui,
        Widget::try_again(format!(
            "Something went wrong while {action}. Please try again."
        )),
        Message::system(format!("[Store error while {action}; the user was asked to retry]")),
    )
}
