//! Actions initiated from widgets rather than typed messages.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use super::handlers::{seal, store_failure, verification_failed};
use super::{Outcome, ReplySlot, TurnOrchestrator};
use crate::conversation::Message;
use crate::error::TurnError;
use crate::quiz::profile::validate_username;
use crate::quiz::ProfileForm;
use crate::session::{Phase, Session, SessionHandle};
use crate::ui::{StreamableUi, UiEntry, UiMessage, Widget};

/// A confirmed purchase of `amount` shares of `symbol` at `price` each.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PurchaseOrder {
    pub symbol: String,
    pub price: Decimal,
    pub amount: u32,
}

impl PurchaseOrder {
    /// `price * amount`, or `None` if it does not fit a `Decimal`.
    pub fn total(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.amount))
    }

    /// Check the order and return its total.
    fn validate(&self) -> Result<Decimal, TurnError> {
        if self.symbol.trim().is_empty() {
            return Err(TurnError::InvalidPurchase("symbol is empty".into()));
        }
        if self.amount == 0 {
            return Err(TurnError::InvalidPurchase("amount must be positive".into()));
        }
        if self.price <= Decimal::ZERO {
            return Err(TurnError::InvalidPurchase("price must be positive".into()));
        }
        self.total()
            .ok_or_else(|| TurnError::InvalidPurchase("total is out of range".into()))
    }
}

/// Outcome of selecting an option.
#[derive(Debug)]
pub struct Answer {
    pub correct: bool,
    /// Retry notice shown when the point could not be recorded.
    pub notice: Option<UiMessage>,
}

/// The two channels a purchase drives.
pub struct PurchaseUi {
    pub purchasing: UiMessage,
    pub new_message: UiMessage,
}

impl TurnOrchestrator {
    pub async fn confirm_profile(
        &self,
        session: &SessionHandle,
        form: ProfileForm,
    ) -> Result<UiMessage, TurnError> {
        let mut s = session.lock().await;
        let (mut slot, message) = ReplySlot::open(Widget::spinner());
        let outcome = self.create_profile(&mut s, &form, &mut slot.ui).await?;
        self.settle_action(&mut s, slot.id, outcome).await?;
        Ok(message)
    }

    pub async fn login_profile(
        &self,
        session: &SessionHandle,
        username: &str,
    ) -> Result<UiMessage, TurnError> {
        let mut s = session.lock().await;
        let (mut slot, message) = ReplySlot::open(Widget::spinner());
        let outcome = self.log_in(&mut s, username.trim(), &mut slot.ui).await?;
        self.settle_action(&mut s, slot.id, outcome).await?;
        Ok(message)
    }

    /// Check an option against the held answer. A question can be answered
    /// once; a correct answer by a logged-in user scores one point.
    pub async fn answer_question(
        &self,
        session: &SessionHandle,
        question_id: &str,
        option_id: &str,
    ) -> Result<Answer, TurnError> {
        let mut s = session.lock().await;
        let question = s
            .pending_questions
            .get(question_id)
            .ok_or_else(|| TurnError::UnknownQuestion(question_id.to_string()))?;
        if !question.has_option(option_id) {
            return Err(TurnError::UnknownOption {
                question_id: question_id.to_string(),
                option_id: option_id.to_string(),
            });
        }
        let correct = question.is_correct(option_id);
        s.pending_questions.remove(question_id);

        info!(session_id = %s.id, question_id, option_id, correct, "Answer selected");
        let mut notice = None;
        if correct
            && let Some(username) = s.username().map(str::to_string)
            && let Err(e) = self.db.increment_score(&username, 1).await
        {
            let (mut slot, message) = ReplySlot::open(Widget::spinner());
            let outcome = store_failure(&mut slot.ui, "recording the score", &e)?;
            self.settle_action(&mut s, slot.id, outcome).await?;
            notice = Some(message);
        }
        Ok(Answer { correct, notice })
    }

    /// Score the answer, then let the model continue the quiz. A retry
    /// notice, if any, comes before the model's reply.
    pub async fn select_answer(
        self: &Arc<Self>,
        session: SessionHandle,
        question_id: &str,
        option_id: &str,
    ) -> Result<Vec<UiMessage>, TurnError> {
        let answer = self.answer_question(&session, question_id, option_id).await?;
        let mut messages: Vec<UiMessage> = answer.notice.into_iter().collect();
        messages.push(self.submit_user_message(
            session,
            format!("[User has selected MCQ answer = {option_id}]"),
        ));
        Ok(messages)
    }

    /// Start the purchase choreography in the background.
    pub fn confirm_purchase(
        self: &Arc<Self>,
        session: SessionHandle,
        order: PurchaseOrder,
    ) -> Result<PurchaseUi, TurnError> {
        let total = order.validate()?;
        let (purchasing, purchasing_message) = ReplySlot::open(Widget::spinner_with(format!(
            "Purchasing {} ${}...",
            order.amount, order.symbol
        )));
        let (system, system_message) = ReplySlot::open(Widget::Empty);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.run_purchase(&session, &order, total, purchasing, system).await {
                warn!(error = %e, "Purchase aborted");
            }
        });

        Ok(PurchaseUi {
            purchasing: purchasing_message,
            new_message: system_message,
        })
    }

    async fn run_purchase(
        &self,
        session: &SessionHandle,
        order: &PurchaseOrder,
        total: Decimal,
        mut purchasing: ReplySlot,
        mut system: ReplySlot,
    ) -> Result<(), TurnError> {
        let delay = self.config.presentation_delay;

        tokio::time::sleep(delay).await;
        purchasing.ui.update(Widget::spinner_with(format!(
            "Purchasing {} ${}... working on it...",
            order.amount, order.symbol
        )))?;
        tokio::time::sleep(delay).await;

        let receipt = purchasing.ui.done(Some(Widget::Purchase {
            symbol: order.symbol.clone(),
            amount: order.amount,
            price: order.price,
            total,
        }))?;
        let note = system.ui.done(Some(Widget::system(format!(
            "You have purchased {} shares of {} at ${}. Total cost = {}.",
            order.amount, order.symbol, order.price, total
        ))))?;

        let mut s = session.lock().await;
        info!(session_id = %s.id, symbol = %order.symbol, amount = order.amount, %total, "Purchase completed");
        let entries = vec![
            UiEntry {
                id: purchasing.id,
                display: receipt,
            },
            UiEntry {
                id: system.id,
                display: note,
            },
        ];
        let message = Message::system(format!(
            "[User has purchased {} shares of {} at {}. Total cost = {}]",
            order.amount, order.symbol, order.price, total
        ));
        self.settle(&mut s, entries, vec![message]).await
    }

    async fn settle_action(
        &self,
        s: &mut Session,
        id: i64,
        outcome: Outcome,
    ) -> Result<(), TurnError> {
        let entry = UiEntry {
            id,
            display: outcome.display,
        };
        self.settle(s, vec![entry], outcome.messages).await
    }

    async fn create_profile(
        &self,
        s: &mut Session,
        form: &ProfileForm,
        ui: &mut StreamableUi,
    ) -> Result<Outcome, TurnError> {
        let form = match form.validate() {
            Ok(form) => form,
            Err(errors) => {
                let fields = errors
                    .iter()
                    .map(|e| e.field.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return seal(
                    ui,
                    Widget::ProfileForm { errors },
                    Message::system(format!(
                        "[User submitted an invalid profile form: {fields}]"
                    )),
                );
            }
        };

        match self
            .db
            .create_profile(&form.username, &form.instagram_username, &form.bio)
            .await
        {
            Ok(profile) => {
                self.set_phase(
                    s,
                    Phase::LoggedIn {
                        username: profile.username.clone(),
                    },
                )
                .await;
                seal(
                    ui,
                    Widget::group(vec![
                        Widget::system(format!("Profile created. Welcome, {}!", profile.username)),
                        Widget::quiz_menu(),
                    ]),
                    Message::system(format!(
                        "[User has created a profile with username = {}, instagram username = {} and bio = {}]",
                        profile.username, profile.instagram_username, profile.bio
                    )),
                )
            }
            Err(e) => store_failure(ui, "creating the profile", &e),
        }
    }

    async fn log_in(
        &self,
        s: &mut Session,
        username: &str,
        ui: &mut StreamableUi,
    ) -> Result<Outcome, TurnError> {
        if let Err(error) = validate_username(username) {
            return seal(
                ui,
                Widget::LoginForm {
                    errors: vec![error],
                },
                Message::system("[User submitted an invalid login form: username]"),
            );
        }

        match self.db.find_profile(username).await {
            Ok(Some(profile)) => {
                self.set_phase(
                    s,
                    Phase::LoggedIn {
                        username: profile.username.clone(),
                    },
                )
                .await;
                seal(
                    ui,
                    Widget::group(vec![
                        Widget::system(format!("Welcome back, {}!", profile.username)),
                        Widget::quiz_menu(),
                    ]),
                    Message::system(format!(
                        "[User {} has logged in successfully]",
                        profile.username
                    )),
                )
            }
            Ok(None) => verification_failed(ui, username),
            Err(e) => store_failure(ui, "logging in", &e),
        }
    }
}
