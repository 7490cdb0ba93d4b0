//! Displayable fragments handed to the client.
//!
//! The server never renders markup; a `Widget` is a typed description the
//! client turns into components.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::quiz::{FieldError, McqOption, McqQuestion, Profile};

/// A button that re-submits canned text as a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickAction {
    pub label: String,
    pub message: String,
}

impl QuickAction {
    fn new(label: &str, message: &str) -> Self {
        Self {
            label: label.to_string(),
            message: message.to_string(),
        }
    }
}

pub const CREATE_PROFILE_MESSAGE: &str = "Create Profile";
pub const LOGIN_MESSAGE: &str = "Login to Profile";
pub const ASK_MCQS_MESSAGE: &str = "Ask me MCQs";
pub const SHOW_SCORE_CARD_MESSAGE: &str = "Show my score card";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Widget {
    /// Loading indicator.
    Spinner { label: Option<String> },
    /// The user's own message, echoed into the history.
    UserMessage { text: String },
    /// Assistant text bubble.
    BotMessage { text: String },
    /// Placeholder while a question is being prepared.
    McqSkeleton,
    /// A multiple-choice question. `answer` is the correct option id.
    Mcq {
        question_id: String,
        topic: String,
        question: String,
        options: Vec<McqOption>,
        answer: String,
    },
    CreateOrLogin { actions: Vec<QuickAction> },
    ProfileForm { errors: Vec<FieldError> },
    LoginForm { errors: Vec<FieldError> },
    QuizMenu { actions: Vec<QuickAction> },
    ScoreCard {
        username: String,
        instagram_username: String,
        bio: String,
        score: i64,
    },
    Purchase {
        symbol: String,
        amount: u32,
        price: Decimal,
        total: Decimal,
    },
    /// Muted status line.
    SystemMessage { text: String },
    Error { message: String, retry: bool },
    /// Several widgets shown as one message.
    Group { children: Vec<Widget> },
    Empty,
}

impl Widget {
    pub fn spinner() -> Self {
        Self::Spinner { label: None }
    }

    pub fn spinner_with(label: impl Into<String>) -> Self {
        Self::Spinner {
            label: Some(label.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage { text: text.into() }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::BotMessage { text: text.into() }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::SystemMessage { text: text.into() }
    }

    pub fn mcq(question_id: impl Into<String>, question: &McqQuestion) -> Self {
        Self::Mcq {
            question_id: question_id.into(),
            topic: question.topic.clone(),
            question: question.question_text().to_string(),
            options: question.options.clone(),
            answer: question.answer_id().to_string(),
        }
    }

    pub fn create_or_login() -> Self {
        Self::CreateOrLogin {
            actions: vec![
                QuickAction::new("Create Profile", CREATE_PROFILE_MESSAGE),
                QuickAction::new("Login", LOGIN_MESSAGE),
            ],
        }
    }

    pub fn quiz_menu() -> Self {
        Self::QuizMenu {
            actions: vec![
                QuickAction::new("Start Quiz", ASK_MCQS_MESSAGE),
                QuickAction::new("Score Card", SHOW_SCORE_CARD_MESSAGE),
            ],
        }
    }

    pub fn score_card(profile: &Profile) -> Self {
        Self::ScoreCard {
            username: profile.username.clone(),
            instagram_username: profile.instagram_username.clone(),
            bio: profile.bio.clone(),
            score: profile.score,
        }
    }

    /// Generic store failure with a retry affordance.
    pub fn try_again(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            retry: true,
        }
    }

    pub fn group(children: Vec<Widget>) -> Self {
        Self::Group { children }
    }

    /// Correct option id, if this is a question widget.
    pub fn correct_option(&self) -> Option<&str> {
        match self {
            Self::Mcq { answer, .. } => Some(answer),
            _ => None,
        }
    }
}
