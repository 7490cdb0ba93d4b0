//! Functions the model may call, their JSON schemas, and typed parsing of
//! the arguments it sends back.

use serde_json::json;

use crate::error::DispatchError;
use crate::llm::provider::FunctionDefinition;
use crate::quiz::McqQuestion;
use crate::session::Phase;

pub const CREATE_OR_LOGIN_UI: &str = "create_or_login_ui";
pub const SHOW_PROFILE_FORM: &str = "show_profile_form";
pub const SHOW_LOGIN_FORM: &str = "show_login_form";
pub const SHOW_MCQ_QUESTION: &str = "show_mcq_question";
pub const SHOW_SCORE_CARD: &str = "show_score_card";
pub const SHOW_QUIZ_MENU: &str = "show_quiz_menu";

const ANONYMOUS_FUNCTIONS: &[&str] = &[CREATE_OR_LOGIN_UI, SHOW_PROFILE_FORM, SHOW_LOGIN_FORM];
const LOGGED_IN_FUNCTIONS: &[&str] = &[SHOW_MCQ_QUESTION, SHOW_SCORE_CARD, SHOW_QUIZ_MENU];

/// A validated function invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCall {
    CreateOrLoginUi,
    ShowProfileForm,
    ShowLoginForm,
    ShowMcqQuestion(McqQuestion),
    ShowScoreCard,
    ShowQuizMenu,
}

impl FunctionCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateOrLoginUi => CREATE_OR_LOGIN_UI,
            Self::ShowProfileForm => SHOW_PROFILE_FORM,
            Self::ShowLoginForm => SHOW_LOGIN_FORM,
            Self::ShowMcqQuestion(_) => SHOW_MCQ_QUESTION,
            Self::ShowScoreCard => SHOW_SCORE_CARD,
            Self::ShowQuizMenu => SHOW_QUIZ_MENU,
        }
    }

    /// Parse and validate raw arguments for `name` against the set of
    /// functions permitted in `phase`.
    pub fn parse(
        name: &str,
        arguments: serde_json::Value,
        phase: &Phase,
    ) -> Result<Self, DispatchError> {
        if !is_declared(name) {
            return Err(DispatchError::UnknownFunction {
                name: name.to_string(),
            });
        }
        if !permitted_names(phase).contains(&name) {
            return Err(DispatchError::NotPermitted {
                name: name.to_string(),
                phase: phase.to_string(),
            });
        }

        match name {
            SHOW_MCQ_QUESTION => {
                let question: McqQuestion =
                    serde_json::from_value(arguments).map_err(|e| schema_error(name, e))?;
                question
                    .validate()
                    .map_err(|reason| DispatchError::SchemaValidation {
                        function: name.to_string(),
                        reason,
                    })?;
                Ok(Self::ShowMcqQuestion(question))
            }
            _ => {
                if !(arguments.is_null() || arguments.is_object()) {
                    return Err(DispatchError::SchemaValidation {
                        function: name.to_string(),
                        reason: "arguments must be an object".into(),
                    });
                }
                Ok(match name {
                    CREATE_OR_LOGIN_UI => Self::CreateOrLoginUi,
                    SHOW_PROFILE_FORM => Self::ShowProfileForm,
                    SHOW_LOGIN_FORM => Self::ShowLoginForm,
                    SHOW_SCORE_CARD => Self::ShowScoreCard,
                    _ => Self::ShowQuizMenu,
                })
            }
        }
    }
}

fn schema_error(name: &str, e: serde_json::Error) -> DispatchError {
    DispatchError::SchemaValidation {
        function: name.to_string(),
        reason: e.to_string(),
    }
}

fn is_declared(name: &str) -> bool {
    ANONYMOUS_FUNCTIONS.contains(&name) || LOGGED_IN_FUNCTIONS.contains(&name)
}

/// Names of the functions the model may call in `phase`.
pub fn permitted_names(phase: &Phase) -> &'static [&'static str] {
    match phase {
        Phase::Anonymous => ANONYMOUS_FUNCTIONS,
        Phase::LoggedIn { .. } => LOGGED_IN_FUNCTIONS,
    }
}

/// Function declarations sent to the provider for `phase`.
pub fn definitions_for(phase: &Phase) -> Vec<FunctionDefinition> {
    permitted_names(phase)
        .iter()
        .map(|name| definition(name))
        .collect()
}

fn no_args() -> serde_json::Value {
    json!({ "type": "object", "properties": {} })
}

fn definition(name: &str) -> FunctionDefinition {
    let (description, parameters) = match name {
        CREATE_OR_LOGIN_UI => (
            "Ask the user whether they want to create a new profile or log in to an existing one. \
             Call this before starting the quiz if the user is not logged in.",
            no_args(),
        ),
        SHOW_PROFILE_FORM => (
            "Show the profile creation form (username, Instagram username, bio).",
            no_args(),
        ),
        SHOW_LOGIN_FORM => ("Show the login form asking for a username.", no_args()),
        SHOW_MCQ_QUESTION => (
            "Show MCQ question for a specific topic. Use this to show MCQ questions to the user.",
            json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "The name of the topic"
                    },
                    "question": {
                        "type": "array",
                        "items": { "type": "string" },
                        "maxItems": 1,
                        "description": "The question about the specific topic to show to the user. It has to be difficult complexity."
                    },
                    "options": {
                        "type": "array",
                        "maxItems": 4,
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": {
                                    "type": "string",
                                    "description": "The id of the option. Eg, A, B, C, D"
                                },
                                "value": {
                                    "type": "string",
                                    "description": "The possible option for the question to show to the user."
                                }
                            },
                            "required": ["id", "value"]
                        },
                        "description": "The possible options for the question to show to the user."
                    },
                    "answer": {
                        "type": "array",
                        "items": { "type": "string" },
                        "maxItems": 1,
                        "description": "The answer to the question. Please shuffle this among A, B, C and D. Do not put the answer at the first position."
                    }
                },
                "required": ["topic", "question", "options", "answer"]
            }),
        ),
        SHOW_SCORE_CARD => (
            "Show the logged-in user's shareable score card.",
            no_args(),
        ),
        _ => (
            "Show the quiz menu with buttons to start the quiz or view the score card.",
            no_args(),
        ),
    };

    FunctionDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}
