//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmConfig;

pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Built-in quiz host prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a conversation bot and you have to ask users to play along by quizzing them.

You have to give them 8 random questions about women: their history, facts about them, \
their role in changing society, their role in love and more. The user answers them in the \
form of MCQ questions.

Before the quiz starts the user must have a profile. If the user is not logged in, call \
`create_or_login_ui` to let them create a profile or log in, then `show_profile_form` or \
`show_login_form` as they choose. Once logged in, call `show_quiz_menu` to offer the quiz \
and the score card.

Messages inside [] mean that it's a UI element or a user event. For example:
- \"[UI for topic X ...]\" means that an interface displays an MCQ question for a topic.
- \"[User has selected MCQ answer = B]\" means the user has clicked on answer B out of A, B, C, D.

Always call `show_mcq_question` to show a question. Call `show_score_card` when the user asks \
for their score card.

Shuffle the answers to the MCQ questions so that the user cannot guess the answer by the \
position of the options AT ALL COSTS!

Please follow the UI formatting and the user's request thoroughly.

Besides that, you cannot chat with users other than telling them that the quiz is over in a \
decent manner that respects women.";

/// Settings for the turn orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: String,
    pub model: String,
    pub temperature: f32,
    /// Cosmetic pause between a placeholder and the final widget.
    pub presentation_delay: Duration,
    /// Keep the correct MCQ answer visible to the model in replayed history.
    pub replay_answers: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 1.0,
            presentation_delay: Duration::from_millis(1000),
            replay_answers: true,
        }
    }
}

/// Process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: SecretString,
    pub api_base: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub orchestrator: OrchestratorConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let defaults = OrchestratorConfig::default();
        let delay_ms: u64 = parse_or(&lookup, "QUIZBOT_PRESENTATION_DELAY_MS", 1000)?;
        let temperature: f32 = parse_or(&lookup, "QUIZBOT_TEMPERATURE", defaults.temperature)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "QUIZBOT_TEMPERATURE".to_string(),
                message: format!("{temperature} is outside 0.0..=2.0"),
            });
        }

        let orchestrator = OrchestratorConfig {
            system_prompt: lookup("QUIZBOT_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
            model: lookup("QUIZBOT_MODEL").unwrap_or(defaults.model),
            temperature,
            presentation_delay: Duration::from_millis(delay_ms),
            replay_answers: parse_or(&lookup, "QUIZBOT_REPLAY_ANSWERS", defaults.replay_answers)?,
        };

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base: lookup("QUIZBOT_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            port: parse_or(&lookup, "QUIZBOT_PORT", 8080)?,
            db_path: lookup("QUIZBOT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/quizbot.db")),
            log_dir: lookup("QUIZBOT_LOG_DIR").map(PathBuf::from),
            orchestrator,
        })
    }

    pub fn llm(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.api_key.clone(),
            base_url: self.api_base.clone(),
            model: self.orchestrator.model.clone(),
        }
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}
