//! Multiple-choice question model, as produced by the `show_mcq_question`
//! function call.

use serde::{Deserialize, Serialize};

/// Maximum number of options a question may carry.
pub const MAX_OPTIONS: usize = 4;

/// One selectable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqOption {
    /// Option identifier, e.g. "A".
    pub id: String,
    pub value: String,
}

/// A transient MCQ question. Never persisted as a record.
///
/// `question` and `answer` are single-element sequences to match the
/// declared function schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqQuestion {
    pub topic: String,
    pub question: Vec<String>,
    pub options: Vec<McqOption>,
    pub answer: Vec<String>,
}

impl McqQuestion {
    /// Check the shape the function schema promises.
    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("topic must not be empty".into());
        }
        if self.question.len() != 1 {
            return Err(format!(
                "question must have exactly one element, got {}",
                self.question.len()
            ));
        }
        if self.options.is_empty() || self.options.len() > MAX_OPTIONS {
            return Err(format!(
                "options must have 1 to {MAX_OPTIONS} entries, got {}",
                self.options.len()
            ));
        }
        for (i, opt) in self.options.iter().enumerate() {
            if opt.id.trim().is_empty() {
                return Err(format!("option {i} has an empty id"));
            }
            if self.options[..i].iter().any(|o| o.id == opt.id) {
                return Err(format!("duplicate option id {}", opt.id));
            }
        }
        if self.answer.len() != 1 {
            return Err(format!(
                "answer must have exactly one element, got {}",
                self.answer.len()
            ));
        }
        if !self.options.iter().any(|o| o.id == self.answer[0]) {
            return Err(format!(
                "answer {} does not match any option id",
                self.answer[0]
            ));
        }
        Ok(())
    }

    pub fn question_text(&self) -> &str {
        self.question.first().map(String::as_str).unwrap_or_default()
    }

    /// Id of the correct option.
    pub fn answer_id(&self) -> &str {
        self.answer.first().map(String::as_str).unwrap_or_default()
    }

    pub fn is_correct(&self, option_id: &str) -> bool {
        self.answer_id() == option_id
    }

    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }

    /// Function-role summary committed to the conversation so later turns
    /// remember what was asked.
    pub fn summary(&self) -> String {
        let options = self
            .options
            .iter()
            .map(|o| format!("{}: {}", o.id, o.value))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "[UI for topic {} for the question {} with MCQ options {} and the answer, {}]",
            self.topic,
            self.question_text(),
            options,
            self.answer_id()
        )
    }

    /// The summary with the answer clause removed.
    pub fn redact_summary(summary: &str) -> String {
        match summary.rfind(" and the answer, ") {
            Some(idx) => format!("{}]", &summary[..idx]),
            None => summary.to_string(),
        }
    }
}
