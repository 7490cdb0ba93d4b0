//! Profile record and form validation for the create/login flow.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MIN_USERNAME_LEN: usize = 5;
pub const MIN_INSTAGRAM_LEN: usize = 5;
pub const MIN_BIO_LEN: usize = 20;

static INSTAGRAM_HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._]+$").expect("valid regex"));

/// A stored user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub instagram_username: String,
    pub bio: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single rejected form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Submitted "create profile" form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileForm {
    pub username: String,
    pub instagram_username: String,
    pub bio: String,
}

impl ProfileForm {
    /// Trim fields, strip a leading `@` from the handle and enforce minimum
    /// lengths. Returns every failing field, not just the first.
    pub fn validate(&self) -> Result<ProfileForm, Vec<FieldError>> {
        let username = self.username.trim().to_string();
        let handle = self.instagram_username.trim();
        let instagram_username = handle.strip_prefix('@').unwrap_or(handle).to_string();
        let bio = self.bio.trim().to_string();

        let mut errors = Vec::new();
        if let Err(e) = validate_username(&username) {
            errors.push(e);
        }
        if instagram_username.chars().count() < MIN_INSTAGRAM_LEN {
            errors.push(FieldError::new(
                "instagram_username",
                format!("Instagram username must be at least {MIN_INSTAGRAM_LEN} characters."),
            ));
        } else if !INSTAGRAM_HANDLE.is_match(&instagram_username) {
            errors.push(FieldError::new(
                "instagram_username",
                "Instagram username may only contain letters, numbers, periods and underscores.",
            ));
        }
        if bio.chars().count() < MIN_BIO_LEN {
            errors.push(FieldError::new(
                "bio",
                format!("Bio must be at least {MIN_BIO_LEN} characters."),
            ));
        }

        if errors.is_empty() {
            Ok(ProfileForm {
                username,
                instagram_username,
                bio,
            })
        } else {
            Err(errors)
        }
    }
}

/// Login form only carries a username.
pub fn validate_username(username: &str) -> Result<(), FieldError> {
    if username.trim().chars().count() < MIN_USERNAME_LEN {
        return Err(FieldError::new(
            "username",
            format!("Username must be at least {MIN_USERNAME_LEN} characters."),
        ));
    }
    Ok(())
}
