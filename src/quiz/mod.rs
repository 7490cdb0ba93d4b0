//! Quiz domain models: MCQ questions and player profiles.

pub mod mcq;
pub mod profile;

pub use mcq::{McqOption, McqQuestion};
pub use profile::{FieldError, Profile, ProfileForm};
