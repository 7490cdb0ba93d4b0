//! Quizbot — a conversational quiz assistant with generative UI.

pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod quiz;
pub mod session;
pub mod store;
pub mod ui;
pub mod web;
