//! crates/followup_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Reusable system-instruction text plus the AI generation settings
/// (model, temperature) used whenever this prompt drives a run.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub model: String,
    pub temperature: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A question attached to one prompt. Question text is immutable once created.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub question_text: String,
    pub created_at: DateTime<Utc>,
}

/// A participant who answers questions.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One user's answer to one question. Unique per (question, user).
#[derive(Debug, Clone)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub user_id: Uuid,
    pub answer_text: String,
    pub created_at: DateTime<Utc>,
}

/// An AI-generated follow-up question attached to one answer.
/// `reason` is nullable for rows predating its introduction.
#[derive(Debug, Clone)]
pub struct FollowUp {
    pub id: Uuid,
    pub answer_id: Uuid,
    pub followup_text: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A named bundle of selected cases run together under one prompt's settings.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub prompt_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Links an experiment to a (question, user) pair. The selection flag
/// governs inclusion in a run; uniqueness on
/// (experiment_id, question_id, user_id) is enforced by the store.
#[derive(Debug, Clone)]
pub struct ExperimentCase {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub question_id: Uuid,
    pub user_id: Uuid,
    pub is_selected: bool,
    pub created_at: DateTime<Utc>,
}

/// A selected case joined with everything needed to display or run it.
#[derive(Debug, Clone)]
pub struct CaseResult {
    pub case: ExperimentCase,
    pub question: Question,
    pub user: User,
    pub answer: Answer,
    pub followups: Vec<FollowUp>,
}

/// The two-field output of the generation client, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupDraft {
    pub question: String,
    pub reason: String,
}

/// Fields of a prompt that may change on edit. `None` leaves the column as-is.
#[derive(Debug, Clone, Default)]
pub struct PromptUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}
