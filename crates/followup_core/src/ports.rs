//! crates/followup_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of the concrete database and generation-API
//! implementations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    Answer, CaseResult, Experiment, ExperimentCase, FollowUp, FollowupDraft, Prompt, PromptUpdate,
    Question, User,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services
/// (database, generation API) into the taxonomy the rest of the system
/// reacts to.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// Unique-constraint violation, e.g. a second case with the same
    /// (experiment, question, user) triple.
    #[error("Duplicate record: {0}")]
    Duplicate(String),
    /// The store or the generation API could not be reached, or the call
    /// itself failed before producing usable content.
    #[error("Connectivity failure: {0}")]
    Connectivity(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Prompt Management ---
    async fn create_prompt(
        &self,
        title: &str,
        content: &str,
        model: &str,
        temperature: f64,
    ) -> PortResult<Prompt>;

    async fn get_prompt_by_id(&self, prompt_id: Uuid) -> PortResult<Prompt>;

    async fn list_prompts(&self) -> PortResult<Vec<Prompt>>;

    /// Partial update: only the supplied fields change, `updated_at` is
    /// bumped either way.
    async fn update_prompt(&self, prompt_id: Uuid, update: PromptUpdate) -> PortResult<Prompt>;

    async fn delete_prompt(&self, prompt_id: Uuid) -> PortResult<()>;

    // --- Question Management ---
    async fn create_question(&self, prompt_id: Uuid, question_text: &str) -> PortResult<Question>;

    async fn get_question_by_id(&self, question_id: Uuid) -> PortResult<Question>;

    async fn get_questions_by_prompt(&self, prompt_id: Uuid) -> PortResult<Vec<Question>>;

    async fn delete_question(&self, question_id: Uuid) -> PortResult<()>;

    // --- User Management ---
    async fn create_user(&self, name: &str, email: Option<&str>) -> PortResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn list_users(&self) -> PortResult<Vec<User>>;

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()>;

    // --- Answer Management ---
    /// Creates the answer for (question, user) or replaces its text if one
    /// already exists. One answer per pair.
    async fn upsert_answer(
        &self,
        question_id: Uuid,
        user_id: Uuid,
        answer_text: &str,
    ) -> PortResult<Answer>;

    async fn get_answers_by_question(&self, question_id: Uuid) -> PortResult<Vec<Answer>>;

    async fn get_answer_by_question_and_user(
        &self,
        question_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Answer>>;

    // --- Follow-up Management ---
    async fn create_followup(
        &self,
        answer_id: Uuid,
        followup_text: &str,
        reason: Option<&str>,
    ) -> PortResult<FollowUp>;

    async fn get_followups_by_answer(&self, answer_id: Uuid) -> PortResult<Vec<FollowUp>>;

    async fn clear_followups_by_answer(&self, answer_id: Uuid) -> PortResult<()>;

    // --- Experiment Management ---
    async fn create_experiment(
        &self,
        name: &str,
        description: &str,
        prompt_id: Uuid,
    ) -> PortResult<Experiment>;

    async fn get_experiment_by_id(&self, experiment_id: Uuid) -> PortResult<Experiment>;

    async fn list_experiments(&self) -> PortResult<Vec<Experiment>>;

    async fn get_experiments_by_prompt(&self, prompt_id: Uuid) -> PortResult<Vec<Experiment>>;

    async fn delete_experiment(&self, experiment_id: Uuid) -> PortResult<()>;

    // --- Experiment Case Management ---
    /// Returns `PortError::Duplicate` when a case with the same
    /// (experiment, question, user) triple already exists.
    async fn create_case(
        &self,
        experiment_id: Uuid,
        question_id: Uuid,
        user_id: Uuid,
        is_selected: bool,
    ) -> PortResult<ExperimentCase>;

    async fn get_cases_by_experiment(&self, experiment_id: Uuid) -> PortResult<Vec<ExperimentCase>>;

    async fn set_case_selection(&self, case_id: Uuid, is_selected: bool) -> PortResult<()>;

    /// Loads all selected cases of an experiment joined with their question,
    /// user, answer, and any existing follow-ups, in creation order
    /// (created_at, then id, ascending). Cases whose (question, user) pair
    /// has no answer are omitted here; the runner re-checks per case.
    async fn get_selected_case_results(&self, experiment_id: Uuid) -> PortResult<Vec<CaseResult>>;
}

#[async_trait]
pub trait FollowupGenerationService: Send + Sync {
    /// Issues exactly one generation request. `prompt_context` is used
    /// verbatim as the system instruction; `temperature` is passed through
    /// uninterpreted. The returned question always ends with a question
    /// mark. Transport and provider errors surface as
    /// `PortError::Connectivity`; malformed-but-delivered content is
    /// salvaged by the adapter's fallback parser instead of failing.
    async fn generate_followup(
        &self,
        prompt_context: &str,
        question: &str,
        answer: &str,
        model: &str,
        temperature: f64,
    ) -> PortResult<FollowupDraft>;
}
