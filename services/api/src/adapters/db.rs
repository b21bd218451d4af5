//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `DatabaseService` port from the `core` crate. It
//! handles all interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use followup_core::domain::{
    Answer, CaseResult, Experiment, ExperimentCase, FollowUp, Prompt, PromptUpdate, Question, User,
};
use followup_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps `sqlx` errors into the port taxonomy. `what` names the record the
/// operation was about.
fn map_db_err(what: &str, e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what.to_string()),
        sqlx::Error::Database(dbe)
            if matches!(dbe.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            PortError::Duplicate(what.to_string())
        }
        sqlx::Error::Io(io) => PortError::Connectivity(io.to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PortError::Connectivity(e.to_string())
        }
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct PromptRecord {
    id: Uuid,
    title: String,
    content: String,
    model: String,
    temperature: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl PromptRecord {
    fn to_domain(self) -> Prompt {
        Prompt {
            id: self.id,
            title: self.title,
            content: self.content,
            model: self.model,
            temperature: self.temperature,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    prompt_id: Uuid,
    question_text: String,
    created_at: DateTime<Utc>,
}
impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            id: self.id,
            prompt_id: self.prompt_id,
            question_text: self.question_text,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: Option<String>,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct AnswerRecord {
    id: Uuid,
    question_id: Uuid,
    user_id: Uuid,
    answer_text: String,
    created_at: DateTime<Utc>,
}
impl AnswerRecord {
    fn to_domain(self) -> Answer {
        Answer {
            id: self.id,
            question_id: self.question_id,
            user_id: self.user_id,
            answer_text: self.answer_text,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct FollowUpRecord {
    id: Uuid,
    answer_id: Uuid,
    followup_text: String,
    reason: Option<String>,
    created_at: DateTime<Utc>,
}
impl FollowUpRecord {
    fn to_domain(self) -> FollowUp {
        FollowUp {
            id: self.id,
            answer_id: self.answer_id,
            followup_text: self.followup_text,
            reason: self.reason,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ExperimentRecord {
    id: Uuid,
    name: String,
    description: String,
    prompt_id: Uuid,
    created_at: DateTime<Utc>,
}
impl ExperimentRecord {
    fn to_domain(self) -> Experiment {
        Experiment {
            id: self.id,
            name: self.name,
            description: self.description,
            prompt_id: self.prompt_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct ExperimentCaseRecord {
    id: Uuid,
    experiment_id: Uuid,
    question_id: Uuid,
    user_id: Uuid,
    is_selected: bool,
    created_at: DateTime<Utc>,
}
impl ExperimentCaseRecord {
    fn to_domain(self) -> ExperimentCase {
        ExperimentCase {
            id: self.id,
            experiment_id: self.experiment_id,
            question_id: self.question_id,
            user_id: self.user_id,
            is_selected: self.is_selected,
            created_at: self.created_at,
        }
    }
}

const PROMPT_COLUMNS: &str = "id, title, content, model, temperature, created_at, updated_at";
const CASE_COLUMNS: &str = "id, experiment_id, question_id, user_id, is_selected, created_at";

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_prompt(
        &self,
        title: &str,
        content: &str,
        model: &str,
        temperature: f64,
    ) -> PortResult<Prompt> {
        let record = sqlx::query_as::<_, PromptRecord>(&format!(
            "INSERT INTO prompts (title, content, model, temperature) \
             VALUES ($1, $2, $3, $4) RETURNING {PROMPT_COLUMNS}"
        ))
        .bind(title)
        .bind(content)
        .bind(model)
        .bind(temperature)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("prompt", e))?;
        Ok(record.to_domain())
    }

    async fn get_prompt_by_id(&self, prompt_id: Uuid) -> PortResult<Prompt> {
        let record = sqlx::query_as::<_, PromptRecord>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompts WHERE id = $1"
        ))
        .bind(prompt_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err(&format!("Prompt {prompt_id}"), e))?;
        Ok(record.to_domain())
    }

    async fn list_prompts(&self) -> PortResult<Vec<Prompt>> {
        let records = sqlx::query_as::<_, PromptRecord>(&format!(
            "SELECT {PROMPT_COLUMNS} FROM prompts ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("prompts", e))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_prompt(&self, prompt_id: Uuid, update: PromptUpdate) -> PortResult<Prompt> {
        // COALESCE keeps unspecified columns untouched; updated_at is
        // bumped on every edit.
        let record = sqlx::query_as::<_, PromptRecord>(&format!(
            "UPDATE prompts SET \
                 title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 model = COALESCE($4, model), \
                 temperature = COALESCE($5, temperature), \
                 updated_at = now() \
             WHERE id = $1 RETURNING {PROMPT_COLUMNS}"
        ))
        .bind(prompt_id)
        .bind(update.title)
        .bind(update.content)
        .bind(update.model)
        .bind(update.temperature)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err(&format!("Prompt {prompt_id}"), e))?;
        Ok(record.to_domain())
    }

    async fn delete_prompt(&self, prompt_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM prompts WHERE id = $1")
            .bind(prompt_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_err(&format!("Prompt {prompt_id}"), e))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Prompt {prompt_id}")));
        }
        Ok(())
    }

    async fn create_question(&self, prompt_id: Uuid, question_text: &str) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(
            "INSERT INTO questions (prompt_id, question_text) VALUES ($1, $2) \
             RETURNING id, prompt_id, question_text, created_at",
        )
        .bind(prompt_id)
        .bind(question_text)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("question", e))?;
        Ok(record.to_domain())
    }

    async fn get_question_by_id(&self, question_id: Uuid) -> PortResult<Question> {
        let record = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, prompt_id, question_text, created_at FROM questions WHERE id = $1",
        )
        .bind(question_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err(&format!("Question {question_id}"), e))?;
        Ok(record.to_domain())
    }

    async fn get_questions_by_prompt(&self, prompt_id: Uuid) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(
            "SELECT id, prompt_id, question_text, created_at FROM questions \
             WHERE prompt_id = $1 ORDER BY created_at ASC",
        )
        .bind(prompt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("questions", e))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_question(&self, question_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(question_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_err(&format!("Question {question_id}"), e))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Question {question_id}")));
        }
        Ok(())
    }

    async fn create_user(&self, name: &str, email: Option<&str>) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (name, email) VALUES ($1, $2) \
             RETURNING id, name, email, created_at",
        )
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("user", e))?;
        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err(&format!("User {user_id}"), e))?;
        Ok(record.to_domain())
    }

    async fn list_users(&self) -> PortResult<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, created_at FROM users ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("users", e))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_user(&self, user_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_err(&format!("User {user_id}"), e))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {user_id}")));
        }
        Ok(())
    }

    async fn upsert_answer(
        &self,
        question_id: Uuid,
        user_id: Uuid,
        answer_text: &str,
    ) -> PortResult<Answer> {
        let record = sqlx::query_as::<_, AnswerRecord>(
            "INSERT INTO answers (question_id, user_id, answer_text) VALUES ($1, $2, $3) \
             ON CONFLICT (question_id, user_id) DO UPDATE SET answer_text = EXCLUDED.answer_text \
             RETURNING id, question_id, user_id, answer_text, created_at",
        )
        .bind(question_id)
        .bind(user_id)
        .bind(answer_text)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("answer", e))?;
        Ok(record.to_domain())
    }

    async fn get_answers_by_question(&self, question_id: Uuid) -> PortResult<Vec<Answer>> {
        let records = sqlx::query_as::<_, AnswerRecord>(
            "SELECT id, question_id, user_id, answer_text, created_at FROM answers \
             WHERE question_id = $1 ORDER BY created_at ASC",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("answers", e))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_answer_by_question_and_user(
        &self,
        question_id: Uuid,
        user_id: Uuid,
    ) -> PortResult<Option<Answer>> {
        let record = sqlx::query_as::<_, AnswerRecord>(
            "SELECT id, question_id, user_id, answer_text, created_at FROM answers \
             WHERE question_id = $1 AND user_id = $2",
        )
        .bind(question_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_err("answer", e))?;
        Ok(record.map(|r| r.to_domain()))
    }

    async fn create_followup(
        &self,
        answer_id: Uuid,
        followup_text: &str,
        reason: Option<&str>,
    ) -> PortResult<FollowUp> {
        let record = sqlx::query_as::<_, FollowUpRecord>(
            "INSERT INTO followup_questions (answer_id, followup_text, reason) \
             VALUES ($1, $2, $3) \
             RETURNING id, answer_id, followup_text, reason, created_at",
        )
        .bind(answer_id)
        .bind(followup_text)
        .bind(reason)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("follow-up", e))?;
        Ok(record.to_domain())
    }

    async fn get_followups_by_answer(&self, answer_id: Uuid) -> PortResult<Vec<FollowUp>> {
        let records = sqlx::query_as::<_, FollowUpRecord>(
            "SELECT id, answer_id, followup_text, reason, created_at FROM followup_questions \
             WHERE answer_id = $1 ORDER BY created_at ASC",
        )
        .bind(answer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("follow-ups", e))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn clear_followups_by_answer(&self, answer_id: Uuid) -> PortResult<()> {
        sqlx::query("DELETE FROM followup_questions WHERE answer_id = $1")
            .bind(answer_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_err("follow-ups", e))?;
        Ok(())
    }

    async fn create_experiment(
        &self,
        name: &str,
        description: &str,
        prompt_id: Uuid,
    ) -> PortResult<Experiment> {
        let record = sqlx::query_as::<_, ExperimentRecord>(
            "INSERT INTO experiments (name, description, prompt_id) VALUES ($1, $2, $3) \
             RETURNING id, name, description, prompt_id, created_at",
        )
        .bind(name)
        .bind(description)
        .bind(prompt_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err("experiment", e))?;
        Ok(record.to_domain())
    }

    async fn get_experiment_by_id(&self, experiment_id: Uuid) -> PortResult<Experiment> {
        let record = sqlx::query_as::<_, ExperimentRecord>(
            "SELECT id, name, description, prompt_id, created_at FROM experiments WHERE id = $1",
        )
        .bind(experiment_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_err(&format!("Experiment {experiment_id}"), e))?;
        Ok(record.to_domain())
    }

    async fn list_experiments(&self) -> PortResult<Vec<Experiment>> {
        let records = sqlx::query_as::<_, ExperimentRecord>(
            "SELECT id, name, description, prompt_id, created_at FROM experiments \
             ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("experiments", e))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn get_experiments_by_prompt(&self, prompt_id: Uuid) -> PortResult<Vec<Experiment>> {
        let records = sqlx::query_as::<_, ExperimentRecord>(
            "SELECT id, name, description, prompt_id, created_at FROM experiments \
             WHERE prompt_id = $1 ORDER BY created_at DESC",
        )
        .bind(prompt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("experiments", e))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_experiment(&self, experiment_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM experiments WHERE id = $1")
            .bind(experiment_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_err(&format!("Experiment {experiment_id}"), e))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Experiment {experiment_id}")));
        }
        Ok(())
    }

    async fn create_case(
        &self,
        experiment_id: Uuid,
        question_id: Uuid,
        user_id: Uuid,
        is_selected: bool,
    ) -> PortResult<ExperimentCase> {
        let record = sqlx::query_as::<_, ExperimentCaseRecord>(&format!(
            "INSERT INTO experiment_cases (experiment_id, question_id, user_id, is_selected) \
             VALUES ($1, $2, $3, $4) RETURNING {CASE_COLUMNS}"
        ))
        .bind(experiment_id)
        .bind(question_id)
        .bind(user_id)
        .bind(is_selected)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            map_db_err(
                &format!("case ({experiment_id}, {question_id}, {user_id})"),
                e,
            )
        })?;
        Ok(record.to_domain())
    }

    async fn get_cases_by_experiment(
        &self,
        experiment_id: Uuid,
    ) -> PortResult<Vec<ExperimentCase>> {
        let records = sqlx::query_as::<_, ExperimentCaseRecord>(&format!(
            "SELECT {CASE_COLUMNS} FROM experiment_cases \
             WHERE experiment_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(experiment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("cases", e))?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn set_case_selection(&self, case_id: Uuid, is_selected: bool) -> PortResult<()> {
        let result = sqlx::query("UPDATE experiment_cases SET is_selected = $2 WHERE id = $1")
            .bind(case_id)
            .bind(is_selected)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_err(&format!("Case {case_id}"), e))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Case {case_id}")));
        }
        Ok(())
    }

    async fn get_selected_case_results(&self, experiment_id: Uuid) -> PortResult<Vec<CaseResult>> {
        let cases = sqlx::query_as::<_, ExperimentCaseRecord>(&format!(
            "SELECT {CASE_COLUMNS} FROM experiment_cases \
             WHERE experiment_id = $1 AND is_selected = TRUE \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(experiment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_err("cases", e))?;

        let mut results = Vec::with_capacity(cases.len());
        for case in cases {
            let case = case.to_domain();
            // A selected case without an answer is a soft data-integrity
            // gap; it is simply absent from the results view.
            let Some(answer) = self
                .get_answer_by_question_and_user(case.question_id, case.user_id)
                .await?
            else {
                continue;
            };
            let question = self.get_question_by_id(case.question_id).await?;
            let user = self.get_user_by_id(case.user_id).await?;
            let followups = self.get_followups_by_answer(answer.id).await?;
            results.push(CaseResult {
                case,
                question,
                user,
                answer,
                followups,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stands in for the driver's error type so the unique-violation
    /// mapping can be exercised without a live database.
    #[derive(Debug)]
    struct UniqueViolationError;

    impl std::fmt::Display for UniqueViolationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint")
        }
    }

    impl std::error::Error for UniqueViolationError {}

    impl sqlx::error::DatabaseError for UniqueViolationError {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_maps_to_duplicate() {
        let err = sqlx::Error::Database(Box::new(UniqueViolationError));
        let mapped = map_db_err("case (e, q, u)", err);
        assert!(matches!(mapped, PortError::Duplicate(_)));
        assert_eq!(mapped.to_string(), "Duplicate record: case (e, q, u)");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let mapped = map_db_err("Prompt 42", sqlx::Error::RowNotFound);
        assert!(matches!(mapped, PortError::NotFound(_)));
    }

    #[test]
    fn pool_exhaustion_maps_to_connectivity() {
        let mapped = map_db_err("cases", sqlx::Error::PoolTimedOut);
        assert!(matches!(mapped, PortError::Connectivity(_)));
    }
}
