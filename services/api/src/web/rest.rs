//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification. These endpoints are the
//! presentation layer: CRUD for each entity, the experiment run trigger,
//! and the results view grouped by user.

use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use followup_core::domain::{
    Answer, CaseResult, Experiment, ExperimentCase, FollowUp, Prompt, PromptUpdate, Question, User,
};
use followup_core::ports::PortError;
use followup_core::results::{group_by_user, summarize};
use followup_core::runner::{run_experiment, CaseOutcome, RunReport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_prompt_handler,
        list_prompts_handler,
        get_prompt_handler,
        update_prompt_handler,
        delete_prompt_handler,
        create_question_handler,
        list_questions_handler,
        delete_question_handler,
        create_user_handler,
        list_users_handler,
        delete_user_handler,
        create_default_users_handler,
        upsert_answer_handler,
        list_answers_handler,
        create_experiment_handler,
        list_experiments_handler,
        list_experiments_by_prompt_handler,
        delete_experiment_handler,
        create_case_handler,
        list_cases_handler,
        update_case_handler,
        run_experiment_handler,
        experiment_results_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
    ),
    components(schemas(
        PromptResponse,
        CreatePromptRequest,
        UpdatePromptRequest,
        QuestionResponse,
        CreateQuestionRequest,
        UserResponse,
        CreateUserRequest,
        DefaultUsersResponse,
        AnswerResponse,
        UpsertAnswerRequest,
        FollowUpResponse,
        ExperimentResponse,
        CreateExperimentRequest,
        CaseResponse,
        CreateCaseRequest,
        UpdateCaseRequest,
        RunReportResponse,
        CaseOutcomeResponse,
        ResultsResponse,
        ResultsSummaryResponse,
        UserResultsResponse,
        CaseResultResponse,
        crate::web::auth::LoginRequest,
        crate::web::auth::LoginResponse,
    )),
    tags(
        (name = "Follow-up Questions API", description = "Prompts, questions, users, answers, experiments, and AI-generated follow-ups.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Translation
//=========================================================================================

/// Maps a port error onto the HTTP surface. The message is the port error's
/// own display text; anything unexpected is logged and flattened to 500.
fn port_error_response(e: PortError) -> (StatusCode, String) {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Duplicate(_) => StatusCode::CONFLICT,
        PortError::Connectivity(_) => StatusCode::BAD_GATEWAY,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Unexpected port error: {:?}", e);
    }
    (status, e.to_string())
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct PromptResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub model: String,
    pub temperature: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Prompt> for PromptResponse {
    fn from(p: Prompt) -> Self {
        Self {
            id: p.id,
            title: p.title,
            content: p.content,
            model: p.model,
            temperature: p.temperature,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreatePromptRequest {
    pub title: String,
    pub content: String,
    /// Defaults to the configured default model when omitted.
    pub model: Option<String>,
    /// Defaults to the configured default temperature when omitted.
    pub temperature: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdatePromptRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct QuestionResponse {
    pub id: Uuid,
    pub prompt_id: Uuid,
    pub question_text: String,
    pub created_at: DateTime<Utc>,
}

impl From<Question> for QuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            prompt_id: q.prompt_id,
            question_text: q.question_text,
            created_at: q.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateQuestionRequest {
    pub prompt_id: Uuid,
    pub question_text: String,
}

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            created_at: u.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DefaultUsersResponse {
    /// How many of the default users were newly created (existing ones are
    /// left alone).
    pub created: usize,
    pub users: Vec<UserResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct AnswerResponse {
    pub id: Uuid,
    pub question_id: Uuid,
    pub user_id: Uuid,
    pub answer_text: String,
    pub created_at: DateTime<Utc>,
}

impl From<Answer> for AnswerResponse {
    fn from(a: Answer) -> Self {
        Self {
            id: a.id,
            question_id: a.question_id,
            user_id: a.user_id,
            answer_text: a.answer_text,
            created_at: a.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct UpsertAnswerRequest {
    pub question_id: Uuid,
    pub user_id: Uuid,
    pub answer_text: String,
}

#[derive(Serialize, ToSchema)]
pub struct FollowUpResponse {
    pub id: Uuid,
    pub answer_id: Uuid,
    pub followup_text: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FollowUp> for FollowUpResponse {
    fn from(f: FollowUp) -> Self {
        Self {
            id: f.id,
            answer_id: f.answer_id,
            followup_text: f.followup_text,
            reason: f.reason,
            created_at: f.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ExperimentResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub prompt_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<Experiment> for ExperimentResponse {
    fn from(e: Experiment) -> Self {
        Self {
            id: e.id,
            name: e.name,
            description: e.description,
            prompt_id: e.prompt_id,
            created_at: e.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateExperimentRequest {
    pub name: String,
    pub description: Option<String>,
    pub prompt_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct CaseResponse {
    pub id: Uuid,
    pub experiment_id: Uuid,
    pub question_id: Uuid,
    pub user_id: Uuid,
    pub is_selected: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ExperimentCase> for CaseResponse {
    fn from(c: ExperimentCase) -> Self {
        Self {
            id: c.id,
            experiment_id: c.experiment_id,
            question_id: c.question_id,
            user_id: c.user_id,
            is_selected: c.is_selected,
            created_at: c.created_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCaseRequest {
    pub question_id: Uuid,
    pub user_id: Uuid,
    /// Defaults to selected.
    pub is_selected: Option<bool>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateCaseRequest {
    pub is_selected: bool,
}

#[derive(Serialize, ToSchema)]
pub struct CaseOutcomeResponse {
    pub case_id: Uuid,
    pub question_id: Uuid,
    pub user_id: Uuid,
    /// One of "generated", "missing_answer", "failed".
    pub status: String,
    pub followup: Option<FollowUpResponse>,
    pub error: Option<String>,
}

impl From<CaseOutcome> for CaseOutcomeResponse {
    fn from(outcome: CaseOutcome) -> Self {
        match outcome {
            CaseOutcome::Generated { case, followup } => Self {
                case_id: case.id,
                question_id: case.question_id,
                user_id: case.user_id,
                status: "generated".to_string(),
                followup: Some(followup.into()),
                error: None,
            },
            CaseOutcome::MissingAnswer { case } => Self {
                case_id: case.id,
                question_id: case.question_id,
                user_id: case.user_id,
                status: "missing_answer".to_string(),
                followup: None,
                error: None,
            },
            CaseOutcome::Failed { case, error } => Self {
                case_id: case.id,
                question_id: case.question_id,
                user_id: case.user_id,
                status: "failed".to_string(),
                followup: None,
                error: Some(error),
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RunReportResponse {
    pub experiment_id: Uuid,
    pub generated: usize,
    pub failed: usize,
    pub missing_answers: usize,
    pub outcomes: Vec<CaseOutcomeResponse>,
}

impl From<RunReport> for RunReportResponse {
    fn from(report: RunReport) -> Self {
        Self {
            experiment_id: report.experiment_id,
            generated: report.generated_count(),
            failed: report.failed_count(),
            missing_answers: report.missing_answer_count(),
            outcomes: report.outcomes.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CaseResultResponse {
    pub case: CaseResponse,
    pub question: QuestionResponse,
    pub answer: AnswerResponse,
    pub followups: Vec<FollowUpResponse>,
}

impl From<CaseResult> for CaseResultResponse {
    fn from(cr: CaseResult) -> Self {
        Self {
            case: cr.case.into(),
            question: cr.question.into(),
            answer: cr.answer.into(),
            followups: cr.followups.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UserResultsResponse {
    pub user: UserResponse,
    pub cases: Vec<CaseResultResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct ResultsSummaryResponse {
    pub users: usize,
    pub questions: usize,
    pub cases: usize,
    pub followups: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ResultsResponse {
    pub experiment_id: Uuid,
    pub summary: ResultsSummaryResponse,
    pub users: Vec<UserResultsResponse>,
}

//=========================================================================================
// Prompt Handlers
//=========================================================================================

/// Create a prompt. Model and temperature fall back to the configured
/// defaults when omitted.
#[utoipa::path(
    post,
    path = "/prompts",
    request_body = CreatePromptRequest,
    responses(
        (status = 201, description = "Prompt created", body = PromptResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_prompt_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePromptRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let model = req
        .model
        .unwrap_or_else(|| state.config.default_model.clone());
    let temperature = req.temperature.unwrap_or(state.config.default_temperature);
    let prompt = state
        .db
        .create_prompt(&req.title, &req.content, &model, temperature)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(PromptResponse::from(prompt))))
}

/// List all prompts, newest first.
#[utoipa::path(
    get,
    path = "/prompts",
    responses((status = 200, description = "All prompts", body = [PromptResponse]))
)]
pub async fn list_prompts_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let prompts = state.db.list_prompts().await.map_err(port_error_response)?;
    let body: Vec<PromptResponse> = prompts.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Fetch one prompt.
#[utoipa::path(
    get,
    path = "/prompts/{id}",
    params(("id" = Uuid, Path, description = "Prompt id")),
    responses(
        (status = 200, description = "The prompt", body = PromptResponse),
        (status = 404, description = "No such prompt")
    )
)]
pub async fn get_prompt_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let prompt = state
        .db
        .get_prompt_by_id(id)
        .await
        .map_err(port_error_response)?;
    Ok(Json(PromptResponse::from(prompt)))
}

/// Partially update a prompt. Only supplied fields change.
#[utoipa::path(
    patch,
    path = "/prompts/{id}",
    params(("id" = Uuid, Path, description = "Prompt id")),
    request_body = UpdatePromptRequest,
    responses(
        (status = 200, description = "Updated prompt", body = PromptResponse),
        (status = 404, description = "No such prompt")
    )
)]
pub async fn update_prompt_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePromptRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let update = PromptUpdate {
        title: req.title,
        content: req.content,
        model: req.model,
        temperature: req.temperature,
    };
    let prompt = state
        .db
        .update_prompt(id, update)
        .await
        .map_err(port_error_response)?;
    Ok(Json(PromptResponse::from(prompt)))
}

/// Delete a prompt and, via cascade, its questions, answers, follow-ups,
/// experiments, and cases.
#[utoipa::path(
    delete,
    path = "/prompts/{id}",
    params(("id" = Uuid, Path, description = "Prompt id")),
    responses(
        (status = 204, description = "Prompt deleted"),
        (status = 404, description = "No such prompt")
    )
)]
pub async fn delete_prompt_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .delete_prompt(id)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Question Handlers
//=========================================================================================

/// Add a question to a prompt.
#[utoipa::path(
    post,
    path = "/questions",
    request_body = CreateQuestionRequest,
    responses(
        (status = 201, description = "Question created", body = QuestionResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_question_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let question = state
        .db
        .create_question(req.prompt_id, &req.question_text)
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(QuestionResponse::from(question))))
}

/// List a prompt's questions in creation order.
#[utoipa::path(
    get,
    path = "/prompts/{id}/questions",
    params(("id" = Uuid, Path, description = "Prompt id")),
    responses((status = 200, description = "The prompt's questions", body = [QuestionResponse]))
)]
pub async fn list_questions_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let questions = state
        .db
        .get_questions_by_prompt(id)
        .await
        .map_err(port_error_response)?;
    let body: Vec<QuestionResponse> = questions.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Delete a question and its answers and follow-ups.
#[utoipa::path(
    delete,
    path = "/questions/{id}",
    params(("id" = Uuid, Path, description = "Question id")),
    responses(
        (status = 204, description = "Question deleted"),
        (status = 404, description = "No such question")
    )
)]
pub async fn delete_question_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .delete_question(id)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// User Handlers
//=========================================================================================

/// The bulk-setup roster. Creation skips names that already exist.
const DEFAULT_USERS: [(&str, &str); 5] = [
    ("Alice Johnson", "alice@example.com"),
    ("Bob Smith", "bob@example.com"),
    ("Carol Davis", "carol@example.com"),
    ("David Wilson", "david@example.com"),
    ("Eva Brown", "eva@example.com"),
];

/// Create a user.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state
        .db
        .create_user(&req.name, req.email.as_deref())
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// List all users by name.
#[utoipa::path(
    get,
    path = "/users",
    responses((status = 200, description = "All users", body = [UserResponse]))
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let users = state.db.list_users().await.map_err(port_error_response)?;
    let body: Vec<UserResponse> = users.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Delete a user together with their answers and cases.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "No such user")
    )
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.db.delete_user(id).await.map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create the five default test users, skipping any that already exist by
/// name.
#[utoipa::path(
    post,
    path = "/users/defaults",
    responses((status = 200, description = "Default users ensured", body = DefaultUsersResponse))
)]
pub async fn create_default_users_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let existing = state.db.list_users().await.map_err(port_error_response)?;
    let mut created = 0;
    for (name, email) in DEFAULT_USERS {
        if existing.iter().any(|u| u.name == name) {
            continue;
        }
        state
            .db
            .create_user(name, Some(email))
            .await
            .map_err(port_error_response)?;
        created += 1;
    }
    let users = state.db.list_users().await.map_err(port_error_response)?;
    info!("Default user setup created {created} new users");
    Ok(Json(DefaultUsersResponse {
        created,
        users: users.into_iter().map(Into::into).collect(),
    }))
}

//=========================================================================================
// Answer Handlers
//=========================================================================================

/// Save a user's answer to a question, replacing any previous text.
#[utoipa::path(
    put,
    path = "/answers",
    request_body = UpsertAnswerRequest,
    responses(
        (status = 200, description = "Answer saved", body = AnswerResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn upsert_answer_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertAnswerRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let answer = state
        .db
        .upsert_answer(req.question_id, req.user_id, &req.answer_text)
        .await
        .map_err(port_error_response)?;
    Ok(Json(AnswerResponse::from(answer)))
}

/// List every user's answer to a question.
#[utoipa::path(
    get,
    path = "/questions/{id}/answers",
    params(("id" = Uuid, Path, description = "Question id")),
    responses((status = 200, description = "The question's answers", body = [AnswerResponse]))
)]
pub async fn list_answers_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let answers = state
        .db
        .get_answers_by_question(id)
        .await
        .map_err(port_error_response)?;
    let body: Vec<AnswerResponse> = answers.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

//=========================================================================================
// Experiment Handlers
//=========================================================================================

/// Create an experiment bound to a prompt.
#[utoipa::path(
    post,
    path = "/experiments",
    request_body = CreateExperimentRequest,
    responses(
        (status = 201, description = "Experiment created", body = ExperimentResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_experiment_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateExperimentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let experiment = state
        .db
        .create_experiment(&req.name, req.description.as_deref().unwrap_or(""), req.prompt_id)
        .await
        .map_err(port_error_response)?;
    Ok((
        StatusCode::CREATED,
        Json(ExperimentResponse::from(experiment)),
    ))
}

/// List all experiments, newest first.
#[utoipa::path(
    get,
    path = "/experiments",
    responses((status = 200, description = "All experiments", body = [ExperimentResponse]))
)]
pub async fn list_experiments_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let experiments = state
        .db
        .list_experiments()
        .await
        .map_err(port_error_response)?;
    let body: Vec<ExperimentResponse> = experiments.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// List the experiments bound to one prompt.
#[utoipa::path(
    get,
    path = "/prompts/{id}/experiments",
    params(("id" = Uuid, Path, description = "Prompt id")),
    responses((status = 200, description = "The prompt's experiments", body = [ExperimentResponse]))
)]
pub async fn list_experiments_by_prompt_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let experiments = state
        .db
        .get_experiments_by_prompt(id)
        .await
        .map_err(port_error_response)?;
    let body: Vec<ExperimentResponse> = experiments.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Delete an experiment and its cases.
#[utoipa::path(
    delete,
    path = "/experiments/{id}",
    params(("id" = Uuid, Path, description = "Experiment id")),
    responses(
        (status = 204, description = "Experiment deleted"),
        (status = 404, description = "No such experiment")
    )
)]
pub async fn delete_experiment_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .delete_experiment(id)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Experiment Case Handlers
//=========================================================================================

/// Add a (question, user) case to an experiment. Duplicate triples are
/// rejected with 409 and leave the original row untouched.
#[utoipa::path(
    post,
    path = "/experiments/{id}/cases",
    params(("id" = Uuid, Path, description = "Experiment id")),
    request_body = CreateCaseRequest,
    responses(
        (status = 201, description = "Case created", body = CaseResponse),
        (status = 409, description = "Case already exists for this experiment, question, and user")
    )
)]
pub async fn create_case_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateCaseRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let case = state
        .db
        .create_case(
            id,
            req.question_id,
            req.user_id,
            req.is_selected.unwrap_or(true),
        )
        .await
        .map_err(port_error_response)?;
    Ok((StatusCode::CREATED, Json(CaseResponse::from(case))))
}

/// List an experiment's cases in creation order.
#[utoipa::path(
    get,
    path = "/experiments/{id}/cases",
    params(("id" = Uuid, Path, description = "Experiment id")),
    responses((status = 200, description = "The experiment's cases", body = [CaseResponse]))
)]
pub async fn list_cases_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cases = state
        .db
        .get_cases_by_experiment(id)
        .await
        .map_err(port_error_response)?;
    let body: Vec<CaseResponse> = cases.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// Toggle a case's inclusion in future runs.
#[utoipa::path(
    patch,
    path = "/cases/{id}",
    params(("id" = Uuid, Path, description = "Case id")),
    request_body = UpdateCaseRequest,
    responses(
        (status = 204, description = "Selection updated"),
        (status = 404, description = "No such case")
    )
)]
pub async fn update_case_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCaseRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    state
        .db
        .set_case_selection(id, req.is_selected)
        .await
        .map_err(port_error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Run and Results Handlers
//=========================================================================================

/// Run an experiment: one follow-up generation per selected case. A failing
/// case is reported in the outcome list and never aborts the batch.
#[utoipa::path(
    post,
    path = "/experiments/{id}/run",
    params(("id" = Uuid, Path, description = "Experiment id")),
    responses(
        (status = 200, description = "Per-case run report", body = RunReportResponse),
        (status = 404, description = "No such experiment")
    )
)]
pub async fn run_experiment_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    info!("Running experiment {id}");
    let report = run_experiment(state.db.as_ref(), state.generator.as_ref(), id)
        .await
        .map_err(port_error_response)?;
    info!(
        "Experiment {id} finished: {} generated, {} failed, {} missing answers",
        report.generated_count(),
        report.failed_count(),
        report.missing_answer_count()
    );
    Ok(Json(RunReportResponse::from(report)))
}

/// The results view: selected cases with their follow-ups, grouped by user,
/// plus summary counts.
#[utoipa::path(
    get,
    path = "/experiments/{id}/results",
    params(("id" = Uuid, Path, description = "Experiment id")),
    responses((status = 200, description = "Results grouped by user", body = ResultsResponse))
)]
pub async fn experiment_results_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let case_results = state
        .db
        .get_selected_case_results(id)
        .await
        .map_err(port_error_response)?;

    let grouped = group_by_user(case_results);
    let summary = summarize(&grouped);

    Ok(Json(ResultsResponse {
        experiment_id: id,
        summary: ResultsSummaryResponse {
            users: summary.users,
            questions: summary.questions,
            cases: summary.cases,
            followups: summary.followups,
        },
        users: grouped
            .into_iter()
            .map(|g| UserResultsResponse {
                user: g.user.into(),
                cases: g.cases.into_iter().map(Into::into).collect(),
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_case_translates_to_conflict() {
        let (status, body) =
            port_error_response(PortError::Duplicate("case (e, q, u)".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.contains("case (e, q, u)"));
    }

    #[test]
    fn port_errors_translate_to_their_http_statuses() {
        let (status, _) = port_error_response(PortError::NotFound("Prompt 42".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            port_error_response(PortError::Connectivity("provider unreachable".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = port_error_response(PortError::Unauthorized);
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = port_error_response(PortError::Unexpected("boom".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
