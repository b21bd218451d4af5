//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiFollowupAdapter},
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler},
        middleware::require_auth,
        rest::{self, ApiDoc},
        state::{AppState, SessionStore},
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Generation Adapter ---
    let genai_config = OpenAIConfig::new()
        .with_api_base(&config.genai_api_base)
        .with_api_key(
            config
                .genai_api_key
                .as_ref()
                .ok_or_else(|| ApiError::Internal("GENAI_API_KEY is required".to_string()))?,
        );
    let genai_client = Client::with_config(genai_config);
    let followup_adapter = Arc::new(OpenAiFollowupAdapter::new(genai_client));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db: db_adapter,
        generator: followup_adapter,
        config: config.clone(),
        sessions: SessionStore::new(),
    });

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 5. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/prompts",
            post(rest::create_prompt_handler).get(rest::list_prompts_handler),
        )
        .route(
            "/prompts/{id}",
            get(rest::get_prompt_handler)
                .patch(rest::update_prompt_handler)
                .delete(rest::delete_prompt_handler),
        )
        .route("/prompts/{id}/questions", get(rest::list_questions_handler))
        .route(
            "/prompts/{id}/experiments",
            get(rest::list_experiments_by_prompt_handler),
        )
        .route("/questions", post(rest::create_question_handler))
        .route("/questions/{id}", delete(rest::delete_question_handler))
        .route("/questions/{id}/answers", get(rest::list_answers_handler))
        .route(
            "/users",
            post(rest::create_user_handler).get(rest::list_users_handler),
        )
        .route("/users/defaults", post(rest::create_default_users_handler))
        .route("/users/{id}", delete(rest::delete_user_handler))
        .route("/answers", put(rest::upsert_answer_handler))
        .route(
            "/experiments",
            post(rest::create_experiment_handler).get(rest::list_experiments_handler),
        )
        .route("/experiments/{id}", delete(rest::delete_experiment_handler))
        .route(
            "/experiments/{id}/cases",
            post(rest::create_case_handler).get(rest::list_cases_handler),
        )
        .route("/cases/{id}", patch(rest::update_case_handler))
        .route("/experiments/{id}/run", post(rest::run_experiment_handler))
        .route(
            "/experiments/{id}/results",
            get(rest::experiment_results_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
