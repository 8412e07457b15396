//! Governance API Service
//!
//! REST API over the rules engine: validate policy documents, manage the
//! registered policy set, and evaluate resources against it.

pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use policy_schema::ValidationIssue;
use rules_engine::{EngineError, RulesEngine};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Directory of policy files registered at startup.
pub const ENV_POLICY_DIR: &str = "GOVERNANCE_POLICY_DIR";

/// Listen address for the HTTP server.
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Address from `BIND_ADDR`, or `0.0.0.0:8080` when unset or blank.
pub fn bind_addr() -> String {
    std::env::var(ENV_BIND_ADDR)
        .ok()
        .filter(|addr| !addr.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RulesEngine>,
}

impl AppState {
    pub fn new(engine: RulesEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Builds the engine from `GOVERNANCE_*` variables and registers the
    /// policies under `GOVERNANCE_POLICY_DIR` when it is set.
    pub fn from_env() -> Result<Self> {
        let config = rules_engine::load_from_env().context("Invalid engine configuration")?;
        let engine = RulesEngine::new(config).context("Failed to initialise rules engine")?;

        if let Some(dir) = std::env::var_os(ENV_POLICY_DIR).filter(|d| !d.is_empty()) {
            let dir = PathBuf::from(dir);
            let summary = engine
                .load_policies(std::slice::from_ref(&dir))
                .with_context(|| format!("Failed to load policies from {}", dir.display()))?;
            for failure in summary.failures() {
                warn!(
                    path = %failure.path.display(),
                    error = failure.error.as_deref().unwrap_or_default(),
                    "policy not registered"
                );
            }
            info!(
                "Registered {} policies from {}",
                summary.registered(),
                dir.display()
            );
        }

        Ok(Self::new(engine))
    }
}

/// Custom error type for API responses
#[derive(Debug)]
pub struct AppError {
    pub status_code: StatusCode,
    pub message: String,
    pub issues: Vec<ValidationIssue>,
}

impl AppError {
    pub fn new(status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            issues: Vec::new(),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidPolicy { name, issues } => AppError {
                status_code: StatusCode::UNPROCESSABLE_ENTITY,
                message: format!("Policy '{}' failed validation", name),
                issues,
            },
            EngineError::PolicyNotFound(name) => {
                AppError::new(StatusCode::NOT_FOUND, format!("Policy not found: {}", name))
            }
            other => AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal server error: {}", other),
            ),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = if self.issues.is_empty() {
            json!({ "error": self.message })
        } else {
            json!({ "error": self.message, "issues": self.issues })
        };
        (self.status_code, Json(body)).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::new(rejection.status(), rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// JSON body extractor whose rejections render as `AppError` bodies.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor whose rejections render as `AppError` bodies.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Health check endpoint
async fn healthz() -> impl IntoResponse {
    "OK"
}

/// Create the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/policies/validate", post(routes::validate_policy))
        .route(
            "/api/v1/policies",
            get(routes::list_policies).post(routes::register_policy),
        )
        .route(
            "/api/v1/policies/:name",
            get(routes::get_policy).delete(routes::delete_policy),
        )
        .route("/api/v1/evaluate", post(routes::evaluate))
        .route("/api/v1/evaluate/batch", post(routes::evaluate_batch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
