//! HTTP route handlers for the Governance API

use std::sync::Arc;

use crate::{ApiJson, ApiQuery, AppError, AppResult, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use policy_schema::{PolicyDocument, ValidationReport};
use rules_engine::{EvaluationResult, Registration, Resource};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub resources: Vec<Resource>,
}

/// POST /api/v1/policies/validate - Validate a policy without registering it
pub async fn validate_policy(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ValidateQuery>,
    ApiJson(policy): ApiJson<Value>,
) -> Json<ValidationReport> {
    debug!("Handling POST /api/v1/policies/validate");
    let report = state
        .engine
        .validator()
        .validate(&policy, query.version.as_deref());
    Json(report)
}

/// GET /api/v1/policies - List registered policy names
pub async fn list_policies(State(state): State<AppState>) -> Json<Value> {
    let names = state.engine.policy_names();
    debug!("Listing {} policies", names.len());
    Json(json!({ "policies": names }))
}

/// POST /api/v1/policies - Register or replace a policy
///
/// Responds 201 for a new name and 200 when an existing policy was replaced.
pub async fn register_policy(
    State(state): State<AppState>,
    ApiJson(policy): ApiJson<Value>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let name = policy
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(String::from);

    let registration = state.engine.register_policy(policy)?;
    let name = name.unwrap_or_default();
    info!("Policy {} {:?}", name, registration);

    let status = match registration {
        Registration::Created => StatusCode::CREATED,
        Registration::Replaced => StatusCode::OK,
    };
    Ok((
        status,
        Json(json!({ "name": name, "registration": registration })),
    ))
}

/// GET /api/v1/policies/:name - Fetch a registered policy document
pub async fn get_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<PolicyDocument>> {
    match state.engine.policy(&name) {
        Some(policy) => Ok(Json(policy.document().clone())),
        None => {
            debug!("Policy not found: {}", name);
            Err(AppError::new(
                StatusCode::NOT_FOUND,
                format!("Policy not found: {}", name),
            ))
        }
    }
}

/// DELETE /api/v1/policies/:name - Unregister a policy
pub async fn delete_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    state.engine.unregister_policy(&name)?;
    info!("Unregistered policy {}", name);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/evaluate - Evaluate one resource
pub async fn evaluate(
    State(state): State<AppState>,
    ApiJson(resource): ApiJson<Resource>,
) -> AppResult<Json<EvaluationResult>> {
    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || engine.evaluate(&resource))
        .await
        .map_err(|e| {
            error!("Evaluation task failed: {}", e);
            AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Evaluation task failed: {}", e),
            )
        })?;
    Ok(Json(result))
}

/// POST /api/v1/evaluate/batch - Evaluate many resources concurrently
///
/// Results are returned in request order.
pub async fn evaluate_batch(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> AppResult<Json<Value>> {
    debug!("Evaluating batch of {} resources", request.resources.len());
    let results = Arc::clone(&state.engine)
        .evaluate_batch(request.resources)
        .await?;
    let failed = results.iter().filter(|r| !r.passed).count();
    Ok(Json(json!({
        "results": results,
        "summary": {
            "total": results.len(),
            "passed": results.len() - failed,
            "failed": failed,
        }
    })))
}
