//! HTTP endpoint tests driven through the router with `oneshot`.

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use governance_api::{create_app, AppState};
use rules_engine::{EngineConfig, RulesEngine};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

fn app() -> (AppState, Router) {
    let state = AppState::new(RulesEngine::new(EngineConfig::default()).unwrap());
    (state.clone(), create_app(state))
}

fn s3_policy() -> Value {
    json!({
        "apiVersion": "governance/v1.0.0",
        "kind": "Policy",
        "metadata": {
            "name": "s3-encryption",
            "version": "1.0.0",
            "description": "Buckets must be encrypted"
        },
        "spec": {
            "target": { "resourceType": "aws_s3_bucket" },
            "rules": [{
                "name": "encrypted",
                "condition": "$.encryption.enabled == true",
                "severity": "high",
                "message": "Must have encryption"
            }]
        }
    })
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn given_server_when_healthz_requested_then_returns_ok() -> Result<()> {
    let (_, app) = app();

    let response = app.oneshot(empty_request("GET", "/healthz")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&bytes[..], b"OK");
    Ok(())
}

#[tokio::test]
async fn given_valid_policy_when_validate_then_report_is_valid() -> Result<()> {
    let (state, app) = app();

    let response = app
        .oneshot(json_request("POST", "/api/v1/policies/validate", &s3_policy()))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await?;
    assert_eq!(report["valid"], true);
    assert!(state.engine.is_empty(), "validation must not register");
    Ok(())
}

#[tokio::test]
async fn given_mismatched_version_query_when_validate_then_report_is_invalid() -> Result<()> {
    let (_, app) = app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/policies/validate?version=v1.1.0",
            &s3_policy(),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await?;
    assert_eq!(report["valid"], false);
    Ok(())
}

#[tokio::test]
async fn given_new_policy_when_registered_twice_then_created_then_replaced() -> Result<()> {
    let (_, app) = app();

    let first = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/policies", &s3_policy()))
        .await?;
    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(body_json(first).await?["registration"], "created");

    let second = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/policies", &s3_policy()))
        .await?;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(second).await?["registration"], "replaced");

    let list = app.oneshot(empty_request("GET", "/api/v1/policies")).await?;
    assert_eq!(body_json(list).await?, json!({ "policies": ["s3-encryption"] }));
    Ok(())
}

#[tokio::test]
async fn given_invalid_policy_when_registered_then_unprocessable_with_issues() -> Result<()> {
    let (state, app) = app();
    let mut policy = s3_policy();
    policy["spec"]["rules"][0]["condition"] = json!("encryption == true");

    let response = app
        .oneshot(json_request("POST", "/api/v1/policies", &policy))
        .await?;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await?;
    let issues = body["issues"].as_array().unwrap();
    assert!(issues.iter().any(|i| i["message"]
        .as_str()
        .unwrap()
        .contains("Invalid JSONPath condition")));
    assert!(state.engine.is_empty());
    Ok(())
}

#[tokio::test]
async fn given_registered_policy_when_get_and_delete_then_lifecycle_completes() -> Result<()> {
    let (state, app) = app();
    state.engine.register_policy(s3_policy()).unwrap();

    let fetched = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/policies/s3-encryption"))
        .await?;
    assert_eq!(fetched.status(), StatusCode::OK);
    assert_eq!(body_json(fetched).await?["metadata"]["name"], "s3-encryption");

    let deleted = app
        .clone()
        .oneshot(empty_request("DELETE", "/api/v1/policies/s3-encryption"))
        .await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = app
        .clone()
        .oneshot(empty_request("GET", "/api/v1/policies/s3-encryption"))
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let delete_again = app
        .oneshot(empty_request("DELETE", "/api/v1/policies/s3-encryption"))
        .await?;
    assert_eq!(delete_again.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn given_violating_resource_when_evaluate_then_violation_returned() -> Result<()> {
    let (state, app) = app();
    state.engine.register_policy(s3_policy()).unwrap();

    let resource = json!({ "id": "bucket-1", "type": "aws_s3_bucket", "properties": {} });
    let response = app
        .oneshot(json_request("POST", "/api/v1/evaluate", &resource))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await?;
    assert_eq!(result["resourceId"], "bucket-1");
    assert_eq!(result["passed"], false);
    assert_eq!(result["violations"][0]["rule"], "encrypted");
    assert_eq!(result["violations"][0]["severity"], "high");
    Ok(())
}

#[tokio::test]
async fn given_batch_when_evaluate_then_results_in_request_order() -> Result<()> {
    let (state, app) = app();
    state.engine.register_policy(s3_policy()).unwrap();

    let resources: Vec<Value> = (0..40)
        .map(|i| {
            json!({
                "id": format!("bucket-{}", i),
                "type": "aws_s3_bucket",
                "properties": { "encryption": { "enabled": i % 4 != 0 } }
            })
        })
        .collect();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/evaluate/batch",
            &json!({ "resources": resources }),
        ))
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 40);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result["resourceId"], format!("bucket-{}", i));
    }
    assert_eq!(body["summary"]["failed"], 10);
    assert_eq!(body["summary"]["passed"], 30);
    Ok(())
}

#[tokio::test]
async fn given_resource_without_type_when_evaluate_then_json_error_body() -> Result<()> {
    let (_, app) = app();

    let response = app
        .oneshot(json_request("POST", "/api/v1/evaluate", &json!({ "id": "x" })))
        .await?;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await?;
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("type"), "{error}");
    Ok(())
}

#[tokio::test]
async fn given_malformed_json_when_register_then_bad_request_with_json_error() -> Result<()> {
    let (state, app) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/policies")
        .header("content-type", "application/json")
        .body(Body::from("{\"apiVersion\": "))
        .unwrap();

    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await?;
    assert!(body["error"].is_string());
    assert!(state.engine.is_empty());
    Ok(())
}

#[tokio::test]
async fn given_missing_content_type_when_validate_then_json_error_body() -> Result<()> {
    let (_, app) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/policies/validate")
        .body(Body::from(s3_policy().to_string()))
        .unwrap();

    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = body_json(response).await?;
    assert!(body["error"].is_string());
    Ok(())
}
