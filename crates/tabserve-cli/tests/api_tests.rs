//! HTTP-level tests for tabserve-cli: the full route tree over artifacts
//! loaded from a temporary directory.
//!
//! Covers the three endpoints, authentication on every route, the uniform
//! error body, and response shape over generated payloads.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tabserve_cli::api::{api_routes, DEFAULT_MAX_BODY_BYTES};
use tabserve_cli::auth::AuthConfig;
use tabserve_core::{ArtifactPaths, ServingState};
use warp::http::StatusCode;

// =============================================================================
// Fixtures
// =============================================================================

fn forest_model() -> Value {
    json!({
        "format_version": 1,
        "kind": "random_forest",
        "classes": ["benign", "malignant"],
        "n_features": 5,
        "trees": [
            {"nodes": [
                {"feature": 0, "threshold": 16.0, "left": 1, "right": 2},
                {"value": [1.0, 0.0]},
                {"value": [0.0, 1.0]}
            ]},
            {"nodes": [
                {"feature": 2, "threshold": 900.0, "left": 1, "right": 2},
                {"value": [1.0, 0.0]},
                {"value": [0.0, 1.0]}
            ]}
        ]
    })
}

fn model_card() -> Value {
    json!({
        "name": "breast-cancer-forest",
        "framework": "scikit-learn",
        "target": "diagnosis",
        "model_type": "RandomForestClassifier",
        "metrics": {"accuracy": 0.95}
    })
}

fn load_state() -> Arc<ServingState> {
    load_state_with_card(&model_card())
}

fn load_state_with_card(card: &Value) -> Arc<ServingState> {
    let dir = tempfile::tempdir().unwrap();
    let paths = ArtifactPaths::in_dir(dir.path());
    std::fs::write(&paths.model, forest_model().to_string()).unwrap();
    std::fs::write(&paths.manifest, card.to_string()).unwrap();
    // Everything is read into memory at load time
    Arc::new(ServingState::load(&paths).unwrap())
}

fn row(radius: f64, area: f64) -> Value {
    json!({
        "radius_worst": radius,
        "perimeter_worst": 100.0,
        "area_worst": area,
        "concavity_worst": 0.2,
        "concave points_worst": 0.1
    })
}

async fn call(
    auth: AuthConfig,
    method: &str,
    path: &str,
    key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let routes = api_routes(load_state(), Arc::new(auth), DEFAULT_MAX_BODY_BYTES);
    let mut req = warp::test::request().method(method).path(path);
    if let Some(key) = key {
        req = req.header("X-API-KEY", key);
    }
    if let Some(body) = body {
        req = req.json(&body);
    }
    let res = req.reply(&routes).await;
    let body = serde_json::from_slice(res.body()).unwrap_or(Value::Null);
    (res.status(), body)
}

// =============================================================================
// Endpoints
// =============================================================================

#[tokio::test]
async fn health_reports_model() {
    let (status, body) = call(AuthConfig::disabled(), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["runtime"], "rust");
    assert_eq!(body["model_kind"], "random_forest");
    assert_eq!(body["model_format_version"], 1);
    assert!(body["model_path"].as_str().unwrap().ends_with("model.json"));
}

#[tokio::test]
async fn model_info_echoes_card() {
    let (status, body) = call(AuthConfig::disabled(), "GET", "/model-info", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_name"], "breast-cancer-forest");
    assert_eq!(body["model_type"], "RandomForestClassifier");
    assert_eq!(body["metrics"]["accuracy"], 0.95);
    assert!(body["features"].is_null());
    assert!(body["created_at"].is_null());
}

#[tokio::test]
async fn model_info_echoes_non_string_metadata() {
    let mut card = model_card();
    card["created_at"] = json!(1700000000);
    card["model_type"] = json!(["RandomForestClassifier", "calibrated"]);
    let routes = api_routes(
        load_state_with_card(&card),
        Arc::new(AuthConfig::disabled()),
        DEFAULT_MAX_BODY_BYTES,
    );
    let res = warp::test::request().path("/model-info").reply(&routes).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(body["created_at"], 1700000000);
    assert_eq!(body["model_type"], json!(["RandomForestClassifier", "calibrated"]));
}

#[tokio::test]
async fn predict_rejects_infinite_cells() {
    let mut bad = row(1.0, 1.0);
    bad["radius_worst"] = json!("inf");
    let (status, body) =
        call(AuthConfig::disabled(), "POST", "/predict", None, Some(json!([bad]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("radius_worst"));
}

#[tokio::test]
async fn predict_scores_rows_in_order() {
    let payload = json!([row(20.5, 1300.0), row(12.0, 1300.0), row(12.0, 500.0)]);
    let (status, body) =
        call(AuthConfig::disabled(), "POST", "/predict", None, Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let result = body["result"].as_array().unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result[0]["prediction"], "malignant");
    assert_eq!(result[0]["p1"], 1.0);
    // Tied vote goes to the first class
    assert_eq!(result[1]["prediction"], "benign");
    assert_eq!(result[1]["p1"], 0.5);
    assert_eq!(result[2]["prediction"], "benign");
    assert_eq!(result[2]["p1"], 0.0);
    assert_eq!(result[2]["area_worst"], 500.0);
}

#[tokio::test]
async fn predict_empty_list() {
    let (status, body) =
        call(AuthConfig::disabled(), "POST", "/predict", None, Some(json!([]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], json!([]));
}

#[tokio::test]
async fn predict_missing_columns() {
    let payload = json!([{"radius_worst": 20.5}]);
    let (status, body) =
        call(AuthConfig::disabled(), "POST", "/predict", None, Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("missing required columns"));
    assert!(error.contains("concave points_worst"));
}

#[tokio::test]
async fn predict_rejects_non_list() {
    let (status, body) =
        call(AuthConfig::disabled(), "POST", "/predict", None, Some(row(1.0, 1.0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "payload must be a list of objects");
}

#[tokio::test]
async fn predict_rejects_non_numeric_cell() {
    let mut bad = row(1.0, 1.0);
    bad["area_worst"] = json!("large");
    let (status, body) =
        call(AuthConfig::disabled(), "POST", "/predict", None, Some(json!([bad]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("area_worst"));
}

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn every_route_requires_key_when_configured() {
    for (method, path) in [("GET", "/health"), ("GET", "/model-info"), ("POST", "/predict")] {
        let body = (method == "POST").then(|| json!([row(1.0, 1.0)]));
        let auth = AuthConfig::with_api_key("s3cret".into());
        let (status, resp) = call(auth.clone(), method, path, None, body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {path}");
        assert_eq!(resp["error"], "invalid or missing API key");

        let (status, _) = call(auth.clone(), method, path, Some("wrong"), body.clone()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {path}");

        let (status, _) = call(auth, method, path, Some("s3cret"), body).await;
        assert_eq!(status, StatusCode::OK, "{method} {path}");
    }
}

#[tokio::test]
async fn no_key_needed_when_unconfigured() {
    let auth = AuthConfig::from_optional(Some(String::new()));
    let (status, _) = call(auth, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Routing errors
// =============================================================================

#[tokio::test]
async fn unknown_path_is_404() {
    let (status, body) = call(AuthConfig::disabled(), "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not found");
}

#[tokio::test]
async fn wrong_method_is_405() {
    let (status, body) = call(AuthConfig::disabled(), "POST", "/health", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["ok"], false);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn result_has_one_row_per_input(
        rows in proptest::collection::vec((0.0f64..40.0, 0.0f64..4000.0), 0..12)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let payload = Value::Array(rows.iter().map(|(r, a)| row(*r, *a)).collect());
        let (status, body) = runtime.block_on(call(
            AuthConfig::disabled(),
            "POST",
            "/predict",
            None,
            Some(payload),
        ));
        prop_assert_eq!(status, StatusCode::OK);
        let result = body["result"].as_array().unwrap();
        prop_assert_eq!(result.len(), rows.len());
        for out in result {
            let p1 = out["p1"].as_f64().unwrap();
            prop_assert!(p1 == 0.0 || p1 == 0.5 || p1 == 1.0);
        }
    }
}
