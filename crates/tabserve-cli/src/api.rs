//! REST API for model serving
//!
//! Three routes over the state loaded at startup:
//!
//! - `GET /health`: liveness plus version and model path
//! - `GET /model-info`: the model card, field by field
//! - `POST /predict`: score a JSON array of records

use crate::auth::{self, AuthConfig};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tabserve_core::{Classifier, PredictError, ServingState};
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Buf, Filter, Rejection, Reply};

/// Default request body limit for `/predict` (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

pub type SharedState = Arc<ServingState>;

// =============================================================================
// Request/Response types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: String,
    pub runtime: String,
    pub runtime_version: String,
    pub model_format_version: u32,
    pub model_kind: String,
    pub model_path: String,
}

/// Model card echo. Absent card fields serialize as `null`.
#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub ok: bool,
    pub model_name: Option<Value>,
    pub created_at: Option<Value>,
    pub framework: Option<Value>,
    pub sklearn_version_train: Option<Value>,
    pub python_version_train: Option<Value>,
    pub features: Option<Vec<String>>,
    pub target: Option<Value>,
    pub model_type: Option<Value>,
    pub model_params: Option<Value>,
    pub dataset: Option<Value>,
    pub metrics: Option<Value>,
    pub artifact_path: Option<Value>,
    pub dependencies: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub ok: bool,
    pub result: Vec<Map<String, Value>>,
}

// =============================================================================
// API Routes
// =============================================================================

/// Build the complete route tree, with rejections rendered as JSON.
pub fn api_routes(
    state: SharedState,
    auth_config: Arc<AuthConfig>,
    max_body_bytes: u64,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(auth::with_auth(auth_config.clone()))
        .and(with_state(state.clone()))
        .and_then(handle_health);

    let model_info = warp::path("model-info")
        .and(warp::path::end())
        .and(warp::get())
        .and(auth::with_auth(auth_config.clone()))
        .and(with_state(state.clone()))
        .and_then(handle_model_info);

    let predict = warp::path("predict")
        .and(warp::path::end())
        .and(warp::post())
        .and(auth::with_auth(auth_config))
        .and(limited_body(max_body_bytes))
        .and(with_state(state))
        .and_then(handle_predict);

    // CORS configuration for browser-based clients
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["content-type", "x-api-key"]);

    health
        .or(model_info)
        .or(predict)
        .recover(auth::handle_rejection)
        .with(cors)
}

// =============================================================================
// Filters
// =============================================================================

fn with_state(
    state: SharedState,
) -> impl Filter<Extract = (SharedState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Request body capped at `max_bytes`.
///
/// A declared `Content-Length` over the cap is refused up front; bodies
/// without one (chunked) are counted as they arrive.
fn limited_body(max_bytes: u64) -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(move |declared: Option<u64>| async move {
            match declared {
                Some(len) if len > max_bytes => Err(warp::reject::custom(BodyTooLarge)),
                _ => Ok(()),
            }
        })
        .untuple_one()
        .and(warp::body::stream())
        .and_then(move |stream| collect_body(stream, max_bytes))
}

async fn collect_body<S, B>(stream: S, max_bytes: u64) -> Result<Bytes, Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    let mut stream = Box::pin(stream);
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let mut chunk = chunk.map_err(|e| {
            warn!("Failed to read request body: {}", e);
            warp::reject::custom(BodyUnreadable)
        })?;
        while chunk.has_remaining() {
            let part = chunk.chunk();
            if (body.len() + part.len()) as u64 > max_bytes {
                return Err(warp::reject::custom(BodyTooLarge));
            }
            body.extend_from_slice(part);
            let n = part.len();
            chunk.advance(n);
        }
    }
    Ok(Bytes::from(body))
}

/// Request body over the configured limit
#[derive(Debug)]
pub struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

/// Request body stream failed mid-read
#[derive(Debug)]
pub struct BodyUnreadable;

impl warp::reject::Reject for BodyUnreadable {}

// =============================================================================
// Handlers
// =============================================================================

async fn handle_health(state: SharedState) -> Result<impl Reply, Infallible> {
    let resp = HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        runtime: "rust".to_string(),
        runtime_version: env!("TABSERVE_RUSTC_VERSION").to_string(),
        model_format_version: state.model().format_version,
        model_kind: state.model().kind().to_string(),
        model_path: state.model_path().display().to_string(),
    };
    Ok(warp::reply::with_status(warp::reply::json(&resp), StatusCode::OK))
}

async fn handle_model_info(state: SharedState) -> Result<impl Reply, Infallible> {
    let card = state.manifest().clone();
    let resp = ModelInfoResponse {
        ok: true,
        model_name: card.name,
        created_at: card.created_at,
        framework: card.framework,
        sklearn_version_train: card.sklearn_version,
        python_version_train: card.python_version,
        features: card.features,
        target: card.target,
        model_type: card.model_type,
        model_params: card.model_params,
        dataset: card.dataset,
        metrics: card.metrics,
        artifact_path: card.artifact_path,
        dependencies: card.dependencies,
    };
    Ok(warp::reply::with_status(warp::reply::json(&resp), StatusCode::OK))
}

async fn handle_predict(
    body: Bytes,
    state: SharedState,
) -> Result<impl Reply, Infallible> {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!("Rejected predict request: invalid JSON body: {}", e);
            return Ok(error_reply(
                StatusCode::BAD_REQUEST,
                &format!("invalid JSON body: {}", e),
            ));
        }
    };

    match state.predict_payload(&payload) {
        Ok(result) => {
            debug!(
                "Scored {} rows with {} model ({} classes)",
                result.len(),
                state.model().kind(),
                state.model().classes().len()
            );
            let resp = PredictResponse { ok: true, result };
            Ok(warp::reply::with_status(warp::reply::json(&resp), StatusCode::OK).into_response())
        }
        Err(e) => Ok(predict_error_response(e)),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Uniform `{ok: false, error}` reply with the given status.
pub fn error_reply(status: StatusCode, message: &str) -> warp::reply::Response {
    let body = ErrorBody {
        ok: false,
        error: message.to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

fn predict_error_response(err: PredictError) -> warp::reply::Response {
    let kind = match &err {
        PredictError::Validation(_) => "validation",
        PredictError::Inference(_) => "inference",
    };
    warn!("Rejected predict request ({}): {}", kind, err);
    // Both kinds stem from the caller's input
    error_reply(StatusCode::BAD_REQUEST, &err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tabserve_core::{Manifest, ModelArtifact};

    fn test_state() -> SharedState {
        let model = ModelArtifact::from_json(
            &json!({
                "format_version": 1,
                "kind": "decision_tree",
                "feature_names": ["a", "b"],
                "classes": [0, 1],
                "n_features": 2,
                "nodes": [
                    {"feature": 0, "threshold": 10.0, "left": 1, "right": 2},
                    {"value": [3.0, 1.0]},
                    {"value": [0.0, 4.0]}
                ]
            })
            .to_string(),
        )
        .unwrap();
        let manifest = Manifest {
            name: Some("toy-tree".into()),
            features: Some(vec!["a".into(), "b".into()]),
            ..Default::default()
        };
        Arc::new(ServingState::new(model, manifest, PathBuf::from("/models/model.json")).unwrap())
    }

    fn routes(
        auth: AuthConfig,
    ) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
        api_routes(test_state(), Arc::new(auth), 256)
    }

    fn json_body(body: &[u8]) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let res = warp::test::request()
            .path("/health")
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 200);
        let body = json_body(res.body());
        assert_eq!(body["ok"], true);
        assert_eq!(body["model_kind"], "decision_tree");
        assert_eq!(body["model_path"], "/models/model.json");
    }

    #[tokio::test]
    async fn test_model_info_nulls_absent_fields() {
        let res = warp::test::request()
            .path("/model-info")
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 200);
        let body = json_body(res.body());
        assert_eq!(body["model_name"], "toy-tree");
        assert_eq!(body["features"], json!(["a", "b"]));
        assert!(body["metrics"].is_null());
        assert!(body.as_object().unwrap().contains_key("sklearn_version_train"));
    }

    #[tokio::test]
    async fn test_predict() {
        let res = warp::test::request()
            .method("POST")
            .path("/predict")
            .json(&json!([{"a": 20, "b": 1}]))
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 200);
        let body = json_body(res.body());
        assert_eq!(body["result"][0]["prediction"], 1);
        assert_eq!(body["result"][0]["p1"], 1.0);
    }

    #[tokio::test]
    async fn test_predict_invalid_json() {
        let res = warp::test::request()
            .method("POST")
            .path("/predict")
            .body("[{")
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 400);
        let body = json_body(res.body());
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));
    }

    #[tokio::test]
    async fn test_predict_body_too_large() {
        let rows: Vec<Value> = (0..50).map(|i| json!({"a": i, "b": i})).collect();
        let res = warp::test::request()
            .method("POST")
            .path("/predict")
            .json(&rows)
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 413);
    }

    #[tokio::test]
    async fn test_predict_without_content_length_reaches_decoder() {
        let res = warp::test::request()
            .method("POST")
            .path("/predict")
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 400);
        let body = json_body(res.body());
        assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));
    }

    #[tokio::test]
    async fn test_body_limit_counts_received_bytes() {
        let rows: Vec<Value> = (0..50).map(|i| json!({"a": i, "b": i})).collect();
        let res = warp::test::request()
            .method("POST")
            .path("/predict")
            .json(&rows)
            .header("content-length", "10")
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 413);
        assert_eq!(json_body(res.body())["error"], "request payload too large");
    }

    #[tokio::test]
    async fn test_health_reports_runtime_version() {
        let res = warp::test::request()
            .path("/health")
            .reply(&routes(AuthConfig::disabled()))
            .await;
        let body = json_body(res.body());
        assert_eq!(body["runtime"], "rust");
        assert!(!body["runtime_version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auth_checked_before_body() {
        let res = warp::test::request()
            .method("POST")
            .path("/predict")
            .body("[{")
            .reply(&routes(AuthConfig::with_api_key("k".into())))
            .await;
        assert_eq!(res.status(), 401);
    }

    #[tokio::test]
    async fn test_unknown_route_and_wrong_method() {
        let res = warp::test::request()
            .path("/nope")
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 404);

        let res = warp::test::request()
            .method("GET")
            .path("/predict")
            .reply(&routes(AuthConfig::disabled()))
            .await;
        assert_eq!(res.status(), 405);
    }
}
