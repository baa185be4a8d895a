//! Authentication module for the tabserve HTTP API
//!
//! A single optional shared secret, presented in the `X-API-KEY` header.

use std::sync::Arc;
use warp::Filter;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Message returned with every 401.
pub const UNAUTHORIZED_MESSAGE: &str = "invalid or missing API key";

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Whether authentication is enabled
    pub enabled: bool,
    /// The API key (if authentication is enabled)
    api_key: Option<String>,
}

impl AuthConfig {
    /// Create a new AuthConfig with authentication disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            api_key: None,
        }
    }

    /// Create a new AuthConfig with the given API key
    pub fn with_api_key(api_key: String) -> Self {
        Self {
            enabled: true,
            api_key: Some(api_key),
        }
    }

    /// Enable authentication only for a present, non-empty key
    pub fn from_optional(api_key: Option<String>) -> Self {
        match api_key {
            Some(key) if !key.is_empty() => Self::with_api_key(key),
            _ => Self::disabled(),
        }
    }

    /// Check if the provided key matches the configured API key
    pub fn validate_key(&self, provided_key: &str) -> bool {
        if !self.enabled {
            return true;
        }

        match &self.api_key {
            Some(key) => constant_time_compare(key, provided_key),
            None => false,
        }
    }

    /// Check if authentication is required
    pub fn is_required(&self) -> bool {
        self.enabled
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Constant-time string comparison to prevent timing attacks
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// Warp rejection for a missing or wrong API key
#[derive(Debug)]
pub struct Unauthorized;

impl warp::reject::Reject for Unauthorized {}

/// Warp filter enforcing the API key when one is configured.
///
/// Rejects with [`Unauthorized`] before any later filter (including body
/// extraction) runs.
pub fn with_auth(
    config: Arc<AuthConfig>,
) -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(API_KEY_HEADER)
        .and_then(move |provided: Option<String>| {
            let config = config.clone();
            async move {
                if !config.is_required() {
                    return Ok(());
                }

                match provided {
                    Some(key) if config.validate_key(&key) => Ok(()),
                    _ => Err(warp::reject::custom(Unauthorized)),
                }
            }
        })
        .untuple_one()
}

/// Turn every rejection into the uniform `{ok: false, error}` body
pub async fn handle_rejection(
    err: warp::Rejection,
) -> Result<impl warp::Reply, std::convert::Infallible> {
    use warp::http::StatusCode;

    let (code, message): (StatusCode, String) = if err.find::<Unauthorized>().is_some() {
        (StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE.into())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found".into())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".into())
    } else if err.find::<crate::api::BodyTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "request payload too large".into(),
        )
    } else if err.find::<crate::api::BodyUnreadable>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            "failed to read request body".into(),
        )
    } else if err.find::<warp::reject::InvalidHeader>().is_some() {
        (StatusCode::BAD_REQUEST, "invalid request header".into())
    } else {
        tracing::warn!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".into(),
        )
    };

    Ok(crate::api::error_reply(code, &message))
}
