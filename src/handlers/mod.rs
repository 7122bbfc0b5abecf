use actix_web::{web, HttpResponse};
use log::error;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::ApiError;

pub mod snippet_handler;
pub mod stats_handler;

/// Request bodies carry whole code files.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_BODY_BYTES)
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into())
}

/// Answers `OPTIONS` on any path, browser preflights included.
pub async fn preflight() -> HttpResponse {
    HttpResponse::Ok()
        .insert_header(("Access-Control-Allow-Origin", "*"))
        .insert_header(("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS"))
        .insert_header(("Access-Control-Allow-Headers", "Content-Type, X-Admin-Key"))
        .json(serde_json::json!({}))
}

pub async fn method_not_allowed() -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed)
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value).map_err(|err| {
        error!("serializing record failed: {err}");
        ApiError::Internal
    })
}

fn from_stored_json<T: DeserializeOwned>(content: &str, path: &str) -> Result<T, ApiError> {
    serde_json::from_str(content).map_err(|err| {
        error!("{path} holds malformed JSON: {err}");
        ApiError::Internal
    })
}
