//! Error taxonomy shared by the stores, the trigger evaluator, and the HTTP
//! boundary.
//!
//! Mapping to status codes:
//!   - Validation  -> 400 (malformed ids, wrong types, missing fields, bad enums)
//!   - NotFound    -> 404 (well-formed id, no such entity)
//!   - Conflict    -> 409 (duplicate unique key, e.g. (userId, metricId) pair)
//!   - Internal    -> 500 (engine safety guards, e.g. cyclic reward configs)
//!
//! Id well-formedness is always checked before existence, so a malformed id
//! can never surface as a 404.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  Validation(String),
  #[error("{0}")]
  NotFound(String),
  #[error("{0}")]
  Conflict(String),
  #[error("{0}")]
  Internal(String),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Validation(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Serialize)]
struct ErrorBody {
  message: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = ErrorBody {
      message: self.to_string(),
    };
    (status, Json(body)).into_response()
  }
}
