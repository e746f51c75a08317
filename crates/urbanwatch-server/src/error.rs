//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use urbanwatch_core::validate::ValidationErrors;

/// An error returned by an API handler or extractor.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found")]
  NotFound,

  #[error("bad request: {0}")]
  BadRequest(String),

  /// Per-field validation messages; rendered as the bare field map.
  #[error("invalid input: {0}")]
  Validation(#[from] ValidationErrors),

  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden")]
  Forbidden,

  #[error("request body too large")]
  PayloadTooLarge,

  #[error("internal error: {0}")]
  Internal(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

impl From<urbanwatch_core::Error> for ApiError {
  fn from(e: urbanwatch_core::Error) -> Self {
    use urbanwatch_core::Error;
    match e {
      Error::InvalidBatchShape => {
        Self::BadRequest(Error::InvalidBatchShape.to_string())
      }
      Error::Store(source) => Self::Store(source),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match self {
      ApiError::Validation(errors) => {
        return (StatusCode::BAD_REQUEST, Json(errors)).into_response();
      }
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "Authentication credentials were not provided or are invalid." })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"urbanwatch\""),
        );
        return res;
      }
      ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found.".to_owned()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
      ApiError::Forbidden => (
        StatusCode::FORBIDDEN,
        "You do not have permission to perform this action.".to_owned(),
      ),
      ApiError::PayloadTooLarge => {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large.".to_owned())
      }
      ApiError::Internal(m) => {
        tracing::error!(error = %m, "internal error");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.".to_owned())
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store error");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
