pub mod incidents;
pub mod sync;
pub mod users;

use axum::{
  Json,
  extract::{FromRequest, Request, rejection::JsonRejection},
  http::StatusCode,
};
use serde_json::Value;

use crate::error::ApiError;

/// An untyped JSON request body. Field-level checking happens in the
/// domain validators, so only malformed JSON is rejected here.
pub struct JsonBody(pub Value);

impl<S> FromRequest<S> for JsonBody
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    match Json::<Value>::from_request(req, state).await {
      Ok(Json(value)) => Ok(Self(value)),
      Err(rejection) => Err(reject(rejection)),
    }
  }
}

fn reject(rejection: JsonRejection) -> ApiError {
  if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
    ApiError::PayloadTooLarge
  } else {
    ApiError::BadRequest(rejection.body_text())
  }
}
