//! `POST /incidents/sync`: batch upload of incidents captured offline.
//!
//! The body must be a JSON array. The response is `201 Created` with the
//! records this batch created; with `?report=true` it is the full
//! [`SyncReport`](urbanwatch_core::reconcile::SyncReport), which also lists
//! skipped duplicates and rejected candidates.

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use urbanwatch_core::{reconcile::reconcile, store::IncidentStore};

use crate::{AppState, auth::CurrentIdentity, error::ApiError, handlers::JsonBody};

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
  #[serde(default)]
  pub report: bool,
}

pub async fn handler<S>(
  State(state): State<AppState<S>>,
  CurrentIdentity(caller): CurrentIdentity,
  Query(params): Query<SyncParams>,
  JsonBody(payload): JsonBody,
) -> Result<Response, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  let report = reconcile(state.store.as_ref(), &caller, payload).await?;

  if params.report {
    Ok((StatusCode::CREATED, Json(report)).into_response())
  } else {
    Ok((StatusCode::CREATED, Json(report.created)).into_response())
  }
}
