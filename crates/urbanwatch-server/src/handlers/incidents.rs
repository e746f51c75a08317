//! Handlers for `/incidents` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/incidents` | Own records, or all for admins; `?status=` and `?incident_type=` filters |
//! | `POST` | `/incidents` | Owner is always the caller |
//! | `GET` `PUT` `PATCH` `DELETE` | `/incidents/{id}` | Owner or admin; 404 otherwise |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use urbanwatch_core::{
  access,
  identity::Identity,
  incident::{
    Incident, IncidentChanges, IncidentQuery, IncidentStatus, IncidentType,
    NewIncident,
  },
  store::{IncidentStore, StoreError},
  validate::field_error,
};
use uuid::Uuid;

use crate::{AppState, auth::CurrentIdentity, error::ApiError, handlers::JsonBody};

const LOCAL_ID_TAKEN: &str = "incident with this local id already exists.";

fn local_id_taken() -> ApiError {
  field_error("local_id", "unique", LOCAL_ID_TAKEN).into()
}

/// A key collision that slipped past the existence check is still the
/// client's problem, not a server fault.
fn update_error(e: impl StoreError) -> ApiError {
  if e.is_conflict() {
    local_id_taken()
  } else {
    ApiError::store(e)
  }
}

/// Load `id` if `caller` may see it. Records outside the caller's scope are
/// indistinguishable from missing ones.
async fn visible_incident<S>(
  store: &S,
  caller: &Identity,
  id: Uuid,
) -> Result<Incident, ApiError>
where
  S: IncidentStore,
{
  store
    .get_incident(id)
    .await
    .map_err(ApiError::store)?
    .filter(|incident| access::can_access_incident(caller, incident))
    .ok_or(ApiError::NotFound)
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status:        Option<IncidentStatus>,
  pub incident_type: Option<IncidentType>,
}

/// `GET /incidents[?status=<status>][&incident_type=<type>]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  CurrentIdentity(caller): CurrentIdentity,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Incident>>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  let query = IncidentQuery {
    owner:         access::incident_scope(&caller),
    status:        params.status,
    incident_type: params.incident_type,
  };
  let incidents = state.store.list_incidents(query).await.map_err(ApiError::store)?;
  Ok(Json(incidents))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /incidents`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  CurrentIdentity(caller): CurrentIdentity,
  JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  let input = NewIncident::from_json(&body)?;

  let incident = if input.idempotency_key().is_some() {
    state
      .store
      .insert_incident_if_absent(input, caller.id)
      .await
      .map_err(ApiError::store)?
      .ok_or_else(local_id_taken)?
  } else {
    state
      .store
      .create_incident(input, caller.id)
      .await
      .map_err(ApiError::store)?
  };

  tracing::info!(id = %incident.id, owner = %caller.username, "created incident");
  Ok((StatusCode::CREATED, Json(incident)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /incidents/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  CurrentIdentity(caller): CurrentIdentity,
  Path(id): Path<Uuid>,
) -> Result<Json<Incident>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  let incident = visible_incident(state.store.as_ref(), &caller, id).await?;
  Ok(Json(incident))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PUT /incidents/{id}`: every required field must be supplied. Optional
/// fields the body leaves out keep their stored values.
pub async fn replace<S>(
  State(state): State<AppState<S>>,
  CurrentIdentity(caller): CurrentIdentity,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody,
) -> Result<Json<Incident>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  let changes = IncidentChanges::replacement(&body)?;
  update(&state, &caller, id, changes).await
}

/// `PATCH /incidents/{id}`: only the supplied fields change.
pub async fn modify<S>(
  State(state): State<AppState<S>>,
  CurrentIdentity(caller): CurrentIdentity,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody,
) -> Result<Json<Incident>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  let changes = IncidentChanges::from_json(&body)?;
  update(&state, &caller, id, changes).await
}

async fn update<S>(
  state: &AppState<S>,
  caller: &Identity,
  id: Uuid,
  changes: IncidentChanges,
) -> Result<Json<Incident>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  let current = visible_incident(state.store.as_ref(), caller, id).await?;

  if let Some(key) = changes.new_idempotency_key()
    && current.idempotency_key() != Some(key)
    && state
      .store
      .local_id_exists(key.to_owned())
      .await
      .map_err(ApiError::store)?
  {
    return Err(local_id_taken());
  }

  let incident = state
    .store
    .update_incident(id, changes)
    .await
    .map_err(update_error)?
    .ok_or(ApiError::NotFound)?;

  tracing::info!(%id, status = %incident.status, "updated incident");
  Ok(Json(incident))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /incidents/{id}`
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  CurrentIdentity(caller): CurrentIdentity,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  visible_incident(state.store.as_ref(), &caller, id).await?;
  if !state.store.delete_incident(id).await.map_err(ApiError::store)? {
    return Err(ApiError::NotFound);
  }
  tracing::info!(%id, "deleted incident");
  Ok(StatusCode::NO_CONTENT)
}
