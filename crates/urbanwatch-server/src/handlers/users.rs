//! Handlers for `/users` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/users` | Registration; open to anyone |
//! | `GET`  | `/users/me` | The caller's own identity |
//! | `GET`  | `/users` | Admin only |
//! | `GET` `PUT` `PATCH` `DELETE` | `/users/{id}` | Admin only; 404 if not found |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use urbanwatch_core::{
  access,
  identity::{Identity, IdentityUpdate, Registration, Role},
  store::IncidentStore,
  validate::field_error,
};
use uuid::Uuid;

use crate::{
  AppState,
  auth::{CurrentIdentity, hash_password},
  error::ApiError,
  handlers::JsonBody,
};

const USERNAME_TAKEN: &str = "A user with that username already exists.";

/// Fail unless `username` is free or already belongs to `owner`.
async fn ensure_username_free<S>(
  store: &S,
  username: &str,
  owner: Option<Uuid>,
) -> Result<(), ApiError>
where
  S: IncidentStore,
{
  let holder = store
    .get_credentials(username.to_owned())
    .await
    .map_err(ApiError::store)?;
  match holder {
    Some((existing, _)) if Some(existing.id) != owner => {
      Err(field_error("username", "unique", USERNAME_TAKEN).into())
    }
    _ => Ok(()),
  }
}

// ─── Register ─────────────────────────────────────────────────────────────────

/// `POST /users`
///
/// The requested role is honoured only for admin callers or when the server
/// is configured for open admin registration; everyone else becomes a
/// citizen.
pub async fn register<S>(
  State(state): State<AppState<S>>,
  caller: Option<CurrentIdentity>,
  JsonBody(body): JsonBody,
) -> Result<impl IntoResponse, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  let mut registration = Registration::from_json(&body)?;

  let may_grant = state.config.open_admin_registration
    || caller.as_ref().is_some_and(|CurrentIdentity(c)| access::is_admin(c));
  if !may_grant {
    registration.role = Role::Citizen;
  }

  ensure_username_free(state.store.as_ref(), &registration.username, None).await?;

  let hash = hash_password(&registration.password)?;
  let identity = state
    .store
    .create_identity(registration.into_new_identity(hash))
    .await
    .map_err(ApiError::store)?;

  tracing::info!(id = %identity.id, username = %identity.username, role = %identity.role, "registered identity");
  Ok((StatusCode::CREATED, Json(identity)))
}

// ─── Me ───────────────────────────────────────────────────────────────────────

/// `GET /users/me`
pub async fn me<S>(CurrentIdentity(identity): CurrentIdentity) -> Json<Identity>
where
  S: IncidentStore + Clone + 'static,
{
  Json(identity)
}

// ─── Admin ────────────────────────────────────────────────────────────────────

/// `GET /users`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: CurrentIdentity,
) -> Result<Json<Vec<Identity>>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  caller.require_admin()?;
  let identities = state.store.list_identities().await.map_err(ApiError::store)?;
  Ok(Json(identities))
}

/// `GET /users/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  caller: CurrentIdentity,
  Path(id): Path<Uuid>,
) -> Result<Json<Identity>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  caller.require_admin()?;
  let identity = state
    .store
    .get_identity(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;
  Ok(Json(identity))
}

/// `PUT /users/{id}`
pub async fn replace<S>(
  State(state): State<AppState<S>>,
  caller: CurrentIdentity,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody,
) -> Result<Json<Identity>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  caller.require_admin()?;
  update(&state, id, IdentityUpdate::replacement(&body)?).await
}

/// `PATCH /users/{id}`
pub async fn modify<S>(
  State(state): State<AppState<S>>,
  caller: CurrentIdentity,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody,
) -> Result<Json<Identity>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  caller.require_admin()?;
  update(&state, id, IdentityUpdate::from_json(&body)?).await
}

async fn update<S>(
  state: &AppState<S>,
  id: Uuid,
  update: IdentityUpdate,
) -> Result<Json<Identity>, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  if let Some(username) = &update.username {
    ensure_username_free(state.store.as_ref(), username, Some(id)).await?;
  }

  let hash = update.password.as_deref().map(hash_password).transpose()?;
  let identity = state
    .store
    .update_identity(id, update.into_changes(hash))
    .await
    .map_err(ApiError::store)?
    .ok_or(ApiError::NotFound)?;

  tracing::info!(%id, role = %identity.role, "updated identity");
  Ok(Json(identity))
}

/// `DELETE /users/{id}`
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  caller: CurrentIdentity,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: IncidentStore + Clone + 'static,
{
  caller.require_admin()?;
  if !state.store.delete_identity(id).await.map_err(ApiError::store)? {
    return Err(ApiError::NotFound);
  }
  tracing::info!(%id, "deleted identity");
  Ok(StatusCode::NO_CONTENT)
}
