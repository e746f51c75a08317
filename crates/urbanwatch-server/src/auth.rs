//! HTTP Basic authentication against the identities in the store.
//!
//! Handlers take a [`CurrentIdentity`] to require a signed-in caller, or an
//! `Option<CurrentIdentity>` where anonymous access is allowed but supplied
//! credentials must still be valid.

use std::sync::LazyLock;

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::{
  extract::{FromRequestParts, OptionalFromRequestParts},
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use rand_core::OsRng;
use urbanwatch_core::{access, identity::Identity, store::IncidentStore};

use crate::{AppState, error::ApiError};

/// The authenticated caller.
pub struct CurrentIdentity(pub Identity);

impl CurrentIdentity {
  /// Fail with 403 unless the caller may manage other identities.
  pub fn require_admin(&self) -> Result<(), ApiError> {
    if access::can_manage_users(&self.0) { Ok(()) } else { Err(ApiError::Forbidden) }
  }
}

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Hash `password` into an argon2 PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}")))
}

/// Checked against when the username is unknown, so a miss costs the same
/// argon2 work as a wrong password and timing does not reveal which
/// usernames exist.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(b"urbanwatch-dummy-password", &salt)
    .map(|hash| hash.to_string())
    .unwrap_or_default()
});

fn verify_password(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc).is_ok_and(|parsed| {
    Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_ok()
  })
}

// ─── Verification ────────────────────────────────────────────────────────────

/// Decode a `Basic` authorization header into `(username, password)`.
fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), ApiError> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;
  Ok((username.to_owned(), password.to_owned()))
}

/// Resolve the identity named by the request's credentials.
pub async fn authenticate<S>(
  headers: &HeaderMap,
  store: &S,
) -> Result<Identity, ApiError>
where
  S: IncidentStore,
{
  let (username, password) = basic_credentials(headers)?;

  let Some((identity, phc)) = store
    .get_credentials(username)
    .await
    .map_err(ApiError::store)?
  else {
    verify_password(&password, &DUMMY_HASH);
    return Err(ApiError::Unauthorized);
  };

  if !verify_password(&password, &phc) {
    tracing::debug!(username = %identity.username, "rejected credentials");
    return Err(ApiError::Unauthorized);
  }
  Ok(identity)
}

impl<S> FromRequestParts<AppState<S>> for CurrentIdentity
where
  S: IncidentStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    Ok(Self(authenticate(&parts.headers, state.store.as_ref()).await?))
  }
}

impl<S> OptionalFromRequestParts<AppState<S>> for CurrentIdentity
where
  S: IncidentStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Option<Self>, Self::Rejection> {
    if !parts.headers.contains_key(header::AUTHORIZATION) {
      return Ok(None);
    }
    let identity = authenticate(&parts.headers, state.store.as_ref()).await?;
    Ok(Some(Self(identity)))
  }
}
