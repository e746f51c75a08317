//! JSON REST API for Urbanwatch.
//!
//! Exposes an axum [`Router`] serving `/api/v1`, backed by any
//! [`IncidentStore`]. Callers authenticate with HTTP Basic credentials
//! checked against the identities in the store.

pub mod auth;
pub mod error;
pub mod handlers;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use urbanwatch_core::store::IncidentStore;

use handlers::{incidents, sync, users};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `URBANWATCH_*` environment variables. Every field has a default.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                    String,
  pub port:                    u16,
  pub store_path:              PathBuf,
  /// Let anonymous registrations ask for the admin role. Off in production.
  pub open_admin_registration: bool,
  /// Upper bound on request bodies, sync batches included.
  pub max_body_bytes:          usize,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                    "127.0.0.1".to_owned(),
      port:                    8000,
      store_path:              PathBuf::from("urbanwatch.db"),
      open_admin_registration: false,
      max_body_bytes:          2 * 1024 * 1024,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: IncidentStore> {
  pub store:  Arc<S>,
  pub config: Arc<ServerConfig>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application [`Router`] with every endpoint under `/api/v1`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: IncidentStore + Clone + 'static,
{
  let max_body_bytes = state.config.max_body_bytes;

  let api = Router::new()
    // Users
    .route("/users", get(users::list::<S>).post(users::register::<S>))
    .route("/users/me", get(users::me::<S>))
    .route(
      "/users/{id}",
      get(users::get_one::<S>)
        .put(users::replace::<S>)
        .patch(users::modify::<S>)
        .delete(users::delete_one::<S>),
    )
    // Incidents
    .route("/incidents", get(incidents::list::<S>).post(incidents::create::<S>))
    .route("/incidents/sync", post(sync::handler::<S>))
    .route(
      "/incidents/{id}",
      get(incidents::get_one::<S>)
        .put(incidents::replace::<S>)
        .patch(incidents::modify::<S>)
        .delete(incidents::delete_one::<S>),
    );

  Router::new()
    .nest("/api/v1", api)
    .layer(DefaultBodyLimit::max(max_body_bytes))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
