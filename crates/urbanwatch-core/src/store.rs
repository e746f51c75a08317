//! The `IncidentStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `urbanwatch-store-sqlite`). The reconciler and the HTTP layer depend on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  identity::{Identity, IdentityChanges, NewIdentity},
  incident::{Incident, IncidentChanges, IncidentQuery, NewIncident},
};

/// Errors raised by an [`IncidentStore`] backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The write collided with a value that must be unique, such as an
  /// idempotency key. Callers that check first can still lose a race to a
  /// concurrent writer.
  fn is_conflict(&self) -> bool {
    false
  }
}

impl StoreError for std::convert::Infallible {}

/// Abstraction over an Urbanwatch record store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait IncidentStore: Send + Sync {
  type Error: StoreError;

  // ── Identities ────────────────────────────────────────────────────────

  /// Persist a new identity. `id` and `date_joined` are set by the store.
  fn create_identity(
    &self,
    input: NewIdentity,
  ) -> impl Future<Output = Result<Identity, Self::Error>> + Send + '_;

  /// Retrieve an identity by UUID. Returns `None` if not found.
  fn get_identity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

  /// Look up an identity by username together with its stored password
  /// hash, for authentication.
  fn get_credentials(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<(Identity, String)>, Self::Error>>
  + Send
  + '_;

  fn list_identities(
    &self,
  ) -> impl Future<Output = Result<Vec<Identity>, Self::Error>> + Send + '_;

  /// Apply `changes` and return the updated identity, or `None` if `id` is
  /// unknown.
  fn update_identity(
    &self,
    id: Uuid,
    changes: IdentityChanges,
  ) -> impl Future<Output = Result<Option<Identity>, Self::Error>> + Send + '_;

  /// Delete an identity and every incident it owns. Returns `false` if `id`
  /// is unknown.
  fn delete_identity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Incidents ─────────────────────────────────────────────────────────

  /// Whether any incident carries the idempotency key `local_id`.
  fn local_id_exists(
    &self,
    local_id: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Persist a new incident owned by `owner`. Both timestamps are set by the
  /// store.
  fn create_incident(
    &self,
    input: NewIncident,
    owner: Uuid,
  ) -> impl Future<Output = Result<Incident, Self::Error>> + Send + '_;

  /// Like [`IncidentStore::create_incident`], but atomically does nothing
  /// and returns `None` when a record with the same non-blank idempotency
  /// key already exists.
  fn insert_incident_if_absent(
    &self,
    input: NewIncident,
    owner: Uuid,
  ) -> impl Future<Output = Result<Option<Incident>, Self::Error>> + Send + '_;

  fn get_incident(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Incident>, Self::Error>> + Send + '_;

  /// List incidents matching `query`, newest first.
  fn list_incidents(
    &self,
    query: IncidentQuery,
  ) -> impl Future<Output = Result<Vec<Incident>, Self::Error>> + Send + '_;

  /// Apply `changes`, refresh `updated_at`, and return the updated incident,
  /// or `None` if `id` is unknown. Setting a key another record already
  /// carries fails with an error whose [`StoreError::is_conflict`] is true.
  fn update_incident(
    &self,
    id: Uuid,
    changes: IncidentChanges,
  ) -> impl Future<Output = Result<Option<Incident>, Self::Error>> + Send + '_;

  /// Returns `false` if `id` is unknown.
  fn delete_incident(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
