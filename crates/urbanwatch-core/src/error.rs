//! Error types for `urbanwatch-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A sync payload that is not a JSON array.
  #[error("Expected a list of incidents")]
  InvalidBatchShape,

  /// A failure inside an [`IncidentStore`](crate::store::IncidentStore)
  /// backend, type-erased so callers need not know the backend.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
