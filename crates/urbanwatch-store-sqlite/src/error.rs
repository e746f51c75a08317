//! Error type for `urbanwatch-store-sqlite`.

use thiserror::Error;
use urbanwatch_core::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored tag column held a value no enum variant matches.
  #[error("unknown {column} value: {value:?}")]
  UnknownTag { column: &'static str, value: String },

  /// A row that was just written could not be read back.
  #[error("record {0} vanished after write")]
  Vanished(uuid::Uuid),
}

impl StoreError for Error {
  fn is_conflict(&self) -> bool {
    matches!(
      self,
      Self::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)))
        if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
