//! Error type for `cqv-store-sqlite`.

use cqv_core::store::StoreConflict;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum discriminant this build does not know.
  #[error("unknown {kind}: {value:?}")]
  UnknownValue { kind: &'static str, value: String },
}

impl StoreConflict for Error {
  fn is_conflict(&self) -> bool {
    matches!(
      self,
      Self::Database(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)))
        if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
