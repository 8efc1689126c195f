//! Error type for `roll-store-sqlite`.

use roll_core::{EntityId, record::ParentRef, store::StoreFailure};
use rusqlite::{ErrorCode, ffi};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] roll_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The `(user_id, parent_type, parent_id)` constraint rejected an insert.
  #[error("attendance already recorded for user {user_id} at {parent}")]
  Duplicate { user_id: EntityId, parent: ParentRef },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  fn sqlite_code(&self) -> Option<ErrorCode> {
    match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => e.sqlite_error_code(),
      _ => None,
    }
  }
}

impl StoreFailure for Error {
  fn is_conflict(&self) -> bool {
    match self {
      Self::Duplicate { .. } => true,
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => is_unique_violation(e),
      _ => false,
    }
  }

  fn is_transient(&self) -> bool {
    matches!(
      self.sqlite_code(),
      Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
  }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == ErrorCode::ConstraintViolation
        && e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

pub(crate) fn is_transient(err: &rusqlite::Error) -> bool {
  matches!(
    err.sqlite_error_code(),
    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
  )
}
