//! Error types for `roll-core`.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::{directory::DirectoryError, id::EntityId, record::ParentRef};

#[derive(Debug, Error)]
pub enum Error {
  #[error("user not found: {0}")]
  UserNotFound(EntityId),

  #[error("{0} not found")]
  ParentNotFound(ParentRef),

  #[error("attendance record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("attendance already recorded for user {user_id} at {parent}")]
  Conflict { user_id: EntityId, parent: ParentRef },

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("deadline of {0:?} exceeded")]
  DeadlineExceeded(Duration),

  #[error("directory lookup failed: {0}")]
  Directory(#[source] DirectoryError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification used by calling layers to pick a response without
/// matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  Conflict,
  InvalidArgument,
  DeadlineExceeded,
  Internal,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::UserNotFound(_) | Self::ParentNotFound(_) | Self::RecordNotFound(_) => {
        ErrorKind::NotFound
      }
      Self::Conflict { .. } => ErrorKind::Conflict,
      Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
      Self::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
      Self::Directory(_) | Self::Store(_) => ErrorKind::Internal,
    }
  }

  pub(crate) fn invalid(msg: impl Into<String>) -> Self {
    Self::InvalidArgument(msg.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
