//! Identifiers.
//!
//! Attendance records are keyed by server-assigned UUIDs. Everything an
//! attendance record points at (users, events, meetings, organizations,
//! questions) belongs to an external directory and is carried as an opaque
//! [`EntityId`].

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

const MAX_LEN: usize = 128;

/// An opaque reference into an external directory.
///
/// Well-formed ids are 1–128 characters drawn from `[A-Za-z0-9_.:-]`.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
  pub fn parse(raw: impl Into<String>) -> Result<Self> {
    let raw = raw.into();
    let well_formed = !raw.is_empty()
      && raw.len() <= MAX_LEN
      && raw
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'-'));
    if well_formed {
      Ok(Self(raw))
    } else {
      Err(Error::invalid(format!("malformed identifier: {raw:?}")))
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for EntityId {
  type Error = Error;

  fn try_from(raw: String) -> Result<Self> { Self::parse(raw) }
}

impl From<EntityId> for String {
  fn from(id: EntityId) -> Self { id.0 }
}

impl FromStr for EntityId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Parse a caller-supplied attendance record id.
pub fn parse_record_id(raw: &str) -> Result<Uuid> {
  Uuid::parse_str(raw.trim())
    .map_err(|_| Error::invalid(format!("malformed attendance id: {raw:?}")))
}
