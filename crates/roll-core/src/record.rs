//! The attendance record: one person's attendance at one occasion.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result, id::EntityId};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Whether and how a person attended.
///
/// No transition rules apply: any status may be updated to any other.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttendanceStatus {
  #[default]
  Present,
  Absent,
  Late,
  Excused,
}

impl AttendanceStatus {
  pub fn parse(raw: &str) -> Result<Self> {
    raw
      .parse()
      .map_err(|_| Error::invalid(format!("unknown attendance status: {raw:?}")))
  }

  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Parent ──────────────────────────────────────────────────────────────────

/// Which external directory an attendance parent lives in.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ParentType {
  Event,
  Meeting,
}

impl ParentType {
  pub fn parse(raw: &str) -> Result<Self> {
    raw
      .parse()
      .map_err(|_| Error::invalid(format!("unknown parent type: {raw:?}")))
  }

  pub fn as_str(self) -> &'static str { self.into() }
}

/// A tagged reference to the occasion an attendance record belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentRef {
  #[serde(rename = "type")]
  pub kind: ParentType,
  pub id:   EntityId,
}

impl ParentRef {
  pub fn new(kind: ParentType, id: EntityId) -> Self { Self { kind, id } }

  pub fn event(id: EntityId) -> Self { Self::new(ParentType::Event, id) }

  pub fn meeting(id: EntityId) -> Self { Self::new(ParentType::Meeting, id) }

  /// Build from the untyped pair an API layer typically receives.
  pub fn parse(kind: &str, id: &str) -> Result<Self> {
    Ok(Self::new(ParentType::parse(kind)?, EntityId::parse(id)?))
  }
}

impl fmt::Display for ParentRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.kind, self.id)
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A persisted attendance record.
///
/// `(user_id, parent)` is unique across the store. Only `status`, `notes` and
/// `question_id` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
  pub attendance_id:   Uuid,
  pub user_id:         EntityId,
  pub parent:          ParentRef,
  pub status:          AttendanceStatus,
  pub notes:           Option<String>,
  /// The user who recorded the entry; may differ from `user_id`.
  pub submitted_by:    EntityId,
  pub question_id:     Option<EntityId>,
  pub organization_id: Option<EntityId>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to `AttendanceWriter::create`. Ids and timestamps are assigned by the
/// writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttendance {
  pub user_id:         EntityId,
  pub parent:          ParentRef,
  /// Defaults to [`AttendanceStatus::Present`] when omitted.
  #[serde(default)]
  pub status:          Option<AttendanceStatus>,
  #[serde(default)]
  pub notes:           Option<String>,
  pub submitted_by:    EntityId,
  #[serde(default)]
  pub question_id:     Option<EntityId>,
  /// Used only when the resolved parent carries no organization of its own.
  #[serde(default)]
  pub organization_id: Option<EntityId>,
}

impl NewAttendance {
  /// Convenience constructor with all optional fields unset.
  pub fn new(user_id: EntityId, parent: ParentRef, submitted_by: EntityId) -> Self {
    Self {
      user_id,
      parent,
      status: None,
      notes: None,
      submitted_by,
      question_id: None,
      organization_id: None,
    }
  }

  pub fn with_status(mut self, status: AttendanceStatus) -> Self {
    self.status = Some(status);
    self
  }
}

/// The mutable subset of a record. Unset fields are left untouched.
///
/// `notes` and `question_id` distinguish "leave as is" (`None`) from "clear"
/// (`Some(None)`); in JSON an absent key leaves the field and an explicit
/// `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendancePatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status:      Option<AttendanceStatus>,
  #[serde(default, deserialize_with = "set_or_clear", skip_serializing_if = "Option::is_none")]
  pub notes:       Option<Option<String>>,
  #[serde(default, deserialize_with = "set_or_clear", skip_serializing_if = "Option::is_none")]
  pub question_id: Option<Option<EntityId>>,
}

impl AttendancePatch {
  pub fn is_empty(&self) -> bool {
    self.status.is_none() && self.notes.is_none() && self.question_id.is_none()
  }
}

/// A key that is present, even as `null`, becomes `Some`.
fn set_or_clear<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}
