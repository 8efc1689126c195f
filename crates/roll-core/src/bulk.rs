//! Inputs and itemised results for bulk attendance ingestion.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  id::EntityId,
  record::{AttendanceRecord, AttendanceStatus},
};

/// One row of a bulk submission. The parent, submitter and organization are
/// shared by the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItem {
  pub user_id:     EntityId,
  #[serde(default)]
  pub status:      Option<AttendanceStatus>,
  #[serde(default)]
  pub notes:       Option<String>,
  #[serde(default)]
  pub question_id: Option<EntityId>,
}

impl BulkItem {
  pub fn new(user_id: EntityId) -> Self {
    Self { user_id, status: None, notes: None, question_id: None }
  }
}

/// Why a bulk item was neither inserted nor recognised as a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ItemFailure {
  UserNotFound,
  /// The user directory could not be consulted.
  Lookup(String),
  /// The store rejected the row for a reason other than uniqueness.
  Store(String),
}

/// What happened to one bulk item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkOutcome {
  Inserted {
    attendance_id: Uuid,
  },
  /// A record for the same user and parent already exists, or the user
  /// appears earlier in the same batch.
  SkippedDuplicate {
    existing: Option<Uuid>,
  },
  Failed {
    reason: ItemFailure,
  },
}

/// The outcome for the item at `index` in the submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemReport {
  pub index:   usize,
  pub user_id: EntityId,
  #[serde(flatten)]
  pub outcome: BulkOutcome,
}

/// Result of `AttendanceWriter::bulk_create`.
///
/// `inserted` holds exactly the records that were written; `items` has one
/// entry per submitted item, in submission order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkReport {
  pub inserted: Vec<AttendanceRecord>,
  pub items:    Vec<BulkItemReport>,
}

impl BulkReport {
  pub fn inserted_count(&self) -> usize { self.inserted.len() }

  pub fn skipped_count(&self) -> usize {
    self
      .items
      .iter()
      .filter(|i| matches!(i.outcome, BulkOutcome::SkippedDuplicate { .. }))
      .count()
  }

  pub fn failed_count(&self) -> usize {
    self
      .items
      .iter()
      .filter(|i| matches!(i.outcome, BulkOutcome::Failed { .. }))
      .count()
  }
}
