//! Filters shared by listing, statistics and summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  id::EntityId,
  record::{AttendanceRecord, AttendanceStatus, ParentRef, ParentType},
};

// ─── Date range ──────────────────────────────────────────────────────────────

/// An inclusive range on `created_at`. Either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
  pub start: Option<DateTime<Utc>>,
  pub end:   Option<DateTime<Utc>>,
}

impl DateRange {
  pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
    let range = Self { start, end };
    range.validate()?;
    Ok(range)
  }

  pub fn unbounded() -> Self { Self::default() }

  pub fn validate(&self) -> Result<()> {
    match (self.start, self.end) {
      (Some(start), Some(end)) if end < start => Err(Error::InvalidArgument(
        format!("date range ends ({end}) before it starts ({start})"),
      )),
      _ => Ok(()),
    }
  }

  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
  }
}

// ─── Record filter ───────────────────────────────────────────────────────────

/// Conjunctive filter over attendance records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
  pub user_id:         Option<EntityId>,
  pub parent_id:       Option<EntityId>,
  pub parent_type:     Option<ParentType>,
  pub status:          Option<AttendanceStatus>,
  pub question_id:     Option<EntityId>,
  pub submitted_by:    Option<EntityId>,
  pub organization_id: Option<EntityId>,
  #[serde(default)]
  pub created:         DateRange,
}

impl RecordFilter {
  /// Everything recorded against one occasion.
  pub fn for_parent(parent: &ParentRef) -> Self {
    Self {
      parent_id: Some(parent.id.clone()),
      parent_type: Some(parent.kind),
      ..Default::default()
    }
  }

  /// Pin the filter to the caller's own records unless the caller is an
  /// administrator.
  pub fn restricted_to(mut self, caller: &CallerContext) -> Self {
    if !caller.is_admin {
      self.user_id = Some(caller.user_id.clone());
    }
    self
  }

  pub fn validate(&self) -> Result<()> { self.created.validate() }

  /// In-process evaluation of the filter; backends translate it to their own
  /// query language instead.
  pub fn matches(&self, record: &AttendanceRecord) -> bool {
    fn eq<T: PartialEq>(want: &Option<T>, have: &T) -> bool {
      want.as_ref().is_none_or(|w| w == have)
    }
    fn eq_opt<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
      want.is_none() || want == have
    }

    eq(&self.user_id, &record.user_id)
      && eq(&self.parent_id, &record.parent.id)
      && eq(&self.parent_type, &record.parent.kind)
      && eq(&self.status, &record.status)
      && eq_opt(&self.question_id, &record.question_id)
      && eq(&self.submitted_by, &record.submitted_by)
      && eq_opt(&self.organization_id, &record.organization_id)
      && self.created.contains(record.created_at)
  }
}

/// A filtered, paginated listing request as handed to a store. Results are
/// ordered by `created_at` descending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordQuery {
  pub filter: RecordFilter,
  pub skip:   usize,
  pub limit:  usize,
}

// ─── Caller ──────────────────────────────────────────────────────────────────

/// Identity of whoever invoked an operation, as established by the calling
/// layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
  pub user_id:  EntityId,
  pub is_admin: bool,
}
