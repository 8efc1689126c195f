//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed microsecond
//! width, so string comparison and `substr(created_at, 1, 10)` agree with
//! chronological order and the UTC calendar date. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use roll_core::{
  EntityId,
  query::RecordFilter,
  record::{AttendanceRecord, AttendanceStatus, ParentRef, ParentType},
};
use rusqlite::types::Value;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_day(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A record flattened into the column values written by `INSERT`.
pub struct EncodedRecord {
  pub attendance_id:   String,
  pub user_id:         String,
  pub parent_id:       String,
  pub parent_type:     &'static str,
  pub status:          &'static str,
  pub notes:           Option<String>,
  pub submitted_by:    String,
  pub question_id:     Option<String>,
  pub organization_id: Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl From<&AttendanceRecord> for EncodedRecord {
  fn from(r: &AttendanceRecord) -> Self {
    Self {
      attendance_id:   encode_uuid(r.attendance_id),
      user_id:         r.user_id.to_string(),
      parent_id:       r.parent.id.to_string(),
      parent_type:     r.parent.kind.as_str(),
      status:          r.status.as_str(),
      notes:           r.notes.clone(),
      submitted_by:    r.submitted_by.to_string(),
      question_id:     r.question_id.as_ref().map(EntityId::to_string),
      organization_id: r.organization_id.as_ref().map(EntityId::to_string),
      created_at:      encode_dt(r.created_at),
      updated_at:      encode_dt(r.updated_at),
    }
  }
}

impl EncodedRecord {
  pub fn insert(&self, stmt: &mut rusqlite::CachedStatement<'_>) -> rusqlite::Result<usize> {
    stmt.execute(rusqlite::params![
      self.attendance_id,
      self.user_id,
      self.parent_id,
      self.parent_type,
      self.status,
      self.notes,
      self.submitted_by,
      self.question_id,
      self.organization_id,
      self.created_at,
      self.updated_at,
    ])
  }
}

/// Raw strings read directly from an `attendance` row, in
/// [`RECORD_COLUMNS`](crate::schema::RECORD_COLUMNS) order.
pub struct RawRecord {
  pub attendance_id:   String,
  pub user_id:         String,
  pub parent_id:       String,
  pub parent_type:     String,
  pub status:          String,
  pub notes:           Option<String>,
  pub submitted_by:    String,
  pub question_id:     Option<String>,
  pub organization_id: Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      attendance_id:   row.get(0)?,
      user_id:         row.get(1)?,
      parent_id:       row.get(2)?,
      parent_type:     row.get(3)?,
      status:          row.get(4)?,
      notes:           row.get(5)?,
      submitted_by:    row.get(6)?,
      question_id:     row.get(7)?,
      organization_id: row.get(8)?,
      created_at:      row.get(9)?,
      updated_at:      row.get(10)?,
    })
  }

  pub fn into_record(self) -> Result<AttendanceRecord> {
    Ok(AttendanceRecord {
      attendance_id:   decode_uuid(&self.attendance_id)?,
      user_id:         EntityId::parse(self.user_id)?,
      parent:          ParentRef::new(
        ParentType::parse(&self.parent_type)?,
        EntityId::parse(self.parent_id)?,
      ),
      status:          AttendanceStatus::parse(&self.status)?,
      notes:           self.notes,
      submitted_by:    EntityId::parse(self.submitted_by)?,
      question_id:     self.question_id.map(EntityId::parse).transpose()?,
      organization_id: self.organization_id.map(EntityId::parse).transpose()?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Translate a [`RecordFilter`] into a `WHERE` clause with positional `?`
/// placeholders and the values bound to them, in order.
pub fn where_clause(filter: &RecordFilter) -> (String, Vec<Value>) {
  let mut conds: Vec<&'static str> = vec![];
  let mut values: Vec<Value> = vec![];

  let mut push = |cond: &'static str, value: String| {
    conds.push(cond);
    values.push(Value::Text(value));
  };

  if let Some(v) = &filter.user_id {
    push("user_id = ?", v.to_string());
  }
  if let Some(v) = &filter.parent_id {
    push("parent_id = ?", v.to_string());
  }
  if let Some(v) = filter.parent_type {
    push("parent_type = ?", v.as_str().to_owned());
  }
  if let Some(v) = filter.status {
    push("status = ?", v.as_str().to_owned());
  }
  if let Some(v) = &filter.question_id {
    push("question_id = ?", v.to_string());
  }
  if let Some(v) = &filter.submitted_by {
    push("submitted_by = ?", v.to_string());
  }
  if let Some(v) = &filter.organization_id {
    push("organization_id = ?", v.to_string());
  }
  if let Some(start) = filter.created.start {
    push("created_at >= ?", encode_dt(start));
  }
  if let Some(end) = filter.created.end {
    push("created_at <= ?", encode_dt(end));
  }

  let clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };
  (clause, values)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_have_fixed_width() {
    let whole = Utc.with_ymd_and_hms(2023, 1, 5, 9, 0, 0).unwrap();
    let frac = whole + chrono::Duration::microseconds(1);
    assert_eq!(encode_dt(whole), "2023-01-05T09:00:00.000000Z");
    assert!(encode_dt(whole) < encode_dt(frac));
    assert_eq!(decode_dt(&encode_dt(frac)).unwrap(), frac);
    assert_eq!(&encode_dt(whole)[..10], "2023-01-05");
  }

  #[test]
  fn empty_filter_has_no_where() {
    let (clause, values) = where_clause(&RecordFilter::default());
    assert!(clause.is_empty());
    assert!(values.is_empty());
  }

  #[test]
  fn filter_binds_in_order() {
    let filter = RecordFilter {
      parent_id: Some(EntityId::parse("7").unwrap()),
      parent_type: Some(ParentType::Event),
      status: Some(AttendanceStatus::Late),
      ..Default::default()
    };
    let (clause, values) = where_clause(&filter);
    assert_eq!(clause, "WHERE parent_id = ? AND parent_type = ? AND status = ?");
    assert_eq!(
      values,
      vec![
        Value::Text("7".into()),
        Value::Text("event".into()),
        Value::Text("late".into()),
      ]
    );
  }
}
