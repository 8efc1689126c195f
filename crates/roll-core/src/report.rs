//! Aggregate report types: per-status counts, present rate, and time-bucketed
//! summaries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{Error, Result, record::AttendanceStatus};

// ─── Counts ──────────────────────────────────────────────────────────────────

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
  pub present: u64,
  pub absent:  u64,
  pub late:    u64,
  pub excused: u64,
}

impl StatusCounts {
  pub fn add(&mut self, status: AttendanceStatus, n: u64) {
    match status {
      AttendanceStatus::Present => self.present += n,
      AttendanceStatus::Absent => self.absent += n,
      AttendanceStatus::Late => self.late += n,
      AttendanceStatus::Excused => self.excused += n,
    }
  }

  pub fn merge(&mut self, other: &Self) {
    self.present += other.present;
    self.absent += other.absent;
    self.late += other.late;
    self.excused += other.excused;
  }

  pub fn total(&self) -> u64 { self.present + self.absent + self.late + self.excused }
}

/// `present / total * 100`, rounded to two decimals; `0.0` for an empty set.
pub fn present_rate(present: u64, total: u64) -> f64 {
  if total == 0 {
    return 0.0;
  }
  let pct = present as f64 / total as f64 * 100.0;
  (pct * 100.0).round() / 100.0
}

/// Totals and present rate over a filtered record set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceStats {
  pub total:      u64,
  pub present:    u64,
  pub absent:     u64,
  pub late:       u64,
  pub excused:    u64,
  pub percentage: f64,
}

impl From<StatusCounts> for AttendanceStats {
  fn from(c: StatusCounts) -> Self {
    let total = c.total();
    Self {
      total,
      present: c.present,
      absent: c.absent,
      late: c.late,
      excused: c.excused,
      percentage: present_rate(c.present, total),
    }
  }
}

// ─── Periods ─────────────────────────────────────────────────────────────────

/// Granularity of a summary.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Period {
  #[default]
  Daily,
  Weekly,
  Monthly,
}

impl Period {
  pub fn parse(raw: &str) -> Result<Self> {
    raw.parse().map_err(|_| {
      Error::InvalidArgument(format!(
        "period must be daily, weekly or monthly, got {raw:?}"
      ))
    })
  }

  /// The bucket a calendar day falls into.
  ///
  /// - daily: `YYYY-MM-DD`
  /// - weekly: `YYYY-Www`, Sunday-based week of year; days before the first
  ///   Sunday of the year are week `00`
  /// - monthly: `YYYY-MM`
  ///
  /// Keys within one period sort chronologically as plain strings.
  pub fn bucket_key(self, day: NaiveDate) -> String {
    match self {
      Self::Daily => day.format("%Y-%m-%d").to_string(),
      Self::Weekly => day.format("%Y-W%U").to_string(),
      Self::Monthly => day.format("%Y-%m").to_string(),
    }
  }
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Status counts for every record created on one UTC calendar day. Stores
/// produce these; the summary engine rolls them up into period buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCounts {
  pub day:    NaiveDate,
  pub counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryBucket {
  pub bucket_key: String,
  #[serde(flatten)]
  pub stats:      AttendanceStats,
}

/// Time-bucketed attendance. Buckets are in ascending key order and only
/// buckets containing at least one record are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
  pub period:  Period,
  pub buckets: Vec<SummaryBucket>,
  /// Statistics over the union of all buckets.
  pub overall: AttendanceStats,
}
