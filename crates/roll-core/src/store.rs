//! The `AttendanceStore` trait.
//!
//! Implemented by storage backends (e.g. `roll-store-sqlite`). The engine
//! components depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  id::EntityId,
  query::{RecordFilter, RecordQuery},
  record::{AttendancePatch, AttendanceRecord, ParentRef},
  report::{DailyCounts, StatusCounts},
};

/// Classification every backend error must offer so the engine can tell
/// uniqueness violations and retryable contention apart from hard failures.
pub trait StoreFailure: std::error::Error + Send + Sync + 'static {
  /// The write collided with the `(user_id, parent)` uniqueness constraint.
  fn is_conflict(&self) -> bool;

  /// The failure is transient contention (busy or locked database) and the
  /// same write may succeed if retried.
  fn is_transient(&self) -> bool;
}

/// Per-row result of [`AttendanceStore::insert_many`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowWrite {
  Inserted,
  /// Rejected by the uniqueness constraint.
  Duplicate,
  Failed { transient: bool, reason: String },
}

/// Abstraction over an attendance store backend.
///
/// Backends must enforce uniqueness of `(user_id, parent.kind, parent.id)`
/// themselves; a concurrent second insert of the same key must fail with an
/// error for which [`StoreFailure::is_conflict`] is `true`.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait AttendanceStore: Send + Sync {
  type Error: StoreFailure;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a fully-built record.
  fn insert(
    &self,
    record: AttendanceRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Persist each record independently, without one lock spanning the batch.
  /// Returns one [`RowWrite`] per input, in input order. Fails as a whole only
  /// when the batch cannot be attempted at all.
  fn insert_many(
    &self,
    records: Vec<AttendanceRecord>,
  ) -> impl Future<Output = Result<Vec<RowWrite>, Self::Error>> + Send + '_;

  /// Apply `patch` and set `updated_at`. Returns `None` if `id` is unknown.
  fn update(
    &self,
    id: Uuid,
    patch: AttendancePatch,
    updated_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<AttendanceRecord>, Self::Error>> + Send + '_;

  /// Remove a record. Returns the removed record, or `None` if `id` is unknown.
  fn delete(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AttendanceRecord>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AttendanceRecord>, Self::Error>> + Send + '_;

  fn find_by_key(
    &self,
    user_id: EntityId,
    parent: ParentRef,
  ) -> impl Future<Output = Result<Option<AttendanceRecord>, Self::Error>> + Send + '_;

  /// Records matching `query.filter`, newest first, after skipping
  /// `query.skip` and returning at most `query.limit`.
  fn list(
    &self,
    query: RecordQuery,
  ) -> impl Future<Output = Result<Vec<AttendanceRecord>, Self::Error>> + Send + '_;

  // ── Aggregates ────────────────────────────────────────────────────────

  /// Records matching `filter`, grouped by status.
  fn status_counts(
    &self,
    filter: RecordFilter,
  ) -> impl Future<Output = Result<StatusCounts, Self::Error>> + Send + '_;

  /// Records matching `filter`, grouped by the UTC calendar day of
  /// `created_at` and then by status. Days are ascending; days with no
  /// records are absent.
  fn daily_counts(
    &self,
    filter: RecordFilter,
  ) -> impl Future<Output = Result<Vec<DailyCounts>, Self::Error>> + Send + '_;

  /// Users holding a `present` record against `parent`.
  fn present_user_ids(
    &self,
    parent: ParentRef,
  ) -> impl Future<Output = Result<Vec<EntityId>, Self::Error>> + Send + '_;
}
