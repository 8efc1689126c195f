//! Creation, update and removal of attendance records.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, DurationRound as _, TimeDelta, Utc};
use roll_core::{
  EntityId, Error, Result,
  bulk::{BulkItem, BulkItemReport, BulkOutcome, BulkReport, ItemFailure},
  directory::{ParentDirectories, UserDirectory},
  record::{AttendancePatch, AttendanceRecord, NewAttendance, ParentRef},
  store::{AttendanceStore, RowWrite, StoreFailure},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{config::RetryPolicy, retry::retry_transient, store_error};

/// Validates and persists attendance records.
///
/// Existence of users and parents is checked through the directories before
/// anything is written. Uniqueness of `(user, parent)` is checked up front
/// for a clean error, but the store's own constraint is what decides a race.
pub struct AttendanceWriter<S> {
  store:   Arc<S>,
  users:   Arc<dyn UserDirectory>,
  parents: ParentDirectories,
  retry:   RetryPolicy,
}

impl<S: AttendanceStore> AttendanceWriter<S> {
  pub fn new(
    store: Arc<S>,
    users: Arc<dyn UserDirectory>,
    parents: ParentDirectories,
    retry: RetryPolicy,
  ) -> Self {
    Self { store, users, parents, retry }
  }

  // ─── Single writes ─────────────────────────────────────────────────────────

  /// Record one user's attendance at one parent.
  ///
  /// Fails with `InvalidArgument` for an unsupported parent type,
  /// `NotFound` when the parent or user does not exist and `Conflict` when a
  /// record for the pair already exists. Nothing is written on failure.
  pub async fn create(&self, input: NewAttendance) -> Result<AttendanceRecord> {
    let NewAttendance {
      user_id,
      parent,
      status,
      notes,
      submitted_by,
      question_id,
      organization_id,
    } = input;

    let parent_info = self.parents.require(&parent).await?;
    self.require_user(&user_id).await?;

    if let Some(existing) = self
      .store
      .find_by_key(user_id.clone(), parent.clone())
      .await
      .map_err(store_error)?
    {
      debug!(
        attendance_id = %existing.attendance_id,
        user_id = %user_id,
        parent = %parent,
        "attendance already recorded"
      );
      return Err(Error::Conflict { user_id, parent });
    }

    let now = now_micros();
    let record = AttendanceRecord {
      attendance_id: Uuid::new_v4(),
      user_id,
      parent,
      status: status.unwrap_or_default(),
      notes,
      submitted_by,
      question_id,
      organization_id: parent_info.organization_id.or(organization_id),
      created_at: now,
      updated_at: now,
    };

    let store = &*self.store;
    retry_transient(&self.retry, "create", || store.insert(record.clone()))
      .await
      .map_err(|e| write_error(e, &record))?;

    info!(
      attendance_id = %record.attendance_id,
      user_id = %record.user_id,
      parent = %record.parent,
      status = %record.status,
      "attendance recorded"
    );
    Ok(record)
  }

  /// Change the mutable fields of a record. An empty patch returns the record
  /// as stored without touching `updated_at`.
  pub async fn update(&self, id: Uuid, patch: AttendancePatch) -> Result<AttendanceRecord> {
    if patch.is_empty() {
      return self
        .store
        .get(id)
        .await
        .map_err(store_error)?
        .ok_or(Error::RecordNotFound(id));
    }

    let now = now_micros();
    let store = &*self.store;
    let record = retry_transient(&self.retry, "update", || store.update(id, patch.clone(), now))
      .await
      .map_err(store_error)?
      .ok_or(Error::RecordNotFound(id))?;

    info!(attendance_id = %id, status = %record.status, "attendance updated");
    Ok(record)
  }

  /// Remove a record outright and return it.
  pub async fn delete(&self, id: Uuid) -> Result<AttendanceRecord> {
    let store = &*self.store;
    let record = retry_transient(&self.retry, "delete", || store.delete(id))
      .await
      .map_err(store_error)?
      .ok_or(Error::RecordNotFound(id))?;

    info!(
      attendance_id = %id,
      user_id = %record.user_id,
      parent = %record.parent,
      status = %record.status,
      "attendance deleted"
    );
    Ok(record)
  }

  // ─── Bulk ──────────────────────────────────────────────────────────────────

  /// Record attendance for many users at one parent.
  ///
  /// The parent is resolved once for the whole batch; a missing parent, an
  /// unsupported parent type or an `organization_id` that disagrees with the
  /// parent's own fails the call. After that every item stands alone: users
  /// already recorded (or repeated within the batch) are skipped, unknown
  /// users and rejected rows are reported as failed, and the rest are
  /// inserted. The report lists exactly the records written.
  pub async fn bulk_create(
    &self,
    parent: ParentRef,
    items: Vec<BulkItem>,
    submitted_by: EntityId,
    organization_id: Option<EntityId>,
  ) -> Result<BulkReport> {
    let parent_info = self.parents.require(&parent).await?;
    let organization_id = match (organization_id, parent_info.organization_id) {
      (Some(given), Some(owner)) if given != owner => {
        return Err(Error::InvalidArgument(format!(
          "{parent} belongs to organization {owner}, not {given}"
        )));
      }
      (given, owner) => owner.or(given),
    };

    let now = now_micros();
    let mut outcomes: Vec<Option<BulkOutcome>> = vec![None; items.len()];
    let mut pending: Vec<(usize, AttendanceRecord)> = Vec::new();
    let mut seen = HashSet::new();

    for (index, item) in items.iter().enumerate() {
      if !seen.insert(&item.user_id) {
        warn!(user_id = %item.user_id, parent = %parent, index, "user repeated in batch; skipping");
        outcomes[index] = Some(BulkOutcome::SkippedDuplicate { existing: None });
        continue;
      }

      match self.users.resolve(&item.user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
          warn!(user_id = %item.user_id, index, "unknown user in batch");
          outcomes[index] = Some(failed(ItemFailure::UserNotFound));
          continue;
        }
        Err(e) => {
          warn!(user_id = %item.user_id, index, error = %e, "user lookup failed");
          outcomes[index] = Some(failed(ItemFailure::Lookup(e.to_string())));
          continue;
        }
      }

      match self.store.find_by_key(item.user_id.clone(), parent.clone()).await {
        Ok(None) => {}
        Ok(Some(existing)) => {
          warn!(
            user_id = %item.user_id,
            parent = %parent,
            existing = %existing.attendance_id,
            "attendance already recorded; skipping"
          );
          outcomes[index] = Some(BulkOutcome::SkippedDuplicate {
            existing: Some(existing.attendance_id),
          });
          continue;
        }
        Err(e) => {
          outcomes[index] = Some(failed(ItemFailure::Store(e.to_string())));
          continue;
        }
      }

      pending.push((index, AttendanceRecord {
        attendance_id: Uuid::new_v4(),
        user_id: item.user_id.clone(),
        parent: parent.clone(),
        status: item.status.unwrap_or_default(),
        notes: item.notes.clone(),
        submitted_by: submitted_by.clone(),
        question_id: item.question_id.clone(),
        organization_id: organization_id.clone(),
        created_at: now,
        updated_at: now,
      }));
    }

    let mut inserted = self.insert_pending(pending, &mut outcomes).await?;
    inserted.sort_by_key(|(index, _)| *index);

    let items = items
      .into_iter()
      .zip(outcomes)
      .enumerate()
      .map(|(index, (item, outcome))| BulkItemReport {
        index,
        user_id: item.user_id,
        outcome: outcome
          .unwrap_or_else(|| failed(ItemFailure::Store("no result from store".into()))),
      })
      .collect();
    let report = BulkReport {
      inserted: inserted.into_iter().map(|(_, record)| record).collect(),
      items,
    };

    info!(
      parent = %parent,
      inserted = report.inserted_count(),
      skipped = report.skipped_count(),
      failed = report.failed_count(),
      "bulk attendance recorded"
    );
    Ok(report)
  }

  /// Write the surviving rows, resubmitting only those that failed on
  /// transient contention. Fills in `outcomes` for every pending row.
  async fn insert_pending(
    &self,
    mut pending: Vec<(usize, AttendanceRecord)>,
    outcomes: &mut [Option<BulkOutcome>],
  ) -> Result<Vec<(usize, AttendanceRecord)>> {
    let store = &*self.store;
    let mut inserted = Vec::with_capacity(pending.len());
    let mut attempt = 1;
    let mut backoff = self.retry.initial_backoff();

    while !pending.is_empty() {
      let batch: Vec<AttendanceRecord> = pending.iter().map(|(_, r)| r.clone()).collect();
      let writes = retry_transient(&self.retry, "bulk insert", || store.insert_many(batch.clone()))
        .await
        .map_err(store_error)?;
      if writes.len() != pending.len() {
        return Err(Error::Store(
          format!("store reported {} results for {} rows", writes.len(), pending.len()).into(),
        ));
      }

      let mut again = Vec::new();
      for ((index, record), write) in pending.into_iter().zip(writes) {
        outcomes[index] = match write {
          RowWrite::Inserted => {
            let outcome = BulkOutcome::Inserted { attendance_id: record.attendance_id };
            inserted.push((index, record));
            Some(outcome)
          }
          RowWrite::Duplicate => {
            // Lost a race with a concurrent writer for the same user.
            let existing = match store
              .find_by_key(record.user_id.clone(), record.parent.clone())
              .await
            {
              Ok(found) => found.map(|r| r.attendance_id),
              Err(e) => {
                warn!(user_id = %record.user_id, error = %e, "could not look up existing record");
                None
              }
            };
            warn!(
              user_id = %record.user_id,
              parent = %record.parent,
              "attendance already recorded; skipping"
            );
            Some(BulkOutcome::SkippedDuplicate { existing })
          }
          RowWrite::Failed { transient: true, .. } if attempt < self.retry.max_attempts => {
            again.push((index, record));
            None
          }
          RowWrite::Failed { reason, .. } => {
            warn!(user_id = %record.user_id, reason = %reason, "bulk row rejected");
            Some(failed(ItemFailure::Store(reason)))
          }
        };
      }

      if !again.is_empty() {
        warn!(rows = again.len(), attempt, "transient failures in bulk insert; retrying rows");
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2);
        attempt += 1;
      }
      pending = again;
    }

    Ok(inserted)
  }

  async fn require_user(&self, user_id: &EntityId) -> Result<()> {
    match self.users.resolve(user_id).await.map_err(Error::Directory)? {
      Some(_) => Ok(()),
      None => Err(Error::UserNotFound(user_id.clone())),
    }
  }
}

/// The current time at the microsecond precision records are stored with, so
/// a returned record compares equal to the same record read back.
fn now_micros() -> DateTime<Utc> {
  let now = Utc::now();
  now.duration_trunc(TimeDelta::microseconds(1)).unwrap_or(now)
}

fn failed(reason: ItemFailure) -> BulkOutcome { BulkOutcome::Failed { reason } }

/// A uniqueness violation on insert means another writer got there first.
fn write_error<E: StoreFailure>(e: E, record: &AttendanceRecord) -> Error {
  if e.is_conflict() {
    Error::Conflict {
      user_id: record.user_id.clone(),
      parent:  record.parent.clone(),
    }
  } else {
    store_error(e)
  }
}

#[cfg(test)]
mod tests {
  use roll_core::{
    ErrorKind,
    record::{AttendanceStatus, ParentType},
  };

  use super::*;
  use crate::fixtures::{
    ScriptedStore, at, config, event, id, parents, seed, service, stored, users,
  };

  fn new(user: &str, parent: ParentRef) -> NewAttendance {
    NewAttendance::new(id(user), parent, id("admin"))
  }

  // ─── create ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_then_duplicate_conflicts() {
    let (_, svc) = service().await;

    let record = svc
      .writer
      .create(new("42", event("7")).with_status(AttendanceStatus::Present))
      .await
      .unwrap();
    assert_eq!(record.user_id, id("42"));
    assert_eq!(record.parent, event("7"));
    assert_eq!(record.status, AttendanceStatus::Present);
    assert_eq!(record.created_at, record.updated_at);

    let err = svc.writer.create(new("42", event("7"))).await.unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
  }

  #[tokio::test]
  async fn returned_records_match_what_is_read_back() {
    let (_, svc) = service().await;

    let created = svc.writer.create(new("42", event("7"))).await.unwrap();
    assert_eq!(svc.reader.get_by_id(created.attendance_id).await.unwrap(), created);

    let patch = AttendancePatch { status: Some(AttendanceStatus::Late), ..Default::default() };
    let updated = svc.writer.update(created.attendance_id, patch).await.unwrap();
    assert_eq!(svc.reader.get_by_id(created.attendance_id).await.unwrap(), updated);

    let report = svc
      .writer
      .bulk_create(event("8"), vec![BulkItem::new(id("42"))], id("admin"), None)
      .await
      .unwrap();
    let first = &report.inserted[0];
    assert_eq!(&svc.reader.get_by_id(first.attendance_id).await.unwrap(), first);
  }

  #[tokio::test]
  async fn create_defaults_status_and_stamps_organization() {
    let (_, svc) = service().await;

    let mut input = new("5", event("7"));
    input.organization_id = Some(id("ignored"));
    let record = svc.writer.create(input).await.unwrap();
    assert_eq!(record.status, AttendanceStatus::Present);
    assert_eq!(record.organization_id, Some(id("acme")));

    let mut input = new("5", ParentRef::meeting(id("3")));
    input.organization_id = Some(id("globex"));
    let record = svc.writer.create(input).await.unwrap();
    assert_eq!(record.organization_id, Some(id("globex")));
  }

  #[tokio::test]
  async fn create_requires_known_user_and_parent() {
    let (store, svc) = service().await;

    let err = svc.writer.create(new("999", event("7"))).await.unwrap_err();
    assert!(matches!(err, Error::UserNotFound(_)));

    let err = svc.writer.create(new("42", event("404"))).await.unwrap_err();
    assert!(matches!(err, Error::ParentNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert!(stored(&store).await.is_empty());
  }

  #[tokio::test]
  async fn create_rejects_unregistered_parent_type() {
    let store = crate::fixtures::store().await;
    let parents = ParentDirectories::new();
    let writer = AttendanceWriter::new(
      store,
      Arc::new(crate::fixtures::users()),
      parents,
      RetryPolicy::default(),
    );

    let err = writer
      .create(new("42", ParentRef::new(ParentType::Meeting, id("3"))))
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  }

  #[tokio::test]
  async fn concurrent_creates_store_exactly_one() {
    let (store, svc) = service().await;

    let (a, b, c) = tokio::join!(
      svc.writer.create(new("42", event("7"))),
      svc.writer.create(new("42", event("7"))),
      svc.writer.create(new("42", event("7"))),
    );
    let results = [a, b, c];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
      .iter()
      .filter(|r| matches!(r, Err(Error::Conflict { .. })))
      .count();
    assert_eq!(ok, 1);
    assert_eq!(conflicts, 2);
    assert_eq!(stored(&store).await.len(), 1);
  }

  // ─── update / delete ───────────────────────────────────────────────────────

  #[tokio::test]
  async fn update_changes_status_and_bumps_updated_at() {
    let (store, svc) = service().await;
    let seeded = seed(&store, "42", event("7"), AttendanceStatus::Absent, at(2023, 1, 5)).await;

    let patch = AttendancePatch {
      status: Some(AttendanceStatus::Excused),
      notes: Some(Some("doctor's note".into())),
      ..Default::default()
    };
    let updated = svc.writer.update(seeded.attendance_id, patch).await.unwrap();
    assert_eq!(updated.status, AttendanceStatus::Excused);
    assert_eq!(updated.notes.as_deref(), Some("doctor's note"));
    assert_eq!(updated.created_at, seeded.created_at);
    assert!(updated.updated_at > seeded.updated_at);
  }

  #[tokio::test]
  async fn empty_patch_returns_record_unchanged() {
    let (store, svc) = service().await;
    let seeded = seed(&store, "42", event("7"), AttendanceStatus::Late, at(2023, 1, 5)).await;

    let same = svc
      .writer
      .update(seeded.attendance_id, AttendancePatch::default())
      .await
      .unwrap();
    assert_eq!(same, seeded);
  }

  #[tokio::test]
  async fn update_can_clear_notes() {
    let (_, svc) = service().await;
    let mut input = new("42", event("7"));
    input.notes = Some("arrived late".into());
    let record = svc.writer.create(input).await.unwrap();

    let clear = AttendancePatch { notes: Some(None), ..Default::default() };
    let updated = svc.writer.update(record.attendance_id, clear).await.unwrap();
    assert_eq!(updated.notes, None);
    assert_eq!(updated.status, record.status);
  }

  #[tokio::test]
  async fn update_and_delete_missing_record() {
    let (_, svc) = service().await;
    let missing = Uuid::new_v4();

    let patch = AttendancePatch { notes: Some(Some("x".into())), ..Default::default() };
    let err = svc.writer.update(missing, patch).await.unwrap_err();
    assert!(matches!(err, Error::RecordNotFound(got) if got == missing));

    let err = svc.writer.update(missing, AttendancePatch::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = svc.writer.delete(missing).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
  }

  #[tokio::test]
  async fn delete_removes_record_and_allows_recreate() {
    let (_, svc) = service().await;
    let record = svc.writer.create(new("42", event("7"))).await.unwrap();

    let removed = svc.writer.delete(record.attendance_id).await.unwrap();
    assert_eq!(removed.attendance_id, record.attendance_id);
    assert_eq!(
      svc.reader.get_by_id(record.attendance_id).await.unwrap_err().kind(),
      ErrorKind::NotFound
    );

    svc.writer.create(new("42", event("7"))).await.unwrap();
  }

  // ─── bulk ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn bulk_skips_preexisting_records() {
    let (store, svc) = service().await;
    let existing = [
      seed(&store, "2", event("7"), AttendanceStatus::Present, at(2023, 1, 5)).await,
      seed(&store, "4", event("7"), AttendanceStatus::Absent, at(2023, 1, 5)).await,
    ];

    let items = (1..=6).map(|n| BulkItem::new(id(&n.to_string()))).collect();
    let report = svc
      .writer
      .bulk_create(event("7"), items, id("admin"), None)
      .await
      .unwrap();

    assert_eq!(report.inserted_count(), 4);
    assert_eq!(report.skipped_count(), 2);
    assert_eq!(report.failed_count(), 0);
    assert_eq!(report.items.len(), 6);
    assert_eq!(report.items[1].outcome, BulkOutcome::SkippedDuplicate {
      existing: Some(existing[0].attendance_id),
    });
    assert_eq!(report.items[3].outcome, BulkOutcome::SkippedDuplicate {
      existing: Some(existing[1].attendance_id),
    });

    let users: Vec<_> = report.inserted.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(users, ["1", "3", "5", "6"]);
    for record in &report.inserted {
      assert_eq!(record.organization_id, Some(id("acme")));
      assert_eq!(record.submitted_by, id("admin"));
      assert_eq!(record.status, AttendanceStatus::Present);
    }
    assert_eq!(stored(&store).await.len(), 6);
  }

  #[tokio::test]
  async fn bulk_reports_unknown_and_repeated_users_per_item() {
    let (_, svc) = service().await;

    let items = vec![
      BulkItem::new(id("1")),
      BulkItem::new(id("ghost")),
      BulkItem { status: Some(AttendanceStatus::Late), ..BulkItem::new(id("2")) },
      BulkItem::new(id("1")),
    ];
    let report = svc
      .writer
      .bulk_create(event("7"), items, id("admin"), Some(id("acme")))
      .await
      .unwrap();

    assert_eq!(report.inserted_count(), 2);
    assert!(matches!(report.items[0].outcome, BulkOutcome::Inserted { .. }));
    assert_eq!(report.items[1].outcome, BulkOutcome::Failed {
      reason: ItemFailure::UserNotFound,
    });
    assert_eq!(report.inserted[1].status, AttendanceStatus::Late);
    assert_eq!(report.items[3].outcome, BulkOutcome::SkippedDuplicate { existing: None });
  }

  #[tokio::test]
  async fn bulk_fails_whole_batch_for_bad_parent() {
    let (store, svc) = service().await;

    let items = vec![BulkItem::new(id("1"))];
    let err = svc
      .writer
      .bulk_create(event("404"), items.clone(), id("admin"), None)
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = svc
      .writer
      .bulk_create(event("7"), items, id("admin"), Some(id("globex")))
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert!(stored(&store).await.is_empty());
  }

  #[tokio::test]
  async fn bulk_with_no_items_is_empty() {
    let (_, svc) = service().await;
    let report = svc
      .writer
      .bulk_create(event("7"), Vec::new(), id("admin"), None)
      .await
      .unwrap();
    assert!(report.inserted.is_empty());
    assert!(report.items.is_empty());
  }

  // ─── bulk row retries ──────────────────────────────────────────────────────

  fn scripted_writer(store: &Arc<ScriptedStore>) -> AttendanceWriter<ScriptedStore> {
    AttendanceWriter::new(store.clone(), Arc::new(users()), parents(), config().write_retry)
  }

  fn three_users() -> Vec<BulkItem> {
    ["1", "2", "3"].into_iter().map(|u| BulkItem::new(id(u))).collect()
  }

  #[tokio::test]
  async fn bulk_resubmits_rows_that_hit_contention() {
    let store = Arc::new(ScriptedStore::new().await.then(&[("2", ScriptedStore::locked())]));
    let writer = scripted_writer(&store);

    let report = writer
      .bulk_create(event("7"), three_users(), id("admin"), None)
      .await
      .unwrap();

    assert_eq!(report.inserted_count(), 3);
    assert_eq!(report.failed_count(), 0);
    assert!(matches!(report.items[1].outcome, BulkOutcome::Inserted { .. }));
    let users: Vec<_> = report.inserted.iter().map(|r| r.user_id.as_str()).collect();
    assert_eq!(users, ["1", "2", "3"]);
    assert_eq!(stored(&store.inner).await.len(), 3);
  }

  #[tokio::test]
  async fn bulk_gives_up_on_a_row_after_max_attempts() {
    let locked = [("2", ScriptedStore::locked())];
    let store = ScriptedStore::new().await.then(&locked).then(&locked).then(&locked);
    let store = Arc::new(store);
    let writer = scripted_writer(&store);

    let report = writer
      .bulk_create(event("7"), three_users(), id("admin"), None)
      .await
      .unwrap();

    assert_eq!(report.inserted_count(), 2);
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.items[1].outcome, BulkOutcome::Failed {
      reason: ItemFailure::Store("database is locked".into()),
    });
    let users: Vec<_> = stored(&store.inner).await.into_iter().map(|r| r.user_id).collect();
    assert!(!users.contains(&id("2")));
  }

  #[tokio::test]
  async fn bulk_skips_row_taken_by_a_concurrent_writer() {
    let store = Arc::new(ScriptedStore::new().await.then(&[("2", RowWrite::Duplicate)]));
    let writer = scripted_writer(&store);

    let report = writer
      .bulk_create(event("7"), three_users(), id("admin"), None)
      .await
      .unwrap();

    let winner = store.inner.find_by_key(id("2"), event("7")).await.unwrap().unwrap();
    assert_eq!(report.inserted_count(), 2);
    assert_eq!(report.items[1].outcome, BulkOutcome::SkippedDuplicate {
      existing: Some(winner.attendance_id),
    });
    assert!(report.inserted.iter().all(|r| r.user_id != id("2")));
  }
}
