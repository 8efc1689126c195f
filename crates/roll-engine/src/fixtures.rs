//! Shared test setup: an in-memory store and a small fixed roster.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex},
};

use chrono::{DateTime, TimeZone, Utc};
use roll_core::{
  EntityId,
  directory::{ParentDirectories, StaticParents, StaticUsers},
  query::{RecordFilter, RecordQuery},
  record::{AttendancePatch, AttendanceRecord, AttendanceStatus, ParentRef, ParentType},
  report::{DailyCounts, StatusCounts},
  store::{AttendanceStore, RowWrite},
};
use roll_store_sqlite::SqliteStore;
use uuid::Uuid;

use crate::{AttendanceService, EngineConfig, RetryPolicy};

pub fn id(s: &str) -> EntityId { EntityId::parse(s).unwrap() }

pub fn ids(raw: &[&str]) -> Vec<EntityId> { raw.iter().map(|s| id(s)).collect() }

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

pub fn event(n: &str) -> ParentRef { ParentRef::event(id(n)) }

/// Users `1`..=`50` plus `admin`.
pub fn users() -> StaticUsers {
  let mut roster: Vec<EntityId> = (1..=50).map(|n| id(&n.to_string())).collect();
  roster.push(id("admin"));
  StaticUsers::with_ids(roster)
}

/// Events `7` and `8` belong to `acme`; meeting `3` has no organization.
pub fn parents() -> ParentDirectories {
  let mut events = StaticParents::new(ParentType::Event);
  events.insert(id("7"), Some("Kickoff".into()), Some(id("acme")));
  events.insert(id("8"), Some("Retro".into()), Some(id("acme")));
  let mut meetings = StaticParents::new(ParentType::Meeting);
  meetings.insert(id("3"), Some("Standup".into()), None);
  ParentDirectories::new()
    .with(ParentType::Event, Arc::new(events))
    .with(ParentType::Meeting, Arc::new(meetings))
}

pub fn config() -> EngineConfig {
  EngineConfig {
    write_retry: RetryPolicy { max_attempts: 3, initial_backoff_ms: 1 },
    ..Default::default()
  }
}

pub async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

pub async fn service() -> (Arc<SqliteStore>, AttendanceService<SqliteStore>) {
  let store = store().await;
  let service = AttendanceService::new(store.clone(), Arc::new(users()), parents(), config());
  (store, service)
}

/// Insert a record with a chosen creation time, bypassing the writer.
pub async fn seed(
  store: &SqliteStore,
  user: &str,
  parent: ParentRef,
  status: AttendanceStatus,
  created_at: DateTime<Utc>,
) -> AttendanceRecord {
  let record = AttendanceRecord {
    attendance_id: Uuid::new_v4(),
    user_id: id(user),
    parent,
    status,
    notes: None,
    submitted_by: id("admin"),
    question_id: None,
    organization_id: Some(id("acme")),
    created_at,
    updated_at: created_at,
  };
  store.insert(record.clone()).await.expect("seed insert");
  record
}

/// Everything in the store, newest first.
pub async fn stored(store: &SqliteStore) -> Vec<AttendanceRecord> {
  store
    .list(RecordQuery { filter: RecordFilter::default(), skip: 0, limit: 10_000 })
    .await
    .expect("list all")
}

// ─── Scripted store ──────────────────────────────────────────────────────────

/// An in-memory store whose `insert_many` results can be overridden per user,
/// one script entry per call. Users without an override are written for real.
/// A scripted `Duplicate` first stores a competing record for that user, as a
/// concurrent writer would have.
pub struct ScriptedStore {
  pub inner: SqliteStore,
  script:    Mutex<VecDeque<Vec<(EntityId, RowWrite)>>>,
}

impl ScriptedStore {
  pub async fn new() -> Self {
    Self {
      inner:  SqliteStore::open_in_memory().await.expect("in-memory store"),
      script: Mutex::new(VecDeque::new()),
    }
  }

  /// Queue the overrides for the next `insert_many` call.
  pub fn then(self, overrides: &[(&str, RowWrite)]) -> Self {
    let call = overrides.iter().map(|(user, write)| (id(user), write.clone())).collect();
    self.script.lock().unwrap().push_back(call);
    self
  }

  pub fn locked() -> RowWrite {
    RowWrite::Failed { transient: true, reason: "database is locked".into() }
  }
}

impl AttendanceStore for ScriptedStore {
  type Error = roll_store_sqlite::Error;

  async fn insert(&self, record: AttendanceRecord) -> roll_store_sqlite::Result<()> {
    self.inner.insert(record).await
  }

  async fn insert_many(
    &self,
    records: Vec<AttendanceRecord>,
  ) -> roll_store_sqlite::Result<Vec<RowWrite>> {
    let overrides = self.script.lock().unwrap().pop_front().unwrap_or_default();
    let mut writes = Vec::with_capacity(records.len());
    for record in records {
      match overrides.iter().find(|(user, _)| *user == record.user_id) {
        Some((user, RowWrite::Duplicate)) => {
          let parent = record.parent.clone();
          seed(&self.inner, user.as_str(), parent, AttendanceStatus::Present, at(2023, 1, 1)).await;
          writes.push(RowWrite::Duplicate);
        }
        Some((_, write)) => writes.push(write.clone()),
        None => writes.extend(self.inner.insert_many(vec![record]).await?),
      }
    }
    Ok(writes)
  }

  async fn update(
    &self,
    id: Uuid,
    patch: AttendancePatch,
    updated_at: DateTime<Utc>,
  ) -> roll_store_sqlite::Result<Option<AttendanceRecord>> {
    self.inner.update(id, patch, updated_at).await
  }

  async fn delete(&self, id: Uuid) -> roll_store_sqlite::Result<Option<AttendanceRecord>> {
    self.inner.delete(id).await
  }

  async fn get(&self, id: Uuid) -> roll_store_sqlite::Result<Option<AttendanceRecord>> {
    self.inner.get(id).await
  }

  async fn find_by_key(
    &self,
    user_id: EntityId,
    parent: ParentRef,
  ) -> roll_store_sqlite::Result<Option<AttendanceRecord>> {
    self.inner.find_by_key(user_id, parent).await
  }

  async fn list(&self, query: RecordQuery) -> roll_store_sqlite::Result<Vec<AttendanceRecord>> {
    self.inner.list(query).await
  }

  async fn status_counts(&self, filter: RecordFilter) -> roll_store_sqlite::Result<StatusCounts> {
    self.inner.status_counts(filter).await
  }

  async fn daily_counts(
    &self,
    filter: RecordFilter,
  ) -> roll_store_sqlite::Result<Vec<DailyCounts>> {
    self.inner.daily_counts(filter).await
  }

  async fn present_user_ids(&self, parent: ParentRef) -> roll_store_sqlite::Result<Vec<EntityId>> {
    self.inner.present_user_ids(parent).await
  }
}
