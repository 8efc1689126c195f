//! [`SqliteStore`], the SQLite implementation of [`AttendanceStore`].

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use roll_core::{
  EntityId,
  query::{RecordFilter, RecordQuery},
  record::{AttendancePatch, AttendanceRecord, AttendanceStatus, ParentRef},
  report::{DailyCounts, StatusCounts},
  store::{AttendanceStore, RowWrite},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{EncodedRecord, RawRecord, decode_day, encode_dt, encode_uuid, where_clause},
  error::{is_transient, is_unique_violation},
  schema::{RECORD_COLUMNS, SCHEMA},
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const INSERT_SQL: &str = "INSERT INTO attendance (
     attendance_id, user_id, parent_id, parent_type, status,
     notes, submitted_by, question_id, organization_id, created_at, updated_at
   ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

// ─── Store ───────────────────────────────────────────────────────────────────

/// An attendance store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn select_one(&self, sql: String, key: Vec<String>) -> Result<Option<AttendanceRecord>> {
    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params_from_iter(key), RawRecord::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }
}

// ─── AttendanceStore impl ────────────────────────────────────────────────────

impl AttendanceStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn insert(&self, record: AttendanceRecord) -> Result<()> {
    let row = EncodedRecord::from(&record);

    let outcome = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(INSERT_SQL)?;
        row.insert(&mut stmt)?;
        Ok(())
      })
      .await;

    match outcome {
      Ok(()) => Ok(()),
      Err(tokio_rusqlite::Error::Rusqlite(e)) if is_unique_violation(&e) => {
        Err(Error::Duplicate { user_id: record.user_id, parent: record.parent })
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn insert_many(&self, records: Vec<AttendanceRecord>) -> Result<Vec<RowWrite>> {
    let rows: Vec<EncodedRecord> = records.iter().map(EncodedRecord::from).collect();

    // Each row is its own autocommit statement: a failing row never rolls back
    // its neighbours and no lock is held across the batch.
    let writes = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(INSERT_SQL)?;
        let writes = rows
          .iter()
          .map(|row| match row.insert(&mut stmt) {
            Ok(_) => RowWrite::Inserted,
            Err(e) if is_unique_violation(&e) => RowWrite::Duplicate,
            Err(e) => RowWrite::Failed {
              transient: is_transient(&e),
              reason:    e.to_string(),
            },
          })
          .collect::<Vec<_>>();
        Ok(writes)
      })
      .await?;

    Ok(writes)
  }

  async fn update(
    &self,
    id: Uuid,
    patch: AttendancePatch,
    updated_at: DateTime<Utc>,
  ) -> Result<Option<AttendanceRecord>> {
    let id_str       = encode_uuid(id);
    let status       = patch.status.map(AttendanceStatus::as_str);
    let set_notes    = patch.notes.is_some();
    let notes        = patch.notes.flatten();
    let set_question = patch.question_id.is_some();
    let question_id  = patch.question_id.flatten().map(String::from);
    let at_str       = encode_dt(updated_at);

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE attendance SET
             status      = COALESCE(?2, status),
             notes       = CASE WHEN ?3 THEN ?4 ELSE notes END,
             question_id = CASE WHEN ?5 THEN ?6 ELSE question_id END,
             updated_at  = ?7
           WHERE attendance_id = ?1",
          rusqlite::params![id_str, status, set_notes, notes, set_question, question_id, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(
          conn
            .query_row(
              &format!("SELECT {RECORD_COLUMNS} FROM attendance WHERE attendance_id = ?1"),
              rusqlite::params![id_str],
              RawRecord::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::into_record).transpose()
  }

  async fn delete(&self, id: Uuid) -> Result<Option<AttendanceRecord>> {
    self
      .select_one(
        format!("DELETE FROM attendance WHERE attendance_id = ?1 RETURNING {RECORD_COLUMNS}"),
        vec![encode_uuid(id)],
      )
      .await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get(&self, id: Uuid) -> Result<Option<AttendanceRecord>> {
    self
      .select_one(
        format!("SELECT {RECORD_COLUMNS} FROM attendance WHERE attendance_id = ?1"),
        vec![encode_uuid(id)],
      )
      .await
  }

  async fn find_by_key(
    &self,
    user_id: EntityId,
    parent: ParentRef,
  ) -> Result<Option<AttendanceRecord>> {
    self
      .select_one(
        format!(
          "SELECT {RECORD_COLUMNS} FROM attendance
           WHERE user_id = ?1 AND parent_type = ?2 AND parent_id = ?3"
        ),
        vec![
          user_id.to_string(),
          parent.kind.as_str().to_owned(),
          parent.id.to_string(),
        ],
      )
      .await
  }

  async fn list(&self, query: RecordQuery) -> Result<Vec<AttendanceRecord>> {
    let (where_sql, mut values) = where_clause(&query.filter);
    values.push(rusqlite::types::Value::Integer(
      i64::try_from(query.limit).unwrap_or(i64::MAX),
    ));
    values.push(rusqlite::types::Value::Integer(
      i64::try_from(query.skip).unwrap_or(i64::MAX),
    ));

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {RECORD_COLUMNS} FROM attendance
           {where_sql}
           ORDER BY created_at DESC, attendance_id DESC
           LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values), RawRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  // ── Aggregates ────────────────────────────────────────────────────────────

  async fn status_counts(&self, filter: RecordFilter) -> Result<StatusCounts> {
    let (where_sql, values) = where_clause(&filter);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT status, COUNT(*) FROM attendance {where_sql} GROUP BY status"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values), |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut counts = StatusCounts::default();
    for (status, n) in rows {
      counts.add(AttendanceStatus::parse(&status)?, n.unsigned_abs());
    }
    Ok(counts)
  }

  async fn daily_counts(&self, filter: RecordFilter) -> Result<Vec<DailyCounts>> {
    let (where_sql, values) = where_clause(&filter);

    let rows: Vec<(String, String, i64)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT substr(created_at, 1, 10) AS day, status, COUNT(*)
           FROM attendance
           {where_sql}
           GROUP BY day, status
           ORDER BY day"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(values), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut days: Vec<DailyCounts> = Vec::new();
    for (day, status, n) in rows {
      let day = decode_day(&day)?;
      let status = AttendanceStatus::parse(&status)?;
      match days.last_mut() {
        Some(last) if last.day == day => last.counts.add(status, n.unsigned_abs()),
        _ => {
          let mut counts = StatusCounts::default();
          counts.add(status, n.unsigned_abs());
          days.push(DailyCounts { day, counts });
        }
      }
    }
    Ok(days)
  }

  async fn present_user_ids(&self, parent: ParentRef) -> Result<Vec<EntityId>> {
    let kind_str = parent.kind.as_str();
    let id_str   = parent.id.to_string();
    let present  = AttendanceStatus::Present.as_str();

    let raws: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT user_id FROM attendance
           WHERE parent_type = ?1 AND parent_id = ?2 AND status = ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![kind_str, id_str, present], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| EntityId::parse(raw).map_err(Error::from))
      .collect()
  }
}
