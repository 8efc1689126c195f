//! Point lookups and filtered listing.

use std::sync::Arc;

use roll_core::{
  EntityId, Error, Result,
  query::{RecordFilter, RecordQuery},
  record::{AttendanceRecord, ParentRef},
  store::AttendanceStore,
};
use tracing::debug;
use uuid::Uuid;

use crate::{EngineConfig, retry::with_deadline, store_error};

pub struct AttendanceReader<S> {
  store:  Arc<S>,
  config: EngineConfig,
}

impl<S: AttendanceStore> AttendanceReader<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self { Self { store, config } }

  pub async fn get_by_id(&self, id: Uuid) -> Result<AttendanceRecord> {
    self
      .store
      .get(id)
      .await
      .map_err(store_error)?
      .ok_or(Error::RecordNotFound(id))
  }

  /// The record for `user_id` at `parent`, if one exists.
  pub async fn get_by_user_and_parent(
    &self,
    user_id: &EntityId,
    parent: &ParentRef,
  ) -> Result<Option<AttendanceRecord>> {
    self
      .store
      .find_by_key(user_id.clone(), parent.clone())
      .await
      .map_err(store_error)
  }

  /// Records matching `filter`, newest first. `limit` falls back to the
  /// configured default page size and is clamped to the configured maximum.
  pub async fn list(
    &self,
    filter: RecordFilter,
    skip: usize,
    limit: Option<usize>,
  ) -> Result<Vec<AttendanceRecord>> {
    filter.validate()?;
    let limit = self.config.page_limit(limit)?;
    debug!(?filter, skip, limit, "listing attendance");

    let query = RecordQuery { filter, skip, limit };
    with_deadline(self.config.aggregation_timeout(), async {
      self.store.list(query).await.map_err(store_error)
    })
    .await
  }
}
