//! Per-status totals and present rate over a filtered record set.

use std::sync::Arc;

use roll_core::{
  Result,
  query::RecordFilter,
  record::ParentRef,
  report::AttendanceStats,
  store::AttendanceStore,
};
use tracing::debug;

use crate::{EngineConfig, retry::with_deadline, store_error};

pub struct StatsEngine<S> {
  store:  Arc<S>,
  config: EngineConfig,
}

impl<S: AttendanceStore> StatsEngine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self { Self { store, config } }

  /// Counts by status over every record matching `filter`, with
  /// `percentage = round(present / total * 100, 2)` (`0.0` when empty).
  pub async fn compute_stats(&self, filter: RecordFilter) -> Result<AttendanceStats> {
    filter.validate()?;
    debug!(?filter, "computing attendance stats");

    let counts = with_deadline(self.config.aggregation_timeout(), async {
      self.store.status_counts(filter).await.map_err(store_error)
    })
    .await?;
    Ok(counts.into())
  }

  /// Stats for everything recorded against one parent.
  pub async fn for_parent(&self, parent: &ParentRef) -> Result<AttendanceStats> {
    self.compute_stats(RecordFilter::for_parent(parent)).await
  }
}
