//! Who was expected but has no `present` record.

use std::{collections::HashSet, sync::Arc};

use roll_core::{EntityId, Result, record::ParentRef, store::AttendanceStore};
use tracing::debug;

use crate::{EngineConfig, retry::with_deadline, store_error};

pub struct AbsenceResolver<S> {
  store:  Arc<S>,
  config: EngineConfig,
}

impl<S: AttendanceStore> AbsenceResolver<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self { Self { store, config } }

  /// The members of `expected` with no `present` record against `parent`,
  /// in first-seen order and without repeats.
  ///
  /// Records with any other status (`late` included) do not count as
  /// attendance. An empty `expected` yields an empty result without
  /// touching the store.
  pub async fn get_not_attended(
    &self,
    parent: &ParentRef,
    expected: &[EntityId],
  ) -> Result<Vec<EntityId>> {
    if expected.is_empty() {
      return Ok(Vec::new());
    }

    let present: HashSet<EntityId> = with_deadline(self.config.aggregation_timeout(), async {
      self
        .store
        .present_user_ids(parent.clone())
        .await
        .map_err(store_error)
    })
    .await?
    .into_iter()
    .collect();

    let mut seen = HashSet::new();
    let missing: Vec<EntityId> = expected
      .iter()
      .filter(|id| !present.contains(*id) && seen.insert(*id))
      .cloned()
      .collect();

    debug!(
      parent = %parent,
      expected = expected.len(),
      present = present.len(),
      missing = missing.len(),
      "resolved absentees"
    );
    Ok(missing)
  }
}
