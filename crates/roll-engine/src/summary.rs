//! Time-bucketed attendance across a date range.

use std::{collections::BTreeMap, sync::Arc};

use roll_core::{
  EntityId, Result,
  query::{DateRange, RecordFilter},
  report::{AttendanceSummary, Period, StatusCounts, SummaryBucket},
  store::AttendanceStore,
};
use tracing::debug;

use crate::{EngineConfig, retry::with_deadline, store_error};

pub struct SummaryEngine<S> {
  store:  Arc<S>,
  config: EngineConfig,
}

impl<S: AttendanceStore> SummaryEngine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self { Self { store, config } }

  /// Group an organization's records in `range` into `period` buckets keyed
  /// by the UTC calendar date of `created_at`.
  ///
  /// `filter` narrows the set further; its own organization and date range
  /// are replaced by the arguments. Buckets come back in ascending key order
  /// and only non-empty buckets are returned.
  pub async fn compute_summary(
    &self,
    organization_id: EntityId,
    range: DateRange,
    period: Period,
    filter: Option<RecordFilter>,
  ) -> Result<AttendanceSummary> {
    range.validate()?;
    let filter = RecordFilter {
      organization_id: Some(organization_id),
      created: range,
      ..filter.unwrap_or_default()
    };
    debug!(?filter, %period, "computing attendance summary");

    let days = with_deadline(self.config.aggregation_timeout(), async {
      self.store.daily_counts(filter).await.map_err(store_error)
    })
    .await?;

    let mut buckets: BTreeMap<String, StatusCounts> = BTreeMap::new();
    let mut overall = StatusCounts::default();
    for day in &days {
      buckets
        .entry(period.bucket_key(day.day))
        .or_default()
        .merge(&day.counts);
      overall.merge(&day.counts);
    }

    Ok(AttendanceSummary {
      period,
      buckets: buckets
        .into_iter()
        .map(|(bucket_key, counts)| SummaryBucket { bucket_key, stats: counts.into() })
        .collect(),
      overall: overall.into(),
    })
  }
}

#[cfg(test)]
mod tests {
  use roll_core::{
    ErrorKind,
    record::{AttendanceStatus, ParentRef},
    report::AttendanceStats,
  };

  use super::*;
  use crate::fixtures::{at, event, id, seed, service};

  fn keys(summary: &AttendanceSummary) -> Vec<&str> {
    summary.buckets.iter().map(|b| b.bucket_key.as_str()).collect()
  }

  #[tokio::test]
  async fn monthly_buckets() {
    let (store, svc) = service().await;
    seed(&store, "1", event("7"), AttendanceStatus::Present, at(2023, 1, 5)).await;
    seed(&store, "1", event("8"), AttendanceStatus::Absent, at(2023, 2, 10)).await;

    let summary = svc
      .summary
      .compute_summary(id("acme"), DateRange::unbounded(), Period::Monthly, None)
      .await
      .unwrap();

    assert_eq!(keys(&summary), ["2023-01", "2023-02"]);
    assert!(summary.buckets.iter().all(|b| b.stats.total == 1));
    assert_eq!(summary.buckets[0].stats.percentage, 100.0);
    assert_eq!(summary.buckets[1].stats.percentage, 0.0);
    assert_eq!(summary.overall.total, 2);
    assert_eq!(summary.overall.percentage, 50.0);
  }

  #[tokio::test]
  async fn daily_and_weekly_keys() {
    let (store, svc) = service().await;
    // Sunday 2023-01-01 opens week 01; Saturday 2023-01-07 closes it.
    seed(&store, "1", event("7"), AttendanceStatus::Present, at(2023, 1, 1)).await;
    seed(&store, "2", event("7"), AttendanceStatus::Late, at(2023, 1, 7)).await;
    seed(&store, "3", event("7"), AttendanceStatus::Present, at(2023, 1, 8)).await;

    let daily = svc
      .summary
      .compute_summary(id("acme"), DateRange::unbounded(), Period::Daily, None)
      .await
      .unwrap();
    assert_eq!(keys(&daily), ["2023-01-01", "2023-01-07", "2023-01-08"]);

    let weekly = svc
      .summary
      .compute_summary(id("acme"), DateRange::unbounded(), Period::Weekly, None)
      .await
      .unwrap();
    assert_eq!(keys(&weekly), ["2023-W01", "2023-W02"]);
    assert_eq!(weekly.buckets[0].stats.total, 2);
    assert_eq!(weekly.buckets[0].stats.late, 1);
  }

  #[tokio::test]
  async fn buckets_partition_the_filtered_set() {
    let (store, svc) = service().await;
    let statuses = [AttendanceStatus::Present, AttendanceStatus::Absent, AttendanceStatus::Late];
    for n in 0..30u32 {
      let status = statuses[n as usize % statuses.len()];
      let parent = if n % 2 == 0 { event("7") } else { event("8") };
      seed(&store, &(n + 1).to_string(), parent, status, at(2023, 1 + n % 4, 1 + n % 27)).await;
    }

    let range = DateRange::new(Some(at(2023, 1, 10)), Some(at(2023, 3, 31))).unwrap();
    let filter = RecordFilter { parent_id: Some(id("7")), ..Default::default() };
    let summary = svc
      .summary
      .compute_summary(id("acme"), range, Period::Weekly, Some(filter.clone()))
      .await
      .unwrap();

    let expected = svc
      .stats
      .compute_stats(RecordFilter { created: range, organization_id: Some(id("acme")), ..filter })
      .await
      .unwrap();
    let bucket_total: u64 = summary.buckets.iter().map(|b| b.stats.total).sum();
    assert_eq!(bucket_total, expected.total);
    assert_eq!(summary.overall, expected);

    let mut sorted = keys(&summary);
    sorted.sort();
    assert_eq!(keys(&summary), sorted);
  }

  #[tokio::test]
  async fn other_organizations_are_excluded() {
    let (store, svc) = service().await;
    seed(&store, "1", event("7"), AttendanceStatus::Present, at(2023, 1, 5)).await;

    let summary = svc
      .summary
      .compute_summary(id("globex"), DateRange::unbounded(), Period::Daily, None)
      .await
      .unwrap();
    assert!(summary.buckets.is_empty());
    assert_eq!(summary.overall, AttendanceStats::default());

    let meeting = ParentRef::meeting(id("3"));
    seed(&store, "1", meeting, AttendanceStatus::Present, at(2023, 1, 5)).await;
    let summary = svc
      .summary
      .compute_summary(id("acme"), DateRange::unbounded(), Period::Daily, None)
      .await
      .unwrap();
    assert_eq!(summary.overall.total, 2);
  }

  #[tokio::test]
  async fn backwards_range_is_invalid() {
    let (_, svc) = service().await;
    let range = DateRange { start: Some(at(2023, 3, 1)), end: Some(at(2023, 1, 1)) };
    let err = svc
      .summary
      .compute_summary(id("acme"), range, Period::Monthly, None)
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
  }
}
