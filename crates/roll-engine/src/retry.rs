//! Write retries and aggregation deadlines.

use std::{future::Future, time::Duration};

use roll_core::{Error, Result, store::StoreFailure};
use tracing::warn;

use crate::config::RetryPolicy;

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. The delay between attempts starts at
/// `initial_backoff` and doubles each time.
pub(crate) async fn retry_transient<T, E, F, Fut>(
  policy: &RetryPolicy,
  what: &'static str,
  mut op: F,
) -> Result<T, E>
where
  E: StoreFailure,
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
{
  let mut attempt = 1;
  let mut backoff = policy.initial_backoff();
  loop {
    match op().await {
      Err(e) if e.is_transient() && attempt < policy.max_attempts => {
        warn!(what, attempt, error = %e, "transient store failure; retrying");
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2);
        attempt += 1;
      }
      result => return result,
    }
  }
}

/// Fail with [`Error::DeadlineExceeded`] if `fut` has not finished within
/// `limit`. The future is dropped on expiry.
pub(crate) async fn with_deadline<T>(
  limit: Duration,
  fut: impl Future<Output = Result<T>>,
) -> Result<T> {
  tokio::time::timeout(limit, fut)
    .await
    .map_err(|_| Error::DeadlineExceeded(limit))?
}
