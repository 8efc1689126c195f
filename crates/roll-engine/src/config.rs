//! Tunables for the engine components.

use std::time::Duration;

use roll_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Engine configuration. Every field has a default, so an empty config
/// section deserializes to [`EngineConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Page size used by `list` when the caller gives none.
  pub default_page_limit:     usize,
  /// Upper bound on any requested page size.
  pub max_page_limit:         usize,
  /// Deadline for `list` and the aggregation operations.
  pub aggregation_timeout_ms: u64,
  pub write_retry:            RetryPolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      default_page_limit:     100,
      max_page_limit:         1000,
      aggregation_timeout_ms: 30_000,
      write_retry:            RetryPolicy::default(),
    }
  }
}

impl EngineConfig {
  pub fn aggregation_timeout(&self) -> Duration {
    Duration::from_millis(self.aggregation_timeout_ms)
  }

  /// Resolve a requested page size: `None` takes the default, oversized
  /// requests are clamped and zero is rejected.
  pub fn page_limit(&self, requested: Option<usize>) -> Result<usize> {
    match requested {
      None => Ok(self.default_page_limit.min(self.max_page_limit)),
      Some(0) => Err(Error::InvalidArgument("limit must be at least 1".into())),
      Some(n) => Ok(n.min(self.max_page_limit)),
    }
  }
}

/// Bounded retry of writes that failed on transient store contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts including the first; `1` disables retrying.
  pub max_attempts:       u32,
  /// Delay before the first retry; doubles on each subsequent one.
  pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { max_attempts: 3, initial_backoff_ms: 50 } }
}

impl RetryPolicy {
  pub fn initial_backoff(&self) -> Duration {
    Duration::from_millis(self.initial_backoff_ms)
  }
}
