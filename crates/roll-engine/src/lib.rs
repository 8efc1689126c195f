//! Attendance engine: the writer, reader and reporting components.
//!
//! Every component is constructed with the store (and, for the writer, the
//! directories) it operates on. There is no global state; an
//! [`AttendanceService`] is just the set of components sharing one store.

use std::sync::Arc;

use roll_core::{
  Error,
  directory::{ParentDirectories, UserDirectory},
  store::{AttendanceStore, StoreFailure},
};

pub mod absence;
pub mod config;
pub mod reader;
mod retry;
pub mod stats;
pub mod summary;
pub mod writer;

#[cfg(test)]
mod fixtures;

pub use absence::AbsenceResolver;
pub use config::{EngineConfig, RetryPolicy};
pub use reader::AttendanceReader;
pub use stats::StatsEngine;
pub use summary::SummaryEngine;
pub use writer::AttendanceWriter;

/// All engine components over one store.
pub struct AttendanceService<S> {
  pub writer:  AttendanceWriter<S>,
  pub reader:  AttendanceReader<S>,
  pub stats:   StatsEngine<S>,
  pub summary: SummaryEngine<S>,
  pub absence: AbsenceResolver<S>,
}

impl<S: AttendanceStore> AttendanceService<S> {
  pub fn new(
    store: Arc<S>,
    users: Arc<dyn UserDirectory>,
    parents: ParentDirectories,
    config: EngineConfig,
  ) -> Self {
    Self {
      writer:  AttendanceWriter::new(store.clone(), users, parents, config.write_retry),
      reader:  AttendanceReader::new(store.clone(), config.clone()),
      stats:   StatsEngine::new(store.clone(), config.clone()),
      summary: SummaryEngine::new(store.clone(), config.clone()),
      absence: AbsenceResolver::new(store, config),
    }
  }
}

/// Wrap a backend failure that has no more specific meaning.
pub(crate) fn store_error<E: StoreFailure>(e: E) -> Error { Error::Store(Box::new(e)) }
