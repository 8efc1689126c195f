//! SQLite backend for the Roll attendance store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Uniqueness of `(user_id, parent)` is a
//! table constraint, so concurrent duplicate inserts are rejected by SQLite
//! itself regardless of timing.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
