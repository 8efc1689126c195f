//! Core types and trait definitions for the Roll attendance tracker.
//!
//! This crate has no database or runtime dependencies.
//! Storage backends implement [`store::AttendanceStore`]; the engine crate
//! builds the writer, reader and reporting components on top of it.

// The store trait is written with native `async fn` in traits.
// Its futures carry explicit `Send` bounds, so the advisory lint is noise.
#![allow(async_fn_in_trait)]

pub mod bulk;
pub mod directory;
pub mod error;
pub mod id;
pub mod query;
pub mod record;
pub mod report;
pub mod store;

pub use error::{Error, ErrorKind, Result};
pub use id::EntityId;
