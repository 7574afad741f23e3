//! Persistent sync state.
//!
//! SQLite-backed storage for the mirrored records and the bookkeeping that
//! makes syncs resumable:
//! - one record table per entity kind
//! - a durable per-kind cursor
//! - failed-ID tracking for `retry-failed`
//! - run history for status reporting

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{SqliteSyncStore, SyncStore};
pub use error::StateError;
pub use types::{Cursor, FailedId, KindSummary, SyncRunStats, SyncStats, SyncSummary};
