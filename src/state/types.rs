//! Types for the state module.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::EntityKind;

/// Durable per-kind progress marker.
///
/// Every ID in `[1, last_contiguous_id]` has been attempted at least once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub kind: EntityKind,
    pub last_contiguous_id: u32,
    /// Highest ID observed as Found so far.
    pub max_known_id: u32,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cursor {
    /// The cursor of a kind that has never been synced.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            last_contiguous_id: 0,
            max_known_id: 0,
            updated_at: None,
        }
    }

    /// First ID a resumed run should fetch.
    pub fn resume_id(&self) -> u32 {
        self.last_contiguous_id.saturating_add(1)
    }
}

/// An ID whose last sync attempt ended as SkippedError.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedId {
    pub kind: EntityKind,
    pub id: u32,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub failed_at: DateTime<Utc>,
}

/// Statistics recorded when a sync run finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunStats {
    pub last_contiguous_id: u32,
    pub merged: u64,
    pub not_found: u64,
    pub failed: u64,
    pub interrupted: bool,
}

/// Record counts and highest known IDs per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub counts: BTreeMap<EntityKind, u64>,
    pub max_known_ids: BTreeMap<EntityKind, u32>,
}

impl SyncStats {
    pub fn count(&self, kind: EntityKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn max_known_id(&self, kind: EntityKind) -> u32 {
        self.max_known_ids.get(&kind).copied().unwrap_or(0)
    }
}

/// Per-kind line of the `status` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSummary {
    pub kind: EntityKind,
    pub records: u64,
    pub cursor: Cursor,
    pub failed: u64,
}

/// Summary of the database state.
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub kinds: Vec<KindSummary>,
    pub last_sync_started: Option<DateTime<Utc>>,
    pub last_sync_completed: Option<DateTime<Utc>>,
}
