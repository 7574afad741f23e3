//! Sync store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{Cursor, FailedId, KindSummary, SyncRunStats, SyncStats, SyncSummary};
use crate::merge::PLACEHOLDER_ICONS;
use crate::record::{EntityRecord, LocalRecord};
use crate::types::EntityKind;

/// Trait for sync state operations.
///
/// Object-safe so it can be shared as `Arc<dyn SyncStore>` across workers.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Load the stored record for `(kind, id)`, if any.
    async fn get_record(&self, kind: EntityKind, id: u32)
        -> Result<Option<LocalRecord>, StateError>;

    /// Insert or replace a merged record.
    async fn upsert_record(&self, record: &LocalRecord) -> Result<(), StateError>;

    /// Load the cursor for a kind; a missing row is a fresh cursor.
    async fn load_cursor(&self, kind: EntityKind) -> Result<Cursor, StateError>;

    /// Persist a cursor. Both IDs only ever move forward: a lower value than
    /// the stored one is ignored.
    async fn save_cursor(&self, cursor: &Cursor) -> Result<(), StateError>;

    /// Drop the cursor so the next run starts from ID 1.
    ///
    /// Returns true if a cursor existed.
    async fn reset_cursor(&self, kind: EntityKind) -> Result<bool, StateError>;

    /// IDs of stored items or spells whose icon is empty or a placeholder,
    /// ascending. Kinds without an icon yield nothing.
    async fn missing_icons(&self, kind: EntityKind) -> Result<Vec<u32>, StateError>;

    /// Record counts and highest known IDs for every kind.
    async fn get_stats(&self) -> Result<SyncStats, StateError>;

    /// Record a SkippedError outcome, bumping the attempt count.
    async fn record_failure(&self, kind: EntityKind, id: u32, error: &str)
        -> Result<(), StateError>;

    /// Forget a previously failed ID after it resolved.
    async fn clear_failure(&self, kind: EntityKind, id: u32) -> Result<(), StateError>;

    /// Failed IDs in ascending order, optionally restricted to one kind.
    async fn get_failed(&self, kind: Option<EntityKind>) -> Result<Vec<FailedId>, StateError>;

    /// Start a new sync run and return its ID.
    async fn start_sync_run(&self, kind: EntityKind, start_id: u32) -> Result<i64, StateError>;

    /// Complete a sync run with statistics.
    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats)
        -> Result<(), StateError>;

    /// Get a summary of the database state.
    async fn get_summary(&self) -> Result<SyncSummary, StateError>;
}

/// SQLite implementation of the sync store.
pub struct SqliteSyncStore {
    /// rusqlite::Connection is not Sync.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteSyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSyncStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteSyncStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                // Best effort; Connection::open reports the real failure.
                let _ = std::fs::create_dir_all(parent);
            }
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }
}

fn count_rows(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<u64, StateError> {
    let n: i64 = conn
        .query_row(sql, params, |row| row.get(0))
        .map_err(StateError::query)?;
    Ok(n as u64)
}

fn load_cursor_row(conn: &Connection, kind: EntityKind) -> Result<Cursor, StateError> {
    let row: Option<(i64, i64, i64)> = conn
        .query_row(
            "SELECT last_contiguous_id, max_known_id, updated_at FROM cursors WHERE kind = ?1",
            [kind.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(StateError::query)?;

    Ok(match row {
        Some((last, max, updated_at)) => Cursor {
            kind,
            last_contiguous_id: last as u32,
            max_known_id: max as u32,
            updated_at: Utc.timestamp_opt(updated_at, 0).single(),
        },
        None => Cursor::new(kind),
    })
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[async_trait]
impl SyncStore for SqliteSyncStore {
    async fn get_record(
        &self,
        kind: EntityKind,
        id: u32,
    ) -> Result<Option<LocalRecord>, StateError> {
        let row: Option<(String, i64)> = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT record, synced_at FROM {} WHERE id = ?1", kind.table()),
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StateError::query)?
        };

        let Some((json, synced_at)) = row else {
            return Ok(None);
        };
        let record: EntityRecord =
            serde_json::from_str(&json).map_err(|source| StateError::Record { kind, id, source })?;
        Ok(Some(LocalRecord {
            record,
            synced_at: from_millis(synced_at),
        }))
    }

    async fn upsert_record(&self, local: &LocalRecord) -> Result<(), StateError> {
        let kind = local.record.kind();
        let id = local.record.id();
        let json = serde_json::to_string(&local.record)
            .map_err(|source| StateError::Record { kind, id, source })?;

        let conn = self.lock()?;
        conn.execute(
            &format!(
                r#"
                INSERT INTO {} (id, name, record, synced_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    record = excluded.record,
                    synced_at = excluded.synced_at
                "#,
                kind.table()
            ),
            rusqlite::params![
                id,
                local.record.name(),
                json,
                local.synced_at.timestamp_millis()
            ],
        )
        .map_err(StateError::query)?;

        Ok(())
    }

    async fn missing_icons(&self, kind: EntityKind) -> Result<Vec<u32>, StateError> {
        if !matches!(kind, EntityKind::Item | EntityKind::Spell) {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; PLACEHOLDER_ICONS.len()].join(", ");
        let sql = format!(
            "SELECT id FROM {} \
             WHERE lower(COALESCE(json_extract(record, '$.icon'), '')) IN ('', {placeholders}) \
             ORDER BY id",
            kind.table()
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(StateError::query)?;
        let ids = stmt
            .query_map(rusqlite::params_from_iter(PLACEHOLDER_ICONS), |row| {
                row.get::<_, i64>(0)
            })
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;
        Ok(ids.into_iter().map(|id| id as u32).collect())
    }

    async fn load_cursor(&self, kind: EntityKind) -> Result<Cursor, StateError> {
        let conn = self.lock()?;
        load_cursor_row(&conn, kind)
    }

    async fn save_cursor(&self, cursor: &Cursor) -> Result<(), StateError> {
        let updated_at = cursor.updated_at.unwrap_or_else(Utc::now).timestamp();

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO cursors (kind, last_contiguous_id, max_known_id, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(kind) DO UPDATE SET
                last_contiguous_id = MAX(last_contiguous_id, excluded.last_contiguous_id),
                max_known_id = MAX(max_known_id, excluded.max_known_id),
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![
                cursor.kind.as_str(),
                cursor.last_contiguous_id,
                cursor.max_known_id,
                updated_at
            ],
        )
        .map_err(StateError::query)?;

        Ok(())
    }

    async fn reset_cursor(&self, kind: EntityKind) -> Result<bool, StateError> {
        let conn = self.lock()?;
        let rows = conn
            .execute("DELETE FROM cursors WHERE kind = ?1", [kind.as_str()])
            .map_err(StateError::query)?;
        Ok(rows > 0)
    }

    async fn get_stats(&self) -> Result<SyncStats, StateError> {
        let conn = self.lock()?;
        let mut stats = SyncStats::default();

        for kind in EntityKind::ALL {
            let (count, max_id): (i64, Option<i64>) = conn
                .query_row(
                    &format!("SELECT COUNT(*), MAX(id) FROM {}", kind.table()),
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(StateError::query)?;
            let cursor = load_cursor_row(&conn, kind)?;

            stats.counts.insert(kind, count as u64);
            stats.max_known_ids.insert(
                kind,
                (max_id.unwrap_or(0) as u32).max(cursor.max_known_id),
            );
        }

        Ok(stats)
    }

    async fn record_failure(
        &self,
        kind: EntityKind,
        id: u32,
        error: &str,
    ) -> Result<(), StateError> {
        let failed_at = Utc::now().timestamp();

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO failed_ids (kind, id, attempts, last_error, failed_at)
            VALUES (?1, ?2, 1, ?3, ?4)
            ON CONFLICT(kind, id) DO UPDATE SET
                attempts = attempts + 1,
                last_error = excluded.last_error,
                failed_at = excluded.failed_at
            "#,
            rusqlite::params![kind.as_str(), id, error, failed_at],
        )
        .map_err(StateError::query)?;

        Ok(())
    }

    async fn clear_failure(&self, kind: EntityKind, id: u32) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM failed_ids WHERE kind = ?1 AND id = ?2",
            rusqlite::params![kind.as_str(), id],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn get_failed(&self, kind: Option<EntityKind>) -> Result<Vec<FailedId>, StateError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT kind, id, attempts, last_error, failed_at FROM failed_ids \
                 WHERE ?1 IS NULL OR kind = ?1 ORDER BY kind, id",
            )
            .map_err(StateError::query)?;

        let rows = stmt
            .query_map([kind.map(|k| k.as_str())], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(StateError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StateError::query)?;

        Ok(rows
            .into_iter()
            .filter_map(|(kind, id, attempts, last_error, failed_at)| {
                let Some(kind) = EntityKind::from_str(&kind) else {
                    tracing::warn!(kind = %kind, id, "Ignoring failed ID of unknown kind");
                    return None;
                };
                Some(FailedId {
                    kind,
                    id: id as u32,
                    attempts: attempts as u32,
                    last_error,
                    failed_at: Utc.timestamp_opt(failed_at, 0).single().unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn start_sync_run(&self, kind: EntityKind, start_id: u32) -> Result<i64, StateError> {
        let started_at = Utc::now().timestamp();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_runs (kind, start_id, started_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![kind.as_str(), start_id, started_at],
        )
        .map_err(StateError::query)?;

        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_run(
        &self,
        run_id: i64,
        stats: &SyncRunStats,
    ) -> Result<(), StateError> {
        let completed_at = Utc::now().timestamp();

        let conn = self.lock()?;
        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, last_contiguous_id = ?2, merged = ?3, \
             not_found = ?4, failed = ?5, interrupted = ?6 WHERE id = ?7",
            rusqlite::params![
                completed_at,
                stats.last_contiguous_id,
                stats.merged as i64,
                stats.not_found as i64,
                stats.failed as i64,
                stats.interrupted as i64,
                run_id
            ],
        )
        .map_err(StateError::query)?;

        Ok(())
    }

    async fn get_summary(&self) -> Result<SyncSummary, StateError> {
        let conn = self.lock()?;

        let mut kinds = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            kinds.push(KindSummary {
                kind,
                records: count_rows(&conn, &format!("SELECT COUNT(*) FROM {}", kind.table()), [])?,
                cursor: load_cursor_row(&conn, kind)?,
                failed: count_rows(
                    &conn,
                    "SELECT COUNT(*) FROM failed_ids WHERE kind = ?1",
                    [kind.as_str()],
                )?,
            });
        }

        let last_sync: Option<(Option<i64>, Option<i64>)> = conn
            .query_row(
                "SELECT started_at, completed_at FROM sync_runs ORDER BY id DESC LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(StateError::query)?;

        let (last_sync_started, last_sync_completed) = match last_sync {
            Some((started, completed)) => (
                started.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                completed.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            ),
            None => (None, None),
        };

        Ok(SyncSummary {
            kinds,
            last_sync_started,
            last_sync_completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ItemRecord, QuestRecord, SpellRecord};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn item(id: u32, name: &str, price: u64) -> LocalRecord {
        LocalRecord {
            record: EntityRecord::Item(ItemRecord {
                id,
                name: name.to_string(),
                sell_price: price,
                ..Default::default()
            }),
            synced_at: at(1_700_000_000),
        }
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("shelllab.db");
        let db = SqliteSyncStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), path);
    }

    #[tokio::test]
    async fn test_reopen_keeps_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shelllab.db");
        {
            let db = SqliteSyncStore::open(&path).await.unwrap();
            let mut cursor = Cursor::new(EntityKind::Item);
            cursor.last_contiguous_id = 42;
            db.save_cursor(&cursor).await.unwrap();
        }
        let db = SqliteSyncStore::open(&path).await.unwrap();
        let cursor = db.load_cursor(EntityKind::Item).await.unwrap();
        assert_eq!(cursor.last_contiguous_id, 42);
        assert_eq!(cursor.resume_id(), 43);
    }

    #[tokio::test]
    async fn test_missing_record_is_none() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        assert!(db.get_record(EntityKind::Item, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_and_get_record() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        let record = item(25, "Worn Shortsword", 7);
        db.upsert_record(&record).await.unwrap();

        let loaded = db.get_record(EntityKind::Item, 25).await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        db.upsert_record(&item(25, "Old", 7)).await.unwrap();
        db.upsert_record(&item(25, "New", 9)).await.unwrap();

        let loaded = db.get_record(EntityKind::Item, 25).await.unwrap().unwrap();
        assert_eq!(loaded.record.name(), "New");
        assert_eq!(db.get_stats().await.unwrap().count(EntityKind::Item), 1);
    }

    #[tokio::test]
    async fn test_kinds_use_separate_tables() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        db.upsert_record(&item(5, "Item Five", 0)).await.unwrap();
        db.upsert_record(&LocalRecord {
            record: EntityRecord::Quest(QuestRecord {
                id: 5,
                title: "Quest Five".into(),
                ..Default::default()
            }),
            synced_at: at(1_700_000_000),
        })
        .await
        .unwrap();

        let quest = db.get_record(EntityKind::Quest, 5).await.unwrap().unwrap();
        assert_eq!(quest.record.name(), "Quest Five");
        let item = db.get_record(EntityKind::Item, 5).await.unwrap().unwrap();
        assert_eq!(item.record.name(), "Item Five");
    }

    #[tokio::test]
    async fn test_fresh_cursor_defaults() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        let cursor = db.load_cursor(EntityKind::Spell).await.unwrap();
        assert_eq!(cursor, Cursor::new(EntityKind::Spell));
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backwards() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        let mut cursor = Cursor::new(EntityKind::Npc);
        cursor.last_contiguous_id = 100;
        cursor.max_known_id = 120;
        db.save_cursor(&cursor).await.unwrap();

        cursor.last_contiguous_id = 50;
        cursor.max_known_id = 60;
        db.save_cursor(&cursor).await.unwrap();

        let loaded = db.load_cursor(EntityKind::Npc).await.unwrap();
        assert_eq!(loaded.last_contiguous_id, 100);
        assert_eq!(loaded.max_known_id, 120);
    }

    #[tokio::test]
    async fn test_reset_cursor() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        assert!(!db.reset_cursor(EntityKind::Item).await.unwrap());

        let mut cursor = Cursor::new(EntityKind::Item);
        cursor.last_contiguous_id = 9;
        db.save_cursor(&cursor).await.unwrap();
        assert!(db.reset_cursor(EntityKind::Item).await.unwrap());
        assert_eq!(
            db.load_cursor(EntityKind::Item).await.unwrap().last_contiguous_id,
            0
        );
    }

    #[tokio::test]
    async fn test_stats_use_highest_of_table_and_cursor() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        db.upsert_record(&item(3, "A", 0)).await.unwrap();
        db.upsert_record(&item(17, "B", 0)).await.unwrap();

        let mut cursor = Cursor::new(EntityKind::Item);
        cursor.max_known_id = 12;
        db.save_cursor(&cursor).await.unwrap();

        let mut spell_cursor = Cursor::new(EntityKind::Spell);
        spell_cursor.max_known_id = 400;
        db.save_cursor(&spell_cursor).await.unwrap();

        let stats = db.get_stats().await.unwrap();
        assert_eq!(stats.count(EntityKind::Item), 2);
        assert_eq!(stats.max_known_id(EntityKind::Item), 17);
        assert_eq!(stats.count(EntityKind::Spell), 0);
        assert_eq!(stats.max_known_id(EntityKind::Spell), 400);
        assert_eq!(stats.max_known_id(EntityKind::Quest), 0);
    }

    #[tokio::test]
    async fn test_record_failure_counts_attempts() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        db.record_failure(EntityKind::Item, 7, "HTTP 503")
            .await
            .unwrap();
        db.record_failure(EntityKind::Item, 7, "timed out")
            .await
            .unwrap();
        db.record_failure(EntityKind::Quest, 2, "HTTP 403")
            .await
            .unwrap();

        let failed = db.get_failed(Some(EntityKind::Item)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, 7);
        assert_eq!(failed[0].attempts, 2);
        assert_eq!(failed[0].last_error.as_deref(), Some("timed out"));

        assert_eq!(db.get_failed(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_failure() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        db.record_failure(EntityKind::Spell, 11, "boom").await.unwrap();
        db.clear_failure(EntityKind::Spell, 11).await.unwrap();
        assert!(db.get_failed(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_run_lifecycle() {
        let db = SqliteSyncStore::open_in_memory().unwrap();

        let run_id = db.start_sync_run(EntityKind::Item, 1).await.unwrap();
        assert!(run_id > 0);

        let stats = SyncRunStats {
            last_contiguous_id: 5,
            merged: 4,
            not_found: 1,
            failed: 0,
            interrupted: false,
        };
        db.complete_sync_run(run_id, &stats).await.unwrap();

        let summary = db.get_summary().await.unwrap();
        assert!(summary.last_sync_started.is_some());
        assert!(summary.last_sync_completed.is_some());
    }

    #[tokio::test]
    async fn test_get_summary_per_kind() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        db.upsert_record(&item(1, "A", 0)).await.unwrap();
        db.record_failure(EntityKind::Item, 2, "x").await.unwrap();

        let summary = db.get_summary().await.unwrap();
        assert_eq!(summary.kinds.len(), 4);
        let items = summary
            .kinds
            .iter()
            .find(|k| k.kind == EntityKind::Item)
            .unwrap();
        assert_eq!(items.records, 1);
        assert_eq!(items.failed, 1);
        assert!(summary.last_sync_started.is_none());
    }

    #[tokio::test]
    async fn test_missing_icons_finds_empty_and_placeholders() {
        let db = SqliteSyncStore::open_in_memory().unwrap();
        for (id, icon) in [
            (1, "inv_sword_04"),
            (2, ""),
            (3, "INV_Misc_QuestionMark"),
            (4, "temp"),
            (5, "templar"),
        ] {
            let mut local = item(id, "X", 0);
            if let EntityRecord::Item(i) = &mut local.record {
                i.icon = icon.to_string();
            }
            db.upsert_record(&local).await.unwrap();
        }
        db.upsert_record(&LocalRecord {
            record: EntityRecord::Spell(SpellRecord {
                id: 7,
                name: "Bolt".into(),
                icon: "template".into(),
                ..Default::default()
            }),
            synced_at: at(1_700_000_000),
        })
        .await
        .unwrap();

        assert_eq!(db.missing_icons(EntityKind::Item).await.unwrap(), vec![2, 3, 4]);
        assert_eq!(db.missing_icons(EntityKind::Spell).await.unwrap(), vec![7]);
        assert!(db.missing_icons(EntityKind::Quest).await.unwrap().is_empty());
    }
}
