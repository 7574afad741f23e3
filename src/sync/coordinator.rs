//! Top-level orchestration of sync runs.
//!
//! One [`SyncCoordinator`] owns the store, the per-kind fetchers and the
//! event publisher. Each kind has at most one active run; different kinds run
//! concurrently with independent pools, limiters and cursors.
//!
//! Run lifecycle: `Idle -> Running -> Draining -> Idle`. A stop request moves
//! a run to `Draining`: the dispatcher stops handing out IDs, in-flight units
//! finish, the cursor is persisted and a paused completion is published. A
//! run that exhausts its ID range skips `Draining` and completes unpaused.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::config::EngineConfig;
use super::dispatch::{BoundPolicy, Dispatcher, TrailingMissPolicy};
use super::error::SyncError;
use super::pool::{execute_unit, spawn_pool, Outcome, UnitContext, UnitStatus};
use super::publisher::{EventFilter, Publisher, Subscription, SyncEvent};
use super::watermark::WatermarkTracker;
use crate::fetch::{Fetcher, RateLimiter};
use crate::merge::{MergeError, MergeScope};
use crate::state::{Cursor, SyncRunStats, SyncStats, SyncStore};
use crate::types::EntityKind;

/// Result of a single-ID operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOneResult {
    pub success: bool,
    pub name: Option<String>,
    pub error: Option<String>,
}

impl SyncOneResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            name: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of re-syncing the IDs recorded as failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryFailedSummary {
    pub attempted: u64,
    pub recovered: u64,
    pub not_found: u64,
    pub still_failing: u64,
}

/// Outcome of a bulk icon repair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixIconsSummary {
    /// Records with an empty or placeholder icon before the repair.
    pub total_missing: u64,
    pub attempted: u64,
    pub fixed: u64,
    pub failed: u64,
    /// Records still missing an icon afterwards.
    pub remaining: u64,
    pub message: String,
}

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub kind: EntityKind,
    pub start_id: u32,
    pub last_contiguous_id: u32,
    pub max_known_id: u32,
    pub merged: u64,
    pub not_found: u64,
    pub failed: u64,
    pub retries: u64,
    pub paused: bool,
    /// The run started past the cursor and did not move it.
    pub detached: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle { last: Option<RunSummary> },
    Running,
    Draining,
}

struct RunSlot {
    cancel: CancellationToken,
    done: watch::Receiver<Option<RunSummary>>,
}

struct Inner {
    store: Arc<dyn SyncStore>,
    fetchers: HashMap<EntityKind, Arc<dyn Fetcher>>,
    config: EngineConfig,
    publisher: Publisher,
    runs: Mutex<HashMap<EntityKind, RunSlot>>,
    last: Mutex<HashMap<EntityKind, RunSummary>>,
}

impl Inner {
    fn runs(&self) -> MutexGuard<'_, HashMap<EntityKind, RunSlot>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn last(&self) -> MutexGuard<'_, HashMap<EntityKind, RunSummary>> {
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the kind's slot. Full runs, failed-ID retries and icon repairs
    /// of one kind exclude each other.
    fn reserve(
        &self,
        kind: EntityKind,
    ) -> Result<(CancellationToken, watch::Sender<Option<RunSummary>>), SyncError> {
        let mut runs = self.runs();
        if runs.contains_key(&kind) {
            return Err(SyncError::AlreadyRunning(kind));
        }
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);
        runs.insert(
            kind,
            RunSlot {
                cancel: cancel.clone(),
                done: done_rx,
            },
        );
        Ok((cancel, done_tx))
    }

    fn reserve_batch(&self, kind: EntityKind) -> Result<BatchSlot<'_>, SyncError> {
        let (cancel, done) = self.reserve(kind)?;
        Ok(BatchSlot {
            inner: self,
            kind,
            cancel,
            _done: done,
        })
    }

    fn fetcher(&self, kind: EntityKind) -> Option<Arc<dyn Fetcher>> {
        self.fetchers.get(&kind).cloned()
    }

    fn unit_context(
        &self,
        kind: EntityKind,
        fetcher: Arc<dyn Fetcher>,
        scope: MergeScope,
    ) -> UnitContext {
        let kind_config = self.config.kind(kind);
        UnitContext {
            kind,
            fetcher,
            store: self.store.clone(),
            limiter: Arc::new(RateLimiter::new(kind_config.min_request_interval)),
            retry: self.config.retry.clone(),
            fetch_timeout: self.config.fetch_timeout,
            scope,
        }
    }
}

/// A kind's slot held by a batch operation; released on drop.
struct BatchSlot<'a> {
    inner: &'a Inner,
    kind: EntityKind,
    cancel: CancellationToken,
    _done: watch::Sender<Option<RunSummary>>,
}

impl Drop for BatchSlot<'_> {
    fn drop(&mut self) {
        self.inner.runs().remove(&self.kind);
    }
}

/// Parameters of one run, fixed at start.
struct RunPlan {
    kind: EntityKind,
    start_id: u32,
    batch_size: Option<u32>,
    cursor: Cursor,
    detached: bool,
    run_id: i64,
}

/// Service interface of the sync engine.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("kinds", &self.inner.fetchers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Build a coordinator. A later fetcher for the same kind replaces an
    /// earlier one.
    pub fn new(
        store: Arc<dyn SyncStore>,
        fetchers: impl IntoIterator<Item = Arc<dyn Fetcher>>,
        config: EngineConfig,
    ) -> Self {
        let fetchers = fetchers.into_iter().map(|f| (f.kind(), f)).collect();
        Self {
            inner: Arc::new(Inner {
                store,
                fetchers,
                publisher: Publisher::new(config.progress_buffer),
                config,
                runs: Mutex::new(HashMap::new()),
                last: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.inner.publisher.subscribe(filter)
    }

    /// Start a full sync of `kind`.
    ///
    /// Resumes after the stored cursor unless `start_id` is given. Returns
    /// once the run is launched; progress and completion arrive as events.
    pub async fn start_full_sync(
        &self,
        kind: EntityKind,
        start_id: Option<u32>,
        batch_size: Option<u32>,
    ) -> Result<(), SyncError> {
        let fetcher = self
            .inner
            .fetcher(kind)
            .ok_or_else(|| SyncError::config(format!("no fetcher registered for {kind}")))?;
        let kind_config = self.inner.config.kind(kind);
        if kind_config.workers == 0 {
            return Err(SyncError::config(format!("{kind} worker count is 0")));
        }
        if start_id == Some(0) {
            return Err(SyncError::config("start ID must be at least 1"));
        }
        if batch_size == Some(0) {
            return Err(SyncError::config("batch size must be at least 1"));
        }

        // Reserve the kind before the first await so concurrent starts race
        // on the lock, not on the store.
        let (cancel, done_tx) = self.inner.reserve(kind)?;

        let plan = match self.plan_run(kind, start_id, batch_size).await {
            Ok(plan) => plan,
            Err(e) => {
                self.inner.runs().remove(&kind);
                return Err(e);
            }
        };

        tracing::info!(
            kind = %kind,
            start_id = plan.start_id,
            batch_size = ?plan.batch_size,
            max_id = ?kind_config.max_id,
            workers = kind_config.workers,
            "Starting sync run"
        );
        if plan.detached {
            tracing::info!(
                kind = %kind,
                cursor = plan.cursor.last_contiguous_id,
                "Run starts past the cursor; cursor will not be moved"
            );
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let summary = run_sync(&inner, plan, fetcher, cancel).await;
            // The summary must be visible before the slot goes away.
            inner.last().insert(kind, summary.clone());
            inner.runs().remove(&kind);
            inner.publisher.publish(SyncEvent::Complete {
                kind,
                message: summary.message.clone(),
                paused: summary.paused,
            });
            let _ = done_tx.send(Some(summary));
        });

        Ok(())
    }

    async fn plan_run(
        &self,
        kind: EntityKind,
        start_id: Option<u32>,
        batch_size: Option<u32>,
    ) -> Result<RunPlan, SyncError> {
        let cursor = self.inner.store.load_cursor(kind).await?;
        let start_id = start_id.unwrap_or_else(|| cursor.resume_id());

        if let Some(max_id) = self.inner.config.kind(kind).max_id {
            if start_id > max_id {
                return Err(SyncError::config(format!(
                    "start ID {start_id} is beyond the configured max ID {max_id} for {kind}"
                )));
            }
        }

        let detached = start_id > cursor.resume_id();
        let run_id = self.inner.store.start_sync_run(kind, start_id).await?;
        Ok(RunPlan {
            kind,
            start_id,
            batch_size,
            cursor,
            detached,
            run_id,
        })
    }

    /// Stop every active run. In-flight IDs drain before each run completes.
    pub fn stop_sync(&self) {
        for (kind, slot) in self.inner.runs().iter() {
            if !slot.cancel.is_cancelled() {
                tracing::info!(kind = %kind, "Stop requested");
                slot.cancel.cancel();
            }
        }
    }

    /// Stop one kind's run. Returns false if it was not running.
    pub fn stop_kind(&self, kind: EntityKind) -> bool {
        match self.inner.runs().get(&kind) {
            Some(slot) => {
                slot.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn run_state(&self, kind: EntityKind) -> RunState {
        if let Some(slot) = self.inner.runs().get(&kind) {
            return if slot.cancel.is_cancelled() {
                RunState::Draining
            } else {
                RunState::Running
            };
        }
        RunState::Idle {
            last: self.inner.last().get(&kind).cloned(),
        }
    }

    /// Wait for the active run of `kind` to finish. When idle, or when the
    /// slot was held by a batch operation, returns the last finished run's
    /// summary.
    pub async fn wait(&self, kind: EntityKind) -> Option<RunSummary> {
        let done = self.inner.runs().get(&kind).map(|slot| slot.done.clone());
        let Some(mut done) = done else {
            return self.inner.last().get(&kind).cloned();
        };
        let summary = done.wait_for(Option::is_some).await.ok().and_then(|s| s.clone());
        summary.or_else(|| self.inner.last().get(&kind).cloned())
    }

    /// Fetch and merge a single ID outside of any run.
    pub async fn sync_one(&self, kind: EntityKind, id: u32) -> SyncOneResult {
        self.single(kind, id, MergeScope::Full).await
    }

    /// Re-fetch a record and update only its icon.
    pub async fn fix_icon(&self, kind: EntityKind, id: u32) -> SyncOneResult {
        if !matches!(kind, EntityKind::Item | EntityKind::Spell) {
            return SyncOneResult::failed(MergeError::NoIcon(kind).to_string());
        }
        self.single(kind, id, MergeScope::Icon).await
    }

    async fn single(&self, kind: EntityKind, id: u32, scope: MergeScope) -> SyncOneResult {
        if id == 0 {
            return SyncOneResult::failed("ID must be at least 1");
        }
        let Some(fetcher) = self.inner.fetcher(kind) else {
            return SyncOneResult::failed(format!("no fetcher registered for {kind}"));
        };

        let ctx = self.inner.unit_context(kind, fetcher, scope);
        let outcome = execute_unit(&ctx, id, None).await;
        match outcome.status {
            UnitStatus::Merged { name } => {
                if let Err(e) = self.inner.store.clear_failure(kind, id).await {
                    tracing::warn!(kind = %kind, id, error = %e, "Failed to clear failure record");
                }
                tracing::info!(kind = %kind, id, name = %name, "Synced");
                SyncOneResult {
                    success: true,
                    name: Some(name),
                    error: None,
                }
            }
            UnitStatus::SkippedNotFound => {
                SyncOneResult::failed(format!("{} {id} not found", kind.label()))
            }
            UnitStatus::SkippedError(e) | UnitStatus::Retrying { error: e, .. } => {
                SyncOneResult::failed(e)
            }
        }
    }

    /// Re-sync every ID of `kind` recorded as failed.
    pub async fn retry_failed(&self, kind: EntityKind) -> Result<RetryFailedSummary, SyncError> {
        let fetcher = self
            .inner
            .fetcher(kind)
            .ok_or_else(|| SyncError::config(format!("no fetcher registered for {kind}")))?;
        let slot = self.inner.reserve_batch(kind)?;

        let failed = self.inner.store.get_failed(Some(kind)).await?;
        if failed.is_empty() {
            return Ok(RetryFailedSummary::default());
        }
        tracing::info!(kind = %kind, count = failed.len(), "Retrying failed IDs");

        let ids = failed.into_iter().map(|f| f.id).collect();
        let outcomes = self
            .run_batch(kind, fetcher, MergeScope::Full, ids, &slot.cancel)
            .await;
        let mut summary = RetryFailedSummary {
            attempted: outcomes.len() as u64,
            ..Default::default()
        };

        let store = &self.inner.store;
        for outcome in outcomes {
            match outcome.status {
                UnitStatus::Merged { .. } => {
                    summary.recovered += 1;
                    store.clear_failure(kind, outcome.id).await?;
                }
                UnitStatus::SkippedNotFound => {
                    summary.not_found += 1;
                    store.clear_failure(kind, outcome.id).await?;
                }
                UnitStatus::SkippedError(e) | UnitStatus::Retrying { error: e, .. } => {
                    summary.still_failing += 1;
                    store.record_failure(kind, outcome.id, &e).await?;
                }
            }
        }
        Ok(summary)
    }

    /// Re-fetch the icon of every stored item or spell whose icon is empty
    /// or a placeholder. `limit` caps how many are attempted, lowest IDs
    /// first.
    pub async fn fix_missing_icons(
        &self,
        kind: EntityKind,
        limit: Option<usize>,
    ) -> Result<FixIconsSummary, SyncError> {
        if !matches!(kind, EntityKind::Item | EntityKind::Spell) {
            return Err(MergeError::NoIcon(kind).into());
        }
        let fetcher = self
            .inner
            .fetcher(kind)
            .ok_or_else(|| SyncError::config(format!("no fetcher registered for {kind}")))?;
        let slot = self.inner.reserve_batch(kind)?;

        let missing = self.inner.store.missing_icons(kind).await?;
        let total_missing = missing.len() as u64;
        if missing.is_empty() {
            return Ok(FixIconsSummary {
                message: format!("All {kind} icons are already fixed"),
                ..Default::default()
            });
        }

        let ids: Vec<u32> = match limit {
            Some(n) if n > 0 => missing.into_iter().take(n).collect(),
            _ => missing,
        };
        tracing::info!(kind = %kind, total_missing, count = ids.len(), "Fixing missing icons");

        let outcomes = self
            .run_batch(kind, fetcher, MergeScope::Icon, ids, &slot.cancel)
            .await;
        let still_missing: HashSet<u32> = self
            .inner
            .store
            .missing_icons(kind)
            .await?
            .into_iter()
            .collect();

        let mut summary = FixIconsSummary {
            total_missing,
            attempted: outcomes.len() as u64,
            remaining: still_missing.len() as u64,
            ..Default::default()
        };
        for outcome in outcomes {
            let id = outcome.id;
            match outcome.status {
                UnitStatus::Merged { .. } if !still_missing.contains(&id) => summary.fixed += 1,
                UnitStatus::Merged { .. } => {
                    summary.failed += 1;
                    tracing::debug!(kind = %kind, id, "No icon upstream either");
                }
                UnitStatus::SkippedNotFound => {
                    summary.failed += 1;
                    tracing::debug!(kind = %kind, id, "Gone upstream");
                }
                UnitStatus::SkippedError(e) | UnitStatus::Retrying { error: e, .. } => {
                    summary.failed += 1;
                    tracing::warn!(kind = %kind, id, error = %e, "Icon repair failed");
                }
            }
        }
        summary.message = format!(
            "Fixed {} {kind} icons, {} failed, {} remaining",
            summary.fixed, summary.failed, summary.remaining
        );
        Ok(summary)
    }

    /// Process `ids` through a bounded set of concurrent units, stopping
    /// dispatch once `cancel` fires.
    async fn run_batch(
        &self,
        kind: EntityKind,
        fetcher: Arc<dyn Fetcher>,
        scope: MergeScope,
        ids: Vec<u32>,
        cancel: &CancellationToken,
    ) -> Vec<Outcome> {
        let ctx = Arc::new(self.inner.unit_context(kind, fetcher, scope));
        let workers = self.inner.config.kind(kind).workers.max(1);
        stream::iter(ids.into_iter().take_while(|_| !cancel.is_cancelled()))
            .map(|id| {
                let ctx = ctx.clone();
                async move { execute_unit(&ctx, id, None).await }
            })
            .buffer_unordered(workers)
            .collect()
            .await
    }

    /// Record counts and highest known IDs per kind.
    pub async fn get_sync_stats(&self) -> Result<SyncStats, SyncError> {
        Ok(self.inner.store.get_stats().await?)
    }
}

/// Drive one run to completion and persist its results.
async fn run_sync(
    inner: &Inner,
    plan: RunPlan,
    fetcher: Arc<dyn Fetcher>,
    cancel: CancellationToken,
) -> RunSummary {
    let kind = plan.kind;
    let kind_config = inner.config.kind(kind);
    let flush_every = inner.config.cursor_flush_every.max(1);

    // Cancelled by a stop request (via the parent) or by the miss policy.
    let halt = cancel.child_token();
    let dispatcher = Dispatcher::new(
        plan.start_id,
        plan.batch_size,
        kind_config.max_id,
        halt.clone(),
    );
    let bound = dispatcher.end().or_else(|| {
        (plan.cursor.max_known_id >= plan.start_id).then_some(plan.cursor.max_known_id)
    });
    let total = bound.map(|end| u64::from(end - plan.start_id) + 1);
    // A known end is authoritative; trailing misses only end open runs.
    let mut policy = dispatcher
        .end()
        .is_none()
        .then(|| TrailingMissPolicy::new(kind_config.miss_threshold));

    let ctx = Arc::new(inner.unit_context(kind, fetcher, MergeScope::Full));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pool = spawn_pool(ctx, dispatcher, kind_config.workers, tx);

    let mut tracker = WatermarkTracker::new(plan.start_id);
    let mut names: HashMap<u32, String> = HashMap::new();
    let mut stats = SyncRunStats::default();
    let mut retries = 0u64;
    let mut since_flush = 0u32;

    while let Some(outcome) = rx.recv().await {
        let id = outcome.id;
        let found = match outcome.status {
            UnitStatus::Retrying { attempt, error } => {
                retries += 1;
                tracing::debug!(kind = %kind, id, attempt, error = %error, "Retrying");
                continue;
            }
            UnitStatus::Merged { name } => {
                stats.merged += 1;
                names.insert(id, name);
                if let Err(e) = inner.store.clear_failure(kind, id).await {
                    tracing::warn!(kind = %kind, id, error = %e, "Failed to clear failure record");
                }
                true
            }
            UnitStatus::SkippedNotFound => {
                stats.not_found += 1;
                false
            }
            UnitStatus::SkippedError(message) => {
                stats.failed += 1;
                tracing::warn!(kind = %kind, id, error = %message, "Skipping ID");
                if let Err(e) = inner.store.record_failure(kind, id, &message).await {
                    tracing::warn!(kind = %kind, id, error = %e, "Failed to record failure");
                }
                inner.publisher.publish(SyncEvent::Error {
                    kind,
                    message: format!("{} {id}: {message}", kind.label()),
                });
                false
            }
        };

        let Some(advance) = tracker.complete(id, found) else {
            continue;
        };

        let mut name = String::new();
        for (drained, found) in &advance.drained {
            if let Some(policy) = policy.as_mut() {
                policy.observe(*drained, *found);
            }
            if let Some(n) = names.remove(drained) {
                if *drained == advance.last_contiguous_id {
                    name = n;
                }
            }
        }
        let exhausted = policy.as_ref().is_some_and(TrailingMissPolicy::exhausted);
        if exhausted && !halt.is_cancelled() {
            tracing::info!(
                kind = %kind,
                last_id = advance.last_contiguous_id,
                threshold = kind_config.miss_threshold,
                "No records for a while, assuming end of ID space"
            );
            halt.cancel();
        }

        since_flush += 1;
        if since_flush >= flush_every && !plan.detached {
            since_flush = 0;
            save_cursor(inner, &plan, &tracker).await;
        }

        let current = u64::from(advance.last_contiguous_id - plan.start_id) + 1;
        inner.publisher.publish(SyncEvent::Progress {
            kind,
            current,
            // An estimate from the previous run may be overshot.
            total: total.map(|t| t.max(current)),
            id: advance.last_contiguous_id,
            name,
        });
    }

    if let Err(e) = pool.await {
        tracing::error!(kind = %kind, error = %e, "Worker pool task failed");
    }

    let paused = cancel.is_cancelled();
    let cursor = save_cursor(inner, &plan, &tracker).await;

    stats.last_contiguous_id = tracker.last_contiguous_id();
    stats.interrupted = paused;
    if let Err(e) = inner.store.complete_sync_run(plan.run_id, &stats).await {
        tracing::warn!(kind = %kind, error = %e, "Failed to record sync run");
    }

    let verb = if paused { "paused" } else { "complete" };
    let position = if plan.detached {
        format!("stopped at ID {}, cursor unchanged", tracker.last_contiguous_id())
    } else {
        format!("cursor at ID {}", cursor.last_contiguous_id)
    };
    let message = format!(
        "{} sync {verb}: {} synced, {} not found, {} failed ({position})",
        kind.label(),
        stats.merged,
        stats.not_found,
        stats.failed,
    );
    tracing::info!(kind = %kind, retries, "{message}");

    RunSummary {
        kind,
        start_id: plan.start_id,
        last_contiguous_id: tracker.last_contiguous_id(),
        max_known_id: cursor.max_known_id,
        merged: stats.merged,
        not_found: stats.not_found,
        failed: stats.failed,
        retries,
        paused,
        detached: plan.detached,
        message,
    }
}

/// Persist the run's progress and return the cursor as stored.
///
/// A detached run only contributes its highest Found ID.
async fn save_cursor(inner: &Inner, plan: &RunPlan, tracker: &WatermarkTracker) -> Cursor {
    let last_contiguous_id = if plan.detached {
        plan.cursor.last_contiguous_id
    } else {
        plan.cursor
            .last_contiguous_id
            .max(tracker.last_contiguous_id())
    };
    let cursor = Cursor {
        kind: plan.kind,
        last_contiguous_id,
        max_known_id: plan.cursor.max_known_id.max(tracker.highest_found()),
        updated_at: Some(Utc::now()),
    };
    if let Err(e) = inner.store.save_cursor(&cursor).await {
        tracing::warn!(kind = %plan.kind, error = %e, "Failed to persist cursor");
    }
    cursor
}
