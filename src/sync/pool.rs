//! Bounded worker pool: fetch, retry, merge and persist one ID per unit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::error::SyncError;
use crate::fetch::{FetchError, FetchOutcome, Fetcher, RateLimiter};
use crate::merge::{merge_scoped, MergeError, MergeScope};
use crate::record::EntityRecord;
use crate::retry::{retry_with_backoff, retry_with_backoff_notify, RetryAction, RetryConfig};
use crate::state::SyncStore;
use crate::types::EntityKind;

/// Result of processing one ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    /// Fetched and merged into the store.
    Merged { name: String },
    SkippedNotFound,
    /// Gave up on this ID for the run.
    SkippedError(String),
    /// A retryable attempt failed; more attempts follow. Not terminal.
    Retrying { attempt: u32, error: String },
}

impl UnitStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retrying { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub id: u32,
    pub status: UnitStatus,
}

/// Everything a worker needs to process a unit.
pub(crate) struct UnitContext {
    pub(crate) kind: EntityKind,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) store: Arc<dyn SyncStore>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) retry: RetryConfig,
    pub(crate) fetch_timeout: Duration,
    pub(crate) scope: MergeScope,
}

fn classify(e: &FetchError) -> RetryAction {
    if e.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

/// Process one ID to a terminal status.
///
/// When `progress` is given, every failed-but-retryable attempt is reported
/// on it as [`UnitStatus::Retrying`] before the backoff sleep.
pub(crate) async fn execute_unit(
    ctx: &UnitContext,
    id: u32,
    progress: Option<&UnboundedSender<Outcome>>,
) -> Outcome {
    let attempt = move || async move {
        ctx.limiter.acquire().await;
        match tokio::time::timeout(ctx.fetch_timeout, ctx.fetcher.fetch(id)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(ctx.fetch_timeout)),
        }
    };

    let fetched = match progress {
        Some(tx) => {
            let on_retry = |attempt: u32, e: &FetchError| {
                let _ = tx.send(Outcome {
                    id,
                    status: UnitStatus::Retrying {
                        attempt,
                        error: e.to_string(),
                    },
                });
            };
            retry_with_backoff_notify(&ctx.retry, classify, on_retry, attempt).await
        }
        None => retry_with_backoff(&ctx.retry, classify, attempt).await,
    };

    let status = match fetched {
        Ok(FetchOutcome::Found(record)) => match persist(ctx, id, record).await {
            Ok(name) => UnitStatus::Merged { name },
            Err(e) => {
                tracing::warn!(kind = %ctx.kind, id, error = %e, "Failed to store record");
                UnitStatus::SkippedError(e.to_string())
            }
        },
        Ok(FetchOutcome::NotFound) => UnitStatus::SkippedNotFound,
        Err(e) => {
            tracing::debug!(kind = %ctx.kind, id, error = %e, "Giving up on ID");
            UnitStatus::SkippedError(e.to_string())
        }
    };
    Outcome { id, status }
}

async fn persist(ctx: &UnitContext, id: u32, record: EntityRecord) -> Result<String, SyncError> {
    if record.kind() != ctx.kind {
        return Err(MergeError::KindMismatch {
            existing: ctx.kind,
            incoming: record.kind(),
        }
        .into());
    }
    if record.id() != id {
        return Err(MergeError::IdMismatch {
            kind: ctx.kind,
            existing: id,
            incoming: record.id(),
        }
        .into());
    }

    let existing = ctx.store.get_record(ctx.kind, id).await?;
    let merged = merge_scoped(
        existing.as_ref().map(|local| &local.record),
        record,
        ctx.scope,
        Utc::now(),
    )?;
    ctx.store.upsert_record(&merged).await?;
    Ok(merged.record.name().to_string())
}

/// Run `ids` through `workers` concurrent units, sending every outcome
/// (retries included) on `tx`.
///
/// Each unit runs in its own task; a panicking unit becomes a
/// `SkippedError` for its ID and the pool keeps going. The channel closes
/// once the pool finishes and the last sender is dropped.
pub(crate) fn spawn_pool<I>(
    ctx: Arc<UnitContext>,
    ids: I,
    workers: usize,
    tx: UnboundedSender<Outcome>,
) -> JoinHandle<()>
where
    I: Iterator<Item = u32> + Send + 'static,
{
    tokio::spawn(async move {
        stream::iter(ids)
            .map(|id| {
                let ctx = ctx.clone();
                let unit_tx = tx.clone();
                async move {
                    let handle =
                        tokio::spawn(async move { execute_unit(&ctx, id, Some(&unit_tx)).await });
                    match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            tracing::error!(id, error = %e, "Worker panicked");
                            Outcome {
                                id,
                                status: UnitStatus::SkippedError(format!("worker panicked: {e}")),
                            }
                        }
                    }
                }
            })
            .buffer_unordered(workers.max(1))
            .for_each(|outcome| {
                let _ = tx.send(outcome);
                async {}
            })
            .await;
    })
}
