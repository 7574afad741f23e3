//! shelllab-sync command line.
//!
//! Thin shell over [`shelllab_sync::sync::SyncCoordinator`]: parses flags,
//! opens the local database, renders progress, and maps Ctrl+C to a graceful
//! stop so the cursor is persisted before exit.

#![warn(clippy::all)]

mod cli;
mod config;
mod shutdown;

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use shelllab_sync::fetch::turtlecraft::build_client;
use shelllab_sync::fetch::{Fetcher, TurtlecraftFetcher};
use shelllab_sync::state::{SqliteSyncStore, SyncStore};
use shelllab_sync::sync::{EventFilter, SyncCoordinator, SyncEvent};
use shelllab_sync::types::EntityKind;

use cli::Command;
use config::Config;

async fn open_existing(db_path: &Path) -> anyhow::Result<Option<SqliteSyncStore>> {
    if !db_path.exists() {
        println!("No database found at {}", db_path.display());
        println!("Run a sync first to create it.");
        return Ok(None);
    }
    Ok(Some(SqliteSyncStore::open(db_path).await?))
}

fn build_coordinator(config: &Config, store: Arc<dyn SyncStore>) -> anyhow::Result<SyncCoordinator> {
    let client = build_client(config.fetch_timeout)?;
    let fetchers = EntityKind::ALL.into_iter().map(|kind| {
        Arc::new(TurtlecraftFetcher::new(client.clone(), &config.base_url, kind)) as Arc<dyn Fetcher>
    });
    Ok(SyncCoordinator::new(store, fetchers, config.engine.clone()))
}

/// Bar for one kind. Runs without a known end get a spinner instead.
fn create_progress_bar(multi: &MultiProgress, kind: EntityKind, hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::with_template("{prefix:>6} [{elapsed_precise}] {spinner} {pos} {msg}")
            .expect("valid template"),
    );
    pb.set_prefix(kind.as_str());
    pb
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:>6} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .expect("valid template")
    .progress_chars("=> ")
}

/// Start every kind or none: when one start fails, the runs already started
/// are stopped and drained before the error is returned.
async fn start_kinds(
    coordinator: &SyncCoordinator,
    kinds: &[EntityKind],
    start_id: Option<u32>,
    batch_size: Option<u32>,
) -> anyhow::Result<()> {
    for (i, &kind) in kinds.iter().enumerate() {
        if let Err(e) = coordinator.start_full_sync(kind, start_id, batch_size).await {
            coordinator.stop_sync();
            for &started in &kinds[..i] {
                if let Some(summary) = coordinator.wait(started).await {
                    println!("{}", summary.message);
                }
            }
            return Err(e.into());
        }
    }
    Ok(())
}

async fn run_sync(config: Config, args: cli::SyncArgs) -> anyhow::Result<()> {
    let store: Arc<dyn SyncStore> = Arc::new(SqliteSyncStore::open(&config.db_path).await?);
    let coordinator = build_coordinator(&config, store)?;

    let mut kinds = args.kinds.clone();
    kinds.sort();
    kinds.dedup();

    let hidden = config.no_progress_bar || !std::io::stdout().is_terminal();
    let multi = MultiProgress::new();
    let mut events = coordinator.subscribe(EventFilter::kinds(kinds.iter().copied()));

    let shutdown_token = shutdown::install_signal_handler()?;
    {
        let coordinator = coordinator.clone();
        let token = shutdown_token.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            coordinator.stop_sync();
        });
    }

    start_kinds(&coordinator, &kinds, args.start_id, args.batch_size).await?;
    let bars: HashMap<EntityKind, ProgressBar> = kinds
        .iter()
        .map(|&kind| (kind, create_progress_bar(&multi, kind, hidden)))
        .collect();

    let mut remaining = kinds.len();
    while remaining > 0 {
        let Some(event) = events.recv().await else {
            break;
        };
        let Some(pb) = bars.get(&event.kind()) else {
            continue;
        };
        match event {
            SyncEvent::Progress {
                current,
                total,
                id,
                name,
                ..
            } => {
                if let Some(total) = total {
                    if pb.length() != Some(total) {
                        pb.set_style(bar_style());
                        pb.set_length(total);
                    }
                }
                pb.set_position(current);
                pb.set_message(if name.is_empty() {
                    format!("#{id}")
                } else {
                    format!("#{id} {name}")
                });
            }
            SyncEvent::Error { message, .. } => {
                pb.suspend(|| tracing::warn!("{message}"));
            }
            SyncEvent::Complete { message, .. } => {
                pb.finish_and_clear();
                multi.suspend(|| tracing::info!("{message}"));
                remaining -= 1;
            }
        }
    }

    let mut any_failed = false;
    for &kind in &kinds {
        if let Some(summary) = coordinator.wait(kind).await {
            println!("{}", summary.message);
            any_failed |= summary.failed > 0;
        }
    }
    if any_failed {
        println!("Run `shelllab-sync status --failed` to list failed IDs, or `retry-failed <kind>` to retry them.");
    }
    if events.dropped() > 0 {
        tracing::debug!(dropped = events.dropped(), "Progress updates skipped");
    }

    Ok(())
}

async fn run_single(config: Config, args: cli::SingleArgs, icon_only: bool) -> anyhow::Result<()> {
    let store: Arc<dyn SyncStore> = Arc::new(SqliteSyncStore::open(&config.db_path).await?);
    let coordinator = build_coordinator(&config, store)?;

    let result = if icon_only {
        coordinator.fix_icon(args.kind, args.id).await
    } else {
        coordinator.sync_one(args.kind, args.id).await
    };

    if result.success {
        println!(
            "{} {}: {}",
            args.kind.label(),
            args.id,
            result.name.as_deref().unwrap_or("")
        );
        Ok(())
    } else {
        anyhow::bail!(
            "{} {}: {}",
            args.kind.label(),
            args.id,
            result.error.as_deref().unwrap_or("unknown error")
        )
    }
}

async fn run_retry_failed(config: Config, args: cli::KindArg) -> anyhow::Result<()> {
    let Some(store) = open_existing(&config.db_path).await? else {
        return Ok(());
    };
    let coordinator = build_coordinator(&config, Arc::new(store))?;
    let summary = coordinator.retry_failed(args.kind).await?;

    if summary.attempted == 0 {
        println!("No failed {} IDs.", args.kind.label());
        return Ok(());
    }
    println!("Retried {} {} IDs:", summary.attempted, args.kind.label());
    println!("  Recovered:     {}", summary.recovered);
    println!("  Not found:     {}", summary.not_found);
    println!("  Still failing: {}", summary.still_failing);
    Ok(())
}

async fn run_fix_icons(config: Config, args: cli::FixIconsArgs) -> anyhow::Result<()> {
    let Some(store) = open_existing(&config.db_path).await? else {
        return Ok(());
    };
    let coordinator = build_coordinator(&config, Arc::new(store))?;
    let summary = coordinator.fix_missing_icons(args.kind, args.limit).await?;

    println!("{}", summary.message);
    if summary.attempted > 0 && summary.attempted < summary.total_missing {
        println!(
            "Attempted {} of {} missing; run again to continue.",
            summary.attempted, summary.total_missing
        );
    }
    Ok(())
}

async fn run_stats(config: Config) -> anyhow::Result<()> {
    let Some(store) = open_existing(&config.db_path).await? else {
        return Ok(());
    };
    let stats = store.get_stats().await?;

    println!("{:<8} {:>10} {:>12}", "Kind", "Records", "Max known ID");
    for kind in EntityKind::ALL {
        println!(
            "{:<8} {:>10} {:>12}",
            kind.as_str(),
            stats.count(kind),
            stats.max_known_id(kind)
        );
    }
    Ok(())
}

async fn run_status(config: Config, args: cli::StatusArgs) -> anyhow::Result<()> {
    let Some(store) = open_existing(&config.db_path).await? else {
        return Ok(());
    };
    let summary = store.get_summary().await?;

    println!("Database: {}", config.db_path.display());
    println!();
    for kind in &summary.kinds {
        println!("{}:", kind.kind.label());
        println!("  Records:      {}", kind.records);
        println!("  Cursor:       {}", kind.cursor.last_contiguous_id);
        println!("  Max known ID: {}", kind.cursor.max_known_id);
        println!("  Failed:       {}", kind.failed);
        if let Some(updated) = &kind.cursor.updated_at {
            println!("  Updated:      {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    println!();

    if let Some(started) = &summary.last_sync_started {
        println!(
            "Last sync started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_sync_completed {
        println!(
            "Last sync completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if args.failed {
        let failed = store.get_failed(None).await?;
        if !failed.is_empty() {
            println!();
            println!("Failed IDs:");
            for entry in failed {
                println!(
                    "  {} {} ({} attempts) - {}",
                    entry.kind.label(),
                    entry.id,
                    entry.attempts,
                    entry.last_error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    Ok(())
}

async fn run_reset_cursor(config: Config, args: cli::ResetCursorArgs) -> anyhow::Result<()> {
    let Some(store) = open_existing(&config.db_path).await? else {
        return Ok(());
    };

    if !args.yes {
        let cursor = store.load_cursor(args.kind).await?;
        println!(
            "This will reset the {} cursor (currently at ID {}).",
            args.kind.label(),
            cursor.last_contiguous_id
        );
        println!("The next sync will start again from ID 1. Records are kept.");
        println!();
        print!("Are you sure? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if store.reset_cursor(args.kind).await? {
        println!("{} cursor reset.", args.kind.label());
    } else {
        println!("{} had no cursor.", args.kind.label());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.global.log_level.as_filter())),
        )
        .init();

    let sync_args = match &cli.command {
        Command::Sync(args) => Some(args),
        _ => None,
    };
    let config = Config::from_cli(&cli.global, sync_args)?;
    tracing::debug!(?config, "Resolved configuration");

    match cli.command {
        Command::Sync(args) => run_sync(config, args).await,
        Command::One(args) => run_single(config, args, false).await,
        Command::FixIcon(args) => run_single(config, args, true).await,
        Command::FixIcons(args) => run_fix_icons(config, args).await,
        Command::RetryFailed(args) => run_retry_failed(config, args).await,
        Command::Stats => run_stats(config).await,
        Command::Status(args) => run_status(config, args).await,
        Command::ResetCursor(args) => run_reset_cursor(config, args).await,
    }
}
