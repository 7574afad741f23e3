use clap::{Args, Parser, Subcommand};
use shelllab_sync::fetch::turtlecraft::DEFAULT_BASE_URL;
use shelllab_sync::types::{EntityKind, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "shelllab-sync",
    version,
    about = "Mirror the Turtle WoW database into a local SQLite file"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path of the local database
    #[arg(long, global = true, default_value = "~/.shelllab/shelllab.db")]
    pub db_path: String,

    /// Root URL of the remote database
    #[arg(long, global = true, env = "SHELLLAB_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Retries per ID after the first failed attempt
    #[arg(long, global = true, default_value_t = 2)]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 10)]
    pub timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk the ID space of one or more kinds, resuming from the cursor
    Sync(SyncArgs),

    /// Fetch and merge a single ID
    One(SingleArgs),

    /// Re-fetch a record and update only its icon
    FixIcon(SingleArgs),

    /// Re-fetch icons for every stored item or spell without one
    FixIcons(FixIconsArgs),

    /// Re-sync every ID recorded as failed
    RetryFailed(KindArg),

    /// Print record counts and highest known IDs
    Stats,

    /// Show cursors, failures and the last run
    Status(StatusArgs),

    /// Forget a kind's cursor so the next sync starts at ID 1
    ResetCursor(ResetCursorArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Kinds to sync; several run concurrently
    #[arg(value_enum, required = true)]
    pub kinds: Vec<EntityKind>,

    /// First ID to fetch instead of resuming after the cursor
    #[arg(long)]
    pub start_id: Option<u32>,

    /// Stop after this many IDs
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Never dispatch IDs above this one
    #[arg(long)]
    pub max_id: Option<u32>,

    /// Concurrent fetches per kind (defaults depend on the kind)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Minimum milliseconds between requests of one kind
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Consecutive missing IDs that end an open-ended run (0 disables)
    #[arg(long)]
    pub miss_threshold: Option<u32>,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug)]
pub struct SingleArgs {
    #[arg(value_enum)]
    pub kind: EntityKind,

    pub id: u32,
}

#[derive(Args, Debug)]
pub struct FixIconsArgs {
    #[arg(value_enum)]
    pub kind: EntityKind,

    /// Repair at most this many records (0 means all)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct KindArg {
    #[arg(value_enum)]
    pub kind: EntityKind,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// List the failed IDs
    #[arg(long)]
    pub failed: bool,
}

#[derive(Args, Debug)]
pub struct ResetCursorArgs {
    #[arg(value_enum)]
    pub kind: EntityKind,

    /// Skip the confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}
