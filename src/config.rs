use std::path::PathBuf;
use std::time::Duration;

use shelllab_sync::retry::RetryConfig;
use shelllab_sync::sync::EngineConfig;

use crate::cli::{GlobalArgs, SyncArgs};

/// Application configuration resolved from the command line.
pub struct Config {
    pub db_path: PathBuf,
    pub base_url: String,
    pub fetch_timeout: Duration,
    pub engine: EngineConfig,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("db_path", &self.db_path)
            .field("base_url", &self.base_url)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// `sync` carries the per-run overrides of the `sync` command; they
    /// apply to every kind named on the command line.
    pub fn from_cli(global: &GlobalArgs, sync: Option<&SyncArgs>) -> anyhow::Result<Self> {
        let base_url = global.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("Base URL must start with http:// or https://, got '{base_url}'");
        }
        if global.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }
        let fetch_timeout = Duration::from_secs(global.timeout);

        let mut engine = EngineConfig {
            retry: RetryConfig {
                max_retries: global.max_retries,
                ..RetryConfig::default()
            },
            fetch_timeout,
            ..EngineConfig::default()
        };

        let mut no_progress_bar = false;
        if let Some(args) = sync {
            if args.workers == Some(0) {
                anyhow::bail!("--workers must be at least 1");
            }
            if args.batch_size == Some(0) {
                anyhow::bail!("--batch-size must be at least 1");
            }
            if args.start_id == Some(0) {
                anyhow::bail!("--start-id must be at least 1");
            }
            if let (Some(start), Some(max)) = (args.start_id, args.max_id) {
                if start > max {
                    anyhow::bail!("--start-id {start} is beyond --max-id {max}");
                }
            }
            for &kind in &args.kinds {
                let kind_config = engine.kind_mut(kind);
                if let Some(workers) = args.workers {
                    kind_config.workers = workers;
                }
                if let Some(ms) = args.interval_ms {
                    kind_config.min_request_interval = Duration::from_millis(ms);
                }
                if args.max_id.is_some() {
                    kind_config.max_id = args.max_id;
                }
                if let Some(threshold) = args.miss_threshold {
                    kind_config.miss_threshold = threshold;
                }
            }
            no_progress_bar = args.no_progress_bar;
        }

        Ok(Self {
            db_path: expand_tilde(&global.db_path),
            base_url,
            fetch_timeout,
            engine,
            no_progress_bar,
        })
    }
}
