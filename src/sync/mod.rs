//! The sync engine: dispatch, worker pool, watermark, events and the
//! coordinator that ties them together.

pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub(crate) mod pool;
pub mod publisher;
pub mod watermark;

pub use config::{EngineConfig, KindConfig};
pub use coordinator::{
    FixIconsSummary, RetryFailedSummary, RunState, RunSummary, SyncCoordinator, SyncOneResult,
};
pub use error::SyncError;
pub use publisher::{EventFilter, Subscription, SyncEvent};
