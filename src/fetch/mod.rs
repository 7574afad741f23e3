//! Remote fetching: one record per `(kind, id)` call.
//!
//! The [`Fetcher`] trait is the seam between the sync engine and the network.
//! [`TurtlecraftFetcher`] is the production implementation; tests plug in
//! scripted doubles.

pub mod error;
pub(crate) mod parse;
pub mod rate_limit;
pub mod turtlecraft;

use async_trait::async_trait;

use crate::record::EntityRecord;
use crate::types::EntityKind;

pub use error::FetchError;
pub use rate_limit::RateLimiter;
pub use turtlecraft::TurtlecraftFetcher;

/// Terminal result of a successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(EntityRecord),
    /// The ID does not exist upstream (or is an empty shell).
    NotFound,
}

/// Retrieves and parses one record of a single entity kind.
///
/// Implementations have no side effects beyond the remote call; rate
/// limiting, timeouts and retries are applied by the caller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn kind(&self) -> EntityKind;

    async fn fetch(&self, id: u32) -> Result<FetchOutcome, FetchError>;
}
