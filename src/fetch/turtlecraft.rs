//! HTTP fetcher for the Turtle WoW database site.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};

use super::error::FetchError;
use super::parse::parse_page;
use super::{FetchOutcome, Fetcher};
use crate::types::EntityKind;

pub const DEFAULT_BASE_URL: &str = "https://database.turtlecraft.gg";

const DEFAULT_USER_AGENT: &str = concat!("shelllab-sync/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by all kinds.
///
/// `timeout` is a transport-level backstop; the worker pool enforces its own
/// per-attempt deadline on top.
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

    Client::builder()
        .default_headers(default_headers)
        .timeout(timeout)
        .build()
}

/// Fetches `?<kind>=<id>` pages and parses them into records.
#[derive(Debug, Clone)]
pub struct TurtlecraftFetcher {
    client: Client,
    base_url: String,
    kind: EntityKind,
}

impl TurtlecraftFetcher {
    pub fn new(client: Client, base_url: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            kind,
        }
    }

    pub(crate) fn url_for(&self, id: u32) -> String {
        format!("{}/?{}={}", self.base_url, self.kind.query_key(), id)
    }
}

#[async_trait]
impl Fetcher for TurtlecraftFetcher {
    fn kind(&self) -> EntityKind {
        self.kind
    }

    async fn fetch(&self, id: u32) -> Result<FetchOutcome, FetchError> {
        let url = self.url_for(id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                source: e,
                url: url.clone(),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Http {
            source: e,
            url: url.clone(),
        })?;

        let outcome = parse_page(self.kind, id, &body)?;
        if matches!(outcome, FetchOutcome::NotFound) {
            tracing::debug!(kind = %self.kind, id, "Page has no record");
        }
        Ok(outcome)
    }
}
