//! Source feed fetching
//!
//! Retrieves the desired membership of a managed list from an external URL.
//! Feeds are either newline-delimited text or a JSON document shaped
//! `{"prefixes": [{"ip_prefix": "..."}]}`. Fetching never fails: transient
//! errors are retried with backoff and jitter, exhausted retries fall back
//! to the last-known-good cache entry, and with no cache the result is an
//! empty set meaning "no update requested".

pub mod cache;

pub use cache::FeedCache;

use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{HttpConfig, RetryConfig};
use crate::error::SyncError;
use crate::sync::retry::RetryPolicy;

/// Source feed format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Newline-delimited plain text, one IP or prefix per line
    #[default]
    Text,
    /// JSON document with a `prefixes[].ip_prefix` shape
    Json,
}

/// A source feed: where to fetch the desired membership and how to parse it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub url: String,
    pub format: SourceFormat,
}

/// JSON feed document
#[derive(Debug, Deserialize)]
struct PrefixFeed {
    prefixes: Vec<PrefixEntry>,
}

#[derive(Debug, Deserialize)]
struct PrefixEntry {
    ip_prefix: String,
}

/// Fetches desired member sets from source feeds
pub struct SourceFetcher {
    client: Client,
    cache: FeedCache,
    retry: RetryPolicy,
    max_size: usize,
}

impl SourceFetcher {
    /// Create a fetcher with the configured timeout, retry policy and cache
    pub fn new(
        http: &HttpConfig,
        retry: RetryConfig,
        cache: FeedCache,
        max_size: usize,
    ) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            client,
            cache,
            retry: RetryPolicy::new(retry),
            max_size,
        })
    }

    /// Fetch the desired member set for a source
    ///
    /// All failure paths resolve to a set; an empty set means the caller
    /// should treat this list as "no update requested".
    pub async fn fetch(&self, spec: &SourceSpec) -> HashSet<String> {
        let result = self.retry.run(|| self.fetch_once(spec)).await;

        match result {
            Ok(members) => {
                if let Err(err) = self.cache.store(&spec.url, &members).await {
                    warn!(url = %spec.url, error = %err, "Failed to write feed cache entry");
                }
                self.truncate(&spec.url, members)
            }
            Err(err) => {
                warn!(url = %spec.url, error = %err, "Feed fetch failed after retries");
                match self.cache.load(&spec.url).await {
                    Some(cached) => {
                        warn!(
                            url = %spec.url,
                            members = cached.len(),
                            "Using cached feed copy (degraded mode)"
                        );
                        self.truncate(&spec.url, cached)
                    }
                    None => {
                        warn!(url = %spec.url, "No cached copy available, skipping update");
                        HashSet::new()
                    }
                }
            }
        }
    }

    /// One fetch attempt
    async fn fetch_once(&self, spec: &SourceSpec) -> Result<HashSet<String>, SyncError> {
        let response = self
            .client
            .get(&spec.url)
            .send()
            .await
            .map_err(SyncError::from_transport)?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| SyncError::Network(e.to_string()))?;

                let members = match spec.format {
                    SourceFormat::Text => parse_text(&body),
                    SourceFormat::Json => parse_json(&body)?,
                };

                info!(url = %spec.url, members = members.len(), "Feed fetched");
                Ok(members)
            }
            StatusCode::NOT_FOUND => Err(SyncError::NotFound),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Unauthorized),
            status if status.is_server_error() => Err(SyncError::ServerError(status.as_u16())),
            status => Err(SyncError::ServerError(status.as_u16())),
        }
    }

    /// Cap the set at the maximum cardinality
    ///
    /// Which members drop is whatever set iteration yields; callers must not
    /// depend on the selection.
    fn truncate(&self, url: &str, members: HashSet<String>) -> HashSet<String> {
        if members.len() <= self.max_size {
            return members;
        }

        let dropped = members.len() - self.max_size;
        warn!(
            url = url,
            max_size = self.max_size,
            dropped = dropped,
            "Feed exceeds maximum list size, truncating"
        );
        members.into_iter().take(self.max_size).collect()
    }
}

/// Parse a newline-delimited text feed
fn parse_text(body: &str) -> HashSet<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a JSON feed with a `prefixes[].ip_prefix` shape
fn parse_json(body: &str) -> Result<HashSet<String>, SyncError> {
    let feed: PrefixFeed = serde_json::from_str(body)
        .map_err(|e| SyncError::InvalidData(format!("Malformed feed JSON: {}", e)))?;

    Ok(feed
        .prefixes
        .into_iter()
        .map(|entry| entry.ip_prefix)
        .collect())
}
