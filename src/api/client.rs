//! HTTP client for the Cloudflare v4 REST API
//!
//! All responses share the standard Cloudflare envelope
//! `{success, errors, messages, result}`. HTTP 429 responses are mapped to
//! [`SyncError::RateLimited`] carrying the parsed `Retry-After` value so the
//! executor can treat them as flow control rather than failure.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::SyncError;

/// Standard Cloudflare API response envelope
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiError>,
    pub result: Option<T>,
}

/// A single error entry in the API envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

/// A managed list as returned by the rules lists endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteList {
    pub id: String,
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub num_items: Option<u64>,
}

/// A single list member on the wire
#[derive(Debug, Serialize, Deserialize)]
struct ListItem {
    ip: String,
}

/// Client for the Cloudflare v4 REST API
#[derive(Debug, Clone)]
pub struct CloudflareClient {
    client: Client,
    api_token: String,
    base_url: String,
}

impl CloudflareClient {
    /// Create a new client with a uniform per-request timeout
    pub fn new(api_token: &str, http: &HttpConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_token: api_token.to_string(),
            base_url: http.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// List the managed lists in an account
    pub async fn list_ip_lists(&self, account_id: &str) -> Result<Vec<RemoteList>, SyncError> {
        let url = format!("{}/accounts/{}/rules/lists", self.base_url, account_id);

        debug!(account_id = account_id, "Listing managed lists");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(SyncError::from_transport)?;

        let result: Option<Vec<RemoteList>> = parse_envelope(response).await?;
        Ok(result.unwrap_or_default())
    }

    /// Read the current members of a managed list
    ///
    /// A transport or API failure here is returned as an error, never as an
    /// empty set: "unknown" and "empty" are different answers, and the caller
    /// must skip the sync when the current membership cannot be read.
    pub async fn get_list_items(
        &self,
        account_id: &str,
        list_id: &str,
    ) -> Result<HashSet<String>, SyncError> {
        let url = format!(
            "{}/accounts/{}/rules/lists/{}/items",
            self.base_url, account_id, list_id
        );

        debug!(account_id = account_id, list_id = list_id, "Reading list members");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(SyncError::from_transport)?;

        let result: Option<Vec<ListItem>> = parse_envelope(response).await?;
        Ok(result
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.ip)
            .collect())
    }

    /// Replace the contents of a managed list with the given batch
    pub async fn replace_list_items(
        &self,
        account_id: &str,
        list_id: &str,
        batch: &[String],
    ) -> Result<(), SyncError> {
        let url = format!(
            "{}/accounts/{}/rules/lists/{}/items",
            self.base_url, account_id, list_id
        );

        let payload: Vec<ListItem> = batch.iter().map(|ip| ListItem { ip: ip.clone() }).collect();

        debug!(
            account_id = account_id,
            list_id = list_id,
            items = batch.len(),
            "Replacing list items"
        );

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await
            .map_err(SyncError::from_transport)?;

        let _: Option<serde_json::Value> = parse_envelope(response).await?;
        Ok(())
    }
}

/// Map an HTTP response to the decoded envelope result
///
/// Status errors take precedence over envelope decoding: a 429 or 5xx body
/// is not required to be a valid envelope.
async fn parse_envelope<T: DeserializeOwned>(response: Response) -> Result<Option<T>, SyncError> {
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());

            warn!(retry_after = ?retry_after, "Rate limited by Cloudflare API");
            Err(SyncError::RateLimited(retry_after))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Unauthorized),
        StatusCode::NOT_FOUND => Err(SyncError::NotFound),
        status if status.is_server_error() => Err(SyncError::ServerError(status.as_u16())),
        _ => {
            let envelope: ApiResponse<T> = response
                .json()
                .await
                .map_err(|e| SyncError::InvalidData(format!("Malformed API envelope: {}", e)))?;

            if !envelope.success {
                let message = envelope
                    .errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "Unknown API error".to_string());
                return Err(SyncError::Api(message));
            }

            Ok(envelope.result)
        }
    }
}
