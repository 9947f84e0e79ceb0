//! HTTP range source for the Cloudflare IP list.
//!
//! One `fetch` is exactly one round trip. There is no retry here: a failed
//! pass is simply retried by the next scheduled invocation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::SyncError;
use crate::rules::{IpVersion, RangeSet};

pub const DEFAULT_ENDPOINT: &str = "https://api.cloudflare.com/client/v4/ips";

/// A fetched snapshot of the provider's published ranges.
///
/// The etag identifies the snapshot as a whole; two equal etags mean the
/// full range lists are byte-identical, so it is the only staleness signal
/// the reconciler looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRanges {
    pub etag: String,
    pub ipv4: RangeSet,
    pub ipv6: RangeSet,
}

/// Source of the authoritative range list.
#[async_trait]
pub trait RangeSource: Send + Sync {
    /// Fetch the current published ranges and their fingerprint.
    async fn fetch(&self) -> Result<PublishedRanges, SyncError>;
}

/// Cloudflare API envelope: `{ success, errors, result: { etag, ... } }`.
#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
    result: Option<ApiResult>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    etag: Option<String>,
    #[serde(default)]
    ipv4_cidrs: Vec<String>,
    #[serde(default)]
    ipv6_cidrs: Vec<String>,
}

/// Range source backed by the Cloudflare `/client/v4/ips` endpoint.
pub struct CloudflareSource {
    client: Client,
    endpoint: String,
}

impl CloudflareSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("cfsync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::SourceUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl RangeSource for CloudflareSource {
    async fn fetch(&self) -> Result<PublishedRanges, SyncError> {
        debug!("Fetching ranges from {}", self.endpoint);

        let response = self
            .client
            .get(&self.endpoint)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| SyncError::SourceUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::SourceUnavailable(e.to_string()))?;

        if !status.is_success() {
            return Err(SyncError::SourceRejected(format!(
                "HTTP {}: {}",
                status,
                body.trim()
            )));
        }

        parse_ranges(&body)
    }
}

/// Parse a success-status response body into a range snapshot.
///
/// A well-formed envelope with `success: false` is a rejection by the
/// service, not a malformed response; a missing `result` or `etag` is.
pub fn parse_ranges(body: &str) -> Result<PublishedRanges, SyncError> {
    let envelope: ApiEnvelope =
        serde_json::from_str(body).map_err(|e| SyncError::SourceMalformed(e.to_string()))?;

    if !envelope.success {
        return Err(SyncError::SourceRejected(format!(
            "API reported failure: {}",
            serde_json::to_string(&envelope.errors).unwrap_or_default()
        )));
    }

    let result = envelope
        .result
        .ok_or_else(|| SyncError::SourceMalformed("response has no result object".to_string()))?;

    let etag = result
        .etag
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SyncError::SourceMalformed("response has no etag".to_string()))?;

    Ok(PublishedRanges {
        etag,
        ipv4: RangeSet::new(IpVersion::V4, result.ipv4_cidrs),
        ipv6: RangeSet::new(IpVersion::V6, result.ipv6_cidrs),
    })
}
