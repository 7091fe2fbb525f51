//! Platform adapter contract + the four upstream contest adapters.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use radar_core::{Contest, ContestError, Platform};
use radar_storage::{FetchError, FetchedResponse, HttpFetcher};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::warn;

pub mod atcoder;
pub mod codechef;
pub mod codeforces;
pub mod leetcode;

pub use atcoder::AtCoderAdapter;
pub use codechef::CodeChefAdapter;
pub use codeforces::CodeforcesAdapter;
pub use leetcode::LeetCodeAdapter;

/// Raw upstream payload handed from the fetch step to the parse step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    pub platform: Platform,
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl FetchedPage {
    pub fn new(platform: Platform, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            platform,
            url: url.into(),
            content_type: None,
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }

    pub fn from_response(platform: Platform, response: FetchedResponse) -> Self {
        Self {
            platform,
            url: response.final_url,
            content_type: response.content_type,
            body: response.body,
            fetched_at: Utc::now(),
        }
    }

    /// Loads a captured payload from disk, e.g. `fixtures/codeforces/contest_list.json`.
    pub fn load(platform: Platform, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Self::new(platform, format!("file://{}", path.display()), body))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn json<T: DeserializeOwned>(&self) -> Result<T, AdapterError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| AdapterError::Payload(format!("invalid {} JSON: {e}", self.platform)))
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(#[from] FetchError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("upstream rejected the request: {0}")]
    Upstream(String),
    #[error("{found} payload handed to the {expected} adapter")]
    WrongPlatform { expected: Platform, found: Platform },
}

impl AdapterError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AdapterError::Network(_) | AdapterError::Timeout(_) => FailureKind::Network,
            AdapterError::Payload(_) | AdapterError::WrongPlatform { .. } => FailureKind::Parse,
            AdapterError::Upstream(_) => FailureKind::Upstream,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Network,
    Parse,
    Upstream,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Network => "network",
            FailureKind::Parse => "parse",
            FailureKind::Upstream => "upstream",
        })
    }
}

/// One platform that contributed nothing to an aggregated fetch, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformError {
    pub platform: Platform,
    pub kind: FailureKind,
    pub message: String,
}

impl PlatformError {
    pub fn new(platform: Platform, error: &AdapterError) -> Self {
        Self {
            platform,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.platform, self.kind, self.message)
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    fn listing_url(&self) -> &str;

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<FetchedPage, AdapterError>;

    /// Normalizes one payload. Malformed records are skipped; an `Err` means
    /// the payload as a whole was unusable.
    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<Contest>, AdapterError>;

    async fn fetch_contests(&self, http: &HttpFetcher) -> Result<Vec<Contest>, AdapterError> {
        let page = self.fetch_listing(http).await?;
        self.parse_listing(&page)
    }
}

pub fn adapter_for_platform(
    platform: Platform,
    listing_url: Option<&str>,
) -> Box<dyn SourceAdapter> {
    match (platform, listing_url) {
        (Platform::Codeforces, Some(url)) => Box::new(CodeforcesAdapter::with_listing_url(url)),
        (Platform::Codeforces, None) => Box::<CodeforcesAdapter>::default(),
        (Platform::LeetCode, Some(url)) => Box::new(LeetCodeAdapter::with_listing_url(url)),
        (Platform::LeetCode, None) => Box::<LeetCodeAdapter>::default(),
        (Platform::CodeChef, Some(url)) => Box::new(CodeChefAdapter::with_listing_url(url)),
        (Platform::CodeChef, None) => Box::<CodeChefAdapter>::default(),
        (Platform::AtCoder, Some(url)) => Box::new(AtCoderAdapter::with_listing_url(url)),
        (Platform::AtCoder, None) => Box::<AtCoderAdapter>::default(),
    }
}

pub fn default_adapters() -> Vec<Box<dyn SourceAdapter>> {
    Platform::ALL
        .into_iter()
        .map(|p| adapter_for_platform(p, None))
        .collect()
}

fn ensure_platform(expected: Platform, page: &FetchedPage) -> Result<(), AdapterError> {
    if page.platform != expected {
        return Err(AdapterError::WrongPlatform {
            expected,
            found: page.platform,
        });
    }
    Ok(())
}

/// Why a single upstream record did not become a contest.
#[derive(Debug)]
enum Skip {
    /// Valid record that the platform's native filter drops.
    Filtered,
    Invalid(String),
}

impl From<ContestError> for Skip {
    fn from(err: ContestError) -> Self {
        Skip::Invalid(err.to_string())
    }
}

/// Runs `normalize` over every raw record, skipping (and logging) records that
/// fail to deserialize or validate so one bad entry never drops the batch.
fn normalize_records<T, F>(platform: Platform, records: Vec<JsonValue>, normalize: F) -> Vec<Contest>
where
    T: DeserializeOwned,
    F: Fn(T) -> Result<Contest, Skip>,
{
    let mut out = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let parsed = match serde_json::from_value::<T>(record) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%platform, index, error = %err, "skipping malformed contest record");
                continue;
            }
        };
        match normalize(parsed) {
            Ok(contest) => out.push(contest),
            Err(Skip::Filtered) => {}
            Err(Skip::Invalid(reason)) => {
                warn!(%platform, index, %reason, "skipping invalid contest record");
            }
        }
    }
    out
}

fn epoch_seconds(secs: i64) -> Result<DateTime<Utc>, Skip> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| Skip::Invalid(format!("timestamp {secs} out of range")))
}

fn span_seconds(secs: i64) -> Result<TimeDelta, Skip> {
    TimeDelta::try_seconds(secs).ok_or_else(|| Skip::Invalid(format!("duration {secs}s out of range")))
}

fn span_minutes(minutes: i64) -> Result<TimeDelta, Skip> {
    TimeDelta::try_minutes(minutes).ok_or_else(|| Skip::Invalid(format!("duration {minutes}m out of range")))
}
