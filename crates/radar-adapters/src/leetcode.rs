//! LeetCode GraphQL `allContests` adapter.

use async_trait::async_trait;
use chrono::Duration;
use radar_core::{Contest, Platform};
use radar_storage::HttpFetcher;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::{ensure_platform, epoch_seconds, normalize_records, AdapterError, FetchedPage, Skip, SourceAdapter};

pub const DEFAULT_LISTING_URL: &str = "https://leetcode.com/graphql";

/// Upstream does not say whether `duration` is in seconds or minutes. Values
/// above this threshold are read as seconds, anything else as minutes.
pub const SECONDS_THRESHOLD: i64 = 10_000;

const CONTEST_LIST_QUERY: &str = r#"
query contestList {
  allContests {
    title
    titleSlug
    startTime
    duration
    isVirtual
  }
}
"#;

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<ContestListData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct ContestListData {
    #[serde(rename = "allContests", default)]
    all_contests: Option<Vec<JsonValue>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LcContest {
    title: String,
    title_slug: String,
    start_time: i64,
    duration: i64,
    #[serde(default)]
    is_virtual: bool,
}

/// Reads an upstream duration of unknown unit. `None` when the value does not
/// fit a `Duration`.
pub fn upstream_duration(raw: i64) -> Option<Duration> {
    if raw > SECONDS_THRESHOLD {
        Duration::try_seconds(raw)
    } else {
        Duration::try_minutes(raw)
    }
}

#[derive(Debug, Clone)]
pub struct LeetCodeAdapter {
    listing_url: String,
}

impl Default for LeetCodeAdapter {
    fn default() -> Self {
        Self::with_listing_url(DEFAULT_LISTING_URL)
    }
}

impl LeetCodeAdapter {
    pub fn with_listing_url(url: impl Into<String>) -> Self {
        Self {
            listing_url: url.into(),
        }
    }
}

fn normalize(contest: LcContest) -> Result<Contest, Skip> {
    if contest.is_virtual {
        return Err(Skip::Filtered);
    }
    Ok(Contest::with_duration(
        Platform::LeetCode,
        &contest.title_slug,
        &contest.title,
        epoch_seconds(contest.start_time)?,
        upstream_duration(contest.duration)
            .ok_or_else(|| Skip::Invalid(format!("{}: duration {} out of range", contest.title_slug, contest.duration)))?,
        format!("https://leetcode.com/contest/{}", contest.title_slug),
    )?)
}

#[async_trait]
impl SourceAdapter for LeetCodeAdapter {
    fn platform(&self) -> Platform {
        Platform::LeetCode
    }

    fn listing_url(&self) -> &str {
        &self.listing_url
    }

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<FetchedPage, AdapterError> {
        let body = json!({ "query": CONTEST_LIST_QUERY });
        let response = http
            .post_json(Platform::LeetCode.as_str(), &self.listing_url, &body)
            .await?;
        Ok(FetchedPage::from_response(Platform::LeetCode, response))
    }

    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<Contest>, AdapterError> {
        ensure_platform(Platform::LeetCode, page)?;
        let response: GraphQlResponse = page.json()?;
        let records = response.data.and_then(|d| d.all_contests);
        match records {
            Some(records) => Ok(normalize_records(Platform::LeetCode, records, normalize)),
            None if !response.errors.is_empty() => Err(AdapterError::Upstream(
                response
                    .errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
            None => Err(AdapterError::Payload("missing data.allContests".to_string())),
        }
    }
}
