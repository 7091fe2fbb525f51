//! CodeChef contest listing adapter.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use radar_core::{Contest, Platform};
use radar_storage::HttpFetcher;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{ensure_platform, normalize_records, AdapterError, FetchedPage, Skip, SourceAdapter};

pub const DEFAULT_LISTING_URL: &str = "https://www.codechef.com/api/list/contests/all";

/// Length assumed when upstream gives a start but no end.
pub const DEFAULT_DURATION_MINUTES: i64 = 180;

/// Offset-less timestamps from CodeChef are Indian Standard Time.
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d %b %Y %H:%M:%S"];

#[derive(Deserialize)]
struct CcListing {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    future_contests: Option<Vec<JsonValue>>,
    #[serde(default)]
    contests: Option<Vec<JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct CcContest {
    contest_code: String,
    contest_name: String,
    #[serde(default)]
    contest_start_date_iso: Option<String>,
    #[serde(default)]
    contest_start_date: Option<String>,
    #[serde(default)]
    contest_end_date_iso: Option<String>,
    #[serde(default)]
    contest_end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CcStatusProbe {
    #[serde(default)]
    status: Option<String>,
}

pub fn parse_codechef_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let ist = FixedOffset::east_opt(IST_OFFSET_SECS)?;
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .and_then(|naive| ist.from_local_datetime(&naive).single())
            .map(|ts| ts.with_timezone(&Utc))
    })
}

/// Resolves one timestamp field, preferring the ISO variant. `Ok(None)` means
/// the field is absent; a present but unparseable value skips the record.
fn resolve_time(
    code: &str,
    label: &str,
    iso: Option<&str>,
    plain: Option<&str>,
) -> Result<Option<DateTime<Utc>>, Skip> {
    let Some(raw) = iso.or(plain).filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    parse_codechef_time(raw)
        .map(Some)
        .ok_or_else(|| Skip::Invalid(format!("{code}: unparseable {label} `{raw}`")))
}

fn normalize(contest: CcContest) -> Result<Contest, Skip> {
    let code = contest.contest_code.trim().to_string();
    let start = resolve_time(
        &code,
        "start",
        contest.contest_start_date_iso.as_deref(),
        contest.contest_start_date.as_deref(),
    )?
    .ok_or_else(|| Skip::Invalid(format!("{code}: missing start date")))?;
    let end = resolve_time(
        &code,
        "end",
        contest.contest_end_date_iso.as_deref(),
        contest.contest_end_date.as_deref(),
    )?;
    let url = format!("https://www.codechef.com/{code}");
    let contest = match end {
        Some(end) => Contest::new(Platform::CodeChef, &code, &contest.contest_name, start, end, url)?,
        None => Contest::with_duration(
            Platform::CodeChef,
            &code,
            &contest.contest_name,
            start,
            Duration::minutes(DEFAULT_DURATION_MINUTES),
            url,
        )?,
    };
    Ok(contest)
}

fn is_upcoming_entry(record: &JsonValue) -> bool {
    serde_json::from_value::<CcStatusProbe>(record.clone())
        .ok()
        .and_then(|p| p.status)
        .is_some_and(|s| s.eq_ignore_ascii_case("upcoming"))
}

#[derive(Debug, Clone)]
pub struct CodeChefAdapter {
    listing_url: String,
}

impl Default for CodeChefAdapter {
    fn default() -> Self {
        Self::with_listing_url(DEFAULT_LISTING_URL)
    }
}

impl CodeChefAdapter {
    pub fn with_listing_url(url: impl Into<String>) -> Self {
        Self {
            listing_url: url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for CodeChefAdapter {
    fn platform(&self) -> Platform {
        Platform::CodeChef
    }

    fn listing_url(&self) -> &str {
        &self.listing_url
    }

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<FetchedPage, AdapterError> {
        let response = http.get(Platform::CodeChef.as_str(), &self.listing_url).await?;
        Ok(FetchedPage::from_response(Platform::CodeChef, response))
    }

    /// Keeps members of `future_contests` plus any `contests` entry whose own
    /// status is `Upcoming`.
    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<Contest>, AdapterError> {
        ensure_platform(Platform::CodeChef, page)?;
        let listing: CcListing = page.json()?;
        if listing
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("failure") || s.eq_ignore_ascii_case("error"))
        {
            return Err(AdapterError::Upstream(
                listing.message.unwrap_or_else(|| "status=failure".to_string()),
            ));
        }
        if listing.future_contests.is_none() && listing.contests.is_none() {
            return Err(AdapterError::Payload(
                "neither future_contests nor contests present".to_string(),
            ));
        }

        let mut records = listing.future_contests.unwrap_or_default();
        records.extend(
            listing
                .contests
                .unwrap_or_default()
                .into_iter()
                .filter(is_upcoming_entry),
        );
        Ok(normalize_records(Platform::CodeChef, records, normalize))
    }
}
