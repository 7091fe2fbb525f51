//! Codeforces `contest.list` adapter.
//!
//! API documentation: https://codeforces.com/apiHelp/methods#contest.list

use async_trait::async_trait;
use radar_core::{Contest, Platform};
use radar_storage::HttpFetcher;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{
    ensure_platform, epoch_seconds, normalize_records, span_seconds, AdapterError, FetchedPage, Skip, SourceAdapter,
};

pub const DEFAULT_LISTING_URL: &str = "https://codeforces.com/api/contest.list?gym=false";

#[derive(Deserialize)]
#[serde(tag = "status")]
enum CfResponse {
    #[serde(rename = "OK")]
    Ok { result: Vec<JsonValue> },
    #[serde(rename = "FAILED")]
    Failed {
        #[serde(default)]
        comment: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CfContest {
    id: u64,
    name: String,
    phase: String,
    start_time_seconds: Option<i64>,
    duration_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct CodeforcesAdapter {
    listing_url: String,
}

impl Default for CodeforcesAdapter {
    fn default() -> Self {
        Self::with_listing_url(DEFAULT_LISTING_URL)
    }
}

impl CodeforcesAdapter {
    pub fn with_listing_url(url: impl Into<String>) -> Self {
        Self {
            listing_url: url.into(),
        }
    }
}

fn normalize(contest: CfContest) -> Result<Contest, Skip> {
    if contest.phase != "BEFORE" {
        return Err(Skip::Filtered);
    }
    let start = contest
        .start_time_seconds
        .ok_or_else(|| Skip::Invalid(format!("contest {} has no startTimeSeconds", contest.id)))?;
    let native_id = contest.id.to_string();
    Ok(Contest::with_duration(
        Platform::Codeforces,
        &native_id,
        &contest.name,
        epoch_seconds(start)?,
        span_seconds(contest.duration_seconds)?,
        format!("https://codeforces.com/contests/{native_id}"),
    )?)
}

#[async_trait]
impl SourceAdapter for CodeforcesAdapter {
    fn platform(&self) -> Platform {
        Platform::Codeforces
    }

    fn listing_url(&self) -> &str {
        &self.listing_url
    }

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<FetchedPage, AdapterError> {
        let response = http.get(Platform::Codeforces.as_str(), &self.listing_url).await?;
        Ok(FetchedPage::from_response(Platform::Codeforces, response))
    }

    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<Contest>, AdapterError> {
        ensure_platform(Platform::Codeforces, page)?;
        match page.json::<CfResponse>()? {
            CfResponse::Ok { result } => Ok(normalize_records(Platform::Codeforces, result, normalize)),
            CfResponse::Failed { comment } => Err(AdapterError::Upstream(
                comment.unwrap_or_else(|| "no comment".to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn parse(body: &str) -> Result<Vec<Contest>, AdapterError> {
        CodeforcesAdapter::default().parse_listing(&FetchedPage::new(Platform::Codeforces, "t", body.as_bytes().to_vec()))
    }

    #[test]
    fn normalizes_upcoming_contest() {
        let contests = parse(
            r#"{"status":"OK","result":[
                {"id":1234,"name":"Codeforces Round 900","type":"CF","phase":"BEFORE","frozen":false,
                 "durationSeconds":7200,"startTimeSeconds":1700000000,"relativeTimeSeconds":-5000}
            ]}"#,
        )
        .unwrap();
        assert_eq!(contests.len(), 1);
        let c = &contests[0];
        assert_eq!(c.id, "cf-1234");
        assert_eq!(c.platform, Platform::Codeforces);
        assert_eq!(c.duration_minutes, 120);
        assert_eq!(c.start_time, DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap());
        assert_eq!(c.end_time, c.start_time + Duration::seconds(7200));
        assert_eq!(c.url, "https://codeforces.com/contests/1234");
        assert!(c.solution_url.is_none());
    }

    #[test]
    fn keeps_only_before_phase() {
        let contests = parse(
            r#"{"status":"OK","result":[
                {"id":1,"name":"Finished","phase":"FINISHED","durationSeconds":7200,"startTimeSeconds":1600000000},
                {"id":2,"name":"Running","phase":"CODING","durationSeconds":7200,"startTimeSeconds":1700000000},
                {"id":3,"name":"Soon","phase":"BEFORE","durationSeconds":5400,"startTimeSeconds":1800000000}
            ]}"#,
        )
        .unwrap();
        assert_eq!(contests.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["cf-3"]);
        assert_eq!(contests[0].duration_minutes, 90);
    }

    #[test]
    fn malformed_records_are_skipped_not_fatal() {
        let contests = parse(
            r#"{"status":"OK","result":[
                {"id":10,"name":"No start yet","phase":"BEFORE","durationSeconds":7200},
                {"id":"eleven","name":"Bad id","phase":"BEFORE","durationSeconds":7200,"startTimeSeconds":1800000000},
                {"id":12,"name":"Negative","phase":"BEFORE","durationSeconds":-60,"startTimeSeconds":1800000000},
                {"id":13,"name":"Good","phase":"BEFORE","durationSeconds":7200,"startTimeSeconds":1800000000}
            ]}"#,
        )
        .unwrap();
        assert_eq!(contests.len(), 1);
        assert_eq!(contests[0].id, "cf-13");
    }

    #[test]
    fn oversized_durations_skip_only_their_record() {
        let contests = parse(
            r#"{"status":"OK","result":[
                {"id":20,"name":"Forever","phase":"BEFORE","durationSeconds":9223372036854775807,"startTimeSeconds":1800000000},
                {"id":21,"name":"Past the calendar","phase":"BEFORE","durationSeconds":9000000000000000,"startTimeSeconds":1800000000},
                {"id":22,"name":"Good","phase":"BEFORE","durationSeconds":7200,"startTimeSeconds":1800000000}
            ]}"#,
        )
        .unwrap();
        assert_eq!(contests.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["cf-22"]);
    }

    #[test]
    fn failed_status_is_an_upstream_error() {
        let err = parse(r#"{"status":"FAILED","comment":"Call limit exceeded"}"#).unwrap_err();
        assert!(matches!(err, AdapterError::Upstream(ref m) if m == "Call limit exceeded"));
    }

    #[test]
    fn non_json_payload_is_a_payload_error() {
        let err = parse("<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, AdapterError::Payload(_)));
    }
}
