//! Core domain model for Contest Radar: the normalized contest schema, filter
//! criteria and the time status engine.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod status;

pub use status::{format_duration, format_remaining, status, time_remaining, Remaining};

/// Upstream contest platforms. Adapters are the only producers of contests, so
/// this set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Codeforces,
    LeetCode,
    CodeChef,
    AtCoder,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Codeforces,
        Platform::LeetCode,
        Platform::CodeChef,
        Platform::AtCoder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Codeforces => "codeforces",
            Platform::LeetCode => "leetcode",
            Platform::CodeChef => "codechef",
            Platform::AtCoder => "atcoder",
        }
    }

    /// Prefix used to build globally unique contest ids.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Platform::Codeforces => "cf",
            Platform::LeetCode => "lc",
            Platform::CodeChef => "cc",
            Platform::AtCoder => "ac",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Codeforces => "Codeforces",
            Platform::LeetCode => "LeetCode",
            Platform::CodeChef => "CodeChef",
            Platform::AtCoder => "AtCoder",
        }
    }

    pub fn contest_id(&self, native_id: &str) -> String {
        format!("{}-{}", self.id_prefix(), native_id)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown platform `{0}` (expected codeforces, leetcode, codechef or atcoder)")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == needle || p.id_prefix() == needle)
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

/// Temporal classification of a contest relative to "now". Always derived,
/// never stored on [`Contest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestStatus {
    Upcoming,
    Ongoing,
    Past,
}

impl ContestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContestStatus::Upcoming => "upcoming",
            ContestStatus::Ongoing => "ongoing",
            ContestStatus::Past => "past",
        }
    }
}

impl fmt::Display for ContestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown contest status `{0}` (expected upcoming, ongoing or past)")]
pub struct UnknownStatus(pub String);

impl FromStr for ContestStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upcoming" => Ok(ContestStatus::Upcoming),
            "ongoing" | "live" => Ok(ContestStatus::Ongoing),
            "past" => Ok(ContestStatus::Past),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContestError {
    #[error("contest id is empty")]
    EmptyId,
    #[error("contest {id} has an empty name")]
    EmptyName { id: String },
    #[error("contest {id} ends before it starts")]
    EndBeforeStart { id: String },
    #[error("contest {id} ends outside the representable time range")]
    TimeOutOfRange { id: String },
}

/// Canonical contest representation shared by every platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contest {
    pub id: String,
    pub name: String,
    pub platform: Platform,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution_url: Option<String>,
    #[serde(default)]
    pub bookmarked: bool,
}

impl Contest {
    /// Builds a contest from both instants; `duration_minutes` is derived from them.
    pub fn new(
        platform: Platform,
        native_id: &str,
        name: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        url: impl Into<String>,
    ) -> Result<Self, ContestError> {
        let native_id = native_id.trim();
        if native_id.is_empty() {
            return Err(ContestError::EmptyId);
        }
        let id = platform.contest_id(native_id);
        let name = name.trim();
        if name.is_empty() {
            return Err(ContestError::EmptyName { id });
        }
        if end_time < start_time {
            return Err(ContestError::EndBeforeStart { id });
        }
        Ok(Self {
            id,
            name: name.to_string(),
            platform,
            start_time,
            end_time,
            duration_minutes: rounded_minutes(end_time - start_time),
            url: url.into(),
            solution_url: None,
            bookmarked: false,
        })
    }

    /// Builds a contest for sources that only report a length; the end instant
    /// is `start + duration`.
    pub fn with_duration(
        platform: Platform,
        native_id: &str,
        name: &str,
        start_time: DateTime<Utc>,
        duration: Duration,
        url: impl Into<String>,
    ) -> Result<Self, ContestError> {
        let end_time = start_time
            .checked_add_signed(duration)
            .ok_or_else(|| ContestError::TimeOutOfRange {
                id: platform.contest_id(native_id.trim()),
            })?;
        Self::new(platform, native_id, name, start_time, end_time, url)
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> ContestStatus {
        status(self.start_time, self.end_time, now)
    }
}

/// Whole minutes in `span`, rounded half away from zero.
pub fn rounded_minutes(span: Duration) -> i64 {
    (span.num_milliseconds() as f64 / 60_000.0).round() as i64
}

/// User-selected view over the aggregated contest list. Empty sets mean
/// "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub platforms: BTreeSet<Platform>,
    #[serde(default)]
    pub statuses: BTreeSet<ContestStatus>,
    #[serde(default)]
    pub search_query: String,
}

impl FilterCriteria {
    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = ContestStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.statuses = range.statuses();
        self
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }
}

/// Coarse time presets offered by the contest list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    #[default]
    All,
    Upcoming,
    Live,
    Past,
}

impl TimeRange {
    pub fn statuses(&self) -> BTreeSet<ContestStatus> {
        match self {
            TimeRange::All => BTreeSet::new(),
            TimeRange::Upcoming => BTreeSet::from([ContestStatus::Upcoming]),
            TimeRange::Live => BTreeSet::from([ContestStatus::Ongoing]),
            TimeRange::Past => BTreeSet::from([ContestStatus::Past]),
        }
    }
}

impl FromStr for TimeRange {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TimeRange::All),
            "upcoming" => Ok(TimeRange::Upcoming),
            "live" | "ongoing" => Ok(TimeRange::Live),
            "past" => Ok(TimeRange::Past),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Entry returned by a video-listing surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, h, m, 0).single().unwrap()
    }

    #[test]
    fn contest_ids_carry_platform_prefix() {
        let c = Contest::new(Platform::Codeforces, "1234", "Round 900", at(10, 0), at(12, 0), "u").unwrap();
        assert_eq!(c.id, "cf-1234");
        let l = Contest::new(Platform::LeetCode, "weekly-123", "Weekly 123", at(10, 0), at(12, 0), "u").unwrap();
        assert_eq!(l.id, "lc-weekly-123");
        assert_ne!(
            Platform::AtCoder.contest_id("1234"),
            Platform::Codeforces.contest_id("1234")
        );
    }

    #[test]
    fn duration_is_derived_from_instants() {
        let c = Contest::with_duration(
            Platform::AtCoder,
            "abc300",
            "ABC 300",
            at(12, 0),
            Duration::seconds(100 * 60 + 29),
            "u",
        )
        .unwrap();
        assert_eq!(c.duration_minutes, 100);
        assert_eq!(c.end_time - c.start_time, Duration::seconds(6029));

        let c = Contest::with_duration(Platform::AtCoder, "x", "X", at(12, 0), Duration::seconds(90), "u").unwrap();
        assert_eq!(c.duration_minutes, 2);
    }

    #[test]
    fn rejects_inverted_or_nameless_contests() {
        assert_eq!(
            Contest::new(Platform::CodeChef, "START1", "Starters", at(12, 0), at(11, 0), "u"),
            Err(ContestError::EndBeforeStart { id: "cc-START1".into() })
        );
        assert!(matches!(
            Contest::new(Platform::CodeChef, "START1", "  ", at(11, 0), at(12, 0), "u"),
            Err(ContestError::EmptyName { .. })
        ));
        assert_eq!(
            Contest::new(Platform::CodeChef, "", "Starters", at(11, 0), at(12, 0), "u"),
            Err(ContestError::EmptyId)
        );
    }

    #[test]
    fn end_past_the_calendar_is_an_error() {
        assert_eq!(
            Contest::with_duration(Platform::AtCoder, "ahc", "AHC", at(11, 0), Duration::days(1_000_000_000), "u"),
            Err(ContestError::TimeOutOfRange { id: "ac-ahc".into() })
        );
    }

    #[test]
    fn zero_length_contest_is_allowed() {
        let c = Contest::new(Platform::AtCoder, "a", "A", at(11, 0), at(11, 0), "u").unwrap();
        assert_eq!(c.duration_minutes, 0);
    }

    #[test]
    fn platform_and_status_parse_case_insensitively() {
        assert_eq!("LeetCode".parse::<Platform>().unwrap(), Platform::LeetCode);
        assert_eq!("cf".parse::<Platform>().unwrap(), Platform::Codeforces);
        assert!("topcoder".parse::<Platform>().is_err());
        assert_eq!("Live".parse::<ContestStatus>().unwrap(), ContestStatus::Ongoing);
        assert_eq!("past".parse::<TimeRange>().unwrap(), TimeRange::Past);
    }

    #[test]
    fn time_range_all_means_no_status_restriction() {
        assert!(TimeRange::All.statuses().is_empty());
        let criteria = FilterCriteria::default().with_time_range(TimeRange::Upcoming);
        assert_eq!(criteria.statuses, BTreeSet::from([ContestStatus::Upcoming]));
    }

    #[test]
    fn contest_serializes_platform_lowercase_and_omits_missing_solution() {
        let c = Contest::new(Platform::LeetCode, "weekly-1", "Weekly 1", at(10, 0), at(11, 30), "u").unwrap();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["platform"], "leetcode");
        assert_eq!(json["duration_minutes"], 90);
        assert!(json.get("solution_url").is_none());
    }
}
