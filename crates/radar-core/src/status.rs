//! Time status engine: pure functions over `(start, end, now)`.

use chrono::{DateTime, Duration, Utc};

use crate::ContestStatus;

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;

/// Classifies a contest window against `now`. Both ends of the window count as
/// ongoing, so a contest starting exactly at `now` is not upcoming.
pub fn status(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> ContestStatus {
    if end < now {
        ContestStatus::Past
    } else if start <= now {
        ContestStatus::Ongoing
    } else {
        ContestStatus::Upcoming
    }
}

/// Time left until a contest starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Started,
    /// Whole minutes until start, floor-rounded.
    Until(Duration),
}

impl Remaining {
    pub fn minutes(&self) -> Option<i64> {
        match self {
            Remaining::Started => None,
            Remaining::Until(d) => Some(d.num_minutes()),
        }
    }
}

pub fn time_remaining(start: DateTime<Utc>, now: DateTime<Utc>) -> Remaining {
    if start <= now {
        return Remaining::Started;
    }
    // num_minutes truncates toward zero, which is a floor for positive spans.
    Remaining::Until(Duration::minutes((start - now).num_minutes()))
}

pub fn format_remaining(remaining: Remaining) -> String {
    let Some(total) = remaining.minutes() else {
        return "Contest has started".to_string();
    };
    let days = total / MINUTES_PER_DAY;
    let hours = (total % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
    let minutes = total % MINUTES_PER_HOUR;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Renders a contest length as `"<h>h <m>m"`, including `"0h 45m"`.
pub fn format_duration(minutes: i64) -> String {
    let minutes = minutes.max(0);
    format!("{}h {}m", minutes / MINUTES_PER_HOUR, minutes % MINUTES_PER_HOUR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn ongoing_example() {
        assert_eq!(
            status(
                ts("2024-03-20T10:00:00Z"),
                ts("2024-03-20T12:00:00Z"),
                ts("2024-03-20T11:00:00Z")
            ),
            ContestStatus::Ongoing
        );
    }

    #[test]
    fn boundaries_are_ongoing() {
        let start = ts("2024-03-20T10:00:00Z");
        let end = ts("2024-03-20T12:00:00Z");
        assert_eq!(status(start, end, start), ContestStatus::Ongoing);
        assert_eq!(status(start, end, end), ContestStatus::Ongoing);
        assert_eq!(
            status(start, end, end + Duration::milliseconds(1)),
            ContestStatus::Past
        );
        assert_eq!(
            status(start, end, start - Duration::milliseconds(1)),
            ContestStatus::Upcoming
        );
    }

    #[test]
    fn status_is_exhaustive_over_a_sweep() {
        let start = ts("2024-03-20T10:00:00Z");
        let end = ts("2024-03-20T12:00:00Z");
        let mut seen = std::collections::BTreeSet::new();
        for offset in -180..=180 {
            let now = start + Duration::minutes(offset);
            let s = status(start, end, now);
            let expected = if now > end {
                ContestStatus::Past
            } else if now >= start {
                ContestStatus::Ongoing
            } else {
                ContestStatus::Upcoming
            };
            assert_eq!(s, expected);
            seen.insert(s);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn remaining_floors_partial_minutes() {
        let now = ts("2024-03-20T10:00:00Z");
        let start = now + Duration::seconds(59);
        assert_eq!(time_remaining(start, now), Remaining::Until(Duration::zero()));
        let start = now + Duration::seconds(30 * 60 + 59);
        assert_eq!(time_remaining(start, now).minutes(), Some(30));
        assert_eq!(time_remaining(now, now), Remaining::Started);
        assert_eq!(time_remaining(now - Duration::hours(1), now), Remaining::Started);
    }

    #[test]
    fn remaining_formats_by_magnitude() {
        let m = |n: i64| Remaining::Until(Duration::minutes(n));
        assert_eq!(format_remaining(m(30)), "30m");
        assert_eq!(format_remaining(m(2 * 24 * 60 + 5 * 60 + 30)), "2d 5h 30m");
        assert_eq!(format_remaining(m(61)), "1h 1m");
        assert_eq!(format_remaining(m(24 * 60)), "1d 0h 0m");
        assert_eq!(format_remaining(Remaining::Started), "Contest has started");
    }

    #[test]
    fn duration_uses_hour_minute_form() {
        assert_eq!(format_duration(120), "2h 0m");
        assert_eq!(format_duration(45), "0h 45m");
        assert_eq!(format_duration(100), "1h 40m");
    }
}
