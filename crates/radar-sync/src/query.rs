//! Filtering, ordering, facets and paging over an aggregated contest list.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use radar_core::{Contest, FilterCriteria, Platform};
use serde::Serialize;

/// Filters against the current clock.
pub fn apply(contests: &[Contest], criteria: &FilterCriteria) -> Vec<Contest> {
    apply_at(contests, criteria, Utc::now())
}

/// Keeps contests that pass the platform, status and search predicates.
/// Input order is preserved.
pub fn apply_at(contests: &[Contest], criteria: &FilterCriteria, now: DateTime<Utc>) -> Vec<Contest> {
    let needle = criteria.search_query.trim().to_lowercase();
    contests
        .iter()
        .filter(|c| matches_with(c, criteria, &needle, now))
        .cloned()
        .collect()
}

pub fn matches(contest: &Contest, criteria: &FilterCriteria, now: DateTime<Utc>) -> bool {
    matches_with(contest, criteria, &criteria.search_query.trim().to_lowercase(), now)
}

fn matches_with(contest: &Contest, criteria: &FilterCriteria, needle: &str, now: DateTime<Utc>) -> bool {
    let platform_ok = criteria.platforms.is_empty() || criteria.platforms.contains(&contest.platform);
    let status_ok = criteria.statuses.is_empty() || criteria.statuses.contains(&contest.status_at(now));
    platform_ok && status_ok && matches_search(contest, needle)
}

/// `needle` must already be trimmed and lowercased.
fn matches_search(contest: &Contest, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let platform = contest.platform;
    contest.name.to_lowercase().contains(needle)
        || platform.as_str().contains(needle)
        || platform.display_name().to_lowercase().contains(needle)
        || platform.id_prefix().contains(needle)
}

/// Chronological order by start time; ties keep their input order.
pub fn sort_by_start(contests: &mut [Contest]) {
    contests.sort_by_key(|c| c.start_time);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformCount {
    pub platform: Platform,
    pub count: usize,
}

/// Facet counts for every platform, including those with no contests.
pub fn platform_counts(contests: &[Contest]) -> Vec<PlatformCount> {
    let mut counts = Platform::ALL
        .into_iter()
        .map(|p| (p, 0usize))
        .collect::<BTreeMap<_, _>>();
    for c in contests {
        *counts.entry(c.platform).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(platform, count)| PlatformCount { platform, count })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// 1-based paging. `per_page` is at least one and `page` is clamped into
/// `1..=total_pages`; an empty input still has one (empty) page.
pub fn paginate<T: Clone>(items: &[T], page: usize, per_page: usize) -> Page<T> {
    let per_page = per_page.max(1);
    let total_pages = items.len().max(1).div_ceil(per_page);
    let page = page.clamp(1, total_pages);
    let start = (page - 1) * per_page;
    Page {
        items: items.iter().skip(start).take(per_page).cloned().collect(),
        page,
        per_page,
        total_pages,
        total_items: items.len(),
    }
}
