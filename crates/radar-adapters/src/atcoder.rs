//! AtCoder adapter. Understands both the public `atcoder.jp/contests` listing
//! page and the JSON contest list served by community mirrors
//! (`[{"id", "start_epoch_second", "duration_second", "title"}]`).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use radar_core::{Contest, Platform};
use radar_storage::HttpFetcher;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::{
    ensure_platform, epoch_seconds, normalize_records, span_seconds, AdapterError, FetchedPage, Skip, SourceAdapter,
};

pub const DEFAULT_LISTING_URL: &str = "https://atcoder.jp/contests/?lang=en";

const CONTEST_ROWS: &str = "#contest-table-action tbody tr, #contest-table-upcoming tbody tr, #contest-table-recent tbody tr";

#[derive(Debug, Deserialize)]
struct AcJsonContest {
    id: String,
    title: String,
    start_epoch_second: i64,
    duration_second: i64,
}

fn contest_url(id: &str) -> String {
    format!("https://atcoder.jp/contests/{id}")
}

fn normalize_json(contest: AcJsonContest) -> Result<Contest, Skip> {
    Ok(Contest::with_duration(
        Platform::AtCoder,
        &contest.id,
        &contest.title,
        epoch_seconds(contest.start_epoch_second)?,
        span_seconds(contest.duration_second)?,
        contest_url(&contest.id),
    )?)
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::Payload(format!("bad selector {css}: {e}")))
}

/// Parses the listing page's `HH:MM` length column (hours may exceed 24).
pub fn parse_hh_mm(text: &str) -> Option<Duration> {
    let (h, m) = text.trim().split_once(':')?;
    let hours: i64 = h.trim().parse().ok()?;
    let minutes: i64 = m.trim().parse().ok()?;
    if hours < 0 || !(0..60).contains(&minutes) {
        return None;
    }
    let total = hours.checked_mul(60)?.checked_add(minutes)?;
    Duration::try_minutes(total)
}

fn parse_start(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%z")
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

struct RowSelectors {
    cell: Selector,
    time: Selector,
    contest_link: Selector,
}

fn normalize_row(row: ElementRef<'_>, sel: &RowSelectors) -> Result<Contest, Skip> {
    let cells = row.select(&sel.cell).collect::<Vec<_>>();
    if cells.len() < 3 {
        return Err(Skip::Invalid(format!("row has {} cells", cells.len())));
    }
    let start_text = cells[0]
        .select(&sel.time)
        .next()
        .map(|t| t.text().collect::<String>())
        .unwrap_or_else(|| cells[0].text().collect::<String>());
    let start = parse_start(&start_text)
        .ok_or_else(|| Skip::Invalid(format!("unparseable start `{}`", start_text.trim())))?;

    let link = cells[1]
        .select(&sel.contest_link)
        .next()
        .ok_or_else(|| Skip::Invalid("row has no contest link".to_string()))?;
    let href = link.value().attr("href").unwrap_or_default();
    let id = href
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split('?')
        .next()
        .unwrap_or_default();
    let name = link.text().collect::<String>();

    let length_text = cells[2].text().collect::<String>();
    let length = parse_hh_mm(&length_text)
        .ok_or_else(|| Skip::Invalid(format!("{id}: unparseable duration `{}`", length_text.trim())))?;

    Ok(Contest::with_duration(
        Platform::AtCoder,
        id,
        name.trim(),
        start,
        length,
        contest_url(id),
    )?)
}

fn parse_listing_html(html: &str) -> Result<Vec<Contest>, AdapterError> {
    let document = Html::parse_document(html);
    let rows = selector(CONTEST_ROWS)?;
    let sel = RowSelectors {
        cell: selector("td")?,
        time: selector("time")?,
        contest_link: selector("a[href*='/contests/']")?,
    };

    let mut out = Vec::new();
    let mut seen_rows = 0usize;
    for (index, row) in document.select(&rows).enumerate() {
        seen_rows += 1;
        match normalize_row(row, &sel) {
            Ok(contest) => out.push(contest),
            Err(Skip::Filtered) => {}
            Err(Skip::Invalid(reason)) => {
                warn!(platform = %Platform::AtCoder, index, %reason, "skipping invalid contest row");
            }
        }
    }
    if seen_rows == 0 && !html.contains("contest-table") {
        return Err(AdapterError::Payload(
            "listing page has no contest tables".to_string(),
        ));
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct AtCoderAdapter {
    listing_url: String,
}

impl Default for AtCoderAdapter {
    fn default() -> Self {
        Self::with_listing_url(DEFAULT_LISTING_URL)
    }
}

impl AtCoderAdapter {
    pub fn with_listing_url(url: impl Into<String>) -> Self {
        Self {
            listing_url: url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for AtCoderAdapter {
    fn platform(&self) -> Platform {
        Platform::AtCoder
    }

    fn listing_url(&self) -> &str {
        &self.listing_url
    }

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<FetchedPage, AdapterError> {
        let response = http.get(Platform::AtCoder.as_str(), &self.listing_url).await?;
        Ok(FetchedPage::from_response(Platform::AtCoder, response))
    }

    fn parse_listing(&self, page: &FetchedPage) -> Result<Vec<Contest>, AdapterError> {
        ensure_platform(Platform::AtCoder, page)?;
        let text = page.text();
        if text.trim_start().starts_with('[') {
            let records: Vec<JsonValue> = page.json()?;
            return Ok(normalize_records(Platform::AtCoder, records, normalize_json));
        }
        parse_listing_html(&text)
    }
}
