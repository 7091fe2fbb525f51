//! Solution-video enrichment: fuzzy name matching against a video list, the
//! YouTube playlist source and manually entered links.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use radar_core::{Contest, Video};
use radar_storage::{FetchError, HttpFetcher, KeyValueStore};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, RadarConfig};

pub const SOLUTION_URLS_KEY: &str = "solution_urls";

pub const YOUTUBE_PLAYLIST_ITEMS_URL: &str = "https://www.googleapis.com/youtube/v3/playlistItems";

/// Upper bound on `nextPageToken` hops per playlist.
const MAX_PLAYLIST_PAGES: usize = 20;

/// For each contest without a solution link, attaches the URL of the first
/// video whose title contains the contest name (case-insensitive). Contests
/// with no match come back unchanged.
pub fn match_solutions(contests: &[Contest], videos: &[Video]) -> Vec<Contest> {
    let titles = videos
        .iter()
        .map(|v| (v.title.to_lowercase(), v))
        .collect::<Vec<_>>();
    contests
        .iter()
        .map(|contest| {
            if contest.solution_url.is_some() {
                return contest.clone();
            }
            let name = contest.name.to_lowercase();
            let found = titles.iter().find(|(title, _)| title.contains(&name));
            match found {
                Some((_, video)) => Contest {
                    solution_url: Some(video.url.clone()),
                    ..contest.clone()
                },
                None => contest.clone(),
            }
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Network(#[from] FetchError),
    #[error("malformed video listing: {0}")]
    Payload(String),
}

#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn list_videos(&self) -> Result<Vec<Video>, VideoError>;
}

/// A fixed list, for tests and offline use.
#[derive(Debug, Clone, Default)]
pub struct StaticVideoSource {
    pub videos: Vec<Video>,
}

#[async_trait]
impl VideoSource for StaticVideoSource {
    async fn list_videos(&self) -> Result<Vec<Video>, VideoError> {
        Ok(self.videos.clone())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    title: String,
    #[serde(default)]
    resource_id: Option<ResourceId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    #[serde(default)]
    video_id: Option<String>,
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

fn videos_from_page(page: PlaylistItemsPage) -> (Vec<Video>, Option<String>) {
    let videos = page
        .items
        .into_iter()
        .filter_map(|item| {
            let id = item.snippet.resource_id.and_then(|r| r.video_id)?;
            Some(Video {
                url: watch_url(&id),
                title: item.snippet.title,
                id,
            })
        })
        .collect();
    (videos, page.next_page_token.filter(|t| !t.is_empty()))
}

/// Lists the videos of a set of YouTube playlists through the Data API.
pub struct YouTubePlaylistSource {
    http: Arc<HttpFetcher>,
    api_key: String,
    playlists: Vec<String>,
    endpoint: String,
}

impl YouTubePlaylistSource {
    pub fn new(http: Arc<HttpFetcher>, api_key: impl Into<String>, playlists: Vec<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            playlists,
            endpoint: YOUTUBE_PLAYLIST_ITEMS_URL.to_string(),
        }
    }

    /// Fails with a config error when `YOUTUBE_API_KEY` is unset.
    pub fn from_config(http: Arc<HttpFetcher>, config: &RadarConfig) -> Result<Self, ConfigError> {
        let key = config.require_youtube_key()?;
        Ok(Self::new(http, key, config.youtube_playlists.clone()))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn playlist_videos(&self, playlist_id: &str) -> Result<Vec<Video>, VideoError> {
        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PLAYLIST_PAGES {
            let mut query = vec![
                ("part", "snippet"),
                ("maxResults", "50"),
                ("playlistId", playlist_id),
                ("key", self.api_key.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let response = self
                .http
                .get_with_query("youtube", &self.endpoint, &query)
                .await?;
            let page: PlaylistItemsPage = response
                .json()
                .map_err(|e| VideoError::Payload(format!("playlist {playlist_id}: {e}")))?;
            let (batch, next) = videos_from_page(page);
            videos.extend(batch);
            match next {
                Some(token) => page_token = Some(token),
                None => return Ok(videos),
            }
        }
        warn!(playlist_id, pages = MAX_PLAYLIST_PAGES, "playlist truncated");
        Ok(videos)
    }
}

#[async_trait]
impl VideoSource for YouTubePlaylistSource {
    async fn list_videos(&self) -> Result<Vec<Video>, VideoError> {
        let mut videos = Vec::new();
        for playlist_id in &self.playlists {
            let batch = self.playlist_videos(playlist_id).await?;
            debug!(playlist_id = %playlist_id, videos = batch.len(), "playlist listed");
            videos.extend(batch);
        }
        Ok(videos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolutionLinkError {
    #[error("contest id must not be empty")]
    EmptyId,
    #[error("not a YouTube link: {0}")]
    NotYouTube(String),
}

fn validate_link(id: &str, url: &str) -> Result<(), SolutionLinkError> {
    if id.trim().is_empty() {
        return Err(SolutionLinkError::EmptyId);
    }
    let url = url.trim();
    if url.contains(char::is_whitespace) || !(url.contains("youtube.com") || url.contains("youtu.be")) {
        return Err(SolutionLinkError::NotYouTube(url.to_string()));
    }
    Ok(())
}

/// Manually entered solution links, stored as `"<id> <url>"` entries.
#[derive(Clone)]
pub struct ManualSolutions {
    store: Arc<dyn KeyValueStore>,
}

impl ManualSolutions {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self) -> Result<BTreeMap<String, String>> {
        Ok(parse_links(&self.store.get(SOLUTION_URLS_KEY).await?))
    }

    pub async fn set(&self, id: &str, url: &str) -> Result<()> {
        validate_link(id, url)?;
        let (id, url) = (id.trim(), url.trim());
        self.store
            .update(SOLUTION_URLS_KEY, &mut |entries| {
                let mut links = parse_links(entries);
                links.insert(id.to_string(), url.to_string());
                *entries = render_links(&links);
            })
            .await
    }

    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut removed = false;
        self.store
            .update(SOLUTION_URLS_KEY, &mut |entries| {
                let mut links = parse_links(entries);
                removed = links.remove(id).is_some();
                *entries = render_links(&links);
            })
            .await?;
        Ok(removed)
    }
}

/// Stored entries are `<contest id> <url>`.
fn parse_links(entries: &[String]) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    for entry in entries {
        match entry.split_once(' ') {
            Some((id, url)) if !id.is_empty() && !url.trim().is_empty() => {
                links.insert(id.to_string(), url.trim().to_string());
            }
            _ => warn!(%entry, "ignoring malformed stored solution link"),
        }
    }
    links
}

fn render_links(links: &BTreeMap<String, String>) -> Vec<String> {
    links.iter().map(|(id, url)| format!("{id} {url}")).collect()
}

/// Applies manual links; they take precedence over matched videos.
pub fn attach_manual_solutions(contests: &mut [Contest], links: &BTreeMap<String, String>) {
    for contest in contests {
        if let Some(url) = links.get(&contest.id) {
            contest.solution_url = Some(url.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use radar_core::Platform;
    use radar_storage::MemoryStore;

    fn contest(id: &str, name: &str) -> Contest {
        let start = Utc.with_ymd_and_hms(2026, 9, 1, 14, 35, 0).unwrap();
        Contest::with_duration(Platform::Codeforces, id, name, start, Duration::hours(2), "u").unwrap()
    }

    fn video(id: &str, title: &str) -> Video {
        Video {
            id: id.to_string(),
            title: title.to_string(),
            url: watch_url(id),
        }
    }

    #[test]
    fn matcher_takes_first_title_containing_name() {
        let contests = vec![
            contest("2150", "Codeforces Round 1050 (Div. 2)"),
            contest("2151", "Educational Codeforces Round 182"),
        ];
        let videos = vec![
            video("a", "Unrelated stream"),
            video("b", "CODEFORCES ROUND 1050 (DIV. 2) | Solutions A-E"),
            video("c", "Codeforces Round 1050 (Div. 2) part 2"),
        ];
        let matched = match_solutions(&contests, &videos);
        assert_eq!(matched[0].solution_url.as_deref(), Some("https://www.youtube.com/watch?v=b"));
        assert_eq!(matched[1], contests[1]);
        assert!(contests[0].solution_url.is_none());
    }

    #[test]
    fn matcher_keeps_existing_links() {
        let mut c = contest("2150", "Codeforces Round 1050 (Div. 2)");
        c.solution_url = Some("https://youtu.be/manual".to_string());
        let matched = match_solutions(&[c.clone()], &[video("b", "Codeforces Round 1050 (Div. 2)")]);
        assert_eq!(matched, vec![c]);
    }

    #[test]
    fn playlist_page_parsing_skips_items_without_video_ids() {
        let page: PlaylistItemsPage = serde_json::from_str(
            r#"{"nextPageToken":"CDIQAA","items":[
                {"snippet":{"title":"Codeforces Round 1050","resourceId":{"kind":"youtube#video","videoId":"abc123"}}},
                {"snippet":{"title":"Private video","resourceId":{"kind":"youtube#video"}}}
            ]}"#,
        )
        .unwrap();
        let (videos, next) = videos_from_page(page);
        assert_eq!(videos, vec![video("abc123", "Codeforces Round 1050")]);
        assert_eq!(next.as_deref(), Some("CDIQAA"));
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = RadarConfig::from_map(&Default::default()).unwrap();
        let http = Arc::new(HttpFetcher::new(Default::default()).unwrap());
        assert!(matches!(
            YouTubePlaylistSource::from_config(http, &config),
            Err(ConfigError::MissingCredential { key: "YOUTUBE_API_KEY", .. })
        ));
    }

    #[tokio::test]
    async fn manual_links_round_trip_and_win_over_matches() {
        let manual = ManualSolutions::new(Arc::new(MemoryStore::new()));
        manual.set("cf-2150", "https://www.youtube.com/watch?v=manual").await.unwrap();
        assert!(manual.set("cf-2151", "https://example.com/video").await.is_err());
        assert!(manual.set(" ", "https://youtu.be/x").await.is_err());

        let videos = StaticVideoSource {
            videos: vec![video("auto", "Codeforces Round 1050 (Div. 2)")],
        };
        let contests = vec![contest("2150", "Codeforces Round 1050 (Div. 2)")];
        let mut matched = match_solutions(&contests, &videos.list_videos().await.unwrap());
        attach_manual_solutions(&mut matched, &manual.load().await.unwrap());
        assert_eq!(
            matched[0].solution_url.as_deref(),
            Some("https://www.youtube.com/watch?v=manual")
        );

        assert!(manual.remove("cf-2150").await.unwrap());
        assert!(!manual.remove("cf-2150").await.unwrap());
        assert!(manual.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_links_on_a_file_store_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let manual = ManualSolutions::new(Arc::new(radar_storage::JsonFileStore::new(dir.path().join("store.json"))));
        let ids = (0..8).map(|i| format!("lc-weekly-contest-{i}")).collect::<Vec<_>>();
        let results = futures::future::join_all(
            ids.iter().map(|id| manual.set(id, "https://youtu.be/walkthrough")),
        )
        .await;
        assert!(results.into_iter().all(|r| r.is_ok()));
        assert_eq!(manual.load().await.unwrap().len(), 8);
    }
}
