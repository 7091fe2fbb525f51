//! Refresh pipeline: registry-driven aggregation, user-state merging, the
//! query layer, solution enrichment and reminder planning.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use radar_core::{Contest, ContestStatus};
use radar_storage::{HttpClientConfig, HttpFetcher, JsonFileStore, KeyValueStore};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};

pub mod aggregator;
pub mod bookmarks;
pub mod config;
pub mod query;
pub mod reminders;
pub mod solutions;

pub use aggregator::{AggregateResult, Aggregator, PlatformOutcome};
pub use bookmarks::{merge_bookmarks, BookmarkStore};
pub use config::{ConfigError, PlatformConfig, PlatformRegistry, RadarConfig};
pub use query::{apply, apply_at, paginate, platform_counts, sort_by_start, Page, PlatformCount};
pub use reminders::{
    dispatch_reminders, plan_reminders, DispatchSummary, LogReminderDispatcher, NotificationChannel,
    PlannedReminder, ReminderDispatcher, ReminderLedger, ReminderPayload, ReminderPolicy,
};
pub use solutions::{
    attach_manual_solutions, match_solutions, ManualSolutions, VideoError, VideoSource, YouTubePlaylistSource,
};

/// Owns the fetch side and the user's local state.
pub struct RadarPipeline {
    config: RadarConfig,
    http: Arc<HttpFetcher>,
    aggregator: Aggregator,
    bookmarks: BookmarkStore,
    manual_solutions: ManualSolutions,
    ledger: ReminderLedger,
}

impl RadarPipeline {
    /// Builds the HTTP client, loads the platform registry and opens the
    /// on-disk store under `config.data_dir`.
    pub async fn new(config: RadarConfig) -> Result<Self> {
        let http = Arc::new(HttpFetcher::new(HttpClientConfig {
            timeout: config.http_timeout(),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?);
        let registry = PlatformRegistry::load(&config.registry_path).await?;
        let aggregator = Aggregator::from_registry(http.clone(), &registry, config.fetch_timeout());
        let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(config.store_path()));
        Ok(Self::with_parts(config, http, aggregator, store))
    }

    pub fn with_parts(
        config: RadarConfig,
        http: Arc<HttpFetcher>,
        aggregator: Aggregator,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            config,
            http,
            aggregator,
            bookmarks: BookmarkStore::new(store.clone()),
            manual_solutions: ManualSolutions::new(store.clone()),
            ledger: ReminderLedger::new(store),
        }
    }

    pub fn config(&self) -> &RadarConfig {
        &self.config
    }

    pub fn http(&self) -> Arc<HttpFetcher> {
        self.http.clone()
    }

    pub fn bookmarks(&self) -> &BookmarkStore {
        &self.bookmarks
    }

    pub fn manual_solutions(&self) -> &ManualSolutions {
        &self.manual_solutions
    }

    /// Fetches every platform and merges bookmarks and manual solution links
    /// onto the fresh list. Local state that cannot be read is logged and
    /// skipped; the fetched contests are still returned.
    pub async fn refresh(&self) -> AggregateResult {
        let mut result = self.aggregator.fetch_all().await;
        match self.bookmarks.load().await {
            Ok(ids) => merge_bookmarks(&mut result.contests, &ids),
            Err(err) => warn!(error = %err, "bookmarks unavailable"),
        }
        match self.manual_solutions.load().await {
            Ok(links) => attach_manual_solutions(&mut result.contests, &links),
            Err(err) => warn!(error = %err, "manual solution links unavailable"),
        }
        result
    }

    /// Matches past contests against the video list. Manual links stay as
    /// they are because the matcher only fills empty slots.
    pub async fn enrich_solutions(
        &self,
        contests: &[Contest],
        videos: &dyn VideoSource,
    ) -> Result<Vec<Contest>, VideoError> {
        let listed = videos.list_videos().await?;
        let now = Utc::now();
        let past = contests
            .iter()
            .filter(|c| c.status_at(now) == ContestStatus::Past)
            .cloned()
            .collect::<Vec<_>>();
        let mut matched = match_solutions(&past, &listed)
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect::<HashMap<_, _>>();
        info!(videos = listed.len(), past = past.len(), "solution matching finished");
        Ok(contests
            .iter()
            .map(|c| matched.remove(&c.id).unwrap_or_else(|| c.clone()))
            .collect())
    }

    /// Plans reminders for `contests` and dispatches those not already
    /// handed over in an earlier run.
    pub async fn schedule_reminders(
        &self,
        contests: &[Contest],
        policy: &ReminderPolicy,
        dispatcher: &dyn ReminderDispatcher,
    ) -> Result<DispatchSummary> {
        let now = Utc::now();
        let planned = self.ledger.unscheduled(plan_reminders(contests, now, policy)).await?;
        let summary = dispatch_reminders(dispatcher, &planned).await;
        let delivered = planned
            .into_iter()
            .filter(|r| !summary.failed.contains(&r.contest_id))
            .collect::<Vec<_>>();
        self.ledger
            .record(&delivered, now)
            .await
            .context("recording scheduled reminders")?;
        Ok(summary)
    }

    /// One `watch` tick: refresh, then hand new reminders to the dispatcher.
    pub async fn watch_tick(
        &self,
        policy: &ReminderPolicy,
        dispatcher: &dyn ReminderDispatcher,
    ) -> Result<WatchTick> {
        let result = self.refresh().await;
        let reminders = self
            .schedule_reminders(&result.contests, policy, dispatcher)
            .await?;
        Ok(WatchTick {
            contests: result.contests.len(),
            failed_platforms: result.failures.iter().map(|f| f.platform.to_string()).collect(),
            reminders,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchTick {
    pub contests: usize,
    pub failed_platforms: Vec<String>,
    pub reminders: DispatchSummary,
}

/// Cron-driven periodic refresh. Retry policy lives here: a failed platform
/// is simply fetched again on the next tick.
pub async fn build_watch_scheduler(
    pipeline: Arc<RadarPipeline>,
    dispatcher: Arc<dyn ReminderDispatcher>,
    policy: ReminderPolicy,
) -> Result<JobScheduler> {
    let cron = pipeline.config().watch_cron.clone();
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
        let pipeline = pipeline.clone();
        let dispatcher = dispatcher.clone();
        let policy = policy.clone();
        Box::pin(async move {
            match pipeline.watch_tick(&policy, dispatcher.as_ref()).await {
                Ok(tick) => info!(
                    contests = tick.contests,
                    failed_platforms = ?tick.failed_platforms,
                    reminders = tick.reminders.scheduled,
                    "watch tick finished"
                ),
                Err(err) => warn!(error = %err, "watch tick failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use radar_adapters::{AdapterError, FetchedPage, SourceAdapter};
    use radar_core::{Platform, Video};
    use radar_storage::MemoryStore;
    use crate::solutions::StaticVideoSource;

    /// Returns a fixed contest list without touching the network.
    struct CannedAdapter {
        contests: Vec<Contest>,
    }

    #[async_trait]
    impl SourceAdapter for CannedAdapter {
        fn platform(&self) -> Platform {
            Platform::Codeforces
        }

        fn listing_url(&self) -> &str {
            "canned"
        }

        async fn fetch_listing(&self, _http: &HttpFetcher) -> Result<FetchedPage, AdapterError> {
            Ok(FetchedPage::new(Platform::Codeforces, "canned", Vec::new()))
        }

        fn parse_listing(&self, _page: &FetchedPage) -> Result<Vec<Contest>, AdapterError> {
            Ok(self.contests.clone())
        }
    }

    fn contest(native: &str, name: &str, starts_in: ChronoDuration) -> Contest {
        Contest::with_duration(
            Platform::Codeforces,
            native,
            name,
            Utc::now() + starts_in,
            ChronoDuration::minutes(120),
            format!("https://codeforces.com/contests/{native}"),
        )
        .unwrap()
    }

    fn pipeline(contests: Vec<Contest>) -> RadarPipeline {
        let config = RadarConfig::from_map(&HashMap::new()).unwrap();
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());
        let aggregator = Aggregator::new(
            http.clone(),
            vec![Box::new(CannedAdapter { contests })],
            Duration::from_secs(5),
        );
        RadarPipeline::with_parts(config, http, aggregator, Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn refresh_merges_local_state() {
        let pipeline = pipeline(vec![
            contest("2160", "Codeforces Round 1060", ChronoDuration::hours(3)),
            contest("2100", "Codeforces Round 1020", ChronoDuration::days(-30)),
        ]);
        pipeline.bookmarks().add("cf-2160").await.unwrap();
        pipeline
            .manual_solutions()
            .set("cf-2100", "https://youtu.be/round1020")
            .await
            .unwrap();

        let result = pipeline.refresh().await;
        assert!(result.is_complete());
        assert!(result.contests[0].bookmarked);
        assert_eq!(result.contests[1].solution_url.as_deref(), Some("https://youtu.be/round1020"));
    }

    #[tokio::test]
    async fn enrichment_only_touches_past_contests() {
        let pipeline = pipeline(vec![]);
        let contests = vec![
            contest("2160", "Codeforces Round 1060", ChronoDuration::hours(3)),
            contest("2100", "Codeforces Round 1020", ChronoDuration::days(-30)),
        ];
        let videos = StaticVideoSource {
            videos: vec![
                Video {
                    id: "v1".to_string(),
                    title: "Codeforces Round 1060 preview".to_string(),
                    url: "https://www.youtube.com/watch?v=v1".to_string(),
                },
                Video {
                    id: "v2".to_string(),
                    title: "Codeforces Round 1020 editorial".to_string(),
                    url: "https://www.youtube.com/watch?v=v2".to_string(),
                },
            ],
        };
        let enriched = pipeline.enrich_solutions(&contests, &videos).await.unwrap();
        assert_eq!(enriched.len(), 2);
        assert!(enriched[0].solution_url.is_none());
        assert_eq!(enriched[1].solution_url.as_deref(), Some("https://www.youtube.com/watch?v=v2"));
    }

    #[tokio::test]
    async fn watch_ticks_do_not_repeat_reminders() {
        let pipeline = pipeline(vec![
            contest("2160", "Codeforces Round 1060", ChronoDuration::hours(3)),
            contest("2161", "Codeforces Round 1061", ChronoDuration::days(3)),
        ]);
        let dispatcher = LogReminderDispatcher::default();
        let policy = ReminderPolicy::default();

        let first = pipeline.watch_tick(&policy, &dispatcher).await.unwrap();
        assert_eq!(first.contests, 2);
        assert!(first.failed_platforms.is_empty());
        assert_eq!(first.reminders.scheduled, 1);

        let second = pipeline.watch_tick(&policy, &dispatcher).await.unwrap();
        assert_eq!(second.reminders.scheduled, 0);
    }

    #[tokio::test]
    async fn scheduler_accepts_default_cron() {
        let pipeline = Arc::new(pipeline(vec![]));
        let sched = build_watch_scheduler(
            pipeline,
            Arc::new(LogReminderDispatcher::default()),
            ReminderPolicy::default(),
        )
        .await;
        assert!(sched.is_ok());
    }
}
