//! Concurrent fan-out over the platform adapters with per-platform failure
//! isolation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use radar_adapters::{adapter_for_platform, AdapterError, PlatformError, SourceAdapter};
use radar_core::{Contest, Platform};
use radar_storage::HttpFetcher;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::PlatformRegistry;

/// What one adapter produced in a run.
#[derive(Debug)]
pub struct PlatformOutcome {
    pub platform: Platform,
    pub result: Result<Vec<Contest>, AdapterError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub contests: Vec<Contest>,
    pub failures: Vec<PlatformError>,
}

impl AggregateResult {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds per-platform outcomes. Platforms keep their upstream order;
    /// a repeated id keeps its first occurrence.
    pub fn from_outcomes(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        outcomes: Vec<PlatformOutcome>,
    ) -> Self {
        let mut contests = Vec::new();
        let mut failures = Vec::new();
        let mut seen = HashSet::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(batch) => {
                    for contest in batch {
                        if seen.insert(contest.id.clone()) {
                            contests.push(contest);
                        } else {
                            warn!(platform = %outcome.platform, id = %contest.id, "dropping duplicate contest id");
                        }
                    }
                }
                Err(err) => {
                    let failure = PlatformError::new(outcome.platform, &err);
                    warn!(platform = %failure.platform, kind = %failure.kind, error = %failure.message, "platform fetch failed");
                    failures.push(failure);
                }
            }
        }
        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            contests,
            failures,
        }
    }
}

pub struct Aggregator {
    http: Arc<HttpFetcher>,
    adapters: Vec<Box<dyn SourceAdapter>>,
    fetch_timeout: Duration,
}

impl Aggregator {
    pub fn new(http: Arc<HttpFetcher>, adapters: Vec<Box<dyn SourceAdapter>>, fetch_timeout: Duration) -> Self {
        Self {
            http,
            adapters,
            fetch_timeout,
        }
    }

    /// One adapter per enabled registry entry, honouring URL overrides.
    pub fn from_registry(http: Arc<HttpFetcher>, registry: &PlatformRegistry, fetch_timeout: Duration) -> Self {
        let adapters = registry
            .enabled()
            .map(|entry| adapter_for_platform(entry.platform, entry.listing_url.as_deref()))
            .collect();
        Self::new(http, adapters, fetch_timeout)
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.iter().map(|a| a.platform()).collect()
    }

    /// Runs every adapter concurrently. A platform exceeding the fetch
    /// timeout fails on its own; siblings are not cancelled.
    pub async fn fetch_each(&self) -> Vec<PlatformOutcome> {
        let http = self.http.as_ref();
        let timeout = self.fetch_timeout;
        let fetches = self.adapters.iter().map(|adapter| {
            let platform = adapter.platform();
            let span = info_span!("platform_fetch", platform = %platform, url = adapter.listing_url());
            async move {
                let result = match tokio::time::timeout(timeout, adapter.fetch_contests(http)).await {
                    Ok(result) => result,
                    Err(_) => Err(AdapterError::Timeout(timeout)),
                };
                if let Ok(contests) = &result {
                    info!(contests = contests.len(), "platform fetched");
                }
                PlatformOutcome { platform, result }
            }
            .instrument(span)
        });
        join_all(fetches).await
    }

    /// Best-effort aggregate: never fails as a whole.
    pub async fn fetch_all(&self) -> AggregateResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let outcomes = self.fetch_each().await;
        let result = AggregateResult::from_outcomes(run_id, started_at, outcomes);
        info!(
            %run_id,
            contests = result.contests.len(),
            failures = result.failures.len(),
            "aggregate fetch finished"
        );
        result
    }
}
