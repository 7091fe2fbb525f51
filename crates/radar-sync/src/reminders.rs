//! Reminder planning and hand-off to a dispatch surface.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use radar_core::{format_remaining, time_remaining, Contest, ContestStatus};
use radar_storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ConfigError, RadarConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPolicy {
    /// How long before the start a reminder fires.
    pub lead: Duration,
    /// Only contests starting within this horizon are considered.
    pub window: Duration,
    pub bookmarked_only: bool,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            lead: Duration::minutes(30),
            window: Duration::hours(24),
            bookmarked_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReminderPayload {
    pub title: String,
    pub message: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedReminder {
    pub contest_id: String,
    pub starts_at: DateTime<Utc>,
    pub fires_at: DateTime<Utc>,
    pub payload: ReminderPayload,
}

/// One reminder per upcoming contest starting within `policy.window`, firing
/// `policy.lead` before the start or immediately when that moment has passed.
/// Output is ordered by fire time.
pub fn plan_reminders(contests: &[Contest], now: DateTime<Utc>, policy: &ReminderPolicy) -> Vec<PlannedReminder> {
    let mut planned = contests
        .iter()
        .filter(|c| c.status_at(now) == ContestStatus::Upcoming)
        .filter(|c| c.start_time - now <= policy.window)
        .filter(|c| !policy.bookmarked_only || c.bookmarked)
        .map(|c| {
            let fires_at = c
                .start_time
                .checked_sub_signed(policy.lead)
                .map_or(now, |at| at.max(now));
            PlannedReminder {
                contest_id: c.id.clone(),
                starts_at: c.start_time,
                fires_at,
                payload: ReminderPayload {
                    title: "Upcoming Contest!".to_string(),
                    message: format!(
                        "{} starts in {}!",
                        c.name,
                        format_remaining(time_remaining(c.start_time, fires_at))
                    ),
                    url: c.url.clone(),
                },
            }
        })
        .collect::<Vec<_>>();
    planned.sort_by_key(|r| r.fires_at);
    planned
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    #[default]
    Log,
    Email,
    Sms,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Log => "log",
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
        }
    }

    pub fn credential_key(&self) -> Option<&'static str> {
        match self {
            NotificationChannel::Log => None,
            NotificationChannel::Email => Some("RADAR_EMAIL_API_KEY"),
            NotificationChannel::Sms => Some("RADAR_SMS_API_KEY"),
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(NotificationChannel::Log),
            "email" => Ok(NotificationChannel::Email),
            "sms" => Ok(NotificationChannel::Sms),
            other => Err(format!("unknown notification channel `{other}`")),
        }
    }
}

/// External reminder surface.
#[async_trait]
pub trait ReminderDispatcher: Send + Sync {
    async fn schedule(&self, contest_id: &str, fires_at: DateTime<Utc>, payload: &ReminderPayload) -> Result<()>;
}

/// Records reminders as structured log events on the given channel.
#[derive(Debug, Clone, Default)]
pub struct LogReminderDispatcher {
    channel: NotificationChannel,
}

impl LogReminderDispatcher {
    /// Email and SMS need their provider key configured; a missing key only
    /// fails this call.
    pub fn for_channel(channel: NotificationChannel, config: &RadarConfig) -> Result<Self, ConfigError> {
        let configured = match channel {
            NotificationChannel::Log => true,
            NotificationChannel::Email => config.email_api_key.is_some(),
            NotificationChannel::Sms => config.sms_api_key.is_some(),
        };
        match channel.credential_key() {
            Some(key) if !configured => Err(ConfigError::MissingCredential {
                feature: "reminders",
                key,
            }),
            _ => Ok(Self { channel }),
        }
    }

    pub fn channel(&self) -> NotificationChannel {
        self.channel
    }
}

#[async_trait]
impl ReminderDispatcher for LogReminderDispatcher {
    async fn schedule(&self, contest_id: &str, fires_at: DateTime<Utc>, payload: &ReminderPayload) -> Result<()> {
        info!(
            channel = %self.channel,
            contest_id,
            fires_at = %fires_at.to_rfc3339(),
            message = %payload.message,
            "reminder scheduled"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub scheduled: usize,
    pub failed: Vec<String>,
}

/// Hands every reminder to the dispatcher. A failure is logged and recorded
/// against its contest id; the rest are still scheduled.
pub async fn dispatch_reminders(dispatcher: &dyn ReminderDispatcher, reminders: &[PlannedReminder]) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    for reminder in reminders {
        match dispatcher
            .schedule(&reminder.contest_id, reminder.fires_at, &reminder.payload)
            .await
        {
            Ok(()) => summary.scheduled += 1,
            Err(err) => {
                warn!(contest_id = %reminder.contest_id, error = %err, "reminder dispatch failed");
                summary.failed.push(reminder.contest_id.clone());
            }
        }
    }
    summary
}

pub const SCHEDULED_REMINDERS_KEY: &str = "scheduled_reminders";

/// Remembers which `(contest, start time)` pairs were already handed to a
/// dispatcher so periodic refreshes do not schedule them twice. A contest
/// that is rescheduled gets a new entry.
#[derive(Clone)]
pub struct ReminderLedger {
    store: Arc<dyn KeyValueStore>,
}

impl ReminderLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn entry(reminder: &PlannedReminder) -> String {
        format!("{} {}", reminder.contest_id, reminder.starts_at.to_rfc3339())
    }

    pub async fn unscheduled(&self, planned: Vec<PlannedReminder>) -> Result<Vec<PlannedReminder>> {
        let done = self
            .store
            .get(SCHEDULED_REMINDERS_KEY)
            .await?
            .into_iter()
            .collect::<BTreeSet<_>>();
        Ok(planned
            .into_iter()
            .filter(|r| !done.contains(&Self::entry(r)))
            .collect())
    }

    /// Records `reminders` and forgets entries for contests starting before
    /// `prune_before`.
    pub async fn record(&self, reminders: &[PlannedReminder], prune_before: DateTime<Utc>) -> Result<()> {
        self.store
            .update(SCHEDULED_REMINDERS_KEY, &mut |stored| {
                let mut entries = stored
                    .drain(..)
                    .filter(|entry| {
                        entry
                            .split_once(' ')
                            .and_then(|(_, ts)| DateTime::parse_from_rfc3339(ts).ok())
                            .is_some_and(|ts| ts.with_timezone(&Utc) >= prune_before)
                    })
                    .collect::<BTreeSet<_>>();
                entries.extend(reminders.iter().map(Self::entry));
                stored.extend(entries);
            })
            .await
    }
}
