use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use clap::{Args, Parser, Subcommand};
use radar_core::{format_duration, format_remaining, time_remaining, Contest, ContestStatus, FilterCriteria, Platform, TimeRange};
use radar_sync::{
    apply_at, build_watch_scheduler, paginate, platform_counts, sort_by_start, AggregateResult, LogReminderDispatcher,
    NotificationChannel, RadarConfig, RadarPipeline, ReminderPolicy, YouTubePlaylistSource,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "contest-radar")]
#[command(about = "Upcoming programming contests from Codeforces, LeetCode, CodeChef and AtCoder")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch and list contests (default)
    List(ListArgs),
    #[command(subcommand)]
    Bookmark(BookmarkCommand),
    /// Attach solution videos to past contests
    Solutions(ListArgs),
    #[command(subcommand)]
    Solution(SolutionCommand),
    /// Plan and dispatch reminders for contests starting soon
    Remind(RemindArgs),
    /// Refresh on the configured cron schedule until interrupted
    Watch(RemindArgs),
}

#[derive(Debug, Args)]
struct ListArgs {
    /// Restrict to a platform; repeatable (codeforces, leetcode, codechef, atcoder or cf/lc/cc/ac)
    #[arg(short, long = "platform")]
    platforms: Vec<Platform>,
    /// all, upcoming, live or past
    #[arg(short, long, default_value = "all")]
    range: TimeRange,
    /// Case-insensitive match on contest or platform name
    #[arg(short, long, default_value = "")]
    search: String,
    /// Only bookmarked contests
    #[arg(long)]
    bookmarked: bool,
    /// Keep upstream order instead of sorting by start time
    #[arg(long)]
    unsorted: bool,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 20)]
    per_page: usize,
    /// Print the page as JSON
    #[arg(long)]
    json: bool,
}

impl Default for ListArgs {
    fn default() -> Self {
        Self {
            platforms: Vec::new(),
            range: TimeRange::All,
            search: String::new(),
            bookmarked: false,
            unsorted: false,
            page: 1,
            per_page: 20,
            json: false,
        }
    }
}

#[derive(Debug, Subcommand)]
enum BookmarkCommand {
    Add { id: String },
    Remove { id: String },
    Toggle { id: String },
    List,
}

#[derive(Debug, Subcommand)]
enum SolutionCommand {
    /// Store a YouTube link for a contest id
    Set { id: String, url: String },
    Remove { id: String },
}

#[derive(Debug, Args)]
struct RemindArgs {
    /// log, email or sms
    #[arg(long, default_value = "log")]
    channel: NotificationChannel,
    #[arg(long, default_value_t = 30)]
    lead_minutes: i64,
    #[arg(long, default_value_t = 24)]
    window_hours: i64,
    /// Only remind about bookmarked contests
    #[arg(long)]
    bookmarked: bool,
}

impl RemindArgs {
    fn policy(&self) -> Result<ReminderPolicy> {
        let lead = Duration::try_minutes(self.lead_minutes.max(0))
            .with_context(|| format!("--lead-minutes {} is out of range", self.lead_minutes))?;
        let window = Duration::try_hours(self.window_hours.max(0))
            .with_context(|| format!("--window-hours {} is out of range", self.window_hours))?;
        Ok(ReminderPolicy {
            lead,
            window,
            bookmarked_only: self.bookmarked,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RadarConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let pipeline = RadarPipeline::new(config).await?;

    match cli.command.unwrap_or_else(|| Commands::List(ListArgs::default())) {
        Commands::List(args) => {
            let result = pipeline.refresh().await;
            print_listing(&result, &args, Utc::now())?;
        }
        Commands::Bookmark(command) => run_bookmark(&pipeline, command).await?,
        Commands::Solutions(args) => {
            let source = YouTubePlaylistSource::from_config(pipeline.http(), pipeline.config())?;
            let mut result = pipeline.refresh().await;
            result.contests = pipeline.enrich_solutions(&result.contests, &source).await?;
            let args = ListArgs {
                range: TimeRange::Past,
                ..args
            };
            print_listing(&result, &args, Utc::now())?;
        }
        Commands::Solution(SolutionCommand::Set { id, url }) => {
            pipeline.manual_solutions().set(&id, &url).await?;
            println!("solution link stored for {id}");
        }
        Commands::Solution(SolutionCommand::Remove { id }) => {
            if pipeline.manual_solutions().remove(&id).await? {
                println!("solution link removed for {id}");
            } else {
                println!("no solution link stored for {id}");
            }
        }
        Commands::Remind(args) => {
            let dispatcher = LogReminderDispatcher::for_channel(args.channel, pipeline.config())?;
            let result = pipeline.refresh().await;
            print_failures(&result);
            let summary = pipeline
                .schedule_reminders(&result.contests, &args.policy()?, &dispatcher)
                .await?;
            println!(
                "reminders scheduled={} failed={}",
                summary.scheduled,
                summary.failed.len()
            );
        }
        Commands::Watch(args) => {
            let dispatcher = Arc::new(LogReminderDispatcher::for_channel(args.channel, pipeline.config())?);
            let policy = args.policy()?;
            let pipeline = Arc::new(pipeline);
            let tick = pipeline.watch_tick(&policy, dispatcher.as_ref()).await?;
            info!(contests = tick.contests, reminders = tick.reminders.scheduled, "initial refresh finished");

            let mut sched = build_watch_scheduler(pipeline.clone(), dispatcher, policy).await?;
            sched.start().await.context("starting scheduler")?;
            info!(cron = %pipeline.config().watch_cron, "watching; press ctrl-c to stop");
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
    }

    Ok(())
}

async fn run_bookmark(pipeline: &RadarPipeline, command: BookmarkCommand) -> Result<()> {
    let bookmarks = pipeline.bookmarks();
    match command {
        BookmarkCommand::Add { id } => {
            let added = bookmarks.add(&id).await?;
            println!("{id}: {}", if added { "bookmarked" } else { "already bookmarked" });
        }
        BookmarkCommand::Remove { id } => {
            let removed = bookmarks.remove(&id).await?;
            println!("{id}: {}", if removed { "removed" } else { "was not bookmarked" });
        }
        BookmarkCommand::Toggle { id } => {
            let now_bookmarked = bookmarks.toggle(&id).await?;
            println!("{id}: {}", if now_bookmarked { "bookmarked" } else { "removed" });
        }
        BookmarkCommand::List => {
            for id in bookmarks.load().await? {
                println!("{id}");
            }
        }
    }
    Ok(())
}

fn print_failures(result: &AggregateResult) {
    for failure in &result.failures {
        eprintln!("unavailable: {failure}");
    }
}

fn print_listing(result: &AggregateResult, args: &ListArgs, now: DateTime<Utc>) -> Result<()> {
    let criteria = FilterCriteria::default()
        .with_platforms(args.platforms.iter().copied())
        .with_time_range(args.range)
        .with_search(args.search.clone());
    let mut contests = apply_at(&result.contests, &criteria, now);
    if args.bookmarked {
        contests.retain(|c| c.bookmarked);
    }
    if !args.unsorted {
        sort_by_start(&mut contests);
    }
    let page = paginate(&contests, args.page, args.per_page);

    if args.json {
        let body = serde_json::json!({
            "page": page,
            "facets": platform_counts(&contests),
            "failures": result.failures,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    for contest in &page.items {
        println!("{}", render_row(contest, now));
    }
    let facets = platform_counts(&contests)
        .into_iter()
        .map(|f| format!("{}={}", f.platform.id_prefix(), f.count))
        .collect::<Vec<_>>()
        .join(" ");
    println!(
        "page {}/{} ({} contests; {facets})",
        page.page, page.total_pages, page.total_items
    );
    print_failures(result);
    Ok(())
}

fn render_row(contest: &Contest, now: DateTime<Utc>) -> String {
    let status = contest.status_at(now);
    let when = match status {
        ContestStatus::Upcoming => format!("in {}", format_remaining(time_remaining(contest.start_time, now))),
        ContestStatus::Ongoing => "live now".to_string(),
        ContestStatus::Past => "finished".to_string(),
    };
    let mut row = format!(
        "{mark} {id:<28} {platform:<10} {start}  {length:>8}  {when:<16} {name}",
        mark = if contest.bookmarked { '*' } else { ' ' },
        id = contest.id,
        platform = contest.platform.display_name(),
        start = contest.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        length = format_duration(contest.duration_minutes),
        name = contest.name,
    );
    if let Some(url) = &contest.solution_url {
        row.push_str(&format!("  [solution: {url}]"));
    }
    row
}
