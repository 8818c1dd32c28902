//! Feedtrack CLI
//!
//! Terminal client for the feed log:
//! - Record and correct feeds
//! - Show the timers, timeline and daily totals
//! - Export, import and reset the log
//!
//! Works against whichever backend the config selects, including a remote
//! `feedtrack-api` server.

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;

use feedtrack::config::Config;
use feedtrack::session::{parse_amount, FeedSession};
use feedtrack::storage::{self, BackendKind, FeedRecordUpdate};
use feedtrack::timing::{self, format_hm, format_hms, AlertLevel, FeedStatus};
use feedtrack::{logging, transfer};

#[derive(Parser)]
#[command(name = "feedtrack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Infant feeding tracker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured backend (memory, blob, kv, sql, http)
    #[arg(short, long, global = true)]
    pub backend: Option<BackendKind>,

    /// Show info-level logs
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the last feed and the countdown to the next
    Status,

    /// Record a feed
    Feed {
        /// Volume in ml
        amount: String,
        /// When it happened: RFC 3339, HH:MM (today), or now-<n><m|h>
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Correct a recorded feed
    Edit {
        /// Feed id (see `timeline --ids`)
        id: String,
        /// New volume in ml
        #[arg(short, long)]
        amount: Option<String>,
        /// New time: RFC 3339, HH:MM (today), or now-<n><m|h>
        #[arg(long)]
        at: Option<String>,
    },

    /// List recent feeds with the gaps between them
    Timeline {
        /// Include record ids
        #[arg(long)]
        ids: bool,
    },

    /// Daily totals
    Summary,

    /// Export the full log
    Export {
        /// json or csv
        #[arg(short, long, default_value = "json")]
        format: transfer::ExportFormat,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge a JSON snapshot into the log
    Import {
        /// Path to a JSON export
        path: PathBuf,
    },

    /// Delete every feed and start over
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Live timers, refreshed every second
    Watch,

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_ref());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }

    let mut log_config = config.logging.clone();
    if !cli.verbose {
        log_config.level = "warn".to_string();
    }
    logging::init(&log_config);

    let store = storage::open_store(&config.storage).context("failed to open feed store")?;
    let session = FeedSession::open(store, config.schedule.to_schedule())
        .await
        .context("failed to load feed history")?;

    if let Some(warning) = session.take_warning() {
        eprintln!("warning: {}", warning);
    }

    let result = run(&cli.command, &session).await;
    session.close();
    result
}

async fn run(command: &Commands, session: &FeedSession) -> anyhow::Result<()> {
    match command {
        Commands::Status => print_status(&session.feed_status(Utc::now())),

        Commands::Feed { amount, at } => {
            let amount = parse_amount(amount)?;
            let time = at.as_deref().map(|s| parse_at(s, Local::now())).transpose()?;

            let record = session.add_feed(i64::from(amount), time).await?;
            println!(
                "Recorded {} ml at {}",
                record.amount,
                record.time.with_timezone(&Local).format("%H:%M")
            );
        }

        Commands::Edit { id, amount, at } => {
            let mut updates = FeedRecordUpdate::new();
            if let Some(amount) = amount {
                updates = updates.amount(parse_amount(amount)?);
            }
            if let Some(at) = at {
                updates = updates.time(parse_at(at, Local::now())?);
            }
            if updates.is_empty() {
                bail!("nothing to change: pass --amount and/or --at");
            }

            session.update_feed(id, updates).await?;
            println!("Updated {}", id);
        }

        Commands::Timeline { ids } => {
            let entries = timing::timeline(
                &session.records(),
                Utc::now(),
                &Local,
                session.schedule().recent_window,
            );
            if entries.is_empty() {
                println!("No feeds in the last {}", format_hm(session.schedule().recent_window));
            }
            for entry in entries {
                let local = entry.record.time.with_timezone(&Local);
                let gap = entry
                    .since_previous
                    .map(|gap| format!("+{}", format_hm(gap)))
                    .unwrap_or_default();
                print!(
                    "{:<12} {} {:>5} ml {:>9}",
                    entry.day.to_string(),
                    local.format("%H:%M"),
                    entry.record.amount,
                    gap
                );
                if *ids {
                    print!("  {}", entry.record.id);
                }
                println!();
            }
        }

        Commands::Summary => {
            let totals = timing::daily_totals(
                &session.records(),
                Utc::now(),
                &Local,
                session.schedule().summary_days,
            );
            println!("{:<12} {:>8} {:>6}", "Date", "Total", "Feeds");
            println!("{}", "-".repeat(28));
            for day in totals {
                println!("{:<12} {:>5} ml {:>6}", day.date, day.total_ml, day.count);
            }
        }

        Commands::Export { format, output } => {
            let data = transfer::export(&session.records(), *format)?;
            match output {
                Some(path) => {
                    std::fs::write(path, &data)?;
                    println!("Exported to {:?}", path);
                }
                None => print!("{}", data),
            }
        }

        Commands::Import { path } => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read {:?}", path))?;
            let report = transfer::import_json(session.store().as_ref(), &content).await?;
            session.load().await?;
            println!("Imported {} feeds ({} already present)", report.imported, report.skipped);
        }

        Commands::Reset { yes } => {
            if !yes {
                bail!("this deletes every recorded feed; re-run with --yes to confirm");
            }
            session.reset().await?;
            println!("Feed log reset");
        }

        Commands::Watch => watch(session).await?,

        Commands::Config { output } => write_default_config(output.as_ref())?,
    }

    Ok(())
}

fn print_status(status: &FeedStatus) {
    let (Some(latest), Some(elapsed), Some(next)) = (&status.latest, status.elapsed, status.next)
    else {
        println!("No feeds recorded yet");
        return;
    };

    println!(
        "Last feed:  {} ml at {} ({} ago)",
        latest.amount,
        latest.time.with_timezone(&Local).format("%a %H:%M"),
        format_hms(elapsed)
    );
    let due = next.due_at.with_timezone(&Local).format("%H:%M");
    if next.overdue {
        println!("Next feed:  overdue (was due {})", due);
    } else {
        println!("Next feed:  in {} (due {})", format_hms(next.remaining), due);
    }
    println!("Alert:      {}", status.alert);
}

/// Redraw the timers once a second; reload every 30s to pick up other writers
async fn watch(session: &FeedSession) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut ticks: u64 = 0;
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
        }

        ticks += 1;
        if ticks % 30 == 0 {
            if let Err(e) = session.load().await {
                tracing::warn!(error = %e, "Reload failed");
            }
        }

        let status = session.feed_status(Utc::now());
        let line = match (status.elapsed, status.next) {
            (Some(elapsed), Some(next)) => format!(
                "since last {}  next {}  [{}]",
                format_hms(elapsed),
                if next.overdue { "OVERDUE".to_string() } else { format_hms(next.remaining) },
                alert_tag(status.alert)
            ),
            _ => "no feeds recorded".to_string(),
        };
        write!(stdout, "\r{:<60}", line)?;
        stdout.flush()?;
    }
}

fn alert_tag(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Normal => "ok",
        AlertLevel::Warning => "soon",
        AlertLevel::Danger => "due",
    }
}

fn write_default_config(output: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = feedtrack::config::generate_default_config();

    match output {
        Some(path) => {
            // Create parent directory if needed
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &config)?;
            println!("Config written to {:?}", path);
        }
        None => print!("{}", config),
    }
    Ok(())
}

/// Parse a `--at` value relative to `now`
fn parse_at(input: &str, now: DateTime<Local>) -> anyhow::Result<DateTime<Utc>> {
    let input = input.trim();
    if input == "now" {
        return Ok(now.with_timezone(&Utc));
    }

    let relative = Regex::new(r"^now-(\d+)([mh])$")?;
    if let Some(caps) = relative.captures(input) {
        let amount: i64 = caps[1].parse().context("offset too large")?;
        let offset = match &caps[2] {
            "m" => Duration::minutes(amount),
            _ => Duration::hours(amount),
        };
        return Ok((now - offset).with_timezone(&Utc));
    }

    let clock = Regex::new(r"^(\d{1,2}):(\d{2})$")?;
    if let Some(caps) = clock.captures(input) {
        let hour: u32 = caps[1].parse()?;
        let minute: u32 = caps[2].parse()?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)
            .with_context(|| format!("invalid clock time {:?}", input))?;
        let local = Local
            .from_local_datetime(&now.date_naive().and_time(time))
            .earliest()
            .with_context(|| format!("{:?} does not exist today", input))?;
        return Ok(local.with_timezone(&Utc));
    }

    DateTime::parse_from_rfc3339(input)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("cannot parse time {:?}: use RFC 3339, HH:MM or now-<n><m|h>", input))
}
