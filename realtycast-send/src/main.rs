//! realtycast-send - Run one scheduler sweep from cron or a terminal
//!
//! Each invocation claims the posts that are due, publishes them and exits.
//! There is no daemon mode; schedule the command with cron or a systemd timer.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use librealtycast::logging::{LogFormat, LoggingConfig};
use librealtycast::scheduling::parse_schedule_ts;
use librealtycast::types::now_ts;
use librealtycast::{Config, RealtycastError, RealtycastService, SchedulerRun, SocialPost};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "realtycast-send")]
#[command(version)]
#[command(about = "Publish due social posts once and exit")]
#[command(long_about = "\
realtycast-send - Publish due social posts once and exit

DESCRIPTION:
    realtycast-send performs a single scheduler sweep: it claims every
    scheduled post whose time has come, publishes it to each of its
    platforms, records the per-platform results and exits. Overlapping
    invocations are safe; a post is only ever claimed by one of them.

USAGE:
    # Publish whatever is due now
    realtycast-send run

    # Machine-readable summary
    realtycast-send run --format json

    # Inspect the queue
    realtycast-send list

CRON:
    * * * * * realtycast-send run >> /var/log/realtycast-send.log 2>&1

CONFIGURATION:
    Configuration file: ~/.config/realtycast/config.toml
    (override with --config or REALTYCAST_CONFIG)

    [database]
    path = \"~/.local/share/realtycast/social.db\"

    [scheduling]
    publish_timeout_secs = 30
    max_concurrent_posts = 4
    failure_policy = { mode = \"terminal\" }

EXIT CODES:
    0 - Sweep completed (even if some publishes failed)
    1 - Runtime error
    2 - Authentication error
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to config.toml (defaults to REALTYCAST_CONFIG or the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, global = true, default_value = "text", value_name = "FORMAT")]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Claim and publish every post that is due
    Run {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Treat this moment as "now" (RFC 3339 or relative like "2h")
        #[arg(long, value_name = "WHEN")]
        at: Option<String>,
    },
    /// List stored posts, scheduled first
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, "info".to_string(), cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<RealtycastError>()
            .map(RealtycastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let service = RealtycastService::from_config(config).await?;

    match cli.command {
        Command::Run { format, at } => {
            let now = match at {
                Some(when) => parse_schedule_ts(&when, now_ts())?,
                None => now_ts(),
            };
            info!(now, "realtycast-send sweep starting");
            let run = service.scheduler().run(now).await?;
            print_run(&run, format)?;
        }
        Command::List { format } => {
            let posts = service.posts().list_posts().await?;
            print_posts(&posts, format)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from_path(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => Ok(Config::load()?),
    }
}

fn print_run(run: &SchedulerRun, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(run)?),
        OutputFormat::Text => {
            for post in &run.published {
                match post.requeued_at {
                    Some(at) => println!("{}  failed, requeued for {}", post.post_id, format_ts(Some(at))),
                    None => println!("{}  {}", post.post_id, post.status),
                }
                for result in &post.results {
                    if result.is_success() {
                        let id = result.external_id.as_deref().unwrap_or("-");
                        println!("    {:<10} ok  {}", result.platform, id);
                    } else {
                        let error = result.error.as_deref().unwrap_or("unknown error");
                        println!("    {:<10} ERR {}", result.platform, error);
                    }
                }
            }
            println!(
                "{} post(s) processed in {}ms",
                run.published.len(),
                run.duration_ms
            );
        }
    }
    Ok(())
}

fn print_posts(posts: &[SocialPost], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(posts)?),
        OutputFormat::Text => {
            if posts.is_empty() {
                println!("No posts");
            }
            for post in posts {
                let platforms: Vec<&str> = post.platforms.iter().map(|p| p.as_str()).collect();
                println!(
                    "{}  {:<10} {:<25} {:<30} {}",
                    post.id,
                    post.status,
                    format_ts(post.scheduled_at),
                    platforms.join(","),
                    preview(&post.content, 40)
                );
            }
        }
    }
    Ok(())
}

fn format_ts(ts: Option<i64>) -> String {
    ts.and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

/// First line of `content`, cut to `max` characters
fn preview(content: &str, max: usize) -> String {
    let line = content.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}
