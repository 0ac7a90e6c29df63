//! realtycast-server - HTTP API for social scheduling and publishing

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use librealtycast::logging::{LogFormat, LoggingConfig};
use librealtycast::types::now_ms;
use librealtycast::{Config, RealtycastService};
use tracing::{debug, info};

/// How often expired rate-limit buckets are dropped
const LIMITER_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "realtycast-server")]
#[command(version)]
#[command(about = "HTTP API for social post scheduling and publishing")]
#[command(long_about = "\
realtycast-server - HTTP API for social post scheduling and publishing

DESCRIPTION:
    Serves the operator-facing social API under /api/social: creating and
    listing posts, immediate multi-platform publishing, OAuth connection of
    platform accounts and the scheduler trigger.

    The scheduler does not run on its own. Point an external cron at
    POST /api/social/scheduler/run with `Authorization: Bearer <cron_secret>`,
    or run `realtycast-send run` from cron instead.

AUTHENTICATION:
    Requests must carry X-Admin-Id, set by the site's auth layer in front of
    this service. Bind to a private address.

CONFIGURATION:
    Configuration file: ~/.config/realtycast/config.toml
    (override with --config or REALTYCAST_CONFIG)

    [server]
    bind = \"127.0.0.1:8080\"
    public_url = \"https://realty.example.com\"
    operator_ui_url = \"https://realty.example.com/admin/social\"
    cron_secret = \"...\"

    [platforms.facebook]
    client_id = \"...\"        # or FACEBOOK_CLIENT_ID
    client_secret = \"...\"    # or FACEBOOK_CLIENT_SECRET
")]
struct Cli {
    /// Address to listen on (overrides [server] bind)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Path to config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log output format: text, json or pretty
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    LoggingConfig::new(cli.log_format, "info".to_string(), cli.verbose).init();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from_path(path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => Config::load()?,
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    let bind = config.server.bind.clone();
    let service = RealtycastService::from_config(config).await?;
    spawn_limiter_purge(service.clone());

    let app = realtycast_server::build_router(service);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind to {}", bind))?;

    info!(addr = %bind, "realtycast-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;

    info!("realtycast-server stopped");
    Ok(())
}

fn spawn_limiter_purge(service: RealtycastService) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LIMITER_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = service.rate_limiter().purge_expired(now_ms());
            if purged > 0 {
                debug!(purged, "Purged expired rate-limit buckets");
            }
        }
    });
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, stopping gracefully..."),
        Err(e) => {
            tracing::warn!(error = %e, "Could not listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
