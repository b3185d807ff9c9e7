//! Command line interface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::discovery::DiscoveryEngine;
use crate::net::{HttpClient, RateLimiter};
use crate::notify::{LogNotifier, Notifier};
use crate::probe::OrderLimitProber;
use crate::repository::{
    MemoryRepository, SettingsRepository, TargetRepository, WatchRepository,
};
use crate::scheduler::CheckScheduler;
use crate::scrape::{EvidenceExtractor, Renderer};

#[derive(Parser)]
#[command(name = "stockwatch", version, about = "Stock and price monitor for web stores")]
pub struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to a TOML config file.
    #[arg(short, long, global = true, env = "STOCKWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON state file (overrides the config).
    #[arg(long, global = true, env = "STOCKWATCH_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check monitored targets once.
    Check {
        /// Check everything, ignoring per-target intervals.
        #[arg(long)]
        force: bool,
        /// Check a single target by id.
        #[arg(long)]
        target: Option<i64>,
    },
    /// Run keyword watches once.
    Watch {
        /// Run a single watch by id; all due watches otherwise.
        id: Option<i64>,
        #[arg(long)]
        force: bool,
    },
    /// Run continuously, checking targets and watches on their intervals.
    Run,
    /// Print targets and watches with their current state.
    Status,
}

struct App {
    repo: Arc<MemoryRepository>,
    scheduler: Arc<CheckScheduler>,
    discovery: DiscoveryEngine,
    renderer: Option<Arc<dyn Renderer>>,
}

async fn build(cli: &Cli) -> Result<App> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let state_path = cli.state.clone().unwrap_or_else(|| config.state_file.clone());
    let repo = Arc::new(MemoryRepository::open(state_path).await?);

    let rate_limiter = RateLimiter::with_config(config.rate_limit_config());
    let http = Arc::new(HttpClient::new(config.http_client_config(), rate_limiter)?);
    let renderer = make_renderer(&config);
    let extractor = EvidenceExtractor::new(http.clone(), renderer.clone());
    let prober = config
        .probe_order_limits
        .then(|| OrderLimitProber::new(http.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    let scheduler = Arc::new(CheckScheduler::new(
        repo.clone() as Arc<dyn TargetRepository>,
        repo.clone() as Arc<dyn SettingsRepository>,
        extractor,
        prober,
        notifier.clone(),
        config.clone(),
    ));
    let discovery = DiscoveryEngine::new(
        repo.clone() as Arc<dyn WatchRepository>,
        repo.clone() as Arc<dyn TargetRepository>,
        repo.clone() as Arc<dyn SettingsRepository>,
        http,
        notifier,
        Some(scheduler.clone()),
        config,
    );

    Ok(App {
        repo,
        scheduler,
        discovery,
        renderer,
    })
}

#[cfg(feature = "browser")]
fn make_renderer(config: &AppConfig) -> Option<Arc<dyn Renderer>> {
    use crate::scrape::browser::ChromiumRenderer;
    config.enable_browser.then(|| {
        Arc::new(ChromiumRenderer::new(Duration::from_secs(
            config.request_timeout_secs.max(20),
        ))) as Arc<dyn Renderer>
    })
}

#[cfg(not(feature = "browser"))]
fn make_renderer(_config: &AppConfig) -> Option<Arc<dyn Renderer>> {
    None
}

pub async fn run(cli: Cli) -> Result<()> {
    let app = build(&cli).await?;

    let result = match cli.command {
        Command::Check { force, target } => run_check(&app, force, target).await,
        Command::Watch { id, force } => run_watch(&app, id, force).await,
        Command::Run => run_loop(&app).await,
        Command::Status => run_status(&app).await,
    };

    if let Some(ref renderer) = app.renderer {
        renderer.close().await;
    }
    result
}

async fn run_check(app: &App, force: bool, target: Option<i64>) -> Result<()> {
    match target {
        Some(id) => {
            let changed = app.scheduler.check_one(id).await?;
            info!("target {} checked (stock changed: {})", id, changed);
        }
        None => {
            let stats = app.scheduler.check_due(force).await?;
            info!(
                "checked {} targets ({} failed, {} stock changes)",
                stats.checked, stats.failed, stats.stock_changes
            );
        }
    }
    Ok(())
}

async fn run_watch(app: &App, id: Option<i64>, force: bool) -> Result<()> {
    match id {
        Some(id) => {
            let found = app.discovery.check_watch(id).await?;
            info!("watch {} found {} products", id, found);
        }
        None => {
            let ran = app.discovery.check_all_due(force).await?;
            info!("ran {} watches", ran);
        }
    }
    Ok(())
}

async fn run_loop(app: &App) -> Result<()> {
    info!("monitor loop started");
    let mut tick = tokio::time::interval(Duration::from_secs(60));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(err) = app.scheduler.check_due(false).await {
                    warn!("check pass failed: {:#}", err);
                }
                if let Err(err) = app.discovery.check_all_due(false).await {
                    warn!("watch pass failed: {:#}", err);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

async fn run_status(app: &App) -> Result<()> {
    let targets = app.repo.list_targets().await?;
    println!("{} targets:", targets.len());
    for t in &targets {
        println!(
            "  [{}] {} {} price={} stock={} last_checked={}",
            t.id,
            t.name,
            t.url,
            t.current_price
                .map(|p| format!("{:.2} {}", p, t.currency))
                .unwrap_or_else(|| "-".to_string()),
            if t.in_stock { "yes" } else { "no" },
            t.last_checked
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        );
    }

    let watches = app.repo.list_watches().await?;
    println!("{} watches:", watches.len());
    for w in &watches {
        println!(
            "  [{}] {:?} on {} known={} last_found={} active={}",
            w.id,
            w.keyword,
            w.store_url,
            w.known_product_urls.len(),
            w.last_found_count,
            w.active,
        );
    }

    if let Some(last) = app.repo.get_setting("last_check_at").await? {
        println!("last check: {last}");
    }
    if let Some(total) = app.repo.get_setting("total_checks").await? {
        println!("total checks: {total}");
    }
    Ok(())
}
