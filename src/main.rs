//! # pr-pulse CLI (`pulse`)
//!
//! The `pulse` binary summarizes pull request activity for organizations,
//! users, and repositories, and can serve the same data as a JSON API.
//!
//! ## Usage
//!
//! ```bash
//! pulse --config ./config/pulse.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pulse init` | Create the cache database |
//! | `pulse org <org>` | PR health metrics for an organization |
//! | `pulse user <login>` | A user's open pull requests |
//! | `pulse turn <owner/repo> <number>` | Size and review details for one PR |
//! | `pulse changelog <owner/repo>` | Ranked merged PRs and direct commits |
//! | `pulse leaderboard <org>` | Contributors ranked by merged PRs |
//! | `pulse orgs <login>` | Organizations a user belongs to |
//! | `pulse cache clear` | Drop cached entries |
//! | `pulse serve` | Start the JSON HTTP API |
//! | `pulse completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Health of an organization over the last week
//! GITHUB_TOKEN=... pulse org rust-lang
//!
//! # Changelog for the last 30 days, machine-readable
//! pulse changelog tokio-rs/tokio --since 2024-02-01 --json
//!
//! # Debug logging for the retry loop
//! PULSE_LOG=pr_pulse=debug pulse user octocat
//! ```

use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use pr_pulse::cache_store::SqliteCacheStore;
use pr_pulse::config::{self, Config};
use pr_pulse::dashboard::{Dashboard, DashboardError};
use pr_pulse::progress::{ProgressMode, RetryReporter};
use pr_pulse::view::Delivery;
use pr_pulse::{migrate, report, server};
use pr_pulse_core::cache::{CacheStore, TtlCache};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// pr-pulse: sampled PR search aggregation, health metrics, and changelogs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pulse.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pulse",
    about = "pr-pulse — pull request health metrics from the GitHub search API",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pulse.toml")]
    config: PathBuf,

    /// Print raw JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Retry progress on stderr: `auto`, `off`, `human`, or `json`.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the cache database. Safe to run repeatedly.
    Init,

    /// PR health metrics for an organization.
    ///
    /// Fetches open and merged pull requests concurrently, sampling when
    /// there are more than 500, and grades the merged-to-stale ratio.
    Org {
        /// Organization login.
        org: String,
    },

    /// Open pull requests authored by a user.
    User {
        /// User login.
        login: String,
    },

    /// Size, reviewer, and milestone details for one pull request.
    Turn {
        /// Repository as `owner/name`.
        repo: String,
        /// Pull request number.
        number: u64,
    },

    /// Merged pull requests and direct commits, ranked by importance.
    Changelog {
        /// Repository as `owner/name`.
        repo: String,

        /// Start date (YYYY-MM-DD). Defaults to the metrics window start.
        #[arg(long)]
        since: Option<String>,

        /// Keep entries authored by bots.
        #[arg(long)]
        include_bots: bool,

        /// Maximum entries to print per section.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Contributors ranked by merged pull requests.
    Leaderboard {
        /// Organization login.
        org: String,

        /// Start date (YYYY-MM-DD). Defaults to the metrics window start.
        #[arg(long)]
        since: Option<String>,

        /// Keep bot accounts on the board.
        #[arg(long)]
        include_bots: bool,
    },

    /// Organizations a user publicly belongs to.
    Orgs {
        /// User login.
        login: String,
    },

    /// Manage the local cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start the JSON HTTP API on `[server].bind`.
    Serve,

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove cached entries.
    Clear {
        /// Only remove keys starting with this prefix (e.g. `org_stats:`).
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PULSE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "pulse", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let reporter: Arc<dyn RetryReporter> = Arc::from(ProgressMode::parse(&cli.progress)?.reporter());

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Cache initialized at {}", cfg.cache.path.display());
        }
        Commands::Cache {
            action: CacheAction::Clear { prefix },
        } => {
            let store = Arc::new(SqliteCacheStore::open(&cfg).await?);
            let cache = TtlCache::new(store.clone() as Arc<dyn CacheStore>);
            let removed = cache.clear(prefix.as_deref().unwrap_or("")).await?;
            store.close().await;
            println!("Removed {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" });
        }
        Commands::Serve => {
            server::run_server(&cfg, reporter).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
        command => run_view(command, cfg, reporter, cli.json).await?,
    }

    Ok(())
}

/// Commands that render one dashboard view.
async fn run_view(
    command: Commands,
    cfg: Config,
    reporter: Arc<dyn RetryReporter>,
    json: bool,
) -> anyhow::Result<()> {
    let dashboard = Dashboard::open(cfg, reporter).await?;
    let ticket = dashboard.navigate();
    let now = Utc::now();

    match command {
        Commands::Org { org } => {
            let stats = delivered(dashboard.org_stats(&org, &ticket).await)?;
            emit(json, &stats, || report::render_org_stats(&stats, now))?;
        }
        Commands::User { login } => {
            let prs = delivered(dashboard.user_prs(&login, &ticket).await)?;
            emit(json, &prs, || report::render_user_prs(&prs, now))?;
        }
        Commands::Turn { repo, number } => {
            let turn = delivered(dashboard.pr_turn(&repo, number, &ticket).await)?;
            emit(json, &turn, || report::render_pr_turn(&turn))?;
        }
        Commands::Changelog {
            repo,
            since,
            include_bots,
            limit,
        } => {
            let since = parse_since(since.as_deref(), &dashboard)?;
            let include_bots = include_bots || dashboard.config().metrics.include_bots;
            let log = delivered(
                dashboard
                    .changelog(&repo, since, include_bots, &ticket)
                    .await,
            )?;
            emit(json, &log, || report::render_changelog(&log, limit))?;
        }
        Commands::Leaderboard {
            org,
            since,
            include_bots,
        } => {
            let since = parse_since(since.as_deref(), &dashboard)?;
            let include_bots = include_bots || dashboard.config().metrics.include_bots;
            let board = delivered(
                dashboard
                    .leaderboard(&org, since, include_bots, &ticket)
                    .await,
            )?;
            emit(json, &board, || report::render_leaderboard(&board))?;
        }
        Commands::Orgs { login } => {
            let orgs = delivered(dashboard.user_orgs(&login, &ticket).await)?;
            emit(json, &orgs, || report::render_orgs(&login, &orgs))?;
        }
        Commands::Init
        | Commands::Cache { .. }
        | Commands::Serve
        | Commands::Completions { .. } => {
            // Dispatched in main
            unreachable!()
        }
    }

    Ok(())
}

/// Unwrap a delivery, turning fetch failures into the short user notice.
fn delivered<T>(result: Result<Delivery<T>, DashboardError>) -> anyhow::Result<T> {
    match result {
        Ok(delivery) => delivery
            .into_fresh()
            .ok_or_else(|| anyhow!("view was superseded before results arrived")),
        Err(DashboardError::Fetch(err)) => {
            tracing::debug!("fetch failed: {}", err);
            Err(anyhow!("{}", err.user_message(Utc::now())))
        }
        Err(other) => Err(other.into()),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text());
    }
    Ok(())
}

fn parse_since(raw: Option<&str>, dashboard: &Dashboard) -> anyhow::Result<NaiveDate> {
    match raw {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| anyhow!("--since must be YYYY-MM-DD, got '{}'", s)),
        None => Ok(dashboard.default_since()),
    }
}
