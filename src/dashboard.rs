//! Dashboard context.
//!
//! [`Dashboard`] is the explicit session object the CLI and HTTP server
//! share. It owns the configuration, the search client, the token
//! accessor, the TTL cache, and the view tracker. Every feature follows the
//! same pipeline:
//!
//! ```text
//! cache lookup ──hit──────────────────────────────┐
//!      │ miss                                      ▼
//!      └─► aggregator / client ─► derive ─► cache store ─► deliver if view current
//! ```
//!
//! | Operation | Cache family | Upstream calls |
//! |-----------|--------------|----------------|
//! | [`org_stats`](Dashboard::org_stats) | `org_stats` (2 h) | open + merged searches, concurrently |
//! | [`user_prs`](Dashboard::user_prs) | `pr_snapshot` (10 s) | open search by author |
//! | [`pr_turn`](Dashboard::pr_turn) | `pr_turn` (2 h) | pull details |
//! | [`changelog`](Dashboard::changelog) | `changelog` (4 h) | merged search by repo, commits, pull details |
//! | [`leaderboard`](Dashboard::leaderboard) | `leaderboard` (4 h) | merged search by org |
//! | [`user_orgs`](Dashboard::user_orgs) | `user_orgs` (24 h) | org membership |
//!
//! Bot filtering is applied on delivery, so one cached entry serves both
//! settings of the toggle.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use pr_pulse_core::cache::{CacheFamily, CacheKey, CacheStore, TtlCache};
use pr_pulse_core::error::FetchError;
use pr_pulse_core::leaderboard::{build_leaderboard, ContributorStat};
use pr_pulse_core::metrics::{self, derive_metrics, MetricsSnapshot};
use pr_pulse_core::models::{AggregationResult, CommitItem, Enrichment, SearchItem};
use pr_pulse_core::query::{Scope, SearchQuery};
use pr_pulse_core::scoring::{rank, Scored};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregate::Aggregator;
use crate::auth::{SharedToken, TokenProvider};
use crate::cache_store::SqliteCacheStore;
use crate::config::Config;
use crate::executor::BackoffExecutor;
use crate::github::{GithubClient, SearchClient};
use crate::progress::RetryReporter;
use crate::view::{Delivery, ViewTicket, ViewTracker};

/// Changelog PRs that get per-PR details fetched for scoring bonuses.
const CHANGELOG_ENRICH_LIMIT: usize = 30;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Cached payload of [`Dashboard::org_stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgStats {
    pub org: String,
    pub snapshot: MetricsSnapshot,
    pub open_sampled: bool,
    pub window_start: DateTime<Utc>,
}

/// Cached payload of [`Dashboard::user_prs`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPrs {
    pub user: String,
    pub result: AggregationResult,
}

/// Cached payload of [`Dashboard::pr_turn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrTurn {
    pub repo: String,
    pub number: u64,
    pub details: Enrichment,
}

/// Cached payload of [`Dashboard::changelog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Changelog {
    pub prs: Vec<Scored<SearchItem>>,
    pub commits: Vec<Scored<CommitItem>>,
    /// Commit listing failed; `commits` is empty rather than authoritative.
    pub commits_fetch_failed: bool,
}

impl Changelog {
    fn without_bots(mut self) -> Self {
        self.prs.retain(|e| !e.item.author.is_bot());
        self.commits.retain(|e| !e.item.author.is_bot());
        self
    }
}

/// Cached payload of [`Dashboard::leaderboard`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub org: String,
    pub since: NaiveDate,
    pub total_count: u64,
    pub sampled: bool,
    pub entries: Vec<ContributorStat>,
}

pub struct Dashboard {
    config: Config,
    client: Arc<dyn SearchClient>,
    token: Arc<dyn TokenProvider>,
    cache: TtlCache,
    search: Aggregator,
    calls: BackoffExecutor,
    enrichment: BackoffExecutor,
    views: ViewTracker,
}

impl Dashboard {
    pub fn new(
        config: Config,
        client: Arc<dyn SearchClient>,
        token: Arc<dyn TokenProvider>,
        store: Arc<dyn CacheStore>,
        reporter: Arc<dyn RetryReporter>,
    ) -> Result<Self> {
        let calls = BackoffExecutor::new(config.retry.search_policy(), reporter, token.clone());
        let enrichment = calls.with_policy(config.retry.enrichment_policy());
        let search = Aggregator::new(client.clone(), calls.clone(), config.github.per_page)
            .with_exclusions(&config.filters.exclude_repos)?;
        let cache = TtlCache::new(store).with_max_entry_bytes(config.cache.max_entry_bytes);
        Ok(Self {
            config,
            client,
            token,
            cache,
            search,
            calls,
            enrichment,
            views: ViewTracker::new(),
        })
    }

    /// Wire up the real GitHub client, SQLite cache, and env token.
    pub async fn open(config: Config, reporter: Arc<dyn RetryReporter>) -> Result<Self> {
        let token: Arc<dyn TokenProvider> =
            Arc::new(SharedToken::from_env(&config.github.token_env));
        if token.token().is_none() {
            debug!(var = %config.github.token_env, "no token set, requests are unauthenticated");
        }
        let client = Arc::new(GithubClient::new(&config.github, token.clone())?);
        let store = Arc::new(SqliteCacheStore::open(&config).await?);
        Self::new(config, client, token, store, reporter)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn token(&self) -> &Arc<dyn TokenProvider> {
        &self.token
    }

    /// First day of the configured metrics window.
    pub fn default_since(&self) -> NaiveDate {
        metrics::window_start(Utc::now(), self.config.metrics.window_days).date_naive()
    }

    /// Start a new view, superseding every earlier one.
    pub fn navigate(&self) -> ViewTicket {
        self.views.navigate()
    }

    /// PR health metrics for an organization over the configured window.
    pub async fn org_stats(
        &self,
        org: &str,
        ticket: &ViewTicket,
    ) -> Result<Delivery<OrgStats>, DashboardError> {
        let org = require("org", org)?;
        let window = format!("{}d", self.config.metrics.window_days);
        let key = CacheKey::org(CacheFamily::OrgStats, org).variant(window);
        let stats = self.cached(&key, || self.fetch_org_stats(org)).await?;
        Ok(ticket.deliver(stats))
    }

    async fn fetch_org_stats(&self, org: &str) -> Result<OrgStats, DashboardError> {
        let now = Utc::now();
        let window_start = metrics::window_start(now, self.config.metrics.window_days);
        let scope = Scope::Org(org.to_string());
        let open_query = SearchQuery::open(scope.clone());
        let merged_query = SearchQuery::merged(scope).merged_since(window_start.date_naive());

        let (open, merged) = tokio::join!(
            self.search.aggregate(&open_query),
            self.search.aggregate(&merged_query)
        );
        let (open, merged) = (open?, merged?);

        let snapshot = derive_metrics(&open, &merged, window_start, now);
        Ok(OrgStats {
            org: org.to_string(),
            open_sampled: open.sampled,
            window_start,
            snapshot,
        })
    }

    /// Open pull requests authored by `user`.
    pub async fn user_prs(
        &self,
        user: &str,
        ticket: &ViewTicket,
    ) -> Result<Delivery<UserPrs>, DashboardError> {
        let user = require("user", user)?;
        let key = CacheKey::user(CacheFamily::PrSnapshot, user);
        let prs = self
            .cached(&key, || async {
                let query = SearchQuery::open(Scope::Author(user.to_string()));
                let result = self.search.aggregate(&query).await?;
                Ok::<_, DashboardError>(UserPrs {
                    user: user.to_string(),
                    result,
                })
            })
            .await?;
        Ok(ticket.deliver(prs))
    }

    /// Size, reviewer, and milestone details for one pull request.
    pub async fn pr_turn(
        &self,
        repo: &str,
        number: u64,
        ticket: &ViewTicket,
    ) -> Result<Delivery<PrTurn>, DashboardError> {
        let repo = require_repo(repo)?;
        let key = CacheKey::pull(CacheFamily::PrTurn, repo, number);
        let turn = self
            .cached(&key, || async {
                let label = format!("pull {}#{}", repo, number);
                let details = self
                    .enrichment
                    .execute(&label, || self.client.pull_details(repo, number))
                    .await?;
                Ok::<_, DashboardError>(PrTurn {
                    repo: repo.to_string(),
                    number,
                    details,
                })
            })
            .await?;
        Ok(ticket.deliver(turn))
    }

    /// Ranked merged PRs and direct commits in `repo` since `since`.
    pub async fn changelog(
        &self,
        repo: &str,
        since: NaiveDate,
        include_bots: bool,
        ticket: &ViewTicket,
    ) -> Result<Delivery<Changelog>, DashboardError> {
        let repo = require_repo(repo)?;
        let key = CacheKey::new(CacheFamily::Changelog, repo.to_lowercase()).variant(since);
        let changelog = self
            .cached(&key, || self.fetch_changelog(repo, since))
            .await?;
        let changelog = if include_bots {
            changelog
        } else {
            changelog.without_bots()
        };
        Ok(ticket.deliver(changelog))
    }

    async fn fetch_changelog(
        &self,
        repo: &str,
        since: NaiveDate,
    ) -> Result<Changelog, DashboardError> {
        let query = SearchQuery::merged(Scope::Repo(repo.to_string())).merged_since(since);
        let merged = self.search.aggregate(&query).await?;
        let prs = self.enrich(repo, merged.items).await;

        let since_ts = Utc.from_utc_datetime(&since.and_time(chrono::NaiveTime::MIN));
        let label = format!("commits {}", repo);
        let (commits, commits_fetch_failed) = match self
            .calls
            .execute(&label, || self.client.list_commits(repo, since_ts))
            .await
        {
            Ok(commits) => (direct_commits(commits, &prs), false),
            Err(e) => {
                warn!(repo, "commit listing failed, changelog has PRs only: {}", e);
                (Vec::new(), true)
            }
        };

        let rules = &self.config.scoring;
        Ok(Changelog {
            prs: rank(prs, rules),
            commits: rank(commits, rules),
            commits_fetch_failed,
        })
    }

    /// Attach pull details to the first few items. Failures leave the item
    /// as fetched.
    async fn enrich(&self, repo: &str, items: Vec<SearchItem>) -> Vec<SearchItem> {
        let mut out = Vec::with_capacity(items.len());
        for (idx, item) in items.into_iter().enumerate() {
            if idx >= CHANGELOG_ENRICH_LIMIT {
                out.push(item);
                continue;
            }
            let number = item.number;
            let label = format!("pull {}#{}", repo, number);
            match self
                .enrichment
                .execute(&label, || self.client.pull_details(repo, number))
                .await
            {
                Ok(details) => out.push(item.with_enrichment(details)),
                Err(e) => {
                    debug!(repo, number, "enrichment skipped: {}", e);
                    out.push(item);
                }
            }
        }
        out
    }

    /// Contributors ranked by merged PRs in `org` since `since`.
    pub async fn leaderboard(
        &self,
        org: &str,
        since: NaiveDate,
        include_bots: bool,
        ticket: &ViewTicket,
    ) -> Result<Delivery<Leaderboard>, DashboardError> {
        let org = require("org", org)?;
        let key = CacheKey::org(CacheFamily::Leaderboard, org).variant(since);
        let mut board = self
            .cached(&key, || async {
                let query =
                    SearchQuery::merged(Scope::Org(org.to_string())).merged_since(since);
                let merged = self.search.aggregate(&query).await?;
                Ok::<_, DashboardError>(Leaderboard {
                    org: org.to_string(),
                    since,
                    total_count: merged.total_count,
                    sampled: merged.sampled,
                    entries: build_leaderboard(&merged.items, true, &self.config.scoring),
                })
            })
            .await?;
        if !include_bots {
            board.entries.retain(|e| !e.is_bot);
        }
        Ok(ticket.deliver(board))
    }

    /// Organizations `user` publicly belongs to.
    pub async fn user_orgs(
        &self,
        user: &str,
        ticket: &ViewTicket,
    ) -> Result<Delivery<Vec<String>>, DashboardError> {
        let user = require("user", user)?;
        let key = CacheKey::user(CacheFamily::Membership, user);
        let orgs = self
            .cached(&key, || async {
                let label = format!("orgs of {}", user);
                let orgs = self
                    .calls
                    .execute(&label, || self.client.user_orgs(user))
                    .await?;
                Ok::<_, DashboardError>(orgs)
            })
            .await?;
        Ok(ticket.deliver(orgs))
    }

    /// Remove cache entries under `prefix`, or everything when `None`.
    pub async fn clear_cache(&self, prefix: Option<&str>) -> Result<u64> {
        self.cache.clear(prefix.unwrap_or("")).await
    }

    async fn cached<T, F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<T, DashboardError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DashboardError>>,
    {
        if let Some(hit) = self.cache.get::<T>(key).await {
            return Ok(hit);
        }
        let fresh = fetch().await?;
        self.cache.put(key, &fresh).await;
        Ok(fresh)
    }
}

fn require<'a>(what: &str, value: &'a str) -> Result<&'a str, DashboardError> {
    let value = value.trim();
    if value.is_empty() || value.contains(char::is_whitespace) {
        return Err(DashboardError::InvalidInput(format!(
            "{} must be a non-empty name without spaces",
            what
        )));
    }
    Ok(value)
}

fn require_repo(repo: &str) -> Result<&str, DashboardError> {
    let repo = require("repository", repo)?;
    match repo.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok(repo)
        }
        _ => Err(DashboardError::InvalidInput(format!(
            "repository must be owner/name, got '{}'",
            repo
        ))),
    }
}

/// Commits that did not arrive through one of `prs`.
fn direct_commits(commits: Vec<CommitItem>, prs: &[SearchItem]) -> Vec<CommitItem> {
    let refs: Vec<String> = prs.iter().map(|pr| format!("(#{})", pr.number)).collect();
    commits
        .into_iter()
        .filter(|c| {
            let subject = c.message.lines().next().unwrap_or("");
            !subject.starts_with("Merge pull request") && !refs.iter().any(|r| subject.contains(r))
        })
        .collect()
}
