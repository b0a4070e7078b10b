//! TOML configuration.
//!
//! ```toml
//! [github]
//! api_base = "https://api.github.com"
//! token_env = "GITHUB_TOKEN"
//!
//! [retry]
//! max_attempts = 5
//!
//! [cache]
//! path = "./data/pulse.sqlite"
//!
//! [metrics]
//! window_days = 7
//!
//! [filters]
//! exclude_repos = ["acme/sandbox-*"]
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```
//!
//! Only `[cache]` is required; every other section falls back to defaults.

use anyhow::{Context, Result};
use pr_pulse_core::backoff::BackoffPolicy;
use pr_pulse_core::scoring::ScoringRules;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scoring: ScoringRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Environment variable holding the access token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
            per_page: default_per_page(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("pr-pulse/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_search_base_ms")]
    pub search_base_ms: u64,
    #[serde(default = "default_search_cap_ms")]
    pub search_cap_ms: u64,
    #[serde(default = "default_enrichment_base_ms")]
    pub enrichment_base_ms: u64,
    #[serde(default = "default_enrichment_cap_ms")]
    pub enrichment_cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            search_base_ms: default_search_base_ms(),
            search_cap_ms: default_search_cap_ms(),
            enrichment_base_ms: default_enrichment_base_ms(),
            enrichment_cap_ms: default_enrichment_cap_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    BackoffPolicy::DEFAULT_MAX_ATTEMPTS
}
fn default_search_base_ms() -> u64 {
    1000
}
fn default_search_cap_ms() -> u64 {
    10_000
}
fn default_enrichment_base_ms() -> u64 {
    250
}
fn default_enrichment_cap_ms() -> u64 {
    5_000
}

impl RetryConfig {
    pub fn search_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.search_base_ms),
            Duration::from_millis(self.search_cap_ms),
            self.max_attempts,
        )
    }

    pub fn enrichment_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.enrichment_base_ms),
            Duration::from_millis(self.enrichment_cap_ms),
            self.max_attempts,
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub path: PathBuf,
    /// Skip storing entries larger than this many serialized bytes.
    #[serde(default)]
    pub max_entry_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default)]
    pub include_bots: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            include_bots: false,
        }
    }
}

fn default_window_days() -> u32 {
    7
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FiltersConfig {
    /// `owner/name` globs whose pull requests are dropped from aggregations.
    #[serde(default)]
    pub exclude_repos: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// All-default configuration with the cache in `./data`.
    pub fn minimal() -> Self {
        Self {
            github: GithubConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig {
                path: PathBuf::from("./data/pulse.sqlite"),
                max_entry_bytes: None,
            },
            metrics: MetricsConfig::default(),
            filters: FiltersConfig::default(),
            server: ServerConfig::default(),
            scoring: ScoringRules::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !(1..=100).contains(&config.github.per_page) {
        anyhow::bail!("github.per_page must be in [1, 100]");
    }

    if !config.github.api_base.starts_with("http://")
        && !config.github.api_base.starts_with("https://")
    {
        anyhow::bail!(
            "github.api_base must be an http(s) URL, got '{}'",
            config.github.api_base
        );
    }

    let retry = &config.retry;
    if retry.search_base_ms == 0 || retry.enrichment_base_ms == 0 {
        anyhow::bail!("retry base delays must be > 0");
    }
    if retry.search_cap_ms < retry.search_base_ms {
        anyhow::bail!("retry.search_cap_ms must be >= retry.search_base_ms");
    }
    if retry.enrichment_cap_ms < retry.enrichment_base_ms {
        anyhow::bail!("retry.enrichment_cap_ms must be >= retry.enrichment_base_ms");
    }

    if config.metrics.window_days == 0 {
        anyhow::bail!("metrics.window_days must be > 0");
    }

    if config.cache.max_entry_bytes == Some(0) {
        anyhow::bail!("cache.max_entry_bytes must be > 0 when set");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let cfg = parse("[cache]\npath = \"/tmp/pulse.sqlite\"\n").unwrap();
        assert_eq!(cfg.github.per_page, 100);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.metrics.window_days, 7);
        assert_eq!(cfg.scoring, ScoringRules::default());
        assert_eq!(
            cfg.retry.enrichment_policy().base,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_rejects_out_of_range_per_page() {
        let err = parse("[cache]\npath = \"x\"\n[github]\nper_page = 500\n").unwrap_err();
        assert!(err.to_string().contains("per_page"));
    }

    #[test]
    fn test_rejects_cap_below_base() {
        let err = parse("[cache]\npath = \"x\"\n[retry]\nsearch_base_ms = 2000\nsearch_cap_ms = 100\n")
            .unwrap_err();
        assert!(err.to_string().contains("search_cap_ms"));
    }

    #[test]
    fn test_scoring_override() {
        let cfg = parse(
            r#"
[cache]
path = "x"

[scoring]
bot_penalty = -10
keywords = [{ terms = ["hotfix"], delta = 6 }]
"#,
        )
        .unwrap();
        assert_eq!(cfg.scoring.bot_penalty, -10);
        assert_eq!(cfg.scoring.keywords.len(), 1);
        assert_eq!(cfg.scoring.commit_base, 7);
    }
}
