//! GitHub REST client.
//!
//! Implements [`SearchClient`] over the public REST API with `reqwest`.
//! Every method performs exactly one HTTP request and classifies failures
//! into the [`FetchError`] taxonomy; retrying is the
//! [`BackoffExecutor`](crate::executor::BackoffExecutor)'s job.
//!
//! # Endpoints
//!
//! | Method | Request |
//! |--------|---------|
//! | [`search_page`](SearchClient::search_page) | `GET /search/issues?q=..&per_page=..&page=..&sort=updated&order=desc` |
//! | [`pull_details`](SearchClient::pull_details) | `GET /repos/{repo}/pulls/{number}` |
//! | [`list_commits`](SearchClient::list_commits) | `GET /repos/{repo}/commits?since=..` |
//! | [`user_orgs`](SearchClient::user_orgs) | `GET /users/{user}/orgs` |
//!
//! # Status classification
//!
//! | Status | Error |
//! |--------|-------|
//! | 401 | `AuthFailure` |
//! | 403 / 429 with rate-limit headers | `RateLimited` (reset hint from `retry-after` or `x-ratelimit-reset`) |
//! | other 403 | `Forbidden` |
//! | 404 | `NotFound` |
//! | 400, 422, other 4xx | `Malformed` |
//! | 5xx, transport errors | `Transient` |

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use pr_pulse_core::error::FetchError;
use pr_pulse_core::models::{Actor, CommitItem, Enrichment, SearchItem};
use pr_pulse_core::query::SearchQuery;
use reqwest::header::{HeaderMap, ACCEPT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenProvider;
use crate::config::GithubConfig;

/// One page of search results with the envelope's total.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub total_count: u64,
    pub incomplete_results: bool,
    pub items: Vec<SearchItem>,
}

/// Remote operations the aggregator and dashboard depend on.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search_page(
        &self,
        query: &SearchQuery,
        page: u32,
        per_page: u32,
    ) -> Result<SearchPage, FetchError>;

    async fn pull_details(&self, repo: &str, number: u64) -> Result<Enrichment, FetchError>;

    async fn list_commits(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, FetchError>;

    async fn user_orgs(&self, user: &str) -> Result<Vec<String>, FetchError>;
}

pub struct GithubClient {
    client: reqwest::Client,
    api_base: String,
    token: Arc<dyn TokenProvider>,
}

impl GithubClient {
    pub fn new(config: &GithubConfig, token: Arc<dyn TokenProvider>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self
            .client
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = self.token.token() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("GET {} failed: {}", path, e)))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| FetchError::transient(format!("GET {} body: {}", path, e)))?;
            return serde_json::from_str(&body)
                .map_err(|e| FetchError::Malformed(format!("GET {} response: {}", path, e)));
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify_response(
            status.as_u16(),
            &headers,
            &body,
            Utc::now(),
        ))
    }
}

#[async_trait]
impl SearchClient for GithubClient {
    async fn search_page(
        &self,
        query: &SearchQuery,
        page: u32,
        per_page: u32,
    ) -> Result<SearchPage, FetchError> {
        let params = query.page_params(page, per_page);
        let wire: WireSearchResponse = self.get_json("/search/issues", &params).await?;
        Ok(SearchPage {
            total_count: wire.total_count,
            incomplete_results: wire.incomplete_results,
            items: wire.items.into_iter().map(WireIssue::into_item).collect(),
        })
    }

    async fn pull_details(&self, repo: &str, number: u64) -> Result<Enrichment, FetchError> {
        let wire: WirePull = self
            .get_json(&format!("/repos/{}/pulls/{}", repo, number), &[])
            .await?;
        Ok(Enrichment {
            additions: wire.additions,
            deletions: wire.deletions,
            changed_files: wire.changed_files,
            requested_reviewers: wire.requested_reviewers.len() as u32,
            milestone: wire.milestone.map(|m| m.title),
        })
    }

    async fn list_commits(
        &self,
        repo: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommitItem>, FetchError> {
        let params = [
            ("since", since.to_rfc3339()),
            ("per_page", "100".to_string()),
        ];
        let wire: Vec<WireCommit> = self
            .get_json(&format!("/repos/{}/commits", repo), &params)
            .await?;
        Ok(wire.into_iter().map(WireCommit::into_item).collect())
    }

    async fn user_orgs(&self, user: &str) -> Result<Vec<String>, FetchError> {
        let wire: Vec<WireOrg> = self
            .get_json(&format!("/users/{}/orgs", user), &[])
            .await?;
        Ok(wire.into_iter().map(|o| o.login).collect())
    }
}

/// Map a non-success response onto the failure taxonomy.
pub fn classify_response(
    status: u16,
    headers: &HeaderMap,
    body: &str,
    now: DateTime<Utc>,
) -> FetchError {
    let message = error_message(status, body);
    match status {
        401 => FetchError::AuthFailure(message),
        403 | 429 => {
            let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
            let exhausted = header("x-ratelimit-remaining") == Some("0");
            let retry_after = header("retry-after").and_then(|v| v.trim().parse::<i64>().ok());
            let mentions_limit = body.to_lowercase().contains("rate limit");

            if status == 429 || exhausted || retry_after.is_some() || mentions_limit {
                let reset_at = retry_after
                    .map(|secs| now + ChronoDuration::seconds(secs))
                    .or_else(|| {
                        header("x-ratelimit-reset")
                            .and_then(|v| v.trim().parse::<i64>().ok())
                            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
                    });
                FetchError::RateLimited { reset_at, message }
            } else {
                FetchError::Forbidden(message)
            }
        }
        404 => FetchError::NotFound(message),
        500..=599 => FetchError::Transient {
            status: Some(status),
            message,
        },
        _ => FetchError::Malformed(message),
    }
}

fn error_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());
    if detail.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, detail)
    }
}

// ============ Wire formats ============

#[derive(Deserialize)]
struct WireSearchResponse {
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default)]
    items: Vec<WireIssue>,
}

#[derive(Deserialize)]
struct WireUser {
    login: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl WireUser {
    fn into_actor(self) -> Actor {
        Actor {
            login: self.login,
            account_type: self.kind,
        }
    }
}

#[derive(Deserialize)]
struct WireIssue {
    id: u64,
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<WireUser>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    pull_request: Option<WirePullRef>,
    #[serde(default)]
    labels: Vec<WireLabel>,
    #[serde(default)]
    comments: u32,
    #[serde(default)]
    reactions: Option<WireReactions>,
    #[serde(default)]
    repository_url: String,
    #[serde(default)]
    draft: Option<bool>,
    /// Present on enriched search payloads only.
    #[serde(default)]
    repository: Option<WireRepoFlags>,
}

#[derive(Deserialize)]
struct WirePullRef {
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct WireLabel {
    name: String,
}

#[derive(Deserialize)]
struct WireReactions {
    #[serde(default)]
    total_count: u32,
}

#[derive(Deserialize)]
struct WireRepoFlags {
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    disabled: bool,
}

impl WireIssue {
    fn into_item(self) -> SearchItem {
        let repository = repo_from_url(&self.repository_url);
        SearchItem {
            id: self.id,
            number: self.number,
            title: self.title,
            body: self.body,
            author: self
                .user
                .map(WireUser::into_actor)
                .unwrap_or_else(|| Actor::new("ghost")),
            created_at: self.created_at,
            updated_at: self.updated_at,
            merged_at: self.pull_request.and_then(|p| p.merged_at),
            labels: self.labels.into_iter().map(|l| l.name).collect(),
            comments: self.comments,
            reactions: self.reactions.map(|r| r.total_count).unwrap_or(0),
            repository,
            draft: self.draft.unwrap_or(false),
            repository_inactive: self
                .repository
                .map(|r| r.archived || r.disabled)
                .unwrap_or(false),
            enrichment: None,
        }
    }
}

/// `https://api.github.com/repos/acme/widgets` → `acme/widgets`.
fn repo_from_url(url: &str) -> String {
    match url.find("/repos/") {
        Some(idx) => url[idx + "/repos/".len()..].trim_end_matches('/').to_string(),
        None => url.to_string(),
    }
}

#[derive(Deserialize)]
struct WirePull {
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changed_files: u64,
    #[serde(default)]
    requested_reviewers: Vec<WireUser>,
    #[serde(default)]
    milestone: Option<WireMilestone>,
}

#[derive(Deserialize)]
struct WireMilestone {
    title: String,
}

#[derive(Deserialize)]
struct WireCommit {
    sha: String,
    commit: WireCommitDetail,
    #[serde(default)]
    author: Option<WireUser>,
}

#[derive(Deserialize)]
struct WireCommitDetail {
    message: String,
    author: WireSignature,
}

#[derive(Deserialize)]
struct WireSignature {
    #[serde(default)]
    name: String,
    date: DateTime<Utc>,
}

impl WireCommit {
    fn into_item(self) -> CommitItem {
        let author = match self.author {
            Some(user) => user.into_actor(),
            None => Actor::new(self.commit.author.name.clone()),
        };
        CommitItem {
            sha: self.sha,
            message: self.commit.message,
            author,
            committed_at: self.commit.author.date,
        }
    }
}

#[derive(Deserialize)]
struct WireOrg {
    login: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_classify_statuses() {
        let now = Utc::now();
        let none = HeaderMap::new();
        assert!(matches!(
            classify_response(401, &none, r#"{"message":"Bad credentials"}"#, now),
            FetchError::AuthFailure(m) if m == "HTTP 401: Bad credentials"
        ));
        assert!(matches!(
            classify_response(403, &none, "{}", now),
            FetchError::Forbidden(_)
        ));
        assert!(matches!(
            classify_response(404, &none, "", now),
            FetchError::NotFound(m) if m == "HTTP 404"
        ));
        assert!(matches!(
            classify_response(422, &none, "", now),
            FetchError::Malformed(_)
        ));
        assert!(matches!(
            classify_response(503, &none, "", now),
            FetchError::Transient { status: Some(503), .. }
        ));
    }

    #[test]
    fn test_rate_limit_reset_hints() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000300"));
        let err = classify_response(403, &headers, "", now);
        assert_eq!(err.reset_at(), Some(now + ChronoDuration::seconds(300)));
        assert!(err.is_retryable());

        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("30"));
        let err = classify_response(403, &headers, "", now);
        assert_eq!(err.reset_at(), Some(now + ChronoDuration::seconds(30)));

        let err = classify_response(
            403,
            &HeaderMap::new(),
            r#"{"message":"API rate limit exceeded for user"}"#,
            now,
        );
        assert!(matches!(err, FetchError::RateLimited { reset_at: None, .. }));
    }

    #[test]
    fn test_issue_wire_mapping() {
        let json = r#"{
            "total_count": 1,
            "incomplete_results": false,
            "items": [{
                "id": 99,
                "number": 7,
                "title": "Add caching",
                "body": null,
                "user": {"login": "renovate[bot]", "type": "Bot"},
                "created_at": "2024-03-01T00:00:00Z",
                "updated_at": "2024-03-02T00:00:00Z",
                "pull_request": {"merged_at": "2024-03-03T00:00:00Z"},
                "labels": [{"name": "enhancement"}],
                "comments": 4,
                "reactions": {"total_count": 2},
                "repository_url": "https://api.github.com/repos/acme/widgets",
                "draft": false,
                "repository": {"archived": true}
            }]
        }"#;
        let wire: WireSearchResponse = serde_json::from_str(json).unwrap();
        let item = wire.items.into_iter().next().unwrap().into_item();
        assert_eq!(item.repository, "acme/widgets");
        assert_eq!(item.author.account_type.as_deref(), Some("Bot"));
        assert!(item.author.is_bot());
        assert_eq!(item.labels, vec!["enhancement"]);
        assert_eq!(item.reactions, 2);
        assert!(item.merged_at.is_some());
        assert!(item.repository_inactive);
    }

    #[test]
    fn test_commit_without_linked_account() {
        let json = r#"[{
            "sha": "abc",
            "commit": {"message": "fix typo", "author": {"name": "Jo", "date": "2024-03-01T00:00:00Z"}},
            "author": null
        }]"#;
        let wire: Vec<WireCommit> = serde_json::from_str(json).unwrap();
        let commit = wire.into_iter().next().unwrap().into_item();
        assert_eq!(commit.author.login, "Jo");
        assert_eq!(commit.message, "fix typo");
    }
}
