//! Mock GitHub REST API for integration tests.
//!
//! Serves `/search/issues`, pull details, commits, and org membership on
//! `127.0.0.1:0`. Behavior is keyed off the search qualifiers:
//!
//! | Qualifier | Behavior |
//! |-----------|----------|
//! | `org:acme`, `repo:acme/widgets` | 3 open PRs (2, 4, 9 days old); 2 merged PRs, one by a bot |
//! | `org:big` | 3400 results, 100 per page |
//! | `org:flaky` | one 502, then no results |
//! | `org:ratelimited` | 403 with exhausted rate-limit headers |
//! | `author:revoked` | 401 |

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use pr_pulse::config::Config;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockState {
    /// `"<q> page=<n>"` for every search request, in arrival order.
    pub searches: Mutex<Vec<String>>,
    /// Every request path, in arrival order.
    pub paths: Mutex<Vec<String>>,
    /// `Authorization` header of every request.
    pub auth_headers: Mutex<Vec<Option<String>>>,
    flaky_failures: AtomicU32,
}

impl MockState {
    pub fn request_count(&self) -> usize {
        self.paths.lock().unwrap().len()
    }

    pub fn pages_for(&self, qualifier: &str) -> Vec<u32> {
        self.searches
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.contains(qualifier))
            .filter_map(|s| s.rsplit("page=").next()?.parse().ok())
            .collect()
    }

    fn record(&self, path: &str, headers: &HeaderMap) {
        self.paths.lock().unwrap().push(path.to_string());
        self.auth_headers.lock().unwrap().push(
            headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
    }
}

pub struct MockGithub {
    pub base_url: String,
    pub state: Arc<MockState>,
}

pub async fn start_mock() -> MockGithub {
    let state = Arc::new(MockState::default());
    state.flaky_failures.store(1, Ordering::SeqCst);

    let app = Router::new()
        .route("/search/issues", get(search))
        .route("/repos/{owner}/{repo}/pulls/{number}", get(pull))
        .route("/repos/{owner}/{repo}/commits", get(commits))
        .route("/users/{user}/orgs", get(orgs))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    MockGithub {
        base_url: format!("http://{}", addr),
        state,
    }
}

/// Config pointed at the mock with millisecond retry delays.
pub fn test_config(base_url: &str, cache_path: &FsPath) -> Config {
    let mut cfg = Config::minimal();
    cfg.github.api_base = base_url.to_string();
    cfg.cache.path = cache_path.to_path_buf();
    cfg.retry.max_attempts = 2;
    cfg.retry.search_base_ms = 1;
    cfg.retry.search_cap_ms = 4;
    cfg.retry.enrichment_base_ms = 1;
    cfg.retry.enrichment_cap_ms = 4;
    cfg
}

/// The same settings as TOML, for running the binary.
pub fn test_config_toml(base_url: &str, cache_path: &FsPath) -> String {
    format!(
        r#"[github]
api_base = "{}"
token_env = "PULSE_TEST_TOKEN"

[retry]
max_attempts = 2
search_base_ms = 1
search_cap_ms = 4
enrichment_base_ms = 1
enrichment_cap_ms = 4

[cache]
path = "{}"
"#,
        base_url,
        cache_path.display()
    )
}

fn issue(number: u64, login: &str, kind: &str, title: &str, age_days: i64, merged_days_ago: Option<i64>) -> Value {
    let now = Utc::now();
    let created = now - Duration::days(age_days);
    let merged = merged_days_ago.map(|d| (now - Duration::days(d)).to_rfc3339());
    json!({
        "id": 1000 + number,
        "number": number,
        "title": title,
        "body": null,
        "user": { "login": login, "type": kind },
        "created_at": created.to_rfc3339(),
        "updated_at": created.to_rfc3339(),
        "pull_request": { "merged_at": merged },
        "labels": [],
        "comments": 1,
        "reactions": { "total_count": 0 },
        "repository_url": "https://api.github.com/repos/acme/widgets",
        "draft": false
    })
}

async fn search(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.record("/search/issues", &headers);
    let q = params.get("q").cloned().unwrap_or_default();
    let page: u64 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: u64 = params
        .get("per_page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(30);
    state
        .searches
        .lock()
        .unwrap()
        .push(format!("{} page={}", q, page));

    if q.contains("org:ratelimited") {
        let reset = (Utc::now() + Duration::seconds(120)).timestamp();
        return (
            StatusCode::FORBIDDEN,
            [
                ("x-ratelimit-remaining", "0".to_string()),
                ("x-ratelimit-reset", reset.to_string()),
            ],
            Json(json!({ "message": "API rate limit exceeded" })),
        )
            .into_response();
    }

    if q.contains("author:revoked") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Bad credentials" })),
        )
            .into_response();
    }

    if q.contains("org:flaky") && state.flaky_failures.load(Ordering::SeqCst) > 0 {
        state.flaky_failures.fetch_sub(1, Ordering::SeqCst);
        return (StatusCode::BAD_GATEWAY, "upstream hiccup").into_response();
    }

    let (total, items): (u64, Vec<Value>) = if q.contains("org:big") {
        let start = (page - 1) * per_page;
        let items = (start..start + per_page)
            .map(|n| issue(n + 1, "octocat", "User", "Bulk change", 3, None))
            .collect();
        (3400, items)
    } else if q.contains("org:acme") || q.contains("repo:acme/widgets") || q.contains("author:octocat") {
        if q.contains("is:open") {
            let items = vec![
                issue(1, "octocat", "User", "Add caching", 2, None),
                issue(2, "hubot", "User", "Fix typo", 4, None),
                issue(3, "octocat", "User", "Refactor parser", 9, None),
            ];
            (3, items)
        } else {
            let items = vec![
                issue(10, "octocat", "User", "feat: add export", 3, Some(1)),
                issue(11, "renovate[bot]", "Bot", "chore(deps): bump serde", 2, Some(1)),
            ];
            (2, items)
        }
    } else {
        (0, Vec::new())
    };

    Json(json!({
        "total_count": total,
        "incomplete_results": false,
        "items": items,
    }))
    .into_response()
}

async fn pull(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((owner, repo, number)): Path<(String, String, u64)>,
) -> Response {
    state.record(&format!("/repos/{}/{}/pulls/{}", owner, repo, number), &headers);
    if repo == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({ "message": "Not Found" }))).into_response();
    }
    Json(json!({
        "number": number,
        "additions": 120,
        "deletions": 30,
        "changed_files": 4,
        "requested_reviewers": [{ "login": "a" }, { "login": "b" }, { "login": "c" }],
        "milestone": { "title": "v1.0" }
    }))
    .into_response()
}

async fn commits(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path((owner, repo)): Path<(String, String)>,
) -> Response {
    state.record(&format!("/repos/{}/{}/commits", owner, repo), &headers);
    let date = (Utc::now() - Duration::days(1)).to_rfc3339();
    Json(json!([
        {
            "sha": "a1b2c3d4e5",
            "commit": { "message": "feat: add export (#10)", "author": { "name": "Octo", "date": date } },
            "author": { "login": "octocat", "type": "User" }
        },
        {
            "sha": "c3d4e5f6a7",
            "commit": { "message": "security: rotate signing key", "author": { "name": "Octo", "date": date } },
            "author": { "login": "octocat", "type": "User" }
        }
    ]))
    .into_response()
}

async fn orgs(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(user): Path<String>,
) -> Response {
    state.record(&format!("/users/{}/orgs", user), &headers);
    Json(json!([{ "login": "acme" }, { "login": "octo-org" }])).into_response()
}
