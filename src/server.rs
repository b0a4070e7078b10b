//! JSON HTTP API.
//!
//! Serves the dashboard operations to browser front ends. Every request
//! runs against the shared [`Dashboard`] (and therefore the shared cache)
//! with a detached view ticket, so concurrent clients never supersede each
//! other.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Status, version, and whether a token is loaded |
//! | `GET` | `/orgs/{org}/stats` | Metrics snapshot for an organization |
//! | `GET` | `/orgs/{org}/leaderboard?since=&include_bots=` | Contributor leaderboard |
//! | `GET` | `/users/{user}/prs` | A user's open pull requests |
//! | `GET` | `/users/{user}/orgs` | A user's organizations |
//! | `GET` | `/repos/{owner}/{repo}/pulls/{number}/turn` | Pull request details |
//! | `GET` | `/repos/{owner}/{repo}/changelog?since=&include_bots=` | Ranked changelog |
//! | `DELETE` | `/cache?prefix=` | Drop cache entries |
//!
//! `since` is an ISO date and defaults to the start of the metrics window.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "rate_limited", "message": "GitHub rate limit reached. Try again in 3 minutes." } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `rate_limited` (429), `upstream_error` (502),
//! `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use pr_pulse_core::error::FetchError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::dashboard::{
    Changelog, Dashboard, DashboardError, Leaderboard, OrgStats, PrTurn, UserPrs,
};
use crate::progress::RetryReporter;
use crate::view::{Delivery, ViewTicket};

#[derive(Clone)]
struct AppState {
    dashboard: Arc<Dashboard>,
}

/// Open the dashboard from `config` and serve until the process exits.
pub async fn run_server(config: &Config, reporter: Arc<dyn RetryReporter>) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let dashboard = Arc::new(Dashboard::open(config.clone(), reporter).await?);
    let app = build_router(dashboard);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "server listening");
    println!("pr-pulse API listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(dashboard: Arc<Dashboard>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/orgs/{org}/stats", get(handle_org_stats))
        .route("/orgs/{org}/leaderboard", get(handle_leaderboard))
        .route("/users/{user}/prs", get(handle_user_prs))
        .route("/users/{user}/orgs", get(handle_user_orgs))
        .route(
            "/repos/{owner}/{repo}/pulls/{number}/turn",
            get(handle_pr_turn),
        )
        .route("/repos/{owner}/{repo}/changelog", get(handle_changelog))
        .route("/cache", axum::routing::delete(handle_clear_cache))
        .layer(cors)
        .with_state(AppState { dashboard })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<DashboardError> for AppError {
    fn from(err: DashboardError) -> Self {
        match err {
            DashboardError::InvalidInput(msg) => {
                AppError::new(StatusCode::BAD_REQUEST, "bad_request", msg)
            }
            DashboardError::Fetch(err) => from_fetch(&err),
        }
    }
}

fn from_fetch(err: &FetchError) -> AppError {
    let message = err.user_message(Utc::now());
    let (status, code) = match err.root() {
        FetchError::AuthFailure(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
        FetchError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
        FetchError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        FetchError::Malformed(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        FetchError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
        FetchError::Transient { .. } | FetchError::Exhausted { .. } => {
            (StatusCode::BAD_GATEWAY, "upstream_error")
        }
    };
    warn!(code, "request failed: {}", err);
    AppError::new(status, code, message)
}

fn internal(message: impl Into<String>) -> AppError {
    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

fn fresh<T>(delivery: Delivery<T>) -> Result<Json<T>, AppError> {
    delivery
        .into_fresh()
        .map(Json)
        .ok_or_else(|| internal("request was superseded"))
}

#[derive(Deserialize)]
struct WindowParams {
    since: Option<String>,
    include_bots: Option<bool>,
}

impl WindowParams {
    fn since(&self, dashboard: &Dashboard) -> Result<NaiveDate, AppError> {
        match &self.since {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                AppError::new(
                    StatusCode::BAD_REQUEST,
                    "bad_request",
                    format!("since must be YYYY-MM-DD, got '{}'", raw),
                )
            }),
            None => Ok(dashboard.default_since()),
        }
    }

    fn include_bots(&self, dashboard: &Dashboard) -> bool {
        self.include_bots
            .unwrap_or(dashboard.config().metrics.include_bots)
    }
}

// ============ Handlers ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    authenticated: bool,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        authenticated: state.dashboard.token().token().is_some(),
    })
}

async fn handle_org_stats(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> Result<Json<OrgStats>, AppError> {
    let ticket = ViewTicket::detached();
    fresh(state.dashboard.org_stats(&org, &ticket).await?)
}

async fn handle_leaderboard(
    State(state): State<AppState>,
    Path(org): Path<String>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Leaderboard>, AppError> {
    let dashboard = &state.dashboard;
    let since = params.since(dashboard)?;
    let ticket = ViewTicket::detached();
    fresh(
        dashboard
            .leaderboard(&org, since, params.include_bots(dashboard), &ticket)
            .await?,
    )
}

async fn handle_user_prs(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<UserPrs>, AppError> {
    let ticket = ViewTicket::detached();
    fresh(state.dashboard.user_prs(&user, &ticket).await?)
}

async fn handle_user_orgs(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<String>>, AppError> {
    let ticket = ViewTicket::detached();
    fresh(state.dashboard.user_orgs(&user, &ticket).await?)
}

async fn handle_pr_turn(
    State(state): State<AppState>,
    Path((owner, repo, number)): Path<(String, String, u64)>,
) -> Result<Json<PrTurn>, AppError> {
    let ticket = ViewTicket::detached();
    let repo = format!("{}/{}", owner, repo);
    fresh(state.dashboard.pr_turn(&repo, number, &ticket).await?)
}

async fn handle_changelog(
    State(state): State<AppState>,
    Path((owner, repo)): Path<(String, String)>,
    Query(params): Query<WindowParams>,
) -> Result<Json<Changelog>, AppError> {
    let dashboard = &state.dashboard;
    let since = params.since(dashboard)?;
    let ticket = ViewTicket::detached();
    let repo = format!("{}/{}", owner, repo);
    fresh(
        dashboard
            .changelog(&repo, since, params.include_bots(dashboard), &ticket)
            .await?,
    )
}

#[derive(Deserialize)]
struct ClearParams {
    prefix: Option<String>,
}

#[derive(Serialize)]
struct ClearResponse {
    removed: u64,
}

async fn handle_clear_cache(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Result<Json<ClearResponse>, AppError> {
    let removed = state
        .dashboard
        .clear_cache(params.prefix.as_deref())
        .await
        .map_err(|e| internal(format!("{:#}", e)))?;
    Ok(Json(ClearResponse { removed }))
}
