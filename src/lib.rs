//! # pr-pulse
//!
//! Pull request activity metrics on top of a rate-limited, paginated,
//! result-capped search API.
//!
//! pr-pulse turns GitHub's issue search into trustworthy counts, ages, and
//! ratios: it walks small result sets exhaustively, samples large ones,
//! retries transient failures with capped exponential backoff, and caches
//! every view with a per-feature TTL so repeated visits cost no requests.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │ CLI/HTTP │──▶│ Dashboard  │──▶│ Aggregator │──▶│ GithubClient │
//! └──────────┘   └─────┬──────┘   └─────┬──────┘   └──────────────┘
//!                      │                │ BackoffExecutor
//!                      ▼                ▼
//!                ┌───────────┐   ┌──────────────┐
//!                │ TtlCache  │   │ Metrics /    │
//!                │ (SQLite)  │   │ Scoring      │
//!                └───────────┘   └──────────────┘
//! ```
//!
//! Network-free logic (models, sampling plan, metrics, scoring, cache
//! semantics) lives in the `pr-pulse-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`auth`] | Access-token accessor |
//! | [`github`] | Search client trait and REST implementation |
//! | [`executor`] | Retry with capped exponential backoff |
//! | [`aggregate`] | Exhaustive or sampled pagination |
//! | [`dashboard`] | Cache → fetch → derive pipeline per feature |
//! | [`view`] | View relevance tickets |
//! | [`cache_store`] | SQLite cache storage |
//! | [`progress`] | Retry progress reporting |
//! | [`report`] | CLI text rendering |
//! | [`server`] | JSON HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod aggregate;
pub mod auth;
pub mod cache_store;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod executor;
pub mod github;
pub mod migrate;
pub mod progress;
pub mod report;
pub mod server;
pub mod view;
