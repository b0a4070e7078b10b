//! # pr-pulse core
//!
//! Network-free logic for pr-pulse: search result models, the search query
//! grammar, the page sampling plan, backoff policy, the fetch error
//! taxonomy, the TTL cache, the metrics deriver, and the importance scorer.
//!
//! This crate contains no tokio, reqwest, sqlx, or other runtime-bound
//! dependencies. Everything that talks to the network or disk lives in the
//! `pr-pulse` crate and plugs into the traits defined here.

pub mod backoff;
pub mod cache;
pub mod error;
pub mod leaderboard;
pub mod metrics;
pub mod models;
pub mod query;
pub mod sampling;
pub mod scoring;
