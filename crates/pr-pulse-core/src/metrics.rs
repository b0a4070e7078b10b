//! Derived pull request metrics.
//!
//! [`derive_metrics`] turns an open-PR aggregation and a merged-in-window
//! aggregation into a read-only [`MetricsSnapshot`]. Counts are exact when
//! the aggregation walked every page and extrapolated proportionally when it
//! was sampled or cut short:
//!
//! ```text
//! stale_count = round(stale_in_sample / sample_size * total_count)
//! ```
//!
//! Averages are only ever taken over items actually fetched.
//!
//! # Health grading
//!
//! | merged / stale | Grade |
//! |----------------|-------|
//! | stale = 0, merged > 0 | Excellent (ratio "infinite") |
//! | stale = 0, merged = 0 | no grade (ratio "undefined") |
//! | < 1 | Critical |
//! | 1 – 2 | Needs attention |
//! | 2 – 3 | Fair |
//! | 3 – 4 | Healthy |
//! | ≥ 4 | Excellent |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{days_between, Actor, AggregationResult};

/// Merged-to-stale ratio with explicit boundary cases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HealthRatio {
    Finite(f64),
    /// Nothing stale but something merged.
    Infinite,
    /// Nothing stale and nothing merged.
    Undefined,
}

impl HealthRatio {
    pub fn compute(merged_in_window: u64, stale_count: u64) -> Self {
        match (stale_count, merged_in_window) {
            (0, 0) => HealthRatio::Undefined,
            (0, _) => HealthRatio::Infinite,
            (stale, merged) => HealthRatio::Finite(merged as f64 / stale as f64),
        }
    }

    pub fn grade(&self) -> Option<HealthGrade> {
        match *self {
            HealthRatio::Undefined => None,
            HealthRatio::Infinite => Some(HealthGrade::Excellent),
            HealthRatio::Finite(r) if r < 1.0 => Some(HealthGrade::Critical),
            HealthRatio::Finite(r) if r < 2.0 => Some(HealthGrade::NeedsAttention),
            HealthRatio::Finite(r) if r < 3.0 => Some(HealthGrade::Fair),
            HealthRatio::Finite(r) if r < 4.0 => Some(HealthGrade::Healthy),
            HealthRatio::Finite(_) => Some(HealthGrade::Excellent),
        }
    }
}

impl fmt::Display for HealthRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthRatio::Finite(r) => write!(f, "{:.1}", r),
            HealthRatio::Infinite => write!(f, "∞"),
            HealthRatio::Undefined => write!(f, "no data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthGrade {
    Critical,
    NeedsAttention,
    Fair,
    Healthy,
    Excellent,
}

impl HealthGrade {
    pub fn label(&self) -> &'static str {
        match self {
            HealthGrade::Critical => "Critical",
            HealthGrade::NeedsAttention => "Needs attention",
            HealthGrade::Fair => "Fair",
            HealthGrade::Healthy => "Healthy",
            HealthGrade::Excellent => "Excellent",
        }
    }
}

/// Aggregate PR health for one scope and window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub open_count: u64,
    pub stale_count: u64,
    /// True when `stale_count` was extrapolated from a sample.
    pub stale_extrapolated: bool,
    pub merged_in_window: u64,
    pub average_open_age_days: Option<f64>,
    pub average_cycle_time_days: Option<f64>,
    pub health_ratio: HealthRatio,
    pub grade: Option<HealthGrade>,
    pub window_start: DateTime<Utc>,
    pub computed_at: DateTime<Utc>,
}

/// Start of a trailing window of `days` days ending at `now`.
pub fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

pub fn derive_metrics(
    open: &AggregationResult,
    merged: &AggregationResult,
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> MetricsSnapshot {
    let stale_in_sample = open
        .items
        .iter()
        .filter(|item| item.updated_at < window_start)
        .count() as u64;
    let stale_count = population_count(open, stale_in_sample);

    let merged_in_sample = merged
        .items
        .iter()
        .filter(|item| item.merged_at.is_some_and(|m| m >= window_start))
        .count() as u64;
    let merged_in_window = population_count(merged, merged_in_sample);

    let age_denominator = (open.sample_size as u64).min(open.total_count);
    let average_open_age_days = if age_denominator == 0 {
        None
    } else {
        let total_age: f64 = open.items.iter().map(|item| item.age_days(now)).sum();
        Some(total_age / age_denominator as f64)
    };

    let cycle_times: Vec<f64> = merged
        .items
        .iter()
        .filter_map(|item| item.cycle_time_days())
        .collect();
    let average_cycle_time_days = if cycle_times.is_empty() {
        None
    } else {
        Some(cycle_times.iter().sum::<f64>() / cycle_times.len() as f64)
    };

    let health_ratio = HealthRatio::compute(merged_in_window, stale_count);

    MetricsSnapshot {
        open_count: open.total_count,
        stale_count,
        stale_extrapolated: open.needs_extrapolation(),
        merged_in_window,
        average_open_age_days,
        average_cycle_time_days,
        grade: health_ratio.grade(),
        health_ratio,
        window_start,
        computed_at: now,
    }
}

/// Exact count for exhaustive aggregations; proportional extrapolation for
/// sampled or partial ones.
fn population_count(result: &AggregationResult, matching_in_sample: u64) -> u64 {
    if !result.needs_extrapolation() {
        return matching_in_sample;
    }
    if result.sample_size == 0 {
        return 0;
    }
    let proportion = matching_in_sample as f64 / result.sample_size as f64;
    (proportion * result.total_count as f64).round() as u64
}

/// Whether an account is automation rather than a person.
pub fn is_bot(actor: &Actor) -> bool {
    if actor
        .account_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("bot"))
    {
        return true;
    }
    let login = actor.login.to_lowercase();
    login.ends_with("[bot]")
        || login.ends_with("-bot")
        || login.ends_with("-robot")
        || login.contains("dependabot")
}

/// Age in whole days, for display.
pub fn age_in_days(from: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    days_between(from, now).floor() as i64
}
