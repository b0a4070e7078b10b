//! Core data models shared by the aggregator, the cache, and the metrics
//! deriver.
//!
//! A [`SearchItem`] is immutable once fetched. Per-PR enrichment data is
//! attached afterwards with [`SearchItem::with_enrichment`], which produces
//! a new value and leaves identity fields untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result count above which the aggregator samples instead of walking
/// every page.
pub const EXHAUSTIVE_THRESHOLD: u64 = 500;

/// An account that authored a pull request or commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub login: String,
    /// Upstream account type (`"User"`, `"Bot"`, `"Organization"`).
    #[serde(default)]
    pub account_type: Option<String>,
}

impl Actor {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            account_type: None,
        }
    }

    pub fn is_bot(&self) -> bool {
        crate::metrics::is_bot(self)
    }
}

/// Line-count and review data fetched per pull request after the search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub requested_reviewers: u32,
    pub milestone: Option<String>,
}

/// One pull request returned by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: u64,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub author: Actor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comments: u32,
    #[serde(default)]
    pub reactions: u32,
    /// Owning repository as `owner/name`.
    pub repository: String,
    #[serde(default)]
    pub draft: bool,
    /// Set when the owning repository is archived or disabled.
    #[serde(default)]
    pub repository_inactive: bool,
    #[serde(default)]
    pub enrichment: Option<Enrichment>,
}

impl SearchItem {
    pub fn with_enrichment(mut self, enrichment: Enrichment) -> Self {
        self.enrichment = Some(enrichment);
        self
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        days_between(self.created_at, now)
    }

    /// Days from creation to merge, when the item carries a merge timestamp.
    pub fn cycle_time_days(&self) -> Option<f64> {
        self.merged_at.map(|m| days_between(self.created_at, m))
    }
}

/// A commit pushed directly to a branch, listed for changelogs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitItem {
    pub sha: String,
    pub message: String,
    pub author: Actor,
    pub committed_at: DateTime<Utc>,
}

/// Why pagination stopped before the planned pages were fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialFailure {
    /// Page number whose fetch failed after retries.
    pub failed_page: u32,
    /// Pages successfully fetched before the failure.
    pub pages_fetched: u32,
    pub reason: String,
}

/// Output of one aggregation cycle over a paginated search query.
///
/// `items.len() == sample_size <= total_count` always holds, and `sampled`
/// is true exactly when the upstream total exceeded
/// [`EXHAUSTIVE_THRESHOLD`]. A failed later page is reported separately in
/// `partial`.
///
/// `total_count` describes the same population as `items`: results from
/// filtered-out repositories are removed from it (estimated from the
/// sample when the fetch was sampled or partial) and counted in
/// `filtered_out`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub items: Vec<SearchItem>,
    pub total_count: u64,
    pub sampled: bool,
    pub sample_size: usize,
    #[serde(default)]
    pub partial: Option<PartialFailure>,
    #[serde(default)]
    pub filtered_out: u64,
    /// Upstream reported that the search timed out before collecting
    /// every match, so counts may be low.
    #[serde(default)]
    pub upstream_incomplete: bool,
}

impl AggregationResult {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            sampled: false,
            sample_size: 0,
            partial: None,
            filtered_out: 0,
            upstream_incomplete: false,
        }
    }

    /// Build a result from fetched items, deriving `sampled` and
    /// `sample_size` so the invariants cannot drift.
    pub fn from_items(items: Vec<SearchItem>, total_count: u64) -> Self {
        let total_count = total_count.max(items.len() as u64);
        Self {
            sample_size: items.len(),
            sampled: total_count > EXHAUSTIVE_THRESHOLD,
            items,
            total_count,
            partial: None,
            filtered_out: 0,
            upstream_incomplete: false,
        }
    }

    pub fn with_partial(mut self, partial: PartialFailure) -> Self {
        self.partial = Some(partial);
        self
    }

    /// Take `dropped` of the `fetched` raw results out of the population.
    ///
    /// Exact when every page was read; otherwise the dropped share of the
    /// sample is projected onto the upstream total. Call after
    /// [`with_partial`](Self::with_partial).
    pub fn excluding_filtered(mut self, fetched: usize, dropped: usize) -> Self {
        if dropped == 0 || fetched == 0 {
            return self;
        }
        let removed = if self.needs_extrapolation() {
            let share = dropped as f64 / fetched as f64;
            (share * self.total_count as f64).round() as u64
        } else {
            dropped as u64
        };
        self.total_count = self
            .total_count
            .saturating_sub(removed)
            .max(self.items.len() as u64);
        self.filtered_out = removed;
        self
    }

    pub fn with_upstream_incomplete(mut self, incomplete: bool) -> Self {
        self.upstream_incomplete = incomplete;
        self
    }

    pub fn is_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// True when population statistics must be extrapolated from the
    /// fetched items rather than counted directly.
    pub fn needs_extrapolation(&self) -> bool {
        self.sampled || self.partial.is_some()
    }
}

pub(crate) fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 86_400_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn item(number: u64) -> SearchItem {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        SearchItem {
            id: number * 10,
            number,
            title: format!("PR {}", number),
            body: None,
            author: Actor::new("octocat"),
            created_at: created,
            updated_at: created,
            merged_at: Some(created + Duration::hours(36)),
            labels: vec![],
            comments: 0,
            reactions: 0,
            repository: "acme/widgets".to_string(),
            draft: false,
            repository_inactive: false,
            enrichment: None,
        }
    }

    #[test]
    fn test_from_items_keeps_invariants() {
        let result = AggregationResult::from_items(vec![item(1), item(2)], 1);
        assert_eq!(result.sample_size, 2);
        assert_eq!(result.total_count, 2);
        assert!(!result.sampled);

        let big = AggregationResult::from_items(vec![item(1)], 501);
        assert!(big.sampled);
        assert!(big.needs_extrapolation());
    }

    #[test]
    fn test_partial_is_distinct_from_sampled() {
        let result = AggregationResult::from_items(vec![item(1)], 120).with_partial(
            PartialFailure {
                failed_page: 2,
                pages_fetched: 1,
                reason: "upstream error".to_string(),
            },
        );
        assert!(!result.sampled);
        assert!(result.is_partial());
        assert!(result.needs_extrapolation());
    }

    #[test]
    fn test_filtered_results_leave_the_population() {
        let exhaustive = AggregationResult::from_items(vec![item(1), item(2)], 4)
            .excluding_filtered(4, 2);
        assert_eq!(exhaustive.total_count, 2);
        assert_eq!(exhaustive.filtered_out, 2);
        assert!(!exhaustive.sampled);

        // 100 of 500 sampled results dropped: a fifth of 3400.
        let items: Vec<SearchItem> = (1..=400).map(item).collect();
        let sampled = AggregationResult::from_items(items, 3400).excluding_filtered(500, 100);
        assert_eq!(sampled.total_count, 2720);
        assert_eq!(sampled.filtered_out, 680);
        assert!(sampled.sampled);

        let untouched = AggregationResult::from_items(vec![item(1)], 1).excluding_filtered(1, 0);
        assert_eq!(untouched.total_count, 1);
        assert_eq!(untouched.filtered_out, 0);
    }

    #[test]
    fn test_enrichment_preserves_identity() {
        let original = item(7);
        let enriched = original.clone().with_enrichment(Enrichment {
            additions: 10,
            deletions: 2,
            ..Default::default()
        });
        assert_eq!(enriched.id, original.id);
        assert_eq!(enriched.number, original.number);
        assert_eq!(enriched.enrichment.as_ref().unwrap().additions, 10);
    }

    #[test]
    fn test_cycle_time() {
        let it = item(1);
        assert!((it.cycle_time_days().unwrap() - 1.5).abs() < 1e-9);
    }
}
