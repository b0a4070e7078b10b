//! Paginated search aggregation.
//!
//! Turns a capped, paginated search endpoint into an [`AggregationResult`]:
//!
//! 1. Page 1 is fetched through the [`BackoffExecutor`]; its envelope
//!    carries the upstream total.
//! 2. `total <= 500`: remaining pages are fetched in order, stopping early
//!    when a page comes back short (the upstream total can be stale).
//! 3. `total > 500`: only the pages chosen by
//!    [`plan_pages`](pr_pulse_core::sampling::plan_pages) are fetched.
//!
//! Pages are fetched sequentially and every page gets its own retry
//! budget. A later page that still fails after retries ends pagination;
//! what was gathered so far is returned with a [`PartialFailure`] attached.
//! A failed first page is an error, and so is any later failure that
//! retrying could not fix (rejected credentials, missing resource,
//! malformed response).
//!
//! Results from archived/disabled or excluded repositories are dropped and
//! taken out of `total_count`, so counts and sample proportions describe
//! the same population.

use globset::{Glob, GlobSet, GlobSetBuilder};
use pr_pulse_core::error::FetchError;
use pr_pulse_core::models::{AggregationResult, PartialFailure, SearchItem};
use pr_pulse_core::query::SearchQuery;
use pr_pulse_core::sampling::plan_pages;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::executor::BackoffExecutor;
use crate::github::{SearchClient, SearchPage};

pub struct Aggregator {
    client: Arc<dyn SearchClient>,
    executor: BackoffExecutor,
    per_page: u32,
    exclude: Option<GlobSet>,
}

impl Aggregator {
    pub fn new(client: Arc<dyn SearchClient>, executor: BackoffExecutor, per_page: u32) -> Self {
        Self {
            client,
            executor,
            per_page: per_page.max(1),
            exclude: None,
        }
    }

    /// Drop items from repositories matching any of the `owner/name` globs.
    pub fn with_exclusions(mut self, patterns: &[String]) -> anyhow::Result<Self> {
        if patterns.is_empty() {
            self.exclude = None;
            return Ok(self);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        self.exclude = Some(builder.build()?);
        Ok(self)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub async fn aggregate(&self, query: &SearchQuery) -> Result<AggregationResult, FetchError> {
        let first = self.fetch_page(query, 1).await?;
        let total_count = first.total_count;
        if total_count == 0 && first.items.is_empty() {
            debug!(%query, "no results");
            return Ok(AggregationResult::empty());
        }

        let plan = plan_pages(total_count, self.per_page);
        let mut last_page_len = first.items.len();
        let mut fetched = first.items.len();
        let mut incomplete = first.incomplete_results;
        let mut items = self.retain_active(first.items);
        let mut pages_fetched: u32 = 1;
        let mut partial = None;

        for page in plan.remaining {
            if !plan.sampled && last_page_len < self.per_page as usize {
                debug!(%query, page, last_page_len, "short page, stopping early");
                break;
            }
            match self.fetch_page(query, page).await {
                Ok(next) => {
                    last_page_len = next.items.len();
                    fetched += next.items.len();
                    incomplete |= next.incomplete_results;
                    items.extend(self.retain_active(next.items));
                    pages_fetched += 1;
                }
                Err(e) if !degrades_to_partial(&e) => {
                    warn!(%query, page, "pagination failed: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(%query, page, pages_fetched, "pagination aborted: {}", e);
                    partial = Some(PartialFailure {
                        failed_page: page,
                        pages_fetched,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }

        if incomplete {
            warn!(%query, "upstream search timed out, counts may be low");
        }

        let kept = items.len();
        let mut result = AggregationResult::from_items(items, total_count);
        if let Some(partial) = partial {
            result = result.with_partial(partial);
        }
        let result = result
            .excluding_filtered(fetched, fetched - kept)
            .with_upstream_incomplete(incomplete);
        info!(
            %query,
            total_count = result.total_count,
            sample_size = result.sample_size,
            filtered_out = result.filtered_out,
            sampled = result.sampled,
            partial = result.is_partial(),
            "aggregation complete"
        );
        Ok(result)
    }

    async fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<SearchPage, FetchError> {
        let label = format!("search page {}", page);
        self.executor
            .execute(&label, || self.client.search_page(query, page, self.per_page))
            .await
    }

    /// Drop archived/disabled repositories and configured exclusions.
    fn retain_active(&self, items: Vec<SearchItem>) -> Vec<SearchItem> {
        items
            .into_iter()
            .filter(|item| !item.repository_inactive)
            .filter(|item| match &self.exclude {
                Some(set) => !set.is_match(&item.repository),
                None => true,
            })
            .collect()
    }
}

/// Only failures that survived their retries keep the pages already read.
fn degrades_to_partial(err: &FetchError) -> bool {
    err.is_retryable() || matches!(err, FetchError::Exhausted { .. })
}
