//! Page selection for paginated search.
//!
//! The upstream search endpoint never serves more than
//! [`MAX_REACHABLE_RESULTS`] results for one query, whatever the true
//! population size. Small result sets are walked page by page; large ones
//! are sampled at evenly spaced pages, always including the last reachable
//! page.

use crate::models::EXHAUSTIVE_THRESHOLD;

/// Results the search endpoint exposes through pagination.
pub const MAX_REACHABLE_RESULTS: u64 = 1000;

/// Pages fetched on the sampled path, page 1 included.
pub const MAX_SAMPLED_PAGES: u32 = 5;

/// Which pages to fetch after page 1 has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    pub sampled: bool,
    /// Page numbers still to fetch, ascending, never containing page 1.
    pub remaining: Vec<u32>,
}

/// Plan the pages that follow page 1 for a query reporting `total_count`
/// results at `page_size` per page.
pub fn plan_pages(total_count: u64, page_size: u32) -> PagePlan {
    let page_size = u64::from(page_size.max(1));
    let total_pages = total_count.div_ceil(page_size);

    if total_count <= EXHAUSTIVE_THRESHOLD {
        return PagePlan {
            sampled: false,
            remaining: (2..=total_pages as u32).collect(),
        };
    }

    let reachable_pages = (MAX_REACHABLE_RESULTS / page_size).max(1);
    let available = total_pages.min(reachable_pages) as u32;
    let stride = (available / MAX_SAMPLED_PAGES).max(1);

    let mut remaining: Vec<u32> = (1..MAX_SAMPLED_PAGES)
        .map(|i| 1 + i * stride)
        .filter(|p| *p <= available)
        .collect();

    if available > 1 && remaining.last() != Some(&available) {
        if remaining.len() as u32 == MAX_SAMPLED_PAGES - 1 {
            remaining.pop();
        }
        remaining.push(available);
    }
    remaining.dedup();

    PagePlan {
        sampled: true,
        remaining,
    }
}
